//! Reply generation and speech output endpoints

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::post};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiState};
use crate::Error;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub response: String,
}

#[derive(Debug, Deserialize)]
pub struct SpeakRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SpeakResponse {
    pub status: &'static str,
    /// Base64-encoded audio as synthesized
    pub audio: String,
}

/// Build assistant router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/generate", post(generate))
        .route("/api/speak", post(speak))
        .with_state(state)
}

async fn generate(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let generator = state
        .generator
        .as_ref()
        .ok_or_else(|| Error::Config("reply generation not configured".to_string()))?;

    if request.prompt.trim().is_empty() {
        return Err(Error::InvalidInput("prompt must not be empty".to_string()).into());
    }

    let response = generator.generate(&request.prompt).await?;
    Ok(Json(GenerateResponse { response }))
}

async fn speak(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<SpeakRequest>,
) -> Result<Json<SpeakResponse>, ApiError> {
    let speaker = state
        .speaker
        .as_ref()
        .ok_or_else(|| Error::Config("speech output not configured".to_string()))?;

    if request.text.trim().is_empty() {
        return Err(Error::InvalidInput("text must not be empty".to_string()).into());
    }

    let audio = speaker.speak(&request.text).await?;
    Ok(Json(SpeakResponse {
        status: "success",
        audio: STANDARD.encode(audio),
    }))
}
