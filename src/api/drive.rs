//! Manual drive endpoints
//!
//! Requests go through the same scheduler as voice commands, so a manual
//! movement stops on its own after the configured delay.

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiState};
use crate::drive::PublishOutcome;
use crate::{Command, Error};

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub direction: String,
    /// Accepted for client compatibility; speeds come from configuration
    #[serde(default)]
    pub value: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct DriveResponse {
    pub status: &'static str,
    pub message: String,
    /// Whether the command reached the drive channel
    pub published: bool,
}

/// Build drive router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/move", post(move_robot))
        .route("/api/stop", post(stop_robot))
        .with_state(state)
}

async fn move_robot(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<MoveRequest>,
) -> Result<Json<DriveResponse>, ApiError> {
    let command: Command = request.direction.parse()?;
    if command.is_stop() {
        return Err(Error::InvalidDirection(request.direction).into());
    }

    tracing::info!(%command, value = ?request.value, "manual move");
    let outcome = state.scheduler.dispatch(command);

    Ok(Json(DriveResponse {
        status: "success",
        message: format!("Moving {command}"),
        published: outcome == PublishOutcome::Sent,
    }))
}

async fn stop_robot(State(state): State<Arc<ApiState>>) -> Json<DriveResponse> {
    tracing::info!("manual stop");
    let outcome = state.scheduler.dispatch(Command::Stop);

    Json(DriveResponse {
        status: "success",
        message: "Robot stopped".to_string(),
        published: outcome == PublishOutcome::Sent,
    })
}
