//! HTTP API server for voicedrive

pub mod assistant;
pub mod designs;
pub mod drive;
pub mod health;

use std::sync::Arc;

use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::db::{DbPool, DesignRepo};
use crate::drive::ActuationScheduler;
use crate::llm::TextGenerator;
use crate::session::SessionStatus;
use crate::voice::Speaker;
use crate::{Error, Result};

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub db: DbPool,
    pub designs: DesignRepo,
    /// Same scheduler the voice loop dispatches through
    pub scheduler: ActuationScheduler,
    /// Present only when `GEMINI_API_KEY` is set
    pub generator: Option<Arc<TextGenerator>>,
    /// Present only when a TTS key is set
    pub speaker: Option<Arc<Speaker>>,
    /// Present while a voice session runs in this process
    pub session: Option<SessionStatus>,
}

impl ApiState {
    #[must_use]
    pub fn new(db: DbPool, scheduler: ActuationScheduler) -> Self {
        Self {
            designs: DesignRepo::new(db.clone()),
            db,
            scheduler,
            generator: None,
            speaker: None,
            session: None,
        }
    }

    #[must_use]
    pub fn with_generator(mut self, generator: Arc<TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    #[must_use]
    pub fn with_speaker(mut self, speaker: Arc<Speaker>) -> Self {
        self.speaker = Some(speaker);
        self
    }

    #[must_use]
    pub fn with_session(mut self, session: SessionStatus) -> Self {
        self.session = Some(session);
        self
    }
}

/// Error returned by API handlers
///
/// Rendered as `{"error": {"code", "message"}}`.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: ErrorBody,
        }

        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
        }

        let (status, code) = match &self.0 {
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::InvalidDirection(_) => (StatusCode::BAD_REQUEST, "invalid_direction"),
            Error::InvalidInput(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_input"),
            Error::Config(_) => (StatusCode::SERVICE_UNAVAILABLE, "not_configured"),
            Error::Llm(_) | Error::Tts(_) | Error::Http(_) => {
                (StatusCode::BAD_GATEWAY, "upstream_failed")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code,
                message: self.0.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
    cors_origin: HeaderValue,
}

impl ApiServer {
    /// Create a server allowing cross-origin requests from `cors_origin`
    ///
    /// # Errors
    ///
    /// Returns error if the origin is not a valid header value
    pub fn new(state: ApiState, port: u16, cors_origin: &str) -> Result<Self> {
        let cors_origin = HeaderValue::from_str(cors_origin)
            .map_err(|e| Error::Config(format!("invalid CORS origin {cors_origin:?}: {e}")))?;

        Ok(Self {
            state: Arc::new(state),
            port,
            cors_origin,
        })
    }

    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        let frontend = self.cors_origin.to_str().unwrap_or_default().to_string();

        let cors = CorsLayer::new()
            .allow_origin(self.cors_origin.clone())
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE])
            .allow_credentials(true);

        Router::new()
            .route(
                "/",
                get(move || {
                    let frontend = frontend.clone();
                    async move { Redirect::temporary(&frontend) }
                }),
            )
            .merge(drive::router(self.state.clone()))
            .merge(assistant::router(self.state.clone()))
            .merge(designs::router(self.state.clone()))
            .merge(health::router(self.state.clone()))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
