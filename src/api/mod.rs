//! REST API server for the finance tracker
//!
//! Every handler returns `Result<_, TrackerError>`; errors render as
//! `{ "error": message }` with the status mapped below.

use axum::{
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::auth::{GoogleVerifier, IdentityVerifier, TokenKeys};
use crate::config::Config;
use crate::error::TrackerError;
use crate::openai::OpenAiClient;
use crate::parser::{OpenAiExtractor, TransactionExtractor};
use crate::store::{build_store, Store};

mod ai;
mod auth;
mod transactions;

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub tokens: TokenKeys,
    pub extractor: Arc<dyn TransactionExtractor>,
    pub identity: Arc<dyn IdentityVerifier>,
}

impl AppState {
    /// Wire the production backends described by `config`.
    pub fn from_config(config: &Config) -> Self {
        let client = OpenAiClient::new(
            config.openai_api_key.clone(),
            config.openai_base_url.clone(),
            config.openai_model.clone(),
        );

        Self {
            store: build_store(config.database_url.as_deref()),
            tokens: TokenKeys::new(&config.jwt_secret, config.token_ttl),
            extractor: Arc::new(OpenAiExtractor::new(client)),
            identity: Arc::new(GoogleVerifier::new(config.google_client_id.clone())),
        }
    }
}

/// =============================
/// Error Responses
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for TrackerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            TrackerError::Validation(message)
            | TrackerError::InvalidInput(message)
            | TrackerError::Conflict(message) => (StatusCode::BAD_REQUEST, message.clone()),
            TrackerError::InvalidCredentials => {
                (StatusCode::BAD_REQUEST, "Invalid credentials".to_string())
            }
            TrackerError::Unauthorized(reason) => {
                debug!("Rejected request: {}", reason);
                (StatusCode::UNAUTHORIZED, "Not authorized".to_string())
            }
            TrackerError::AudienceMismatch { .. } => (
                StatusCode::UNAUTHORIZED,
                "Google token audience mismatch".to_string(),
            ),
            TrackerError::Verification(reason) => {
                warn!("Google verification failed: {}", reason);
                (
                    StatusCode::UNAUTHORIZED,
                    "Google authentication failed".to_string(),
                )
            }
            TrackerError::NotFound(message) => (StatusCode::NOT_FOUND, message.clone()),
            TrackerError::UpstreamParse(_) => {
                error!("{}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "AI returned invalid JSON".to_string(),
                )
            }
            TrackerError::Upstream(_) => {
                error!("{}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to parse transaction".to_string(),
                )
            }
            // Details of anything else stay in the server log.
            _ => {
                error!("An unexpected error occurred: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string())
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<JsonRejection> for TrackerError {
    fn from(rejection: JsonRejection) -> Self {
        TrackerError::Validation(rejection.body_text())
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

/// =============================
/// Router
/// =============================

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin, _| {
            let permitted = allowed.contains(origin);
            if !permitted {
                warn!("CORS blocked for: {:?}", origin);
            }
            permitted
        }))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

pub fn create_router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/register", post(auth::register_handler))
        .route("/api/auth/login", post(auth::login_handler))
        .route("/api/auth/google", post(auth::google_handler))
        .route("/api/auth/me", get(auth::me_handler))
        .route("/api/ai/parse", post(ai::parse_handler))
        .route(
            "/api/transactions",
            get(transactions::list_handler).post(transactions::create_handler),
        )
        .route("/api/transactions/stats", get(transactions::stats_handler))
        .route("/api/transactions/daily", get(transactions::daily_handler))
        .route(
            "/api/transactions/:id",
            put(transactions::update_handler).delete(transactions::delete_handler),
        )
        .with_state(state)
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
}

/// =============================
/// Server Startup
/// =============================

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for ctrl+c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => debug!("Received ctrl+c signal"),
        _ = terminate => debug!("Received terminate signal"),
    }
}

pub async fn start_server(
    state: AppState,
    config: &Config,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state, &config.allowed_origins);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", config.port);
    info!("Local: http://127.0.0.1:{}/api/health", config.port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
