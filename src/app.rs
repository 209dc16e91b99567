use crate::config::Config;
use crate::error::ApiError;
use crate::idempotency::{Admission, IdempotencyCache};
use crate::models::NormalizedResult;
use crate::normalize::normalize;
use crate::validation::{collect_messages, parse_request};
use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub idempotency: Arc<IdempotencyCache>,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        Self {
            idempotency: Arc::new(IdempotencyCache::new(config.idempotency_ttl)),
            max_body_bytes: config.max_body_bytes,
        }
    }
}

pub async fn run_server(config: Config) -> Result<()> {
    let state = AppState::from_config(&config);
    info!(
        "Idempotency window {}s, body limit {} bytes",
        state.idempotency.ttl().num_seconds(),
        config.max_body_bytes
    );

    let app = build_router(state.clone());

    info!("Listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.idempotency.clear();
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let max_body_bytes = state.max_body_bytes;
    Router::new()
        .route("/webhooks/normalize", post(normalize_webhooks))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn normalize_webhooks(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<NormalizedResult>, ApiError> {
    let content_type_ok = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        == Some(true);
    if !content_type_ok {
        warn!(
            "Rejecting request: unsupported content-type {:?}",
            headers.get(header::CONTENT_TYPE)
        );
        return Err(ApiError::UnsupportedMediaType);
    }

    if state.idempotency.check_and_record(&body) == Admission::Rejected {
        warn!("Rejecting request: duplicate body within idempotency window");
        return Err(ApiError::DuplicateRequest);
    }

    let request = parse_request(&body).map_err(|errors| {
        let messages = collect_messages(&errors);
        warn!("Rejecting request: {} validation errors", messages.len());
        ApiError::Validation(messages)
    })?;

    let received = request.events.len();
    let result = normalize(request.events);
    info!(
        received,
        unique = result.unique_count,
        "Normalized webhook batch"
    );
    Ok(Json(result))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        term.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
