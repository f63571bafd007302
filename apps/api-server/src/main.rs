//! api-server — HTTP API for the URL Shortener workspace.
//!
//! Provides the shorten, redirect, stats and list endpoints on top of the
//! domain `LinkService`:
//! - Storage: SQLite (default, `sqlite` feature) or in-memory.
//! - CORS: Configurable via CORS_ALLOW_ORIGIN (origin string), `*` by default.
//! - Logging: `tracing` with pretty or JSON output, one span per request
//!   tagged with its `x-request-id`.
//!
//! Run:
//! ```bash
//! # pretty logs (default); PORT and BASE_URL optional
//! cargo run -p api-server
//!
//! # ephemeral store, JSON logs
//! STORAGE_PROVIDER=memory LOG_FORMAT=json cargo run -p api-server
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.
//!

mod config;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::http::{header, HeaderValue};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use domain::{CoreError, ShortCode, ShortLink};
use http_common::{
    json_err, MSG_NOT_FOUND, MSG_SERVER_ERROR, MSG_SHORT_URL_NOT_FOUND, MSG_UNAVAILABLE,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::store::Service;

#[derive(Clone)]
struct AppState {
    svc: Arc<Service>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    // Load and validate config first (fail fast on misconfiguration)
    let cfg = config::Config::from_env().context("invalid configuration")?;

    init_tracing(&cfg);
    cfg.warn_if_ephemeral();

    let repo = store::AnyRepo::from_config(&cfg).context("failed to open link store")?;
    let svc = store::build_service(&cfg, repo).context("invalid shortener settings")?;
    let state = AppState { svc: Arc::new(svc) };

    // Request ID header name
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    let mut app = build_router(state)
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid));

    // CORS - already validated in Config::from_env()
    let cors = if cfg.cors_allow_origin == HeaderValue::from_static("*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([cfg.cors_allow_origin.clone()]))
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE])
    };
    app = app.layer(cors);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, base_url = %cfg.base_url, "api-server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!("api-server stopped");
    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/shorten", post(shorten))
        .route("/urls", get(list_links))
        .route("/stats/:code", get(get_stats))
        .route("/:code", get(redirect))
        .route("/:code/", get(redirect))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(err = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

#[derive(Deserialize)]
struct ShortenReq {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LinkOut {
    id: String,
    original_url: String,
    short_code: String,
    short_url: String,
    clicks: u64,
    created_at: String,
    last_clicked: Option<String>,
}

fn link_to_out(link: ShortLink) -> LinkOut {
    LinkOut {
        id: link.id.to_string(),
        original_url: link.original_url,
        short_code: link.short_code.as_str().to_string(),
        short_url: link.short_url,
        clicks: link.clicks,
        created_at: http_common::system_time_to_rfc3339(link.created_at),
        last_clicked: link.last_clicked.map(http_common::system_time_to_rfc3339),
    }
}

/// A `CoreError` plus the body flavor of the route it happened on. The
/// redirect route answers in plain text, the API routes in JSON.
#[derive(Debug)]
enum ApiError {
    Json(CoreError),
    Text(CoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (is_json, err) = match self {
            ApiError::Json(e) => (true, e),
            ApiError::Text(e) => (false, e),
        };
        let (status, message) = match &err {
            CoreError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            CoreError::NotFound if is_json => (StatusCode::NOT_FOUND, MSG_NOT_FOUND.to_string()),
            CoreError::NotFound => (StatusCode::NOT_FOUND, MSG_SHORT_URL_NOT_FOUND.to_string()),
            CoreError::StoreUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, MSG_UNAVAILABLE.to_string())
            }
            CoreError::AlreadyExists | CoreError::Exhausted { .. } | CoreError::Repository(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, MSG_SERVER_ERROR.to_string())
            }
        };
        if status.is_server_error() {
            error!(err = %err, status = status.as_u16(), "request failed");
        }

        let mut resp = if is_json {
            (status, Json(json_err(&message))).into_response()
        } else {
            (status, message).into_response()
        };
        if err.is_transient() {
            resp.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        resp
    }
}

async fn shorten(
    State(state): State<AppState>,
    body: Result<Json<ShortenReq>, JsonRejection>,
) -> Result<Json<LinkOut>, ApiError> {
    // An unreadable body is treated like a missing url
    let url = match body {
        Ok(Json(req)) => req.url.unwrap_or_default(),
        Err(rejection) => {
            warn!(err = %rejection, "unreadable shorten body");
            String::new()
        }
    };
    let link = store::blocking(&state.svc, move |svc| svc.create(&url))
        .await
        .map_err(|e| {
            if let CoreError::InvalidInput(msg) = &e {
                warn!(reason = %msg, "shorten rejected");
            }
            ApiError::Json(e)
        })?;
    info!(code = %link.short_code, original_url = %link.original_url, "short link created");
    Ok(Json(link_to_out(link)))
}

async fn redirect(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response, ApiError> {
    // Codes outside the alphabet can never exist
    let Ok(code) = ShortCode::new(code) else {
        warn!("bad code in path");
        return Err(ApiError::Text(CoreError::NotFound));
    };
    let link = store::blocking(&state.svc, move |svc| svc.record_click(&code))
        .await
        .map_err(|e| {
            if matches!(e, CoreError::NotFound) {
                warn!("redirect 404");
            }
            ApiError::Text(e)
        })?;
    info!(
        code = %link.short_code,
        redirect_to = %link.original_url,
        clicks = link.clicks,
        "redirect ok"
    );
    Ok((StatusCode::FOUND, [(header::LOCATION, link.original_url)]).into_response())
}

async fn get_stats(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<LinkOut>, ApiError> {
    let Ok(code) = ShortCode::new(code) else {
        return Err(ApiError::Json(CoreError::NotFound));
    };
    let link = store::blocking(&state.svc, move |svc| svc.find_by_code(&code))
        .await
        .map_err(ApiError::Json)?;
    Ok(Json(link_to_out(link)))
}

async fn list_links(State(state): State<AppState>) -> Result<Json<Vec<LinkOut>>, ApiError> {
    let links = store::blocking(&state.svc, |svc| svc.list_all())
        .await
        .map_err(ApiError::Json)?;
    Ok(Json(links.into_iter().map(link_to_out).collect()))
}
