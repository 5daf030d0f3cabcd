//! HTTP surface exposed to the controller layer.
//!
//! Thin by design: the rate-limit gate runs here, before the service is
//! invoked, and everything else delegates to [`SyncService`]. Rejections
//! carry a retry-after hint; structural service errors map to status codes.

use crate::limiter::BatchProgress;
use crate::model::{Platform, UserId};
use crate::rate_limit::{EndpointClass, RateLimiter};
use crate::service::{BulkRefreshOptions, SyncService};
use crate::updater::UpdateOptions;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SyncService>,
    pub rate_limiter: Arc<RateLimiter>,
}

/// Create the Axum router for the sync service.
pub fn create_router(state: AppState, cors_origins: &str) -> Router {
    use tower_http::cors::{Any, CorsLayer};

    // Parse CORS origins
    let cors = if cors_origins == "*" {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = cors_origins
            .split(',')
            .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
            .collect();

        if origins.is_empty() {
            tracing::warn!("No valid CORS origins configured, using permissive CORS");
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    };

    Router::new()
        .route("/health", get(health))
        .route("/v1/stats", get(service_stats))
        .route(
            "/v1/users/{user_id}/platforms/{platform}/refresh",
            post(refresh_user_platform),
        )
        .route(
            "/v1/rooms/{room_id}/platforms/{platform}/refresh",
            post(refresh_room_platform),
        )
        .route("/v1/users/{user_id}/cache", delete(invalidate_user_cache))
        .route(
            "/v1/users/{user_id}/cache/{platform}",
            delete(invalidate_platform_cache),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_secs: Option<u64>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
            retry_after_secs: None,
        }),
    )
        .into_response()
}

fn rate_limited_response(retry_after_secs: u64) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(ErrorBody {
            error: "rate limit exceeded".to_string(),
            retry_after_secs: Some(retry_after_secs),
        }),
    )
        .into_response()
}

fn service_error_response(error: crate::error::ServiceError) -> Response {
    use crate::error::ServiceError;
    match &error {
        ServiceError::UserNotFound(_) | ServiceError::RoomNotFound(_) => {
            error_response(StatusCode::NOT_FOUND, error.to_string())
        }
        ServiceError::EmptyBulkRequest => {
            error_response(StatusCode::BAD_REQUEST, error.to_string())
        }
        ServiceError::Storage(_) => {
            tracing::error!(error = %error, "Storage failure surfaced to HTTP layer");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal storage error")
        }
    }
}

fn parse_platform(raw: &str) -> Result<Platform, Response> {
    raw.parse::<Platform>()
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))
}

const fn default_use_cache() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RefreshParams {
    #[serde(default)]
    force: bool,
    #[serde(default = "default_use_cache")]
    use_cache: bool,
}

async fn refresh_user_platform(
    State(state): State<AppState>,
    Path((user_id, platform)): Path<(Uuid, String)>,
    Query(params): Query<RefreshParams>,
) -> Response {
    let platform = match parse_platform(&platform) {
        Ok(platform) => platform,
        Err(response) => return response,
    };

    let decision = state
        .rate_limiter
        .check_endpoint(EndpointClass::PlatformRefresh, &format!("user:{user_id}"))
        .await;
    if !decision.allowed {
        return rate_limited_response(decision.retry_after_secs());
    }

    let opts = UpdateOptions {
        force: params.force,
        use_cache: params.use_cache,
    };
    match state
        .service
        .refresh_user_platform(user_id, platform, opts)
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => service_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
struct RoomRefreshBody {
    #[serde(default)]
    user_ids: Vec<UserId>,
}

#[derive(Debug, Deserialize)]
struct RoomRefreshParams {
    #[serde(default)]
    force: bool,
}

async fn refresh_room_platform(
    State(state): State<AppState>,
    Path((room_id, platform)): Path<(Uuid, String)>,
    Query(params): Query<RoomRefreshParams>,
    body: Option<Json<RoomRefreshBody>>,
) -> Response {
    let platform = match parse_platform(&platform) {
        Ok(platform) => platform,
        Err(response) => return response,
    };

    let decision = state
        .rate_limiter
        .check_endpoint(
            EndpointClass::RoomOperations,
            &format!("room:{room_id}:{platform}"),
        )
        .await;
    if !decision.allowed {
        return rate_limited_response(decision.retry_after_secs());
    }

    let user_ids = body
        .map(|Json(body)| body.user_ids)
        .filter(|ids| !ids.is_empty());

    // Long room refreshes report incremental progress; surface it in the logs.
    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::unbounded_channel::<BatchProgress>();
    tokio::spawn(async move {
        while let Some(progress) = progress_rx.recv().await {
            tracing::debug!(
                completed = progress.completed,
                total = progress.total,
                successful = progress.successful,
                failed = progress.failed,
                "Room refresh progress"
            );
        }
    });

    let opts = BulkRefreshOptions {
        force: params.force,
        ..BulkRefreshOptions::default()
    };
    match state
        .service
        .bulk_refresh_room(room_id, platform, user_ids, opts, Some(progress_tx))
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => service_error_response(error),
    }
}

async fn invalidate_user_cache(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Response {
    let invalidated = state.service.invalidate_cache(user_id, None).await;
    (
        StatusCode::OK,
        Json(serde_json::json!({ "invalidated": invalidated })),
    )
        .into_response()
}

async fn invalidate_platform_cache(
    State(state): State<AppState>,
    Path((user_id, platform)): Path<(Uuid, String)>,
) -> Response {
    let platform = match parse_platform(&platform) {
        Ok(platform) => platform,
        Err(response) => return response,
    };
    let invalidated = state.service.invalidate_cache(user_id, Some(platform)).await;
    (
        StatusCode::OK,
        Json(serde_json::json!({ "invalidated": invalidated })),
    )
        .into_response()
}

async fn service_stats(State(state): State<AppState>) -> Response {
    let stats = state.service.service_stats().await;
    (StatusCode::OK, Json(stats)).into_response()
}

async fn health(State(state): State<AppState>) -> Response {
    let report = state.service.health().await;
    let status = if report.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}
