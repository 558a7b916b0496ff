//! HTTP layer: shared state, the response envelope and the router.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use tokio::task;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, warn};

use crate::{
    auth::SessionKeys,
    config::{JSON_BODY_LIMIT, ServerConfig},
    media::{HostedAsset, LocalMediaHost, MediaHost, MediaKind},
    store::{Database, is_unique_violation, is_valid_object_id},
};

mod comments;
mod dashboard;
mod extract;
mod healthcheck;
mod likes;
mod media;
mod playlists;
mod subscriptions;
mod tweets;
mod users;
mod videos;

pub use extract::{AuthUser, BodyBytes, JsonBody, UploadForm, UploadedFile};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<ServerConfig>,
    pub sessions: Arc<SessionKeys>,
    pub media: Arc<dyn MediaHost>,
}

impl AppState {
    /// Opens the database under `DATA_ROOT` and stores uploads on local disk.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let db = Database::open(config.database_path())?;
        let media = LocalMediaHost::new(config.media_dir())?;
        Self::with_media_host(config, db, Arc::new(media))
    }

    pub fn with_media_host(
        config: ServerConfig,
        db: Database,
        media: Arc<dyn MediaHost>,
    ) -> Result<Self> {
        let temp_dir = config.temp_dir();
        std::fs::create_dir_all(&temp_dir)
            .with_context(|| format!("creating upload directory {}", temp_dir.display()))?;
        Ok(Self {
            db,
            sessions: Arc::new(SessionKeys::from_config(&config)),
            config: Arc::new(config),
            media,
        })
    }

    /// Runs `f` against a fresh connection on the blocking pool.
    pub async fn db<F, T>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&mut Connection) -> ApiResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        task::spawn_blocking(move || db.with_connection(f))
            .await
            .map_err(|err| ApiError::internal(format!("task join error: {err}")))?
    }

    /// Runs a media-host call on the blocking pool.
    pub async fn media<F, T>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&dyn MediaHost) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let media = self.media.clone();
        task::spawn_blocking(move || f(media.as_ref()))
            .await
            .map_err(|err| ApiError::internal(format!("task join error: {err}")))?
            .map_err(ApiError::from)
    }

    /// Hands a buffered upload to the media host. The temp file is removed
    /// once the host is done with it, whatever the outcome.
    pub async fn upload(&self, file: UploadedFile, kind: MediaKind) -> ApiResult<HostedAsset> {
        self.media(move |host| {
            let asset = host.upload(&file.path, kind, &file.file_name);
            drop(file);
            asset
        })
        .await
    }

    /// Deletes replaced or orphaned assets. Failures are logged, never
    /// surfaced to the client.
    pub async fn discard_assets(&self, urls: Vec<String>) {
        let urls: Vec<String> = urls.into_iter().filter(|url| !url.is_empty()).collect();
        if urls.is_empty() {
            return;
        }
        let result = self
            .media(move |host| {
                for url in &urls {
                    if let Err(err) = host.delete(url) {
                        warn!(%url, "failed to delete asset: {err:#}");
                    }
                }
                Ok(())
            })
            .await;
        if let Err(err) = result {
            warn!("asset cleanup did not run: {}", err.message);
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        error!("internal error: {message}");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{err:#}"))
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        Self::internal(format!("database error: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "statusCode": self.status.as_u16(),
            "data": null,
            "message": self.message,
            "success": false,
            "errors": [],
        });
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Success envelope: `{statusCode, data, message, success: true}`.
#[derive(Debug)]
pub struct ApiResponse<T> {
    status: StatusCode,
    data: T,
    message: String,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            data,
            message: message.into(),
        }
    }

    pub fn created(data: T, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CREATED,
            data,
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a, T> {
    status_code: u16,
    data: &'a T,
    message: &'a str,
    success: bool,
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let body = Envelope {
            status_code: self.status.as_u16(),
            data: &self.data,
            message: &self.message,
            success: self.status.is_success(),
        };
        (self.status, Json(body)).into_response()
    }
}

/// Maps a UNIQUE failure to 409 `message`. Existence checks only catch the
/// common case: a concurrent request can still claim the row first.
pub(crate) fn conflict_if_duplicate(
    message: &'static str,
) -> impl FnOnce(anyhow::Error) -> ApiError {
    move |err| {
        if is_unique_violation(&err) {
            ApiError::conflict(message)
        } else {
            ApiError::from(err)
        }
    }
}

/// Validates a path id, answering 400 "Invalid <what> id" otherwise.
pub(crate) fn object_id(value: &str, what: &str) -> ApiResult<String> {
    if is_valid_object_id(value) {
        Ok(value.to_string())
    } else {
        Err(ApiError::bad_request(format!("Invalid {what} id")))
    }
}

/// Trimmed, non-empty text.
pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Form and JSON booleans arrive as strings from some clients.
pub(crate) fn parse_flag(value: &str, field: &str) -> ApiResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ApiError::bad_request(format!("{field} must be true or false"))),
    }
}

pub fn router(state: AppState) -> Router {
    let upload_limit = state.config.upload_limit_bytes;
    let cors = cors_layer(&state.config.cors_origins);

    let api = Router::new()
        .route("/healthcheck", get(healthcheck::healthcheck))
        .nest("/users", users::routes(upload_limit))
        .nest("/videos", videos::routes(upload_limit))
        .nest("/comments", comments::routes())
        .nest("/likes", likes::routes())
        .nest("/tweets", tweets::routes())
        .nest("/playlist", playlists::routes())
        .nest("/subscriptions", subscriptions::routes())
        .nest("/dashboard", dashboard::routes());

    Router::new()
        .nest("/api/v1", api)
        .route("/media/{kind}/{file}", get(media::serve))
        .fallback(route_not_found)
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring unparsable CORS origin");
                None
            }
        })
        .collect();
    if allowed.is_empty() {
        return CorsLayer::new();
    }
    CorsLayer::new()
        .allow_origin(allowed)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

async fn route_not_found() -> ApiError {
    ApiError::not_found("Route not found")
}
