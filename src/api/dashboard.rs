//! `/api/v1/dashboard`: stats and uploads for the caller's channel.

use axum::{Router, extract::State, routing::get};

use crate::{
    models::{ChannelStats, ChannelVideo},
    store::dashboard,
};

use super::{ApiError, ApiResponse, ApiResult, AppState, AuthUser};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/stats", get(channel_stats))
        .route("/videos", get(channel_videos))
}

async fn channel_stats(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<ApiResponse<ChannelStats>> {
    let stats = state
        .db(move |conn| Ok(dashboard::channel_stats(conn, &user.id)?))
        .await?
        .ok_or_else(|| ApiError::not_found("Channel not found"))?;
    Ok(ApiResponse::ok(stats, "Channel stats fetched successfully"))
}

async fn channel_videos(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<ApiResponse<Vec<ChannelVideo>>> {
    let videos = state
        .db(move |conn| Ok(dashboard::channel_videos(conn, &user.id)?))
        .await?;
    Ok(ApiResponse::ok(videos, "Channel videos fetched successfully"))
}
