//! `/api/v1/likes`: like toggles and counts for videos, comments and tweets.

use axum::{
    Router,
    extract::{Path as AxumPath, State},
    routing::{get, post},
};
use serde::Serialize;

use crate::{
    models::{LikeInfo, LikeTarget, OwnerSummary, VideoDocument},
    store::likes,
};

use super::{ApiError, ApiResponse, ApiResult, AppState, AuthUser, object_id};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/toggle/v/{videoId}", post(toggle_video_like))
        .route("/toggle/c/{commentId}", post(toggle_comment_like))
        .route("/toggle/t/{tweetId}", post(toggle_tweet_like))
        .route("/v/{videoId}", get(video_likes))
        .route("/c/{commentId}", get(comment_likes))
        .route("/t/{tweetId}", get(tweet_likes))
        .route("/videos", get(liked_videos))
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Video,
    Comment,
    Tweet,
}

impl Kind {
    fn target(self, id: &str) -> LikeTarget<'_> {
        match self {
            Self::Video => LikeTarget::Video(id),
            Self::Comment => LikeTarget::Comment(id),
            Self::Tweet => LikeTarget::Tweet(id),
        }
    }

    fn id_name(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Comment => "comment",
            Self::Tweet => "tweet",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToggleResult {
    is_liked: bool,
}

async fn toggle_video_like(
    state: State<AppState>,
    user: AuthUser,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<ApiResponse<ToggleResult>> {
    toggle(state, user, Kind::Video, id).await
}

async fn toggle_comment_like(
    state: State<AppState>,
    user: AuthUser,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<ApiResponse<ToggleResult>> {
    toggle(state, user, Kind::Comment, id).await
}

async fn toggle_tweet_like(
    state: State<AppState>,
    user: AuthUser,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<ApiResponse<ToggleResult>> {
    toggle(state, user, Kind::Tweet, id).await
}

async fn toggle(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    kind: Kind,
    id: String,
) -> ApiResult<ApiResponse<ToggleResult>> {
    let id = object_id(&id, kind.id_name())?;
    let (label, is_liked) = state
        .db(move |conn| {
            let target = kind.target(&id);
            if !likes::target_exists(conn, target)? {
                return Err(ApiError::not_found(format!("{} not found", target.label())));
            }
            Ok((target.label(), likes::toggle(conn, target, &user.id)?))
        })
        .await?;

    let message = if is_liked {
        format!("{label} liked successfully")
    } else {
        format!("{label} unliked successfully")
    };
    Ok(ApiResponse::ok(ToggleResult { is_liked }, message))
}

async fn video_likes(
    state: State<AppState>,
    user: AuthUser,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<ApiResponse<LikeInfo>> {
    like_info(state, user, Kind::Video, id).await
}

async fn comment_likes(
    state: State<AppState>,
    user: AuthUser,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<ApiResponse<LikeInfo>> {
    like_info(state, user, Kind::Comment, id).await
}

async fn tweet_likes(
    state: State<AppState>,
    user: AuthUser,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<ApiResponse<LikeInfo>> {
    like_info(state, user, Kind::Tweet, id).await
}

async fn like_info(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    kind: Kind,
    id: String,
) -> ApiResult<ApiResponse<LikeInfo>> {
    let id = object_id(&id, kind.id_name())?;
    let info = state
        .db(move |conn| {
            let target = kind.target(&id);
            if !likes::target_exists(conn, target)? {
                return Err(ApiError::not_found(format!("{} not found", target.label())));
            }
            Ok(likes::info(conn, target, &user.id)?)
        })
        .await?;
    Ok(ApiResponse::ok(info, "Like fetched successfully"))
}

async fn liked_videos(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<ApiResponse<Vec<VideoDocument<OwnerSummary>>>> {
    let videos = state
        .db(move |conn| Ok(likes::liked_videos(conn, &user.id)?))
        .await?;
    Ok(ApiResponse::ok(videos, "Liked videos fetched successfully"))
}
