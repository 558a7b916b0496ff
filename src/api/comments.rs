//! `/api/v1/comments`: paged comments on a video, viewer first.

use axum::{
    Router,
    extract::{Path as AxumPath, State},
    routing::{get, patch},
};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    models::{CommentDocument, CommentRecord, OwnerSummary},
    store::{comments, write_transaction},
};

use super::{
    ApiError, ApiResponse, ApiResult, AppState, AuthUser, JsonBody, non_blank, object_id,
    videos::visible_video,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/{videoId}", get(list_comments).post(add_comment))
        .route("/c/{commentId}", patch(update_comment).delete(delete_comment))
}

#[derive(Debug, Deserialize)]
struct CommentRequest {
    content: Option<String>,
}

impl CommentRequest {
    fn content(&self) -> ApiResult<String> {
        non_blank(self.content.as_deref()).ok_or_else(|| ApiError::bad_request("Comment is required"))
    }
}

fn owned_comment(conn: &Connection, id: &str, user: &str, action: &str) -> ApiResult<CommentRecord> {
    let comment =
        comments::find_comment(conn, id)?.ok_or_else(|| ApiError::not_found("Comment not found"))?;
    if comment.owner != user {
        return Err(ApiError::forbidden(format!(
            "You are not authorized to {action} this comment"
        )));
    }
    Ok(comment)
}

async fn list_comments(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AxumPath(video_id): AxumPath<String>,
) -> ApiResult<ApiResponse<Vec<CommentDocument<OwnerSummary>>>> {
    let video_id = object_id(&video_id, "video")?;
    let listed = state
        .db(move |conn| {
            visible_video(conn, &video_id, &user.id)?;
            let listed = comments::list_for_video(conn, &video_id)?;
            Ok(comments::viewer_first(listed, &user.id))
        })
        .await?;
    Ok(ApiResponse::ok(listed, "Comments fetched successfully"))
}

async fn add_comment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AxumPath(video_id): AxumPath<String>,
    JsonBody(request): JsonBody<CommentRequest>,
) -> ApiResult<ApiResponse<CommentDocument<OwnerSummary>>> {
    let video_id = object_id(&video_id, "video")?;
    let content = request.content()?;
    let created = state
        .db(move |conn| {
            visible_video(conn, &video_id, &user.id)?;
            Ok(comments::insert_comment(conn, &video_id, &user.id, &content)?)
        })
        .await?;
    Ok(ApiResponse::created(created, "Comment created successfully"))
}

async fn update_comment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AxumPath(comment_id): AxumPath<String>,
    JsonBody(request): JsonBody<CommentRequest>,
) -> ApiResult<ApiResponse<CommentDocument<OwnerSummary>>> {
    let comment_id = object_id(&comment_id, "comment")?;
    let content = request.content()?;
    let updated = state
        .db(move |conn| {
            owned_comment(conn, &comment_id, &user.id, "update")?;
            comments::update_content(conn, &comment_id, &content)?
                .ok_or_else(|| ApiError::not_found("Comment not found"))
        })
        .await?;
    Ok(ApiResponse::ok(updated, "Comment updated successfully"))
}

async fn delete_comment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AxumPath(comment_id): AxumPath<String>,
) -> ApiResult<ApiResponse<Value>> {
    let comment_id = object_id(&comment_id, "comment")?;
    state
        .db(move |conn| {
            let tx = write_transaction(conn)?;
            owned_comment(&tx, &comment_id, &user.id, "delete")?;
            comments::delete_comment(&tx, &comment_id)?;
            tx.commit()?;
            Ok(())
        })
        .await?;
    Ok(ApiResponse::ok(json!({}), "Comment deleted successfully"))
}
