//! `/api/v1/playlist`: user playlists and their videos.

use axum::{
    Router,
    extract::{Path as AxumPath, State},
    routing::{get, patch, post},
};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    models::{OwnerSummary, PlaylistDocument, PlaylistRecord, PlaylistVideo},
    store::{playlists, users, videos, write_transaction},
};

use super::{ApiError, ApiResponse, ApiResult, AppState, AuthUser, JsonBody, non_blank, object_id};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_playlist))
        .route(
            "/{playlistId}",
            get(get_playlist)
                .patch(update_playlist)
                .delete(delete_playlist),
        )
        .route("/add/{videoId}/{playlistId}", patch(add_video))
        .route("/remove/{videoId}/{playlistId}", patch(remove_video))
        .route("/user/{userId}", get(user_playlists))
        .route("/channel/{userName}", get(channel_playlists))
}

fn owned_playlist(conn: &Connection, id: &str, user: &str) -> ApiResult<PlaylistRecord> {
    let playlist = playlists::find_playlist(conn, id)?
        .ok_or_else(|| ApiError::not_found("Playlist not found"))?;
    if playlist.owner != user {
        return Err(ApiError::forbidden(
            "You are not authorized to modify this playlist",
        ));
    }
    Ok(playlist)
}

#[derive(Debug, Deserialize)]
struct PlaylistRequest {
    name: Option<String>,
    description: Option<String>,
}

async fn create_playlist(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(request): JsonBody<PlaylistRequest>,
) -> ApiResult<ApiResponse<PlaylistRecord>> {
    let name = non_blank(request.name.as_deref())
        .ok_or_else(|| ApiError::bad_request("Name is required"))?;
    let description = request.description.unwrap_or_default().trim().to_string();
    let created = state
        .db(move |conn| Ok(playlists::insert_playlist(conn, &user.id, &name, &description)?))
        .await?;
    Ok(ApiResponse::created(created, "Playlist created successfully"))
}

async fn get_playlist(
    State(state): State<AppState>,
    _user: AuthUser,
    AxumPath(playlist_id): AxumPath<String>,
) -> ApiResult<ApiResponse<PlaylistDocument<OwnerSummary, PlaylistVideo>>> {
    let playlist_id = object_id(&playlist_id, "playlist")?;
    let playlist = state
        .db(move |conn| Ok(playlists::find_populated(conn, &playlist_id)?))
        .await?
        .ok_or_else(|| ApiError::not_found("Playlist not found"))?;
    Ok(ApiResponse::ok(playlist, "Playlist fetched successfully"))
}

async fn update_playlist(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AxumPath(playlist_id): AxumPath<String>,
    JsonBody(request): JsonBody<PlaylistRequest>,
) -> ApiResult<ApiResponse<PlaylistRecord>> {
    let playlist_id = object_id(&playlist_id, "playlist")?;
    let name = non_blank(request.name.as_deref());
    let description = request.description.map(|value| value.trim().to_string());
    if name.is_none() && description.is_none() {
        return Err(ApiError::bad_request("Name or description is required"));
    }

    let updated = state
        .db(move |conn| {
            owned_playlist(conn, &playlist_id, &user.id)?;
            playlists::update_playlist(conn, &playlist_id, name.as_deref(), description.as_deref())?
                .ok_or_else(|| ApiError::not_found("Playlist not found"))
        })
        .await?;
    Ok(ApiResponse::ok(updated, "Playlist updated successfully"))
}

async fn delete_playlist(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AxumPath(playlist_id): AxumPath<String>,
) -> ApiResult<ApiResponse<Value>> {
    let playlist_id = object_id(&playlist_id, "playlist")?;
    state
        .db(move |conn| {
            let tx = write_transaction(conn)?;
            owned_playlist(&tx, &playlist_id, &user.id)?;
            playlists::delete_playlist(&tx, &playlist_id)?;
            tx.commit()?;
            Ok(())
        })
        .await?;
    Ok(ApiResponse::ok(json!({}), "Playlist deleted successfully"))
}

async fn add_video(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AxumPath((video_id, playlist_id)): AxumPath<(String, String)>,
) -> ApiResult<ApiResponse<PlaylistRecord>> {
    let video_id = object_id(&video_id, "video")?;
    let playlist_id = object_id(&playlist_id, "playlist")?;
    let updated = state
        .db(move |conn| {
            let tx = write_transaction(conn)?;
            owned_playlist(&tx, &playlist_id, &user.id)?;
            if videos::find_video(&tx, &video_id)?.is_none() {
                return Err(ApiError::not_found("Video not found"));
            }
            let updated = playlists::add_video(&tx, &playlist_id, &video_id)?
                .ok_or_else(|| ApiError::not_found("Playlist not found"))?;
            tx.commit()?;
            Ok(updated)
        })
        .await?;
    Ok(ApiResponse::ok(updated, "Video added to playlist successfully"))
}

async fn remove_video(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AxumPath((video_id, playlist_id)): AxumPath<(String, String)>,
) -> ApiResult<ApiResponse<PlaylistRecord>> {
    let video_id = object_id(&video_id, "video")?;
    let playlist_id = object_id(&playlist_id, "playlist")?;
    let updated = state
        .db(move |conn| {
            let tx = write_transaction(conn)?;
            owned_playlist(&tx, &playlist_id, &user.id)?;
            let updated = playlists::remove_video(&tx, &playlist_id, &video_id)?
                .ok_or_else(|| ApiError::not_found("Playlist not found"))?;
            tx.commit()?;
            Ok(updated)
        })
        .await?;
    Ok(ApiResponse::ok(updated, "Video removed from playlist successfully"))
}

async fn user_playlists(
    State(state): State<AppState>,
    _viewer: AuthUser,
    AxumPath(user_id): AxumPath<String>,
) -> ApiResult<ApiResponse<Vec<PlaylistRecord>>> {
    let user_id = object_id(&user_id, "user")?;
    let listed = state
        .db(move |conn| Ok(playlists::list_for_owner(conn, &user_id)?))
        .await?;
    Ok(ApiResponse::ok(listed, "Playlists fetched successfully"))
}

async fn channel_playlists(
    State(state): State<AppState>,
    _viewer: AuthUser,
    AxumPath(user_name): AxumPath<String>,
) -> ApiResult<ApiResponse<Vec<PlaylistRecord>>> {
    let user_name = non_blank(Some(&user_name))
        .ok_or_else(|| ApiError::bad_request("User name is required"))?
        .to_lowercase();
    let listed = state
        .db(move |conn| {
            let owner = users::find_by_user_name(conn, &user_name)?
                .ok_or_else(|| ApiError::not_found("User not found"))?;
            Ok(playlists::list_for_owner(conn, &owner.id)?)
        })
        .await?;
    Ok(ApiResponse::ok(listed, "Playlists fetched successfully"))
}
