//! `/api/v1/videos`: listing, upload, the watch page and owner edits.

use axum::{
    Router,
    extract::{DefaultBodyLimit, Path as AxumPath, Query, State},
    routing::{get, patch},
};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::{
    media::MediaKind,
    models::{VideoDetail, VideoPage, VideoRecord},
    store::{
        history, now_timestamp,
        videos::{self, NewVideo, VideoChanges, VideoQuery, VideoSort},
        write_transaction,
    },
};

use super::{
    ApiError, ApiResponse, ApiResult, AppState, AuthUser, BodyBytes, UploadForm,
    extract::optional_json,
    non_blank, object_id, parse_flag,
};

pub fn routes(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(list_videos)
                .post(publish_video)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/{videoId}",
            get(get_video)
                .patch(update_video)
                .delete(delete_video)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/toggle/publish/{videoId}", patch(toggle_publish))
}

/// Loads a video the viewer may watch: published ones, or their own drafts.
pub(super) fn visible_video(conn: &Connection, id: &str, viewer: &str) -> ApiResult<VideoRecord> {
    let video = videos::find_video(conn, id)?.ok_or_else(|| ApiError::not_found("Video not found"))?;
    if !video.is_published && video.owner != viewer {
        return Err(ApiError::forbidden("Video is not published"));
    }
    Ok(video)
}

fn owned_video(conn: &Connection, id: &str, user: &str) -> ApiResult<VideoRecord> {
    let video = videos::find_video(conn, id)?.ok_or_else(|| ApiError::not_found("Video not found"))?;
    if video.owner != user {
        return Err(ApiError::forbidden("You are not authorized to modify this video"));
    }
    Ok(video)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    page: Option<String>,
    limit: Option<String>,
    query: Option<String>,
    sort_by: Option<String>,
    sort_type: Option<String>,
    user_id: Option<String>,
}

impl ListParams {
    fn into_query(self) -> ApiResult<VideoQuery> {
        let mut query = VideoQuery::default();
        if let Some(page) = self.page.as_deref().and_then(|value| value.trim().parse::<i64>().ok()) {
            query.page = page.clamp(1, i64::from(u32::MAX)) as u32;
        }
        if let Some(limit) = self.limit.as_deref().and_then(|value| value.trim().parse::<i64>().ok()) {
            query.limit = limit.clamp(1, i64::from(videos::MAX_PAGE_SIZE)) as u32;
        }
        query.title_contains = non_blank(self.query.as_deref());
        if let Some(field) = non_blank(self.sort_by.as_deref()) {
            query.sort = VideoSort::from_field(&field)
                .ok_or_else(|| ApiError::bad_request(format!("Cannot sort videos by {field}")))?;
        }
        query.descending = self
            .sort_type
            .as_deref()
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("desc"));
        if let Some(user_id) = non_blank(self.user_id.as_deref()) {
            query.owner = Some(object_id(&user_id, "user")?);
        }
        Ok(query)
    }
}

async fn list_videos(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(params): Query<ListParams>,
) -> ApiResult<ApiResponse<VideoPage>> {
    let query = params.into_query()?;
    let page = state
        .db(move |conn| Ok(videos::list_published(conn, &query)?))
        .await?;
    Ok(ApiResponse::ok(page, "Videos fetched successfully"))
}

async fn publish_video(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    mut form: UploadForm,
) -> ApiResult<ApiResponse<VideoRecord>> {
    let title = non_blank(form.text("title"))
        .ok_or_else(|| ApiError::bad_request("Title is required"))?;
    let description = form.text("description").unwrap_or_default().trim().to_string();
    let is_published = match form.text("isPublished") {
        Some(value) if !value.trim().is_empty() => parse_flag(value, "isPublished")?,
        _ => false,
    };
    let declared_duration = form
        .text("duration")
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value >= 0.0);

    let thumbnail_file = form
        .take_file("thumbnail")
        .ok_or_else(|| ApiError::bad_request("Thumbnail is required"))?;
    let video_file = form
        .take_file("videoFile")
        .ok_or_else(|| ApiError::bad_request("Video is required"))?;

    let thumbnail = state.upload(thumbnail_file, MediaKind::Image).await?;
    let video_asset = match state.upload(video_file, MediaKind::Video).await {
        Ok(asset) => asset,
        Err(err) => {
            state.discard_assets(vec![thumbnail.url]).await;
            return Err(err);
        }
    };

    let duration = video_asset.duration.or(declared_duration).unwrap_or(0.0);
    let uploaded = vec![video_asset.url.clone(), thumbnail.url.clone()];
    let owner = user.id;
    let created = state
        .db(move |conn| {
            Ok(videos::insert_video(
                conn,
                &NewVideo {
                    video_file: &video_asset.url,
                    thumbnail: &thumbnail.url,
                    title: &title,
                    description: &description,
                    duration,
                    is_published,
                    owner: &owner,
                },
            )?)
        })
        .await;

    match created {
        Ok(video) => {
            info!(video = %video.id, owner = %video.owner, "video uploaded");
            Ok(ApiResponse::created(video, "Video uploaded successfully"))
        }
        Err(err) => {
            state.discard_assets(uploaded).await;
            Err(err)
        }
    }
}

async fn get_video(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AxumPath(video_id): AxumPath<String>,
) -> ApiResult<ApiResponse<VideoDetail>> {
    let video_id = object_id(&video_id, "video")?;
    let detail = state
        .db(move |conn| {
            let tx = write_transaction(conn)?;
            visible_video(&tx, &video_id, &user.id)?;
            videos::increment_views(&tx, &video_id)?;
            history::record_view(&tx, &user.id, &video_id, &now_timestamp())?;
            let detail = videos::video_detail(&tx, &video_id, &user.id)?
                .ok_or_else(|| ApiError::not_found("Video not found"))?;
            tx.commit()?;
            Ok(detail)
        })
        .await?;
    Ok(ApiResponse::ok(detail, "Video fetched successfully"))
}

async fn update_video(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AxumPath(video_id): AxumPath<String>,
    mut form: UploadForm,
) -> ApiResult<ApiResponse<VideoRecord>> {
    let video_id = object_id(&video_id, "video")?;
    let mut changes = VideoChanges {
        title: non_blank(form.text("title")),
        description: form.text("description").map(|value| value.trim().to_string()),
        ..VideoChanges::default()
    };
    if let Some(value) = form.text("isPublished").filter(|value| !value.trim().is_empty()) {
        changes.is_published = Some(parse_flag(value, "isPublished")?);
    }

    let current = state
        .db({
            let video_id = video_id.clone();
            let owner = user.id.clone();
            move |conn| owned_video(conn, &video_id, &owner)
        })
        .await?;

    let new_thumbnail = match form.take_file("thumbnail") {
        Some(file) => Some(state.upload(file, MediaKind::Image).await?),
        None => None,
    };
    changes.thumbnail = new_thumbnail.as_ref().map(|asset| asset.url.clone());

    let updated = state
        .db(move |conn| {
            videos::update_video(conn, &video_id, &changes)?
                .ok_or_else(|| ApiError::not_found("Video not found"))
        })
        .await;

    match (updated, new_thumbnail) {
        (Ok(video), Some(_)) => {
            state.discard_assets(vec![current.thumbnail]).await;
            Ok(ApiResponse::ok(video, "Video updated successfully"))
        }
        (Ok(video), None) => Ok(ApiResponse::ok(video, "Video updated successfully")),
        (Err(err), Some(asset)) => {
            state.discard_assets(vec![asset.url]).await;
            Err(err)
        }
        (Err(err), None) => Err(err),
    }
}

async fn delete_video(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AxumPath(video_id): AxumPath<String>,
) -> ApiResult<ApiResponse<Value>> {
    let video_id = object_id(&video_id, "video")?;
    let removed = state
        .db(move |conn| {
            let tx = write_transaction(conn)?;
            let video = owned_video(&tx, &video_id, &user.id)?;
            videos::delete_video(&tx, &video.id)?;
            tx.commit()?;
            Ok(video)
        })
        .await?;

    info!(video = %removed.id, "video deleted");
    state
        .discard_assets(vec![removed.video_file, removed.thumbnail])
        .await;
    Ok(ApiResponse::ok(json!({}), "Video deleted successfully"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TogglePublishRequest {
    is_published: Option<Value>,
}

async fn toggle_publish(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AxumPath(video_id): AxumPath<String>,
    BodyBytes(body): BodyBytes,
) -> ApiResult<ApiResponse<VideoRecord>> {
    let video_id = object_id(&video_id, "video")?;
    let requested = match optional_json::<TogglePublishRequest>(&body)?.and_then(|body| body.is_published) {
        None | Some(Value::Null) => None,
        Some(Value::Bool(flag)) => Some(flag),
        Some(Value::String(text)) => Some(parse_flag(&text, "isPublished")?),
        Some(_) => return Err(ApiError::bad_request("isPublished must be true or false")),
    };

    let video = state
        .db(move |conn| {
            let tx = write_transaction(conn)?;
            let current = owned_video(&tx, &video_id, &user.id)?;
            let published = requested.unwrap_or(!current.is_published);
            let video = videos::set_published(&tx, &video_id, published)?
                .ok_or_else(|| ApiError::not_found("Video not found"))?;
            tx.commit()?;
            Ok(video)
        })
        .await?;
    Ok(ApiResponse::ok(video, "Video status updated successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_params_are_clamped_and_validated() {
        let query = ListParams {
            page: Some("0".into()),
            limit: Some("1000".into()),
            query: Some("  cats ".into()),
            sort_by: Some("views".into()),
            sort_type: Some("DESC".into()),
            user_id: None,
        }
        .into_query()
        .unwrap();
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, videos::MAX_PAGE_SIZE);
        assert_eq!(query.title_contains.as_deref(), Some("cats"));
        assert_eq!(query.sort, VideoSort::Views);
        assert!(query.descending);

        let defaults = ListParams::default().into_query().unwrap();
        assert_eq!(defaults.page, 1);
        assert_eq!(defaults.limit, videos::DEFAULT_PAGE_SIZE);
        assert!(!defaults.descending);

        let bad_owner = ListParams {
            user_id: Some("nope".into()),
            ..ListParams::default()
        };
        assert_eq!(bad_owner.into_query().unwrap_err().message, "Invalid user id");

        let bad_sort = ListParams {
            sort_by: Some("password".into()),
            ..ListParams::default()
        };
        assert!(bad_sort.into_query().is_err());
    }
}
