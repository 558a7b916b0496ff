//! `/api/v1/users`: accounts, sessions, profile images, channel pages and
//! watch history.

use axum::{
    Router,
    extract::{DefaultBodyLimit, Path as AxumPath, State},
    http::{HeaderMap, HeaderName, header},
    response::{AppendHeaders, IntoResponse, Response},
    routing::{get, patch, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::{
    auth::{hash_password, password_meets_policy, verify_password},
    media::MediaKind,
    models::{ChannelProfile, UserProfile, WatchHistoryEntry},
    store::{format_timestamp, history, users, write_transaction},
};

use super::{
    ApiError, ApiResponse, ApiResult, AppState, AuthUser, BodyBytes, JsonBody, UploadForm,
    conflict_if_duplicate,
    extract::{ACCESS_COOKIE, REFRESH_COOKIE, cookie_value, optional_json},
    non_blank, object_id,
};

const ACCESS_COOKIE_MAX_AGE: i64 = 24 * 60 * 60;
const REFRESH_COOKIE_MAX_AGE: i64 = 15 * 24 * 60 * 60;

pub fn routes(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/register",
            post(register).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/refresh-token", post(refresh_token))
        .route("/change-password", post(change_password))
        .route("/current-user", get(current_user))
        .route("/update-account", patch(update_account))
        .route(
            "/update-avatar",
            patch(update_avatar).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/update-cover-image",
            patch(update_cover_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/c/{username}", get(channel_profile))
        .route("/watch-history", get(watch_history).patch(clear_watch_history))
        .route("/watch-history/{videoId}", patch(remove_from_watch_history))
}

async fn register(
    State(state): State<AppState>,
    mut form: UploadForm,
) -> ApiResult<ApiResponse<UserProfile>> {
    let (Some(user_name), Some(full_name), Some(email), Some(password)) = (
        non_blank(form.text("userName")),
        non_blank(form.text("fullName")),
        non_blank(form.text("email")),
        non_blank(form.text("password")),
    ) else {
        return Err(ApiError::bad_request("All fields are required"));
    };
    let user_name = user_name.to_lowercase();

    let taken = state
        .db({
            let user_name = user_name.clone();
            let email = email.clone();
            move |conn| Ok(users::exists_with_user_name_or_email(conn, &user_name, &email)?)
        })
        .await?;
    if taken {
        return Err(ApiError::conflict("User already exists"));
    }

    let avatar_file = form
        .take_file("avatar")
        .ok_or_else(|| ApiError::bad_request("Avatar is required"))?;
    let cover_file = form.take_file("coverImage");

    let avatar = state.upload(avatar_file, MediaKind::Image).await?;
    let cover_image = match cover_file {
        Some(file) => match state.upload(file, MediaKind::Image).await {
            Ok(asset) => asset.url,
            Err(err) => {
                state.discard_assets(vec![avatar.url]).await;
                return Err(err);
            }
        },
        None => String::new(),
    };

    let uploaded = vec![avatar.url.clone(), cover_image.clone()];
    let created = state
        .db(move |conn| {
            let password_hash = hash_password(&password)?;
            users::create_user(
                conn,
                &users::NewUser {
                    user_name: &user_name,
                    email: &email,
                    full_name: &full_name,
                    avatar: &avatar.url,
                    cover_image: &cover_image,
                    password_hash: &password_hash,
                },
            )
            .map_err(conflict_if_duplicate("User already exists"))
        })
        .await;

    match created {
        Ok(user) => {
            info!(user = %user.id, user_name = %user.user_name, "registered user");
            Ok(ApiResponse::created(user, "User registered successfully"))
        }
        Err(err) => {
            state.discard_assets(uploaded).await;
            Err(err)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    user_name: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginData {
    user: UserProfile,
    access_token: String,
    refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenPair {
    access_token: String,
    refresh_token: String,
}

async fn login(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> ApiResult<Response> {
    let user_name = non_blank(request.user_name.as_deref());
    let email = non_blank(request.email.as_deref());
    if user_name.is_none() && email.is_none() {
        return Err(ApiError::bad_request("username or email required"));
    }
    let password = request
        .password
        .filter(|password| !password.is_empty())
        .ok_or_else(|| ApiError::bad_request("Password is required"))?;

    let user = state
        .db(move |conn| {
            let user = users::find_for_login(conn, user_name.as_deref(), email.as_deref())?
                .ok_or_else(|| ApiError::not_found("User does not exist"))?;
            if !verify_password(&password, &user.password_hash) {
                return Err(ApiError::unauthorized("Invalid user credentials"));
            }
            Ok(user.profile)
        })
        .await?;

    let tokens = start_session(&state, &user).await?;
    info!(user = %user.id, "user logged in");
    Ok((
        session_cookies(&state, &tokens),
        ApiResponse::ok(
            LoginData {
                user,
                access_token: tokens.access_token,
                refresh_token: tokens.refresh_token,
            },
            "User logged in successfully",
        ),
    )
        .into_response())
}

async fn logout(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<Response> {
    let id = user.id.clone();
    state
        .db(move |conn| Ok(users::set_refresh_token(conn, &id, None)?))
        .await?;
    info!(user = %user.id, "user logged out");

    let secure = state.config.cookie_secure;
    Ok((
        AppendHeaders([
            (header::SET_COOKIE, build_cookie(ACCESS_COOKIE, "", 0, secure)),
            (header::SET_COOKIE, build_cookie(REFRESH_COOKIE, "", 0, secure)),
        ]),
        ApiResponse::ok(json!({}), "User logged out successfully"),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    refresh_token: Option<String>,
}

async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    BodyBytes(body): BodyBytes,
) -> ApiResult<Response> {
    let from_body = optional_json::<RefreshRequest>(&body)?.and_then(|body| body.refresh_token);
    let incoming = cookie_value(&headers, REFRESH_COOKIE)
        .or(from_body)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Unauthorized request"))?;

    let claims = state
        .sessions
        .verify_refresh(&incoming)
        .map_err(|_| ApiError::unauthorized("Invalid refresh token"))?;

    let user = state
        .db(move |conn| {
            let user = users::find_by_id(conn, &claims.id)?
                .ok_or_else(|| ApiError::unauthorized("Invalid refresh token"))?;
            let matches = user
                .refresh_token
                .as_deref()
                .is_some_and(|stored| bool::from(stored.as_bytes().ct_eq(incoming.as_bytes())));
            if !matches {
                return Err(ApiError::unauthorized("Refresh token is expired or used"));
            }
            Ok(user.profile)
        })
        .await?;

    let tokens = start_session(&state, &user).await?;
    Ok((
        session_cookies(&state, &tokens),
        ApiResponse::ok(tokens, "Access token refreshed successfully"),
    )
        .into_response())
}

/// Issues a fresh token pair and records the refresh token on the user, which
/// invalidates any earlier one.
async fn start_session(state: &AppState, user: &UserProfile) -> ApiResult<TokenPair> {
    let tokens = TokenPair {
        access_token: state.sessions.issue_access(user)?,
        refresh_token: state.sessions.issue_refresh(&user.id)?,
    };
    let id = user.id.clone();
    let refresh = tokens.refresh_token.clone();
    state
        .db(move |conn| Ok(users::set_refresh_token(conn, &id, Some(&refresh))?))
        .await?;
    Ok(tokens)
}

fn session_cookies(state: &AppState, tokens: &TokenPair) -> AppendHeaders<[(HeaderName, String); 2]> {
    let secure = state.config.cookie_secure;
    AppendHeaders([
        (
            header::SET_COOKIE,
            build_cookie(ACCESS_COOKIE, &tokens.access_token, ACCESS_COOKIE_MAX_AGE, secure),
        ),
        (
            header::SET_COOKIE,
            build_cookie(REFRESH_COOKIE, &tokens.refresh_token, REFRESH_COOKIE_MAX_AGE, secure),
        ),
    ])
}

fn build_cookie(name: &str, value: &str, max_age: i64, secure: bool) -> String {
    let mut cookie = format!("{name}={value}; Max-Age={max_age}; Path=/; HttpOnly");
    if secure {
        cookie.push_str("; Secure; SameSite=None");
    }
    cookie
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest {
    old_password: Option<String>,
    new_password: Option<String>,
}

async fn change_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(request): JsonBody<ChangePasswordRequest>,
) -> ApiResult<ApiResponse<Value>> {
    let (Some(old_password), Some(new_password)) = (
        request.old_password.filter(|value| !value.is_empty()),
        request.new_password.filter(|value| !value.is_empty()),
    ) else {
        return Err(ApiError::bad_request("All fields are required"));
    };
    if !password_meets_policy(&new_password) {
        return Err(ApiError::bad_request(
            "Password must be at least 8 characters long and contain at least one letter, one number, and one special character",
        ));
    }

    let id = user.id.clone();
    state
        .db(move |conn| {
            let record = users::find_by_id(conn, &id)?
                .ok_or_else(|| ApiError::unauthorized("Invalid access token"))?;
            if !verify_password(&old_password, &record.password_hash) {
                return Err(ApiError::bad_request("Old password is incorrect"));
            }
            users::set_password_hash(conn, &id, &hash_password(&new_password)?)?;
            Ok(())
        })
        .await?;

    info!(user = %user.id, "password changed");
    Ok(ApiResponse::ok(json!({}), "Password changed successfully"))
}

async fn current_user(AuthUser(user): AuthUser) -> ApiResponse<UserProfile> {
    ApiResponse::ok(user, "Current user fetched successfully")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateAccountRequest {
    full_name: Option<String>,
    email: Option<String>,
}

async fn update_account(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(request): JsonBody<UpdateAccountRequest>,
) -> ApiResult<ApiResponse<UserProfile>> {
    let (Some(full_name), Some(email)) = (
        non_blank(request.full_name.as_deref()),
        non_blank(request.email.as_deref()),
    ) else {
        return Err(ApiError::bad_request("All fields are required"));
    };

    let id = user.id;
    let updated = state
        .db(move |conn| {
            let owner = users::find_by_email(conn, &email)?;
            if owner.is_some_and(|other| other.id != id) {
                return Err(ApiError::conflict("Email already exists"));
            }
            users::update_account(conn, &id, &full_name, &email)
                .map_err(conflict_if_duplicate("Email already exists"))?
                .ok_or_else(|| ApiError::unauthorized("Invalid access token"))
        })
        .await?;

    Ok(ApiResponse::ok(updated, "Account details updated successfully"))
}

async fn update_avatar(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    form: UploadForm,
) -> ApiResult<ApiResponse<UserProfile>> {
    replace_profile_image(state, user, form, users::ProfileImage::Avatar, "avatar").await
}

async fn update_cover_image(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    form: UploadForm,
) -> ApiResult<ApiResponse<UserProfile>> {
    replace_profile_image(state, user, form, users::ProfileImage::CoverImage, "coverImage").await
}

async fn replace_profile_image(
    state: AppState,
    user: UserProfile,
    mut form: UploadForm,
    slot: users::ProfileImage,
    field: &str,
) -> ApiResult<ApiResponse<UserProfile>> {
    let file = form
        .take_file(field)
        .ok_or_else(|| ApiError::bad_request(format!("{} is missing", slot.label())))?;
    let previous = match slot {
        users::ProfileImage::Avatar => user.avatar.clone(),
        users::ProfileImage::CoverImage => user.cover_image.clone(),
    };

    let asset = state.upload(file, MediaKind::Image).await?;
    let id = user.id;
    let url = asset.url.clone();
    let updated = state
        .db(move |conn| {
            users::set_profile_image(conn, &id, slot, &url)?
                .ok_or_else(|| ApiError::unauthorized("Invalid access token"))
        })
        .await;

    match updated {
        Ok(profile) => {
            state.discard_assets(vec![previous]).await;
            Ok(ApiResponse::ok(
                profile,
                format!("{} updated successfully", slot.label()),
            ))
        }
        Err(err) => {
            warn!(url = %asset.url, "dropping upload after failed profile update");
            state.discard_assets(vec![asset.url]).await;
            Err(err)
        }
    }
}

async fn channel_profile(
    State(state): State<AppState>,
    AuthUser(viewer): AuthUser,
    AxumPath(username): AxumPath<String>,
) -> ApiResult<ApiResponse<ChannelProfile>> {
    let user_name = non_blank(Some(&username))
        .ok_or_else(|| ApiError::bad_request("User name is required"))?
        .to_lowercase();
    let profile = state
        .db(move |conn| Ok(users::channel_profile(conn, &user_name, &viewer.id)?))
        .await?
        .ok_or_else(|| ApiError::not_found("Channel does not exist"))?;
    Ok(ApiResponse::ok(profile, "Channel profile fetched successfully"))
}

async fn watch_history(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<ApiResponse<Vec<WatchHistoryEntry>>> {
    let cutoff = Utc::now()
        .checked_sub_signed(state.config.watch_history_retention)
        .map(format_timestamp)
        .ok_or_else(|| ApiError::internal("watch history retention overflows the calendar"))?;
    let entries = state
        .db(move |conn| {
            let tx = write_transaction(conn)?;
            let expired = history::expire_before(&tx, &user.id, &cutoff)?;
            let entries = history::list(&tx, &user.id)?;
            tx.commit()?;
            if expired > 0 {
                info!(user = %user.id, expired, "pruned watch history");
            }
            Ok(entries)
        })
        .await?;
    Ok(ApiResponse::ok(entries, "Watch history fetched successfully"))
}

async fn clear_watch_history(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<ApiResponse<Vec<WatchHistoryEntry>>> {
    state
        .db(move |conn| Ok(history::clear(conn, &user.id)?))
        .await?;
    Ok(ApiResponse::ok(Vec::new(), "Watch history cleared successfully"))
}

async fn remove_from_watch_history(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AxumPath(video_id): AxumPath<String>,
) -> ApiResult<ApiResponse<Vec<WatchHistoryEntry>>> {
    let video_id = object_id(&video_id, "video")?;
    let remaining = state
        .db(move |conn| {
            history::remove_video(conn, &user.id, &video_id)?;
            Ok(history::list(conn, &user.id)?)
        })
        .await?;
    Ok(ApiResponse::ok(
        remaining,
        "Video removed from watch history successfully",
    ))
}
