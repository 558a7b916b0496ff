//! `/api/v1/tweets`: short text posts.

use axum::{
    Router,
    extract::{Path as AxumPath, State},
    routing::{get, patch},
};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    models::{OwnerSummary, TweetDocument, TweetRecord},
    store::{tweets, users, write_transaction},
};

use super::{ApiError, ApiResponse, ApiResult, AppState, AuthUser, JsonBody, non_blank, object_id};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tweets).post(create_tweet))
        .route("/u/{userId}", get(user_tweets))
        .route("/{tweetId}", patch(update_tweet).delete(delete_tweet))
}

#[derive(Debug, Deserialize)]
struct TweetRequest {
    content: Option<String>,
}

impl TweetRequest {
    fn content(&self) -> ApiResult<String> {
        non_blank(self.content.as_deref()).ok_or_else(|| ApiError::bad_request("Content is required"))
    }
}

fn owned_tweet(conn: &Connection, id: &str, user: &str, action: &str) -> ApiResult<TweetRecord> {
    let tweet = tweets::find_tweet(conn, id)?.ok_or_else(|| ApiError::not_found("Tweet not found"))?;
    if tweet.owner != user {
        return Err(ApiError::forbidden(format!(
            "You are not authorized to {action} this tweet"
        )));
    }
    Ok(tweet)
}

async fn list_tweets(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<ApiResponse<Vec<TweetDocument<OwnerSummary>>>> {
    let listed = state.db(|conn| Ok(tweets::list_all(conn)?)).await?;
    Ok(ApiResponse::ok(listed, "Tweets fetched successfully"))
}

async fn create_tweet(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(request): JsonBody<TweetRequest>,
) -> ApiResult<ApiResponse<TweetRecord>> {
    let content = request.content()?;
    let created = state
        .db(move |conn| Ok(tweets::insert_tweet(conn, &user.id, &content)?))
        .await?;
    Ok(ApiResponse::created(created, "Tweet created successfully"))
}

async fn user_tweets(
    State(state): State<AppState>,
    _viewer: AuthUser,
    AxumPath(user_id): AxumPath<String>,
) -> ApiResult<ApiResponse<Vec<TweetDocument<OwnerSummary>>>> {
    let user_id = object_id(&user_id, "user")?;
    let listed = state
        .db(move |conn| {
            if users::find_profile(conn, &user_id)?.is_none() {
                return Err(ApiError::not_found("User not found"));
            }
            Ok(tweets::list_for_owner(conn, &user_id)?)
        })
        .await?;
    Ok(ApiResponse::ok(listed, "Tweets fetched successfully"))
}

async fn update_tweet(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AxumPath(tweet_id): AxumPath<String>,
    JsonBody(request): JsonBody<TweetRequest>,
) -> ApiResult<ApiResponse<TweetRecord>> {
    let tweet_id = object_id(&tweet_id, "tweet")?;
    let content = request.content()?;
    let updated = state
        .db(move |conn| {
            owned_tweet(conn, &tweet_id, &user.id, "update")?;
            tweets::update_content(conn, &tweet_id, &content)?
                .ok_or_else(|| ApiError::not_found("Tweet not found"))
        })
        .await?;
    Ok(ApiResponse::ok(updated, "Tweet updated successfully"))
}

async fn delete_tweet(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AxumPath(tweet_id): AxumPath<String>,
) -> ApiResult<ApiResponse<Value>> {
    let tweet_id = object_id(&tweet_id, "tweet")?;
    state
        .db(move |conn| {
            let tx = write_transaction(conn)?;
            owned_tweet(&tx, &tweet_id, &user.id, "delete")?;
            tweets::delete_tweet(&tx, &tweet_id)?;
            tx.commit()?;
            Ok(())
        })
        .await?;
    Ok(ApiResponse::ok(json!({}), "Tweet deleted successfully"))
}
