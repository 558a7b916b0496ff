//! `/api/v1/subscriptions`: channel subscriptions.

use axum::{
    Router,
    extract::{Path as AxumPath, State},
    routing::get,
};
use serde::Serialize;
use tracing::info;

use crate::{
    models::{ChannelListing, SubscriptionRecord},
    store::{subscriptions, users, write_transaction},
};

use super::{
    ApiError, ApiResponse, ApiResult, AppState, AuthUser, conflict_if_duplicate, object_id,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/c/{channelId}", get(channel_subscribers).post(toggle_subscription))
        .route("/u/{subscriberId}", get(subscribed_channels))
        .route("/status/{channelId}", get(subscription_status))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToggleResult {
    is_subscribed: bool,
    data: SubscriptionRecord,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionStatus {
    is_subscribed: bool,
}

async fn toggle_subscription(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AxumPath(channel_id): AxumPath<String>,
) -> ApiResult<ApiResponse<ToggleResult>> {
    let channel_id = object_id(&channel_id, "channel")?;
    if channel_id == user.id {
        return Err(ApiError::bad_request("You cannot subscribe to yourself"));
    }

    let subscriber = user.id.clone();
    let channel = channel_id.clone();
    let (is_subscribed, record) = state
        .db(move |conn| {
            let tx = write_transaction(conn)?;
            if users::find_profile(&tx, &channel)?.is_none() {
                return Err(ApiError::not_found("Channel not found"));
            }
            let toggled = subscriptions::toggle(&tx, &subscriber, &channel)
                .map_err(conflict_if_duplicate("Subscription changed concurrently"))?;
            tx.commit()?;
            Ok(toggled)
        })
        .await?;

    info!(subscriber = %user.id, channel = %channel_id, is_subscribed, "subscription toggled");
    let message = if is_subscribed {
        format!("Subscribed to {channel_id}")
    } else {
        format!("Unsubscribed to {channel_id}")
    };
    Ok(ApiResponse::ok(
        ToggleResult {
            is_subscribed,
            data: record,
        },
        message,
    ))
}

async fn channel_subscribers(
    State(state): State<AppState>,
    _viewer: AuthUser,
    AxumPath(channel_id): AxumPath<String>,
) -> ApiResult<ApiResponse<Vec<ChannelListing>>> {
    let channel_id = object_id(&channel_id, "channel")?;
    let listed = state
        .db(move |conn| Ok(subscriptions::subscribers_of(conn, &channel_id)?))
        .await?;
    Ok(ApiResponse::ok(listed, "Subscribers fetched successfully"))
}

async fn subscribed_channels(
    State(state): State<AppState>,
    _viewer: AuthUser,
    AxumPath(subscriber_id): AxumPath<String>,
) -> ApiResult<ApiResponse<Vec<ChannelListing>>> {
    let subscriber_id = object_id(&subscriber_id, "subscriber")?;
    let listed = state
        .db(move |conn| Ok(subscriptions::channels_of(conn, &subscriber_id)?))
        .await?;
    Ok(ApiResponse::ok(listed, "Subscriptions fetched successfully"))
}

async fn subscription_status(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AxumPath(channel_id): AxumPath<String>,
) -> ApiResult<ApiResponse<SubscriptionStatus>> {
    let channel_id = object_id(&channel_id, "channel")?;
    if channel_id == user.id {
        return Err(ApiError::bad_request("You cannot subscribe to yourself"));
    }
    let is_subscribed = state
        .db(move |conn| Ok(subscriptions::is_subscribed(conn, &user.id, &channel_id)?))
        .await?;
    Ok(ApiResponse::ok(
        SubscriptionStatus { is_subscribed },
        "Subscription status fetched successfully",
    ))
}
