//! Records stored in SQLite and the shapes the API serializes.
//!
//! Field names follow the JSON contract the web client already speaks
//! (camelCase, `_id` for identifiers). Documents that can embed a related user
//! are generic over the owner type so the raw row (`String` id) and the
//! populated form (`OwnerSummary`) share one definition.

use serde::{Deserialize, Serialize};

/// Public view of an account. Never carries the password hash or refresh
/// token; those only live on [`UserRecord`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_name: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    #[serde(default)]
    pub cover_image: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Full `users` row.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub profile: UserProfile,
    pub password_hash: String,
    pub refresh_token: Option<String>,
}

/// The handful of user fields embedded wherever content shows its author.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OwnerSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_name: String,
    pub full_name: String,
    pub avatar: String,
}

impl From<&UserProfile> for OwnerSummary {
    fn from(profile: &UserProfile) -> Self {
        Self {
            id: profile.id.clone(),
            user_name: profile.user_name.clone(),
            full_name: profile.full_name.clone(),
            avatar: profile.avatar.clone(),
        }
    }
}

/// Owner block on the single-video page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_name: String,
    pub full_name: String,
    pub avatar: String,
    pub subscribers: i64,
    pub is_subscribed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoDocument<O> {
    #[serde(rename = "_id")]
    pub id: String,
    pub video_file: String,
    pub thumbnail: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub duration: f64,
    pub views: i64,
    pub is_published: bool,
    pub owner: O,
    pub created_at: String,
    pub updated_at: String,
}

/// A `videos` row as stored.
pub type VideoRecord = VideoDocument<String>;

impl<O> VideoDocument<O> {
    pub fn with_owner<P>(self, owner: P) -> VideoDocument<P> {
        VideoDocument {
            id: self.id,
            video_file: self.video_file,
            thumbnail: self.thumbnail,
            title: self.title,
            description: self.description,
            duration: self.duration,
            views: self.views,
            is_published: self.is_published,
            owner,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Response of `GET /videos/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDetail {
    #[serde(flatten)]
    pub video: VideoDocument<ChannelSummary>,
    pub likes: i64,
    pub is_liked: bool,
}

/// One page of the public video listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoPage {
    pub count: i64,
    pub videos: Vec<VideoDocument<OwnerSummary>>,
}

/// Dashboard rows: everything but the media URL, plus engagement counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelVideo {
    #[serde(rename = "_id")]
    pub id: String,
    pub thumbnail: String,
    pub title: String,
    pub description: String,
    pub duration: f64,
    pub views: i64,
    pub is_published: bool,
    pub owner: String,
    pub created_at: String,
    pub updated_at: String,
    pub likes_count: i64,
    pub comments_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommentDocument<O> {
    #[serde(rename = "_id")]
    pub id: String,
    pub content: String,
    pub video: String,
    pub owner: O,
    pub created_at: String,
    pub updated_at: String,
}

pub type CommentRecord = CommentDocument<String>;

impl<O> CommentDocument<O> {
    pub fn with_owner<P>(self, owner: P) -> CommentDocument<P> {
        CommentDocument {
            id: self.id,
            content: self.content,
            video: self.video,
            owner,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TweetDocument<O> {
    #[serde(rename = "_id")]
    pub id: String,
    pub content: String,
    pub owner: O,
    pub created_at: String,
    pub updated_at: String,
}

pub type TweetRecord = TweetDocument<String>;

impl<O> TweetDocument<O> {
    pub fn with_owner<P>(self, owner: P) -> TweetDocument<P> {
        TweetDocument {
            id: self.id,
            content: self.content,
            owner,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Playlists carry their videos in insertion order. `V` is a bare id when
/// stored and a [`PlaylistVideo`] once populated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistDocument<O, V> {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub videos: Vec<V>,
    pub owner: O,
    pub created_at: String,
    pub updated_at: String,
}

pub type PlaylistRecord = PlaylistDocument<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistVideo {
    #[serde(rename = "_id")]
    pub id: String,
    pub thumbnail: String,
    pub title: String,
    pub duration: f64,
    pub views: i64,
    pub created_at: String,
    pub owner: OwnerSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub subscriber: String,
    pub channel: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Entry in subscriber / subscribed-channel lists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelListing {
    #[serde(rename = "_id")]
    pub id: String,
    pub avatar: String,
    pub user_name: String,
    pub full_name: String,
    pub subscribers_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelProfile {
    #[serde(rename = "_id")]
    pub id: String,
    pub full_name: String,
    pub user_name: String,
    pub avatar: String,
    pub cover_image: String,
    pub subscriber_count: i64,
    pub subscribed_to_count: i64,
    pub is_subscribed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStats {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_name: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: String,
    pub subscribers_count: i64,
    pub videos_count: i64,
    pub total_views: i64,
    pub total_likes: i64,
    pub tweets_count: i64,
    pub playlists_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchHistoryEntry {
    pub video: VideoDocument<OwnerSummary>,
    pub timestamp: String,
}

/// What a like points at. Exactly one target per like row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeTarget<'a> {
    Video(&'a str),
    Comment(&'a str),
    Tweet(&'a str),
}

impl<'a> LikeTarget<'a> {
    pub fn id(&self) -> &'a str {
        match self {
            Self::Video(id) | Self::Comment(id) | Self::Tweet(id) => id,
        }
    }

    /// Column in the `likes` table holding this kind of target.
    pub(crate) fn column(&self) -> &'static str {
        match self {
            Self::Video(_) => "video",
            Self::Comment(_) => "comment",
            Self::Tweet(_) => "tweet",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Video(_) => "Video",
            Self::Comment(_) => "Comment",
            Self::Tweet(_) => "Tweet",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LikeInfo {
    pub total_like: i64,
    pub is_liked: bool,
}
