//! `videos` collection: uploads, the public listing and the watch page.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter, types::Value};

use crate::models::{
    ChannelSummary, OwnerSummary, VideoDetail, VideoDocument, VideoPage, VideoRecord,
};

use super::{VIDEO_WITH_OWNER_COLUMNS, new_object_id, now_timestamp, row_to_owner, row_to_video};

pub const DEFAULT_PAGE_SIZE: u32 = 12;
pub const MAX_PAGE_SIZE: u32 = 100;

pub struct NewVideo<'a> {
    pub video_file: &'a str,
    pub thumbnail: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub duration: f64,
    pub is_published: bool,
    pub owner: &'a str,
}

/// Partial update; `None` leaves the column alone.
#[derive(Debug, Default)]
pub struct VideoChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_published: Option<bool>,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoSort {
    #[default]
    CreatedAt,
    Views,
    Duration,
    Title,
}

impl VideoSort {
    /// Accepts the field names the client sends (`createdAt`, `views`, ...).
    pub fn from_field(field: &str) -> Option<Self> {
        match field {
            "createdAt" => Some(Self::CreatedAt),
            "views" => Some(Self::Views),
            "duration" => Some(Self::Duration),
            "title" => Some(Self::Title),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            Self::CreatedAt => "v.created_at",
            Self::Views => "v.views",
            Self::Duration => "v.duration",
            Self::Title => "v.title",
        }
    }
}

#[derive(Debug, Clone)]
pub struct VideoQuery {
    pub page: u32,
    pub limit: u32,
    pub title_contains: Option<String>,
    pub owner: Option<String>,
    pub sort: VideoSort,
    pub descending: bool,
}

impl Default for VideoQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
            title_contains: None,
            owner: None,
            sort: VideoSort::default(),
            descending: false,
        }
    }
}

pub fn insert_video(conn: &Connection, video: &NewVideo<'_>) -> Result<VideoRecord> {
    let id = new_object_id();
    let now = now_timestamp();
    conn.execute(
        r#"
        INSERT INTO videos (
            id, video_file, thumbnail, title, description, duration,
            views, is_published, owner, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8, ?9, ?9)
        "#,
        params![
            id,
            video.video_file,
            video.thumbnail,
            video.title,
            video.description,
            video.duration,
            video.is_published,
            video.owner,
            now,
        ],
    )
    .with_context(|| format!("inserting video {:?}", video.title))?;

    find_video(conn, &id)?.context("video vanished right after insert")
}

pub fn find_video(conn: &Connection, id: &str) -> Result<Option<VideoRecord>> {
    Ok(conn
        .query_row(
            r#"
            SELECT id, video_file, thumbnail, title, description, duration,
                   views, is_published, owner, created_at, updated_at
            FROM videos
            WHERE id = ?1
            "#,
            [id],
            row_to_video,
        )
        .optional()?)
}

pub fn find_with_owner(
    conn: &Connection,
    id: &str,
) -> Result<Option<VideoDocument<OwnerSummary>>> {
    let sql = format!(
        "SELECT {VIDEO_WITH_OWNER_COLUMNS} FROM videos v JOIN users u ON u.id = v.owner \
         WHERE v.id = ?1"
    );
    Ok(conn
        .query_row(&sql, [id], |row| {
            let owner = row_to_owner(row)?;
            Ok(row_to_video(row)?.with_owner(owner))
        })
        .optional()?)
}

/// Published videos matching `query`, plus the total match count before
/// paging.
pub fn list_published(conn: &Connection, query: &VideoQuery) -> Result<VideoPage> {
    let mut clauses = vec!["v.is_published = 1".to_string()];
    let mut values: Vec<Value> = Vec::new();

    if let Some(needle) = query.title_contains.as_deref().filter(|value| !value.is_empty()) {
        values.push(Value::Text(format!("%{}%", escape_like(needle))));
        clauses.push(format!("v.title LIKE ?{} ESCAPE '\\'", values.len()));
    }
    if let Some(owner) = &query.owner {
        values.push(Value::Text(owner.clone()));
        clauses.push(format!("v.owner = ?{}", values.len()));
    }
    let where_clause = clauses.join(" AND ");

    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM videos v WHERE {where_clause}"),
        params_from_iter(values.iter()),
        |row| row.get(0),
    )?;

    let limit = query.limit.clamp(1, MAX_PAGE_SIZE);
    let page = query.page.max(1);
    let offset = u64::from(page - 1) * u64::from(limit);
    let direction = if query.descending { "DESC" } else { "ASC" };
    let sql = format!(
        "SELECT {VIDEO_WITH_OWNER_COLUMNS} FROM videos v JOIN users u ON u.id = v.owner \
         WHERE {where_clause} \
         ORDER BY {column} {direction}, v.rowid {direction} \
         LIMIT {limit} OFFSET {offset}",
        column = query.sort.column(),
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(values.iter()))?;
    let mut videos = Vec::new();
    while let Some(row) = rows.next()? {
        let owner = row_to_owner(row)?;
        videos.push(row_to_video(row)?.with_owner(owner));
    }

    Ok(VideoPage { count, videos })
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

pub fn increment_views(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("UPDATE videos SET views = views + 1 WHERE id = ?1", [id])?;
    Ok(())
}

pub fn update_video(
    conn: &Connection,
    id: &str,
    changes: &VideoChanges,
) -> Result<Option<VideoRecord>> {
    conn.execute(
        r#"
        UPDATE videos SET
            title = COALESCE(?2, title),
            description = COALESCE(?3, description),
            is_published = COALESCE(?4, is_published),
            thumbnail = COALESCE(?5, thumbnail),
            updated_at = ?6
        WHERE id = ?1
        "#,
        params![
            id,
            changes.title,
            changes.description,
            changes.is_published,
            changes.thumbnail,
            now_timestamp(),
        ],
    )?;
    find_video(conn, id)
}

pub fn set_published(conn: &Connection, id: &str, published: bool) -> Result<Option<VideoRecord>> {
    update_video(
        conn,
        id,
        &VideoChanges {
            is_published: Some(published),
            ..VideoChanges::default()
        },
    )
}

/// Deletes the video. Comments, likes (on the video and on its comments),
/// playlist entries and watch-history entries go with it through the
/// foreign-key cascades.
pub fn delete_video(conn: &Connection, id: &str) -> Result<bool> {
    let removed = conn.execute("DELETE FROM videos WHERE id = ?1", [id])?;
    Ok(removed > 0)
}

/// Everything the watch page shows: owner with subscriber count, total likes
/// and the viewer's own like/subscription state.
pub fn video_detail(conn: &Connection, id: &str, viewer: &str) -> Result<Option<VideoDetail>> {
    let sql = format!(
        r#"
        SELECT {VIDEO_WITH_OWNER_COLUMNS},
               (SELECT COUNT(*) FROM subscriptions s WHERE s.channel = v.owner) AS subscribers,
               EXISTS (
                   SELECT 1 FROM subscriptions s
                   WHERE s.channel = v.owner AND s.subscriber = ?2
               ) AS is_subscribed,
               (SELECT COUNT(*) FROM likes l WHERE l.video = v.id) AS like_count,
               EXISTS (
                   SELECT 1 FROM likes l WHERE l.video = v.id AND l.liked_by = ?2
               ) AS is_liked
        FROM videos v
        JOIN users u ON u.id = v.owner
        WHERE v.id = ?1
        "#
    );
    Ok(conn
        .query_row(&sql, params![id, viewer], |row| {
            let owner = ChannelSummary {
                id: row.get("owner")?,
                user_name: row.get("owner_user_name")?,
                full_name: row.get("owner_full_name")?,
                avatar: row.get("owner_avatar")?,
                subscribers: row.get("subscribers")?,
                is_subscribed: row.get::<_, i64>("is_subscribed").map(|value| value != 0)?,
            };
            Ok(VideoDetail {
                video: row_to_video(row)?.with_owner(owner),
                likes: row.get("like_count")?,
                is_liked: row.get::<_, i64>("is_liked").map(|value| value != 0)?,
            })
        })
        .optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{TestDb, user, video};

    #[test]
    fn listing_only_returns_published_videos() {
        let test = TestDb::new();
        let conn = test.conn();
        let alice = user(&conn, "alice");
        video(&conn, &alice.id, "public", true);
        video(&conn, &alice.id, "draft", false);

        let page = list_published(&conn, &VideoQuery::default()).unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.videos.len(), 1);
        assert_eq!(page.videos[0].title, "public");
        assert_eq!(page.videos[0].owner.user_name, "alice");
    }

    #[test]
    fn listing_filters_pages_and_sorts() {
        let test = TestDb::new();
        let conn = test.conn();
        let alice = user(&conn, "alice");
        let bob = user(&conn, "bob");
        for idx in 0..5 {
            video(&conn, &alice.id, &format!("cats {idx}"), true);
        }
        video(&conn, &bob.id, "Cats 100%", true);
        video(&conn, &bob.id, "dogs", true);

        let search = list_published(
            &conn,
            &VideoQuery {
                title_contains: Some("CATS".into()),
                ..VideoQuery::default()
            },
        )
        .unwrap();
        assert_eq!(search.count, 6);

        let literal_percent = list_published(
            &conn,
            &VideoQuery {
                title_contains: Some("100%".into()),
                ..VideoQuery::default()
            },
        )
        .unwrap();
        assert_eq!(literal_percent.count, 1);

        let second_page = list_published(
            &conn,
            &VideoQuery {
                owner: Some(alice.id.clone()),
                page: 2,
                limit: 2,
                sort: VideoSort::Title,
                descending: true,
                ..VideoQuery::default()
            },
        )
        .unwrap();
        assert_eq!(second_page.count, 5);
        let titles: Vec<_> = second_page.videos.iter().map(|v| v.title.as_str()).collect();
        assert_eq!(titles, vec!["cats 2", "cats 1"]);
    }

    #[test]
    fn update_keeps_untouched_fields() {
        let test = TestDb::new();
        let conn = test.conn();
        let alice = user(&conn, "alice");
        let original = video(&conn, &alice.id, "first", false);

        let updated = update_video(
            &conn,
            &original.id,
            &VideoChanges {
                title: Some("renamed".into()),
                ..VideoChanges::default()
            },
        )
        .unwrap()
        .unwrap();
        assert_eq!(updated.title, "renamed");
        assert_eq!(updated.thumbnail, original.thumbnail);
        assert!(!updated.is_published);

        let published = set_published(&conn, &original.id, true).unwrap().unwrap();
        assert!(published.is_published);
        assert_eq!(published.title, "renamed");
    }

    #[test]
    fn detail_counts_likes_and_subscribers() {
        let test = TestDb::new();
        let conn = test.conn();
        let alice = user(&conn, "alice");
        let bob = user(&conn, "bob");
        let clip = video(&conn, &alice.id, "clip", true);

        crate::store::likes::toggle(&conn, crate::models::LikeTarget::Video(&clip.id), &bob.id)
            .unwrap();
        crate::store::subscriptions::toggle(&conn, &bob.id, &alice.id).unwrap();
        increment_views(&conn, &clip.id).unwrap();

        let detail = video_detail(&conn, &clip.id, &bob.id).unwrap().unwrap();
        assert_eq!(detail.likes, 1);
        assert!(detail.is_liked);
        assert_eq!(detail.video.views, 1);
        assert_eq!(detail.video.owner.subscribers, 1);
        assert!(detail.video.owner.is_subscribed);

        let as_owner = video_detail(&conn, &clip.id, &alice.id).unwrap().unwrap();
        assert!(!as_owner.is_liked);
        assert!(!as_owner.video.owner.is_subscribed);
    }

    #[test]
    fn delete_cascades_to_dependents() {
        let test = TestDb::new();
        let conn = test.conn();
        let alice = user(&conn, "alice");
        let bob = user(&conn, "bob");
        let clip = video(&conn, &alice.id, "clip", true);
        let comment =
            crate::store::comments::insert_comment(&conn, &clip.id, &bob.id, "nice").unwrap();
        crate::store::likes::toggle(&conn, crate::models::LikeTarget::Comment(&comment.id), &alice.id)
            .unwrap();
        crate::store::likes::toggle(&conn, crate::models::LikeTarget::Video(&clip.id), &bob.id)
            .unwrap();
        crate::store::history::record_view(&conn, &bob.id, &clip.id, &crate::store::now_timestamp())
            .unwrap();

        assert!(delete_video(&conn, &clip.id).unwrap());
        assert!(find_video(&conn, &clip.id).unwrap().is_none());
        let leftover_likes: i64 = conn
            .query_row("SELECT COUNT(*) FROM likes", [], |row| row.get(0))
            .unwrap();
        assert_eq!(leftover_likes, 0);
        let leftover_comments: i64 = conn
            .query_row("SELECT COUNT(*) FROM comments", [], |row| row.get(0))
            .unwrap();
        assert_eq!(leftover_comments, 0);
        assert!(crate::store::history::list(&conn, &bob.id).unwrap().is_empty());
        assert!(!delete_video(&conn, &clip.id).unwrap());
    }
}
