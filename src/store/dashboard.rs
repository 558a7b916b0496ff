//! Channel statistics for the creator dashboard.

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

use crate::models::{ChannelStats, ChannelVideo};

pub fn channel_stats(conn: &Connection, channel: &str) -> Result<Option<ChannelStats>> {
    Ok(conn
        .query_row(
            r#"
            SELECT u.id AS id, u.user_name AS user_name, u.full_name AS full_name,
                   u.avatar AS avatar, u.cover_image AS cover_image,
                   (SELECT COUNT(*) FROM subscriptions s WHERE s.channel = u.id) AS subscribers_count,
                   (SELECT COUNT(*) FROM videos v WHERE v.owner = u.id) AS videos_count,
                   (SELECT COALESCE(SUM(v.views), 0) FROM videos v WHERE v.owner = u.id) AS total_views,
                   (SELECT COUNT(*) FROM likes l JOIN videos v ON v.id = l.video
                     WHERE v.owner = u.id) AS total_likes,
                   (SELECT COUNT(*) FROM tweets t WHERE t.owner = u.id) AS tweets_count,
                   (SELECT COUNT(*) FROM playlists p WHERE p.owner = u.id) AS playlists_count
            FROM users u
            WHERE u.id = ?1
            "#,
            [channel],
            |row| {
                Ok(ChannelStats {
                    id: row.get("id")?,
                    user_name: row.get("user_name")?,
                    full_name: row.get("full_name")?,
                    avatar: row.get("avatar")?,
                    cover_image: row.get("cover_image")?,
                    subscribers_count: row.get("subscribers_count")?,
                    videos_count: row.get("videos_count")?,
                    total_views: row.get("total_views")?,
                    total_likes: row.get("total_likes")?,
                    tweets_count: row.get("tweets_count")?,
                    playlists_count: row.get("playlists_count")?,
                })
            },
        )
        .optional()?)
}

/// Every video of the channel, drafts included, newest first.
pub fn channel_videos(conn: &Connection, channel: &str) -> Result<Vec<ChannelVideo>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT v.id AS id, v.thumbnail AS thumbnail, v.title AS title,
               v.description AS description, v.duration AS duration, v.views AS views,
               v.is_published AS is_published, v.owner AS owner,
               v.created_at AS created_at, v.updated_at AS updated_at,
               (SELECT COUNT(*) FROM likes l WHERE l.video = v.id) AS likes_count,
               (SELECT COUNT(*) FROM comments c WHERE c.video = v.id) AS comments_count
        FROM videos v
        WHERE v.owner = ?1
        ORDER BY v.created_at DESC, v.rowid DESC
        "#,
    )?;
    let rows = stmt.query_map([channel], |row| {
        Ok(ChannelVideo {
            id: row.get("id")?,
            thumbnail: row.get("thumbnail")?,
            title: row.get("title")?,
            description: row.get("description")?,
            duration: row.get("duration")?,
            views: row.get("views")?,
            is_published: row.get::<_, i64>("is_published").map(|value| value != 0)?,
            owner: row.get("owner")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            likes_count: row.get("likes_count")?,
            comments_count: row.get("comments_count")?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LikeTarget;
    use crate::store::testing::{TestDb, user, video};
    use crate::store::{comments, likes, playlists, subscriptions, tweets, videos};

    #[test]
    fn stats_aggregate_across_collections() {
        let test = TestDb::new();
        let conn = test.conn();
        let alice = user(&conn, "alice");
        let bob = user(&conn, "bob");
        let carol = user(&conn, "carol");

        let first = video(&conn, &alice.id, "first", true);
        let second = video(&conn, &alice.id, "second", false);
        let bobs = video(&conn, &bob.id, "bobs", true);
        for _ in 0..3 {
            videos::increment_views(&conn, &first.id).unwrap();
        }
        videos::increment_views(&conn, &second.id).unwrap();
        videos::increment_views(&conn, &bobs.id).unwrap();

        likes::toggle(&conn, LikeTarget::Video(&first.id), &bob.id).unwrap();
        likes::toggle(&conn, LikeTarget::Video(&second.id), &carol.id).unwrap();
        likes::toggle(&conn, LikeTarget::Video(&bobs.id), &alice.id).unwrap();
        subscriptions::toggle(&conn, &bob.id, &alice.id).unwrap();
        tweets::insert_tweet(&conn, &alice.id, "hi").unwrap();
        playlists::insert_playlist(&conn, &alice.id, "p", "").unwrap();
        playlists::insert_playlist(&conn, &alice.id, "q", "").unwrap();

        let stats = channel_stats(&conn, &alice.id).unwrap().unwrap();
        assert_eq!(stats.subscribers_count, 1);
        assert_eq!(stats.videos_count, 2);
        assert_eq!(stats.total_views, 4);
        assert_eq!(stats.total_likes, 2);
        assert_eq!(stats.tweets_count, 1);
        assert_eq!(stats.playlists_count, 2);
    }

    #[test]
    fn empty_channel_has_zeroed_stats() {
        let test = TestDb::new();
        let conn = test.conn();
        let alice = user(&conn, "alice");
        let stats = channel_stats(&conn, &alice.id).unwrap().unwrap();
        assert_eq!(stats.total_views, 0);
        assert_eq!(stats.videos_count, 0);
        assert!(channel_stats(&conn, "000000000000000000000000").unwrap().is_none());
    }

    #[test]
    fn channel_videos_include_drafts_and_counts() {
        let test = TestDb::new();
        let conn = test.conn();
        let alice = user(&conn, "alice");
        let bob = user(&conn, "bob");
        let public = video(&conn, &alice.id, "public", true);
        video(&conn, &alice.id, "draft", false);
        comments::insert_comment(&conn, &public.id, &bob.id, "wow").unwrap();
        comments::insert_comment(&conn, &public.id, &alice.id, "thanks").unwrap();
        likes::toggle(&conn, LikeTarget::Video(&public.id), &bob.id).unwrap();

        let listed = channel_videos(&conn, &alice.id).unwrap();
        assert_eq!(listed.len(), 2);
        let public_row = listed.iter().find(|v| v.id == public.id).unwrap();
        assert_eq!(public_row.likes_count, 1);
        assert_eq!(public_row.comments_count, 2);
        assert!(listed.iter().any(|v| !v.is_published));
    }
}
