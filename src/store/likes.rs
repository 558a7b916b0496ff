//! `likes` collection. A like row points at exactly one video, comment or
//! tweet; the partial unique indexes keep one like per user and target.

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};

use crate::models::{LikeInfo, LikeTarget, OwnerSummary, VideoDocument};

use super::{VIDEO_WITH_OWNER_COLUMNS, new_object_id, now_timestamp, row_to_owner, row_to_video};

pub fn target_exists(conn: &Connection, target: LikeTarget<'_>) -> Result<bool> {
    let table = match target {
        LikeTarget::Video(_) => "videos",
        LikeTarget::Comment(_) => "comments",
        LikeTarget::Tweet(_) => "tweets",
    };
    let found: Option<i64> = conn
        .query_row(
            &format!("SELECT 1 FROM {table} WHERE id = ?1"),
            [target.id()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Flips `user`'s like on `target` and reports the new state (`true` when
/// the target is now liked).
pub fn toggle(conn: &Connection, target: LikeTarget<'_>, user: &str) -> Result<bool> {
    let column = target.column();
    let removed = conn.execute(
        &format!("DELETE FROM likes WHERE liked_by = ?1 AND {column} = ?2"),
        params![user, target.id()],
    )?;
    if removed > 0 {
        return Ok(false);
    }

    conn.execute(
        &format!(
            "INSERT OR IGNORE INTO likes (id, {column}, liked_by, created_at) VALUES (?1, ?2, ?3, ?4)"
        ),
        params![new_object_id(), target.id(), user, now_timestamp()],
    )?;
    Ok(true)
}

pub fn info(conn: &Connection, target: LikeTarget<'_>, viewer: &str) -> Result<LikeInfo> {
    let column = target.column();
    let (total_like, is_liked): (i64, i64) = conn.query_row(
        &format!(
            "SELECT COUNT(*), COALESCE(SUM(liked_by = ?2), 0) FROM likes WHERE {column} = ?1"
        ),
        params![target.id(), viewer],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(LikeInfo {
        total_like,
        is_liked: is_liked > 0,
    })
}

/// Videos `user` liked, most recent like first.
pub fn liked_videos(conn: &Connection, user: &str) -> Result<Vec<VideoDocument<OwnerSummary>>> {
    let sql = format!(
        "SELECT {VIDEO_WITH_OWNER_COLUMNS} FROM likes l \
         JOIN videos v ON v.id = l.video \
         JOIN users u ON u.id = v.owner \
         WHERE l.liked_by = ?1 \
         ORDER BY l.created_at DESC, l.rowid DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([user])?;
    let mut videos = Vec::new();
    while let Some(row) = rows.next()? {
        let owner = row_to_owner(row)?;
        videos.push(row_to_video(row)?.with_owner(owner));
    }
    Ok(videos)
}
