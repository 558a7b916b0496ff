//! `comments` collection.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::models::{CommentDocument, CommentRecord, OwnerSummary};

use super::{new_object_id, now_timestamp, row_to_owner};

const COMMENT_WITH_OWNER: &str = r#"
    SELECT c.id AS id, c.content AS content, c.video AS video, c.owner AS owner,
           c.created_at AS created_at, c.updated_at AS updated_at,
           u.user_name AS owner_user_name, u.full_name AS owner_full_name,
           u.avatar AS owner_avatar
    FROM comments c
    JOIN users u ON u.id = c.owner
"#;

pub fn insert_comment(
    conn: &Connection,
    video: &str,
    owner: &str,
    content: &str,
) -> Result<CommentDocument<OwnerSummary>> {
    let id = new_object_id();
    let now = now_timestamp();
    conn.execute(
        r#"
        INSERT INTO comments (id, content, video, owner, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?5)
        "#,
        params![id, content, video, owner, now],
    )?;
    find_with_owner(conn, &id)?.context("comment vanished right after insert")
}

pub fn find_comment(conn: &Connection, id: &str) -> Result<Option<CommentRecord>> {
    Ok(conn
        .query_row(
            "SELECT id, content, video, owner, created_at, updated_at FROM comments WHERE id = ?1",
            [id],
            row_to_comment,
        )
        .optional()?)
}

pub fn find_with_owner(
    conn: &Connection,
    id: &str,
) -> Result<Option<CommentDocument<OwnerSummary>>> {
    let sql = format!("{COMMENT_WITH_OWNER} WHERE c.id = ?1");
    Ok(conn
        .query_row(&sql, [id], row_to_populated_comment)
        .optional()?)
}

/// All comments on `video`, oldest first.
pub fn list_for_video(conn: &Connection, video: &str) -> Result<Vec<CommentDocument<OwnerSummary>>> {
    let sql = format!("{COMMENT_WITH_OWNER} WHERE c.video = ?1 ORDER BY c.created_at ASC, c.rowid ASC");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([video])?;
    let mut comments = Vec::new();
    while let Some(row) = rows.next()? {
        comments.push(row_to_populated_comment(row)?);
    }
    Ok(comments)
}

/// Moves the viewer's own comments to the front, keeping the relative order
/// inside both groups. Without any viewer comment the list is unchanged.
pub fn viewer_first(
    comments: Vec<CommentDocument<OwnerSummary>>,
    viewer: &str,
) -> Vec<CommentDocument<OwnerSummary>> {
    let (mut own, others): (Vec<_>, Vec<_>) = comments
        .into_iter()
        .partition(|comment| comment.owner.id == viewer);
    own.extend(others);
    own
}

pub fn update_content(
    conn: &Connection,
    id: &str,
    content: &str,
) -> Result<Option<CommentDocument<OwnerSummary>>> {
    conn.execute(
        "UPDATE comments SET content = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, content, now_timestamp()],
    )?;
    find_with_owner(conn, id)
}

/// Removes the comment; its likes follow through the cascade.
pub fn delete_comment(conn: &Connection, id: &str) -> Result<bool> {
    Ok(conn.execute("DELETE FROM comments WHERE id = ?1", [id])? > 0)
}

fn row_to_comment(row: &Row<'_>) -> rusqlite::Result<CommentRecord> {
    Ok(CommentDocument {
        id: row.get("id")?,
        content: row.get("content")?,
        video: row.get("video")?,
        owner: row.get("owner")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_populated_comment(row: &Row<'_>) -> rusqlite::Result<CommentDocument<OwnerSummary>> {
    let owner = row_to_owner(row)?;
    Ok(row_to_comment(row)?.with_owner(owner))
}
