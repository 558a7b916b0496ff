//! `playlists` collection. Membership lives in `playlist_videos`, ordered by
//! insertion; a video appears at most once per playlist.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::models::{OwnerSummary, PlaylistDocument, PlaylistRecord, PlaylistVideo};

use super::{new_object_id, now_timestamp, row_to_owner};

pub fn insert_playlist(
    conn: &Connection,
    owner: &str,
    name: &str,
    description: &str,
) -> Result<PlaylistRecord> {
    let id = new_object_id();
    let now = now_timestamp();
    conn.execute(
        r#"
        INSERT INTO playlists (id, name, description, owner, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?5)
        "#,
        params![id, name, description, owner, now],
    )?;
    find_playlist(conn, &id)?.context("playlist vanished right after insert")
}

pub fn find_playlist(conn: &Connection, id: &str) -> Result<Option<PlaylistRecord>> {
    let playlist = conn
        .query_row(
            "SELECT id, name, description, owner, created_at, updated_at FROM playlists WHERE id = ?1",
            [id],
            row_to_playlist,
        )
        .optional()?;
    match playlist {
        Some(mut playlist) => {
            playlist.videos = video_ids(conn, &playlist.id)?;
            Ok(Some(playlist))
        }
        None => Ok(None),
    }
}

fn video_ids(conn: &Connection, playlist: &str) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT video FROM playlist_videos WHERE playlist = ?1 ORDER BY rowid ASC")?;
    let ids = stmt
        .query_map([playlist], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}

/// The playlist with its owner and each video (plus that video's owner)
/// filled in.
pub fn find_populated(
    conn: &Connection,
    id: &str,
) -> Result<Option<PlaylistDocument<OwnerSummary, PlaylistVideo>>> {
    let header = conn
        .query_row(
            r#"
            SELECT p.id AS id, p.name AS name, p.description AS description,
                   p.owner AS owner, p.created_at AS created_at, p.updated_at AS updated_at,
                   u.user_name AS owner_user_name, u.full_name AS owner_full_name,
                   u.avatar AS owner_avatar
            FROM playlists p
            JOIN users u ON u.id = p.owner
            WHERE p.id = ?1
            "#,
            [id],
            |row| {
                let owner = row_to_owner(row)?;
                let playlist = row_to_playlist(row)?;
                Ok((playlist, owner))
            },
        )
        .optional()?;
    let Some((playlist, owner)) = header else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        r#"
        SELECT v.id AS id, v.thumbnail AS thumbnail, v.title AS title,
               v.duration AS duration, v.views AS views, v.created_at AS created_at,
               v.owner AS owner, u.user_name AS owner_user_name,
               u.full_name AS owner_full_name, u.avatar AS owner_avatar
        FROM playlist_videos pv
        JOIN videos v ON v.id = pv.video
        JOIN users u ON u.id = v.owner
        WHERE pv.playlist = ?1
        ORDER BY pv.rowid ASC
        "#,
    )?;
    let mut rows = stmt.query([id])?;
    let mut videos = Vec::new();
    while let Some(row) = rows.next()? {
        videos.push(PlaylistVideo {
            id: row.get("id")?,
            thumbnail: row.get("thumbnail")?,
            title: row.get("title")?,
            duration: row.get("duration")?,
            views: row.get("views")?,
            created_at: row.get("created_at")?,
            owner: row_to_owner(row)?,
        });
    }

    Ok(Some(PlaylistDocument {
        id: playlist.id,
        name: playlist.name,
        description: playlist.description,
        videos,
        owner,
        created_at: playlist.created_at,
        updated_at: playlist.updated_at,
    }))
}

pub fn update_playlist(
    conn: &Connection,
    id: &str,
    name: Option<&str>,
    description: Option<&str>,
) -> Result<Option<PlaylistRecord>> {
    conn.execute(
        r#"
        UPDATE playlists SET
            name = COALESCE(?2, name),
            description = COALESCE(?3, description),
            updated_at = ?4
        WHERE id = ?1
        "#,
        params![id, name, description, now_timestamp()],
    )?;
    find_playlist(conn, id)
}

pub fn delete_playlist(conn: &Connection, id: &str) -> Result<bool> {
    Ok(conn.execute("DELETE FROM playlists WHERE id = ?1", [id])? > 0)
}

/// Appends `video`; a video already on the playlist keeps its position.
pub fn add_video(conn: &Connection, playlist: &str, video: &str) -> Result<Option<PlaylistRecord>> {
    let now = now_timestamp();
    let added = conn.execute(
        "INSERT OR IGNORE INTO playlist_videos (playlist, video, added_at) VALUES (?1, ?2, ?3)",
        params![playlist, video, now],
    )?;
    if added > 0 {
        touch(conn, playlist, &now)?;
    }
    find_playlist(conn, playlist)
}

pub fn remove_video(
    conn: &Connection,
    playlist: &str,
    video: &str,
) -> Result<Option<PlaylistRecord>> {
    let removed = conn.execute(
        "DELETE FROM playlist_videos WHERE playlist = ?1 AND video = ?2",
        params![playlist, video],
    )?;
    if removed > 0 {
        touch(conn, playlist, &now_timestamp())?;
    }
    find_playlist(conn, playlist)
}

fn touch(conn: &Connection, playlist: &str, at: &str) -> Result<()> {
    conn.execute(
        "UPDATE playlists SET updated_at = ?2 WHERE id = ?1",
        params![playlist, at],
    )?;
    Ok(())
}

/// Playlists owned by `owner`, oldest first, with their video ids.
pub fn list_for_owner(conn: &Connection, owner: &str) -> Result<Vec<PlaylistRecord>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, name, description, owner, created_at, updated_at
        FROM playlists
        WHERE owner = ?1
        ORDER BY created_at ASC, rowid ASC
        "#,
    )?;
    let playlists = stmt
        .query_map([owner], row_to_playlist)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    drop(stmt);

    playlists
        .into_iter()
        .map(|mut playlist| {
            playlist.videos = video_ids(conn, &playlist.id)?;
            Ok(playlist)
        })
        .collect()
}

fn row_to_playlist(row: &Row<'_>) -> rusqlite::Result<PlaylistRecord> {
    Ok(PlaylistDocument {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        videos: Vec::new(),
        owner: row.get("owner")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
