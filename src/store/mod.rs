//! SQLite persistence for the VideoTube backend.
//!
//! Each submodule owns one collection and exposes free functions over a
//! borrowed [`Connection`], so a handler can run several of them inside a
//! single transaction (a `Transaction` derefs to `Connection`). The
//! [`Database`] handle itself only knows where the file lives and opens
//! short-lived connections on demand.

use std::{
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rand_core::{OsRng, RngCore};
use rusqlite::{Connection, ErrorCode, Row, Transaction, TransactionBehavior};

use crate::models::OwnerSummary;

pub mod comments;
pub mod dashboard;
pub mod history;
pub mod likes;
pub mod playlists;
pub mod subscriptions;
pub mod tweets;
pub mod users;
pub mod videos;

/// Cloneable handle that opens a dedicated connection per unit of work, so
/// blocking tasks never share a connection across threads.
#[derive(Debug, Clone)]
pub struct Database {
    db_path: PathBuf,
}

impl Database {
    /// Opens (and if necessary creates) the database file and makes sure the
    /// schema exists. WAL mode keeps readers from blocking the writer.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }

        let mut conn = Connection::open(path)
            .with_context(|| format!("opening database {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("enabling WAL mode")?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .context("setting synchronous mode")?;
        ensure_tables(&mut conn)?;

        Ok(Self {
            db_path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(conn)
    }

    /// Runs `f` on a fresh connection. The error type is left to the caller
    /// so HTTP handlers can return their own error straight out of the
    /// closure.
    pub fn with_connection<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Connection) -> Result<T, E>,
        E: From<anyhow::Error>,
    {
        let mut conn = self.connect().map_err(E::from)?;
        f(&mut conn)
    }
}

/// Starts a transaction that takes the write lock up front, so concurrent
/// read-then-write units queue on the busy timeout instead of failing when
/// their snapshot goes stale.
pub fn write_transaction(conn: &mut Connection) -> rusqlite::Result<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
}

/// Whether `err` (or anything it wraps) is a UNIQUE constraint failure.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::SqliteFailure(failure, _))
                if failure.code == ErrorCode::ConstraintViolation
                    && failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        )
    })
}

/// Creates every table and index if missing. Wrapped in a transaction so a
/// failure leaves the file untouched.
fn ensure_tables(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;

    tx.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            user_name TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL,
            avatar TEXT NOT NULL,
            cover_image TEXT NOT NULL DEFAULT '',
            password_hash TEXT NOT NULL,
            refresh_token TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS videos (
            id TEXT PRIMARY KEY,
            video_file TEXT NOT NULL,
            thumbnail TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            duration REAL NOT NULL DEFAULT 0,
            views INTEGER NOT NULL DEFAULT 0,
            is_published INTEGER NOT NULL DEFAULT 0,
            owner TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS comments (
            id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            video TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
            owner TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tweets (
            id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            owner TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS likes (
            id TEXT PRIMARY KEY,
            video TEXT REFERENCES videos(id) ON DELETE CASCADE,
            comment TEXT REFERENCES comments(id) ON DELETE CASCADE,
            tweet TEXT REFERENCES tweets(id) ON DELETE CASCADE,
            liked_by TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            CHECK ((video IS NOT NULL) + (comment IS NOT NULL) + (tweet IS NOT NULL) = 1)
        );

        CREATE TABLE IF NOT EXISTS playlists (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            owner TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS playlist_videos (
            playlist TEXT NOT NULL REFERENCES playlists(id) ON DELETE CASCADE,
            video TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
            added_at TEXT NOT NULL,
            PRIMARY KEY (playlist, video)
        );

        CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            subscriber TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            channel TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (subscriber, channel)
        );

        CREATE TABLE IF NOT EXISTS watch_history (
            viewer TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            video TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
            watched_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_videos_owner ON videos(owner);
        CREATE INDEX IF NOT EXISTS idx_comments_video ON comments(video);
        CREATE INDEX IF NOT EXISTS idx_tweets_owner ON tweets(owner);
        CREATE INDEX IF NOT EXISTS idx_playlists_owner ON playlists(owner);
        CREATE INDEX IF NOT EXISTS idx_subscriptions_channel ON subscriptions(channel);
        CREATE INDEX IF NOT EXISTS idx_watch_history_viewer ON watch_history(viewer, watched_at);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_likes_video
            ON likes(liked_by, video) WHERE video IS NOT NULL;
        CREATE UNIQUE INDEX IF NOT EXISTS idx_likes_comment
            ON likes(liked_by, comment) WHERE comment IS NOT NULL;
        CREATE UNIQUE INDEX IF NOT EXISTS idx_likes_tweet
            ON likes(liked_by, tweet) WHERE tweet IS NOT NULL;
        "#,
    )?;

    tx.commit()?;
    Ok(())
}

/// Generates a 24-hex-digit object id: four bytes of Unix seconds followed
/// by eight random bytes, so ids created later sort later.
pub fn new_object_id() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as u32)
        .unwrap_or_default();
    let mut bytes = [0u8; 12];
    bytes[..4].copy_from_slice(&secs.to_be_bytes());
    OsRng.fill_bytes(&mut bytes[4..]);
    to_hex(&bytes)
}

pub fn is_valid_object_id(value: &str) -> bool {
    value.len() == 24 && value.bytes().all(|byte| byte.is_ascii_hexdigit())
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// RFC 3339, UTC, millisecond precision. Fixed width, so string order is
/// chronological order.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Column list selecting a video aliased as `v`, joined with its owner as
/// `u`. Pair with [`row_to_video`] and [`row_to_owner`].
pub(crate) const VIDEO_WITH_OWNER_COLUMNS: &str = r#"
    v.id AS id, v.video_file AS video_file, v.thumbnail AS thumbnail,
    v.title AS title, v.description AS description, v.duration AS duration,
    v.views AS views, v.is_published AS is_published, v.owner AS owner,
    v.created_at AS created_at, v.updated_at AS updated_at,
    u.user_name AS owner_user_name, u.full_name AS owner_full_name,
    u.avatar AS owner_avatar
"#;

pub(crate) fn row_to_video(row: &Row<'_>) -> rusqlite::Result<crate::models::VideoRecord> {
    Ok(crate::models::VideoDocument {
        id: row.get("id")?,
        video_file: row.get("video_file")?,
        thumbnail: row.get("thumbnail")?,
        title: row.get("title")?,
        description: row.get("description")?,
        duration: row.get("duration")?,
        views: row.get("views")?,
        is_published: row.get::<_, i64>("is_published").map(|value| value != 0)?,
        owner: row.get("owner")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Reads the `owner`, `owner_user_name`, `owner_full_name`, `owner_avatar`
/// columns produced by the joins in this module.
pub(crate) fn row_to_owner(row: &Row<'_>) -> rusqlite::Result<OwnerSummary> {
    Ok(OwnerSummary {
        id: row.get("owner")?,
        user_name: row.get("owner_user_name")?,
        full_name: row.get("owner_full_name")?,
        avatar: row.get("owner_avatar")?,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by the store unit tests.

    use super::*;
    use crate::models::{UserProfile, VideoRecord};

    pub struct TestDb {
        _temp: tempfile::TempDir,
        pub db: Database,
    }

    impl TestDb {
        pub fn new() -> Self {
            let temp = tempfile::tempdir().unwrap();
            let db = Database::open(temp.path().join("videotube.db")).unwrap();
            Self { _temp: temp, db }
        }

        pub fn conn(&self) -> Connection {
            self.db.connect().unwrap()
        }
    }

    pub fn user(conn: &Connection, name: &str) -> UserProfile {
        users::create_user(
            conn,
            &users::NewUser {
                user_name: name,
                email: &format!("{name}@example.test"),
                full_name: &format!("{name} Example"),
                avatar: &format!("/media/images/{name}.png"),
                cover_image: "",
                password_hash: "$argon2id$v=19$m=19456,t=2,p=1$unused",
            },
        )
        .unwrap()
    }

    pub fn video(conn: &Connection, owner: &str, title: &str, published: bool) -> VideoRecord {
        videos::insert_video(
            conn,
            &videos::NewVideo {
                video_file: &format!("/media/videos/{title}.mp4"),
                thumbnail: &format!("/media/images/{title}.png"),
                title,
                description: "",
                duration: 12.5,
                is_published: published,
                owner,
            },
        )
        .unwrap()
    }
}
