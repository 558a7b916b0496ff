//! Per-user watch history.
//!
//! A video appears at most once per viewer: watching it again moves the
//! entry to the most recent position instead of adding a second one. Entries
//! older than the retention window are pruned whenever the history is read.

use anyhow::Result;
use rusqlite::{Connection, params};

use crate::models::WatchHistoryEntry;

use super::{VIDEO_WITH_OWNER_COLUMNS, row_to_owner, row_to_video};

/// Drops any previous entry for `video` and appends a fresh one stamped
/// `watched_at`. Callers wanting atomicity pass a transaction.
pub fn record_view(conn: &Connection, viewer: &str, video: &str, watched_at: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM watch_history WHERE viewer = ?1 AND video = ?2",
        params![viewer, video],
    )?;
    conn.execute(
        "INSERT INTO watch_history (viewer, video, watched_at) VALUES (?1, ?2, ?3)",
        params![viewer, video, watched_at],
    )?;
    Ok(())
}

/// Removes entries watched strictly before `cutoff`; returns how many went.
pub fn expire_before(conn: &Connection, viewer: &str, cutoff: &str) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM watch_history WHERE viewer = ?1 AND watched_at < ?2",
        params![viewer, cutoff],
    )?)
}

/// History newest first, each entry with the video and its owner.
pub fn list(conn: &Connection, viewer: &str) -> Result<Vec<WatchHistoryEntry>> {
    let sql = format!(
        "SELECT {VIDEO_WITH_OWNER_COLUMNS}, h.watched_at AS watched_at \
         FROM watch_history h \
         JOIN videos v ON v.id = h.video \
         JOIN users u ON u.id = v.owner \
         WHERE h.viewer = ?1 \
         ORDER BY h.watched_at DESC, h.rowid DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([viewer])?;
    let mut entries = Vec::new();
    while let Some(row) = rows.next()? {
        let owner = row_to_owner(row)?;
        entries.push(WatchHistoryEntry {
            video: row_to_video(row)?.with_owner(owner),
            timestamp: row.get("watched_at")?,
        });
    }
    Ok(entries)
}

pub fn clear(conn: &Connection, viewer: &str) -> Result<usize> {
    Ok(conn.execute("DELETE FROM watch_history WHERE viewer = ?1", [viewer])?)
}

pub fn remove_video(conn: &Connection, viewer: &str, video: &str) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM watch_history WHERE viewer = ?1 AND video = ?2",
        params![viewer, video],
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::format_timestamp;
    use crate::store::testing::{TestDb, user, video};
    use chrono::{Duration, Utc};

    #[test]
    fn rewatch_moves_entry_to_front_without_duplicates() {
        let test = TestDb::new();
        let conn = test.conn();
        let alice = user(&conn, "alice");
        let first = video(&conn, &alice.id, "first", true);
        let second = video(&conn, &alice.id, "second", true);
        let now = Utc::now();

        record_view(&conn, &alice.id, &first.id, &format_timestamp(now - Duration::minutes(3))).unwrap();
        record_view(&conn, &alice.id, &second.id, &format_timestamp(now - Duration::minutes(2))).unwrap();
        record_view(&conn, &alice.id, &first.id, &format_timestamp(now - Duration::minutes(1))).unwrap();

        let entries = list(&conn, &alice.id).unwrap();
        let titles: Vec<_> = entries.iter().map(|e| e.video.title.as_str()).collect();
        assert_eq!(titles, vec!["first", "second"]);
        assert_eq!(entries[0].video.owner.user_name, "alice");
    }

    #[test]
    fn expire_only_touches_old_entries_of_that_viewer() {
        let test = TestDb::new();
        let conn = test.conn();
        let alice = user(&conn, "alice");
        let bob = user(&conn, "bob");
        let old = video(&conn, &alice.id, "old", true);
        let fresh = video(&conn, &alice.id, "fresh", true);
        let now = Utc::now();
        let stale = format_timestamp(now - Duration::days(5));

        record_view(&conn, &alice.id, &old.id, &stale).unwrap();
        record_view(&conn, &alice.id, &fresh.id, &format_timestamp(now)).unwrap();
        record_view(&conn, &bob.id, &old.id, &stale).unwrap();

        let cutoff = format_timestamp(now - Duration::days(3));
        assert_eq!(expire_before(&conn, &alice.id, &cutoff).unwrap(), 1);

        let remaining: Vec<_> = list(&conn, &alice.id)
            .unwrap()
            .into_iter()
            .map(|e| e.video.title)
            .collect();
        assert_eq!(remaining, vec!["fresh"]);
        assert_eq!(list(&conn, &bob.id).unwrap().len(), 1);
    }

    #[test]
    fn clear_and_remove() {
        let test = TestDb::new();
        let conn = test.conn();
        let alice = user(&conn, "alice");
        let one = video(&conn, &alice.id, "one", true);
        let two = video(&conn, &alice.id, "two", true);
        let now = format_timestamp(Utc::now());

        record_view(&conn, &alice.id, &one.id, &now).unwrap();
        record_view(&conn, &alice.id, &two.id, &now).unwrap();
        assert_eq!(remove_video(&conn, &alice.id, &one.id).unwrap(), 1);
        assert_eq!(list(&conn, &alice.id).unwrap().len(), 1);
        assert_eq!(clear(&conn, &alice.id).unwrap(), 1);
        assert!(list(&conn, &alice.id).unwrap().is_empty());
    }
}
