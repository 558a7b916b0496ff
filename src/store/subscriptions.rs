//! `subscriptions` collection: who follows which channel.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::models::{ChannelListing, SubscriptionRecord};

use super::{new_object_id, now_timestamp};

pub fn find(conn: &Connection, subscriber: &str, channel: &str) -> Result<Option<SubscriptionRecord>> {
    Ok(conn
        .query_row(
            r#"
            SELECT id, subscriber, channel, created_at, updated_at
            FROM subscriptions
            WHERE subscriber = ?1 AND channel = ?2
            "#,
            params![subscriber, channel],
            row_to_subscription,
        )
        .optional()?)
}

pub fn is_subscribed(conn: &Connection, subscriber: &str, channel: &str) -> Result<bool> {
    Ok(find(conn, subscriber, channel)?.is_some())
}

/// Subscribes when no subscription exists, unsubscribes otherwise. Returns
/// the new state together with the record that was created or removed.
pub fn toggle(
    conn: &Connection,
    subscriber: &str,
    channel: &str,
) -> Result<(bool, SubscriptionRecord)> {
    if let Some(existing) = find(conn, subscriber, channel)? {
        conn.execute("DELETE FROM subscriptions WHERE id = ?1", [&existing.id])?;
        return Ok((false, existing));
    }

    let id = new_object_id();
    let now = now_timestamp();
    conn.execute(
        r#"
        INSERT INTO subscriptions (id, subscriber, channel, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?4)
        "#,
        params![id, subscriber, channel, now],
    )?;
    let created = find(conn, subscriber, channel)?
        .context("subscription vanished right after insert")?;
    Ok((true, created))
}

/// Users subscribed to `channel`, each with their own subscriber count.
pub fn subscribers_of(conn: &Connection, channel: &str) -> Result<Vec<ChannelListing>> {
    listings(
        conn,
        r#"
        SELECT u.id AS id, u.avatar AS avatar, u.user_name AS user_name, u.full_name AS full_name,
               (SELECT COUNT(*) FROM subscriptions x WHERE x.channel = u.id) AS subscribers_count
        FROM subscriptions s
        JOIN users u ON u.id = s.subscriber
        WHERE s.channel = ?1
        ORDER BY s.created_at ASC, s.rowid ASC
        "#,
        channel,
    )
}

/// Channels `subscriber` follows, each with its subscriber count.
pub fn channels_of(conn: &Connection, subscriber: &str) -> Result<Vec<ChannelListing>> {
    listings(
        conn,
        r#"
        SELECT u.id AS id, u.avatar AS avatar, u.user_name AS user_name, u.full_name AS full_name,
               (SELECT COUNT(*) FROM subscriptions x WHERE x.channel = u.id) AS subscribers_count
        FROM subscriptions s
        JOIN users u ON u.id = s.channel
        WHERE s.subscriber = ?1
        ORDER BY s.created_at ASC, s.rowid ASC
        "#,
        subscriber,
    )
}

fn listings(conn: &Connection, sql: &str, key: &str) -> Result<Vec<ChannelListing>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([key], |row| {
        Ok(ChannelListing {
            id: row.get("id")?,
            avatar: row.get("avatar")?,
            user_name: row.get("user_name")?,
            full_name: row.get("full_name")?,
            subscribers_count: row.get("subscribers_count")?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn row_to_subscription(row: &Row<'_>) -> rusqlite::Result<SubscriptionRecord> {
    Ok(SubscriptionRecord {
        id: row.get("id")?,
        subscriber: row.get("subscriber")?,
        channel: row.get("channel")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{TestDb, user};

    #[test]
    fn toggle_subscribes_then_unsubscribes() {
        let test = TestDb::new();
        let conn = test.conn();
        let alice = user(&conn, "alice");
        let bob = user(&conn, "bob");

        let (subscribed, record) = toggle(&conn, &bob.id, &alice.id).unwrap();
        assert!(subscribed);
        assert_eq!(record.channel, alice.id);
        assert!(is_subscribed(&conn, &bob.id, &alice.id).unwrap());

        let (subscribed, removed) = toggle(&conn, &bob.id, &alice.id).unwrap();
        assert!(!subscribed);
        assert_eq!(removed.id, record.id);
        assert!(!is_subscribed(&conn, &bob.id, &alice.id).unwrap());
    }

    #[test]
    fn listings_carry_subscriber_counts() {
        let test = TestDb::new();
        let conn = test.conn();
        let alice = user(&conn, "alice");
        let bob = user(&conn, "bob");
        let carol = user(&conn, "carol");

        toggle(&conn, &bob.id, &alice.id).unwrap();
        toggle(&conn, &carol.id, &alice.id).unwrap();
        toggle(&conn, &alice.id, &bob.id).unwrap();

        let subscribers = subscribers_of(&conn, &alice.id).unwrap();
        let names: Vec<_> = subscribers.iter().map(|s| s.user_name.as_str()).collect();
        assert_eq!(names, vec!["bob", "carol"]);
        assert_eq!(subscribers[0].subscribers_count, 1);
        assert_eq!(subscribers[1].subscribers_count, 0);

        let channels = channels_of(&conn, &bob.id).unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].user_name, "alice");
        assert_eq!(channels[0].subscribers_count, 2);
    }
}
