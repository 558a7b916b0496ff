//! `tweets` collection: short text posts on a channel.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::models::{OwnerSummary, TweetDocument, TweetRecord};

use super::{new_object_id, now_timestamp, row_to_owner};

const TWEET_WITH_OWNER: &str = r#"
    SELECT t.id AS id, t.content AS content, t.owner AS owner,
           t.created_at AS created_at, t.updated_at AS updated_at,
           u.user_name AS owner_user_name, u.full_name AS owner_full_name,
           u.avatar AS owner_avatar
    FROM tweets t
    JOIN users u ON u.id = t.owner
"#;

pub fn insert_tweet(conn: &Connection, owner: &str, content: &str) -> Result<TweetRecord> {
    let id = new_object_id();
    let now = now_timestamp();
    conn.execute(
        "INSERT INTO tweets (id, content, owner, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
        params![id, content, owner, now],
    )?;
    find_tweet(conn, &id)?.context("tweet vanished right after insert")
}

pub fn find_tweet(conn: &Connection, id: &str) -> Result<Option<TweetRecord>> {
    Ok(conn
        .query_row(
            "SELECT id, content, owner, created_at, updated_at FROM tweets WHERE id = ?1",
            [id],
            row_to_tweet,
        )
        .optional()?)
}

/// Every tweet, newest first.
pub fn list_all(conn: &Connection) -> Result<Vec<TweetDocument<OwnerSummary>>> {
    query_populated(
        conn,
        &format!("{TWEET_WITH_OWNER} ORDER BY t.created_at DESC, t.rowid DESC"),
        None,
    )
}

/// Tweets by `owner`, newest first.
pub fn list_for_owner(conn: &Connection, owner: &str) -> Result<Vec<TweetDocument<OwnerSummary>>> {
    query_populated(
        conn,
        &format!("{TWEET_WITH_OWNER} WHERE t.owner = ?1 ORDER BY t.created_at DESC, t.rowid DESC"),
        Some(owner),
    )
}

fn query_populated(
    conn: &Connection,
    sql: &str,
    owner: Option<&str>,
) -> Result<Vec<TweetDocument<OwnerSummary>>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = match owner {
        Some(owner) => stmt.query([owner])?,
        None => stmt.query([])?,
    };
    let mut tweets = Vec::new();
    while let Some(row) = rows.next()? {
        let owner = row_to_owner(row)?;
        tweets.push(row_to_tweet(row)?.with_owner(owner));
    }
    Ok(tweets)
}

pub fn update_content(conn: &Connection, id: &str, content: &str) -> Result<Option<TweetRecord>> {
    conn.execute(
        "UPDATE tweets SET content = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, content, now_timestamp()],
    )?;
    find_tweet(conn, id)
}

pub fn delete_tweet(conn: &Connection, id: &str) -> Result<bool> {
    Ok(conn.execute("DELETE FROM tweets WHERE id = ?1", [id])? > 0)
}

fn row_to_tweet(row: &Row<'_>) -> rusqlite::Result<TweetRecord> {
    Ok(TweetDocument {
        id: row.get("id")?,
        content: row.get("content")?,
        owner: row.get("owner")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{TestDb, user};

    #[test]
    fn tweets_list_newest_first() {
        let test = TestDb::new();
        let conn = test.conn();
        let alice = user(&conn, "alice");
        let bob = user(&conn, "bob");

        insert_tweet(&conn, &alice.id, "one").unwrap();
        insert_tweet(&conn, &bob.id, "two").unwrap();
        insert_tweet(&conn, &alice.id, "three").unwrap();

        let all: Vec<_> = list_all(&conn)
            .unwrap()
            .into_iter()
            .map(|t| t.content)
            .collect();
        assert_eq!(all, vec!["three", "two", "one"]);

        let alices = list_for_owner(&conn, &alice.id).unwrap();
        assert_eq!(alices.len(), 2);
        assert!(alices.iter().all(|t| t.owner.user_name == "alice"));
    }

    #[test]
    fn update_and_delete_tweet() {
        let test = TestDb::new();
        let conn = test.conn();
        let alice = user(&conn, "alice");
        let tweet = insert_tweet(&conn, &alice.id, "typo").unwrap();

        let fixed = update_content(&conn, &tweet.id, "fixed").unwrap().unwrap();
        assert_eq!(fixed.content, "fixed");
        assert!(delete_tweet(&conn, &tweet.id).unwrap());
        assert!(find_tweet(&conn, &tweet.id).unwrap().is_none());
    }
}
