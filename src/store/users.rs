//! `users` collection: accounts, credentials and channel profiles.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::models::{ChannelProfile, UserProfile, UserRecord};

use super::{new_object_id, now_timestamp};

const USER_COLUMNS: &str = "id, user_name, email, full_name, avatar, cover_image, \
                            password_hash, refresh_token, created_at, updated_at";

pub struct NewUser<'a> {
    pub user_name: &'a str,
    pub email: &'a str,
    pub full_name: &'a str,
    pub avatar: &'a str,
    pub cover_image: &'a str,
    pub password_hash: &'a str,
}

pub fn create_user(conn: &Connection, user: &NewUser<'_>) -> Result<UserProfile> {
    let id = new_object_id();
    let now = now_timestamp();
    conn.execute(
        r#"
        INSERT INTO users (
            id, user_name, email, full_name, avatar, cover_image,
            password_hash, refresh_token, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, ?8)
        "#,
        params![
            id,
            user.user_name,
            user.email,
            user.full_name,
            user.avatar,
            user.cover_image,
            user.password_hash,
            now,
        ],
    )
    .with_context(|| format!("inserting user {}", user.user_name))?;

    find_profile(conn, &id)?.context("user vanished right after insert")
}

pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<UserRecord>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    Ok(conn
        .query_row(&sql, [id], row_to_user)
        .optional()?)
}

pub fn find_profile(conn: &Connection, id: &str) -> Result<Option<UserProfile>> {
    Ok(find_by_id(conn, id)?.map(|user| user.profile))
}

pub fn find_by_user_name(conn: &Connection, user_name: &str) -> Result<Option<UserProfile>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE user_name = ?1");
    Ok(conn
        .query_row(&sql, [user_name], row_to_user)
        .optional()?
        .map(|user| user.profile))
}

pub fn find_by_email(conn: &Connection, email: &str) -> Result<Option<UserProfile>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
    Ok(conn
        .query_row(&sql, [email], row_to_user)
        .optional()?
        .map(|user| user.profile))
}

/// Login lookup: matches on either identifier. A user name is compared in its
/// stored (lowercase) form.
pub fn find_for_login(
    conn: &Connection,
    user_name: Option<&str>,
    email: Option<&str>,
) -> Result<Option<UserRecord>> {
    let user_name = user_name.map(|name| name.trim().to_lowercase());
    let email = email.map(str::trim);
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users \
         WHERE (?1 IS NOT NULL AND user_name = ?1) OR (?2 IS NOT NULL AND email = ?2) \
         ORDER BY created_at ASC LIMIT 1"
    );
    Ok(conn
        .query_row(&sql, params![user_name, email], row_to_user)
        .optional()?)
}

pub fn exists_with_user_name_or_email(
    conn: &Connection,
    user_name: &str,
    email: &str,
) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM users WHERE user_name = ?1 OR email = ?2 LIMIT 1",
            params![user_name, email],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn set_refresh_token(conn: &Connection, id: &str, token: Option<&str>) -> Result<()> {
    conn.execute(
        "UPDATE users SET refresh_token = ?2 WHERE id = ?1",
        params![id, token],
    )?;
    Ok(())
}

pub fn set_password_hash(conn: &Connection, id: &str, password_hash: &str) -> Result<()> {
    conn.execute(
        "UPDATE users SET password_hash = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, password_hash, now_timestamp()],
    )?;
    Ok(())
}

pub fn update_account(
    conn: &Connection,
    id: &str,
    full_name: &str,
    email: &str,
) -> Result<Option<UserProfile>> {
    conn.execute(
        "UPDATE users SET full_name = ?2, email = ?3, updated_at = ?4 WHERE id = ?1",
        params![id, full_name, email, now_timestamp()],
    )?;
    find_profile(conn, id)
}

/// Which image slot of the profile to replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileImage {
    Avatar,
    CoverImage,
}

impl ProfileImage {
    fn column(self) -> &'static str {
        match self {
            Self::Avatar => "avatar",
            Self::CoverImage => "cover_image",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Avatar => "Avatar",
            Self::CoverImage => "Cover image",
        }
    }
}

pub fn set_profile_image(
    conn: &Connection,
    id: &str,
    slot: ProfileImage,
    url: &str,
) -> Result<Option<UserProfile>> {
    let column = slot.column();
    conn.execute(
        &format!("UPDATE users SET {column} = ?2, updated_at = ?3 WHERE id = ?1"),
        params![id, url, now_timestamp()],
    )?;
    find_profile(conn, id)
}

/// Public channel page for `user_name`, with subscription counters and
/// whether `viewer` follows it.
pub fn channel_profile(
    conn: &Connection,
    user_name: &str,
    viewer: &str,
) -> Result<Option<ChannelProfile>> {
    Ok(conn
        .query_row(
            r#"
            SELECT u.id AS id, u.full_name AS full_name, u.user_name AS user_name,
                   u.avatar AS avatar, u.cover_image AS cover_image,
                   (SELECT COUNT(*) FROM subscriptions s WHERE s.channel = u.id) AS subscriber_count,
                   (SELECT COUNT(*) FROM subscriptions s WHERE s.subscriber = u.id) AS subscribed_to_count,
                   EXISTS (
                       SELECT 1 FROM subscriptions s
                       WHERE s.channel = u.id AND s.subscriber = ?2
                   ) AS is_subscribed
            FROM users u
            WHERE u.user_name = ?1
            "#,
            params![user_name, viewer],
            |row| {
                Ok(ChannelProfile {
                    id: row.get("id")?,
                    full_name: row.get("full_name")?,
                    user_name: row.get("user_name")?,
                    avatar: row.get("avatar")?,
                    cover_image: row.get("cover_image")?,
                    subscriber_count: row.get("subscriber_count")?,
                    subscribed_to_count: row.get("subscribed_to_count")?,
                    is_subscribed: row.get::<_, i64>("is_subscribed").map(|value| value != 0)?,
                })
            },
        )
        .optional()?)
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        profile: UserProfile {
            id: row.get("id")?,
            user_name: row.get("user_name")?,
            email: row.get("email")?,
            full_name: row.get("full_name")?,
            avatar: row.get("avatar")?,
            cover_image: row.get("cover_image")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        },
        password_hash: row.get("password_hash")?,
        refresh_token: row.get("refresh_token")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{TestDb, user};

    #[test]
    fn create_and_lookup_user() {
        let test = TestDb::new();
        let conn = test.conn();
        let alice = user(&conn, "alice");

        let by_id = find_by_id(&conn, &alice.id).unwrap().unwrap();
        assert_eq!(by_id.profile, alice);
        assert!(by_id.refresh_token.is_none());

        let by_name = find_by_user_name(&conn, "alice").unwrap().unwrap();
        assert_eq!(by_name.id, alice.id);
        assert!(find_by_email(&conn, "alice@example.test").unwrap().is_some());
        assert!(exists_with_user_name_or_email(&conn, "nobody", "alice@example.test").unwrap());
        assert!(!exists_with_user_name_or_email(&conn, "nobody", "nobody@example.test").unwrap());
    }

    #[test]
    fn duplicate_user_name_is_rejected() {
        let test = TestDb::new();
        let conn = test.conn();
        user(&conn, "alice");
        let again = create_user(
            &conn,
            &NewUser {
                user_name: "alice",
                email: "other@example.test",
                full_name: "Other",
                avatar: "/a.png",
                cover_image: "",
                password_hash: "x",
            },
        );
        assert!(again.is_err());
    }

    #[test]
    fn login_lookup_matches_either_identifier() {
        let test = TestDb::new();
        let conn = test.conn();
        let alice = user(&conn, "alice");

        let by_name = find_for_login(&conn, Some("  ALICE "), None).unwrap().unwrap();
        assert_eq!(by_name.profile.id, alice.id);
        let by_email = find_for_login(&conn, None, Some("alice@example.test"))
            .unwrap()
            .unwrap();
        assert_eq!(by_email.profile.id, alice.id);
        assert!(find_for_login(&conn, Some("bob"), None).unwrap().is_none());
        assert!(find_for_login(&conn, None, None).unwrap().is_none());
    }

    #[test]
    fn refresh_token_roundtrip() {
        let test = TestDb::new();
        let conn = test.conn();
        let alice = user(&conn, "alice");

        set_refresh_token(&conn, &alice.id, Some("token")).unwrap();
        let stored = find_by_id(&conn, &alice.id).unwrap().unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("token"));

        set_refresh_token(&conn, &alice.id, None).unwrap();
        let cleared = find_by_id(&conn, &alice.id).unwrap().unwrap();
        assert!(cleared.refresh_token.is_none());
    }

    #[test]
    fn profile_image_and_account_updates() {
        let test = TestDb::new();
        let conn = test.conn();
        let alice = user(&conn, "alice");

        let updated = set_profile_image(&conn, &alice.id, ProfileImage::CoverImage, "/c.png")
            .unwrap()
            .unwrap();
        assert_eq!(updated.cover_image, "/c.png");
        assert_eq!(updated.avatar, alice.avatar);

        let renamed = update_account(&conn, &alice.id, "Alice A.", "a@example.test")
            .unwrap()
            .unwrap();
        assert_eq!(renamed.full_name, "Alice A.");
        assert_eq!(renamed.email, "a@example.test");
    }

    #[test]
    fn channel_profile_counts_subscriptions() {
        let test = TestDb::new();
        let conn = test.conn();
        let alice = user(&conn, "alice");
        let bob = user(&conn, "bob");
        let carol = user(&conn, "carol");

        crate::store::subscriptions::toggle(&conn, &bob.id, &alice.id).unwrap();
        crate::store::subscriptions::toggle(&conn, &carol.id, &alice.id).unwrap();
        crate::store::subscriptions::toggle(&conn, &alice.id, &carol.id).unwrap();

        let profile = channel_profile(&conn, "alice", &bob.id).unwrap().unwrap();
        assert_eq!(profile.subscriber_count, 2);
        assert_eq!(profile.subscribed_to_count, 1);
        assert!(profile.is_subscribed);

        let as_self = channel_profile(&conn, "alice", &alice.id).unwrap().unwrap();
        assert!(!as_self.is_subscribed);
        assert!(channel_profile(&conn, "nobody", &bob.id).unwrap().is_none());
    }
}
