//! Session tokens and password hashing.
//!
//! Tokens are `base64url(claims JSON).base64url(ed25519 signature)`. Access
//! and refresh tokens use separate keys, each derived from its configured
//! secret, so one kind can never be replayed as the other. Passwords are
//! stored as argon2id PHC strings.

use anyhow::{Context, Result, anyhow, ensure};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{Duration, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{config::ServerConfig, models::UserProfile, store::to_hex};

const ACCESS_KEY_CONTEXT: &str = "videotube 2024-06 access token signing key";
const REFRESH_KEY_CONTEXT: &str = "videotube 2024-06 refresh token signing key";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessClaims {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    #[serde(rename = "userName")]
    pub user_name: String,
    #[serde(rename = "fullName")]
    pub full_name: String,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshClaims {
    #[serde(rename = "_id")]
    pub id: String,
    /// Random nonce so two refresh tokens issued in the same second differ.
    pub jti: String,
    pub exp: i64,
}

trait Expiring {
    fn expires_at(&self) -> i64;
}

impl Expiring for AccessClaims {
    fn expires_at(&self) -> i64 {
        self.exp
    }
}

impl Expiring for RefreshClaims {
    fn expires_at(&self) -> i64 {
        self.exp
    }
}

/// Signs and verifies one kind of token.
#[derive(Clone)]
struct TokenSigner {
    signing: SigningKey,
    verifying: VerifyingKey,
    ttl: Duration,
}

impl TokenSigner {
    fn from_secret(context: &str, secret: &str, ttl: Duration) -> Self {
        let seed = blake3::derive_key(context, secret.as_bytes());
        let signing = SigningKey::from_bytes(&seed);
        let verifying = signing.verifying_key();
        Self {
            signing,
            verifying,
            ttl,
        }
    }

    fn expiry(&self) -> Result<i64> {
        Utc::now()
            .checked_add_signed(self.ttl)
            .map(|at| at.timestamp())
            .ok_or_else(|| anyhow!("token lifetime {} overflows the calendar", self.ttl))
    }

    fn sign<C: Serialize>(&self, claims: &C) -> Result<String> {
        let payload = serde_json::to_vec(claims).context("serializing token claims")?;
        let encoded = URL_SAFE_NO_PAD.encode(payload);
        let signature = self.signing.sign(encoded.as_bytes());
        Ok(format!(
            "{encoded}.{}",
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        ))
    }

    fn verify<C: DeserializeOwned + Expiring>(&self, token: &str) -> Result<C> {
        let (encoded, signature) = token
            .split_once('.')
            .ok_or_else(|| anyhow!("malformed token"))?;
        let signature_bytes = URL_SAFE_NO_PAD
            .decode(signature)
            .context("decoding token signature")?;
        let signature =
            Signature::from_slice(&signature_bytes).context("parsing token signature")?;
        self.verifying
            .verify(encoded.as_bytes(), &signature)
            .context("token signature mismatch")?;

        let payload = URL_SAFE_NO_PAD
            .decode(encoded)
            .context("decoding token payload")?;
        let claims: C = serde_json::from_slice(&payload).context("parsing token claims")?;
        ensure!(claims.expires_at() > Utc::now().timestamp(), "token expired");
        Ok(claims)
    }
}

/// Issues and checks the access/refresh token pair handed out at login.
#[derive(Clone)]
pub struct SessionKeys {
    access: TokenSigner,
    refresh: TokenSigner,
}

impl SessionKeys {
    pub fn new(
        access_secret: &str,
        access_ttl: Duration,
        refresh_secret: &str,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access: TokenSigner::from_secret(ACCESS_KEY_CONTEXT, access_secret, access_ttl),
            refresh: TokenSigner::from_secret(REFRESH_KEY_CONTEXT, refresh_secret, refresh_ttl),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            &config.access_token_secret,
            config.access_token_ttl,
            &config.refresh_token_secret,
            config.refresh_token_ttl,
        )
    }

    pub fn issue_access(&self, user: &UserProfile) -> Result<String> {
        self.access.sign(&AccessClaims {
            id: user.id.clone(),
            email: user.email.clone(),
            user_name: user.user_name.clone(),
            full_name: user.full_name.clone(),
            exp: self.access.expiry()?,
        })
    }

    pub fn issue_refresh(&self, user_id: &str) -> Result<String> {
        let mut nonce = [0u8; 12];
        OsRng.fill_bytes(&mut nonce);
        self.refresh.sign(&RefreshClaims {
            id: user_id.to_string(),
            jti: to_hex(&nonce),
            exp: self.refresh.expiry()?,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims> {
        self.access.verify(token)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims> {
        self.refresh.verify(token)
    }
}

/// Hashes `password` with a fresh random salt into an argon2id PHC string.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("hashing password: {err}"))
}

/// Checks `password` against a stored PHC string. Anything that does not
/// parse simply fails to verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub const PASSWORD_SPECIALS: &str = "@$!%*?&";

/// At least eight characters drawn from letters, digits and `@$!%*?&`, with
/// at least one of each class.
pub fn password_meets_policy(password: &str) -> bool {
    let allowed = password
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || PASSWORD_SPECIALS.contains(ch));
    allowed
        && password.chars().count() >= 8
        && password.chars().any(|ch| ch.is_ascii_alphabetic())
        && password.chars().any(|ch| ch.is_ascii_digit())
        && password.chars().any(|ch| PASSWORD_SPECIALS.contains(ch))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> UserProfile {
        UserProfile {
            id: "65a1b2c3d4e5f60718293a4b".into(),
            user_name: "alice".into(),
            email: "alice@example.test".into(),
            full_name: "Alice Example".into(),
            avatar: "/media/images/a.png".into(),
            cover_image: String::new(),
            created_at: "2024-01-01T00:00:00.000Z".into(),
            updated_at: "2024-01-01T00:00:00.000Z".into(),
        }
    }

    fn keys() -> SessionKeys {
        SessionKeys::new("access-secret", Duration::hours(1), "refresh-secret", Duration::days(1))
    }

    #[test]
    fn access_token_roundtrip() {
        let keys = keys();
        let token = keys.issue_access(&profile()).unwrap();
        let claims = keys.verify_access(&token).unwrap();
        assert_eq!(claims.id, profile().id);
        assert_eq!(claims.user_name, "alice");
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn refresh_tokens_are_unique_and_not_interchangeable() {
        let keys = keys();
        let first = keys.issue_refresh("abc").unwrap();
        let second = keys.issue_refresh("abc").unwrap();
        assert_ne!(first, second);
        assert_eq!(keys.verify_refresh(&first).unwrap().id, "abc");

        let access = keys.issue_access(&profile()).unwrap();
        assert!(keys.verify_refresh(&access).is_err());
        assert!(keys.verify_access(&first).is_err());
    }

    #[test]
    fn tampered_or_foreign_tokens_fail() {
        let keys = keys();
        let token = keys.issue_access(&profile()).unwrap();
        let (payload, signature) = token.split_once('.').unwrap();
        let forged_claims = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&AccessClaims {
                user_name: "mallory".into(),
                ..keys.verify_access(&token).unwrap()
            })
            .unwrap(),
        );
        assert!(keys.verify_access(&format!("{forged_claims}.{signature}")).is_err());
        assert!(keys.verify_access(payload).is_err());
        assert!(keys.verify_access("").is_err());

        let other = SessionKeys::new("other", Duration::hours(1), "other-refresh", Duration::days(1));
        assert!(other.verify_access(&token).is_err());
    }

    #[test]
    fn expired_tokens_fail() {
        let keys = keys();
        let expired = keys
            .access
            .sign(&AccessClaims {
                exp: Utc::now().timestamp() - 1,
                ..keys.verify_access(&keys.issue_access(&profile()).unwrap()).unwrap()
            })
            .unwrap();
        assert!(keys.verify_access(&expired).is_err());
    }

    #[test]
    fn password_hash_roundtrip() {
        let stored = hash_password("s3cret!pass").unwrap();
        assert!(stored.starts_with("$argon2id$"));
        assert!(verify_password("s3cret!pass", &stored));
        assert!(!verify_password("s3cret!pasS", &stored));
        assert_ne!(stored, hash_password("s3cret!pass").unwrap());
    }

    #[test]
    fn malformed_hashes_never_verify() {
        assert!(!verify_password("x", ""));
        assert!(!verify_password("x", "$argon2id$garbage"));
        assert!(!verify_password("x", "md5$00$00"));
        assert!(!verify_password("x", "b3$00$00"));
    }

    #[test]
    fn lifetimes_past_the_calendar_fail_instead_of_panicking() {
        let keys = SessionKeys::new(
            "access-secret",
            Duration::hours(1),
            "refresh-secret",
            Duration::days(100_000_000),
        );
        assert!(keys.issue_refresh("abc").is_err());
        assert!(keys.issue_access(&profile()).is_ok());
    }

    #[test]
    fn password_policy() {
        assert!(password_meets_policy("abc123!x"));
        assert!(!password_meets_policy("abc12!x"));
        assert!(!password_meets_policy("abcdefg!"));
        assert!(!password_meets_policy("12345678!"));
        assert!(!password_meets_policy("abc12345"));
        assert!(!password_meets_policy("abc 123!x"));
    }
}
