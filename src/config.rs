use anyhow::{Context, Result, anyhow, bail};
use chrono::{Duration, Utc};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/videotube-env";
pub const DEFAULT_VIDEOTUBE_PORT: u16 = 8000;
pub const DEFAULT_VIDEOTUBE_HOST: &str = "127.0.0.1";
pub const DEFAULT_ACCESS_TOKEN_EXPIRY: &str = "1d";
pub const DEFAULT_REFRESH_TOKEN_EXPIRY: &str = "10d";
pub const DEFAULT_WATCH_HISTORY_RETENTION_DAYS: i64 = 3;
pub const DEFAULT_UPLOAD_LIMIT_MB: usize = 512;
pub const JSON_BODY_LIMIT: usize = 16 * 1024;

const DATABASE_FILE: &str = "videotube.db";
const MEDIA_SUBDIR: &str = "media";
const TEMP_SUBDIR: &str = "tmp";

/// Every key the backend understands. All of them are optional at this stage;
/// [`EnvConfig::resolve`] decides which ones are mandatory.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub data_root: Option<PathBuf>,
    pub cors_origin: Option<String>,
    pub access_token_secret: Option<String>,
    pub access_token_expiry: Option<String>,
    pub refresh_token_secret: Option<String>,
    pub refresh_token_expiry: Option<String>,
    pub watch_history_retention_days: Option<i64>,
    pub upload_limit_mb: Option<usize>,
    pub cookie_secure: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_root: PathBuf,
    pub cors_origins: Vec<String>,
    pub access_token_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_secret: String,
    pub refresh_token_ttl: Duration,
    pub watch_history_retention: Duration,
    pub upload_limit_bytes: usize,
    pub cookie_secure: bool,
}

impl ServerConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_root.join(DATABASE_FILE)
    }

    pub fn media_dir(&self) -> PathBuf {
        self.data_root.join(MEDIA_SUBDIR)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.data_root.join(TEMP_SUBDIR)
    }
}

impl EnvConfig {
    /// Applies one `KEY=value` pair. Unknown keys are ignored so the same file
    /// can carry settings for other tooling.
    fn set(&mut self, key: &str, value: &str, source: &str) -> Result<()> {
        match key {
            "VIDEOTUBE_HOST" => {
                if !value.is_empty() {
                    self.host = Some(value.to_string());
                }
            }
            "VIDEOTUBE_PORT" => {
                let port: u16 = value
                    .parse()
                    .with_context(|| format!("Parsing VIDEOTUBE_PORT from {source}"))?;
                self.port = Some(port);
            }
            "DATA_ROOT" => self.data_root = Some(PathBuf::from(value)),
            "CORS_ORIGIN" => {
                if !value.is_empty() {
                    self.cors_origin = Some(value.to_string());
                }
            }
            "ACCESS_TOKEN_SECRET" => self.access_token_secret = Some(value.to_string()),
            "ACCESS_TOKEN_EXPIRY" => self.access_token_expiry = Some(value.to_string()),
            "REFRESH_TOKEN_SECRET" => self.refresh_token_secret = Some(value.to_string()),
            "REFRESH_TOKEN_EXPIRY" => self.refresh_token_expiry = Some(value.to_string()),
            "WATCH_HISTORY_RETENTION_DAYS" => {
                let days: i64 = value.parse().with_context(|| {
                    format!("Parsing WATCH_HISTORY_RETENTION_DAYS from {source}")
                })?;
                self.watch_history_retention_days = Some(days);
            }
            "UPLOAD_LIMIT_MB" => {
                let mb: usize = value
                    .parse()
                    .with_context(|| format!("Parsing UPLOAD_LIMIT_MB from {source}"))?;
                self.upload_limit_mb = Some(mb);
            }
            "COOKIE_SECURE" => {
                let secure = match value.to_ascii_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" => true,
                    "0" | "false" | "no" | "off" => false,
                    other => bail!("Parsing COOKIE_SECURE from {source}: unexpected value {other:?}"),
                };
                self.cookie_secure = Some(secure);
            }
            _ => {}
        }
        Ok(())
    }

    /// Builds a config from arbitrary key/value pairs, e.g. the process
    /// environment.
    pub fn from_pairs<I, K, V>(pairs: I, source: &str) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut cfg = Self::default();
        for (key, value) in pairs {
            cfg.set(key.as_ref(), value.as_ref().trim(), source)?;
        }
        Ok(cfg)
    }

    pub fn from_process_env() -> Result<Self> {
        Self::from_pairs(std::env::vars(), "the process environment")
    }

    /// Layers `overrides` on top of `self`; any value present in `overrides`
    /// wins.
    pub fn merge(self, overrides: EnvConfig) -> EnvConfig {
        EnvConfig {
            host: overrides.host.or(self.host),
            port: overrides.port.or(self.port),
            data_root: overrides.data_root.or(self.data_root),
            cors_origin: overrides.cors_origin.or(self.cors_origin),
            access_token_secret: overrides.access_token_secret.or(self.access_token_secret),
            access_token_expiry: overrides.access_token_expiry.or(self.access_token_expiry),
            refresh_token_secret: overrides.refresh_token_secret.or(self.refresh_token_secret),
            refresh_token_expiry: overrides.refresh_token_expiry.or(self.refresh_token_expiry),
            watch_history_retention_days: overrides
                .watch_history_retention_days
                .or(self.watch_history_retention_days),
            upload_limit_mb: overrides.upload_limit_mb.or(self.upload_limit_mb),
            cookie_secure: overrides.cookie_secure.or(self.cookie_secure),
        }
    }

    pub fn resolve(self) -> Result<ServerConfig> {
        let data_root = self
            .data_root
            .ok_or_else(|| anyhow!("DATA_ROOT is not configured"))?;
        let access_token_secret = non_empty_secret(self.access_token_secret, "ACCESS_TOKEN_SECRET")?;
        let refresh_token_secret =
            non_empty_secret(self.refresh_token_secret, "REFRESH_TOKEN_SECRET")?;
        if access_token_secret == refresh_token_secret {
            bail!("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ");
        }

        let access_token_ttl = parse_expiry(
            self.access_token_expiry
                .as_deref()
                .unwrap_or(DEFAULT_ACCESS_TOKEN_EXPIRY),
        )
        .context("ACCESS_TOKEN_EXPIRY")?;
        let refresh_token_ttl = parse_expiry(
            self.refresh_token_expiry
                .as_deref()
                .unwrap_or(DEFAULT_REFRESH_TOKEN_EXPIRY),
        )
        .context("REFRESH_TOKEN_EXPIRY")?;

        let retention_days = self
            .watch_history_retention_days
            .unwrap_or(DEFAULT_WATCH_HISTORY_RETENTION_DAYS);
        let watch_history_retention = Duration::try_days(retention_days)
            .filter(|value| *value > Duration::zero() && fits_calendar(*value))
            .ok_or_else(|| anyhow!("WATCH_HISTORY_RETENTION_DAYS must be a positive day count"))?;

        let upload_limit_bytes = self
            .upload_limit_mb
            .unwrap_or(DEFAULT_UPLOAD_LIMIT_MB)
            .checked_mul(1024 * 1024)
            .ok_or_else(|| anyhow!("UPLOAD_LIMIT_MB is too large"))?;

        let cors_origins = self
            .cors_origin
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(ServerConfig {
            host: self
                .host
                .unwrap_or_else(|| DEFAULT_VIDEOTUBE_HOST.to_string()),
            port: self.port.unwrap_or(DEFAULT_VIDEOTUBE_PORT),
            data_root,
            cors_origins,
            access_token_secret,
            access_token_ttl,
            refresh_token_secret,
            refresh_token_ttl,
            watch_history_retention,
            upload_limit_bytes,
            cookie_secure: self.cookie_secure.unwrap_or(true),
        })
    }
}

fn non_empty_secret(value: Option<String>, key: &str) -> Result<String> {
    match value {
        Some(secret) if !secret.trim().is_empty() => Ok(secret),
        _ => bail!("{key} is not configured"),
    }
}

/// Parses token lifetimes written like `1d`, `12h`, `30m`, `900s` or a bare
/// number of seconds.
pub fn parse_expiry(value: &str) -> Result<Duration> {
    let value = value.trim();
    let (digits, unit) = match value.char_indices().last() {
        Some((idx, ch)) if ch.is_ascii_alphabetic() => (&value[..idx], ch.to_ascii_lowercase()),
        Some(_) => (value, 's'),
        None => bail!("empty duration"),
    };
    let amount: i64 = digits
        .trim()
        .parse()
        .with_context(|| format!("invalid duration {value:?}"))?;
    if amount <= 0 {
        bail!("duration {value:?} must be positive");
    }
    let duration = match unit {
        's' => Duration::try_seconds(amount),
        'm' => Duration::try_minutes(amount),
        'h' => Duration::try_hours(amount),
        'd' => Duration::try_days(amount),
        other => bail!("unknown duration unit {other:?} in {value:?}"),
    };
    duration
        .filter(|duration| fits_calendar(*duration))
        .ok_or_else(|| anyhow!("duration {value:?} is out of range"))
}

/// Whether `now ± duration` is still a representable timestamp.
fn fits_calendar(duration: Duration) -> bool {
    let now = Utc::now();
    now.checked_add_signed(duration).is_some() && now.checked_sub_signed(duration).is_some()
}

pub fn read_env_config(path: &Path) -> Result<Option<EnvConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let source = path.display().to_string();
    let mut cfg = EnvConfig::default();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some((key, value_raw)) = trimmed.split_once('=') {
            let value = value_raw.trim().trim_matches('"');
            cfg.set(key.trim(), value, &source)?;
        }
    }
    Ok(Some(cfg))
}

/// Resolves the server configuration: file values first, then the process
/// environment, then `overrides` (CLI flags).
pub fn load_server_config_from(
    path: impl AsRef<Path>,
    overrides: EnvConfig,
) -> Result<ServerConfig> {
    let path = path.as_ref();
    let file = read_env_config(path)?.unwrap_or_default();
    let env = EnvConfig::from_process_env()?;
    file.merge(env)
        .merge(overrides)
        .resolve()
        .with_context(|| format!("resolving configuration (config file {})", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn make_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    const SECRETS: &str = "ACCESS_TOKEN_SECRET=\"a\"\nREFRESH_TOKEN_SECRET=\"r\"\n";

    #[test]
    fn read_env_config_extracts_port() {
        let cfg = make_config("DATA_ROOT=\"/srv\"\nVIDEOTUBE_PORT=\"4242\"\n");
        let parsed = read_env_config(cfg.path()).unwrap().unwrap();
        assert_eq!(parsed.port, Some(4242));
        assert_eq!(parsed.data_root, Some(PathBuf::from("/srv")));
    }

    #[test]
    fn read_env_config_skips_comments_and_unknown_keys() {
        let cfg = make_config("# comment\n\nMEDIA_ROOT=\"/yt\"\nVIDEOTUBE_HOST=\"0.0.0.0\"\n");
        let parsed = read_env_config(cfg.path()).unwrap().unwrap();
        assert_eq!(parsed.host.as_deref(), Some("0.0.0.0"));
        assert!(parsed.data_root.is_none());
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_env_config(&dir.path().join("absent")).unwrap().is_none());
    }

    #[test]
    fn resolve_applies_defaults() {
        let cfg = make_config(&format!("DATA_ROOT=\"/data\"\n{SECRETS}"));
        let runtime = read_env_config(cfg.path()).unwrap().unwrap().resolve().unwrap();
        assert_eq!(runtime.port, DEFAULT_VIDEOTUBE_PORT);
        assert_eq!(runtime.host, DEFAULT_VIDEOTUBE_HOST);
        assert_eq!(runtime.access_token_ttl, Duration::days(1));
        assert_eq!(runtime.refresh_token_ttl, Duration::days(10));
        assert_eq!(runtime.watch_history_retention, Duration::days(3));
        assert_eq!(runtime.database_path(), PathBuf::from("/data/videotube.db"));
        assert!(runtime.cookie_secure);
        assert!(runtime.cors_origins.is_empty());
    }

    #[test]
    fn resolve_requires_secrets_and_data_root() {
        let no_root = make_config(SECRETS);
        assert!(read_env_config(no_root.path()).unwrap().unwrap().resolve().is_err());

        let no_secret = make_config("DATA_ROOT=\"/data\"\nACCESS_TOKEN_SECRET=\"a\"\n");
        assert!(read_env_config(no_secret.path()).unwrap().unwrap().resolve().is_err());
    }

    #[test]
    fn resolve_rejects_shared_secret() {
        let cfg = make_config(
            "DATA_ROOT=\"/d\"\nACCESS_TOKEN_SECRET=\"same\"\nREFRESH_TOKEN_SECRET=\"same\"\n",
        );
        assert!(read_env_config(cfg.path()).unwrap().unwrap().resolve().is_err());
    }

    #[test]
    fn merge_prefers_overrides() {
        let base = EnvConfig::from_pairs([("VIDEOTUBE_PORT", "1000"), ("DATA_ROOT", "/a")], "test")
            .unwrap();
        let over = EnvConfig::from_pairs([("VIDEOTUBE_PORT", "2000")], "test").unwrap();
        let merged = base.merge(over);
        assert_eq!(merged.port, Some(2000));
        assert_eq!(merged.data_root, Some(PathBuf::from("/a")));
    }

    #[test]
    fn cors_origins_are_split() {
        let cfg = EnvConfig::from_pairs(
            [
                ("DATA_ROOT", "/d"),
                ("ACCESS_TOKEN_SECRET", "a"),
                ("REFRESH_TOKEN_SECRET", "b"),
                ("CORS_ORIGIN", "http://a.test, http://b.test,"),
                ("COOKIE_SECURE", "false"),
            ],
            "test",
        )
        .unwrap()
        .resolve()
        .unwrap();
        assert_eq!(cfg.cors_origins, vec!["http://a.test", "http://b.test"]);
        assert!(!cfg.cookie_secure);
    }

    #[test]
    fn parse_expiry_handles_units() {
        assert_eq!(parse_expiry("1d").unwrap(), Duration::days(1));
        assert_eq!(parse_expiry("12h").unwrap(), Duration::hours(12));
        assert_eq!(parse_expiry("30m").unwrap(), Duration::minutes(30));
        assert_eq!(parse_expiry("900").unwrap(), Duration::seconds(900));
        assert!(parse_expiry("0d").is_err());
        assert!(parse_expiry("5w").is_err());
        assert!(parse_expiry("").is_err());
        assert!(parse_expiry("d").is_err());
    }

    #[test]
    fn lifetimes_beyond_the_calendar_are_rejected() {
        assert!(parse_expiry("100000000d").is_err());
        assert!(parse_expiry("36500d").is_ok());

        let base = [
            ("DATA_ROOT", "/d"),
            ("ACCESS_TOKEN_SECRET", "a"),
            ("REFRESH_TOKEN_SECRET", "b"),
        ];
        let huge_expiry = EnvConfig::from_pairs(
            base.into_iter().chain([("REFRESH_TOKEN_EXPIRY", "100000000d")]),
            "test",
        )
        .unwrap();
        assert!(huge_expiry.resolve().is_err());

        let huge_retention = EnvConfig::from_pairs(
            base.into_iter().chain([("WATCH_HISTORY_RETENTION_DAYS", "100000000")]),
            "test",
        )
        .unwrap();
        assert!(huge_retention.resolve().is_err());
    }
}
