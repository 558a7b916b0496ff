//! Storage for uploaded images and videos.
//!
//! Handlers only talk to the [`MediaHost`] trait. The bundled
//! [`LocalMediaHost`] keeps files under `DATA_ROOT/media` and serves them
//! back through `/media/{kind}/{file}`.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};

use crate::store::new_object_id;

pub const MEDIA_URL_PREFIX: &str = "/media";

const MAX_EXTENSION_LEN: usize = 8;
const FALLBACK_EXTENSION: &str = "bin";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Image => "images",
            Self::Video => "videos",
        }
    }

    pub fn from_dir_name(value: &str) -> Option<Self> {
        match value {
            "images" => Some(Self::Image),
            "videos" => Some(Self::Video),
            _ => None,
        }
    }
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq)]
pub struct HostedAsset {
    pub url: String,
    /// Playback length in seconds, when the host can tell.
    pub duration: Option<f64>,
}

/// Where uploaded files end up. Methods block, so callers run them on the
/// blocking pool.
pub trait MediaHost: Send + Sync {
    /// Stores the file at `source` and returns its public URL.
    /// `original_name` is the client-supplied file name, used only for its
    /// extension.
    fn upload(&self, source: &Path, kind: MediaKind, original_name: &str) -> Result<HostedAsset>;

    /// Removes a previously uploaded asset. Returns `false` when the URL is
    /// not one of ours or the file is already gone.
    fn delete(&self, url: &str) -> Result<bool>;

    /// Local file backing `/media/{kind}/{file}`, for hosts that serve their
    /// own files.
    fn local_path(&self, _kind: MediaKind, _file: &str) -> Option<PathBuf> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct LocalMediaHost {
    root: PathBuf,
}

impl LocalMediaHost {
    /// Creates the `images/` and `videos/` directories under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for kind in [MediaKind::Image, MediaKind::Video] {
            let dir = root.join(kind.dir_name());
            fs::create_dir_all(&dir)
                .with_context(|| format!("creating media directory {}", dir.display()))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn url_for(kind: MediaKind, file: &str) -> String {
        format!("{MEDIA_URL_PREFIX}/{}/{file}", kind.dir_name())
    }

    /// Splits `/media/{kind}/{file}` back into its parts.
    fn parse_url(url: &str) -> Option<(MediaKind, &str)> {
        let rest = url.strip_prefix(MEDIA_URL_PREFIX)?.strip_prefix('/')?;
        let (kind, file) = rest.split_once('/')?;
        Some((MediaKind::from_dir_name(kind)?, file))
    }
}

impl MediaHost for LocalMediaHost {
    fn upload(&self, source: &Path, kind: MediaKind, original_name: &str) -> Result<HostedAsset> {
        let file_name = format!("{}.{}", new_object_id(), sanitized_extension(original_name));
        let target = self.root.join(kind.dir_name()).join(&file_name);
        fs::copy(source, &target).with_context(|| {
            format!("copying upload {} to {}", source.display(), target.display())
        })?;
        Ok(HostedAsset {
            url: Self::url_for(kind, &file_name),
            duration: None,
        })
    }

    fn delete(&self, url: &str) -> Result<bool> {
        let Some((kind, file)) = Self::parse_url(url) else {
            return Ok(false);
        };
        let Some(path) = self.local_path(kind, file) else {
            bail!("refusing to delete {url:?}");
        };
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("removing {}", path.display())),
        }
    }

    fn local_path(&self, kind: MediaKind, file: &str) -> Option<PathBuf> {
        if !is_plain_file_name(file) {
            return None;
        }
        Some(self.root.join(kind.dir_name()).join(file))
    }
}

/// A single path component with no separators and no dot-only names.
fn is_plain_file_name(file: &str) -> bool {
    !file.is_empty()
        && file != "."
        && file != ".."
        && !file.contains(['/', '\\', '\0'])
}

fn sanitized_extension(original_name: &str) -> String {
    Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|ch| ch.is_ascii_alphanumeric())
        })
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}
