#![forbid(unsafe_code)]

//! Process-level guards used by the videotube binaries.

use anyhow::{Result, bail};
use nix::unistd::Uid;

/// Fails fast when a binary is started as root. The backend only needs write
/// access to its data root, so it is expected to run under an unprivileged
/// account; refusing here keeps manual invocations from quietly writing
/// root-owned uploads.
pub fn ensure_not_root(process: &str) -> Result<()> {
    if Uid::current().is_root() {
        bail!("{process} must not be run as root; please use an unprivileged service account");
    }
    Ok(())
}
