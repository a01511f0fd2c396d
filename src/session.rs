use anyhow::{Result, anyhow};
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use zeroize::Zeroizing;

use crate::config::Config;
use crate::crypto::{MasterKey, master_key_from_slice, unlock_master_key};
use crate::prompt::prompt_password_hidden;

const SESSION_TTL_SECS: u64 = 5 * 60;

#[derive(Serialize, Deserialize)]
struct SessionFile {
    expires_at: u64,
    master_key: String,
}

/// `$XDG_RUNTIME_DIR/xauth-session.json`, else `session.json` in the store root.
pub fn session_path(store_root: &Path) -> PathBuf {
    match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(dir) => PathBuf::from(dir).join("xauth-session.json"),
        None => store_root.join("session.json"),
    }
}

fn now_unix() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| anyhow!("system time error: {e}"))?
        .as_secs())
}

/// Write `contents` to a file only the owner can read. The mode is set when
/// the file is created, and tightened again if it already existed.
#[cfg(unix)]
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(contents.as_bytes())
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    fs::write(path, contents)
}

/// Master key cached at `path`, if the session has not expired yet.
/// An expired session file is removed.
fn read_cached(path: &Path, now: u64) -> Option<MasterKey> {
    let data = Zeroizing::new(fs::read_to_string(path).ok()?);
    let sess: SessionFile = serde_json::from_str(&data).ok()?;
    if now > sess.expires_at {
        let _ = fs::remove_file(path);
        return None;
    }
    let bytes = Zeroizing::new(general_purpose::STANDARD.decode(&sess.master_key).ok()?);
    master_key_from_slice(&bytes).ok()
}

fn write_cached(path: &Path, mk: &MasterKey, now: u64) {
    let sess = SessionFile {
        expires_at: now + SESSION_TTL_SECS,
        master_key: general_purpose::STANDARD.encode(&mk[..]),
    };
    let Ok(json) = serde_json::to_string(&sess) else {
        return;
    };
    if let Err(e) = write_private(path, &json) {
        tracing::debug!(path = %path.display(), error = %e, "session not cached");
    }
}

/// Unlock the master key, asking for the master password only when no
/// live session is cached.
pub fn get_master_key_with_cache(cfg: &Config, store_root: &Path) -> Result<MasterKey> {
    let path = session_path(store_root);
    let now = now_unix()?;

    if let Some(mk) = read_cached(&path, now) {
        tracing::debug!("using cached session");
        return Ok(mk);
    }

    let master_password = Zeroizing::new(prompt_password_hidden("Master password: ")?);
    let mk = unlock_master_key(&master_password, cfg)?;
    write_cached(&path, &mk, now);
    Ok(mk)
}
