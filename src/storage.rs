//! # storage — flat JSON files on disk
//!
//! All persisted state (registry, cooldown records, Telegram cursor) goes
//! through these two functions. Writes are atomic: the payload lands in a
//! uniquely named sibling file first and is then renamed over the target, so
//! a process killed by the scheduler never leaves a half-written file behind.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;

/// Read `path` as JSON.
///
/// A missing file yields `default`. A file that exists but cannot be parsed
/// also yields `default` (with a warning) so one corrupt file never blocks a
/// run.
pub fn load_json<T: DeserializeOwned>(path: &Path, default: T) -> Result<T, AppError> {
    let Some(raw) = read_existing(path)? else {
        return Ok(default);
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unparseable JSON file, using defaults");
            Ok(default)
        }
    }
}

/// Like [`load_json`], but a file that exists and does not parse is an
/// error. Use it for anything that is later written back.
pub fn load_json_strict<T: DeserializeOwned>(path: &Path, default: T) -> Result<T, AppError> {
    match read_existing(path)? {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(default),
    }
}

/// Contents of `path`; `None` when the file is missing or blank.
fn read_existing(path: &Path) -> Result<Option<String>, AppError> {
    match std::fs::read_to_string(path) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::storage(path, e)),
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    let body = serde_json::to_string_pretty(value)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| AppError::storage(parent, e))?;
    }

    let tmp = temp_sibling(path);
    let write = || -> std::io::Result<()> {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(body.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)
    };

    write().map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        AppError::storage(path, e)
    })
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    path.with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4().simple()))
}
