//! Filesystem helpers for certificate and key files.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Certificates are world-readable
pub const CERT_FILE_MODE: u32 = 0o644;

/// Private keys are readable by the owner only
pub const KEY_FILE_MODE: u32 = 0o600;

/// Writing an identity file failed.
#[derive(Debug, thiserror::Error)]
#[error("Failed to write {path}: {source}")]
pub struct PersistError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// True only for an existing regular file (directories do not count).
pub fn is_regular_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// Atomically write `contents` to `path` with exactly `mode` permissions.
///
/// The data goes to a temporary file in the same directory, which is renamed
/// over `path`. Permissions are set explicitly so neither the umask nor an
/// existing file at `path` can loosen them.
pub fn write_with_mode(path: &Path, contents: &[u8], mode: u32) -> Result<(), PersistError> {
    let temp_path = temp_path_for(path);

    write_temp(&temp_path, contents, mode).map_err(|source| {
        let _ = fs::remove_file(&temp_path);
        PersistError {
            path: path.to_path_buf(),
            source,
        }
    })?;

    fs::rename(&temp_path, path).map_err(|source| {
        if temp_path.exists() {
            let _ = fs::remove_file(&temp_path);
        }
        PersistError {
            path: path.to_path_buf(),
            source,
        }
    })
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix: u64 = rand::random();
    path.with_file_name(format!(".{file_name}.tmp-{suffix:x}"))
}

#[cfg(unix)]
fn write_temp(path: &Path, contents: &[u8], mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(mode)
        .open(path)?;
    file.set_permissions(fs::Permissions::from_mode(mode))?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_temp(path: &Path, contents: &[u8], _mode: u32) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}
