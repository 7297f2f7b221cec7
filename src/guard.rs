//! Private key access guard.
//!
//! When the active TLS key lives inside the served directory, every request is
//! checked against it before the static file service sees the request. A match
//! gets the same empty 404 the file service returns for missing files.
//!
//! Two checks run per request:
//! - [`KeyGuard::is_blocked`] normalizes the request path (percent-decoding,
//!   `.`/`..` segments, repeated and trailing slashes) and compares it with the
//!   key's location relative to the served root.
//! - [`KeyGuard::resolves_to_key`] looks at the file the request would reach on
//!   disk, catching symlinks and hard links to the key.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use percent_encoding::percent_decode_str;

/// File served for directory requests by the static file service
const DIRECTORY_INDEX: &str = "index.html";

/// Blocks requests that would reach the active private key.
#[derive(Debug, Clone)]
pub struct KeyGuard {
    root: PathBuf,
    key: Option<ProtectedKey>,
}

#[derive(Debug, Clone)]
struct ProtectedKey {
    /// Absolute path with symlinks resolved
    path: PathBuf,
    /// Every root-relative segment list that names the key, as configured and
    /// as resolved on disk
    spellings: Vec<Vec<OsString>>,
    #[cfg(unix)]
    file_id: Option<FileId>,
}

#[cfg(unix)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileId {
    dev: u64,
    ino: u64,
}

#[cfg(unix)]
impl FileId {
    fn of(metadata: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }
}

impl KeyGuard {
    /// Guard `active_key` if it lies inside `served_root`.
    ///
    /// Relative paths are resolved against the working directory. The key is
    /// inside the tree if either its configured absolute path or its resolved
    /// path is, so a key file symlinked to a target elsewhere is still guarded.
    /// A key outside the served tree produces a guard that never blocks.
    pub fn new(served_root: &Path, active_key: &Path) -> Self {
        let root = resolve(served_root);
        let key_path = resolve(active_key);
        let roots = [root.clone(), lexical_absolute(served_root)];
        let keys = [key_path.clone(), lexical_absolute(active_key)];

        let mut spellings: Vec<Vec<OsString>> = Vec::new();
        for base in &roots {
            for key in &keys {
                if let Some(segments) = segments_under(base, key) {
                    if !spellings.contains(&segments) {
                        spellings.push(segments);
                    }
                }
            }
        }

        let key = (!spellings.is_empty()).then(|| ProtectedKey {
            #[cfg(unix)]
            file_id: std::fs::metadata(&key_path).ok().map(|m| FileId::of(&m)),
            path: key_path,
            spellings,
        });

        Self { root, key }
    }

    /// A guard that never blocks, for servers without HTTPS.
    pub fn disabled() -> Self {
        Self {
            root: PathBuf::new(),
            key: None,
        }
    }

    /// The protected key path, if the key lies inside the served tree.
    pub fn protected_key(&self) -> Option<&Path> {
        self.key.as_ref().map(|k| k.path.as_path())
    }

    /// True if `request_path` names the protected key once normalized.
    pub fn is_blocked(&self, request_path: &str) -> bool {
        let Some(key) = &self.key else {
            return false;
        };
        let Some(segments) = normalize_request_path(request_path) else {
            return false;
        };
        key.spellings.contains(&segments)
    }

    /// True if the file `request_path` would be served from is the protected key.
    pub async fn resolves_to_key(&self, request_path: &str) -> bool {
        let Some(key) = &self.key else {
            return false;
        };

        let Some(segments) = normalize_request_path(request_path) else {
            return false;
        };
        let mut candidate = self.root.clone();
        candidate.extend(segments);

        let Ok(metadata) = tokio::fs::metadata(&candidate).await else {
            return false;
        };
        if metadata.is_dir() {
            candidate.push(DIRECTORY_INDEX);
        }

        #[cfg(unix)]
        {
            if let Some(file_id) = key.file_id {
                return match tokio::fs::metadata(&candidate).await {
                    Ok(metadata) => FileId::of(&metadata) == file_id,
                    Err(_) => false,
                };
            }
        }

        match tokio::fs::canonicalize(&candidate).await {
            Ok(resolved) => resolved == key.path,
            Err(_) => false,
        }
    }
}

/// Split a request path into the segments the file service would resolve.
///
/// Decoding and splitting follow `ServeDir`: leading slashes are trimmed, the
/// rest is percent-decoded as strict UTF-8 and split into platform path
/// components, so `\` is a separator only where the platform says so. `..`
/// removes the previous segment and never climbs above the root. `None` means
/// the file service rejects the path outright.
pub fn normalize_request_path(request_path: &str) -> Option<Vec<OsString>> {
    let trimmed = request_path.trim_start_matches('/');
    let decoded = percent_decode_str(trimmed).decode_utf8().ok()?;

    let mut segments = Vec::new();
    for component in Path::new(&*decoded).components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_os_string()),
            Component::CurDir => {}
            Component::ParentDir => {
                segments.pop();
            }
            Component::RootDir | Component::Prefix(_) => segments.clear(),
        }
    }
    Some(segments)
}

/// Segments of `path` below `base`, if `path` lies strictly inside it.
fn segments_under(base: &Path, path: &Path) -> Option<Vec<OsString>> {
    let relative = path.strip_prefix(base).ok()?;
    let segments: Vec<OsString> = relative
        .components()
        .map(|c| c.as_os_str().to_os_string())
        .collect();
    (!segments.is_empty()).then_some(segments)
}

/// Absolute path with symlinks resolved as far as the filesystem allows.
///
/// A file that does not exist yet is resolved through its parent directory.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }
    let absolute = lexical_absolute(path);
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => match std::fs::canonicalize(parent) {
            Ok(parent) => parent.join(name),
            Err(_) => absolute.clone(),
        },
        _ => absolute.clone(),
    }
}

/// Absolute path with `.` and `..` folded, without touching symlinks.
fn lexical_absolute(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    lexically_normalize(&absolute)
}

fn lexically_normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Middleware answering 404 for any request that would reach the protected key.
pub async fn key_guard_layer(
    State(guard): State<Arc<KeyGuard>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    if guard.is_blocked(&path) || guard.resolves_to_key(&path).await {
        return StatusCode::NOT_FOUND.into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn served_dir_with_key() -> (TempDir, KeyGuard) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("cert.key"), b"key").unwrap();
        fs::write(dir.path().join("regular.txt"), b"regular").unwrap();
        let guard = KeyGuard::new(dir.path(), &dir.path().join("cert.key"));
        (dir, guard)
    }

    fn normalized(request_path: &str) -> Vec<String> {
        normalize_request_path(request_path)
            .unwrap()
            .into_iter()
            .map(|s| s.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_normalize_request_path() {
        assert_eq!(normalized("/"), Vec::<String>::new());
        assert_eq!(normalized("/a/b"), vec!["a", "b"]);
        assert_eq!(normalized("//a///b/"), vec!["a", "b"]);
        assert_eq!(normalized("/a/./b/../c"), vec!["a", "c"]);
        assert_eq!(normalized("/../../a"), vec!["a"]);
        assert_eq!(normalized("/a%20b"), vec!["a b"]);
        assert_eq!(normalized("/x/%2e%2e/y"), vec!["y"]);
        assert_eq!(normalized("/x%2f..%2fy"), vec!["y"]);
        assert_eq!(normalized("/%2Fy"), vec!["y"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_backslash_is_part_of_the_name() {
        assert_eq!(normalized("/x\\..\\y"), vec!["x\\..\\y"]);
        assert_eq!(normalized("/a%5Cb.key"), vec!["a\\b.key"]);
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        assert!(normalize_request_path("/%ff.key").is_none());
    }

    #[test]
    fn test_blocks_key_at_root() {
        let (_dir, guard) = served_dir_with_key();

        assert!(guard.protected_key().is_some());
        assert!(guard.is_blocked("/cert.key"));
        assert!(guard.is_blocked("cert.key"));
        assert!(guard.is_blocked("/./cert.key"));
        assert!(guard.is_blocked("/a/../cert.key"));
        assert!(guard.is_blocked("/subdir/../cert.key"));
        assert!(guard.is_blocked("//cert.key"));
        assert!(guard.is_blocked("/cert.key/"));
        assert!(guard.is_blocked("/../cert.key"));
        assert!(guard.is_blocked("/%63ert.key"));
        assert!(guard.is_blocked("/sub/%2e%2e/cert.key"));
    }

    #[test]
    fn test_allows_other_paths() {
        let (_dir, guard) = served_dir_with_key();

        assert!(!guard.is_blocked("/"));
        assert!(!guard.is_blocked("/regular.txt"));
        assert!(!guard.is_blocked("/cert.crt"));
        assert!(!guard.is_blocked("/cert.key.bak"));
        assert!(!guard.is_blocked("/sub/cert.key"));
        assert!(!guard.is_blocked("/xcert.key"));
    }

    #[test]
    fn test_key_in_subdirectory() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("tls")).unwrap();
        fs::write(dir.path().join("tls").join("cert.key"), b"key").unwrap();
        fs::write(dir.path().join("cert.key"), b"not the key").unwrap();

        let guard = KeyGuard::new(dir.path(), &dir.path().join("tls").join("cert.key"));

        assert!(guard.is_blocked("/tls/cert.key"));
        assert!(guard.is_blocked("/other/../tls/./cert.key"));
        // Same file name elsewhere in the tree is not the key
        assert!(!guard.is_blocked("/cert.key"));
        assert!(!guard.is_blocked("/tls"));
    }

    #[test]
    fn test_key_outside_served_tree_never_blocks() {
        let served = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        fs::write(elsewhere.path().join("cert.key"), b"key").unwrap();
        fs::write(served.path().join("cert.key"), b"public").unwrap();

        let guard = KeyGuard::new(served.path(), &elsewhere.path().join("cert.key"));

        assert!(guard.protected_key().is_none());
        assert!(!guard.is_blocked("/cert.key"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_key_pointing_outside_tree_is_guarded() {
        let served = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        fs::write(elsewhere.path().join("real.key"), b"key").unwrap();
        std::os::unix::fs::symlink(
            elsewhere.path().join("real.key"),
            served.path().join("cert.key"),
        )
        .unwrap();

        let guard = KeyGuard::new(served.path(), &served.path().join("cert.key"));

        assert!(guard.protected_key().is_some());
        assert!(guard.is_blocked("/cert.key"));
        assert!(guard.is_blocked("/sub/../cert.key"));
        assert!(guard.resolves_to_key("/cert.key").await);
        assert!(!guard.is_blocked("/real.key"));
    }

    #[cfg(unix)]
    #[test]
    fn test_key_configured_through_outside_symlink_is_guarded() {
        let served = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        fs::write(served.path().join("real.key"), b"key").unwrap();
        std::os::unix::fs::symlink(
            served.path().join("real.key"),
            elsewhere.path().join("cert.key"),
        )
        .unwrap();

        let guard = KeyGuard::new(served.path(), &elsewhere.path().join("cert.key"));

        assert!(guard.is_blocked("/real.key"));
        assert!(!guard.is_blocked("/cert.key"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_key_name_with_backslash() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a\\b.key"), b"key").unwrap();
        let guard = KeyGuard::new(dir.path(), &dir.path().join("a\\b.key"));

        assert!(guard.is_blocked("/a%5Cb.key"));
        assert!(guard.is_blocked("/a%5cb.key"));
        assert!(guard.resolves_to_key("/a%5Cb.key").await);
        assert!(!guard.is_blocked("/a/b.key"));
    }

    #[test]
    fn test_disabled_guard_never_blocks() {
        let guard = KeyGuard::disabled();
        assert!(!guard.is_blocked("/cert.key"));
        assert!(!guard.is_blocked("/"));
    }

    #[test]
    fn test_differently_spelled_root_and_key() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("www")).unwrap();
        fs::write(dir.path().join("www").join("cert.key"), b"key").unwrap();

        let root = dir.path().join("www").join(".");
        let key = dir.path().join("www").join("..").join("www").join("cert.key");
        let guard = KeyGuard::new(&root, &key);

        assert!(guard.is_blocked("/cert.key"));
    }

    #[test]
    fn test_key_not_yet_on_disk_is_still_guarded() {
        let dir = TempDir::new().unwrap();
        let guard = KeyGuard::new(dir.path(), &dir.path().join("cert.key"));

        assert!(guard.is_blocked("/cert.key"));
    }

    #[test]
    fn test_served_root_itself_is_not_a_key() {
        let dir = TempDir::new().unwrap();
        let guard = KeyGuard::new(dir.path(), dir.path());

        assert!(guard.protected_key().is_none());
        assert!(!guard.is_blocked("/"));
    }

    #[tokio::test]
    async fn test_resolves_to_key_plain_file() {
        let (_dir, guard) = served_dir_with_key();

        assert!(guard.resolves_to_key("/cert.key").await);
        assert!(!guard.resolves_to_key("/regular.txt").await);
        assert!(!guard.resolves_to_key("/missing.txt").await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolves_to_key_through_symlink() {
        let (dir, guard) = served_dir_with_key();
        std::os::unix::fs::symlink(dir.path().join("cert.key"), dir.path().join("innocent.txt"))
            .unwrap();

        assert!(!guard.is_blocked("/innocent.txt"));
        assert!(guard.resolves_to_key("/innocent.txt").await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolves_to_key_as_directory_index() {
        let (dir, guard) = served_dir_with_key();
        fs::create_dir(dir.path().join("docs")).unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("cert.key"),
            dir.path().join("docs").join("index.html"),
        )
        .unwrap();

        assert!(guard.resolves_to_key("/docs/").await);
        assert!(guard.resolves_to_key("/docs").await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolves_to_key_through_hard_link() {
        let (dir, guard) = served_dir_with_key();
        fs::hard_link(dir.path().join("cert.key"), dir.path().join("copy.txt")).unwrap();

        assert!(guard.resolves_to_key("/copy.txt").await);
    }

    #[tokio::test]
    async fn test_disabled_guard_does_not_touch_disk() {
        let guard = KeyGuard::disabled();
        assert!(!guard.resolves_to_key("/etc/passwd").await);
    }
}
