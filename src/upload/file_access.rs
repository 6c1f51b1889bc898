//! Scoped read access to caller-provided files.

use crate::error::{FileError, RestError};
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// Grants and releases read access to a local file.
///
/// Platforms with sandboxed file access implement this to acquire and drop
/// the permission around a single read.
pub trait ScopedFileAccess: Send + Sync {
    /// Acquires access. Returns false if access was refused.
    fn start_access(&self, path: &Path) -> bool;

    /// Releases access acquired by [`ScopedFileAccess::start_access`].
    fn stop_access(&self, path: &Path);
}

/// Access policy that grants every request and releases nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnrestrictedFileAccess;

impl ScopedFileAccess for UnrestrictedFileAccess {
    fn start_access(&self, _path: &Path) -> bool {
        true
    }

    fn stop_access(&self, _path: &Path) {}
}

/// Releases access when dropped.
struct AccessGuard<'a> {
    access: &'a dyn ScopedFileAccess,
    path: &'a Path,
}

impl Drop for AccessGuard<'_> {
    fn drop(&mut self) {
        self.access.stop_access(self.path);
    }
}

/// Reads `path` while holding scoped access. Access is released whether or
/// not the read succeeds.
pub async fn read_scoped(access: &dyn ScopedFileAccess, path: &Path) -> Result<Bytes, RestError> {
    let shown = path.display().to_string();
    if !access.start_access(path) {
        return Err(FileError::AccessDenied { path: shown }.into());
    }
    let _guard = AccessGuard { access, path };

    match tokio::fs::read(path).await {
        Ok(data) => {
            debug!(path = %shown, len = data.len(), "Read upload source");
            Ok(Bytes::from(data))
        }
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            Err(FileError::AccessDenied { path: shown }.into())
        }
        Err(e) => Err(FileError::Read {
            path: shown,
            message: e.to_string(),
        }
        .into()),
    }
}
