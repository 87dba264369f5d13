use crate::error::{BrokerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Scheme prefix for locations inside a mounted archive bundle.
///
/// A virtual path is the scheme, the absolute archive path, then `/` and the
/// member path: `bundle:///srv/app.bundle/src/Model.php`.
pub const ARCHIVE_SCHEME: &str = "bundle://";

/// Normalized location of a source unit, on disk or inside an archive
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourcePath(String);

impl SourcePath {
    /// Wrap an already-canonical filesystem path known to be valid UTF-8
    pub fn from_fs(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }

    /// Wrap a filesystem path, or `None` when it is not valid UTF-8
    pub fn try_from_fs(path: &Path) -> Option<Self> {
        path.to_str().map(|s| Self(s.to_string()))
    }

    /// Virtual path of `member` inside the archive at `archive`
    pub fn archive_member(archive: &Path, member: &str) -> Self {
        let archive = archive.to_string_lossy();
        let member = member.trim_start_matches('/');
        if member.is_empty() {
            Self(format!("{ARCHIVE_SCHEME}{archive}"))
        } else {
            Self(format!("{ARCHIVE_SCHEME}{archive}/{member}"))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_archive(&self) -> bool {
        has_archive_scheme(&self.0)
    }

    /// Split a virtual path into the archive file and the member path.
    ///
    /// The archive is the shortest prefix that is a regular file on disk. The
    /// member is empty when the path names the archive itself.
    #[must_use]
    pub fn split_archive(&self) -> Option<(PathBuf, String)> {
        split_archive_str(&self.0)
    }

    /// Last path segment, used for archive-suffix matching and logging
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SourcePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<Path> for SourcePath {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

pub(crate) fn has_archive_scheme(raw: &str) -> bool {
    raw.starts_with(ARCHIVE_SCHEME)
}

fn split_archive_str(raw: &str) -> Option<(PathBuf, String)> {
    let inner = raw.strip_prefix(ARCHIVE_SCHEME)?;
    let inner = inner.trim_end_matches('/');
    if inner.is_empty() {
        return None;
    }

    let boundaries = inner
        .match_indices('/')
        .map(|(idx, _)| idx)
        .filter(|&idx| idx > 0)
        .chain(std::iter::once(inner.len()));
    for end in boundaries {
        let candidate = Path::new(&inner[..end]);
        if candidate.is_file() {
            let member = inner[end..].trim_start_matches('/').to_string();
            return Some((candidate.to_path_buf(), member));
        }
    }
    None
}

/// Resolve `path` to its normalized form without touching broker state.
///
/// Archive-scheme paths are returned unchanged when they name an existing
/// file or directory inside the archive. Ordinary paths are canonicalized.
/// `None` means the location does not exist.
pub fn get_real_path(path: impl AsRef<Path>) -> Option<SourcePath> {
    let raw = path.as_ref().to_string_lossy();
    if has_archive_scheme(&raw) {
        let virtual_path = SourcePath(raw.into_owned());
        let (archive, member) = virtual_path.split_archive()?;
        return crate::archive::member_exists(&archive, &member).then_some(virtual_path);
    }

    resolve_fs(path.as_ref()).ok()
}

/// Canonicalize a path on disk into a unit key.
///
/// Fails with `TargetNotFound` when the path does not resolve and with
/// `InvalidPath` when the resolved path is not valid UTF-8.
pub(crate) fn resolve_fs(path: &Path) -> Result<SourcePath> {
    let canonical = std::fs::canonicalize(path)
        .map_err(|_| BrokerError::target_not_found(path.to_string_lossy()))?;
    SourcePath::try_from_fs(&canonical).ok_or(BrokerError::InvalidPath { path: canonical })
}
