//! Archive bundles mounted as a read-only virtual filesystem.
//!
//! Bundles are zip files. Without the `archive` feature every operation here
//! reports the format as unsupported.

use crate::error::ArchiveError;
use std::path::{Path, PathBuf};

/// Whether this build can decode archive bundles
#[must_use]
pub const fn archive_support_available() -> bool {
    cfg!(feature = "archive")
}

/// Open archive bundle
pub struct ArchiveMount {
    path: PathBuf,
    #[cfg(feature = "archive")]
    archive: zip::ZipArchive<std::io::BufReader<std::fs::File>>,
}

impl std::fmt::Debug for ArchiveMount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveMount")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "archive")]
impl ArchiveMount {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let file = std::fs::File::open(path).map_err(|source| ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let archive = zip::ZipArchive::new(std::io::BufReader::new(file))
            .map_err(|err| classify_zip_error(path, err))?;
        Ok(Self {
            path: path.to_path_buf(),
            archive,
        })
    }

    /// Member paths of every regular file, sorted
    #[must_use]
    pub fn file_entries(&self) -> Vec<String> {
        let mut entries: Vec<String> = self
            .archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(str::to_string)
            .collect();
        entries.sort();
        entries
    }

    /// Whether `member` names a file or a directory inside the archive.
    ///
    /// Directories need not have their own entry; any member below the prefix
    /// is enough. The empty member is the archive root.
    #[must_use]
    pub fn contains(&self, member: &str) -> bool {
        let member = member.trim_matches('/');
        if member.is_empty() {
            return true;
        }
        let dir_prefix = format!("{member}/");
        self.archive
            .file_names()
            .any(|name| name == member || name.starts_with(&dir_prefix))
    }

    /// Whether `member` is a regular file entry
    #[must_use]
    pub fn is_file(&self, member: &str) -> bool {
        !member.ends_with('/') && self.archive.file_names().any(|name| name == member)
    }

    /// Read a member as text (lossy for non UTF-8 bytes)
    pub fn read_to_string(&mut self, member: &str) -> Result<String, ArchiveError> {
        use std::io::Read;

        let mut entry = self
            .archive
            .by_name(member)
            .map_err(|err| classify_zip_error(&self.path, err))?;
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|source| ArchiveError::Io {
                path: self.path.clone(),
                source,
            })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(not(feature = "archive"))]
impl ArchiveMount {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        Err(ArchiveError::Unsupported {
            path: path.to_path_buf(),
            reason: "archive support is not compiled in".to_string(),
        })
    }

    #[must_use]
    pub fn file_entries(&self) -> Vec<String> {
        Vec::new()
    }

    #[must_use]
    pub fn contains(&self, _member: &str) -> bool {
        false
    }

    #[must_use]
    pub fn is_file(&self, _member: &str) -> bool {
        false
    }

    pub fn read_to_string(&mut self, member: &str) -> Result<String, ArchiveError> {
        Err(ArchiveError::MemberNotFound {
            path: self.path.clone(),
            member: member.to_string(),
        })
    }
}

impl ArchiveMount {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Whether `member` exists in the archive at `archive`; unreadable archives count as absent
pub(crate) fn member_exists(archive: &Path, member: &str) -> bool {
    match ArchiveMount::open(archive) {
        Ok(mount) => mount.contains(member),
        Err(err) => {
            log::debug!("Cannot mount {}: {err}", archive.display());
            false
        }
    }
}

#[cfg(feature = "archive")]
fn classify_zip_error(path: &Path, err: zip::result::ZipError) -> ArchiveError {
    use zip::result::ZipError;

    let path = path.to_path_buf();
    match err {
        ZipError::Io(source)
            if matches!(
                source.kind(),
                std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::InvalidData
            ) =>
        {
            ArchiveError::Malformed {
                path,
                reason: source.to_string(),
            }
        }
        ZipError::Io(source) => ArchiveError::Io { path, source },
        ZipError::UnsupportedArchive(reason) => ArchiveError::Unsupported {
            path,
            reason: reason.to_string(),
        },
        ZipError::FileNotFound => ArchiveError::MemberNotFound {
            path,
            member: String::new(),
        },
        other => ArchiveError::Malformed {
            path,
            reason: other.to_string(),
        },
    }
}
