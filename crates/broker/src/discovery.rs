use crate::archive::{archive_support_available, ArchiveMount};
use crate::config::BrokerConfig;
use crate::error::{BrokerError, Result};
use crate::path::{get_real_path, has_archive_scheme, resolve_fs, SourcePath};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Shape of a processing target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceShape {
    /// A single unit, on disk or inside an archive
    File(SourcePath),
    /// A directory tree on disk
    Directory(PathBuf),
    /// An archive bundle, optionally narrowed to a member directory
    Archive { archive: PathBuf, prefix: String },
}

/// Classifies targets and enumerates the files they contain
pub struct SourceDiscovery<'a> {
    config: &'a BrokerConfig,
}

impl<'a> SourceDiscovery<'a> {
    pub const fn new(config: &'a BrokerConfig) -> Self {
        Self { config }
    }

    /// Determine what `path` is; fails with `TargetNotFound` when it does not exist
    pub fn classify(&self, path: &Path) -> Result<SourceShape> {
        let raw = path.to_string_lossy();
        if has_archive_scheme(&raw) {
            if !archive_support_available() {
                return Err(BrokerError::UnsupportedFormat {
                    path: raw.into_owned(),
                    reason: "archive support is not compiled in".to_string(),
                });
            }
            let real =
                get_real_path(path).ok_or_else(|| BrokerError::target_not_found(raw.as_ref()))?;
            return self.classify_virtual(real);
        }

        let real = resolve_fs(path)?;
        let disk = PathBuf::from(real.as_str());
        if disk.is_dir() {
            Ok(SourceShape::Directory(disk))
        } else if disk.is_file() && self.config.is_archive_name(real.file_name()) {
            Ok(SourceShape::Archive {
                archive: disk,
                prefix: String::new(),
            })
        } else if disk.is_file() {
            Ok(SourceShape::File(real))
        } else {
            Err(BrokerError::target_not_found(raw.as_ref()))
        }
    }

    fn classify_virtual(&self, real: SourcePath) -> Result<SourceShape> {
        let (archive, member) = real
            .split_archive()
            .ok_or_else(|| BrokerError::target_not_found(real.as_str()))?;
        if member.is_empty() {
            return Ok(SourceShape::Archive {
                archive,
                prefix: member,
            });
        }

        let mount =
            ArchiveMount::open(&archive).map_err(|source| BrokerError::archive(&archive, source))?;
        if mount.is_file(&member) {
            Ok(SourceShape::File(real))
        } else {
            Ok(SourceShape::Archive {
                archive,
                prefix: member,
            })
        }
    }

    /// Files below a directory, in file-name order.
    ///
    /// Each file is keyed by its real path, so a unit reached through a
    /// symlink shares its key with the target. Links to files are included
    /// whether or not `follow_symlinks` is set; that flag only controls
    /// descending into linked directories. Walk errors are yielded, not skipped.
    pub fn directory_files(&self, root: &Path) -> SourceFiles {
        let skip_hidden = self.config.skip_hidden;
        let root_path = root.to_path_buf();
        let walker = WalkDir::new(root)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| !(skip_hidden && is_hidden(entry, &root_path)));

        let files = walker.filter_map(|result| match result {
            Ok(entry) if is_unit_file(&entry) => Some(resolve_fs(entry.path())),
            Ok(_) => None,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf);
                log::warn!("Failed to read entry {path:?}: {err}");
                Some(Err(BrokerError::IoError(err.into())))
            }
        });
        SourceFiles::new(files)
    }

    /// Files inside an open archive below `prefix`, in member-name order
    pub fn archive_files(&self, mount: &ArchiveMount, prefix: &str) -> SourceFiles {
        let prefix = prefix.trim_matches('/');
        let dir_prefix = format!("{prefix}/");
        let archive = mount.path().to_path_buf();
        let members: Vec<String> = mount
            .file_entries()
            .into_iter()
            .filter(|name| prefix.is_empty() || name.starts_with(&dir_prefix))
            .collect();
        SourceFiles::new(
            members
                .into_iter()
                .map(move |member| Ok(SourcePath::archive_member(&archive, &member))),
        )
    }
}

fn is_hidden(entry: &DirEntry, root: &Path) -> bool {
    entry.path() != root
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

/// Regular files, and symlinks whose target is a regular file
fn is_unit_file(entry: &DirEntry) -> bool {
    let file_type = entry.file_type();
    file_type.is_file() || (file_type.is_symlink() && entry.path().is_file())
}

/// Lazy, finite, single-pass sequence of unit paths.
///
/// An `Err` item is a failure to enumerate, and ends a fail-fast walk.
pub struct SourceFiles {
    inner: Box<dyn Iterator<Item = Result<SourcePath>>>,
}

impl SourceFiles {
    fn new(inner: impl Iterator<Item = Result<SourcePath>> + 'static) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }
}

impl Iterator for SourceFiles {
    type Item = Result<SourcePath>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn file_names(files: SourceFiles) -> Vec<String> {
        files
            .map(|p| p.expect("walk entry").file_name().to_string())
            .collect()
    }

    #[test]
    fn classifies_files_directories_and_bundles() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("a.php"), "<?php").unwrap();
        fs::write(temp.path().join("lib.bundle"), "whatever").unwrap();
        let config = BrokerConfig::default();
        let discovery = SourceDiscovery::new(&config);

        assert!(matches!(
            discovery.classify(temp.path()).unwrap(),
            SourceShape::Directory(_)
        ));
        assert!(matches!(
            discovery.classify(&temp.path().join("a.php")).unwrap(),
            SourceShape::File(_)
        ));
        assert!(matches!(
            discovery.classify(&temp.path().join("lib.bundle")).unwrap(),
            SourceShape::Archive { ref prefix, .. } if prefix.is_empty()
        ));
        assert_eq!(
            discovery
                .classify(&temp.path().join("missing.php"))
                .unwrap_err()
                .kind(),
            ErrorKind::TargetNotFound
        );
    }

    #[test]
    fn walks_recursively_in_name_order() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("b/nested")).unwrap();
        fs::write(temp.path().join("c.php"), "").unwrap();
        fs::write(temp.path().join("a.php"), "").unwrap();
        fs::write(temp.path().join("b/nested/d.php"), "").unwrap();

        let config = BrokerConfig::default();
        let files = SourceDiscovery::new(&config).directory_files(temp.path());
        assert_eq!(file_names(files), vec!["a.php", "d.php", "c.php"]);
    }

    #[test]
    fn hidden_entries_are_optional() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join(".cache")).unwrap();
        fs::write(temp.path().join(".cache/x.php"), "").unwrap();
        fs::write(temp.path().join("y.php"), "").unwrap();

        let config = BrokerConfig::default();
        let all = SourceDiscovery::new(&config).directory_files(temp.path());
        assert_eq!(file_names(all).len(), 2);

        let config = BrokerConfig {
            skip_hidden: true,
            ..Default::default()
        };
        let visible = SourceDiscovery::new(&config).directory_files(temp.path());
        assert_eq!(file_names(visible), vec!["y.php"]);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_files_resolve_to_their_target() {
        use std::os::unix::fs::symlink;

        let temp = tempdir().unwrap();
        let outside = tempdir().unwrap();
        fs::write(temp.path().join("a.php"), "").unwrap();
        symlink(temp.path().join("a.php"), temp.path().join("b.php")).unwrap();
        fs::write(outside.path().join("lib.php"), "").unwrap();
        symlink(outside.path().join("lib.php"), temp.path().join("linked.php")).unwrap();
        symlink(outside.path(), temp.path().join("vendor")).unwrap();

        let real_a = fs::canonicalize(temp.path().join("a.php")).unwrap();
        let real_lib = fs::canonicalize(outside.path().join("lib.php")).unwrap();

        let config = BrokerConfig::default();
        let files: Vec<SourcePath> = SourceDiscovery::new(&config)
            .directory_files(temp.path())
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(
            files,
            vec![
                SourcePath::from_fs(&real_a),
                SourcePath::from_fs(&real_a),
                SourcePath::from_fs(&real_lib),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn walk_errors_are_yielded() {
        use std::os::unix::fs::symlink;

        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("loop")).unwrap();
        symlink(temp.path(), temp.path().join("loop/back")).unwrap();

        let config = BrokerConfig {
            follow_symlinks: true,
            ..Default::default()
        };
        let results: Vec<Result<SourcePath>> = SourceDiscovery::new(&config)
            .directory_files(temp.path())
            .collect();
        let err = results
            .into_iter()
            .find_map(std::result::Result::err)
            .expect("loop reported");
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_utf8_file_names_fail_the_walk() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp = tempdir().unwrap();
        fs::write(temp.path().join(OsStr::from_bytes(b"caf\xe9.php")), "").unwrap();

        let config = BrokerConfig::default();
        let err = SourceDiscovery::new(&config)
            .directory_files(temp.path())
            .find_map(std::result::Result::err)
            .expect("invalid name reported");
        assert_eq!(err.kind(), ErrorKind::InvalidPath);
    }
}
