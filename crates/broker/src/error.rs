use crate::entity::EntityKind;
use crate::path::SourcePath;
use refbroker_lexer::LexError;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors surfaced by the broker's public API
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Target not found: {path}")]
    TargetNotFound { path: String },

    #[error("Unsupported format for {path}: {reason}")]
    UnsupportedFormat { path: String, reason: String },

    #[error("Failed to process {unit}: {cause}")]
    ProcessingFailed {
        unit: String,
        #[source]
        cause: ProcessingCause,
    },

    #[error("No stored token stream for {unit}")]
    NoStoredTokens { unit: String },

    #[error("Path is not valid UTF-8: {}", path.display())]
    InvalidPath { path: PathBuf },

    #[error("Cannot open archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Fieldless view of [`BrokerError`] for matching without destructuring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TargetNotFound,
    UnsupportedFormat,
    ProcessingFailed,
    NoStoredTokens,
    InvalidPath,
    Archive,
    Io,
}

impl BrokerError {
    pub fn target_not_found(path: impl Into<String>) -> Self {
        Self::TargetNotFound { path: path.into() }
    }

    pub fn processing_failed(unit: impl Into<String>, cause: impl Into<ProcessingCause>) -> Self {
        Self::ProcessingFailed {
            unit: unit.into(),
            cause: cause.into(),
        }
    }

    /// Wrap an archive failure; undecodable formats surface as `UnsupportedFormat`
    pub fn archive(path: &Path, source: ArchiveError) -> Self {
        match source {
            ArchiveError::Unsupported { path, reason } => Self::UnsupportedFormat {
                path: path.display().to_string(),
                reason,
            },
            source => Self::Archive {
                path: path.to_path_buf(),
                source,
            },
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::TargetNotFound { .. } => ErrorKind::TargetNotFound,
            Self::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            Self::ProcessingFailed { .. } => ErrorKind::ProcessingFailed,
            Self::NoStoredTokens { .. } => ErrorKind::NoStoredTokens,
            Self::InvalidPath { .. } => ErrorKind::InvalidPath,
            Self::Archive { .. } => ErrorKind::Archive,
            Self::IoError(_) => ErrorKind::Io,
        }
    }

    /// Innermost cause of a (possibly nested) processing failure.
    ///
    /// Directory and archive walks wrap the failing file's error in their own
    /// `ProcessingFailed`; this follows the chain down to the tokenizer,
    /// builder or backend error that started it.
    #[must_use]
    pub fn root_cause(&self) -> Option<&ProcessingCause> {
        let Self::ProcessingFailed { cause, .. } = self else {
            return None;
        };
        match cause {
            ProcessingCause::Unit(inner) => inner.root_cause().or(Some(cause)),
            other => Some(other),
        }
    }

    /// Path of the innermost unit that failed to process
    #[must_use]
    pub fn failed_unit(&self) -> Option<&str> {
        let Self::ProcessingFailed { unit, cause } = self else {
            return None;
        };
        match cause {
            ProcessingCause::Unit(inner) => inner.failed_unit().or(Some(unit)),
            _ => Some(unit),
        }
    }
}

/// Underlying failure kept on [`BrokerError::ProcessingFailed`]
#[derive(Error, Debug)]
pub enum ProcessingCause {
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A member of a directory or archive walk failed
    #[error(transparent)]
    Unit(Box<BrokerError>),
}

impl From<BrokerError> for ProcessingCause {
    fn from(err: BrokerError) -> Self {
        Self::Unit(Box::new(err))
    }
}

/// Failure to obtain a token stream for a source unit
#[derive(Error, Debug)]
pub enum TokenizeError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: SourcePath,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Lex(#[from] LexError),
}

/// Structural inconsistency found while building entities from tokens
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("Unbalanced braces near line {line}")]
    UnbalancedBraces { line: u32 },

    #[error("`{keyword}` without a name at line {line}")]
    MissingName { keyword: String, line: u32 },

    #[error("{kind} {name} declared twice (line {line})")]
    DuplicateDeclaration {
        kind: EntityKind,
        name: String,
        line: u32,
    },

    #[error("Namespace declarations cannot be nested (line {line})")]
    NestedNamespace { line: u32 },

    #[error("Declaration of {name} has no body (line {line})")]
    MissingBody { name: String, line: u32 },
}

/// Errors reported by a [`crate::Backend`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("No stored token stream for {unit}")]
    NoStoredTokens { unit: SourcePath },

    #[error("{kind} {name} in {unit} is already declared in {existing}")]
    Redeclared {
        kind: EntityKind,
        name: String,
        unit: SourcePath,
        existing: String,
    },
}

/// Errors opening or reading an archive bundle
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The bytes are not a structurally valid archive
    #[error("Malformed archive {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// Valid archive using a feature this build cannot decode
    #[error("Unsupported archive {path}: {reason}")]
    Unsupported { path: PathBuf, reason: String },

    #[error("No member {member} in archive {path}")]
    MemberNotFound { path: PathBuf, member: String },

    #[error("IO error reading archive {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ArchiveError {
    /// Structural decode failures are the only ones worth retrying as a plain file
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_cause_follows_nested_units() {
        let file_error = BrokerError::processing_failed(
            "/src/bad.php",
            TokenizeError::Lex(LexError::UnterminatedComment { line: 3 }),
        );
        let dir_error = BrokerError::processing_failed("/src", file_error);

        assert_eq!(dir_error.kind(), ErrorKind::ProcessingFailed);
        assert_eq!(dir_error.failed_unit(), Some("/src/bad.php"));
        assert!(matches!(
            dir_error.root_cause(),
            Some(ProcessingCause::Tokenize(TokenizeError::Lex(
                LexError::UnterminatedComment { line: 3 }
            )))
        ));
    }

    #[test]
    fn source_chain_is_preserved() {
        use std::error::Error as _;

        let err = BrokerError::processing_failed(
            "/a.php",
            BuildError::UnbalancedBraces { line: 9 },
        );
        let source = err.source().expect("cause kept as source");
        assert_eq!(source.to_string(), "Unbalanced braces near line 9");
    }

    #[test]
    fn unsupported_archives_map_to_unsupported_format() {
        let err = BrokerError::archive(
            Path::new("/srv/app.bundle"),
            ArchiveError::Unsupported {
                path: PathBuf::from("/srv/app.bundle"),
                reason: "encrypted".to_string(),
            },
        );
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
        assert_eq!(
            err.to_string(),
            "Unsupported format for /srv/app.bundle: encrypted"
        );

        let err = BrokerError::archive(
            Path::new("/srv/app.bundle"),
            ArchiveError::Malformed {
                path: PathBuf::from("/srv/app.bundle"),
                reason: "bad header".to_string(),
            },
        );
        assert_eq!(err.kind(), ErrorKind::Archive);
    }

    #[test]
    fn non_processing_errors_have_no_root_cause() {
        let err = BrokerError::target_not_found("/missing");
        assert!(err.root_cause().is_none());
        assert!(err.failed_unit().is_none());
        assert_eq!(err.kind(), ErrorKind::TargetNotFound);
    }
}
