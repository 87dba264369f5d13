use serde::{Deserialize, Serialize};

/// Configuration for a [`crate::Broker`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Keep token streams after building so `get_file_tokens` can serve them
    pub retain_token_streams: bool,

    /// File suffix (without the dot) that marks an archive bundle
    pub archive_suffix: String,

    /// Keep at most this many units tokenized; older ones become placeholders
    pub max_tokenized_units: Option<usize>,

    /// Follow symbolic links while walking directories
    pub follow_symlinks: bool,

    /// Skip dot-files and dot-directories while walking directories
    pub skip_hidden: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            retain_token_streams: true,
            archive_suffix: "bundle".to_string(),
            max_tokenized_units: None,
            follow_symlinks: false,
            skip_hidden: false,
        }
    }
}

impl BrokerConfig {
    /// Config for large trees: streams are dropped after building
    pub fn low_memory() -> Self {
        Self {
            retain_token_streams: false,
            ..Default::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        let suffix = self.archive_suffix.trim_start_matches('.');
        if suffix.is_empty() {
            return Err("archive_suffix must not be empty".to_string());
        }
        if suffix.contains('/') {
            return Err(format!(
                "archive_suffix ({}) must not contain a path separator",
                self.archive_suffix
            ));
        }
        if self.max_tokenized_units == Some(0) {
            return Err("max_tokenized_units must be > 0".to_string());
        }
        Ok(())
    }

    /// Whether `file_name` carries the archive-bundle suffix
    #[must_use]
    pub fn is_archive_name(&self, file_name: &str) -> bool {
        let suffix = self.archive_suffix.trim_start_matches('.');
        file_name
            .rsplit_once('.')
            .is_some_and(|(stem, ext)| !stem.is_empty() && ext.eq_ignore_ascii_case(suffix))
    }
}
