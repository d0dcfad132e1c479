//! Session configuration structures

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunables for batch runs and selection sessions, read from the
/// `[session]` table of a TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum number of recompute rounds before the session fails with
    /// `RecomputeLoopExceeded`.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Run provider calls for distinct providers on the rayon pool.
    #[serde(default = "default_parallel_providers")]
    pub parallel_providers: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            parallel_providers: default_parallel_providers(),
        }
    }
}

fn default_max_rounds() -> u32 {
    32
}

fn default_parallel_providers() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    session: SessionConfig,
}

impl SessionConfig {
    /// Parse from TOML text. Missing keys fall back to defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text)?;
        Ok(file.session)
    }

    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("no session config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_parallel_providers(mut self, parallel: bool) -> Self {
        self.parallel_providers = parallel;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.max_rounds, 32);
        assert!(config.parallel_providers);
    }

    #[test]
    fn parses_session_table() {
        let config = SessionConfig::from_toml_str(
            r#"
            [session]
            max_rounds = 5
            parallel_providers = false
            "#,
        )
        .unwrap();
        assert_eq!(config.max_rounds, 5);
        assert!(!config.parallel_providers);
    }

    #[test]
    fn partial_table_keeps_defaults() {
        let config = SessionConfig::from_toml_str("[session]\nmax_rounds = 3\n").unwrap();
        assert_eq!(config.max_rounds, 3);
        assert!(config.parallel_providers);

        let empty = SessionConfig::from_toml_str("").unwrap();
        assert_eq!(empty, SessionConfig::default());
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let result = SessionConfig::from_toml_str("[session]\nmax_rounds = \"many\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn load_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = SessionConfig::load(temp.path().join("absent.toml")).unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn load_reads_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("mfx.toml");
        fs::write(&path, "[session]\nparallel_providers = false\n").unwrap();

        let config = SessionConfig::load(&path).unwrap();
        assert!(!config.parallel_providers);
        assert_eq!(config.max_rounds, 32);
    }
}
