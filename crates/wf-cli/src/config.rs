//! Configuration loading and management.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Instant, in nanoseconds, of the `end` anchor of new programs.
    pub end_instant: i64,
    /// Channels created for new programs.
    pub channels: Vec<String>,
    /// Constant value of the `initial` quantity of new programs.
    pub initial_value: f64,
    /// Whether script edits that would be silently ignored fail instead.
    pub strict: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            end_instant: 1000,
            channels: vec!["trace".to_string()],
            initial_value: 1.0,
            strict: true,
        }
    }
}

impl Config {
    /// Loads configuration from the default location, then optionally from a
    /// specific file, then from the environment.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // WF_END_INSTANT, WF_STRICT, ...
        figment = figment.merge(Env::prefixed("WF_"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for wf.
///
/// On Linux: `~/.config/wf`
pub fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("wf"))
}
