//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.agreewatch.toml` files.

use crate::analysis::ExpiryWindows;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = ".agreewatch.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Record source settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Expiry notification settings.
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,

    /// Read-state persistence settings.
    #[serde(default)]
    pub read_state: ReadStateConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// User whose read state is applied.
    #[serde(default = "default_user")]
    pub user: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
            user: default_user(),
        }
    }
}

fn default_output() -> String {
    "agreewatch_report.md".to_string()
}

fn default_user() -> String {
    "admin".to_string()
}

/// Where records are loaded from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// JSON file or directory of exported records.
    #[serde(default)]
    pub records: Option<PathBuf>,

    /// Base URL of the hosted record store.
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Table holding the agreements.
    #[serde(default = "default_table")]
    pub table: String,

    /// API key for the hosted store.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            records: None,
            remote_url: None,
            table: default_table(),
            api_key: None,
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_table() -> String {
    "agreements".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Expiry window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Days covered by the 1-month bucket.
    #[serde(default = "default_one_month_days")]
    pub one_month_days: i64,

    /// Days covered by the 6-month bucket.
    #[serde(default = "default_six_month_days")]
    pub six_month_days: i64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            one_month_days: default_one_month_days(),
            six_month_days: default_six_month_days(),
        }
    }
}

impl NotificationConfig {
    pub fn windows(&self) -> ExpiryWindows {
        ExpiryWindows {
            one_month_days: self.one_month_days,
            six_month_days: self.six_month_days,
        }
    }
}

fn default_one_month_days() -> i64 {
    30
}

fn default_six_month_days() -> i64 {
    180
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Rows in the top types/universities tables.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// List notifications that are already read.
    #[serde(default = "default_true")]
    pub include_read: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            include_read: true,
        }
    }
}

fn default_top_n() -> usize {
    5
}

fn default_true() -> bool {
    true
}

/// Read-state file settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadStateConfig {
    /// JSON file holding acknowledged notification keys per user.
    #[serde(default = "default_read_state_path")]
    pub path: PathBuf,
}

impl Default for ReadStateConfig {
    fn default() -> Self {
        Self {
            path: default_read_state_path(),
        }
    }
}

fn default_read_state_path() -> PathBuf {
    PathBuf::from(".agreewatch-read.json")
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        // A source on the command line replaces both configured sources
        if let Some(ref records) = args.records {
            self.source.records = Some(records.clone());
            self.source.remote_url = None;
        }
        if let Some(ref url) = args.remote_url {
            self.source.remote_url = Some(url.clone());
            self.source.records = None;
        }
        if let Some(ref table) = args.table {
            self.source.table = table.clone();
        }
        if let Some(ref key) = args.api_key {
            self.source.api_key = Some(key.clone());
        }

        if let Some(ref user) = args.user {
            self.general.user = user.trim().to_string();
        }
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if let Some(top) = args.top {
            self.report.top_n = top;
        }
        if args.unread_only {
            self.report.include_read = false;
        }
        if let Some(ref path) = args.read_state {
            self.read_state.path = path.clone();
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Check values the CLI parser cannot.
    pub fn validate(&self) -> Result<()> {
        let n = &self.notifications;
        if n.one_month_days < 1 {
            bail!("one_month_days must be at least 1");
        }
        if n.six_month_days < n.one_month_days {
            bail!("six_month_days must not be shorter than one_month_days");
        }
        if self.report.top_n == 0 {
            bail!("top_n must be at least 1");
        }
        if self.general.user.trim().is_empty() {
            bail!("user must not be empty");
        }
        if self.source.timeout_seconds == 0 {
            bail!("timeout_seconds must be at least 1");
        }
        Ok(())
    }

    /// Log level after merging: quiet wins, then `[general] verbose`.
    pub fn log_level(&self, quiet: bool) -> tracing::Level {
        if quiet {
            tracing::Level::ERROR
        } else if self.general.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Args;
    use clap::Parser;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.user, "admin");
        assert_eq!(config.notifications.windows(), ExpiryWindows::default());
        assert_eq!(config.report.top_n, 5);
        assert!(config.source.records.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output = "dashboard.md"
user = "registrar"

[source]
records = "exports/agreements.json"

[notifications]
one_month_days = 14
six_month_days = 90

[report]
top_n = 3
include_read = false
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output, "dashboard.md");
        assert_eq!(config.general.user, "registrar");
        assert_eq!(
            config.source.records,
            Some(PathBuf::from("exports/agreements.json"))
        );
        assert_eq!(config.source.table, "agreements");
        assert_eq!(config.notifications.windows().one_month_days, 14);
        assert_eq!(config.notifications.windows().six_month_days, 90);
        assert_eq!(config.report.top_n, 3);
        assert!(!config.report.include_read);
    }

    #[test]
    fn test_validate_rejects_inverted_windows() {
        let mut config = Config::default();
        config.notifications.six_month_days = 10;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.notifications.one_month_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_merge_only_overrides_given_flags() {
        let mut config: Config = toml::from_str(
            r#"
[general]
user = "registrar"

[source]
remote_url = "https://project.example.co"

[report]
top_n = 8
"#,
        )
        .unwrap();

        let args = Args::try_parse_from(["agreewatch", "--records", "local.json", "--unread-only"])
            .unwrap();
        config.merge_with_args(&args);

        assert_eq!(config.general.user, "registrar");
        assert_eq!(config.report.top_n, 8);
        assert!(!config.report.include_read);
        assert_eq!(config.source.records, Some(PathBuf::from("local.json")));
        assert!(config.source.remote_url.is_none());
    }

    #[test]
    fn test_log_level_from_config_and_flags() {
        let mut config: Config = toml::from_str("[general]\nverbose = true\n").unwrap();
        let args = Args::try_parse_from(["agreewatch"]).unwrap();
        config.merge_with_args(&args);
        assert_eq!(config.log_level(args.quiet), tracing::Level::DEBUG);
        assert_eq!(config.log_level(true), tracing::Level::ERROR);

        let mut config = Config::default();
        assert_eq!(config.log_level(false), tracing::Level::INFO);

        let args = Args::try_parse_from(["agreewatch", "--verbose"]).unwrap();
        config.merge_with_args(&args);
        assert_eq!(config.log_level(args.quiet), tracing::Level::DEBUG);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[notifications]"));
        assert!(toml_str.contains("[read_state]"));
    }
}
