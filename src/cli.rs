//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::analysis::{has_unread_at_or_above, NotificationPolicy};
use crate::models::{NotificationBucket, NotificationEntry, NotificationKey};
use crate::read_state::ReadStateEdits;
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

/// agreewatch - partnership agreement dashboard
///
/// Summarize partnership agreements and flag the ones nearing expiry.
/// Markdown/JSON output, per-user read state.
///
/// Examples:
///   agreewatch --records agreements.json
///   agreewatch --records exports/ --role partner --university "Universiti Malaya"
///   agreewatch --remote-url https://project.example.co --format json -o -
///   agreewatch --records agreements.json --mark-read 42:1-month
///   agreewatch --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// JSON file or directory of JSON files holding agreement records
    #[arg(short, long, value_name = "PATH", env = "AGREEWATCH_RECORDS")]
    pub records: Option<PathBuf>,

    /// Base URL of the hosted record store
    #[arg(long, value_name = "URL", env = "AGREEWATCH_REMOTE_URL")]
    pub remote_url: Option<String>,

    /// Table holding the agreements on the hosted store
    #[arg(long, value_name = "TABLE")]
    pub table: Option<String>,

    /// API key for the hosted store
    #[arg(long, value_name = "KEY", env = "AGREEWATCH_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Dashboard view
    #[arg(long, default_value = "admin", value_name = "ROLE")]
    pub role: Role,

    /// University shown in the partner view
    #[arg(short, long, value_name = "NAME")]
    pub university: Option<String>,

    /// User whose read state is used
    #[arg(long, value_name = "USER", env = "AGREEWATCH_USER")]
    pub user: Option<String>,

    /// Reference date (YYYY-MM-DD); defaults to the local date
    #[arg(long, value_name = "DATE", value_parser = parse_day)]
    pub today: Option<NaiveDate>,

    /// Output file path for the dashboard ("-" for stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Number of entries in the top types/universities tables
    #[arg(long, value_name = "COUNT")]
    pub top: Option<usize>,

    /// Read-state file
    #[arg(long, value_name = "FILE")]
    pub read_state: Option<PathBuf>,

    /// Mark a notification as read (KEY is "<id>:<bucket>")
    #[arg(long, value_name = "KEY", value_parser = parse_key)]
    pub mark_read: Vec<NotificationKey>,

    /// Mark a notification as unread
    #[arg(long, value_name = "KEY", value_parser = parse_key)]
    pub mark_unread: Vec<NotificationKey>,

    /// Mark every current notification as read
    #[arg(long)]
    pub mark_all_read: bool,

    /// Hide notifications already marked read
    #[arg(long)]
    pub unread_only: bool,

    /// Exit with code 2 if unread notifications at or above this urgency remain
    ///
    /// Values: expired, 1-month, 6-month
    #[arg(long, value_name = "BUCKET")]
    pub fail_on: Option<FailOnBucket>,

    /// Load and validate records, then exit without rendering
    #[arg(long)]
    pub dry_run: bool,

    /// Path to configuration file
    ///
    /// If not specified, looks for .agreewatch.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .agreewatch.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Dashboard view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Role {
    /// All agreements
    #[default]
    Admin,
    /// One partner university
    Partner,
}

/// Urgency threshold for --fail-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FailOnBucket {
    Expired,
    #[value(name = "1-month")]
    OneMonth,
    #[value(name = "6-month")]
    SixMonth,
}

impl From<FailOnBucket> for NotificationBucket {
    fn from(level: FailOnBucket) -> Self {
        match level {
            FailOnBucket::Expired => NotificationBucket::Expired,
            FailOnBucket::OneMonth => NotificationBucket::OneMonth,
            FailOnBucket::SixMonth => NotificationBucket::SixMonth,
        }
    }
}

fn parse_day(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM-DD: {}", e))
}

fn parse_key(s: &str) -> Result<NotificationKey, String> {
    s.parse::<NotificationKey>()
        .map_err(|e| format!("{} (expected <id>:<expired|1-month|6-month>)", e))
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.records.is_some() && self.remote_url.is_some() {
            return Err("Use either --records or --remote-url, not both".to_string());
        }

        if let Some(ref url) = self.remote_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Remote URL must start with 'http://' or 'https://'".to_string());
            }
        }

        match (self.role, self.university.as_deref().map(str::trim)) {
            (Role::Partner, None) | (Role::Partner, Some("")) => {
                return Err("--role partner requires --university".to_string());
            }
            (Role::Admin, Some(_)) => {
                return Err("--university is only used with --role partner".to_string());
            }
            _ => {}
        }

        if self.top == Some(0) {
            return Err("Top count must be at least 1".to_string());
        }

        if let Some(ref user) = self.user {
            if user.trim().is_empty() {
                return Err("User must not be empty".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(key) = self.mark_read.iter().find(|k| self.mark_unread.contains(k)) {
            return Err(format!("{} is marked both read and unread", key));
        }

        Ok(())
    }

    /// Notification policy for the selected view.
    pub fn policy(&self) -> NotificationPolicy {
        match (self.role, &self.university) {
            (Role::Partner, Some(university)) => NotificationPolicy::Partner {
                university: university.trim().to_string(),
            },
            _ => NotificationPolicy::Admin,
        }
    }

    /// Requested read-state changes.
    pub fn read_state_edits(&self) -> ReadStateEdits<'_> {
        ReadStateEdits {
            mark_read: &self.mark_read,
            mark_unread: &self.mark_unread,
            mark_all_read: self.mark_all_read,
        }
    }

    /// Exit code for the rendered notifications: 2 when `--fail-on` is set
    /// and an unread notification at or above that urgency remains.
    pub fn exit_code(&self, notifications: &[NotificationEntry]) -> i32 {
        match self.fail_on {
            Some(level) if has_unread_at_or_above(notifications, level.into()) => 2,
            _ => 0,
        }
    }
}
