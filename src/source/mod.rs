//! Loading the agreement snapshot.
//!
//! Records come from a JSON export on disk (a single file or a directory
//! of files) or straight from the hosted store's REST endpoint. The whole
//! batch is materialized before any analysis runs.

use crate::models::AgreementRecord;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Errors that abort loading the snapshot.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Invalid JSON in {origin}: {source}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{origin} does not contain a list of records")]
    Shape { origin: String },

    #[error("Request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Record store returned {status} for {url}: {body}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Hosted REST endpoint settings.
#[derive(Debug, Clone)]
pub struct RemoteSource {
    /// Project base URL, e.g. `https://xyz.example.co`.
    pub base_url: String,
    /// Table holding the agreements.
    pub table: String,
    /// Public API key, sent as `apikey` and bearer token.
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    pub show_progress: bool,
}

impl RemoteSource {
    /// Endpoint URL for the table.
    pub fn endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url.trim_end_matches('/'), self.table)
    }
}

/// Where the record snapshot comes from.
#[derive(Debug, Clone)]
pub enum RecordSource {
    /// A JSON file, or a directory of `*.json` files.
    Path(PathBuf),
    Remote(RemoteSource),
}

impl RecordSource {
    pub fn describe(&self) -> String {
        match self {
            RecordSource::Path(path) => path.display().to_string(),
            RecordSource::Remote(remote) => remote.endpoint(),
        }
    }
}

/// A decoded batch.
#[derive(Debug, Clone, Default)]
pub struct LoadedRecords {
    pub records: Vec<AgreementRecord>,
    /// Entries dropped because they could not be decoded or repeated an id.
    pub skipped: usize,
}

/// Load and decode the full snapshot.
pub async fn load_records(source: &RecordSource) -> Result<LoadedRecords, SourceError> {
    let values = match source {
        RecordSource::Path(path) if path.is_dir() => load_directory(path)?,
        RecordSource::Path(path) => load_file(path)?,
        RecordSource::Remote(remote) => fetch_remote(remote).await?,
    };

    let loaded = decode_records(values);
    info!(
        "Loaded {} agreements ({} skipped) from {}",
        loaded.records.len(),
        loaded.skipped,
        source.describe()
    );

    Ok(loaded)
}

/// Decode raw JSON values one by one, skipping the ones that fail.
///
/// The first record with a given id wins; later duplicates are dropped.
pub fn decode_records(values: Vec<Value>) -> LoadedRecords {
    let mut loaded = LoadedRecords::default();
    let mut seen = HashSet::new();

    for (index, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<AgreementRecord>(value) {
            Ok(record) => {
                if seen.insert(record.id.clone()) {
                    loaded.records.push(record);
                } else {
                    warn!("Skipping duplicate agreement id {}", record.id);
                    loaded.skipped += 1;
                }
            }
            Err(e) => {
                warn!("Skipping record #{}: {}", index, e);
                loaded.skipped += 1;
            }
        }
    }

    loaded
}

/// Parse a JSON document holding records: a bare array or `{"data": [...]}`.
pub fn parse_document(content: &str, origin: &str) -> Result<Vec<Value>, SourceError> {
    let value: Value = serde_json::from_str(content).map_err(|source| SourceError::Json {
        origin: origin.to_string(),
        source,
    })?;

    records_from_value(value, origin)
}

fn records_from_value(value: Value, origin: &str) -> Result<Vec<Value>, SourceError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(SourceError::Shape {
                origin: origin.to_string(),
            }),
        },
        _ => Err(SourceError::Shape {
            origin: origin.to_string(),
        }),
    }
}

fn load_file(path: &Path) -> Result<Vec<Value>, SourceError> {
    debug!("Reading records from {}", path.display());

    let content = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    parse_document(&content, &path.display().to_string())
}

fn load_directory(dir: &Path) -> Result<Vec<Value>, SourceError> {
    let mut values = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|source| SourceError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;

        let path = entry.path();
        let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
        if entry.file_type().is_file() && is_json {
            values.extend(load_file(path)?);
        }
    }

    Ok(values)
}

async fn fetch_remote(remote: &RemoteSource) -> Result<Vec<Value>, SourceError> {
    let url = remote.endpoint();
    let http_error = |source: reqwest::Error| SourceError::Http {
        url: url.clone(),
        source,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(remote.timeout_seconds))
        .build()
        .map_err(http_error)?;

    let spinner = remote.show_progress.then(|| {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("Fetching {}", remote.table));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let mut request = client.get(&url).query(&[("select", "*")]);
    if let Some(ref key) = remote.api_key {
        request = request.header("apikey", key).bearer_auth(key);
    }

    let result = request.send().await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let response = result.map_err(http_error)?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SourceError::Status {
            url: url.clone(),
            status,
            body,
        });
    }

    let value: Value = response.json().await.map_err(http_error)?;
    records_from_value(value, &url)
}
