//! agreewatch - partnership agreement dashboard
//!
//! A CLI tool that loads university partnership agreements, derives
//! dashboard statistics, and flags agreements nearing expiry with
//! per-user read state.
//!
//! Exit codes:
//!   0 - Success (or no unread notifications at the --fail-on level)
//!   1 - Runtime error (unreadable source, bad config, etc.)
//!   2 - Unread notifications at or above the --fail-on level remain

use agreewatch::cli::{Args, OutputFormat};
use agreewatch::config::{Config, DEFAULT_CONFIG_FILE};
use agreewatch::models::{AgreementRecord, Dashboard, DashboardMetadata};
use agreewatch::read_state::{self, JsonFileReadStateStore, ReadStateStore};
use agreewatch::source::{self, LoadedRecords, RecordSource, RemoteSource};
use agreewatch::{analysis, report};
use anyhow::{bail, Context, Result};
use chrono::{Local, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration before logging so [general] verbose applies
    let (mut config, config_origin) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(config.log_level(args.quiet));

    info!("agreewatch v{}", env!("CARGO_PKG_VERSION"));
    info!("Using {}", config_origin);
    debug!("Arguments: {:?}", args);

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .agreewatch.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to set the record source, expiry windows, and more.");
    Ok(())
}

/// Initialize logging at the merged verbosity level.
fn init_logging(level: Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the dashboard workflow. Returns exit code (0 or 2).
async fn run(args: Args, config: Config) -> Result<i32> {
    config.validate()?;

    let today = args.today.unwrap_or_else(|| Local::now().date_naive());
    let quiet = args.quiet || is_stdout(&config);

    // Step 1: Load the record snapshot
    let origin = record_source(&config, args.quiet)?;
    if !quiet {
        println!("📥 Loading agreements from {}", origin.describe());
    }
    let loaded = source::load_records(&origin)
        .await
        .with_context(|| format!("Failed to load records from {}", origin.describe()))?;

    warn_invalid_end_dates(&loaded.records);

    if args.dry_run {
        return handle_dry_run(&loaded);
    }

    // Step 2: Derive statistics and notifications
    let policy = args.policy();
    info!("Computing {} view as of {}", policy, today);

    let scoped = policy.scope(&loaded.records);
    if scoped.is_empty() && !loaded.records.is_empty() {
        warn!("No agreements match the {} view", policy);
    }

    let stats = analysis::aggregate(&scoped, today);
    let notifications = analysis::compute_with_policy(
        &loaded.records,
        today,
        &policy,
        config.notifications.windows(),
    );

    // Step 3: Apply read-state edits and merge
    let user = config.general.user.clone();
    let mut store = JsonFileReadStateStore::new(config.read_state.path.clone());
    read_state::apply_edits(&mut store, &user, &args.read_state_edits(), &notifications)
        .with_context(|| format!("Failed to update read state for {}", user))?;

    let read_keys = store
        .get(&user)
        .with_context(|| format!("Failed to load read state for {}", user))?;
    let notifications = analysis::merge_read_state(notifications, &read_keys);
    let unread = analysis::unread_count(&notifications);

    // Step 4: Build and render the dashboard
    let top_n = config.report.top_n;
    let dashboard = Dashboard {
        metadata: DashboardMetadata {
            generated_at: Utc::now(),
            today,
            view: policy.to_string(),
            source: origin.describe(),
            records_loaded: loaded.records.len(),
            records_skipped: loaded.skipped,
        },
        top_types: analysis::get_top_items(&stats.by_type, top_n),
        top_universities: analysis::get_top_items(&stats.by_university, top_n),
        stats,
        notifications,
        unread,
    };

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&dashboard)?,
        OutputFormat::Markdown => {
            report::generate_markdown_report(&dashboard, config.report.include_read)
        }
    };

    let output_path = PathBuf::from(&config.general.output);
    report::write_output(&output, &output_path)
        .with_context(|| format!("Failed to write dashboard to {}", output_path.display()))?;

    if !quiet {
        print_summary(&dashboard, &output_path);
    }

    // Check --fail-on threshold
    let exit_code = args.exit_code(&dashboard.notifications);
    if let (2, Some(level)) = (exit_code, args.fail_on) {
        eprintln!(
            "\n⛔ Unread notifications at or above {:?} remain. Failing (exit code 2).",
            level
        );
    }

    Ok(exit_code)
}

fn is_stdout(config: &Config) -> bool {
    config.general.output == "-"
}

/// Build the record source from the merged configuration.
fn record_source(config: &Config, quiet: bool) -> Result<RecordSource> {
    let source = &config.source;

    match (&source.records, &source.remote_url) {
        (Some(path), _) => Ok(RecordSource::Path(path.clone())),
        (None, Some(url)) => Ok(RecordSource::Remote(RemoteSource {
            base_url: url.clone(),
            table: source.table.clone(),
            api_key: source.api_key.clone(),
            timeout_seconds: source.timeout_seconds,
            show_progress: !quiet,
        })),
        (None, None) => bail!(
            "No record source: pass --records or --remote-url, or set [source] in {}",
            DEFAULT_CONFIG_FILE
        ),
    }
}

/// Warn about records whose end date is present but unusable.
fn warn_invalid_end_dates(records: &[AgreementRecord]) {
    for record in records.iter().filter(|r| r.has_invalid_end_date()) {
        warn!(
            "Agreement {} has an unparseable end date {:?}; excluded from expiry checks",
            record.id,
            record.end_date.as_deref().unwrap_or_default()
        );
    }
}

/// Handle --dry-run: report what was loaded and exit.
fn handle_dry_run(loaded: &LoadedRecords) -> Result<i32> {
    println!("\n🔍 Dry run: records loaded, nothing rendered.\n");

    if loaded.records.is_empty() {
        println!("   No usable agreement records found.");
    } else {
        println!("   Found {} agreements:\n", loaded.records.len());
        for record in &loaded.records {
            println!(
                "     📄 {} | {} | {} | ends {}",
                record.id,
                record.university_label(),
                record.type_label(),
                record
                    .end()
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
        }
    }

    if loaded.skipped > 0 {
        println!("\n   Skipped: {} records", loaded.skipped);
    }

    println!("\n✅ Dry run complete.");
    Ok(0)
}

/// Print the run summary.
fn print_summary(dashboard: &Dashboard, output_path: &Path) {
    let stats = &dashboard.stats;

    println!("\n📊 Dashboard Summary ({}):", dashboard.metadata.view);
    println!("   Agreements: {}", stats.total_agreements);
    println!(
        "   - 🟢 Active: {} | 🔴 Expired: {} | ⚪ No end date: {}",
        stats.active, stats.expired, stats.without_end_date
    );
    println!(
        "   Notifications: {} ({} unread)",
        dashboard.notifications.len(),
        dashboard.unread
    );
    println!(
        "\n✅ Dashboard saved to: {}",
        output_path.display()
    );
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is set up, so problems go to stderr. Returns the
/// config and a description of where it came from.
fn load_config(args: &Args) -> Result<(Config, String)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, format!("config from {}", config_path.display())));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((config, format!("default config from {}", DEFAULT_CONFIG_FILE))),
        Ok(None) => Ok((Config::default(), "built-in defaults".to_string())),
        Err(e) => {
            eprintln!("⚠️  Failed to load config: {:#}. Using defaults.", e);
            Ok((Config::default(), "built-in defaults".to_string()))
        }
    }
}
