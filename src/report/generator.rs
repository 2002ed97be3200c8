//! Dashboard report generation.
//!
//! This module renders a computed [`Dashboard`] as Markdown or JSON.

use crate::models::{ActivityTotals, Dashboard, DashboardMetadata, NotificationEntry, Stats};
use anyhow::Result;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Generate a complete Markdown dashboard.
pub fn generate_markdown_report(dashboard: &Dashboard, include_read: bool) -> String {
    let mut output = String::new();

    output.push_str("# Partnership Agreements Dashboard\n\n");

    output.push_str(&generate_metadata_section(&dashboard.metadata));
    output.push_str(&generate_summary_section(&dashboard.stats));
    output.push_str(&generate_ranking_section(
        "Top Agreement Types",
        "Type",
        &dashboard.top_types,
    ));
    output.push_str(&generate_ranking_section(
        "Top Universities",
        "University",
        &dashboard.top_universities,
    ));
    output.push_str(&generate_activity_section(&dashboard.stats.activities));
    output.push_str(&generate_start_year_section(&dashboard.stats.by_start_year));
    output.push_str(&generate_notifications_section(
        &dashboard.notifications,
        dashboard.unread,
        include_read,
    ));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &DashboardMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **View:** {}\n", metadata.view));
    section.push_str(&format!("- **Source:** {}\n", metadata.source));
    section.push_str(&format!("- **As Of:** {}\n", metadata.today.format("%Y-%m-%d")));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Records Loaded:** {}\n",
        metadata.records_loaded
    ));
    if metadata.records_skipped > 0 {
        section.push_str(&format!(
            "- **Records Skipped:** {}\n",
            metadata.records_skipped
        ));
    }
    section.push('\n');

    section
}

/// Generate the summary section.
fn generate_summary_section(stats: &Stats) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str("| Total | 🟢 Active | 🔴 Expired | ⚪ No End Date |\n");
    section.push_str("|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| **{}** | {} | {} | {} |\n\n",
        stats.total_agreements, stats.active, stats.expired, stats.without_end_date
    ));

    section
}

/// Generate a two-column ranking table.
fn generate_ranking_section(heading: &str, label: &str, items: &[(String, usize)]) -> String {
    if items.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str(&format!("## {}\n\n", heading));
    section.push_str(&format!("| {} | Agreements |\n", label));
    section.push_str("|:---|:---:|\n");
    for (name, count) in items {
        section.push_str(&format!("| {} | {} |\n", name, count));
    }
    section.push('\n');

    section
}

/// Generate the activity totals section.
fn generate_activity_section(totals: &ActivityTotals) -> String {
    let mut section = String::new();

    section.push_str("## Activities\n\n");
    section.push_str("| Activity | Total |\n");
    section.push_str("|:---|:---:|\n");
    section.push_str(&format!("| Students (mobility) | {} |\n", totals.students));
    section.push_str(&format!("| Staff mobility | {} |\n", totals.staff));
    section.push_str(&format!(
        "| Joint research & publication | {} |\n",
        totals.research_and_publication
    ));
    section.push_str(&format!(
        "| Co-teaching & supervision | {} |\n\n",
        totals.teaching_and_supervision
    ));

    section
}

/// Generate the agreements-by-start-year section.
fn generate_start_year_section(by_year: &BTreeMap<i32, usize>) -> String {
    if by_year.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Agreements by Start Year\n\n");
    section.push_str("| Year | Agreements |\n");
    section.push_str("|:---|:---:|\n");
    for (year, count) in by_year {
        section.push_str(&format!("| {} | {} |\n", year, count));
    }
    section.push('\n');

    section
}

/// Generate the notifications section.
fn generate_notifications_section(
    notifications: &[NotificationEntry],
    unread: usize,
    include_read: bool,
) -> String {
    let mut section = String::new();

    section.push_str(&format!(
        "## Notifications ({} unread of {})\n\n",
        unread,
        notifications.len()
    ));

    let visible: Vec<_> = notifications
        .iter()
        .filter(|entry| include_read || !entry.read)
        .collect();

    if visible.is_empty() {
        section.push_str("No agreements need attention. 🎉\n\n");
        return section;
    }

    for entry in visible {
        section.push_str(&generate_notification_line(entry));
    }
    section.push('\n');

    section
}

/// Generate a single notification line.
fn generate_notification_line(entry: &NotificationEntry) -> String {
    let marker = if entry.read { "[x]" } else { "[ ]" };

    format!(
        "- {} {} **{}** ({}, {} days) - {}\n  `{}`\n",
        marker,
        entry.bucket().emoji(),
        entry.title,
        entry.bucket(),
        entry.days_remaining,
        entry.message,
        entry.key
    )
}

/// Generate the report footer.
fn generate_footer() -> String {
    "---\n\n*Generated by agreewatch*\n".to_string()
}

/// Generate a JSON dashboard.
pub fn generate_json_report(dashboard: &Dashboard) -> Result<String> {
    serde_json::to_string_pretty(dashboard).map_err(Into::into)
}

/// Write rendered output to a file, or stdout when the path is `-`.
///
/// Files are written to a temporary sibling and renamed into place, so an
/// interrupted write leaves the previous dashboard intact.
pub fn write_output(content: &str, path: &Path) -> Result<()> {
    if path == Path::new("-") {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        handle.write_all(content.as_bytes())?;
        return Ok(());
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(content.as_bytes())?;
    file.persist(path).map_err(|e| e.error)?;

    Ok(())
}
