//! Step outputs and the human-readable proof summary.
//!
//! Outputs go to the file named by `GITHUB_OUTPUT` as `name=value` lines, or
//! in the heredoc form `name<<DELIM ... DELIM` when the value spans lines.
//! The markdown summary is appended to the file named by
//! `GITHUB_STEP_SUMMARY`. When neither file is configured the values are
//! logged instead.

use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::Receipt;
use crate::persistence::append_synced;

/// Where outputs and the summary are written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportTargets {
    pub output_file: Option<PathBuf>,
    pub summary_file: Option<PathBuf>,
}

impl ReportTargets {
    /// Reads `GITHUB_OUTPUT` and `GITHUB_STEP_SUMMARY`, ignoring empty values.
    pub fn from_env() -> Self {
        let path = |name: &str| {
            std::env::var_os(name)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };
        ReportTargets {
            output_file: path("GITHUB_OUTPUT"),
            summary_file: path("GITHUB_STEP_SUMMARY"),
        }
    }
}

/// The named outputs of a processed delivery, in a stable order.
pub fn outputs(receipt: &Receipt) -> Vec<(&'static str, String)> {
    vec![
        ("event_id", receipt.event_id.to_string()),
        ("event_hash", receipt.event_hash.to_string()),
        ("normalized_event", receipt.normalized_json.clone()),
        ("first_seen", receipt.first_seen.to_string()),
        ("entry_written", receipt.entry_written.to_string()),
    ]
}

/// Formats one output assignment, switching to the heredoc form for
/// multi-line values.
pub fn format_output(name: &str, value: &str) -> String {
    if !value.contains('\n') && !value.contains('\r') {
        return format!("{}={}\n", name, value);
    }

    let digest = hex::encode(Sha256::digest(value.as_bytes()));
    let mut delimiter = format!("ghadelimiter_{}", &digest[..16]);
    while value.contains(&delimiter) {
        delimiter.push('_');
    }
    format!("{name}<<{delimiter}\n{value}\n{delimiter}\n")
}

/// Appends `outputs` to the output file at `path`.
pub fn write_outputs(path: &Path, outputs: &[(&str, String)]) -> io::Result<()> {
    let contents: String = outputs
        .iter()
        .map(|(name, value)| format_output(name, value))
        .collect();
    append_synced(path, contents.as_bytes())
}

/// Renders the markdown proof for one event.
pub fn render_summary(event_id: &str, event_hash: &str) -> String {
    format!(
        "<h1>Webhook Trust Proof</h1>\n\
         <table><tr><th>Event ID</th><td>{}</td></tr>\
         <tr><th>SHA-256 Hash</th><td>{}</td></tr></table>\n\
         \nThis proof uniquely identifies the verified webhook event.\n",
        escape_html(event_id),
        escape_html(event_hash)
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Writes the receipt's outputs and summary to `targets`.
pub fn publish(receipt: &Receipt, targets: &ReportTargets) -> io::Result<()> {
    let outputs = outputs(receipt);
    match &targets.output_file {
        Some(path) => write_outputs(path, &outputs)?,
        None => {
            for (name, value) in &outputs {
                tracing::info!(output = *name, value = %value, "step output");
            }
        }
    }

    let summary = render_summary(receipt.event_id.as_str(), receipt.event_hash.as_str());
    match &targets.summary_file {
        Some(path) => append_synced(path, summary.as_bytes())?,
        None => tracing::info!(
            event_id = %receipt.event_id,
            event_hash = %receipt.event_hash,
            "webhook trust proof"
        ),
    }
    Ok(())
}
