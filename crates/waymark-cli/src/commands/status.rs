use serde::Serialize;
use waymark_core::store::PendingCounts;

use crate::commands::common::Context;
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub store: String,
    pub server: Option<String>,
    pub online: bool,
    pub signed_in: bool,
    pub sync_state: &'static str,
    pub counts: PendingCounts,
}

pub fn run_status(as_json: bool, context: &Context) -> Result<(), CliError> {
    let report = StatusReport {
        store: context
            .config
            .resolved_store_path()?
            .display()
            .to_string(),
        server: context.config.server_url.clone(),
        online: context.online,
        signed_in: context.session().is_authenticated(),
        sync_state: context.engine.sync_state().label(),
        counts: context.engine.store().pending_counts()?,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_status_lines(&report) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn format_status_lines(report: &StatusReport) -> Vec<String> {
    let counts = &report.counts;
    let mut lines = vec![
        format!("Store: {}", report.store),
        format!(
            "Server: {} ({})",
            report.server.as_deref().unwrap_or("not configured"),
            if report.online { "online" } else { "offline" }
        ),
        format!("Signed in: {}", if report.signed_in { "yes" } else { "no" }),
        format!("Synced: {}", counts.synced),
        format!(
            "Pending: {} (create {}, update {}, delete {})",
            counts.pending(),
            counts.pending_create,
            counts.pending_update,
            counts.pending_delete
        ),
    ];
    if counts.malformed > 0 {
        lines.push(format!("Unreadable records: {}", counts.malformed));
    }
    lines
}
