use waymark_core::engine::DrainReport;

use crate::commands::common::Context;
use crate::error::CliError;

pub async fn run_drain(context: &Context) -> Result<(), CliError> {
    if !context.online {
        let pending = context.engine.store().pending_counts()?.pending();
        println!("Offline: {pending} pending change(s) kept for later");
        return Ok(());
    }

    let report = context.engine.drain().await?;
    println!("{}", format_drain_report(&report));
    Ok(())
}

pub fn format_drain_report(report: &DrainReport) -> String {
    let mut summary = format!(
        "Drain completed: {} created, {} updated, {} deleted",
        report.created, report.updated, report.deleted
    );
    if report.failed > 0 {
        summary.push_str(&format!(", {} failed (kept for retry)", report.failed));
    }
    if report.malformed > 0 {
        summary.push_str(&format!(", {} unreadable record(s) skipped", report.malformed));
    }
    if report.interrupted {
        summary.push_str(" (interrupted)");
    }
    summary
}
