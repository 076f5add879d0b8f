use crate::system_state::SystemState;
use crate::utils::errors::ProvisionError;
use crate::workflow::RunReport;
use chrono::{DateTime, Local};
use std::fmt::Write;
use std::path::Path;

/// Human-readable audit record of a run. Nothing reads it back.
pub fn render_summary(state: &SystemState, reports: &[RunReport], now: DateTime<Local>) -> String {
    let host = &state.host;
    let unknown = || "unknown".to_string();
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "powerprov installation summary");
    let _ = writeln!(out, "==============================");
    let _ = writeln!(out, "Timestamp:    {}", now.to_rfc3339());
    let _ = writeln!(out, "OS family:    {}", host.os_family());
    let _ = writeln!(out, "Architecture: {}", host.architecture());
    let _ = writeln!(out, "Kernel:       {}", host.kernel_version().unwrap_or_else(unknown));
    let _ = writeln!(out, "glibc:        {}", host.glibc_version().unwrap_or_else(unknown));

    for report in reports {
        let _ = writeln!(out);
        let _ = writeln!(out, "[{}]", report.workflow);
        let _ = writeln!(out, "Service:      {}", report.service);
        let _ = writeln!(out, "Final stage:  {:?}", report.stage);
        let verdict = if report.verification.confirmed() { "confirmed" } else { "inconclusive" };
        let _ = writeln!(out, "Verification: {}", verdict);
        for v in &report.verification.verdicts {
            let _ = writeln!(out, "  - {}", v.message());
        }
        for (what, value) in &report.verification.detected {
            let _ = writeln!(out, "  {}: {}", what, value);
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Paths touched:");
    for touched in state.touched() {
        match &touched.backup {
            Some(backup) => {
                let _ = writeln!(out, "  {} (backup: {})", touched.path.display(), backup.display());
            }
            None => {
                let _ = writeln!(out, "  {}", touched.path.display());
            }
        }
    }
    out
}

pub fn write_summary(
    state: &mut SystemState,
    path: &Path,
    reports: &[RunReport],
) -> Result<(), ProvisionError> {
    let contents = render_summary(state, reports, Local::now());
    state.write_atomic(path, &contents)?;
    log::info!("Installation summary written to {}", path.display());
    Ok(())
}
