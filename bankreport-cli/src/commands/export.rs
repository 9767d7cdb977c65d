//! Export command - banker performance report

use anyhow::{bail, Result};

use super::import::{parse_date, print_queued, print_status};
use super::{log_event, Session};
use bankreport_core::{ExportRequest, JobStatus, LogEvent};

pub fn run(
    bankers: Vec<i64>,
    start: &str,
    end: &str,
    baseline_year: i32,
    background: bool,
    json: bool,
) -> Result<()> {
    let request = ExportRequest {
        banker_ids: bankers,
        start_date: parse_date(start)?,
        end_date: parse_date(end)?,
        baseline_year,
    };

    let session = Session::open()?;
    let key = session.ctx.orchestrator.submit_export(request)?;
    log_event(&session.logger, LogEvent::new("export_submitted").with_command("export"));

    if background {
        print_queued("Export", &key, json)?;
        session.finish();
        return Ok(());
    }

    let status = session.wait_for(&key, "Building report", json)?;
    print_status(&key, &status, json)?;
    session.finish();

    if let JobStatus::Failed { message } = status {
        bail!("Export failed: {}", message);
    }
    Ok(())
}
