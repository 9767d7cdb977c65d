//! Import command - preview a balance spreadsheet, inspect it, commit it

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::Subcommand;
use colored::Colorize;

use super::{get_context, log_event, Session};
use crate::output;
use bankreport_core::{CommitResult, JobOutput, JobStatus, LogEvent, OperationResult, PreviewResult};

#[derive(Subcommand)]
pub enum ImportCommands {
    /// Upload a spreadsheet and compute its preview
    Submit {
        /// Path to the spreadsheet (csv, xlsx, xls, xlsm, ods)
        file: PathBuf,
        /// Report date of the balances (YYYY-MM-DD)
        #[arg(long)]
        date: String,
        /// Return the job key without waiting for the preview
        #[arg(long)]
        background: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the status of an import, commit or export job
    Status {
        /// Job key returned by submit, commit or export
        key: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Commit accepted rows of a completed preview
    Commit {
        /// Key of the completed preview
        key: String,
        /// Source row numbers to accept (default: every valid row)
        #[arg(long, value_delimiter = ',')]
        rows: Vec<usize>,
        /// Replace balance history already recorded for the report date
        #[arg(long)]
        override_existing: bool,
        /// Return the job key without waiting for the commit
        #[arg(long)]
        background: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: ImportCommands) -> Result<ExitCode> {
    match command {
        ImportCommands::Submit { file, date, background, json } => {
            run_submit(file, &date, background, json).map(|_| ExitCode::SUCCESS)
        }
        ImportCommands::Status { key, json } => run_status(&key, json),
        ImportCommands::Commit { key, rows, override_existing, background, json } => {
            run_commit(&key, &rows, override_existing, background, json).map(|_| ExitCode::SUCCESS)
        }
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| anyhow::anyhow!("Invalid date '{}'. Use YYYY-MM-DD", value))
}

fn run_submit(file: PathBuf, date: &str, background: bool, json: bool) -> Result<()> {
    let report_date = parse_date(date)?;
    let session = Session::open()?;

    let key = session.ctx.orchestrator.submit_import_path(&file, report_date)?;
    log_event(&session.logger, LogEvent::new("import_submitted").with_command("import submit"));

    if background {
        print_queued("Preview", &key, json)?;
        session.finish();
        return Ok(());
    }

    if !json {
        println!("Job: {}", key.dimmed());
    }
    let status = session.wait_for(&key, "Validating rows", json)?;
    print_status(&key, &status, json)?;
    session.finish();

    if let JobStatus::Failed { message } = status {
        bail!("Import failed: {}", message);
    }
    Ok(())
}

fn run_status(key: &str, json: bool) -> Result<ExitCode> {
    let ctx = get_context()?;
    let status = ctx.orchestrator.status(key)?;
    print_status(key, &status, json)?;

    Ok(match status {
        JobStatus::NotFound => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}

fn run_commit(
    key: &str,
    rows: &[usize],
    override_existing: bool,
    background: bool,
    json: bool,
) -> Result<()> {
    let session = Session::open()?;
    let preview = session.ctx.cached_preview(key)?;

    let entries = if rows.is_empty() {
        preview.valid_rows.clone()
    } else {
        let missing = preview.missing_rows(rows);
        if !missing.is_empty() {
            let missing: Vec<String> = missing.iter().map(|r| r.to_string()).collect();
            bail!("Rows not in the preview's valid rows: {}", missing.join(", "));
        }
        preview.select_rows(rows)
    };
    if entries.is_empty() {
        bail!("Nothing to commit: the preview has no valid rows");
    }

    let commit_key = session
        .ctx
        .orchestrator
        .finalize_import(entries, preview.report_date, override_existing)?;
    log_event(&session.logger, LogEvent::new("commit_submitted").with_command("import commit"));

    if background {
        print_queued("Commit", &commit_key, json)?;
        session.finish();
        return Ok(());
    }

    let status = session.wait_for(&commit_key, "Committing balances", json)?;
    print_status(&commit_key, &status, json)?;
    session.finish();

    match status {
        JobStatus::Failed { message } => bail!("Commit failed: {}", message),
        JobStatus::Completed {
            output: JobOutput::Commit { data },
        } if !data.success => bail!("{}", data.message),
        _ => Ok(()),
    }
}

/// Report a job that was queued and not waited for
pub fn print_queued(what: &str, key: &str, json: bool) -> Result<()> {
    if json {
        let envelope = OperationResult::ok(serde_json::json!({
            "cache_key": key,
            "status": JobStatus::Processing.label(),
        }));
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    } else {
        output::info(&format!("{} queued: {}", what, key));
        println!("Check progress with: brp import status {}", key);
    }
    Ok(())
}

/// Print any job status, in JSON or as tables
pub fn print_status(key: &str, status: &JobStatus, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(status)?);
        return Ok(());
    }

    match status {
        JobStatus::NotFound => {
            output::warning("not_found");
            println!("No job with key {} (unknown or expired)", key);
        }
        JobStatus::Processing => output::info("processing"),
        JobStatus::Failed { message } => output::error(&format!("failed: {}", message)),
        JobStatus::Completed { output: job_output } => match job_output {
            JobOutput::Preview { data } => print_preview(key, data),
            JobOutput::Commit { data } => print_commit(data),
            JobOutput::Report { file_path, file_name } => {
                output::success(&format!("Report ready: {}", file_name));
                println!("  {}", file_path);
            }
        },
    }
    Ok(())
}

fn print_preview(key: &str, preview: &PreviewResult) {
    println!("{}", format!("Import preview for {}", preview.report_date).bold());
    println!();

    let mut table = output::create_table();
    let summary = &preview.summary;
    table.add_row(vec!["Rows read".to_string(), summary.total_rows.to_string()]);
    table.add_row(vec!["Rows skipped".to_string(), summary.rows_skipped.to_string()]);
    table.add_row(vec!["Valid rows".to_string(), preview.valid_rows.len().to_string()]);
    table.add_row(vec!["Accounts to update".to_string(), summary.accounts_to_update.to_string()]);
    table.add_row(vec!["New accounts".to_string(), preview.new_account_count().to_string()]);
    table.add_row(vec![
        "Bankers affected".to_string(),
        preview.universal_bankers_to_update_ids.len().to_string(),
    ]);
    println!("{}", table);

    if !preview.errors.is_empty() {
        println!();
        println!("{}", format!("Errors ({})", preview.errors.len()).red().bold());
        let mut table = output::create_table();
        table.set_header(vec!["Row", "Field", "Message"]);
        for error in preview.errors.iter().take(output::TABLE_LIMIT) {
            table.add_row(vec![error.row_number.to_string(), error.field.clone(), error.message.clone()]);
        }
        println!("{}", table);
        output::print_overflow(preview.errors.len());
    }

    if !preview.valid_rows.is_empty() {
        println!();
        println!("{}", "Valid rows".bold());
        let mut table = output::create_table();
        table.set_header(vec!["Row", "Banker", "CIF", "Account", "Previous", "New", "Change"]);
        for entry in preview.valid_rows.iter().take(output::TABLE_LIMIT) {
            let account = if entry.is_new_account {
                format!("{} (new)", entry.account_number)
            } else {
                entry.account_number.clone()
            };
            table.add_row(vec![
                entry.row_number.to_string(),
                entry.banker_code.clone(),
                entry.cif.clone(),
                account,
                entry.previous_balance.to_string(),
                entry.new_balance.to_string(),
                entry.balance_change().to_string(),
            ]);
        }
        println!("{}", table);
        output::print_overflow(preview.valid_rows.len());

        println!();
        println!("Commit with: brp import commit {} [--rows 2,5] [--override-existing]", key);
    }
}

fn print_commit(result: &CommitResult) {
    if result.success {
        output::success(&result.message);
    } else {
        output::error(&result.message);
    }

    if !result.skipped.is_empty() {
        let mut table = output::create_table();
        table.set_header(vec!["Row", "Account", "Reason"]);
        for skip in result.skipped.iter().take(output::TABLE_LIMIT) {
            table.add_row(vec![skip.row_number.to_string(), skip.account_number.clone(), skip.reason.clone()]);
        }
        println!("{}", table);
        output::print_overflow(result.skipped.len());
    }
}
