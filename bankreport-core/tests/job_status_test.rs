//! Job lifecycle tests: submit, poll, commit, expire
//!
//! Run with: cargo test --test job_status_test -- --nocapture

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use tempfile::TempDir;

use bankreport_core::adapters::duckdb::DuckDbRepository;
use bankreport_core::adapters::local_files::LocalFileStore;
use bankreport_core::adapters::memory_cache::MemoryCache;
use bankreport_core::adapters::queue::TokioJobQueue;
use bankreport_core::config::Config;
use bankreport_core::domain::{Account, Job};
use bankreport_core::services::{JobOrchestrator, JobWorker, StatusChannel, WorkerSettings};
use bankreport_core::{BankReportContext, JobOutput, JobStatus, QueueMode};

const REPORT: &str = "pn_relationship_officer;cif;client_name;textbox15;product_code;balance;availbalance\n\
                      RO1;C001;PT Maju;A-B 123;SAV;1.234.56;1.234.56\n\
                      -;;;12345;;;\n";

fn report_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()
}

fn seed(repo: &DuckDbRepository) {
    let banker = repo.add_banker("RO1", "Rina", None).unwrap();
    let client = repo.add_client("C001", "PT Maju").unwrap();
    let mut account = Account::new("AB123", client.id);
    account.banker_id = Some(banker.id);
    repo.add_account(&account).unwrap();
}

fn inline_context(dir: &TempDir, config: Config) -> BankReportContext {
    let ctx = BankReportContext::with_config(dir.path(), config, QueueMode::Inline, None).unwrap();
    seed(&ctx.repository);
    ctx
}

#[test]
fn test_preview_then_commit_through_the_cache() {
    let dir = TempDir::new().unwrap();
    let ctx = inline_context(&dir, Config::default());

    let key = ctx
        .orchestrator
        .submit_import("report.csv", REPORT.as_bytes(), report_date())
        .unwrap();
    assert!(key.starts_with("import_preview_"));

    let status = ctx.orchestrator.status(&key).unwrap();
    assert_eq!(status.label(), "completed");

    let preview = ctx.cached_preview(&key).unwrap();
    assert_eq!(preview.summary.total_rows, 2);
    assert_eq!(preview.summary.rows_skipped, 1);
    assert!(preview.errors.is_empty());
    assert_eq!(preview.valid_rows.len(), 1);
    assert_eq!(preview.valid_rows[0].account_number, "AB123");
    assert_eq!(preview.valid_rows[0].new_balance.to_string(), "1234.56");

    let commit_key = ctx
        .orchestrator
        .finalize_import(preview.valid_rows.clone(), preview.report_date, false)
        .unwrap();
    assert!(commit_key.starts_with("import_finalize_"));
    assert_ne!(commit_key, key);

    match ctx.orchestrator.status(&commit_key).unwrap() {
        JobStatus::Completed {
            output: JobOutput::Commit { data },
        } => {
            assert!(data.success);
            assert_eq!(data.processed_count, 1);
        }
        other => panic!("unexpected status {:?}", other),
    }

    // The preview stays readable after its commit
    assert!(ctx.orchestrator.status(&key).unwrap().is_terminal());
}

#[test]
fn test_redispatch_under_same_key_replaces_result() {
    let dir = TempDir::new().unwrap();
    let ctx = inline_context(&dir, Config::default());

    let key = ctx
        .orchestrator
        .submit_import("report.csv", REPORT.as_bytes(), report_date())
        .unwrap();
    let first = ctx.cached_preview(&key).unwrap();
    assert_eq!(first.valid_rows.len(), 1);
    assert_eq!(first.summary.rows_skipped, 1);

    let corrected = dir.path().join("corrected.csv");
    std::fs::write(
        &corrected,
        "pn_relationship_officer;cif;client_name;textbox15;product_code;balance;availbalance\n\
         RO1;C001;PT Maju;A-B 123;SAV;2.000.00;2.000.00\n\
         RO1;C001;PT Maju;NEW-1;SAV;5;5\n",
    )
    .unwrap();

    ctx.orchestrator
        .redispatch(Job::ImportPreview {
            file_path: corrected,
            report_date: report_date(),
            cache_key: key.clone(),
        })
        .unwrap();

    // The second run's preview replaces the first one, nothing is merged
    let second = ctx.cached_preview(&key).unwrap();
    assert_eq!(second.summary.total_rows, 2);
    assert_eq!(second.summary.rows_skipped, 0);
    let accounts: Vec<&str> = second
        .valid_rows
        .iter()
        .map(|e| e.account_number.as_str())
        .collect();
    assert_eq!(accounts, vec!["AB123", "NEW1"]);
    assert_eq!(second.valid_rows[0].new_balance.to_string(), "2000.00");
}

#[test]
fn test_status_survives_a_new_context() {
    let dir = TempDir::new().unwrap();
    let key = {
        let ctx = inline_context(&dir, Config::default());
        ctx.orchestrator
            .submit_import("report.csv", REPORT.as_bytes(), report_date())
            .unwrap()
    };

    let reopened =
        BankReportContext::with_config(dir.path(), Config::default(), QueueMode::Inline, None).unwrap();
    assert!(reopened.cached_preview(&key).is_ok());
}

#[test]
fn test_unknown_key_is_not_found() {
    let dir = TempDir::new().unwrap();
    let ctx = inline_context(&dir, Config::default());

    assert_eq!(ctx.orchestrator.status("import_preview_nope").unwrap(), JobStatus::NotFound);
    assert!(ctx.cached_preview("import_preview_nope").is_err());
}

#[test]
fn test_unreadable_upload_reports_failed() {
    let dir = TempDir::new().unwrap();
    let ctx = inline_context(&dir, Config::default());

    let key = ctx
        .orchestrator
        .submit_import("report.xlsx", b"definitely not a workbook", report_date())
        .unwrap();

    match ctx.orchestrator.status(&key).unwrap() {
        JobStatus::Failed { message } => assert!(!message.is_empty()),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[test]
fn test_expired_status_reads_as_not_found() {
    let channel = StatusChannel::new(Arc::new(MemoryCache::new()), Duration::from_millis(20));
    channel.publish("import_preview_short", &JobStatus::Processing).unwrap();
    assert_eq!(channel.status("import_preview_short").unwrap(), JobStatus::Processing);

    thread::sleep(Duration::from_millis(60));
    assert_eq!(channel.status("import_preview_short").unwrap(), JobStatus::NotFound);
}

#[test]
fn test_durable_cache_expiry() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.cache_ttl = Duration::from_millis(30);
    let ctx = inline_context(&dir, config);

    let key = ctx
        .orchestrator
        .submit_import("report.csv", REPORT.as_bytes(), report_date())
        .unwrap();
    thread::sleep(Duration::from_millis(80));

    assert_eq!(ctx.orchestrator.status(&key).unwrap(), JobStatus::NotFound);
    assert_eq!(ctx.status_service.purge_expired_jobs().unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_background_queue_publishes_terminal_status() {
    let dir = TempDir::new().unwrap();
    let repo = Arc::new(DuckDbRepository::new(&dir.path().join("jobs.duckdb")).unwrap());
    repo.ensure_schema().unwrap();
    seed(&repo);

    let files = Arc::new(LocalFileStore::new(dir.path()));
    let channel = StatusChannel::new(Arc::new(MemoryCache::new()), Duration::from_secs(3600));
    let worker = Arc::new(JobWorker::new(
        repo.clone(),
        files.clone(),
        channel.clone(),
        WorkerSettings::default(),
    ));
    let queue = Arc::new(TokioJobQueue::new(worker).unwrap());
    let orchestrator = JobOrchestrator::new(files, queue.clone(), channel.clone());

    let keys: Vec<String> = (0..3)
        .map(|_| {
            orchestrator
                .submit_import("report.csv", REPORT.as_bytes(), report_date())
                .unwrap()
        })
        .collect();

    queue.wait_idle().await;

    for key in &keys {
        let status = channel.status(key).unwrap();
        assert!(status.is_terminal(), "{} still {:?}", key, status);
        assert_eq!(status.preview().unwrap().valid_rows.len(), 1);
    }
}
