//! Integration tests for the import pipeline
//!
//! Everything below runs against a real DuckDB file in a temp directory:
//! spreadsheet in, preview out, commit, export.
//!
//! Run with: cargo test --test integration_tests -- --nocapture

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tempfile::TempDir;

use bankreport_core::adapters::duckdb::DuckDbRepository;
use bankreport_core::adapters::local_files::LocalFileStore;
use bankreport_core::domain::{Account, ExportRequest};
use bankreport_core::ports::{BalanceUpdate, Repository};
use bankreport_core::services::{CommitService, ExportService, RowImporter};

// ============================================================================
// Test Helpers
// ============================================================================

const HEADER: &str =
    "pn_relationship_officer,cif,client_name,account_number,product_code,balance,availbalance";

struct Seeded {
    repo: Arc<DuckDbRepository>,
    ro1: i64,
    ro2: i64,
    acc1: i64,
}

/// Two bankers, two clients, one existing account (ACC1, balance 1000)
fn seeded_repo(temp_dir: &TempDir) -> Seeded {
    let repo = DuckDbRepository::new(&temp_dir.path().join("test.duckdb"))
        .expect("Failed to create repository");
    repo.ensure_schema().expect("Failed to initialize schema");

    let ro1 = repo.add_banker("RO1", "Rina", None).unwrap();
    let ro2 = repo.add_banker("RO2", "Budi", None).unwrap();
    let c1 = repo.add_client("C001", "PT Maju").unwrap();
    repo.add_client("C002", "CV Sentosa").unwrap();

    let mut account = Account::new("ACC-1", c1.id);
    account.banker_id = Some(ro1.id);
    account.current_balance = Decimal::new(1000, 0);
    account.available_balance = Decimal::new(1000, 0);
    let acc1 = repo.add_account(&account).unwrap();

    Seeded {
        repo: Arc::new(repo),
        ro1: ro1.id,
        ro2: ro2.id,
        acc1: acc1.id,
    }
}

fn write_csv(dir: &TempDir, name: &str, lines: &[String]) -> PathBuf {
    let path = dir.path().join(name);
    let mut content = String::from(HEADER);
    for line in lines {
        content.push('\n');
        content.push_str(line);
    }
    content.push('\n');
    std::fs::write(&path, content).unwrap();
    path
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn import(repo: &Arc<DuckDbRepository>, path: &Path, chunk_size: usize) -> bankreport_core::PreviewResult {
    let mut importer = RowImporter::new(repo.clone(), date(2025, 1, 31)).with_chunk_size(chunk_size);
    importer.import_file(path).expect("import should not fail");
    importer.finish()
}

fn sample_rows() -> Vec<String> {
    vec![
        // 2: valid, existing account, dotted thousands
        "RO1,C001,PT Maju,ACC-1,SAV,1.500.00,1500".to_string(),
        // 3: pre-filtered
        "-,C002,CV Sentosa,12345,SAV,10,10".to_string(),
        // 4: unknown banker
        "RO9,C002,CV Sentosa,ACC-2,SAV,10,10".to_string(),
        // 5: unknown client
        "RO2,C999,Nobody,ACC-3,SAV,10,10".to_string(),
        // 6: valid, new account
        "RO2,C002,CV Sentosa,NEW 77,GIRO,2000,1900".to_string(),
        // 7: two field errors
        "RO1,C001,PT Maju,,SAV,abc,10".to_string(),
    ]
}

// ============================================================================
// Preview
// ============================================================================

#[test]
fn test_csv_preview_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let seeded = seeded_repo(&temp_dir);
    let path = write_csv(&temp_dir, "report.csv", &sample_rows());

    let preview = import(&seeded.repo, &path, 1000);

    assert_eq!(preview.summary.total_rows, 6);
    assert_eq!(preview.summary.rows_skipped, 4);
    assert_eq!(preview.summary.accounts_to_update, 1);
    assert_eq!(preview.summary.new_transactions_detected, 2);
    assert_eq!(
        preview.summary.total_rows,
        preview.summary.rows_skipped + preview.valid_rows.len()
    );

    let rows: Vec<usize> = preview.valid_rows.iter().map(|e| e.row_number).collect();
    assert_eq!(rows, vec![2, 6]);

    let existing = &preview.valid_rows[0];
    assert_eq!(existing.account_id, Some(seeded.acc1));
    assert_eq!(existing.previous_balance, Decimal::new(1000, 0));
    assert_eq!(existing.new_balance, Decimal::new(150000, 2));
    assert!(!existing.is_new_account);

    let new = &preview.valid_rows[1];
    assert_eq!(new.account_number, "NEW77");
    assert!(new.is_new_account);
    assert_eq!(new.currency, "IDR");

    let errors: Vec<(usize, &str)> = preview
        .errors
        .iter()
        .map(|e| (e.row_number, e.field.as_str()))
        .collect();
    assert_eq!(
        errors,
        vec![
            (4, "banker_code"),
            (5, "cif"),
            (7, "account_number"),
            (7, "balance"),
        ]
    );
    assert_eq!(preview.errors[0].message, "banker not found for code: RO9");
    assert_eq!(preview.errors[1].message, "client not found for CIF: C999");

    assert_eq!(
        preview.universal_bankers_to_update_ids.iter().copied().collect::<Vec<_>>(),
        vec![seeded.ro1, seeded.ro2]
    );
}

#[test]
fn test_chunk_size_does_not_change_result() {
    let temp_dir = TempDir::new().unwrap();
    let seeded = seeded_repo(&temp_dir);

    let lines: Vec<String> = (0..5000)
        .map(|i| match i % 5 {
            0 => format!("RO1,C001,PT Maju,ACC-{},SAV,{}.50,{}", i, i, i),
            1 => "-,C001,PT Maju,X,SAV,1,1".to_string(),
            2 => format!("RO9,C001,PT Maju,ACC-{},SAV,1,1", i),
            3 => format!("RO2,C002,CV Sentosa,ACC-1,SAV,{},x", i),
            _ => "RO2,C002,CV Sentosa,ACC-1,SAV,1.234.56,1".to_string(),
        })
        .collect();
    let path = write_csv(&temp_dir, "big.csv", &lines);

    let chunked = import(&seeded.repo, &path, 1000);
    let single = import(&seeded.repo, &path, 5000);
    let odd = import(&seeded.repo, &path, 7);

    assert_eq!(chunked.summary.total_rows, 5000);
    assert_eq!(chunked.summary.rows_skipped, 3000);
    assert_eq!(chunked.valid_rows.len(), 2000);

    assert_eq!(chunked.summary, single.summary);
    assert_eq!(chunked.errors, single.errors);
    assert_eq!(chunked.valid_rows, single.valid_rows);
    assert_eq!(odd.summary, single.summary);
    assert_eq!(odd.errors, single.errors);

    let rows: Vec<usize> = chunked.errors.iter().map(|e| e.row_number).collect();
    let mut sorted = rows.clone();
    sorted.sort();
    assert_eq!(rows, sorted, "errors must stay in row order");
}

// ============================================================================
// Commit
// ============================================================================

#[test]
fn test_commit_is_idempotent_and_override_replaces() {
    let temp_dir = TempDir::new().unwrap();
    let seeded = seeded_repo(&temp_dir);
    let path = write_csv(&temp_dir, "report.csv", &sample_rows());
    let preview = import(&seeded.repo, &path, 1000);
    let report_date = preview.report_date;

    let service = CommitService::new(seeded.repo.clone());

    let first = service.commit(&preview.valid_rows, report_date, false).unwrap();
    assert!(first.success);
    assert_eq!(first.processed_count, 1);
    assert_eq!(first.skipped.len(), 1);
    assert_eq!(first.skipped[0].account_number, "NEW77");

    let account = seeded.repo.find_account_by_number("ACC1").unwrap().unwrap();
    assert_eq!(account.current_balance, Decimal::new(1500, 0));
    assert_eq!(account.available_balance, Decimal::new(1500, 0));

    // Re-submitting the same preview changes nothing
    let again = service.commit(&preview.valid_rows, report_date, false).unwrap();
    assert!(again.success);
    assert_eq!(again.processed_count, 0);
    assert_eq!(again.skipped.len(), 2);
    assert_eq!(seeded.repo.get_account_transactions(seeded.acc1).unwrap().len(), 1);

    // Override replaces the history row in place
    let mut corrected = preview.valid_rows[0].clone();
    corrected.new_balance = Decimal::new(1600, 0);
    let replaced = service.commit(&[corrected], report_date, true).unwrap();
    assert_eq!(replaced.processed_count, 1);

    let history = seeded.repo.get_account_transactions(seeded.acc1).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].balance, Decimal::new(1600, 0));
    assert_eq!(history[0].previous_balance, Decimal::new(1000, 0));
    assert_eq!(
        seeded.repo.find_account_by_number("ACC1").unwrap().unwrap().current_balance,
        Decimal::new(1600, 0)
    );
}

#[test]
fn test_unstorable_amounts_stay_out_of_the_commit() {
    let temp_dir = TempDir::new().unwrap();
    let seeded = seeded_repo(&temp_dir);
    let path = write_csv(
        &temp_dir,
        "report.csv",
        &[
            "RO1,C001,PT Maju,ACC-1,SAV,10.25,10".to_string(),
            "RO1,C001,PT Maju,ACC-2,SAV,999999999999999999999999,10".to_string(),
            "RO1,C001,PT Maju,ACC-3,SAV,1.235,1".to_string(),
        ],
    );

    let preview = import(&seeded.repo, &path, 1000);
    let errors: Vec<(usize, &str)> = preview
        .errors
        .iter()
        .map(|e| (e.row_number, e.message.as_str()))
        .collect();
    assert_eq!(
        errors,
        vec![
            (3, "balance is too large to store"),
            (4, "balance has more than 2 decimal places"),
        ]
    );
    assert_eq!(preview.valid_rows.len(), 1);

    let result = CommitService::new(seeded.repo.clone())
        .commit(&preview.valid_rows, preview.report_date, false)
        .unwrap();
    assert!(result.success);
    assert_eq!(result.processed_count, 1);

    // What the operator approved is what the store holds
    let account = seeded.repo.find_account_by_number("ACC1").unwrap().unwrap();
    assert_eq!(account.current_balance, preview.valid_rows[0].new_balance);
    assert_eq!(account.current_balance, Decimal::new(1025, 2));
    let history = seeded.repo.get_account_transactions(seeded.acc1).unwrap();
    assert_eq!(history[0].balance, preview.valid_rows[0].new_balance);
}

#[test]
fn test_small_commit_chunks_commit_everything() {
    let temp_dir = TempDir::new().unwrap();
    let seeded = seeded_repo(&temp_dir);
    let client = seeded.repo.find_client_by_cif("C002").unwrap().unwrap();
    for i in 0..12 {
        let mut account = Account::new(&format!("BULK-{}", i), client.id);
        account.banker_id = Some(seeded.ro2);
        seeded.repo.add_account(&account).unwrap();
    }

    let lines: Vec<String> = (0..12)
        .map(|i| format!("RO2,C002,CV Sentosa,BULK-{},SAV,{},{}", i, 100 + i, 100 + i))
        .collect();
    let path = write_csv(&temp_dir, "bulk.csv", &lines);
    let preview = import(&seeded.repo, &path, 1000);
    assert_eq!(preview.summary.accounts_to_update, 12);

    let result = CommitService::new(seeded.repo.clone())
        .with_chunk_size(5)
        .commit(&preview.valid_rows, preview.report_date, false)
        .unwrap();
    assert!(result.success);
    assert_eq!(result.processed_count, 12);
    assert!(result.skipped.is_empty());
}

#[test]
fn test_concurrent_commits_on_shared_repository() {
    let temp_dir = TempDir::new().unwrap();
    let seeded = seeded_repo(&temp_dir);

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let repo = seeded.repo.clone();
            let banker_id = seeded.ro1;
            thread::spawn(move || {
                let update = BalanceUpdate {
                    row_number: 2,
                    account_number: "ACC1".to_string(),
                    banker_id,
                    balance: Decimal::new(2000 + i, 0),
                    available_balance: Decimal::new(2000 + i, 0),
                };
                repo.apply_balance_updates(date(2025, 3, 1 + i as u32), &[update], false)
                    .unwrap()
            })
        })
        .collect();

    for handle in handles {
        let outcomes = handle.join().unwrap();
        assert!(outcomes[0].is_persisted());
    }

    let history = seeded.repo.get_account_transactions(seeded.acc1).unwrap();
    assert_eq!(history.len(), 4);
    // The newest report date wins regardless of commit order
    assert_eq!(
        seeded.repo.find_account_by_number("ACC1").unwrap().unwrap().current_balance,
        Decimal::new(2003, 0)
    );
}

// ============================================================================
// Export
// ============================================================================

#[test]
fn test_export_report_with_baseline_and_growth() {
    let temp_dir = TempDir::new().unwrap();
    let seeded = seeded_repo(&temp_dir);

    let update = |balance: i64| BalanceUpdate {
        row_number: 2,
        account_number: "ACC1".to_string(),
        banker_id: seeded.ro1,
        balance: Decimal::new(balance, 0),
        available_balance: Decimal::new(balance, 0),
    };
    for (report_date, balance) in [
        (date(2024, 12, 31), 1000),
        (date(2025, 1, 31), 1500),
        (date(2025, 2, 28), 1800),
    ] {
        seeded
            .repo
            .apply_balance_updates(report_date, &[update(balance)], false)
            .unwrap();
    }

    let files = Arc::new(LocalFileStore::new(temp_dir.path()));
    let report = ExportService::new(seeded.repo.clone(), files)
        .generate(
            &ExportRequest {
                banker_ids: vec![seeded.ro1, seeded.ro2],
                start_date: date(2025, 1, 1),
                end_date: date(2025, 3, 31),
                baseline_year: 2024,
            },
            "export_report_test",
        )
        .unwrap();

    assert_eq!(report.file_name, "export_report_test.csv");
    assert!(report.file_path.starts_with(temp_dir.path().join("reports")));

    let mut reader = csv::Reader::from_path(&report.file_path).unwrap();
    let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(
        header,
        vec![
            "banker_code",
            "banker_name",
            "baseline_2024",
            "2025-01-31",
            "2025-02-28",
            "latest",
            "growth",
            "growth_pct"
        ]
    );

    let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 2);

    let amount = |record: &csv::StringRecord, i: usize| -> Decimal { record[i].parse().unwrap() };
    let rina = &records[0];
    assert_eq!(&rina[0], "RO1");
    assert_eq!(amount(rina, 2), Decimal::new(1000, 0));
    assert_eq!(amount(rina, 3), Decimal::new(1500, 0));
    assert_eq!(amount(rina, 4), Decimal::new(1800, 0));
    assert_eq!(amount(rina, 5), Decimal::new(1800, 0));
    assert_eq!(amount(rina, 6), Decimal::new(800, 0));
    assert_eq!(amount(rina, 7), Decimal::new(80, 0));

    // A banker with no balances in range still gets a row
    let budi = &records[1];
    assert_eq!(&budi[0], "RO2");
    assert_eq!(amount(budi, 2), Decimal::ZERO);
    assert_eq!(&budi[5], "");
}
