//! Spreadsheet decoding
//!
//! CSV is streamed record by record with the `csv` crate. Workbook formats
//! (xlsx, xls, xlsm, ods) go through `calamine`, which loads the first sheet
//! into memory and is then walked row by row. Either way the caller sees the
//! same stream of positioned rows keyed by the raw header text.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};

use crate::domain::result::{Error, Result};
use crate::domain::{CellValue, RawRow, SheetRow};

/// File extensions accepted for upload (lowercase, no dot)
pub const SUPPORTED_EXTENSIONS: &[&str] = &["csv", "xlsx", "xls", "xlsm", "ods"];

/// A lazily decoded sequence of data rows; blank lines are left out
pub type SheetRows = Box<dyn Iterator<Item = Result<SheetRow>> + Send>;

/// Lowercase extension of `path`, if any
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Open a spreadsheet and stream its data rows
///
/// The first non-empty line is the header. Errors here mean the whole file
/// is unusable; per-row decode errors surface through the iterator.
pub fn open_sheet(path: &Path) -> Result<SheetRows> {
    match extension_of(path).as_deref() {
        Some("csv") => open_csv(path),
        Some(ext) if SUPPORTED_EXTENSIONS.contains(&ext) => open_workbook(path),
        Some(ext) => Err(Error::spreadsheet(format!("unsupported file type: .{}", ext))),
        None => Err(Error::spreadsheet(format!(
            "file has no extension: {}",
            path.display()
        ))),
    }
}

/// Pick `;` when the header line has more semicolons than commas
fn sniff_delimiter(path: &Path) -> Result<u8> {
    let mut first_line = String::new();
    BufReader::new(File::open(path)?).read_line(&mut first_line)?;
    let commas = first_line.matches(',').count();
    let semicolons = first_line.matches(';').count();
    Ok(if semicolons > commas { b';' } else { b',' })
}

fn open_csv(path: &Path) -> Result<SheetRows> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(path)?)
        .flexible(true)
        .from_path(path)
        .map_err(|e| Error::spreadsheet(format!("failed to read CSV: {}", e)))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| Error::spreadsheet(format!("failed to read CSV header: {}", e)))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(Error::spreadsheet("CSV file has no header row"));
    }

    let rows = reader.into_records().filter_map(move |record| {
        let record = match record {
            Ok(r) => r,
            Err(e) => return Some(Err(Error::spreadsheet(format!("malformed CSV line: {}", e)))),
        };
        let row_number = record.position().map_or(0, |p| p.line() as usize);
        let cells = RawRow::from_pairs(
            headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.clone(), CellValue::from(v))),
        );
        if cells.is_blank() {
            None
        } else {
            Some(Ok(SheetRow { row_number, cells }))
        }
    });

    Ok(Box::new(rows))
}

fn open_workbook(path: &Path) -> Result<SheetRows> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| Error::spreadsheet(format!("failed to open workbook: {}", e)))?;

    let first_sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| Error::spreadsheet("workbook has no sheets"))?;

    let range = workbook
        .worksheet_range(&first_sheet)
        .map_err(|e| Error::spreadsheet(format!("failed to read sheet '{}': {}", first_sheet, e)))?;

    Ok(Box::new(range_rows(range)?.into_iter().map(Ok)))
}

/// Decode a worksheet range; row numbers are absolute sheet positions
fn range_rows(range: Range<Data>) -> Result<Vec<SheetRow>> {
    let first_row = range.start().map_or(0, |(row, _)| row as usize);
    let mut lines = range.rows().enumerate();

    let headers: Vec<String> = loop {
        match lines.next() {
            Some((_, line)) => {
                let names: Vec<String> = line.iter().map(|c| c.to_string()).collect();
                if names.iter().any(|n| !n.trim().is_empty()) {
                    break names;
                }
            }
            None => return Err(Error::spreadsheet("sheet has no header row")),
        }
    };

    let mut rows = Vec::new();
    for (offset, line) in lines {
        let cells = RawRow::from_pairs(
            headers
                .iter()
                .zip(line.iter())
                .map(|(h, cell)| (h.clone(), cell_value(cell))),
        );
        if cells.is_blank() {
            continue;
        }
        rows.push(SheetRow {
            row_number: first_row + offset + 1,
            cells,
        });
    }
    Ok(rows)
}

fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::String(s) => CellValue::from(s.as_str()),
        Data::Error(_) => CellValue::Empty,
        other => CellValue::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of(Path::new("report.CSV")).as_deref(), Some("csv"));
        assert_eq!(extension_of(Path::new("dir.v2/report.xlsx")).as_deref(), Some("xlsx"));
        assert_eq!(extension_of(Path::new("report")), None);
    }

    #[test]
    fn test_csv_rows_carry_file_positions() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "report.csv",
            "\u{feff}PN Relationship Officer,Account Number,Balance\nRO1,001-2,100\n,,\nRO2,003,200\n",
        );

        let rows: Vec<SheetRow> = open_sheet(&path).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_number, 2);
        assert_eq!(rows[1].row_number, 4);
        assert_eq!(
            rows[0].cells.get("PN Relationship Officer"),
            Some(&CellValue::String("RO1".to_string()))
        );
    }

    #[test]
    fn test_repeated_header_keeps_filled_cell() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "report.csv", "cif,balance,balance\nC1,1500,\n");

        let rows: Vec<SheetRow> = open_sheet(&path).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(rows[0].cells.text_of(&["balance"]), Some("1500".to_string()));
    }

    #[test]
    fn test_semicolon_csv() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "report.csv", "cif;balance\nC1;1.234,50\n");

        let rows: Vec<SheetRow> = open_sheet(&path).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(rows[0].cells.text_of(&["balance"]), Some("1.234,50".to_string()));
    }

    #[test]
    fn test_unsupported_and_empty_files() {
        let dir = TempDir::new().unwrap();
        let pdf = write_file(&dir, "report.pdf", "%PDF");
        assert!(matches!(open_sheet(&pdf), Err(Error::Spreadsheet(_))));

        let empty = write_file(&dir, "empty.csv", "");
        assert!(open_sheet(&empty).is_err());
    }

    #[test]
    fn test_corrupt_workbook_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "report.xlsx", "not a zip archive");
        assert!(matches!(open_sheet(&path), Err(Error::Spreadsheet(_))));
    }

    #[test]
    fn test_workbook_cells() {
        assert_eq!(cell_value(&Data::Int(42)), CellValue::Number(42.0));
        assert_eq!(cell_value(&Data::String("  ".to_string())), CellValue::String("  ".to_string()));
        assert_eq!(cell_value(&Data::Empty), CellValue::Empty);
    }
}
