//! Spreadsheet row models
//!
//! A row travels through two stages: an untyped `RawRow` exactly as decoded
//! from the file, and a typed `ValidatedRow` produced by the validator.
//! Problems found along the way are kept as `RowError` data.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single decoded spreadsheet cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Empty,
    Bool(bool),
    Number(f64),
    String(String),
}

impl CellValue {
    /// Render the cell as trimmed text, `None` for empty cells
    ///
    /// Integral numbers are rendered without a fractional part so that an
    /// account number stored as a number cell reads `1234`, not `1234.0`.
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::Bool(b) => Some(b.to_string()),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    Some(format!("{}", *n as i64))
                } else {
                    Some(n.to_string())
                }
            }
            CellValue::String(s) => Some(s.trim().to_string()),
        }
    }

    /// True for empty cells and whitespace-only strings
    pub fn is_blank(&self) -> bool {
        self.as_text().map_or(true, |s| s.is_empty())
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            CellValue::Empty
        } else {
            CellValue::String(s.to_string())
        }
    }
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace pattern"))
}

/// Normalize a column header: trimmed, lowercase, inner whitespace as `_`
pub fn normalize_key(key: &str) -> String {
    whitespace_re()
        .replace_all(key.trim(), "_")
        .to_lowercase()
}

/// An untyped spreadsheet line: column name -> cell value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    cells: HashMap<String, CellValue>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row from `(column, value)` pairs
    ///
    /// A repeated column keeps its first non-blank value.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<CellValue>,
    {
        let mut row = Self::default();
        for (key, value) in pairs {
            row.merge(key.into(), value.into());
        }
        row
    }

    fn merge(&mut self, key: String, value: CellValue) {
        match self.cells.get(&key) {
            Some(existing) if !existing.is_blank() => {}
            _ => {
                self.cells.insert(key, value);
            }
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: CellValue) {
        self.cells.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.cells.get(key)
    }

    /// Trimmed text of the first listed column that holds a non-blank value
    pub fn text_of(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|k| self.cells.get(*k))
            .filter_map(CellValue::as_text)
            .find(|s| !s.is_empty())
    }

    /// Copy of this row with normalized keys and trimmed string values
    ///
    /// When two headers collapse onto the same key, the non-blank value wins.
    pub fn normalized(&self) -> RawRow {
        let mut row = RawRow {
            cells: HashMap::with_capacity(self.cells.len()),
        };
        for (key, value) in &self.cells {
            let value = match value {
                CellValue::String(s) => CellValue::from(s.trim()),
                other => other.clone(),
            };
            row.merge(normalize_key(key), value);
        }
        row
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// True when every cell is blank (trailing empty lines in spreadsheets)
    pub fn is_blank(&self) -> bool {
        self.cells.values().all(CellValue::is_blank)
    }
}

/// A data row together with its 1-based position in the source file
///
/// The header is row 1, so the first data row is row 2.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    pub row_number: usize,
    pub cells: RawRow,
}

impl SheetRow {
    /// Number consecutive data rows as they would appear under a header line
    pub fn numbered(rows: impl IntoIterator<Item = RawRow>) -> Vec<SheetRow> {
        rows.into_iter()
            .enumerate()
            .map(|(i, cells)| SheetRow {
                row_number: i + 2,
                cells,
            })
            .collect()
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

/// Logical fields of the import schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    BankerCode,
    Cif,
    ClientName,
    AccountNumber,
    Balance,
    AvailableBalance,
    ProductCode,
    Currency,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::BankerCode => "banker_code",
            Field::Cif => "cif",
            Field::ClientName => "client_name",
            Field::AccountNumber => "account_number",
            Field::Balance => "balance",
            Field::AvailableBalance => "available_balance",
            Field::ProductCode => "product_code",
            Field::Currency => "currency",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single field of a row failed validation
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FieldError {
    #[error("{0} is required")]
    MissingField(Field),

    #[error("account number or single PN is required")]
    MissingAccountIdentifier,

    #[error("{0} is not a valid number")]
    NotNumeric(Field),

    #[error("{0} is too large to store")]
    OutOfRange(Field),

    #[error("{0} has more than 2 decimal places")]
    TooPrecise(Field),
}

impl FieldError {
    /// The field this error is keyed by
    pub fn field(&self) -> Field {
        match self {
            FieldError::MissingField(f)
            | FieldError::NotNumeric(f)
            | FieldError::OutOfRange(f)
            | FieldError::TooPrecise(f) => *f,
            FieldError::MissingAccountIdentifier => Field::AccountNumber,
        }
    }
}

/// A typed, sanitized row that satisfies the full import schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedRow {
    pub row_number: usize,
    pub banker_code: String,
    pub cif: String,
    pub client_name: String,
    /// Normalized (alphanumeric only)
    pub account_number: String,
    pub product_code: String,
    pub balance: Decimal,
    pub available_balance: Decimal,
    pub currency: String,
}

/// A recoverable problem with one row of the uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub row_number: usize,
    /// Field name or identifier the message refers to
    pub field: String,
    pub message: String,
}

impl RowError {
    pub fn new(row_number: usize, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            row_number,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn from_field_error(row_number: usize, error: &FieldError) -> Self {
        Self::new(row_number, error.field().as_str(), error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("  Account Number "), "account_number");
        assert_eq!(normalize_key("PN_Relationship_Officer"), "pn_relationship_officer");
        assert_eq!(normalize_key("Avail\tBalance"), "avail_balance");
    }

    #[test]
    fn test_number_cell_text() {
        assert_eq!(CellValue::Number(1234.0).as_text(), Some("1234".to_string()));
        assert_eq!(CellValue::Number(12.5).as_text(), Some("12.5".to_string()));
        assert_eq!(CellValue::Empty.as_text(), None);
    }

    #[test]
    fn test_normalized_row_trims_values() {
        let raw = RawRow::from_pairs([(" CIF ", "  C001 "), ("Client Name", "   ")]);
        let row = raw.normalized();

        assert_eq!(row.get("cif"), Some(&CellValue::String("C001".to_string())));
        assert_eq!(row.get("client_name"), Some(&CellValue::Empty));
    }

    #[test]
    fn test_normalized_row_prefers_non_blank_duplicate() {
        let raw = RawRow::from_pairs([("Balance", "100"), ("balance ", "")]);
        let row = raw.normalized();
        assert_eq!(row.text_of(&["balance"]), Some("100".to_string()));
    }

    #[test]
    fn test_repeated_column_keeps_non_blank_value() {
        let row = RawRow::from_pairs([("balance", "100"), ("cif", "C001"), ("balance", "")]);
        assert_eq!(row.get("balance"), Some(&CellValue::String("100".to_string())));

        let row = RawRow::from_pairs([("balance", ""), ("balance", "250")]);
        assert_eq!(row.text_of(&["balance"]), Some("250".to_string()));
    }

    #[test]
    fn test_text_of_falls_through_aliases() {
        let row = RawRow::from_pairs([("account_number", ""), ("textbox15", "A-1")]);
        assert_eq!(row.text_of(&["account_number", "textbox15"]), Some("A-1".to_string()));
        assert_eq!(row.text_of(&["missing"]), None);
    }

    #[test]
    fn test_field_error_messages() {
        let err = FieldError::MissingField(Field::Cif);
        assert_eq!(err.to_string(), "cif is required");
        assert_eq!(err.field(), Field::Cif);
        assert_eq!(FieldError::MissingAccountIdentifier.field(), Field::AccountNumber);

        let row_error = RowError::from_field_error(4, &FieldError::NotNumeric(Field::Balance));
        assert_eq!(row_error.row_number, 4);
        assert_eq!(row_error.field, "balance");
        assert_eq!(row_error.message, "balance is not a valid number");
        assert_eq!(
            FieldError::TooPrecise(Field::AvailableBalance).to_string(),
            "available_balance has more than 2 decimal places"
        );
    }
}
