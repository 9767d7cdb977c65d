//! Row validation - untyped spreadsheet row in, typed row or field errors out
//!
//! What each logical field is called in the wild, and how it is checked, is
//! declared once in `IMPORT_SCHEMA`. The validator is a pure function of the
//! row and the schema: no I/O, no hidden state, safe to share across threads.

use rust_decimal::Decimal;

use crate::domain::{Account, CellValue, Field, FieldError, RawRow, ValidatedRow, DEFAULT_CURRENCY};

/// Placeholder some report generators write into empty cells
const PLACEHOLDER: &str = "-";

/// How a field's value is checked and converted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    /// Required free text
    Text,
    /// Required identifier; `fallback` columns are tried when all primary
    /// columns are blank
    AccountIdentifier { fallback: &'static [&'static str] },
    /// Required decimal amount
    Numeric,
    /// Optional text with a default
    Defaulted,
}

/// One row of the field schema: logical field, accepted column names, rule
#[derive(Debug, Clone, Copy)]
pub struct FieldSchema {
    pub field: Field,
    /// Normalized header names, in order of preference
    pub columns: &'static [&'static str],
    pub rule: FieldRule,
}

/// Layout of the bank's performance report
pub const IMPORT_SCHEMA: &[FieldSchema] = &[
    FieldSchema {
        field: Field::BankerCode,
        columns: &["pn_relationship_officer", "banker_code", "pn_ro"],
        rule: FieldRule::Text,
    },
    FieldSchema {
        field: Field::Cif,
        columns: &["cif", "cifno", "cif_no"],
        rule: FieldRule::Text,
    },
    FieldSchema {
        field: Field::ClientName,
        columns: &["client_name", "nama_nasabah", "short_name"],
        rule: FieldRule::Text,
    },
    FieldSchema {
        field: Field::AccountNumber,
        columns: &["account_number", "textbox15", "no_rekening"],
        rule: FieldRule::AccountIdentifier {
            fallback: &["single_pn"],
        },
    },
    FieldSchema {
        field: Field::Balance,
        columns: &["balance", "current_balance", "saldo"],
        rule: FieldRule::Numeric,
    },
    FieldSchema {
        field: Field::AvailableBalance,
        columns: &["availbalance", "available_balance", "avail_balance"],
        rule: FieldRule::Numeric,
    },
    FieldSchema {
        field: Field::ProductCode,
        columns: &["product_code", "product", "prod_code"],
        rule: FieldRule::Text,
    },
    FieldSchema {
        field: Field::Currency,
        columns: &["currency", "ccy", "mata_uang"],
        rule: FieldRule::Defaulted,
    },
];

/// Validates raw rows against a field schema
#[derive(Debug, Clone)]
pub struct RowValidator {
    schema: &'static [FieldSchema],
    default_currency: String,
}

impl Default for RowValidator {
    fn default() -> Self {
        Self::new(IMPORT_SCHEMA)
    }
}

impl RowValidator {
    pub fn new(schema: &'static [FieldSchema]) -> Self {
        Self {
            schema,
            default_currency: DEFAULT_CURRENCY.to_string(),
        }
    }

    pub fn with_default_currency(mut self, currency: &str) -> Self {
        let currency = Account::normalize_currency(currency);
        if !currency.is_empty() {
            self.default_currency = currency;
        }
        self
    }

    fn columns(&self, field: Field) -> &'static [&'static str] {
        self.schema
            .iter()
            .find(|s| s.field == field)
            .map(|s| s.columns)
            .unwrap_or(&[])
    }

    /// Banker code of an already normalized row, `None` when blank or `-`
    ///
    /// The importer uses this to drop filler rows before validation.
    pub fn banker_code(&self, row: &RawRow) -> Option<String> {
        present(row, self.columns(Field::BankerCode))
    }

    /// Validate a row exactly as decoded from the file
    pub fn validate(&self, row_number: usize, raw: &RawRow) -> Result<ValidatedRow, Vec<FieldError>> {
        self.validate_normalized(row_number, &raw.normalized())
    }

    /// Validate a row whose keys are already normalized
    ///
    /// Every failing field is reported, in schema order.
    pub fn validate_normalized(
        &self,
        row_number: usize,
        row: &RawRow,
    ) -> Result<ValidatedRow, Vec<FieldError>> {
        let mut errors = Vec::new();
        let mut values = FieldValues::default();

        for entry in self.schema {
            match entry.rule {
                FieldRule::Text => match present(row, entry.columns) {
                    Some(text) => values.set_text(entry.field, text),
                    None => errors.push(FieldError::MissingField(entry.field)),
                },
                FieldRule::AccountIdentifier { fallback } => {
                    let raw = present(row, entry.columns).or_else(|| present(row, fallback));
                    match raw.map(|r| Account::normalize_number(&r)) {
                        Some(number) if !number.is_empty() => values.account_number = number,
                        _ => errors.push(FieldError::MissingAccountIdentifier),
                    }
                }
                FieldRule::Numeric => match first_present_cell(row, entry.columns) {
                    None => errors.push(FieldError::MissingField(entry.field)),
                    Some(cell) => match parse_numeric(cell).map(|a| storable(entry.field, a)) {
                        Some(Ok(amount)) => values.set_amount(entry.field, amount),
                        Some(Err(e)) => errors.push(e),
                        None => errors.push(FieldError::NotNumeric(entry.field)),
                    },
                },
                FieldRule::Defaulted => {
                    if entry.field == Field::Currency {
                        values.currency = present(row, entry.columns)
                            .map(|c| Account::normalize_currency(&c))
                            .unwrap_or_else(|| self.default_currency.clone());
                    }
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(ValidatedRow {
            row_number,
            banker_code: values.banker_code,
            cif: values.cif,
            client_name: values.client_name,
            account_number: values.account_number,
            product_code: values.product_code,
            balance: values.balance,
            available_balance: values.available_balance,
            currency: values.currency,
        })
    }
}

#[derive(Default)]
struct FieldValues {
    banker_code: String,
    cif: String,
    client_name: String,
    account_number: String,
    product_code: String,
    balance: Decimal,
    available_balance: Decimal,
    currency: String,
}

impl FieldValues {
    fn set_text(&mut self, field: Field, text: String) {
        match field {
            Field::BankerCode => self.banker_code = text,
            Field::Cif => self.cif = text,
            Field::ClientName => self.client_name = text,
            Field::ProductCode => self.product_code = text,
            Field::Currency => self.currency = text,
            Field::AccountNumber => self.account_number = text,
            Field::Balance | Field::AvailableBalance => {}
        }
    }

    fn set_amount(&mut self, field: Field, amount: Decimal) {
        match field {
            Field::Balance => self.balance = amount,
            Field::AvailableBalance => self.available_balance = amount,
            _ => {}
        }
    }
}

/// Text of the first listed column that is neither blank nor the placeholder
fn present(row: &RawRow, columns: &[&str]) -> Option<String> {
    first_present_cell(row, columns).and_then(CellValue::as_text)
}

fn first_present_cell<'r>(row: &'r RawRow, columns: &[&str]) -> Option<&'r CellValue> {
    columns
        .iter()
        .filter_map(|c| row.get(c))
        .find(|cell| match cell.as_text() {
            Some(text) => !text.is_empty() && text != PLACEHOLDER,
            None => false,
        })
}

/// Decimal places kept by the store (`DECIMAL(20, 2)`)
pub const STORED_SCALE: u32 = 2;

/// Integer digits the store can hold
const STORED_INTEGER_DIGITS: u32 = 18;

/// Reject amounts the store would round or refuse
///
/// Trailing zeros do not count as precision: `1.500` is accepted.
fn storable(field: Field, amount: Decimal) -> Result<Decimal, FieldError> {
    if amount.normalize().scale() > STORED_SCALE {
        return Err(FieldError::TooPrecise(field));
    }
    if amount.abs() >= Decimal::from(10i64.pow(STORED_INTEGER_DIGITS)) {
        return Err(FieldError::OutOfRange(field));
    }
    Ok(amount)
}

/// Parse a balance cell
///
/// Number cells are taken as-is. Text keeps digits, `.` and `-` only; when
/// several dots remain, the last one is the decimal point and the others
/// are thousands separators. `(1.000)` is read as a negative amount.
pub fn parse_numeric(cell: &CellValue) -> Option<Decimal> {
    match cell {
        CellValue::Number(n) => Decimal::try_from(*n).ok(),
        CellValue::String(s) => parse_amount_text(s),
        CellValue::Empty | CellValue::Bool(_) => None,
    }
}

fn parse_amount_text(s: &str) -> Option<Decimal> {
    let s = s.trim();
    let (negative, s) = match s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, s),
    };

    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    let cleaned = match cleaned.rfind('.') {
        Some(last) if cleaned.matches('.').count() > 1 => {
            let (whole, fraction) = cleaned.split_at(last);
            format!("{}{}", whole.replace('.', ""), fraction)
        }
        _ => cleaned,
    };

    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let amount: Decimal = cleaned.parse().ok()?;
    Some(if negative && amount > Decimal::ZERO { -amount } else { amount })
}
