//! Banker, client and branch domain models

use serde::{Deserialize, Serialize};

/// A universal banker (relationship officer)
///
/// Spreadsheets reference bankers by their short personnel code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Banker {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub branch_id: Option<i64>,
}

impl Banker {
    /// Banker codes are compared after trimming surrounding whitespace
    pub fn normalize_code(code: &str) -> String {
        code.trim().to_string()
    }
}

/// A bank client, identified by CIF
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    pub cif: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: i64,
    pub code: String,
    pub name: String,
}
