//! File store port - uploaded spreadsheets and generated reports

use std::path::PathBuf;

use crate::domain::result::Result;

/// Storage area a file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageArea {
    /// Uploaded spreadsheets waiting to be (or already) processed
    Imports,
    /// Generated report files offered for download
    Reports,
}

impl StorageArea {
    pub fn dir_name(&self) -> &'static str {
        match self {
            StorageArea::Imports => "imports",
            StorageArea::Reports => "reports",
        }
    }
}

/// Blob store for spreadsheets and reports
pub trait FileStore: Send + Sync {
    /// Persist `bytes` as `name` in `area`, returning the stored location
    fn put(&self, area: StorageArea, name: &str, bytes: &[u8]) -> Result<PathBuf>;

    /// Location a file named `name` in `area` is (or would be) stored at
    fn path_for(&self, area: StorageArea, name: &str) -> PathBuf;

    /// Delete a stored file; deleting a missing file is not an error
    fn delete(&self, area: StorageArea, name: &str) -> Result<()>;
}
