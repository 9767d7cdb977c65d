//! Local filesystem file store
//!
//! Layout under the data directory:
//! ```text
//! <root>/imports/<name>
//! <root>/reports/<name>
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::result::{Error, Result};
use crate::ports::{FileStore, StorageArea};

pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn check_name(name: &str) -> Result<()> {
        let plain = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\']);
        if plain {
            Ok(())
        } else {
            Err(Error::storage(format!("invalid file name: {:?}", name)))
        }
    }
}

impl FileStore for LocalFileStore {
    fn put(&self, area: StorageArea, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        Self::check_name(name)?;
        let dir = self.root.join(area.dir_name());
        fs::create_dir_all(&dir)?;

        // Write then rename so readers never see a half-written file
        let path = dir.join(name);
        let partial = dir.join(format!(".{}.partial", name));
        fs::write(&partial, bytes)?;
        fs::rename(&partial, &path)?;
        Ok(path)
    }

    fn path_for(&self, area: StorageArea, name: &str) -> PathBuf {
        self.root.join(area.dir_name()).join(name)
    }

    fn delete(&self, area: StorageArea, name: &str) -> Result<()> {
        Self::check_name(name)?;
        match fs::remove_file(self.path_for(area, name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
