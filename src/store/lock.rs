//! Single-writer guard for a database file.

use std::fs::File;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;

use super::error::StoreError;

/// Exclusive advisory lock on `<db>.lock`, held until dropped.
///
/// Only the sync worker takes it; read-only commands can open the database
/// while a worker is running.
#[derive(Debug)]
pub struct WorkerLock {
    path: PathBuf,
    _file: File,
}

impl WorkerLock {
    pub fn acquire(db_path: &Path) -> Result<Self, StoreError> {
        let path = lock_path(db_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let file = File::create(&path).map_err(|e| StoreError::CreateDir {
            path: path.clone(),
            source: e,
        })?;
        file.try_lock_exclusive()
            .map_err(|_| StoreError::Locked {
                path: db_path.to_path_buf(),
            })?;
        Ok(Self { path, _file: file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn lock_path(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}
