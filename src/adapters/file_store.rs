//! Directory-backed file store.
//!
//! Uploads are written to `<root>/<name>.part` and renamed into place on a
//! normal end, so a half-received file never shadows a good one.
//!
//! Names are relative paths below the root. Absolute paths, `..` and
//! anything that is not a plain path component are refused.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

use log::{info, warn};

use crate::error::TransferError;
use crate::ports::{FileStore, FileWriter};

const PART_SUFFIX: &str = ".part";

pub struct DirFileStore {
    root: PathBuf,
}

impl DirFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map an upload name to a path below the root.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, TransferError> {
        let rel = Path::new(name.trim_start_matches('/'));
        let plain = rel.components().all(|c| matches!(c, Component::Normal(_)));
        if name.is_empty() || !plain || rel.as_os_str().is_empty() {
            warn!("FileStore: refused name {:?}", name);
            return Err(TransferError::InvalidOperation);
        }
        Ok(self.root.join(rel))
    }
}

impl FileStore for DirFileStore {
    fn create(&mut self, name: &str, len: u32) -> Result<Box<dyn FileWriter>, TransferError> {
        let path = self.resolve(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                warn!("FileStore: mkdir {}: {}", parent.display(), e);
                TransferError::CannotStart
            })?;
        }
        let mut part = path.clone().into_os_string();
        part.push(PART_SUFFIX);
        let part = PathBuf::from(part);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&part)
            .map_err(|e| {
                warn!("FileStore: open {}: {}", part.display(), e);
                TransferError::CannotStart
            })?;
        info!("FileStore: receiving {} ({} bytes)", path.display(), len);
        Ok(Box::new(DirFileWriter {
            path,
            part,
            file: Some(file),
        }))
    }
}

struct DirFileWriter {
    path: PathBuf,
    part: PathBuf,
    file: Option<File>,
}

impl FileWriter for DirFileWriter {
    fn write(&mut self, pos: u32, data: &[u8]) -> Result<(), TransferError> {
        let file = self.file.as_mut().ok_or(TransferError::NotUploading)?;
        file.seek(SeekFrom::Start(u64::from(pos)))
            .and_then(|_| file.write_all(data))
            .map_err(|e| {
                warn!("FileStore: write {} @{}: {}", self.part.display(), pos, e);
                TransferError::WriteFailed
            })
    }

    fn finish(&mut self, is_normal_end: bool) {
        let Some(file) = self.file.take() else {
            return;
        };
        let synced = file.sync_all();
        drop(file);
        if is_normal_end && synced.is_ok() {
            match fs::rename(&self.part, &self.path) {
                Ok(()) => info!("FileStore: stored {}", self.path.display()),
                Err(e) => warn!("FileStore: rename {}: {}", self.path.display(), e),
            }
        } else if let Err(e) = fs::remove_file(&self.part) {
            warn!("FileStore: discard {}: {}", self.part.display(), e);
        }
    }
}
