//! Local filesystem backend.

use super::Storage;
use crate::error::{Error, Result};
use bytes::Bytes;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Suffix of in-flight writes; such files are never listed.
const TMP_SUFFIX: &str = ".tmp";

/// Filesystem backend rooted at the deposit path.
///
/// Writes go to a hidden temporary file that is fsynced and renamed over
/// the target, so readers never observe a partially written document.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Opens a backend rooted at an existing directory.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(Error::invalid_argument(format!(
                "Deposit path is not a directory: {:?}",
                root
            )));
        }
        Ok(Self { root })
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> Result<PathBuf> {
        if path.split('/').any(|part| part == ".." || part == ".") {
            return Err(Error::invalid_argument(format!("Relative path components in {}", path)));
        }
        Ok(self.root.join(path))
    }
}

impl Storage for FsStorage {
    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.full_path(path)?.is_file())
    }

    fn list(&self, dir: &str) -> Result<Vec<String>> {
        let full_path = self.full_path(dir)?;
        let entries = match fs::read_dir(&full_path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with('.') && name.ends_with(TMP_SUFFIX) {
                    continue;
                }
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn read(&self, path: &str) -> Result<Bytes> {
        let full_path = self.full_path(path)?;
        match fs::read(&full_path) {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::not_found(path.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, data: &[u8], path: &str) -> Result<()> {
        let full_path = self.full_path(path)?;
        let parent = full_path
            .parent()
            .ok_or_else(|| Error::invalid_argument(format!("No parent directory for {}", path)))?;
        fs::create_dir_all(parent)?;

        let file_name = full_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::invalid_argument(format!("Invalid file name in {}", path)))?;
        let tmp_path = parent.join(format!(".{}{}", file_name, TMP_SUFFIX));

        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp_path, &full_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<bool> {
        let full_path = self.full_path(path)?;
        match fs::remove_file(&full_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
