//! Slip image files on disk.
//!
//! Images live flat in one uploads directory under server-generated names;
//! the client filename never reaches the filesystem.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StorageError;
use crate::upload::ImageKind;

/// Attempts at drawing a fresh name before giving up.
const MAX_NAME_ATTEMPTS: usize = 16;

/// A slip image written to the uploads directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    /// Server-generated file name (`<uuid>.<ext>`).
    pub filename: String,
    /// Absolute location handed to the OCR worker.
    pub path: PathBuf,
}

/// Stores uploaded slip images under server-generated names.
#[derive(Debug, Clone)]
pub struct SlipStorage {
    upload_directory: PathBuf,
}

impl SlipStorage {
    /// Relative directories are resolved against the current working
    /// directory, since the worker needs absolute paths.
    pub fn new<P: AsRef<Path>>(upload_directory: P) -> Self {
        let dir = upload_directory.as_ref();
        let upload_directory = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(dir))
                .unwrap_or_else(|_| dir.to_path_buf())
        };
        Self { upload_directory }
    }

    pub fn upload_directory(&self) -> &Path {
        &self.upload_directory
    }

    /// Creates the upload directory if needed.
    pub fn ensure_directory(&self) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.upload_directory).map_err(|e| {
            StorageError::CreateDirectory {
                path: self.upload_directory.clone(),
                source: e,
            }
        })
    }

    /// Writes `content` under a new unique name. Uses `create_new` so an
    /// existing file is never overwritten.
    pub fn store(&self, content: &[u8], kind: ImageKind) -> Result<StoredImage, StorageError> {
        self.ensure_directory()?;

        for _ in 0..MAX_NAME_ATTEMPTS {
            let filename = format!("{}.{}", uuid::Uuid::new_v4(), kind.extension());
            let path = self.upload_directory.join(&filename);

            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    file.write_all(content)
                        .and_then(|_| file.sync_all())
                        .map_err(|e| StorageError::WriteFile {
                            path: path.clone(),
                            source: e,
                        })?;
                    return Ok(StoredImage { filename, path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(StorageError::WriteFile { path, source: e }),
            }
        }

        Err(StorageError::NameExhausted(self.upload_directory.clone()))
    }

    /// Deletes a stored image. Used to undo a write whose record was never
    /// created.
    pub fn remove(&self, image: &StoredImage) -> std::io::Result<()> {
        std::fs::remove_file(&image.path)
    }

    /// Resolves a stored name back to its absolute path.
    ///
    /// Rejects anything that is not a single plain path component.
    pub fn path_for(&self, stored_filename: &str) -> Result<PathBuf, StorageError> {
        let candidate = Path::new(stored_filename);
        let is_plain = candidate.components().count() == 1
            && candidate.file_name().and_then(|n| n.to_str()) == Some(stored_filename);
        if !is_plain {
            return Err(StorageError::InvalidName(stored_filename.to_string()));
        }
        Ok(self.upload_directory.join(stored_filename))
    }
}
