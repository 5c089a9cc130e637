//! Local storage module for saving consultations
//!
//! Each finished consultation is written twice under a per-user folder:
//! a JSON document for machines and a Markdown report for people.

use crate::record::SessionRecord;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where a saved consultation ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedPaths {
    pub json: PathBuf,
    pub markdown: PathBuf,
}

/// File sink rooted at a `user_data` directory
#[derive(Debug, Clone)]
pub struct ConsultationStore {
    root: PathBuf,
}

impl ConsultationStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default location in the platform data directory
    pub fn default_root() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("consult-script").join("user_data"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder holding every consultation of one user
    pub fn user_dir(&self, user_id: &str) -> Result<PathBuf, StorageError> {
        validate_user_id(user_id)?;
        Ok(self.root.join(user_id))
    }

    /// Write both renderings of `record`.
    ///
    /// Files are named `consultation_{timestamp}.{json,md}`; a second save
    /// within the same second overwrites the first.
    pub fn save(&self, record: &SessionRecord) -> Result<SavedPaths, StorageError> {
        let dir = self.user_dir(record.user_id())?;

        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| StorageError::CreateDirectory {
                path: dir.clone(),
                source: e,
            })?;
            info!("Created user directory: {:?}", dir);
        }

        let stem = format!("consultation_{}", record.timestamp_key());

        let json = serde_json::to_string_pretty(&record.to_structured_document())?;
        let markdown = record.to_human_report();
        let json_path = dir.join(format!("{}.json", stem));
        let markdown_path = dir.join(format!("{}.md", stem));

        write_file(&json_path, &json)?;
        if let Err(e) = write_file(&markdown_path, &markdown) {
            // Either both files exist or neither does
            if let Err(remove_err) = fs::remove_file(&json_path) {
                warn!(path = ?json_path, error = %remove_err, "Failed to remove partial save");
            }
            return Err(e);
        }

        info!(
            user_id = record.user_id(),
            json = ?json_path,
            markdown = ?markdown_path,
            "Saved consultation"
        );
        Ok(SavedPaths {
            json: json_path,
            markdown: markdown_path,
        })
    }
}

/// Reject ids that cannot name a single folder under the storage root
pub fn validate_user_id(user_id: &str) -> Result<(), StorageError> {
    let invalid = user_id.is_empty()
        || user_id == "."
        || user_id == ".."
        || user_id
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control());
    if invalid {
        return Err(StorageError::InvalidUserId(user_id.to_string()));
    }
    Ok(())
}

fn write_file(path: &Path, contents: &str) -> Result<(), StorageError> {
    let mut file = fs::File::create(path).map_err(|e| StorageError::CreateFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    file.write_all(contents.as_bytes())
        .map_err(|e| StorageError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })?;

    file.flush().map_err(|e| StorageError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Storage errors with contextual information
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("User id {0:?} cannot be used as a folder name")]
    InvalidUserId(String),

    #[error("Failed to serialize consultation: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create file {path}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
