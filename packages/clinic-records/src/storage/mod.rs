//!
//! Durable storage for visit record attachments.
//!
//! Files live in a flat directory below the uploads root and are served back at
//! `/uploads/records/<name>`. Stored names are generated, never caller supplied,
//! and an existing file is never overwritten. Every path is resolved through a
//! [`PathBoundary`] rooted at the records directory.
//!
use crate::config::{StorageConfig, RECORDS_NAMESPACE, UPLOADS_ROUTE};
use crate::error::StorageError;
use crate::log::STORAGE;
use crate::model::{Attachment, DEFAULT_MIME_TYPE};
use crate::prometheus::{
    ATTACHMENTS_REMOVED_TOTAL, ATTACHMENTS_STORED_TOTAL, ATTACHMENT_BYTES_STORED_TOTAL,
};
use chrono::Utc;
use metrics::counter;
use std::ffi::OsStr;
use std::io::ErrorKind;
use strict_path::{PathBoundary, StrictPath};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

const MAX_COLLISION_RETRIES: u32 = 100;
const FALLBACK_NAME: &str = "attachment";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Removal {
    Removed,
    /// Already absent, not an error
    Missing,
}

/// Marker for paths inside the records attachment directory
#[derive(Clone, Copy, Debug)]
pub struct RecordFiles;

#[derive(Clone, Debug)]
pub struct AttachmentStore {
    root: PathBoundary<RecordFiles>,
}

impl AttachmentStore {
    ///
    /// Open the records directory, creating it when missing.
    ///
    pub fn new(config: &StorageConfig) -> Result<AttachmentStore, StorageError> {
        let dir = config.records_dir();
        let root = PathBoundary::try_new_create(&dir).map_err(|source| StorageError::Root {
            dir: dir.display().to_string(),
            source,
        })?;

        info!(msg = "Attachment storage ready", dir = %dir.display());
        Ok(AttachmentStore { root })
    }

    ///
    /// Resolve a stored name to its file.
    /// The name must be a single path component directly below the records directory.
    ///
    pub fn path(&self, name: &str) -> Result<StrictPath<RecordFiles>, StorageError> {
        let invalid = || StorageError::InvalidName {
            name: name.to_string(),
        };

        let path = self.root.strict_join(name).map_err(|_| invalid())?;
        if path.strictpath_file_name() != Some(OsStr::new(name)) {
            return Err(invalid());
        }

        Ok(path)
    }

    ///
    /// Persist an uploaded file and return its descriptor.
    ///
    pub async fn write(
        &self,
        original_name: &str,
        mimetype: Option<&str>,
        bytes: &[u8],
    ) -> Result<Attachment, StorageError> {
        let millis = Utc::now().timestamp_millis();
        let sanitised = sanitise(original_name);

        let mut attempt = 0;
        let (path, name, mut file) = loop {
            let name = if attempt == 0 {
                format!("{millis}-{sanitised}")
            } else {
                format!("{millis}-{attempt}-{sanitised}")
            };

            let path = self.path(&name)?;

            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path.interop_path())
                .await
            {
                Ok(file) => break (path, name, file),
                Err(err)
                    if err.kind() == ErrorKind::AlreadyExists && attempt < MAX_COLLISION_RETRIES =>
                {
                    attempt += 1;
                }
                Err(source) => return Err(StorageError::Write { name, source }),
            }
        };

        let written = async {
            file.write_all(bytes).await?;
            file.flush().await
        }
        .await;

        if let Err(source) = written {
            let _ = fs::remove_file(path.interop_path()).await;
            return Err(StorageError::Write { name, source });
        }

        counter!(ATTACHMENTS_STORED_TOTAL).increment(1);
        counter!(ATTACHMENT_BYTES_STORED_TOTAL).increment(bytes.len() as u64);
        debug!(target: STORAGE, msg = "Stored attachment", name, bytes = bytes.len());

        let mimetype = match mimetype {
            Some(mimetype) if !mimetype.trim().is_empty() => mimetype.to_string(),
            _ => DEFAULT_MIME_TYPE.to_string(),
        };

        Ok(Attachment {
            url: url_for(&name),
            name,
            mimetype,
        })
    }

    ///
    /// Remove a stored file.
    /// A file that is already gone is reported as `Missing`.
    ///
    pub async fn remove(&self, name: &str) -> Result<Removal, StorageError> {
        let path = self.path(name)?;

        match fs::remove_file(path.interop_path()).await {
            Ok(()) => {
                counter!(ATTACHMENTS_REMOVED_TOTAL).increment(1);
                debug!(target: STORAGE, msg = "Removed attachment", name);
                Ok(Removal::Removed)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(target: STORAGE, msg = "Attachment already absent", name);
                Ok(Removal::Missing)
            }
            Err(source) => Err(StorageError::Remove {
                name: name.to_string(),
                source,
            }),
        }
    }
}

pub fn url_for(name: &str) -> String {
    format!("{UPLOADS_ROUTE}/{RECORDS_NAMESPACE}/{name}")
}

fn sanitise(original_name: &str) -> String {
    // Browsers may send a full client path
    let base = original_name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();

    let sanitised: String = base
        .chars()
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '_',
        })
        .collect();

    let sanitised = sanitised.replace("..", "_");

    if sanitised.trim_matches(|c| c == '.' || c == '_').is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        sanitised
    }
}
