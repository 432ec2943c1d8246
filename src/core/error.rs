/// Error taxonomy for the backup pipeline
///
/// Every variant is terminal for a run. Collaborator diagnostics (stderr of
/// docker, ls, tar, or the object store's message) are carried in the error
/// so the operator sees them in the final message.

use std::path::PathBuf;
use thiserror::Error;

/// Failures while discovering which paths back the container's volumes
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("container {0} not found")]
    ContainerNotFound(String),

    #[error("error inspecting container {container_id}: {stderr}")]
    InspectionFailed { container_id: String, stderr: String },

    #[error("could not parse inspection output for {container_id}: {message}")]
    InvalidDescriptor { container_id: String, message: String },

    #[error("mount table {path} is unreadable: {reason}")]
    MountTableUnreadable { path: PathBuf, reason: String },

    #[error("no volumes found to back up")]
    NoVolumes,
}

#[derive(Debug, Error)]
pub enum BackupError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("cannot list {}: {cause}", path.display())]
    InaccessiblePath { path: PathBuf, cause: String },

    #[error("all volume directories are empty, nothing to back up")]
    NothingToBackup,

    #[error("archive {} was not created{}", path.display(), format_diagnostics(diagnostics))]
    ArchiveNotCreated { path: PathBuf, diagnostics: String },

    #[error(
        "archive {} is empty or too small ({size} bytes, minimum {minimum}){}",
        path.display(),
        format_diagnostics(diagnostics)
    )]
    ArchiveTooSmall {
        path: PathBuf,
        size: u64,
        minimum: u64,
        diagnostics: String,
    },

    #[error("upload of {key} failed")]
    UploadFailed {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("upload of {key} could not be verified: {reason}")]
    UploadVerificationFailed { key: String, reason: String },

    #[error("failed to run {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by an object storage transport
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{operation} request failed: {message}")]
    Request {
        operation: &'static str,
        message: String,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn request(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Request {
            operation,
            message: message.into(),
        }
    }
}

fn format_diagnostics(diagnostics: &str) -> String {
    let trimmed = diagnostics.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\n{}", trimmed)
    }
}
