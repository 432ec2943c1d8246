/// Chunked archive upload
///
/// Streams an archive to object storage one fixed-size part at a time,
/// aborting the remote stream on any failure and checking the object exists
/// once the stream is finalized.

use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::core::archive::ArchiveArtifact;
use crate::core::error::{BackupError, StoreError};
use crate::utils::{object_key, MAX_IN_FLIGHT_PARTS, MAX_PART_RETRIES, PART_SIZE_BYTES};

/// Transfer parameters for one upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadSession {
    pub part_size_bytes: usize,
    pub max_retries: u32,
    pub max_in_flight_parts: usize,
}

impl Default for UploadSession {
    fn default() -> Self {
        Self {
            part_size_bytes: PART_SIZE_BYTES,
            max_retries: MAX_PART_RETRIES,
            max_in_flight_parts: MAX_IN_FLIGHT_PARTS,
        }
    }
}

/// Object storage able to accept multi-part writes
#[allow(async_fn_in_trait)]
pub trait ObjectStore {
    type Stream: PartStream;

    /// Start a part-oriented write for `key`
    async fn open_stream(&self, key: &str, session: &UploadSession) -> Result<Self::Stream, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;
}

/// An open multi-part write
#[allow(async_fn_in_trait)]
pub trait PartStream {
    /// Submit the next part; returns once the transport acknowledged it
    async fn submit_part(&mut self, part: Vec<u8>) -> Result<(), StoreError>;

    /// Commit every submitted part as one object
    async fn finalize(&mut self) -> Result<(), StoreError>;

    /// Discard every submitted part
    async fn abort(&mut self) -> Result<(), StoreError>;
}

pub struct Uploader<S: ObjectStore> {
    store: S,
    session: UploadSession,
    prefix: Option<String>,
    show_progress: bool,
}

impl<S: ObjectStore> Uploader<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            session: UploadSession::default(),
            prefix: None,
            show_progress: false,
        }
    }

    pub fn with_session(mut self, session: UploadSession) -> Self {
        self.session = session;
        self
    }

    pub fn with_prefix(mut self, prefix: Option<String>) -> Self {
        self.prefix = prefix;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Object key the artifact is stored under
    pub fn key_for(&self, artifact: &ArchiveArtifact) -> String {
        object_key(self.prefix.as_deref(), &artifact.name)
    }

    /// Upload `artifact` and confirm it is retrievable; returns the object key
    pub async fn upload(&self, artifact: &ArchiveArtifact) -> Result<String, BackupError> {
        let key = self.key_for(artifact);
        let failed = |source: StoreError| BackupError::UploadFailed {
            key: key.clone(),
            source,
        };

        let mut file = File::open(&artifact.path).await.map_err(|e| failed(e.into()))?;
        let mut stream = self.store.open_stream(&key, &self.session).await.map_err(failed)?;
        tracing::debug!(
            "uploading {} ({} bytes) to {} in {} byte parts",
            artifact.path.display(),
            artifact.byte_size,
            key,
            self.session.part_size_bytes
        );

        let progress = self.progress_bar(artifact.byte_size);
        let result = self
            .send_parts(&mut stream, &mut file, artifact.byte_size, &progress)
            .await;

        if let Err(source) = result {
            progress.abandon();
            if let Err(abort_err) = stream.abort().await {
                tracing::warn!("failed to abort upload of {}: {}", key, abort_err);
            }
            return Err(failed(source));
        }
        progress.finish_and_clear();

        match self.store.exists(&key).await {
            Ok(true) => Ok(key),
            Ok(false) => Err(BackupError::UploadVerificationFailed {
                key: key.clone(),
                reason: "object not found after upload completed".to_string(),
            }),
            Err(e) => Err(BackupError::UploadVerificationFailed {
                key: key.clone(),
                reason: e.to_string(),
            }),
        }
    }

    async fn send_parts(
        &self,
        stream: &mut S::Stream,
        file: &mut File,
        byte_size: u64,
        progress: &ProgressBar,
    ) -> Result<(), StoreError> {
        let part_size = self.session.part_size_bytes.max(1) as u64;
        let mut offset = 0u64;

        while offset < byte_size {
            let len = part_size.min(byte_size - offset) as usize;
            let mut part = vec![0u8; len];
            file.read_exact(&mut part).await?;

            stream.submit_part(part).await?;
            offset += len as u64;
            progress.inc(len as u64);
        }

        stream.finalize().await
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let style = ProgressStyle::with_template(
            "{spinner} [{elapsed_precise}] [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec})",
        )
        .map(|s| s.progress_chars("=> "))
        .unwrap_or_else(|_| ProgressStyle::default_bar());

        ProgressBar::new(total).with_style(style)
    }
}

/// Run `attempt` until it succeeds or `max_retries` extra attempts are spent
///
/// The delay before retry `n` is `backoff * n`.
pub async fn retry_with_budget<T, F, Fut>(
    operation: &str,
    max_retries: u32,
    backoff: Duration,
    mut attempt: F,
) -> Result<T, StoreError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut retries = 0;
    loop {
        match attempt(retries).await {
            Ok(value) => return Ok(value),
            Err(e) if retries < max_retries => {
                retries += 1;
                tracing::warn!("{} failed (retry {}/{}): {}", operation, retries, max_retries, e);
                if !backoff.is_zero() {
                    tokio::time::sleep(backoff * retries).await;
                }
            }
            Err(e) => return Err(e),
        }
    }
}
