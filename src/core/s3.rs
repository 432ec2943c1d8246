/// S3-compatible object storage transport
///
/// Multipart uploads through aws-sdk-s3 with static credentials and a custom
/// endpoint (MinIO, R2, Backblaze, ...). Path-style addressing is forced so
/// endpoints without wildcard DNS work.

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use std::time::Duration;

use crate::core::config::StorageConfig;
use crate::core::error::StoreError;
use crate::core::upload::{retry_with_budget, ObjectStore, PartStream, UploadSession};
use crate::utils::RETRY_BACKOFF_MS;

#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub fn new(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "volume-backup",
        );

        let s3_config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .endpoint_url(config.endpoint.clone())
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

impl ObjectStore for S3Store {
    type Stream = S3PartStream;

    async fn open_stream(&self, key: &str, session: &UploadSession) -> Result<S3PartStream, StoreError> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/gzip")
            .send()
            .await
            .map_err(|e| StoreError::request("CreateMultipartUpload", DisplayErrorContext(&e).to_string()))?;

        let upload_id = output
            .upload_id()
            .ok_or_else(|| StoreError::request("CreateMultipartUpload", "response has no upload id"))?
            .to_string();

        tracing::debug!(
            "opened multipart upload {} for s3://{}/{} (retries per part: {}, max in flight: {})",
            upload_id,
            self.bucket,
            key,
            session.max_retries,
            session.max_in_flight_parts
        );

        Ok(S3PartStream {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key: key.to_string(),
            upload_id,
            session: *session,
            completed: Vec::new(),
        })
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let not_found = e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false);
                if not_found {
                    Ok(false)
                } else {
                    Err(StoreError::request("HeadObject", DisplayErrorContext(&e).to_string()))
                }
            }
        }
    }
}

/// An in-progress S3 multipart upload
pub struct S3PartStream {
    client: Client,
    bucket: String,
    key: String,
    upload_id: String,
    session: UploadSession,
    completed: Vec<CompletedPart>,
}

impl PartStream for S3PartStream {
    async fn submit_part(&mut self, part: Vec<u8>) -> Result<(), StoreError> {
        // S3 part numbers start at 1
        let part_number = (self.completed.len() + 1) as i32;
        let backoff = Duration::from_millis(RETRY_BACKOFF_MS);
        let operation = format!("UploadPart #{}", part_number);

        let e_tag = retry_with_budget(&operation, self.session.max_retries, backoff, |_| {
            let request = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(&self.key)
                .upload_id(&self.upload_id)
                .part_number(part_number)
                .body(ByteStream::from(part.clone()));

            async move {
                let output = request
                    .send()
                    .await
                    .map_err(|e| StoreError::request("UploadPart", DisplayErrorContext(&e).to_string()))?;
                output
                    .e_tag()
                    .map(str::to_string)
                    .ok_or_else(|| StoreError::request("UploadPart", "response has no ETag"))
            }
        })
        .await?;

        tracing::debug!("part {} of {} acknowledged ({} bytes)", part_number, self.key, part.len());
        self.completed.push(
            CompletedPart::builder()
                .e_tag(e_tag)
                .part_number(part_number)
                .build(),
        );
        Ok(())
    }

    async fn finalize(&mut self) -> Result<(), StoreError> {
        let upload = CompletedMultipartUpload::builder()
            .set_parts(Some(self.completed.clone()))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .multipart_upload(upload)
            .send()
            .await
            .map_err(|e| StoreError::request("CompleteMultipartUpload", DisplayErrorContext(&e).to_string()))?;

        tracing::debug!("completed {} with {} parts", self.key, self.completed.len());
        Ok(())
    }

    async fn abort(&mut self) -> Result<(), StoreError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .send()
            .await
            .map_err(|e| StoreError::request("AbortMultipartUpload", DisplayErrorContext(&e).to_string()))?;

        tracing::debug!("aborted multipart upload {} for {}", self.upload_id, self.key);
        Ok(())
    }
}
