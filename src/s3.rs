//! S3-compatible object storage client.
//!
//! Supports any S3-compatible backend: AWS S3, MinIO, Backblaze B2, Cloudflare R2.
//! Unlike a simple whole-buffer `put_object`, the export engine's bounded-memory
//! invariant (§4.4) requires a true multipart upload: bytes are handed to
//! [`MultipartUpload`] as they are produced and flushed to the backend a part
//! at a time, never buffering a whole export file in memory.

use aws_config::Region;
use aws_sdk_s3::{
    config::{Credentials, IdentityCache, SharedCredentialsProvider, StalledStreamProtectionConfig},
    presigning::PresigningConfig,
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
    Client,
};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;

/// S3-related errors.
#[derive(Debug, Error)]
pub enum S3Error {
    #[error("failed to start multipart upload: {0}")]
    StartMultipart(String),
    #[error("failed to upload part: {0}")]
    UploadPart(String),
    #[error("failed to complete multipart upload: {0}")]
    CompleteMultipart(String),
    #[error("failed to abort multipart upload: {0}")]
    AbortMultipart(String),
    #[error("failed to generate presigned URL: {0}")]
    Presign(String),
    #[error("failed to delete object: {0}")]
    Delete(String),
    #[error("failed to list objects: {0}")]
    List(String),
    #[error("s3 configuration error: {0}")]
    Config(String),
}

/// S3 client wrapper with configuration.
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    bucket: String,
    presign_expiry: Duration,
    presign_expiry_long: Duration,
    part_size: usize,
}

impl S3Client {
    /// Create a new S3 client from configuration.
    ///
    /// Supports custom endpoints for S3-compatible backends (MinIO, R2, B2),
    /// using path-style addressing when a custom endpoint is configured.
    pub async fn new(config: &Config) -> Result<Self, S3Error> {
        let region =
            Region::new(std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()));

        let mut builder = aws_sdk_s3::Config::builder()
            .region(region)
            .stalled_stream_protection(StalledStreamProtectionConfig::disabled())
            .identity_cache(IdentityCache::no_cache());

        if let (Ok(access_key), Ok(secret_key)) = (
            std::env::var("AWS_ACCESS_KEY_ID"),
            std::env::var("AWS_SECRET_ACCESS_KEY"),
        ) {
            let credentials = Credentials::new(access_key, secret_key, None, None, "environment");
            builder = builder.credentials_provider(SharedCredentialsProvider::new(credentials));
        }

        if let Some(endpoint) = &config.s3_endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let client = Client::from_conf(builder.build());

        info!(
            bucket = %config.s3_bucket,
            endpoint = ?config.s3_endpoint,
            "S3 client initialized"
        );

        Ok(Self {
            client,
            bucket: config.s3_bucket.clone(),
            presign_expiry: Duration::from_secs(config.s3_presign_expiry_secs),
            presign_expiry_long: Duration::from_secs(config.s3_presign_expiry_long_secs),
            part_size: config.s3_multipart_part_size,
        })
    }

    /// Begin a multipart upload under `key`.
    pub async fn start_multipart(&self, key: &str, content_type: &str) -> Result<MultipartUpload, S3Error> {
        let resp = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| S3Error::StartMultipart(e.to_string()))?;

        let upload_id = resp
            .upload_id()
            .ok_or_else(|| S3Error::StartMultipart("missing upload id".into()))?
            .to_string();

        Ok(MultipartUpload {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key: key.to_string(),
            upload_id,
            part_size: self.part_size,
            buffer: Vec::with_capacity(self.part_size),
            parts: Vec::new(),
            next_part_number: 1,
            bytes_written: 0,
        })
    }

    /// Whole-buffer upload, used for small artifacts (e.g. the GDPR account export
    /// archive) where the bounded-memory invariant does not apply.
    pub async fn put_object(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<(), S3Error> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| S3Error::UploadPart(e.to_string()))?;
        Ok(())
    }

    /// Short-lived (download endpoint) presigned GET URL — 1h by default.
    pub async fn presign_get(&self, key: &str) -> Result<String, S3Error> {
        self.presign_get_with_expiry(key, self.presign_expiry).await
    }

    /// Long-lived (completion email, GDPR export) presigned GET URL — 24h by default.
    pub async fn presign_get_long(&self, key: &str) -> Result<String, S3Error> {
        self.presign_get_with_expiry(key, self.presign_expiry_long).await
    }

    async fn presign_get_with_expiry(&self, key: &str, expiry: Duration) -> Result<String, S3Error> {
        let presign_config = PresigningConfig::builder()
            .expires_in(expiry)
            .build()
            .map_err(|e| S3Error::Presign(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| S3Error::Presign(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }

    pub async fn delete(&self, key: &str) -> Result<(), S3Error> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| S3Error::Delete(e.to_string()))?;
        Ok(())
    }

    /// Delete every object under `prefix`, best-effort (used by tenant erasure).
    /// Returns the number of objects deleted and any per-object errors encountered.
    pub async fn delete_prefix(&self, prefix: &str) -> (u64, Vec<String>) {
        let mut deleted = 0u64;
        let mut errors = Vec::new();

        let listing = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .send()
            .await;

        let keys: Vec<String> = match listing {
            Ok(resp) => resp
                .contents()
                .iter()
                .filter_map(|o| o.key().map(str::to_string))
                .collect(),
            Err(e) => {
                errors.push(e.to_string());
                return (deleted, errors);
            }
        };

        for key in keys {
            match self.delete(&key).await {
                Ok(()) => deleted += 1,
                Err(e) => errors.push(format!("{key}: {e}")),
            }
        }

        (deleted, errors)
    }

    /// Health-probe helper (§4.10): list a single object to prove reachability
    /// and credentials, without requiring any particular object to exist.
    pub async fn list_one(&self) -> Result<(), S3Error> {
        self.client
            .list_objects_v2()
            .bucket(&self.bucket)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| S3Error::List(e.to_string()))?;
        Ok(())
    }

    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

/// An in-progress multipart upload. Bytes are appended via [`Self::write`] and
/// flushed to S3 in `part_size`-sized chunks; [`Self::finish`] completes the
/// upload, [`Self::abort`] discards it.
pub struct MultipartUpload {
    client: Client,
    bucket: String,
    key: String,
    upload_id: String,
    part_size: usize,
    buffer: Vec<u8>,
    parts: Vec<CompletedPart>,
    next_part_number: i32,
    bytes_written: u64,
}

impl MultipartUpload {
    /// Append bytes, flushing full parts to the backend as they fill.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), S3Error> {
        self.buffer.extend_from_slice(data);
        while self.buffer.len() >= self.part_size {
            let part = self.buffer.split_off(self.part_size);
            let full_part = std::mem::replace(&mut self.buffer, part);
            self.upload_part(full_part).await?;
        }
        Ok(())
    }

    /// Total bytes accepted by [`Self::write`] so far, sampled by the export
    /// engine to drive coarse progress reporting.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flush any buffered remainder and complete the multipart upload.
    pub async fn finish(mut self) -> Result<(), S3Error> {
        if !self.buffer.is_empty() {
            let remainder = std::mem::take(&mut self.buffer);
            self.upload_part(remainder).await?;
        }

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(std::mem::take(&mut self.parts)))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| S3Error::CompleteMultipart(e.to_string()))?;

        Ok(())
    }

    /// Abort the upload, discarding any parts already stored. Called on
    /// cancellation (shutdown, timeout) or encoder/source failure so a
    /// partial object is never left referenced by a Job row.
    pub async fn abort(self) -> Result<(), S3Error> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .send()
            .await
            .map_err(|e| S3Error::AbortMultipart(e.to_string()))?;
        Ok(())
    }

    async fn upload_part(&mut self, data: Vec<u8>) -> Result<(), S3Error> {
        if data.is_empty() {
            return Ok(());
        }
        let part_number = self.next_part_number;
        let len = data.len() as u64;

        let resp = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| S3Error::UploadPart(e.to_string()))?;

        let e_tag = resp.e_tag().unwrap_or_default().to_string();
        self.parts.push(
            CompletedPart::builder()
                .part_number(part_number)
                .e_tag(e_tag)
                .build(),
        );
        self.next_part_number += 1;
        self.bytes_written += len;

        Ok(())
    }
}

impl Drop for MultipartUpload {
    fn drop(&mut self) {
        if !self.parts.is_empty() || !self.buffer.is_empty() {
            warn!(
                bucket = %self.bucket,
                key = %self.key,
                upload_id = %self.upload_id,
                "multipart upload dropped without finish()/abort(); relying on bucket's \
                 abort-incomplete-multipart lifecycle rule"
            );
        }
    }
}
