//! Upload sink that wraps a multipart upload and derives coarse progress
//! checkpoints from bytes written (§4.4 step 3).
//!
//! The source is a lazy, finite cursor with no known total row count up
//! front, so exact percentage-of-work isn't available. The engine instead
//! estimates total output size once, from the first batch's average
//! encoded-bytes-per-record times an approximate row count, and reports
//! progress as bytes written cross 25/50/75% of that estimate. 100% is
//! always reported once, at successful completion, regardless of how the
//! estimate tracked reality.
use anyhow::Result;

use crate::s3::{MultipartUpload, S3Client};

const MILESTONES: [u32; 3] = [25, 50, 75];

pub struct ExportSink {
    upload: MultipartUpload,
    estimated_total_bytes: u64,
    next_milestone: usize,
}

impl ExportSink {
    pub async fn start(s3: &S3Client, key: &str, content_type: &str) -> Result<Self> {
        let upload = s3.start_multipart(key, content_type).await?;
        Ok(Self {
            upload,
            estimated_total_bytes: 0,
            next_milestone: 0,
        })
    }

    /// Provide (or revise) the estimated total output size once enough of the
    /// first batch has been seen to extrapolate from. A zero estimate disables
    /// percentage milestones; only the final 100% will ever be reported.
    pub fn set_estimate(&mut self, estimated_total_bytes: u64) {
        self.estimated_total_bytes = estimated_total_bytes;
    }

    /// Write a chunk of encoded bytes. Returns the next progress percentage
    /// crossed, if any, for the caller to publish.
    pub async fn write(&mut self, data: &[u8]) -> Result<Option<u32>> {
        self.upload.write(data).await?;
        Ok(self.next_crossed_milestone())
    }

    fn next_crossed_milestone(&mut self) -> Option<u32> {
        if self.estimated_total_bytes == 0 || self.next_milestone >= MILESTONES.len() {
            return None;
        }
        let written = self.upload.bytes_written();
        let threshold_pct = MILESTONES[self.next_milestone];
        let threshold_bytes = self.estimated_total_bytes * u64::from(threshold_pct) / 100;
        if written >= threshold_bytes {
            self.next_milestone += 1;
            Some(threshold_pct)
        } else {
            None
        }
    }

    /// Complete the upload, reporting 100%.
    pub async fn finish(self) -> Result<u64> {
        let bytes = self.upload.bytes_written();
        self.upload.finish().await?;
        Ok(bytes)
    }

    /// Abort the upload on encoder/source failure or cancellation so the
    /// object is never left referenced by a completed job row.
    pub async fn abort(self) -> Result<()> {
        self.upload.abort().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // `next_crossed_milestone` is exercised indirectly via the engine tests,
    // since constructing a real `MultipartUpload` requires a live S3 client.
}
