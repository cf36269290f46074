//! Artifact storage for trust-policy backups.

use std::io::Write;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;

use crate::error::{ArtifactError, Result};

/// Durable storage for quarantine artifacts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Compresses `document` and stores it under `key`, returning the
    /// full location reference for record-keeping.
    async fn put_compressed_json(&self, key: &str, document: &serde_json::Value)
        -> Result<String>;
}

/// S3-backed [`ArtifactStore`].
#[derive(Debug)]
pub struct S3ArtifactStore {
    client: Client,
    bucket: String,
}

impl S3ArtifactStore {
    /// Creates a store writing into `bucket`.
    #[must_use]
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn put_compressed_json(
        &self,
        key: &str,
        document: &serde_json::Value,
    ) -> Result<String> {
        let body = gzip_json(document)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type("application/json")
            .content_encoding("gzip")
            .send()
            .await
            .map_err(|e| ArtifactError::Put {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        let location = format!("s3://{}/{key}", self.bucket);
        debug!(%location, "Stored artifact");
        Ok(location)
    }
}

/// Serializes a JSON document and gzips the bytes.
fn gzip_json(document: &serde_json::Value) -> Result<Vec<u8>> {
    let raw = serde_json::to_vec(document).map_err(|e| ArtifactError::Encode {
        message: e.to_string(),
    })?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw).map_err(|e| ArtifactError::Encode {
        message: e.to_string(),
    })?;
    encoder.finish().map_err(|e| {
        ArtifactError::Encode {
            message: e.to_string(),
        }
        .into()
    })
}
