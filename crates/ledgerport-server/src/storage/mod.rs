//! S3-backed [`BlobGateway`]
//!
//! Containers map to buckets. Upload credentials are presigned `PutObject`
//! URLs, so the holder can create or overwrite exactly one key until the
//! URL expires.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    presigning::PresigningConfig,
    primitives::ByteStream,
    types::MetadataDirective,
    Client,
};
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::imports::{BlobError, BlobGateway, BlobMetadata, CredentialPermissions, WriteCredential};

pub mod config;

#[derive(Clone)]
pub struct Storage {
    client: Client,
}

impl Storage {
    pub fn new(config: config::StorageConfig) -> Self {
        debug!(endpoint = ?config.endpoint, region = %config.region, "Initializing storage");

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "ledgerport-storage",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!(region = %config.region, "Storage client initialized");

        Self { client }
    }

    /// Create `container` unless it already exists
    #[instrument(skip(self))]
    pub async fn ensure_container(&self, container: &str) -> anyhow::Result<()> {
        match self.client.head_bucket().bucket(container).send().await {
            Ok(_) => Ok(()),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => {
                self.client
                    .create_bucket()
                    .bucket(container)
                    .send()
                    .await
                    .with_context(|| format!("Failed to create bucket '{}'", container))?;
                info!(container, "Created import container");
                Ok(())
            }
            Err(err) => Err(anyhow!("Failed to check bucket '{}': {}", container, err)),
        }
    }

    async fn head(
        &self,
        container: &str,
        key: &str,
    ) -> Result<Option<aws_sdk_s3::operation::head_object::HeadObjectOutput>, BlobError> {
        match self.client.head_object().bucket(container).key(key).send().await {
            Ok(output) => Ok(Some(output)),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(None),
            Err(err) => Err(BlobError::Transport(anyhow!(
                "Failed to read s3://{}/{}: {}",
                container,
                key,
                err
            ))),
        }
    }
}

#[async_trait]
impl BlobGateway for Storage {
    #[instrument(skip(self))]
    async fn object_exists(&self, container: &str, key: &str) -> Result<bool, BlobError> {
        Ok(self.head(container, key).await?.is_some())
    }

    #[instrument(skip(self))]
    async fn object_size(&self, container: &str, key: &str) -> Result<i64, BlobError> {
        let output = self
            .head(container, key)
            .await?
            .ok_or_else(|| BlobError::not_found(container, key))?;

        Ok(output.content_length().unwrap_or(0))
    }

    #[instrument(skip(self, metadata))]
    async fn create_empty_object(
        &self,
        container: &str,
        key: &str,
        content_type: &str,
        metadata: &BlobMetadata,
    ) -> Result<String, BlobError> {
        self.client
            .put_object()
            .bucket(container)
            .key(key)
            .body(ByteStream::from(Vec::<u8>::new()))
            .content_type(content_type)
            .set_metadata(Some(to_header_metadata(metadata)))
            .send()
            .await
            .with_context(|| format!("Failed to create placeholder s3://{}/{}", container, key))?;

        debug!("Created placeholder s3://{}/{}", container, key);
        Ok(key.to_string())
    }

    #[instrument(skip(self))]
    async fn get_metadata(&self, container: &str, key: &str) -> Result<BlobMetadata, BlobError> {
        let output = self
            .head(container, key)
            .await?
            .ok_or_else(|| BlobError::not_found(container, key))?;

        Ok(output
            .metadata()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    /// S3 metadata is immutable, so the object is copied onto itself with
    /// the new metadata. The content type is carried over explicitly.
    #[instrument(skip(self, metadata))]
    async fn set_metadata(
        &self,
        container: &str,
        key: &str,
        metadata: &BlobMetadata,
    ) -> Result<(), BlobError> {
        let current = self
            .head(container, key)
            .await?
            .ok_or_else(|| BlobError::not_found(container, key))?;

        self.client
            .copy_object()
            .bucket(container)
            .key(key)
            .copy_source(format!("{}/{}", container, key))
            .metadata_directive(MetadataDirective::Replace)
            .set_content_type(current.content_type().map(str::to_string))
            .set_metadata(Some(to_header_metadata(metadata)))
            .send()
            .await
            .with_context(|| format!("Failed to update metadata of s3://{}/{}", container, key))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn issue_write_credential(
        &self,
        container: &str,
        key: &str,
        ttl: Duration,
        permissions: CredentialPermissions,
    ) -> Result<WriteCredential, BlobError> {
        if !permissions.allows_write() {
            return Err(BlobError::Transport(anyhow!(
                "Upload credentials must grant write or create permission"
            )));
        }

        let presigning_config =
            PresigningConfig::expires_in(ttl).context("Failed to create presigning config")?;
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).context("Credential lifetime is out of range")?;

        let presigned_request = self
            .client
            .put_object()
            .bucket(container)
            .key(key)
            .presigned(presigning_config)
            .await
            .context("Failed to generate presigned upload URL")?;

        debug!(container, key, %expires_at, "Issued upload credential");

        Ok(WriteCredential {
            url: presigned_request.uri().to_string(),
            expires_at,
        })
    }
}

/// Object key for an uploaded statement:
/// `statements/{account_id}/{object_id}{.ext}`
pub fn build_import_key(account_id: Uuid, object_id: Uuid, extension: Option<&str>) -> String {
    let extension: String = extension
        .unwrap_or_default()
        .trim_start_matches('.')
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();

    if extension.is_empty() {
        format!("statements/{}/{}", account_id, object_id)
    } else {
        format!("statements/{}/{}.{}", account_id, object_id, extension)
    }
}

/// S3 metadata travels as HTTP headers, which only carry printable ASCII
fn to_header_metadata(metadata: &BlobMetadata) -> HashMap<String, String> {
    metadata
        .iter()
        .map(|(key, value)| {
            let value = value
                .chars()
                .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
                .collect();
            (key.to_ascii_lowercase(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_import_key() {
        let account = Uuid::nil();
        let object = Uuid::from_u128(1);
        assert_eq!(
            build_import_key(account, object, Some(".CSV")),
            format!("statements/{}/{}.csv", account, object)
        );
        assert_eq!(
            build_import_key(account, object, None),
            format!("statements/{}/{}", account, object)
        );
        assert_eq!(
            build_import_key(account, object, Some(".c sv/../")),
            format!("statements/{}/{}.csv", account, object)
        );
    }

    #[test]
    fn test_header_metadata_is_ascii_only() {
        let mut metadata = BlobMetadata::new();
        metadata.insert("Original-File-Name".to_string(), "relevé mars.csv".to_string());

        let headers = to_header_metadata(&metadata);
        assert_eq!(headers.get("original-file-name").map(String::as_str), Some("relev_ mars.csv"));
    }
}
