use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::{
    presigning::PresigningConfig,
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
    Client,
};
use bytes::Bytes;

use crate::config::{StoreConfig, MIN_PART_SIZE};
use crate::model::{ObjectKey, ObjectMetadata};
use crate::store::{encode_key_path, Listing, ObjectStore, ProgressFn};

#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    url_expiry: Duration,
    public_base_url: Option<String>,
    part_size: usize,
}

impl S3Store {
    pub async fn new(config: &StoreConfig) -> Result<Self> {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

        // If AWS_ENDPOINT_URL is set, use it (for MinIO/LocalStack/etc)
        if let Ok(endpoint_url) = std::env::var("AWS_ENDPOINT_URL") {
            config_loader = config_loader.endpoint_url(&endpoint_url);
        }

        let sdk_config = config_loader.load().await;
        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);

        // For S3-compatible services, force path-style addressing
        if std::env::var("AWS_ENDPOINT_URL").is_ok() {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = Client::from_conf(s3_config_builder.build());

        Ok(Self::from_client(client, config))
    }

    pub fn from_client(client: Client, config: &StoreConfig) -> Self {
        Self {
            client,
            bucket: config.bucket.clone(),
            url_expiry: config.url_expiry,
            public_base_url: config.public_base_url.clone(),
            part_size: config.part_size.max(MIN_PART_SIZE),
        }
    }

    async fn put_single(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .context("Failed to upload to S3")?;
        Ok(())
    }

    /// Multipart upload, one part per `part_size` chunk. Progress is reported
    /// after each acknowledged part.
    async fn put_multipart(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        progress: ProgressFn<'_>,
    ) -> Result<()> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .context("Failed to start multipart upload")?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| anyhow::anyhow!("No upload ID"))?
            .to_string();

        match self.upload_parts(key, &upload_id, &data, progress).await {
            Ok(parts) => {
                let completed = CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build();

                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(completed)
                    .send()
                    .await
                    .context("Failed to complete multipart upload")?;
                Ok(())
            }
            Err(e) => {
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    tracing::warn!("S3 multipart abort failed: key={}, error={:?}", key, abort_err);
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        data: &Bytes,
        progress: ProgressFn<'_>,
    ) -> Result<Vec<CompletedPart>> {
        let total = data.len() as u64;
        let mut parts = Vec::new();
        let mut offset = 0;
        let mut part_number = 1;

        while offset < data.len() {
            let end = (offset + self.part_size).min(data.len());
            let body = ByteStream::from(data.slice(offset..end));

            let uploaded = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(body)
                .send()
                .await
                .with_context(|| format!("Failed to upload part {part_number}"))?;

            parts.push(
                CompletedPart::builder()
                    .e_tag(uploaded.e_tag().unwrap_or_default())
                    .part_number(part_number)
                    .build(),
            );

            tracing::debug!("S3 part uploaded: key={}, part={}, bytes={}", key, part_number, end);
            progress(end as u64, total);

            offset = end;
            part_number += 1;
        }

        Ok(parts)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put_object(
        &self,
        key: &ObjectKey,
        data: Bytes,
        content_type: &str,
        progress: ProgressFn<'_>,
    ) -> Result<()> {
        let total = data.len() as u64;
        tracing::debug!("S3 PUT: bucket={}, key={}, size={} bytes", self.bucket, key, total);

        progress(0, total);
        if data.len() > self.part_size {
            self.put_multipart(key.as_str(), data, content_type, progress).await?;
        } else {
            self.put_single(key.as_str(), data, content_type).await?;
            progress(total, total);
        }

        tracing::debug!("S3 PUT success: key={}", key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Listing> {
        tracing::debug!("S3 LIST: bucket={}, prefix={}", self.bucket, prefix);

        let objects = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .send()
            .await
            .context("Failed to list objects")?;

        let keys = objects
            .contents
            .unwrap_or_default()
            .into_iter()
            .filter_map(|object| object.key)
            // Folder placeholders created by consoles are not images.
            .filter(|key| !key.ends_with('/'))
            .map(ObjectKey::from)
            .collect::<Vec<_>>();

        tracing::debug!("S3 LIST success: prefix={}, count={}", prefix, keys.len());
        Ok(Listing {
            keys,
            truncated: objects.is_truncated.unwrap_or(false),
        })
    }

    async fn metadata(&self, key: &ObjectKey) -> Result<ObjectMetadata> {
        tracing::debug!("S3 HEAD: bucket={}, key={}", self.bucket, key);

        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
            .context("Failed to read object metadata")?;

        let last_modified = head
            .last_modified
            .ok_or_else(|| anyhow::anyhow!("Object {key} has no last-modified time"))?;
        let created_at =
            chrono::DateTime::from_timestamp(last_modified.secs(), last_modified.subsec_nanos())
                .ok_or_else(|| anyhow::anyhow!("Object {key} has an out-of-range timestamp"))?;

        Ok(ObjectMetadata {
            key: key.clone(),
            created_at,
            size: head.content_length.unwrap_or(0).max(0) as u64,
        })
    }

    async fn download_url(&self, key: &ObjectKey) -> Result<String> {
        if let Some(base) = &self.public_base_url {
            return Ok(format!("{base}/{}", encode_key_path(key.as_str())));
        }

        let presigning = PresigningConfig::expires_in(self.url_expiry)
            .context("Invalid presigned URL expiry")?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .presigned(presigning)
            .await
            .context("Failed to presign download URL")?;

        Ok(request.uri().to_string())
    }

    async fn get_object(&self, key: &ObjectKey) -> Result<Bytes> {
        tracing::debug!("S3 GET: bucket={}, key={}", self.bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .send()
            .await
            .context("Failed to download from S3")?;

        let data = response
            .body
            .collect()
            .await
            .context("Failed to read S3 object body")?;

        let bytes = data.into_bytes();
        tracing::debug!("S3 GET success: key={}, size={} bytes", key, bytes.len());
        Ok(bytes)
    }
}
