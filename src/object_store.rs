use std::time::Duration;

use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use chrono::Utc;
use uuid::Uuid;

/// S3-compatible object store adapter. Retry count and connect/read
/// timeouts mirror the values the original ingestion service used.
#[derive(Clone)]
pub struct ObjectStore {
    client: S3Client,
    bucket: String,
}

impl ObjectStore {
    pub async fn new(
        endpoint_url: Option<&str>,
        region: &str,
        bucket: &str,
        access_key_id: Option<&str>,
        secret_access_key: Option<&str>,
    ) -> Self {
        let retry_config = aws_config::retry::RetryConfig::standard().with_max_attempts(3);
        let timeout_config = aws_config::timeout::TimeoutConfig::builder()
            .connect_timeout(Duration::from_secs(5))
            .operation_timeout(Duration::from_secs(30))
            .build();

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .retry_config(retry_config)
            .timeout_config(timeout_config);

        if let (Some(key), Some(secret)) = (access_key_id, secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(key, secret, None, None, "traceroot-static"));
        }

        let sdk_config = loader.load().await;
        let mut s3_builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = endpoint_url {
            s3_builder = s3_builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: S3Client::from_conf(s3_builder.build()),
            bucket: bucket.to_string(),
        }
    }

    /// Creates the bucket if it doesn't already exist. Idempotent:
    /// `BucketAlreadyOwnedByYou`/`BucketAlreadyExists` are swallowed.
    pub async fn ensure_container(&self) -> anyhow::Result<()> {
        if self.client.head_bucket().bucket(&self.bucket).send().await.is_ok() {
            return Ok(());
        }
        match self.client.create_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("BucketAlreadyOwnedByYou") || msg.contains("BucketAlreadyExists") {
                    Ok(())
                } else {
                    Err(e.into())
                }
            }
        }
    }

    pub async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await?;
        Ok(())
    }

    pub async fn put_json(&self, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
        let body = serde_json::to_vec(value)?;
        self.put(key, body, "application/json").await
    }

    pub async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        let output = self.client.get_object().bucket(&self.bucket).key(key).send().await?;
        let bytes = output.body.collect().await?;
        Ok(bytes.into_bytes().to_vec())
    }

    pub async fn get_json(&self, key: &str) -> anyhow::Result<serde_json::Value> {
        let bytes = self.get(key).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Builds the time-partitioned key an ingested OTLP batch is stored under:
/// `events/otel/{projectId}/{yyyy}/{mm}/{dd}/{hh}/{uuid}.json`.
pub fn build_ingest_key(project_id: &str) -> String {
    let now = Utc::now();
    format!(
        "events/otel/{}/{:04}/{:02}/{:02}/{:02}/{}.json",
        project_id,
        now.format("%Y"),
        now.format("%m"),
        now.format("%d"),
        now.format("%H"),
        Uuid::new_v4()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_key_is_time_partitioned_under_the_project() {
        let key = build_ingest_key("proj-123");
        assert!(key.starts_with("events/otel/proj-123/"));
        assert!(key.ends_with(".json"));
    }
}
