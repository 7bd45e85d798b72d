use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, Utc};

use crate::crd::S3Storage;
use crate::error::{Error, Result};

/// One stored archive as the retention enforcer sees it.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

/// The contract this engine requires of durable storage. Retry policy lives
/// behind the implementation, not here.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<StoredObject>>;
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// S3-compatible bucket client.
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Store {
    /// Build the client from a storage location. `credentials` is the
    /// (accessKey, secretKey) pair resolved from the referenced secret;
    /// absent, the ambient provider chain applies.
    pub async fn new(
        storage: &S3Storage,
        credentials: Option<(String, String)>,
        retries: u32,
    ) -> Result<Self> {
        let region = storage
            .region
            .clone()
            .unwrap_or_else(|| "us-east-1".to_string());

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region))
            .retry_config(RetryConfig::standard().with_max_attempts(retries));

        if let Some(endpoint) = &storage.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        if let Some((access_key, secret_key)) = credentials {
            loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
                access_key, secret_key, None, None, "kback",
            ));
        }

        let shared = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if storage.force_path_style {
            builder = builder.force_path_style(true);
        }

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: storage.bucket.clone(),
        })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<StoredObject>> {
        let mut out = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut req = self.client.list_objects_v2().bucket(&self.bucket);
            if let Some(p) = prefix {
                req = req.prefix(p);
            }
            if let Some(t) = &token {
                req = req.continuation_token(t);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| Error::Store(format!("list failed: {e}")))?;

            for object in resp.contents() {
                let Some(key) = object.key() else { continue };
                let last_modified = object
                    .last_modified()
                    .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
                    .unwrap_or(DateTime::UNIX_EPOCH);
                out.push(StoredObject {
                    key: key.to_string(),
                    last_modified,
                });
            }

            if resp.is_truncated() == Some(true) {
                token = resp.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }

        Ok(out)
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| Error::Store(format!("put {key} failed: {e}")))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::Store(format!("get {key} failed: {e}")))?;
        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| Error::Store(format!("reading {key} failed: {e}")))?;
        Ok(data.into_bytes().to_vec())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::Store(format!("delete {key} failed: {e}")))?;
        Ok(())
    }
}
