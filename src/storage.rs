use async_trait::async_trait;
use log::{error, info, warn};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageStoreError {
    #[error("image storage not configured")]
    Disabled,
    #[error("upload failed: {0}")]
    Upload(String),
}

/// Object-storage seam used by post create/update when images are attached.
/// Returns the public URL of the stored object.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn upload(&self, bytes: &[u8], filename: &str) -> Result<String, ImageStoreError>;
}

// ---------------- S3 / MinIO implementation ----------------

pub struct S3ImageStore {
    bucket: String,
    client: aws_sdk_s3::Client,
    public_base: String,
    prefix: String,
}

impl S3ImageStore {
    pub async fn new() -> anyhow::Result<Self> {
        use aws_credential_types::provider::SharedCredentialsProvider;
        use aws_credential_types::Credentials;

        let bucket = std::env::var("S3_BUCKET").unwrap_or_else(|_| "agora-images".into());
        let endpoint = std::env::var("S3_ENDPOINT")
            .map_err(|_| anyhow::anyhow!("S3_ENDPOINT must be set (MinIO / S3 endpoint)"))?;
        let region = std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into());
        let access = std::env::var("S3_ACCESS_KEY").unwrap_or_default();
        let secret = std::env::var("S3_SECRET_KEY").unwrap_or_default();
        // Base for the URLs handed back to clients; defaults to path-style
        // addressing against the configured endpoint.
        let public_base = std::env::var("S3_PUBLIC_URL")
            .unwrap_or_else(|_| format!("{}/{}", endpoint.trim_end_matches('/'), bucket));

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region));
        loader = loader.endpoint_url(endpoint);
        if !access.is_empty() && !secret.is_empty() {
            let creds = Credentials::new(access, secret, None, None, "static");
            loader = loader.credentials_provider(SharedCredentialsProvider::new(creds));
        }
        let conf = loader.load().await;
        // Path-style addressing is required for most MinIO/local endpoints.
        let s3_conf = aws_sdk_s3::config::Builder::from(&conf)
            .force_path_style(true)
            .build();
        let client = aws_sdk_s3::Client::from_conf(s3_conf);
        info!("Initialized S3/MinIO client (path-style addressing enabled)");

        // Ensure the bucket exists; create it on first boot. MinIO containers
        // can lag behind the app briefly, hence the retry.
        if let Err(e) = client.head_bucket().bucket(&bucket).send().await {
            warn!("head_bucket failed for '{bucket}' (will attempt create): {e:?}");
            let mut attempt = 0u32;
            let max_attempts = 8;
            loop {
                attempt += 1;
                match client.create_bucket().bucket(&bucket).send().await {
                    Ok(_) => {
                        info!("created bucket '{bucket}' (attempt {attempt})");
                        break;
                    }
                    Err(e2) => {
                        if attempt >= max_attempts {
                            error!("create_bucket failed for '{bucket}' after {attempt} attempts: {e2:?}");
                            return Err(anyhow::anyhow!("failed to ensure bucket '{bucket}': {e2}"));
                        }
                        let backoff_ms = 200 * attempt.pow(2);
                        warn!("create_bucket attempt {attempt} failed for '{bucket}': {e2:?} (retrying in {backoff_ms}ms)");
                        tokio::time::sleep(std::time::Duration::from_millis(backoff_ms as u64))
                            .await;
                    }
                }
            }
        }

        Ok(Self {
            bucket,
            client,
            public_base,
            prefix: "posts".into(),
        })
    }

    fn key_for(&self, filename: &str) -> String {
        // uuid prefix keeps repeated filenames from colliding
        let safe: String = filename
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        format!("{}/{}_{}", self.prefix, uuid::Uuid::new_v4(), safe)
    }
}

#[async_trait]
impl ImageStore for S3ImageStore {
    async fn upload(&self, bytes: &[u8], filename: &str) -> Result<String, ImageStoreError> {
        use aws_sdk_s3::primitives::ByteStream;
        let key = self.key_for(filename);
        let put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type(
                infer::get(bytes)
                    .map(|t| t.mime_type().to_string())
                    .unwrap_or_else(|| "application/octet-stream".into()),
            );
        if let Err(e) = put.send().await {
            error!(
                "put_object failed key={key} bucket={} err={:?}",
                self.bucket, e
            );
            return Err(ImageStoreError::Upload(e.to_string()));
        }
        Ok(format!("{}/{}", self.public_base, key))
    }
}

/// Stand-in used when no S3 endpoint is configured; every upload fails with
/// a generic error so text-only posting keeps working.
pub struct DisabledImageStore;

#[async_trait]
impl ImageStore for DisabledImageStore {
    async fn upload(&self, _bytes: &[u8], _filename: &str) -> Result<String, ImageStoreError> {
        Err(ImageStoreError::Disabled)
    }
}

/// Factory used by main: S3 when S3_ENDPOINT is present, disabled otherwise.
pub async fn build_image_store() -> Arc<dyn ImageStore> {
    if std::env::var("S3_ENDPOINT").is_ok() {
        match S3ImageStore::new().await {
            Ok(store) => Arc::new(store),
            Err(e) => panic!("Failed to initialize S3 image store: {e}"),
        }
    } else {
        warn!("S3_ENDPOINT not set; image uploads are disabled");
        Arc::new(DisabledImageStore)
    }
}
