use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use time::OffsetDateTime;
use url::Url;

use crate::config::AppConfig;

/// Public object storage for listing photos.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store the image and return the URL it is publicly served from.
    async fn upload(&self, file_name: &str, content_type: &str, body: Bytes) -> Result<String>;
}

#[derive(Clone)]
pub struct ObjectStorage {
    client: Client,
    bucket: String,
    public_base: Url,
}

impl ObjectStorage {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let region_provider = RegionProviderChain::first_try(Region::new(config.s3_region.clone()));
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let mut s3_builder = aws_sdk_s3::config::Builder::from(&shared_config)
            .region(shared_config.region().cloned())
            .endpoint_url(config.s3_endpoint.clone())
            .force_path_style(true);
        if let Some(provider) = shared_config.credentials_provider() {
            s3_builder = s3_builder.credentials_provider(provider);
        }
        let s3_config = s3_builder.build();

        let client = Client::from_conf(s3_config);

        let public_endpoint = config
            .s3_public_endpoint
            .as_deref()
            .unwrap_or(&config.s3_endpoint);
        let public_base = Url::parse(public_endpoint)
            .map_err(|err| anyhow!("invalid storage endpoint {}: {}", public_endpoint, err))?;

        Ok(Self {
            client,
            bucket: config.s3_bucket.clone(),
            public_base,
        })
    }
}

#[async_trait]
impl ImageStore for ObjectStorage {
    async fn upload(&self, file_name: &str, content_type: &str, body: Bytes) -> Result<String> {
        let key = object_key(file_name, OffsetDateTime::now_utc());

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await?;

        public_url(&self.public_base, &self.bucket, &key)
    }
}

/// `public/{unix millis}-{sanitised name}`
pub fn object_key(file_name: &str, now: OffsetDateTime) -> String {
    let millis = now.unix_timestamp_nanos() / 1_000_000;
    let name: String = file_name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let name = if name.trim_matches('_').is_empty() {
        "image".to_string()
    } else {
        name
    };
    format!("public/{}-{}", millis, name)
}

pub fn public_url(base: &Url, bucket: &str, key: &str) -> Result<String> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow!("storage endpoint cannot be a base URL"))?
        .pop_if_empty()
        .push(bucket)
        .extend(key.split('/'));
    Ok(url.to_string())
}
