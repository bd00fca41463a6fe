//! Object storage output (S3 or a local directory)

use crate::error::{Error, Result};
use aws_config::meta::region::ProvideRegion;
use aws_config::profile::{ProfileFileCredentialsProvider, ProfileFileRegionProvider};
use aws_credential_types::provider::ProvideCredentials;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::sync::Arc;

/// Build a Hive-style partition file path
///
/// Format: `year={Y}/month={M}/data_0.parquet`, with `NULL` for a missing
/// partition value.
pub fn build_partition_path(year: Option<i64>, month: Option<i64>) -> String {
    let render = |v: Option<i64>| v.map_or_else(|| "NULL".to_string(), |v| v.to_string());
    format!(
        "year={}/month={}/data_0.parquet",
        render(year),
        render(month)
    )
}

// ============================================================================
// AWS profile credentials
// ============================================================================

/// Credentials resolved from a named profile of the AWS shared config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsProfileCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub region: Option<String>,
}

impl AwsProfileCredentials {
    /// Resolve `profile` from `~/.aws/credentials` and `~/.aws/config`
    ///
    /// Uses the SDK's profile provider, so role assumption, SSO and
    /// `credential_process` profiles work as they do for the AWS CLI.
    /// `AWS_SHARED_CREDENTIALS_FILE` and `AWS_CONFIG_FILE` override the paths.
    pub async fn load(profile: &str) -> Result<Self> {
        let provider = ProfileFileCredentialsProvider::builder()
            .profile_name(profile)
            .build();
        let creds = provider.provide_credentials().await.map_err(|e| {
            Error::config(format!("Failed to load AWS profile '{profile}': {e}"))
        })?;

        let region = ProfileFileRegionProvider::builder()
            .profile_name(profile)
            .build()
            .region()
            .await;

        Ok(Self {
            access_key_id: creds.access_key_id().to_string(),
            secret_access_key: creds.secret_access_key().to_string(),
            session_token: creds.session_token().map(str::to_string),
            region: region.map(|r| r.to_string()),
        })
    }
}

// ============================================================================
// Destination
// ============================================================================

/// Object-storage destination parsed from a URL or path
#[derive(Debug, Clone)]
pub struct CloudDestination {
    /// The object store implementation
    store: Arc<dyn ObjectStore>,
    /// Base path prefix within the bucket
    prefix: String,
    /// Original URL scheme for logging
    scheme: String,
}

impl CloudDestination {
    /// Parse a destination URL and create the object store
    ///
    /// Supported formats:
    /// - `s3://bucket/path/` - AWS S3; credentials from `profile` when given,
    ///   otherwise from the standard `AWS_*` environment
    /// - `/local/path/`, `./path/` or `file:///path` - local filesystem
    pub async fn parse(url: &str, profile: Option<&str>) -> Result<Self> {
        if url.starts_with("s3://") {
            Self::parse_s3(url, profile).await
        } else {
            Self::parse_local(url)
        }
    }

    async fn parse_s3(url: &str, profile: Option<&str>) -> Result<Self> {
        let without_scheme = url
            .strip_prefix("s3://")
            .ok_or_else(|| Error::config(format!("Invalid s3 URL: {url}")))?;

        let (bucket, prefix) = match without_scheme.find('/') {
            Some(idx) => (
                &without_scheme[..idx],
                without_scheme[idx + 1..].trim_end_matches('/').to_string(),
            ),
            None => (without_scheme, String::new()),
        };

        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);

        if let Some(profile) = profile {
            tracing::info!("Loading AWS credentials for profile {}", profile);
            let creds = AwsProfileCredentials::load(profile).await?;
            builder = builder
                .with_access_key_id(creds.access_key_id)
                .with_secret_access_key(creds.secret_access_key);
            if let Some(token) = creds.session_token {
                builder = builder.with_token(token);
            }
            if let Some(region) = creds.region {
                builder = builder.with_region(region);
            }
        }

        let store = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to create s3 client: {e}")))?;

        Ok(Self {
            store: Arc::new(store),
            prefix,
            scheme: "s3".to_string(),
        })
    }

    fn parse_local(path: &str) -> Result<Self> {
        let path = path.strip_prefix("file://").unwrap_or(path);

        std::fs::create_dir_all(path)
            .map_err(|e| Error::config(format!("Failed to create directory {path}: {e}")))?;

        let store = LocalFileSystem::new_with_prefix(path)
            .map_err(|e| Error::config(format!("Failed to create local store: {e}")))?;

        Ok(Self {
            store: Arc::new(store),
            prefix: String::new(),
            scheme: "file".to_string(),
        })
    }

    /// Check if this is a cloud destination (not local)
    pub fn is_cloud(&self) -> bool {
        self.scheme != "file"
    }

    /// Get the scheme (s3, file)
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Write bytes to a file in the destination, replacing any existing object
    pub async fn write(&self, filename: &str, data: Bytes) -> Result<String> {
        let path = if self.prefix.is_empty() {
            ObjectPath::from(filename)
        } else {
            ObjectPath::from(format!("{}/{filename}", self.prefix))
        };

        self.store.put(&path, data.into()).await?;

        Ok(format!("{}://{path}", self.scheme))
    }
}
