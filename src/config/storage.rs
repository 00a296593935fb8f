//! Blob storage configuration.
//!
//! Points the scrubber at the content-addressed object store that holds
//! document blobs, laid out as `{project}/{internal_id}/{doc_hash}/{hash}/...`.
//!
//! # Example Configuration
//!
//! ```toml
//! [storage.blobs]
//! backend = "s3"
//!
//! [storage.blobs.s3]
//! bucket = "documents"
//! region = "us-east-1"
//! # Credentials via env vars AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY
//! # or IAM role
//!
//! [storage.blobs.filesystem]
//! path = "/var/lib/documents"
//! ```

use serde::{Deserialize, Serialize};

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Document blob storage.
    #[serde(default)]
    pub blobs: BlobStorageConfig,
}

/// Backend selection plus per-backend settings for document blobs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct BlobStorageConfig {
    /// Storage backend to use.
    #[serde(default)]
    pub backend: BlobStorageBackend,

    /// S3 configuration (required when backend = "s3").
    #[serde(default)]
    pub s3: Option<S3StorageConfig>,

    /// Filesystem configuration (required when backend = "filesystem").
    #[serde(default)]
    pub filesystem: Option<FilesystemStorageConfig>,
}

impl BlobStorageConfig {
    /// Validate the storage configuration.
    pub fn validate(&self) -> Result<(), String> {
        match self.backend {
            BlobStorageBackend::S3 => match &self.s3 {
                Some(s3) => s3.validate(),
                None => Err(
                    "S3 storage backend requires [storage.blobs.s3] configuration".to_string(),
                ),
            },
            BlobStorageBackend::Filesystem => match &self.filesystem {
                Some(fs) => fs.validate(),
                None => Err(
                    "Filesystem storage backend requires [storage.blobs.filesystem] configuration"
                        .to_string(),
                ),
            },
        }
    }
}

/// Storage backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlobStorageBackend {
    /// Blobs on the local filesystem. Good for single-node deployments.
    #[default]
    Filesystem,

    /// Blobs in S3-compatible object storage.
    /// Supports AWS S3, MinIO, R2, DigitalOcean Spaces, etc.
    S3,
}

/// S3-compatible object storage configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct S3StorageConfig {
    /// S3 bucket name.
    pub bucket: String,

    /// AWS region (e.g., "us-east-1").
    /// For non-AWS S3-compatible services, use their region name.
    #[serde(default)]
    pub region: Option<String>,

    /// Custom endpoint URL for S3-compatible services.
    /// Examples:
    /// - MinIO: "http://localhost:9000"
    /// - R2: "https://<account-id>.r2.cloudflarestorage.com"
    #[serde(default)]
    pub endpoint: Option<String>,

    /// AWS access key ID.
    /// If not specified, uses environment variables or IAM role.
    #[serde(default)]
    pub access_key_id: Option<String>,

    /// AWS secret access key.
    /// If not specified, uses environment variables or IAM role.
    #[serde(default)]
    pub secret_access_key: Option<String>,

    /// Use path-style URLs instead of virtual-hosted style.
    /// Required for MinIO and some S3-compatible services.
    #[serde(default)]
    pub force_path_style: bool,

    /// Key prefix in front of every blob path, for buckets shared with other data.
    /// Example: "docs/" maps blob `1/i1/ab12/h1/content` to key `docs/1/i1/ab12/h1/content`.
    #[serde(default)]
    pub key_prefix: Option<String>,
}

impl std::fmt::Debug for S3StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3StorageConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field(
                "access_key_id",
                &self.access_key_id.as_ref().map(|_| "****"),
            )
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "****"),
            )
            .field("force_path_style", &self.force_path_style)
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

impl S3StorageConfig {
    /// Validate S3 configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.bucket.is_empty() {
            return Err("S3 bucket name cannot be empty".to_string());
        }
        // Region is required unless using a custom endpoint
        if self.region.is_none() && self.endpoint.is_none() {
            return Err("S3 requires either 'region' or 'endpoint' to be specified".to_string());
        }
        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            return Err(
                "S3 'access_key_id' and 'secret_access_key' must be set together".to_string(),
            );
        }
        Ok(())
    }

    /// Map a logical blob path to its object key.
    pub fn object_key(&self, path: &str) -> String {
        match self.normalized_prefix() {
            Some(prefix) => format!("{}/{}", prefix, path),
            None => path.to_string(),
        }
    }

    /// Map an object key back to its logical blob path.
    ///
    /// Returns `None` for keys outside the configured prefix.
    pub fn blob_path<'a>(&self, key: &'a str) -> Option<&'a str> {
        match self.normalized_prefix() {
            Some(prefix) => key.strip_prefix(prefix)?.strip_prefix('/'),
            None => Some(key),
        }
    }

    fn normalized_prefix(&self) -> Option<&str> {
        self.key_prefix
            .as_deref()
            .map(|p| p.trim_end_matches('/'))
            .filter(|p| !p.is_empty())
    }
}

/// Local filesystem storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilesystemStorageConfig {
    /// Root directory. Blob `a/b/c` lives at `{path}/a/b/c`.
    pub path: String,
}

impl FilesystemStorageConfig {
    /// Validate filesystem configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.path.is_empty() {
            return Err("Filesystem storage path cannot be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s3(prefix: Option<&str>) -> S3StorageConfig {
        S3StorageConfig {
            bucket: "documents".to_string(),
            region: Some("us-east-1".to_string()),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
            key_prefix: prefix.map(String::from),
        }
    }

    #[test]
    fn test_object_key_without_prefix() {
        let config = s3(None);
        assert_eq!(config.object_key("1/i1/abc/h1/x"), "1/i1/abc/h1/x");
        assert_eq!(config.blob_path("1/i1/abc/h1/x"), Some("1/i1/abc/h1/x"));
    }

    #[test]
    fn test_object_key_with_prefix() {
        let config = s3(Some("docs/"));
        assert_eq!(config.object_key("1/i1/abc/h1/x"), "docs/1/i1/abc/h1/x");
        assert_eq!(config.blob_path("docs/1/i1/abc/h1/x"), Some("1/i1/abc/h1/x"));
        assert_eq!(config.blob_path("other/1/i1"), None);
    }

    #[test]
    fn test_empty_prefix_is_ignored() {
        let config = s3(Some("/"));
        assert_eq!(config.object_key("a/b"), "a/b");
    }

    #[test]
    fn test_s3_requires_region_or_endpoint() {
        let mut config = s3(None);
        config.region = None;
        assert!(config.validate().is_err());

        config.endpoint = Some("http://localhost:9000".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_s3_credentials_must_be_paired() {
        let mut config = s3(None);
        config.access_key_id = Some("AKIA".to_string());
        assert!(config.validate().is_err());

        config.secret_access_key = Some("secret".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let mut config = s3(None);
        config.access_key_id = Some("AKIAEXAMPLE".to_string());
        config.secret_access_key = Some("topsecret".to_string());

        let debug = format!("{:?}", config);
        assert!(!debug.contains("AKIAEXAMPLE"));
        assert!(!debug.contains("topsecret"));
        assert!(debug.contains("****"));
    }

    #[test]
    fn test_backend_requires_its_section() {
        let config = BlobStorageConfig {
            backend: BlobStorageBackend::S3,
            s3: None,
            filesystem: None,
        };
        assert!(config.validate().unwrap_err().contains("[storage.blobs.s3]"));

        let config = BlobStorageConfig::default();
        assert!(
            config
                .validate()
                .unwrap_err()
                .contains("[storage.blobs.filesystem]")
        );
    }
}
