use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

pub const DEFAULT_NAMESPACE: &str = "images/";
pub const GALLERY_SIZE: usize = 5;
pub const DEFAULT_URL_EXPIRY: Duration = Duration::from_secs(60 * 60);

/// S3 refuses multipart parts smaller than this (except the last one).
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub bucket: String,
    /// Prefix every upload is written under and every listing reads from.
    pub namespace: String,
    pub gallery_size: usize,
    pub url_expiry: Duration,
    /// When set, download URLs are `<base>/<key>` instead of presigned.
    pub public_base_url: Option<String>,
    pub part_size: usize,
}

impl StoreConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            gallery_size: GALLERY_SIZE,
            url_expiry: DEFAULT_URL_EXPIRY,
            public_base_url: None,
            part_size: MIN_PART_SIZE,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = normalize_namespace(namespace.into());
        self
    }

    pub fn with_public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    /// Smaller galleries are allowed; larger ones are capped at [`GALLERY_SIZE`].
    pub fn with_gallery_size(mut self, size: usize) -> Self {
        self.gallery_size = size.min(GALLERY_SIZE);
        self
    }

    pub fn with_url_expiry(mut self, expiry: Duration) -> Self {
        self.url_expiry = expiry;
        self
    }

    /// Reads `MEMORIES_BUCKET` (required), `MEMORIES_NAMESPACE`,
    /// `MEMORIES_PUBLIC_URL` and `MEMORIES_URL_EXPIRY_SECS`.
    pub fn from_env() -> Result<Self> {
        let bucket = env::var("MEMORIES_BUCKET")
            .context("MEMORIES_BUCKET environment variable must be set")?;
        let mut config = Self::new(bucket);

        if let Ok(namespace) = env::var("MEMORIES_NAMESPACE") {
            config = config.with_namespace(namespace);
        }
        if let Ok(url) = env::var("MEMORIES_PUBLIC_URL") {
            config = config.with_public_base_url(url);
        }
        if let Ok(secs) = env::var("MEMORIES_URL_EXPIRY_SECS") {
            let secs: u64 = secs
                .parse()
                .context("MEMORIES_URL_EXPIRY_SECS must be a number of seconds")?;
            config = config.with_url_expiry(Duration::from_secs(secs));
        }

        Ok(config)
    }
}

fn normalize_namespace(namespace: String) -> String {
    if namespace.is_empty() || namespace.ends_with('/') {
        namespace
    } else {
        format!("{namespace}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_widget() {
        let config = StoreConfig::new("wedding");

        assert_eq!(config.namespace, "images/");
        assert_eq!(config.gallery_size, 5);
        assert!(config.public_base_url.is_none());
    }

    #[test]
    fn namespace_gets_trailing_slash() {
        assert_eq!(StoreConfig::new("b").with_namespace("photos").namespace, "photos/");
        assert_eq!(StoreConfig::new("b").with_namespace("photos/").namespace, "photos/");
    }

    #[test]
    fn public_url_loses_trailing_slash() {
        let config = StoreConfig::new("b").with_public_base_url("https://cdn.test/");

        assert_eq!(config.public_base_url.as_deref(), Some("https://cdn.test"));
    }

    #[test]
    fn gallery_size_is_capped_at_five() {
        assert_eq!(StoreConfig::new("b").with_gallery_size(50).gallery_size, GALLERY_SIZE);
        assert_eq!(StoreConfig::new("b").with_gallery_size(3).gallery_size, 3);
    }
}
