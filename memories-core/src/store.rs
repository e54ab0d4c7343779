use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::model::{ObjectKey, ObjectMetadata};

/// Receives `(bytes_transferred, total_bytes)` while an upload runs.
pub type ProgressFn<'a> = &'a (dyn Fn(u64, u64) + Send + Sync);

/// Keys found under a prefix. Only the first page is ever requested;
/// `truncated` says whether the store had more.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub keys: Vec<ObjectKey>,
    pub truncated: bool,
}

/// The object storage operations the widget needs. Listing does not carry
/// timestamps or URLs, so both are fetched per object.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        key: &ObjectKey,
        data: Bytes,
        content_type: &str,
        progress: ProgressFn<'_>,
    ) -> Result<()>;

    async fn list(&self, prefix: &str) -> Result<Listing>;

    async fn metadata(&self, key: &ObjectKey) -> Result<ObjectMetadata>;

    async fn download_url(&self, key: &ObjectKey) -> Result<String>;

    async fn get_object(&self, key: &ObjectKey) -> Result<Bytes>;
}

/// Everything but RFC 3986 unreserved characters.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encodes a key for use in a URL path, keeping its '/' separators.
/// File names are free-form, so `#`, `?`, spaces and the like must not leak
/// into the URL unescaped.
pub fn encode_key_path(key: &str) -> String {
    key.split('/')
        .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn guess_content_type(key: &str) -> &'static str {
    let lower = key.to_ascii_lowercase();
    // Keys end in a uuid, so look for the extension anywhere after the last '/'.
    let name = lower.rsplit('/').next().unwrap_or(&lower);

    if name.contains(".jpg") || name.contains(".jpeg") {
        "image/jpeg"
    } else if name.contains(".png") {
        "image/png"
    } else if name.contains(".gif") {
        "image/gif"
    } else if name.contains(".webp") {
        "image/webp"
    } else if name.contains(".heic") {
        "image/heic"
    } else {
        "application/octet-stream"
    }
}
