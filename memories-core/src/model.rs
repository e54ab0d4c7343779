use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A file picked by a guest, not yet uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlob {
    pub name: String,
    pub bytes: Bytes,
}

impl FileBlob {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Full storage key of an uploaded object, namespace included.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Builds `<namespace><file name><uuid>`. The suffix is what makes the key
    /// unique; identical files uploaded twice get two different keys.
    pub fn generate(namespace: &str, file_name: &str) -> Self {
        Self(format!("{namespace}{file_name}{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ObjectKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for ObjectKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pairs a selected file with the key it will be stored under.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file: FileBlob,
    pub generated_key: ObjectKey,
}

impl UploadRequest {
    pub fn new(file: FileBlob, namespace: &str) -> Self {
        let generated_key = ObjectKey::generate(namespace, &file.name);
        Self {
            file,
            generated_key,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadProgress {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

impl UploadProgress {
    pub fn new(bytes_transferred: u64, total_bytes: u64) -> Self {
        Self {
            bytes_transferred: bytes_transferred.min(total_bytes),
            total_bytes,
        }
    }

    /// Whole-number percentage in `[0, 100]`. Nothing to transfer reads as 0.
    pub fn percentage(&self) -> u8 {
        if self.total_bytes == 0 {
            return 0;
        }
        let pct = self.bytes_transferred.saturating_mul(100) / self.total_bytes;
        pct.min(100) as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub key: ObjectKey,
    pub created_at: DateTime<Utc>,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredImage {
    pub key: ObjectKey,
    pub created_at: DateTime<Utc>,
    pub download_url: String,
}

/// What a finished upload hands back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedImage {
    pub key: ObjectKey,
    pub download_url: Option<String>,
}

/// The most recent images, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryView {
    images: Vec<StoredImage>,
}

impl GalleryView {
    /// Sorts newest first and keeps at most `capacity` images. The sort is
    /// stable, so equal timestamps keep their listing order.
    pub fn from_images(mut images: Vec<StoredImage>, capacity: usize) -> Self {
        images.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        images.truncate(capacity);
        Self { images }
    }

    pub fn images(&self) -> &[StoredImage] {
        &self.images
    }

    pub fn urls(&self) -> Vec<&str> {
        self.images.iter().map(|i| i.download_url.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn contains_key(&self, key: &ObjectKey) -> bool {
        self.images.iter().any(|i| &i.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn image(key: &str, minute: u32) -> StoredImage {
        StoredImage {
            key: key.into(),
            created_at: Utc.with_ymd_and_hms(2024, 6, 15, 10, minute, 0).unwrap(),
            download_url: format!("https://cdn.test/{key}"),
        }
    }

    #[test]
    fn generated_keys_keep_name_and_differ() {
        let a = ObjectKey::generate("images/", "dance.jpg");
        let b = ObjectKey::generate("images/", "dance.jpg");

        assert!(a.as_str().starts_with("images/dance.jpg"));
        assert_eq!(a.as_str().len(), "images/dance.jpg".len() + 36);
        assert_ne!(a, b);
    }

    #[test]
    fn percentage_is_clamped() {
        assert_eq!(UploadProgress::new(0, 1000).percentage(), 0);
        assert_eq!(UploadProgress::new(333, 1000).percentage(), 33);
        assert_eq!(UploadProgress::new(1000, 1000).percentage(), 100);
        assert_eq!(UploadProgress::new(5000, 1000).percentage(), 100);
        assert_eq!(UploadProgress::new(0, 0).percentage(), 0);
    }

    #[test]
    fn view_sorts_newest_first_and_truncates() {
        let view = GalleryView::from_images(
            vec![image("a", 1), image("b", 9), image("c", 5)],
            2,
        );

        let keys: Vec<_> = view.images().iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "c"]);
    }

    #[test]
    fn equal_timestamps_keep_listing_order() {
        let view = GalleryView::from_images(vec![image("x", 3), image("y", 3)], 5);

        assert_eq!(view.urls(), vec!["https://cdn.test/x", "https://cdn.test/y"]);
    }
}
