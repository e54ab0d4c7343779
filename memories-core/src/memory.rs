use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};

use crate::model::{ObjectKey, ObjectMetadata};
use crate::store::{encode_key_path, Listing, ObjectStore, ProgressFn};

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

struct StoredObject {
    data: Bytes,
    created_at: DateTime<Utc>,
}

/// Process-local object store. Used by the test suites and by the web
/// server's demo mode; failures can be switched on per operation.
pub struct InMemoryStore {
    objects: Mutex<BTreeMap<ObjectKey, StoredObject>>,
    base_url: String,
    chunk_size: usize,
    last_created: Mutex<Option<DateTime<Utc>>>,
    list_calls: AtomicUsize,
    put_calls: AtomicUsize,
    fail_uploads: AtomicBool,
    fail_listing: AtomicBool,
    fail_metadata: AtomicBool,
    fail_urls: AtomicBool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new("memory:/")
    }
}

impl InMemoryStore {
    /// Download URLs are `<base_url>/<key>` with the key percent-encoded.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            last_created: Mutex::new(None),
            list_calls: AtomicUsize::new(0),
            put_calls: AtomicUsize::new(0),
            fail_uploads: AtomicBool::new(false),
            fail_listing: AtomicBool::new(false),
            fail_metadata: AtomicBool::new(false),
            fail_urls: AtomicBool::new(false),
        }
    }

    /// Size of the slices progress is reported in.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Seeds an object with a fixed creation time.
    pub fn insert(&self, key: impl Into<ObjectKey>, data: impl Into<Bytes>, created_at: DateTime<Utc>) {
        let mut last = self.last_created.lock().unwrap_or_else(|e| e.into_inner());
        *last = Some(last.map_or(created_at, |prev| prev.max(created_at)));
        drop(last);

        self.lock_objects().insert(
            key.into(),
            StoredObject {
                data: data.into(),
                created_at,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.lock_objects().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_objects().is_empty()
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.lock_objects().contains_key(key)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    pub fn fail_metadata(&self, fail: bool) {
        self.fail_metadata.store(fail, Ordering::SeqCst);
    }

    pub fn fail_urls(&self, fail: bool) {
        self.fail_urls.store(fail, Ordering::SeqCst);
    }

    fn lock_objects(&self) -> std::sync::MutexGuard<'_, BTreeMap<ObjectKey, StoredObject>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Creation times strictly increase so back-to-back uploads never tie.
    fn next_created_at(&self) -> DateTime<Utc> {
        let mut last = self.last_created.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        let created_at = match *last {
            Some(prev) if prev >= now => prev + Duration::milliseconds(1),
            _ => now,
        };
        *last = Some(created_at);
        created_at
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn put_object(
        &self,
        key: &ObjectKey,
        data: Bytes,
        _content_type: &str,
        progress: ProgressFn<'_>,
    ) -> Result<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        let total = data.len() as u64;
        progress(0, total);

        let mut sent = 0;
        while sent < data.len() {
            if self.fail_uploads.load(Ordering::SeqCst) {
                anyhow::bail!("connection reset after {sent} bytes");
            }
            sent = (sent + self.chunk_size).min(data.len());
            progress(sent as u64, total);
            tokio::task::yield_now().await;
        }
        if self.fail_uploads.load(Ordering::SeqCst) {
            anyhow::bail!("connection reset after {sent} bytes");
        }

        let created_at = self.next_created_at();
        self.lock_objects()
            .insert(key.clone(), StoredObject { data, created_at });
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Listing> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            anyhow::bail!("listing unavailable");
        }

        let keys = self
            .lock_objects()
            .keys()
            .filter(|key| key.as_str().starts_with(prefix))
            .cloned()
            .collect();

        Ok(Listing {
            keys,
            truncated: false,
        })
    }

    async fn metadata(&self, key: &ObjectKey) -> Result<ObjectMetadata> {
        if self.fail_metadata.load(Ordering::SeqCst) {
            anyhow::bail!("metadata unavailable");
        }

        let objects = self.lock_objects();
        let object = objects
            .get(key)
            .ok_or_else(|| anyhow::anyhow!("no such object: {key}"))?;

        Ok(ObjectMetadata {
            key: key.clone(),
            created_at: object.created_at,
            size: object.data.len() as u64,
        })
    }

    async fn download_url(&self, key: &ObjectKey) -> Result<String> {
        if self.fail_urls.load(Ordering::SeqCst) {
            anyhow::bail!("url signing unavailable");
        }
        if !self.contains(key) {
            anyhow::bail!("no such object: {key}");
        }

        Ok(format!("{}/{}", self.base_url, encode_key_path(key.as_str())))
    }

    async fn get_object(&self, key: &ObjectKey) -> Result<Bytes> {
        self.lock_objects()
            .get(key)
            .map(|object| object.data.clone())
            .ok_or_else(|| anyhow::anyhow!("no such object: {key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn no_progress(_: u64, _: u64) {}

    #[tokio::test]
    async fn put_reports_chunked_progress() {
        let store = InMemoryStore::default().with_chunk_size(4);
        let seen = Mutex::new(Vec::new());
        let record = |sent: u64, total: u64| seen.lock().unwrap().push((sent, total));

        store
            .put_object(&"images/a".into(), Bytes::from_static(b"0123456789"), "image/jpeg", &record)
            .await
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(0, 10), (4, 10), (8, 10), (10, 10)]
        );
        assert!(store.contains(&"images/a".into()));
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let store = InMemoryStore::default();
        let at = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
        store.insert("images/a", "x", at);
        store.insert("thumbs/b", "x", at);

        let listing = store.list("images/").await.unwrap();

        assert_eq!(listing.keys, vec![ObjectKey::from("images/a")]);
        assert_eq!(store.list_calls(), 1);
    }

    #[tokio::test]
    async fn uploads_never_share_a_timestamp() {
        let store = InMemoryStore::default();
        for name in ["images/a", "images/b", "images/c"] {
            store
                .put_object(&name.into(), Bytes::from_static(b"x"), "image/png", &no_progress)
                .await
                .unwrap();
        }

        let a = store.metadata(&"images/a".into()).await.unwrap().created_at;
        let b = store.metadata(&"images/b".into()).await.unwrap().created_at;
        let c = store.metadata(&"images/c".into()).await.unwrap().created_at;
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn failed_upload_stores_nothing() {
        let store = InMemoryStore::default();
        store.fail_uploads(true);

        let result = store
            .put_object(&"images/a".into(), Bytes::from_static(b"abc"), "image/png", &no_progress)
            .await;

        assert!(result.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn download_url_uses_base() {
        let store = InMemoryStore::new("/media/");
        store.insert("images/a", "x", Utc::now());

        let url = store.download_url(&"images/a".into()).await.unwrap();

        assert_eq!(url, "/media/images/a");
    }

    #[tokio::test]
    async fn download_url_escapes_key() {
        let store = InMemoryStore::new("/media");
        store.insert("images/table#3.jpg", "x", Utc::now());

        let url = store.download_url(&"images/table#3.jpg".into()).await.unwrap();

        assert_eq!(url, "/media/images/table%233.jpg");
    }
}
