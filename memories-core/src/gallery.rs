use std::sync::Arc;

use futures::future::try_join_all;
use serde::Serialize;
use tokio::sync::{watch, Mutex};

use crate::config::GALLERY_SIZE;
use crate::error::StoreError;
use crate::model::{GalleryView, ObjectKey, StoredImage};
use crate::store::ObjectStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GalleryStatus {
    /// No refresh has finished yet.
    Loading,
    Ready,
    /// The last refresh failed; the published view is from before it.
    Failed { reason: String },
}

/// Lists the namespace and publishes the newest images.
pub struct GalleryLoader {
    store: Arc<dyn ObjectStore>,
    namespace: String,
    capacity: usize,
    view: watch::Sender<GalleryView>,
    status: watch::Sender<GalleryStatus>,
    refreshing: Mutex<()>,
}

impl GalleryLoader {
    /// `capacity` above [`GALLERY_SIZE`] is capped.
    pub fn new(store: Arc<dyn ObjectStore>, namespace: impl Into<String>, capacity: usize) -> Self {
        let (view, _) = watch::channel(GalleryView::default());
        let (status, _) = watch::channel(GalleryStatus::Loading);

        Self {
            store,
            namespace: namespace.into(),
            capacity: capacity.min(GALLERY_SIZE),
            view,
            status,
            refreshing: Mutex::new(()),
        }
    }

    /// Most images a view will ever hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn view(&self) -> GalleryView {
        self.view.borrow().clone()
    }

    pub fn status(&self) -> GalleryStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GalleryView> {
        self.view.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<GalleryStatus> {
        self.status.subscribe()
    }

    /// Rebuilds the view from storage and publishes it in one step.
    ///
    /// Metadata and URL lookups for every listed object run concurrently and
    /// the first failure aborts the whole refresh. On failure the previous
    /// view stays published and the status turns `Failed`.
    pub async fn refresh(&self) -> Result<GalleryView, StoreError> {
        let _guard = self.refreshing.lock().await;

        match self.load().await {
            Ok(view) => {
                tracing::info!("Gallery refreshed: {} images", view.len());
                self.view.send_replace(view.clone());
                self.status.send_replace(GalleryStatus::Ready);
                Ok(view)
            }
            Err(e) => {
                tracing::error!("Gallery refresh failed: {:?}", e);
                self.status.send_replace(GalleryStatus::Failed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn load(&self) -> Result<GalleryView, StoreError> {
        let listing = self
            .store
            .list(&self.namespace)
            .await
            .map_err(|source| StoreError::Listing {
                prefix: self.namespace.clone(),
                source,
            })?;

        if listing.truncated {
            tracing::warn!(
                "Listing of {} was truncated, only the first {} objects are considered",
                self.namespace,
                listing.keys.len()
            );
        }

        let images = try_join_all(listing.keys.iter().map(|key| self.resolve(key))).await?;

        Ok(GalleryView::from_images(images, self.capacity))
    }

    async fn resolve(&self, key: &ObjectKey) -> Result<StoredImage, StoreError> {
        let metadata = async {
            self.store
                .metadata(key)
                .await
                .map_err(|source| StoreError::Metadata {
                    key: key.to_string(),
                    source,
                })
        };
        let url = async {
            self.store
                .download_url(key)
                .await
                .map_err(|source| StoreError::UrlResolution {
                    key: key.to_string(),
                    source,
                })
        };

        let (metadata, download_url) = tokio::try_join!(metadata, url)?;

        Ok(StoredImage {
            key: key.clone(),
            created_at: metadata.created_at,
            download_url,
        })
    }
}
