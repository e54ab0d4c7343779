use std::sync::Arc;

use tokio::sync::watch;

use crate::config::StoreConfig;
use crate::error::UploadError;
use crate::gallery::{GalleryLoader, GalleryStatus};
use crate::model::{FileBlob, GalleryView, UploadProgress, UploadedImage};
use crate::store::ObjectStore;
use crate::upload::UploadCoordinator;

/// The widget: one gallery loader plus the upload coordinator that
/// refreshes it.
#[derive(Clone)]
pub struct Memories {
    store: Arc<dyn ObjectStore>,
    gallery: Arc<GalleryLoader>,
    uploads: Arc<UploadCoordinator>,
}

impl Memories {
    pub fn new(store: Arc<dyn ObjectStore>, config: &StoreConfig) -> Self {
        let gallery = Arc::new(GalleryLoader::new(
            store.clone(),
            config.namespace.clone(),
            config.gallery_size,
        ));
        let uploads = Arc::new(UploadCoordinator::new(
            store.clone(),
            gallery.clone(),
            config.namespace.clone(),
        ));

        Self {
            store,
            gallery,
            uploads,
        }
    }

    /// First load. A failure is logged and reported through the status.
    pub async fn mount(&self) -> GalleryStatus {
        let _ = self.gallery.refresh().await;
        self.gallery.status()
    }

    pub async fn submit(&self, file: Option<FileBlob>) -> Result<Option<UploadedImage>, UploadError> {
        self.uploads.submit(file).await
    }

    pub fn gallery(&self) -> GalleryView {
        self.gallery.view()
    }

    /// Yields every newly published view; the current one is marked seen.
    pub fn subscribe_gallery(&self) -> watch::Receiver<GalleryView> {
        self.gallery.subscribe()
    }

    pub fn progress(&self) -> UploadProgress {
        self.uploads.progress()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<UploadProgress> {
        self.uploads.subscribe_progress()
    }

    pub fn loader(&self) -> &GalleryLoader {
        &self.gallery
    }

    pub fn uploads(&self) -> &UploadCoordinator {
        &self.uploads
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }
}
