use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::error::{StoreError, UploadError};
use crate::gallery::GalleryLoader;
use crate::model::{FileBlob, ObjectKey, UploadProgress, UploadRequest, UploadedImage};
use crate::store::{guess_content_type, ObjectStore};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UploadState {
    Idle,
    FileSelected { name: String, size: u64 },
    Uploading { key: ObjectKey, progress: UploadProgress },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    Started { key: ObjectKey, total_bytes: u64 },
    Progress { key: ObjectKey, progress: UploadProgress },
    /// `url` is `None` when the object was stored but no URL could be resolved.
    Completed { key: ObjectKey, url: Option<String> },
    Failed { key: ObjectKey, reason: String },
}

/// Clears the in-flight flag however the upload ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns the selected file and the one upload that may run at a time.
pub struct UploadCoordinator {
    store: Arc<dyn ObjectStore>,
    gallery: Arc<GalleryLoader>,
    namespace: String,
    selected: Mutex<Option<FileBlob>>,
    in_flight: AtomicBool,
    state: watch::Sender<UploadState>,
    progress: watch::Sender<UploadProgress>,
    events: broadcast::Sender<UploadEvent>,
}

impl UploadCoordinator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        gallery: Arc<GalleryLoader>,
        namespace: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(UploadState::Idle);
        let (progress, _) = watch::channel(UploadProgress::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            store,
            gallery,
            namespace: namespace.into(),
            selected: Mutex::new(None),
            in_flight: AtomicBool::new(false),
            state,
            progress,
            events,
        }
    }

    pub fn state(&self) -> UploadState {
        self.state.borrow().clone()
    }

    pub fn progress(&self) -> UploadProgress {
        *self.progress.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<UploadState> {
        self.state.subscribe()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<UploadProgress> {
        self.progress.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<UploadEvent> {
        self.events.subscribe()
    }

    pub fn is_uploading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Remembers a file for the next submit. While an upload is running the
    /// published state stays `Uploading`; the selection shows up once it ends.
    pub fn select(&self, file: FileBlob) {
        tracing::debug!("File selected: name={}, size={} bytes", file.name, file.size());
        let selected_state = UploadState::FileSelected {
            name: file.name.clone(),
            size: file.size(),
        };
        *self.lock_selected() = Some(file);

        if !self.is_uploading() {
            self.progress.send_replace(UploadProgress::default());
            self.state.send_replace(selected_state);
        }
    }

    pub fn clear_selection(&self) {
        self.lock_selected().take();
        if !self.is_uploading() {
            self.state.send_replace(UploadState::Idle);
        }
    }

    pub fn selected(&self) -> Option<FileBlob> {
        self.lock_selected().clone()
    }

    /// Uploads whatever is currently selected. Nothing selected is a no-op.
    ///
    /// The upload slot is claimed before the selection is taken, so a
    /// rejected call leaves the selection in place.
    pub async fn submit_selected(&self) -> Result<Option<UploadedImage>, UploadError> {
        let in_flight = self.claim()?;
        let Some(file) = self.lock_selected().take() else {
            return Ok(None);
        };
        self.run(file, in_flight).await.map(Some)
    }

    /// Uploads `file` under a fresh key, then refreshes the gallery once.
    ///
    /// `None` returns `Ok(None)` without touching the store or any state.
    /// A second submit while one is running is rejected with
    /// [`UploadError::Busy`]; the running upload is not affected.
    ///
    /// The upload counts as complete as soon as the store accepts the bytes.
    /// If the download URL cannot be resolved afterwards the failure is
    /// logged, `Completed` carries no URL, and the refresh still runs.
    ///
    /// An empty file has nothing to transfer: its progress stays at 0% and
    /// the `Completed` event is the only sign that it finished.
    pub async fn submit(&self, file: Option<FileBlob>) -> Result<Option<UploadedImage>, UploadError> {
        let Some(file) = file else {
            return Ok(None);
        };
        let in_flight = self.claim().inspect_err(|_| {
            tracing::warn!("Upload rejected, another one is in flight: name={}", file.name);
        })?;
        self.run(file, in_flight).await.map(Some)
    }

    fn claim(&self) -> Result<InFlight<'_>, UploadError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| UploadError::Busy)?;
        Ok(InFlight(&self.in_flight))
    }

    async fn run(&self, file: FileBlob, in_flight: InFlight<'_>) -> Result<UploadedImage, UploadError> {
        let request = UploadRequest::new(file, &self.namespace);
        let result = self.transfer(&request).await;
        self.settle();
        drop(in_flight);

        let key = request.generated_key;
        if let Err(e) = result {
            tracing::error!("Upload failed: key={}, error={:?}", key, e);
            let _ = self.events.send(UploadEvent::Failed {
                key,
                reason: e.to_string(),
            });
            return Err(e.into());
        }

        tracing::info!("Upload complete: key={}", key);
        let download_url = match self.store.download_url(&key).await {
            Ok(url) => Some(url),
            Err(source) => {
                let e = StoreError::UrlResolution {
                    key: key.to_string(),
                    source,
                };
                tracing::error!("Uploaded object has no download URL: {:?}", e);
                None
            }
        };
        let _ = self.events.send(UploadEvent::Completed {
            key: key.clone(),
            url: download_url.clone(),
        });
        // Failures are logged and published by the loader itself.
        let _ = self.gallery.refresh().await;

        Ok(UploadedImage { key, download_url })
    }

    async fn transfer(&self, request: &UploadRequest) -> Result<(), StoreError> {
        let key = &request.generated_key;
        let total = request.file.size();
        tracing::info!("Upload started: key={}, size={} bytes", key, total);

        let start = UploadProgress::new(0, total);
        self.progress.send_replace(start);
        self.state.send_replace(UploadState::Uploading {
            key: key.clone(),
            progress: start,
        });
        let _ = self.events.send(UploadEvent::Started {
            key: key.clone(),
            total_bytes: total,
        });
        let _ = self.events.send(UploadEvent::Progress {
            key: key.clone(),
            progress: start,
        });

        let report = |sent: u64, total: u64| self.report_progress(key, UploadProgress::new(sent, total));

        self.store
            .put_object(
                key,
                request.file.bytes.clone(),
                guess_content_type(key.as_str()),
                &report,
            )
            .await
            .map_err(|source| StoreError::Transfer {
                key: key.to_string(),
                source,
            })?;

        // Stores may skip the final tick; the transfer is done either way.
        self.report_progress(key, UploadProgress::new(total, total));
        Ok(())
    }

    /// Publishes progress, dropping anything that does not move it forward.
    fn report_progress(&self, key: &ObjectKey, progress: UploadProgress) {
        let advanced = self.progress.send_if_modified(|current| {
            if progress.bytes_transferred > current.bytes_transferred {
                *current = progress;
                true
            } else {
                false
            }
        });
        if !advanced {
            return;
        }

        self.state.send_replace(UploadState::Uploading {
            key: key.clone(),
            progress,
        });
        let _ = self.events.send(UploadEvent::Progress {
            key: key.clone(),
            progress,
        });
    }

    /// Back to `Idle`, or to `FileSelected` if a file was picked mid-upload.
    fn settle(&self) {
        self.progress.send_replace(UploadProgress::default());
        let next = match self.lock_selected().as_ref() {
            Some(file) => UploadState::FileSelected {
                name: file.name.clone(),
                size: file.size(),
            },
            None => UploadState::Idle,
        };
        self.state.send_replace(next);
    }

    fn lock_selected(&self) -> std::sync::MutexGuard<'_, Option<FileBlob>> {
        self.selected.lock().unwrap_or_else(|e| e.into_inner())
    }
}
