pub mod app;
pub mod config;
pub mod error;
pub mod gallery;
pub mod memory;
pub mod model;
pub mod s3;
pub mod store;
pub mod upload;

pub use app::Memories;
pub use config::StoreConfig;
pub use error::{StoreError, UploadError};
pub use gallery::{GalleryLoader, GalleryStatus};
pub use memory::InMemoryStore;
pub use model::{
    FileBlob, GalleryView, ObjectKey, ObjectMetadata, StoredImage, UploadProgress, UploadedImage,
};
pub use s3::S3Store;
pub use store::ObjectStore;
pub use upload::{UploadCoordinator, UploadEvent, UploadState};
