pub mod gallery;
pub mod upload;

use anyhow::Result;
use memories_core::{GalleryView, Memories, S3Store, StoreConfig};
use std::sync::Arc;

/// Connects to the bucket without loading anything yet.
pub async fn connect(config: &StoreConfig) -> Result<Memories> {
    let store = S3Store::new(config).await?;
    Ok(Memories::new(Arc::new(store), config))
}

pub fn print_gallery(view: &GalleryView) {
    if view.is_empty() {
        println!("No photos yet.");
        return;
    }

    for (index, image) in view.images().iter().enumerate() {
        println!(
            "{}. {}  {}",
            index + 1,
            image.created_at.format("%Y-%m-%d %H:%M:%S"),
            image.download_url
        );
    }
}
