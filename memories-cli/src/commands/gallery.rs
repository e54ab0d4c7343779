use anyhow::Result;
use memories_core::StoreConfig;

use super::{connect, print_gallery};

pub async fn execute(config: StoreConfig) -> Result<()> {
    tracing::info!("Loading gallery: bucket={}, namespace={}", config.bucket, config.namespace);
    let memories = connect(&config).await?;

    let view = memories.loader().refresh().await?;

    println!("Last {} photos in {}{}:", config.gallery_size, config.bucket, config.namespace);
    print_gallery(&view);

    Ok(())
}
