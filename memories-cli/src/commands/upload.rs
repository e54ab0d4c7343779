use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use memories_core::{FileBlob, Memories, StoreConfig, UploadError, UploadEvent, UploadedImage};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::error::RecvError;
use walkdir::WalkDir;

use super::{connect, print_gallery};

pub async fn execute(paths: Vec<String>, config: StoreConfig) -> Result<()> {
    let files = collect_files(paths)?;

    if files.is_empty() {
        anyhow::bail!("No files found in the provided paths");
    }

    let memories = connect(&config).await?;
    tracing::info!("Uploading {} files to {}/{}", files.len(), config.bucket, config.namespace);

    println!("Bucket: {}", config.bucket);
    println!("Files to share: {}\n", files.len());

    let mut uploaded = 0;
    let mut failed = 0;

    // One at a time: the coordinator only runs a single upload.
    for path in &files {
        match upload_one(&memories, path).await {
            Ok(()) => uploaded += 1,
            Err(e) => {
                failed += 1;
                eprintln!("✗ {}: {:#}", path.display(), e);
            }
        }
    }

    println!("\n✓ Shared {} of {} files", uploaded, files.len());
    if failed > 0 {
        println!("  {} failed, see the log for details", failed);
    }

    // Completed uploads already refreshed the view.
    if uploaded == 0 {
        memories.mount().await;
    }

    println!("\nLast {} photos:", config.gallery_size);
    print_gallery(&memories.gallery());

    Ok(())
}

async fn upload_one(memories: &Memories, path: &Path) -> Result<()> {
    let name = path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let pb = ProgressBar::new(bytes.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.green/blue} {bytes}/{total_bytes} {msg}")
            .expect("Invalid progress bar template")
            .progress_chars("█▓▒░ "),
    );
    pb.set_message(name.clone());

    let mut events = memories.uploads().subscribe_events();
    let bar = pb.clone();
    let follower = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(UploadEvent::Progress { progress, .. }) => bar.set_position(progress.bytes_transferred),
                Ok(UploadEvent::Completed { .. }) | Ok(UploadEvent::Failed { .. }) => break,
                Ok(UploadEvent::Started { .. }) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    });

    let result = memories.submit(Some(FileBlob::new(name.clone(), bytes))).await;
    if announces_end(&result) {
        // Let the follower drain buffered progress up to the terminal event.
        let _ = follower.await;
    } else {
        follower.abort();
    }

    match result {
        Ok(Some(image)) => {
            pb.finish_with_message(format!("{name} → {}", image.key));
            Ok(())
        }
        Ok(None) => {
            pb.abandon();
            Ok(())
        }
        Err(e) => {
            pb.abandon_with_message(format!("{name} failed"));
            Err(e.into())
        }
    }
}

/// Whether the coordinator sent `Completed` or `Failed` for this submit.
fn announces_end(result: &Result<Option<UploadedImage>, UploadError>) -> bool {
    matches!(result, Ok(Some(_)) | Err(UploadError::Store(_)))
}

fn collect_files(paths: Vec<String>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path_str in paths {
        let path = Path::new(&path_str);

        if !path.exists() {
            anyhow::bail!("Path does not exist: {}", path.display());
        }

        if path.is_file() {
            files.push(path.to_path_buf());
        } else if path.is_dir() {
            // Walk directory and collect every regular file
            for entry in WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let entry_path = entry.path();
                if entry_path.is_file() && !is_hidden(entry_path) {
                    files.push(entry_path.to_path_buf());
                }
            }
        }
    }

    // Sort for consistent ordering
    files.sort();

    Ok(files)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn collects_files_from_directories_sorted() {
        let dir = std::env::temp_dir().join(format!("memories-cli-{}", std::process::id()));
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("b.jpg"), b"b").unwrap();
        fs::write(dir.join("nested/a.png"), b"a").unwrap();
        fs::write(dir.join(".DS_Store"), b"x").unwrap();

        let files = collect_files(vec![dir.to_string_lossy().to_string()]).unwrap();

        assert_eq!(files, vec![dir.join("b.jpg"), dir.join("nested/a.png")]);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn follower_is_awaited_only_after_a_terminal_event() {
        let done = Ok(Some(UploadedImage {
            key: "images/a".into(),
            download_url: None,
        }));
        assert!(announces_end(&done));
        assert!(!announces_end(&Ok(None)));
        assert!(!announces_end(&Err(UploadError::Busy)));
    }

    #[tokio::test]
    async fn follower_sees_every_progress_tick_before_completion() {
        let store = std::sync::Arc::new(memories_core::InMemoryStore::default().with_chunk_size(1024));
        let memories = Memories::new(store, &StoreConfig::new("wedding"));
        let mut events = memories.uploads().subscribe_events();
        let follower = tokio::spawn(async move {
            let mut last = 0;
            loop {
                match events.recv().await {
                    Ok(UploadEvent::Progress { progress, .. }) => last = progress.bytes_transferred,
                    Ok(UploadEvent::Completed { .. }) | Err(RecvError::Closed) => return last,
                    _ => {}
                }
            }
        });

        let result = memories.submit(Some(FileBlob::new("a.jpg", vec![0u8; 8 * 1024]))).await;
        assert!(announces_end(&result));

        assert_eq!(follower.await.unwrap(), 8 * 1024);
    }

    #[test]
    fn missing_path_is_an_error() {
        let err = collect_files(vec!["/definitely/not/here.jpg".to_string()]).unwrap_err();

        assert!(err.to_string().contains("Path does not exist"));
    }
}
