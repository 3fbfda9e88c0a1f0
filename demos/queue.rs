//! Example queueing a batch of downloads and printing their events.
//!
//! State is kept under `state/`, so interrupting the example and running it
//! again picks up the queue where it was left.

use color_eyre::Result;
use haul::manager::DownloadEvent;
use haul::persistence::FileStore;
use haul::{ContentInfo, DownloadManager, DownloadRequest, SourceRef, Status};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "haul=info".into()))
        .init();

    let directory = PathBuf::from("downloads");
    let manager = DownloadManager::builder()
        .download_directory(directory.clone())
        .max_concurrent_downloads(3)
        .progress_update_interval(Duration::from_millis(500))
        .store(FileStore::new("state"))
        .build()
        .await?;
    let mut events = manager.subscribe();

    // Only queue the batch on the first run.
    if manager.downloads().await?.is_empty() {
        for i in 1..=8 {
            let url = format!("https://httpbin.org/bytes/256000?seed={}", i);
            let mut content = ContentInfo::new(format!("Sample {}", i), "blob");
            content.size_hint = Some(256_000);
            let mut request = DownloadRequest::from_url(
                &url,
                &directory,
                SourceRef::new("httpbin", "http"),
                content,
            )?;
            // Every URL ends in `bytes/256000`: give each file its own name.
            request.transfer.file_name = format!("sample-{}.bin", i);
            request.transfer.destination_path = directory.join(&request.transfer.file_name);
            manager.add_download(request).await?;
        }
    } else {
        manager.resume_all().await?;
    }

    loop {
        match events.recv().await {
            Ok(DownloadEvent::DownloadProgress { id, progress, speed, .. }) => {
                println!("{} {:>5.1}% {:>10.0} B/s", id, progress * 100.0, speed);
            }
            Ok(DownloadEvent::DownloadFailed { id, error, can_retry }) => {
                println!("{} failed: {}", id, error);
                if can_retry {
                    manager.retry_download(id).await?;
                }
            }
            Ok(event) => println!("{:?}", event),
            Err(RecvError::Lagged(skipped)) => println!("skipped {} events", skipped),
            Err(RecvError::Closed) => break,
        }

        let stats = manager.queue_stats().await?;
        let unfinished = stats.pending + stats.downloading + stats.retrying;
        let failed_for_good = manager
            .downloads()
            .await?
            .iter()
            .filter(|item| item.status() == Status::Failed && !item.can_retry())
            .count();
        if unfinished == 0 && stats.failed == failed_for_good {
            break;
        }
    }

    let stats = manager.queue_stats().await?;
    println!(
        "\nDone: {} completed, {} failed of {} downloads.",
        stats.completed, stats.failed, stats.total
    );
    manager.shutdown().await?;

    Ok(())
}
