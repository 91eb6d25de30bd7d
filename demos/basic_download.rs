//! Basic download example
//!
//! This example demonstrates the core functionality of ydl-core:
//! - Creating a coordinator backed by yt-dlp
//! - Validating a URL and preparing a request
//! - Subscribing to events
//! - Starting a download and following its progress
//! - Cancelling with Ctrl+C
//!
//! ```bash
//! RUST_LOG=ydl_core=debug cargo run --example basic_download -- <url> [audio|video]
//! ```

use tracing_subscriber::EnvFilter;
use ydl_core::config::{Config, DownloadConfig};
use ydl_core::{Coordinator, DownloadFormat, Event, Status};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ydl_core=info")))
        .init();

    let mut args = std::env::args().skip(1);
    let url = args
        .next()
        .ok_or("usage: basic_download <url> [audio|video]")?;
    let format = match args.next().as_deref() {
        Some("audio") => DownloadFormat::Audio,
        _ => DownloadFormat::Video,
    };

    // Build configuration
    let config = Config {
        download: DownloadConfig {
            download_dir: "downloads".into(),
            ..Default::default()
        },
        ..Default::default()
    };

    // Create coordinator instance (locates yt-dlp on the PATH)
    let coordinator = Coordinator::new(config).await?;

    if coordinator.settings().await.show_disclaimer {
        println!("Only download content you have the right to download.");
        coordinator.mark_disclaimer_shown().await?;
    }

    // Subscribe to events
    let mut events = coordinator.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::Started { id, url, format } => {
                    println!("Started {id}: {url} ({})", format.as_str());
                }
                Event::AttemptRestarted {
                    attempt,
                    max_attempts,
                    ..
                } => {
                    println!("Connection lost, retrying ({attempt}/{max_attempts})");
                }
                Event::Finished {
                    status: Status::Error,
                    error,
                    ..
                } => {
                    println!("Failed: {}", error.unwrap_or_default());
                }
                _ => {}
            }
        }
    });

    let request = coordinator.prepare(&url, None, Some(format)).await?;

    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    let download = coordinator.start(
        request,
        |update| {
            let title = update.title.as_deref().unwrap_or("...");
            let eta = update
                .eta_seconds
                .map(|s| format!(" ETA {s}s"))
                .unwrap_or_default();
            println!("[{:>3}%] {:<11} {title}{eta}", update.percent, update.status.as_str());
        },
        move |download| {
            let _ = done_tx.send(download);
        },
    )?;

    // Ctrl+C cancels the download; the completion callback still fires
    let id = download.id();
    let cancel_handle = coordinator.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("Cancelling...");
            cancel_handle.cancel(id);
        }
    });

    let download = done_rx.await?;
    match download.status() {
        Status::Completed => {
            if let Some(path) = download.output_path() {
                println!("Saved to {}", path.display());
            }
        }
        Status::Cancelled => println!("Download cancelled"),
        status => println!("Download ended as {status}"),
    }

    println!("\nRecent downloads:");
    for entry in coordinator.history().await {
        println!(
            "  {} [{}] {}",
            entry.completed_at.format("%Y-%m-%d %H:%M"),
            entry.status,
            entry.title
        );
    }

    Ok(())
}
