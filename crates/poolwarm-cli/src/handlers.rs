//! Command handlers.

use crate::config::CliConfig;
use crate::report::{self, RestoreStats};
use anyhow::{Context, Result};
use console::style;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use poolwarm_core::ports::OpenMode;
use poolwarm_core::{PageDescriptor, SnapshotMetadata};
use poolwarm_db::MySqlConnector;
use poolwarm_engine::{CacheManager, CancelHandle, cancel_pair};
use poolwarm_image::{ImageBackend, registry};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::warn;

/// Capture the buffer pool into `config.image_file()`.
pub async fn save(config: &CliConfig) -> Result<()> {
    let path = config.image_file();
    let engine = config.engine_config();
    let format = engine.image_format.clone();
    let manager = CacheManager::new(engine, Arc::new(MySqlConnector::new()))?;

    let (handle, signal) = cancel_pair();
    let interrupt = cancel_on_interrupt(handle);
    let started = Instant::now();
    let outcome = manager.save(&path, signal).await;
    interrupt.abort();

    let saved = outcome?;
    report::print_save(&saved, &path, &format, started.elapsed());
    Ok(())
}

/// Replay `config.image_file()` against the server. The configured save
/// format is ignored; only `format` or the file content picks the backend.
pub async fn restore(config: &CliConfig, format: Option<&str>) -> Result<()> {
    let path = config.image_file();
    let mut engine = config.engine_config();
    let backend = resolve_backend(format, &path).await?;
    engine.image_format = backend.name.to_string();

    let manager = CacheManager::new(engine, Arc::new(MySqlConnector::new()))?;

    // Length comes from the image's metadata with the first batch.
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} pages ({per_sec}) {msg}",
        )?
        .progress_chars("=> "),
    );

    let (handle, signal) = cancel_pair();
    let interrupt = cancel_on_interrupt(handle);
    let started = Instant::now();
    let outcome = manager
        .restore(
            &path,
            |batch, progress| {
                if bar.length() != Some(progress.pages_total) {
                    bar.set_length(progress.pages_total);
                }
                bar.set_position(progress.pages_attempted);
                if let Some(last) = batch.errors.last() {
                    let skipped = progress.pages_attempted - progress.pages_fetched;
                    bar.set_message(format!("{} skipped, last: {}", skipped, last));
                }
            },
            signal,
        )
        .await;
    interrupt.abort();
    bar.finish_and_clear();

    let restored = outcome?;
    let stats = RestoreStats::from_report(&restored, started.elapsed());
    report::print_restore(&restored, &stats);
    Ok(())
}

/// Print an image's metadata and optionally its first pages.
pub async fn inspect(config: &CliConfig, format: Option<&str>, pages: usize) -> Result<()> {
    let path = config.image_file();
    let backend = resolve_backend(format, &path).await?;
    let (metadata, preview) = read_image(backend, &path, pages).await?;
    report::print_metadata(&path, backend.name, &metadata, &preview);
    Ok(())
}

pub fn formats() {
    for backend in registry::backends() {
        println!("  {:<8} {}", style(backend.name).bold(), backend.description);
    }
}

/// An explicit format wins. Otherwise the file content decides.
async fn resolve_backend(format: Option<&str>, path: &Path) -> Result<&'static ImageBackend> {
    match format {
        Some(name) => Ok(registry::lookup(name)?),
        None => registry::detect(path)
            .await
            .with_context(|| format!("reading image {}", path.display())),
    }
}

async fn read_image(
    backend: &ImageBackend,
    path: &Path,
    preview: usize,
) -> Result<(SnapshotMetadata, Vec<PageDescriptor>)> {
    let mut image = backend.create();
    image.open(path, OpenMode::Read).await?;
    let metadata = image.read_metadata().await?;
    let mut pages = Vec::new();
    if preview > 0 {
        let mut stream = image.read_pages().await?.take(preview);
        while let Some(page) = stream.next().await {
            pages.push(page?);
        }
    }
    image.close().await?;
    Ok((metadata, pages))
}

/// Trip `handle` on Ctrl-C. The running batch still finishes.
fn cancel_on_interrupt(handle: CancelHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current batch");
            handle.cancel();
        }
    })
}
