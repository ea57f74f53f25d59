//! Fast YT: desktop front-end that queues video/audio downloads for yt-dlp

// egui window
mod app;
// Command line / environment configuration
mod config;
// yt-dlp collaborator
mod downloader;
// Error types
mod error;
// tracing subscriber setup
mod logging;
// Tasks, settings and worker events
mod model;
// Platform integration (folder reveal, default paths)
mod os;
// Progress parsing utilities
mod progress;
// Single-worker download queue
mod queue;
// UI-independent presentation state
mod session;
// Thumbnail fetching
mod thumbnail;

use std::time::Duration;

use clap::Parser;
use eframe::egui;
use tokio::runtime::Builder;
use tracing::info;

use app::FastYtApp;
use config::Config;
use downloader::YtDlp;
use queue::DownloadQueue;
use session::{AppState, Session};

/// Program entry point: parses config, starts the worker and launches the GUI
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    logging::init(&config.log);

    let runtime = Builder::new_multi_thread()
        .enable_all()
        .thread_name("fast-yt-rt")
        .build()?;

    let download_dir = config.download_dir();
    info!(dir = %download_dir.display(), "starting");
    let (queue, events) = DownloadQueue::start(
        runtime.handle(),
        YtDlp::new(config.yt_dlp.clone()),
        config.worker_options(),
    );
    let session = Session::new(AppState::new(config.mode.into(), download_dir), queue, events);
    let handle = runtime.handle().clone();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Fast YT Downloader")
            .with_inner_size([900.0, 750.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Fast YT Downloader",
        options,
        Box::new(move |cc| Box::new(FastYtApp::new(cc, session, handle))),
    )?;

    info!("window closed");
    // The worker was joined on close; only thumbnail fetches can still be running.
    runtime.shutdown_timeout(Duration::from_secs(2));
    Ok(())
}
