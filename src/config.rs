use std::{path::PathBuf, time::Duration};

use clap::{Parser, ValueEnum};

use crate::os::default_download_dir;
use crate::queue::WorkerOptions;

/// Entry mode the window opens in
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StartMode {
    Simple,
    Advanced,
}

/// Fast YT: paste a link, get the file
#[derive(Debug, Parser)]
#[command(name = "fast-yt", version)]
pub struct Config {
    /// Directory downloads are written to (defaults to the Desktop)
    #[arg(long, env = "FASTYT_DOWNLOAD_DIR")]
    pub download_dir: Option<PathBuf>,

    /// yt-dlp binary to use instead of the bundled one or the one on PATH
    #[arg(long = "yt-dlp", env = "FASTYT_YTDLP")]
    pub yt_dlp: Option<PathBuf>,

    /// Give up on a single download after this many seconds
    #[arg(long, env = "FASTYT_TASK_TIMEOUT", value_parser = clap::value_parser!(u64).range(1..))]
    pub task_timeout: Option<u64>,

    /// Mode the window starts in
    #[arg(long, value_enum, default_value_t = StartMode::Simple)]
    pub mode: StartMode,

    /// Log filter, e.g. `info` or `fast_yt=debug`; RUST_LOG takes precedence
    #[arg(long, env = "FASTYT_LOG", default_value = "info")]
    pub log: String,
}

impl Config {
    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .unwrap_or_else(default_download_dir)
    }

    pub fn worker_options(&self) -> WorkerOptions {
        WorkerOptions {
            task_timeout: self.task_timeout.map(Duration::from_secs),
        }
    }
}
