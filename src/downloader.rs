//! The fetch/download collaborator: a trait seam and its yt-dlp implementation.

use std::{
    collections::VecDeque,
    fs::File,
    future::Future,
    io::Write,
    path::{Path, PathBuf},
    process::Stdio,
};

use once_cell::sync::OnceCell;
use rust_embed::RustEmbed;
use serde::Deserialize;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::model::{DownloadSettings, OutputMode, Quality};
use crate::progress::{HookEvent, PROGRESS_TEMPLATE, parse_progress_line};

/// Optional bundled yt-dlp binary; drop it into `assets/` before building.
#[derive(RustEmbed)]
#[folder = "assets/"]
pub struct Asset;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)";
const CONCURRENT_FRAGMENTS: &str = "4";
const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";
/// Lines of stderr kept for error reports
const STDERR_TAIL: usize = 20;

/// What the collaborator needs to know about one download
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub settings: DownloadSettings,
}

/// Metadata resolved before the download starts
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaInfo {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
}

/// Observer called for every progress report; returning an error aborts the download.
pub type ProgressHook<'a> = dyn FnMut(HookEvent) -> Result<(), FetchError> + Send + 'a;

/// External library boundary: metadata lookup plus the actual transfer.
pub trait MediaFetcher: Send + Sync + 'static {
    /// Resolves title and thumbnail. Gives up with [`FetchError::Cancelled`]
    /// as soon as `cancel` fires.
    fn fetch_info(
        &self,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<MediaInfo, FetchError>> + Send;

    /// Downloads and post-processes the media into the destination directory.
    fn download(
        &self,
        request: &FetchRequest,
        hook: &mut ProgressHook<'_>,
    ) -> impl Future<Output = Result<(), FetchError>> + Send;
}

/// yt-dlp format expression plus the post-processing arguments that go with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSelection {
    pub format: String,
    pub postprocess: Vec<String>,
}

pub fn format_selection(mode: OutputMode, quality: Quality) -> FormatSelection {
    match mode {
        OutputMode::Audio => FormatSelection {
            format: "bestaudio/best".to_owned(),
            postprocess: [
                "--extract-audio",
                "--audio-format",
                "m4a",
                "--audio-quality",
                "192K",
            ]
            .map(str::to_owned)
            .to_vec(),
        },
        OutputMode::Video => {
            let format = match quality {
                Quality::Best => {
                    "bestvideo[vcodec^=avc]+bestaudio[acodec^=mp4a]/bestvideo+bestaudio/best"
                        .to_owned()
                }
                Quality::MaxHeight(h) => format!(
                    "bestvideo[height<={h}][vcodec^=avc]+bestaudio[acodec^=mp4a]/bestvideo[height<={h}]+bestaudio/best[height<={h}]"
                ),
            };
            FormatSelection {
                format,
                postprocess: ["--merge-output-format", "mp4", "--recode-video", "mp4"]
                    .map(str::to_owned)
                    .to_vec(),
            }
        }
    }
}

/// Arguments for the actual download run
pub fn download_args(request: &FetchRequest) -> Vec<String> {
    let selection = format_selection(request.settings.mode, request.settings.quality);
    let mut args = vec![
        "-f".to_owned(),
        selection.format,
        "--newline".to_owned(),
        "--no-colors".to_owned(),
        "--no-warnings".to_owned(),
        "--progress-template".to_owned(),
        PROGRESS_TEMPLATE.to_owned(),
        "--user-agent".to_owned(),
        USER_AGENT.to_owned(),
        "--concurrent-fragments".to_owned(),
        CONCURRENT_FRAGMENTS.to_owned(),
        "-P".to_owned(),
        request.settings.destination.display().to_string(),
        "-o".to_owned(),
        OUTPUT_TEMPLATE.to_owned(),
    ];
    args.extend(selection.postprocess);
    args.push("--".to_owned());
    args.push(request.url.clone());
    args
}

/// Arguments for the metadata lookup
pub fn info_args(url: &str) -> Vec<String> {
    [
        "-J",
        "--no-warnings",
        "--user-agent",
        USER_AGENT,
        "--",
        url,
    ]
    .map(str::to_owned)
    .to_vec()
}

/// [`MediaFetcher`] backed by the yt-dlp command line program
#[derive(Debug, Clone, Default)]
pub struct YtDlp {
    /// Explicit binary; when unset the embedded copy or `PATH` is used
    binary: Option<PathBuf>,
}

impl YtDlp {
    pub fn new(binary: Option<PathBuf>) -> Self {
        Self { binary }
    }

    fn program(&self) -> Result<PathBuf, FetchError> {
        if let Some(bin) = &self.binary {
            if !bin.exists() {
                return Err(FetchError::ToolMissing(format!(
                    "{} does not exist",
                    bin.display()
                )));
            }
            return Ok(bin.clone());
        }
        Ok(embedded_binary()?.unwrap_or_else(|| PathBuf::from(binary_name())))
    }

    fn command(&self, args: &[String]) -> Result<Command, FetchError> {
        let mut cmd = Command::new(self.program()?);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }
}

impl MediaFetcher for YtDlp {
    async fn fetch_info(
        &self,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<MediaInfo, FetchError> {
        let mut cmd = self.command(&info_args(&request.url))?;
        debug!(url = %request.url, "resolving metadata");
        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            output = cmd.output() => output.map_err(spawn_error)?,
        };
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::ToolFailed {
                code: output.status.code(),
                stderr: tail(stderr.lines(), STDERR_TAIL),
            });
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }

    async fn download(
        &self,
        request: &FetchRequest,
        hook: &mut ProgressHook<'_>,
    ) -> Result<(), FetchError> {
        let args = download_args(request);
        let mut child = self.command(&args)?.spawn().map_err(spawn_error)?;
        info!(url = %request.url, dest = %request.settings.destination.display(), "yt-dlp started");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FetchError::ToolMissing("stdout was not captured".to_owned()))?;
        let stderr = child.stderr.take().map(|err| tokio::spawn(collect_tail(err)));

        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            let Some(event) = parse_progress_line(&line) else {
                continue;
            };
            if let Err(err) = hook(event) {
                let _ = child.kill().await;
                return Err(err);
            }
        }

        let status = child.wait().await?;
        if status.success() {
            return Ok(());
        }
        let stderr = match stderr {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };
        Err(FetchError::ToolFailed {
            code: status.code(),
            stderr,
        })
    }
}

async fn collect_tail<R: AsyncRead + Unpin>(reader: R) -> String {
    let mut lines = BufReader::new(reader).lines();
    let mut kept = VecDeque::with_capacity(STDERR_TAIL);
    while let Ok(Some(line)) = lines.next_line().await {
        if kept.len() == STDERR_TAIL {
            kept.pop_front();
        }
        kept.push_back(line);
    }
    kept.into_iter().collect::<Vec<_>>().join("\n")
}

fn tail<'a>(lines: impl Iterator<Item = &'a str>, n: usize) -> String {
    let all: Vec<&str> = lines.collect();
    all[all.len().saturating_sub(n)..].join("\n")
}

fn spawn_error(err: std::io::Error) -> FetchError {
    if err.kind() == std::io::ErrorKind::NotFound {
        FetchError::ToolMissing(format!("{} was not found on PATH", binary_name()))
    } else {
        FetchError::Io(err)
    }
}

fn binary_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "yt-dlp.exe"
    } else {
        "yt-dlp"
    }
}

static EXTRACTED: OnceCell<Option<PathBuf>> = OnceCell::new();

/// Writes the embedded binary (if any) to the temp dir once per process.
fn embedded_binary() -> Result<Option<PathBuf>, FetchError> {
    EXTRACTED
        .get_or_try_init(|| {
            let Some(data) = Asset::get(binary_name()) else {
                return Ok(None);
            };
            let target = std::env::temp_dir().join(binary_name());
            extract_to(&target, &data.data)?;
            info!(path = %target.display(), "using bundled yt-dlp");
            Ok(Some(target))
        })
        .cloned()
}

fn extract_to(target: &Path, bytes: &[u8]) -> Result<(), FetchError> {
    let up_to_date = std::fs::metadata(target)
        .map(|meta| meta.len() == bytes.len() as u64)
        .unwrap_or(false);
    if up_to_date {
        return Ok(());
    }
    let mut f = File::create(target)?;
    f.write_all(bytes)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(target, std::fs::Permissions::from_mode(0o755))?;
    }
    if let Err(err) = f.sync_all() {
        warn!(error = %err, "could not sync extracted yt-dlp");
    }
    Ok(())
}
