//! Presentation state behind the window: what the user picked, one row per
//! submitted download, and the bridge to the download queue. Nothing here
//! touches egui, so it is driven directly in tests.

use std::path::{Path, PathBuf};

use tokio::{sync::mpsc::UnboundedReceiver, task::JoinHandle};
use tracing::{debug, info};

use crate::config::StartMode;
use crate::error::SubmitError;
use crate::model::{DownloadSettings, OutputMode, Quality, TaskEvent, TaskId, TaskStatus, TaskUpdate};
use crate::queue::DownloadQueue;

const TITLE_LIMIT: usize = 55;
const TITLE_KEEP: usize = 52;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiMode {
    /// One click (or a paste) downloads with fixed settings
    Simple,
    /// URLs are queued with an explicit quality ceiling
    Advanced,
}

impl From<StartMode> for UiMode {
    fn from(mode: StartMode) -> Self {
        match mode {
            StartMode::Simple => UiMode::Simple,
            StartMode::Advanced => UiMode::Advanced,
        }
    }
}

/// The two presets offered in simple mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleOption {
    QuickVideo,
    AudioOnly,
}

impl SimpleOption {
    pub fn label(self) -> &'static str {
        match self {
            SimpleOption::QuickVideo => "Quick Video",
            SimpleOption::AudioOnly => "Audio Only",
        }
    }
}

/// Choices the user has made in the window; each field has a single writer.
#[derive(Debug, Clone)]
pub struct AppState {
    mode: UiMode,
    simple_option: SimpleOption,
    quality: Quality,
    download_dir: PathBuf,
}

impl AppState {
    pub fn new(mode: UiMode, download_dir: PathBuf) -> Self {
        Self {
            mode,
            simple_option: SimpleOption::QuickVideo,
            quality: Quality::Best,
            download_dir,
        }
    }

    pub fn mode(&self) -> UiMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: UiMode) {
        self.mode = mode;
    }

    pub fn simple_option(&self) -> SimpleOption {
        self.simple_option
    }

    pub fn set_simple_option(&mut self, option: SimpleOption) {
        self.simple_option = option;
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn set_quality(&mut self, quality: Quality) {
        self.quality = quality;
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    pub fn set_download_dir(&mut self, dir: PathBuf) {
        info!(dir = %dir.display(), "download folder changed");
        self.download_dir = dir;
    }

    /// Settings for a task submitted right now
    pub fn settings(&self) -> DownloadSettings {
        let (mode, quality) = match self.mode {
            UiMode::Simple => match self.simple_option {
                SimpleOption::QuickVideo => (OutputMode::Video, Quality::Best),
                SimpleOption::AudioOnly => (OutputMode::Audio, Quality::Best),
            },
            UiMode::Advanced => (OutputMode::Video, self.quality),
        };
        DownloadSettings {
            mode,
            quality,
            destination: self.download_dir.clone(),
        }
    }
}

/// Cheap sanity check: non-empty and mentions `http`.
pub fn validate_url(url: &str) -> bool {
    !url.is_empty() && url.contains("http")
}

/// Short label for a folder: its last component, or the whole path.
pub fn folder_display_name(path: &Path) -> String {
    if path.as_os_str().is_empty() {
        return "Select Folder".to_owned();
    }
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Read-only record of one download as the window shows it
#[derive(Debug, Clone)]
pub struct DownloadRow {
    pub id: TaskId,
    pub url: String,
    pub title: Option<String>,
    pub status: TaskStatus,
    pub progress: f32,
    /// Folder the file ends up in, for "open folder"
    pub destination: PathBuf,
}

impl DownloadRow {
    /// Title (or URL until it is known), shortened for display
    pub fn display_title(&self) -> String {
        let text = self.title.as_deref().unwrap_or(&self.url);
        if text.chars().count() > TITLE_LIMIT {
            let kept: String = text.chars().take(TITLE_KEEP).collect();
            format!("{kept}...")
        } else {
            text.to_owned()
        }
    }

    pub fn status_label(&self) -> String {
        match self.status {
            TaskStatus::Downloading => {
                format!("{} {:.0}%", self.status, self.progress * 100.0)
            }
            status => status.to_string(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    fn apply(&mut self, update: TaskUpdate) {
        match update {
            TaskUpdate::Status(status) => self.status = status,
            TaskUpdate::Progress(progress) => self.progress = progress.clamp(0.0, 1.0),
            TaskUpdate::Title(title) => self.title = Some(title),
            TaskUpdate::Thumbnail(_) => {}
        }
    }
}

/// Everything the window needs between frames
pub struct Session {
    state: AppState,
    queue: DownloadQueue,
    events: UnboundedReceiver<TaskEvent>,
    rows: Vec<DownloadRow>,
    thumbnail_requests: Vec<(TaskId, String)>,
    /// Contents of the URL entry
    pub url_input: String,
}

impl Session {
    pub fn new(state: AppState, queue: DownloadQueue, events: UnboundedReceiver<TaskEvent>) -> Self {
        Self {
            state,
            queue,
            events,
            rows: Vec::new(),
            thumbnail_requests: Vec::new(),
            url_input: String::new(),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut AppState {
        &mut self.state
    }

    pub fn rows(&self) -> &[DownloadRow] {
        &self.rows
    }

    pub fn row(&self, id: TaskId) -> Option<&DownloadRow> {
        self.rows.iter().find(|row| row.id == id)
    }

    /// Validates `url` and queues it with the current settings.
    pub fn submit(&mut self, url: &str) -> Result<TaskId, SubmitError> {
        let url = url.trim();
        if !validate_url(url) {
            debug!(%url, "rejected submission");
            return Err(SubmitError::InvalidUrl(url.to_owned()));
        }
        let settings = self.state.settings();
        let destination = settings.destination.clone();
        let id = self.queue.submit(url, settings)?;
        self.rows.push(DownloadRow {
            id,
            url: url.to_owned(),
            title: None,
            status: TaskStatus::Queued,
            progress: 0.0,
            destination,
        });
        Ok(id)
    }

    /// Download / Add to Queue button: submits the entry and clears it on success.
    pub fn submit_entry(&mut self) -> Option<TaskId> {
        let url = self.url_input.clone();
        let id = self.submit(&url).ok()?;
        self.url_input.clear();
        Some(id)
    }

    /// Global paste gesture. In simple mode a valid URL starts downloading
    /// immediately; in advanced mode the entry is filled unless it already
    /// has focus (it then handles the paste itself).
    pub fn handle_paste(&mut self, content: &str, entry_focused: bool) -> Option<TaskId> {
        match self.state.mode {
            UiMode::Simple => {
                let id = self.submit(content).ok()?;
                self.url_input = content.trim().to_owned();
                Some(id)
            }
            UiMode::Advanced => {
                if !entry_focused {
                    self.url_input = content.to_owned();
                }
                None
            }
        }
    }

    /// Paste button: replaces the entry with the clipboard text and, in
    /// simple mode, submits it. Nothing happens without clipboard text.
    pub fn paste_from_clipboard(&mut self, clipboard: Option<String>) -> Option<TaskId> {
        let text = clipboard?;
        self.url_input = text.trim().to_owned();
        match self.state.mode {
            UiMode::Simple => self.submit_entry(),
            UiMode::Advanced => None,
        }
    }

    pub fn cancel(&self, id: TaskId) {
        self.queue.cancel(id);
    }

    /// Drops a finished row; active rows stay.
    pub fn remove(&mut self, id: TaskId) -> bool {
        let before = self.rows.len();
        self.rows.retain(|row| row.id != id || !row.is_finished());
        self.rows.len() != before
    }

    /// Applies every pending worker event. Returns how many were applied.
    pub fn pump_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events.try_recv() {
            self.apply(event);
            applied += 1;
        }
        applied
    }

    /// Applies one worker event; events for rows that are gone are ignored.
    pub fn apply(&mut self, event: TaskEvent) {
        let Some(row) = self.rows.iter_mut().find(|row| row.id == event.id) else {
            debug!(task = %event.id, "event for untracked task");
            return;
        };
        if let TaskUpdate::Thumbnail(url) = &event.update {
            self.thumbnail_requests.push((event.id, url.clone()));
        }
        row.apply(event.update);
    }

    /// Thumbnail URLs reported since the last call
    pub fn take_thumbnail_requests(&mut self) -> Vec<(TaskId, String)> {
        std::mem::take(&mut self.thumbnail_requests)
    }

    /// Stops the queue; the running download (if any) is cancelled. Returns
    /// the worker's handle on the first call so the caller can wait for it.
    pub fn shutdown(&mut self) -> Option<JoinHandle<()>> {
        if let Some(id) = self.queue.current() {
            info!(task = %id, "cancelling running download on exit");
        }
        self.queue.shutdown()
    }
}
