use std::{fmt, path::PathBuf};

use uuid::Uuid;

/// Process-unique identifier assigned to a task when it is submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What the download should produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Video with audio, merged into an mp4
    Video,
    /// Audio track only, extracted to m4a
    Audio,
}

/// Upper bound on the video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    /// Whatever the site offers
    Best,
    /// Maximum frame height in pixels
    MaxHeight(u32),
}

impl Quality {
    /// Choices offered in advanced mode, best first
    pub const CHOICES: [Quality; 5] = [
        Quality::Best,
        Quality::MaxHeight(2160),
        Quality::MaxHeight(1440),
        Quality::MaxHeight(1080),
        Quality::MaxHeight(720),
    ];

    pub fn label(&self) -> String {
        match self {
            Quality::Best => "Best Available".to_owned(),
            Quality::MaxHeight(h) => h.to_string(),
        }
    }
}

/// Settings captured at submission time; never changed afterwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    pub mode: OutputMode,
    pub quality: Quality,
    /// Directory the final file is written to
    pub destination: PathBuf,
}

/// A submitted download request
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub url: String,
    pub settings: DownloadSettings,
}

/// Lifecycle of a task. Variants are declared in lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskStatus {
    Queued,
    Initializing,
    Downloading,
    Processing,
    Completed,
    Cancelled,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::Error
        )
    }

    /// Whether moving from `self` to `next` goes forward in the lifecycle
    pub fn can_advance_to(self, next: TaskStatus) -> bool {
        !self.is_terminal() && next > self
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TaskStatus::Queued => "Queued",
            TaskStatus::Initializing => "Initializing...",
            TaskStatus::Downloading => "Downloading...",
            TaskStatus::Processing => "Processing...",
            TaskStatus::Completed => "Completed",
            TaskStatus::Cancelled => "Cancelled",
            TaskStatus::Error => "Error",
        };
        f.write_str(text)
    }
}

/// A single update emitted by the worker
#[derive(Debug, Clone, PartialEq)]
pub enum TaskUpdate {
    Status(TaskStatus),
    /// Fraction in `[0.0, 1.0]`
    Progress(f32),
    /// Resolved display name
    Title(String),
    /// Thumbnail URL reported by the site
    Thumbnail(String),
}

/// Update addressed to one task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskEvent {
    pub id: TaskId,
    pub update: TaskUpdate,
}
