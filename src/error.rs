use thiserror::Error;

/// Failures of the fetch/download collaborator
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("cancelled by user")]
    Cancelled,

    #[error("yt-dlp is not available: {0}")]
    ToolMissing(String),

    #[error("failed to run yt-dlp: {0}")]
    Io(#[from] std::io::Error),

    #[error("yt-dlp exited with code {code:?}: {stderr}")]
    ToolFailed { code: Option<i32>, stderr: String },

    #[error("could not read media metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

/// Reasons a submission is refused before a task exists
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("not a valid url: {0:?}")]
    InvalidUrl(String),

    #[error("the download queue has shut down")]
    QueueClosed,
}
