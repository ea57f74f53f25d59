use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Opens `folder` in the platform file browser without waiting for it.
/// Errors are only logged.
pub fn reveal_folder(folder: &Path) {
    debug!(folder = %folder.display(), "revealing folder");
    if let Err(err) = open::that_detached(folder) {
        warn!(folder = %folder.display(), error = %err, "could not open folder");
    }
}

/// Current clipboard text, or `None` when the clipboard is empty or unreadable.
pub fn clipboard_text() -> Option<String> {
    let mut clipboard = arboard::Clipboard::new()
        .map_err(|err| warn!(error = %err, "clipboard unavailable"))
        .ok()?;
    clipboard
        .get_text()
        .map_err(|err| debug!(error = %err, "no text on the clipboard"))
        .ok()
}

/// Default destination: the Desktop, then the home directory, then the working directory
pub fn default_download_dir() -> PathBuf {
    dirs::desktop_dir()
        .filter(|dir| dir.is_dir())
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_dir_is_never_empty() {
        assert!(!default_download_dir().as_os_str().is_empty());
    }
}
