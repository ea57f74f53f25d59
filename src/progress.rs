//! Parsing of yt-dlp progress output.
//!
//! yt-dlp is started with `--progress-template` so every progress line looks
//! like `ytfast:<status>:<percent>`; anything else on stdout is ignored.

/// Prefix of the lines produced by [`PROGRESS_TEMPLATE`]
pub const PROGRESS_PREFIX: &str = "ytfast:";

/// Value passed to `--progress-template`
pub const PROGRESS_TEMPLATE: &str =
    "download:ytfast:%(progress.status)s:%(progress._percent_str)s";

/// Progress phase reported by the collaborator for the current download
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookEvent {
    /// Transfer in flight; `percent` is the raw string, e.g. `" 42.1%"`
    Downloading { percent: String },
    /// A file finished downloading; post-processing follows
    Finished,
}

pub fn parse_progress_line(line: &str) -> Option<HookEvent> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let (status, percent) = rest.split_once(':').unwrap_or((rest, ""));
    match status {
        "downloading" => Some(HookEvent::Downloading {
            percent: percent.to_owned(),
        }),
        "finished" => Some(HookEvent::Finished),
        _ => None,
    }
}

/// Maps a percentage string such as `" 42.1%"` to a fraction in `[0, 1]`.
/// Colour escape sequences are ignored; `"N/A"` and other junk give `None`.
pub fn percent_to_fraction(percent: &str) -> Option<f32> {
    let cleaned = strip_ansi(percent);
    let number = cleaned.trim().strip_suffix('%')?;
    let value = number.trim().parse::<f32>().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some((value / 100.0).clamp(0.0, 1.0))
}

fn strip_ansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            // CSI sequence: ESC [ params final-byte
            for next in chars.by_ref() {
                if next.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}
