//! Parser for yt-dlp command output
//!
//! The yt-dlp invocation uses templates that prefix every interesting line with a
//! `[ydl:...]` marker, so parsing is a prefix match plus a `|`-separated split.

use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::error::FetchErrorKind;

/// Marker for download progress lines
pub(crate) const PROGRESS_MARKER: &str = "[ydl:progress]";
/// Marker for post-processor progress lines
pub(crate) const POSTPROCESS_MARKER: &str = "[ydl:postprocess]";
/// Marker for the final file path line
pub(crate) const FILE_MARKER: &str = "[ydl:file]";

/// Post-processors that rewrite the media (as opposed to moving or tagging it)
const CONVERSION_POSTPROCESSORS: &[&str] = &[
    "ExtractAudio",
    "Merger",
    "VideoConvertor",
    "VideoRemuxer",
];

fn percent_regex() -> &'static Regex {
    static PERCENT: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    PERCENT.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)\s*%").expect("valid percent regex"))
}

/// One parsed line of yt-dlp output
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OutputLine {
    /// Download progress tick
    Progress {
        percent: Option<u8>,
        eta_seconds: Option<u64>,
        speed: Option<String>,
        tmp_file: Option<PathBuf>,
    },
    /// A post-processor changed state
    PostProcess { name: String, status: String },
    /// Final location of the artifact
    FinalPath(PathBuf),
    /// Anything else (log noise, warnings, errors)
    Other,
}

/// Parse one line of yt-dlp output
pub(crate) fn parse_line(line: &str) -> OutputLine {
    let line = line.trim_end_matches(['\r', '\n']);

    if let Some(rest) = line.trim_start().strip_prefix(PROGRESS_MARKER) {
        let mut fields = rest.split('|');
        let percent = fields.next().and_then(parse_percent);
        let eta_seconds = fields.next().and_then(parse_eta);
        let speed = fields.next().and_then(not_available).map(str::to_string);
        let tmp_file = fields.next().and_then(not_available).map(PathBuf::from);
        return OutputLine::Progress {
            percent,
            eta_seconds,
            speed,
            tmp_file,
        };
    }

    if let Some(rest) = line.trim_start().strip_prefix(POSTPROCESS_MARKER) {
        let mut fields = rest.split('|');
        let name = fields.next().unwrap_or_default().trim().to_string();
        let status = fields.next().unwrap_or_default().trim().to_string();
        return OutputLine::PostProcess { name, status };
    }

    if let Some(rest) = line.trim_start().strip_prefix(FILE_MARKER) {
        let path = rest.trim();
        if !path.is_empty() {
            return OutputLine::FinalPath(PathBuf::from(path));
        }
    }

    OutputLine::Other
}

/// Whether a post-processor converts the media, which moves the download to `Processing`
pub(crate) fn is_conversion_step(name: &str) -> bool {
    CONVERSION_POSTPROCESSORS.contains(&name)
}

/// Map yt-dlp error output to a failure category
pub(crate) fn classify_error(stderr: &str) -> FetchErrorKind {
    let lower = stderr.to_lowercase();

    if lower.contains("unsupported url") || lower.contains("no suitable extractor") {
        return FetchErrorKind::Unsupported;
    }

    // Server-side failures say "Service Unavailable" but are transient
    if lower.contains("http error 5") {
        return FetchErrorKind::Network;
    }

    if lower.contains("private")
        || lower.contains("unavailable")
        || lower.contains("has been removed")
        || lower.contains("not available")
        || lower.contains("http error 404")
        || lower.contains("http error 410")
    {
        return FetchErrorKind::Unavailable;
    }

    if lower.contains("network")
        || lower.contains("connection")
        || lower.contains("timed out")
        || lower.contains("unable to resolve")
        || lower.contains("name or service not known")
        || lower.contains("temporary failure")
    {
        return FetchErrorKind::Network;
    }

    FetchErrorKind::Engine
}

/// Last `ERROR:` line of the output, or the last non-empty line
pub(crate) fn error_summary(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .map(|l| l.to_string())
        .unwrap_or_else(|| "yt-dlp exited without output".to_string())
}

/// Escape a literal string for use inside a yt-dlp output template
pub(crate) fn escape_template(literal: &str) -> String {
    literal.replace('%', "%%")
}

fn not_available(field: &str) -> Option<&str> {
    let field = field.trim();
    if field.is_empty() || field == "NA" || field == "None" || field.starts_with("Unknown") {
        None
    } else {
        Some(field)
    }
}

fn parse_percent(field: &str) -> Option<u8> {
    let captures = percent_regex().captures(not_available(field)?)?;
    let value: f64 = captures.get(1)?.as_str().parse().ok()?;
    Some(value.clamp(0.0, 100.0).floor() as u8)
}

fn parse_eta(field: &str) -> Option<u64> {
    let field = not_available(field)?;
    if let Ok(secs) = field.parse::<u64>() {
        return Some(secs);
    }
    // Tolerate "MM:SS" and "HH:MM:SS"
    field
        .split(':')
        .try_fold(0u64, |acc, part| Some(acc * 60 + part.parse::<u64>().ok()?))
}
