//! Parser for engine output lines
//!
//! The engine is told to print progress as `MDL|<percent>|<speed>|<eta>` and the final
//! file location as `MDL-FILE|<path>`. Everything else is chatter; only a few
//! post-processing markers are recognized.

use crate::types::{Progress, ProgressStage};
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

/// `--progress-template` value understood by [`parse_line`]
pub const PROGRESS_TEMPLATE: &str =
    "download:MDL|%(progress._percent_str)s|%(progress._speed_str)s|%(progress._eta_str)s";

/// `--print` value reporting the final file once it has been moved into place
pub const OUTPUT_FILE_TEMPLATE: &str = "after_move:MDL-FILE|%(filepath)s";

static ANSI_ESCAPE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").ok());

static PROGRESS_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^MDL\|\s*(?P<percent>-?[0-9]+(?:\.[0-9]+)?)\s*%?\s*\|(?P<speed>[^|]*)\|(?P<eta>.*)$")
        .ok()
});

static MERGER_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"^\[Merger\] Merging formats into "(?P<path>.+)"$"#).ok());

/// A recognized engine output line
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedLine {
    /// Transfer progress
    Progress(Progress),
    /// Post-processing started (merge, or the file already existed)
    Processing,
    /// Location of the produced file
    OutputFile(PathBuf),
}

/// Parse one line of engine output; unrecognized lines yield `None`
pub fn parse_line(raw: &str) -> Option<ParsedLine> {
    let cleaned = strip_ansi(raw);
    let line = cleaned.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(path) = line.strip_prefix("MDL-FILE|") {
        let path = path.trim();
        return (!path.is_empty() && path != "NA").then(|| ParsedLine::OutputFile(PathBuf::from(path)));
    }

    if line.starts_with("MDL|") {
        return parse_progress(line).map(ParsedLine::Progress);
    }

    if line.starts_with("[Merger]") || line.ends_with("has already been downloaded") {
        return Some(ParsedLine::Processing);
    }

    if let Some(path) = line.strip_prefix("[download] Destination:") {
        return Some(ParsedLine::OutputFile(PathBuf::from(path.trim())));
    }

    None
}

/// Output file named in a merger line, if any
pub fn merger_target(raw: &str) -> Option<PathBuf> {
    let cleaned = strip_ansi(raw);
    let re = MERGER_LINE.as_ref()?;
    re.captures(cleaned.trim())
        .and_then(|caps| caps.name("path"))
        .map(|m| PathBuf::from(m.as_str()))
}

fn parse_progress(line: &str) -> Option<Progress> {
    let re = PROGRESS_LINE.as_ref()?;
    let caps = re.captures(line)?;
    let percent: f32 = caps.name("percent")?.as_str().parse().ok()?;
    if !percent.is_finite() {
        return None;
    }

    Some(Progress {
        percent: percent.clamp(0.0, 100.0),
        speed: normalize_field(caps.name("speed").map(|m| m.as_str())),
        eta: normalize_field(caps.name("eta").map(|m| m.as_str())),
        stage: ProgressStage::Downloading,
    })
}

fn normalize_field(value: Option<&str>) -> Option<String> {
    let value = value?.trim();
    match value {
        "" | "N/A" | "NA" | "Unknown" | "Unknown speed" | "Unknown ETA" => None,
        other => Some(other.to_string()),
    }
}

fn strip_ansi(line: &str) -> std::borrow::Cow<'_, str> {
    match ANSI_ESCAPE.as_ref() {
        Some(re) if line.contains('\x1b') => re.replace_all(line, ""),
        _ => std::borrow::Cow::Borrowed(line),
    }
}
