//! Subtitle normalization.
//!
//! Turns a SubRip-style subtitle document into a plain-text transcript: timing
//! ranges, sequence indices and blank lines are dropped, and a line that repeats
//! the previously kept line (ignoring case) is suppressed. Everything else is kept
//! in its original order.

use once_cell::sync::Lazy;
use regex::Regex;

/// `HH:MM:SS,mmm --> HH:MM:SS,mmm`, anchored at the start of the line
static TIMING_LINE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]{2}:[0-9]{2}:[0-9]{2},[0-9]{3} --> [0-9]{2}:[0-9]{2}:[0-9]{2},[0-9]{3}").unwrap()
});

/// Check whether a stripped line is a SubRip timing range
pub fn is_timing_line(line: &str) -> bool {
    TIMING_LINE_REGEX.is_match(line)
}

/// Check whether a stripped line is a bare sequence index
pub fn is_sequence_index(line: &str) -> bool {
    !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit())
}

/// Clean an ordered sequence of raw subtitle lines.
///
/// Never fails: any line that is not a timing range, an index or blank is caption
/// text. Only adjacent duplicates are suppressed, and internal whitespace is
/// significant when comparing.
pub fn clean_lines<I, S>(lines: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut kept: Vec<String> = Vec::new();
    let mut previous: Option<String> = None;

    for line in lines {
        let line = line.as_ref().trim();

        if line.is_empty() || is_timing_line(line) || is_sequence_index(line) {
            continue;
        }

        let lowered = line.to_lowercase();
        if previous.as_deref() == Some(lowered.as_str()) {
            continue;
        }

        kept.push(line.to_string());
        previous = Some(lowered);
    }

    kept.join("\n")
}

/// Clean a whole subtitle file held in memory
pub fn clean_subtitles(raw: &str) -> String {
    clean_lines(raw.lines())
}
