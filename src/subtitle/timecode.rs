//! SubRip time codes (`HH:MM:SS,mmm`)

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{ConvertError, Result};

const MILLIS_IN_SECOND: i64 = 1_000;
const MILLIS_IN_MINUTE: i64 = MILLIS_IN_SECOND * 60;
const MILLIS_IN_HOUR: i64 = MILLIS_IN_MINUTE * 60;

/// Separator between the in and out time codes of a cue
pub const RANGE_SEPARATOR: &str = " --> ";

fn pattern() -> Result<&'static Regex> {
    static PATTERN: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(\d{2}):(\d{2}):(\d{2}),(\d{3})$"))
        .as_ref()
        .map_err(|e| ConvertError::InternalInconsistency(format!("time code pattern: {}", e)))
}

/// Parse a `HH:MM:SS,mmm` time code into milliseconds.
///
/// Anything that is not exactly two digits for each of hours, minutes and
/// seconds plus three digits of milliseconds is rejected. Hours are not
/// range checked beyond the two-digit width.
pub fn parse(text: &str) -> Result<i64> {
    let caps = pattern()?
        .captures(text)
        .ok_or_else(|| ConvertError::MalformedTimecode(text.to_string()))?;

    let field = |i: usize| -> Result<i64> {
        caps[i]
            .parse::<u32>()
            .map(i64::from)
            .map_err(|_| ConvertError::MalformedTimecode(text.to_string()))
    };

    Ok(field(1)? * MILLIS_IN_HOUR + field(2)? * MILLIS_IN_MINUTE + field(3)? * MILLIS_IN_SECOND + field(4)?)
}

/// Format milliseconds as `HH:MM:SS,mmm`.
///
/// Negative inputs are not rejected; each component is clamped to zero
/// instead.
pub fn format(millis: i64) -> String {
    let total_seconds = millis / MILLIS_IN_SECOND;
    let hours = (total_seconds / 3600).max(0);
    let minutes = ((total_seconds % 3600) / 60).max(0);
    let seconds = (total_seconds % 60).max(0);
    let millis = (millis % MILLIS_IN_SECOND).max(0);

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}

/// Format an in/out pair as `HH:MM:SS,mmm --> HH:MM:SS,mmm`
pub fn format_range(time_in: i64, time_out: i64) -> String {
    format!("{}{}{}", format(time_in), RANGE_SEPARATOR, format(time_out))
}

/// Parse a `HH:MM:SS,mmm --> HH:MM:SS,mmm` timing line
pub fn parse_range(line: &str) -> Result<(i64, i64)> {
    let (start, end) = line
        .split_once("-->")
        .ok_or_else(|| ConvertError::MalformedTimecode(line.to_string()))?;
    // Some writers append position hints after the out time
    let end = end.split_whitespace().next().unwrap_or_default();
    Ok((parse(start.trim())?, parse(end)?))
}
