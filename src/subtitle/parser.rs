//! SubRip (.srt) file parser

use crate::error::{ConvertError, Result};

use super::timecode;
use super::track::Subtitle;

/// Parse SubRip text into entries in file order.
///
/// Blocks are separated by blank lines. A block whose id or timing line
/// cannot be read is skipped with a warning rather than failing the whole
/// file. Fails only when the input holds blocks but none of them parse.
pub fn parse_srt(content: &str) -> Result<Vec<Subtitle>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut entries = Vec::new();
    let mut skipped = 0usize;
    let mut first_error = None;

    for (line_no, block) in blocks(content) {
        match parse_block(&block) {
            Ok(sub) => entries.push(sub),
            Err(reason) => {
                tracing::warn!(line = line_no, "Skipping subtitle block: {}", reason);
                skipped += 1;
                first_error.get_or_insert(ConvertError::SubtitleParse {
                    line: line_no,
                    reason,
                });
            }
        }
    }

    if entries.is_empty() {
        if let Some(err) = first_error {
            return Err(err);
        }
    }
    if skipped > 0 {
        tracing::debug!(parsed = entries.len(), skipped, "Parsed SubRip input");
    }

    Ok(entries)
}

/// Split into blank-line separated blocks, tagged with their 1-based start line
fn blocks(content: &str) -> Vec<(usize, Vec<&str>)> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut start = 0;

    for (i, line) in content.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push((start, std::mem::take(&mut current)));
            }
            continue;
        }
        if current.is_empty() {
            start = i + 1;
        }
        current.push(line);
    }
    if !current.is_empty() {
        blocks.push((start, current));
    }

    blocks
}

fn parse_block(lines: &[&str]) -> std::result::Result<Subtitle, String> {
    let (id_line, rest) = lines.split_first().ok_or("empty block")?;
    let id = id_line
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid id {:?}", id_line))?;

    let (timing, text) = rest.split_first().ok_or("missing timing line")?;
    let (time_in, time_out) = timecode::parse_range(timing).map_err(|e| e.to_string())?;
    if time_out < time_in {
        return Err(format!("out time precedes in time: {:?}", timing));
    }

    Ok(Subtitle::new(id, time_in, time_out, text.join("\n")))
}
