//! Subtitle track: ordered entries, point-in-time lookup and time shifting

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::{ConvertError, Result};

use super::timecode;

/// A single subtitle entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subtitle {
    /// Ordinal from the source file
    pub id: u32,
    /// Start time in milliseconds
    pub time_in: i64,
    /// End time in milliseconds
    pub time_out: i64,
    /// Display text, lines separated by `\n`
    pub text: String,
    /// Offset of the chronologically next entry in the owning track
    #[serde(skip)]
    next: Option<usize>,
}

impl Subtitle {
    /// Create a new unlinked subtitle
    pub fn new(id: u32, time_in: i64, time_out: i64, text: impl Into<String>) -> Self {
        Self {
            id,
            time_in,
            time_out,
            text: text.into(),
            next: None,
        }
    }

    /// Whether `time_millis` falls inside `[time_in, time_out]`
    pub fn contains(&self, time_millis: i64) -> bool {
        time_millis >= self.time_in && time_millis <= self.time_out
    }

    /// Display midpoint in milliseconds
    pub fn midpoint(&self) -> i64 {
        (self.time_in + self.time_out) / 2
    }

    /// Offset of the linked successor, if links were built
    pub fn next(&self) -> Option<usize> {
        self.next
    }
}

/// Ordered collection of subtitles.
///
/// Entries keep source order; the track never re-sorts them. Forward links
/// are plain offsets into the backing vector, established once at
/// construction.
#[derive(Debug, Clone, Default)]
pub struct SubtitleTrack {
    entries: Vec<Subtitle>,
}

impl SubtitleTrack {
    /// Build a track without forward links
    pub fn new(entries: Vec<Subtitle>) -> Self {
        let mut entries = entries;
        for entry in &mut entries {
            entry.next = None;
        }
        Self { entries }
    }

    /// Build a track and link each entry to its successor.
    ///
    /// A link is only made when the successor starts strictly later, so the
    /// chain is always increasing by `time_in`. Unsorted input simply ends up
    /// with gaps in the chain.
    pub fn with_links(entries: Vec<Subtitle>) -> Self {
        let mut track = Self::new(entries);
        for i in 0..track.entries.len().saturating_sub(1) {
            if track.entries[i + 1].time_in > track.entries[i].time_in {
                track.entries[i].next = Some(i + 1);
            }
        }
        track
    }

    /// Load and link a SubRip file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let entries = super::parser::parse_srt(&content)?;
        tracing::debug!("Loaded {} subtitles from {:?}", entries.len(), path);
        Ok(Self::with_links(entries))
    }

    pub fn entries(&self) -> &[Subtitle] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&Subtitle> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the subtitle active at `time_millis`, or the nearest one after it.
    ///
    /// Any query under one second returns the first entry. This is a
    /// deliberate approximation: the first entry may not actually cover such
    /// early times.
    pub fn find_at(&self, time_millis: i64) -> Option<&Subtitle> {
        let first = self.entries.first()?;
        if time_millis < MILLIS_FAST_PATH {
            return Some(first);
        }

        for (i, sub) in self.entries.iter().enumerate() {
            if sub.contains(time_millis) {
                return Some(sub);
            }

            if let Some(linked) = sub.next.and_then(|n| self.entries.get(n)) {
                if linked.time_in >= time_millis {
                    return Some(linked);
                }
            }

            if let Some(following) = self.entries.get(i + 1) {
                if following.time_in >= time_millis {
                    return Some(following);
                }
            }
        }

        None
    }

    /// Walk the link chain from the entry at `from` and return the first
    /// successor that covers `time_millis`.
    ///
    /// Only meaningful for tracks built with [`SubtitleTrack::with_links`].
    /// The walk is bounded by the track length; a longer chain means the
    /// links are corrupt.
    pub fn find_after(&self, from: usize, time_millis: i64) -> Result<Option<&Subtitle>> {
        let mut cursor = match self.entries.get(from) {
            Some(sub) => sub.next,
            None => return Ok(None),
        };

        let mut steps = 0;
        while let Some(index) = cursor {
            if steps >= self.entries.len() {
                return Err(ConvertError::InternalInconsistency(format!(
                    "subtitle link chain from entry {} does not terminate",
                    from
                )));
            }
            steps += 1;

            let sub = self.entries.get(index).ok_or_else(|| {
                ConvertError::InternalInconsistency(format!(
                    "subtitle link points past the end of the track: {}",
                    index
                ))
            })?;
            if sub.contains(time_millis) {
                return Ok(Some(sub));
            }
            cursor = sub.next;
        }

        Ok(None)
    }

    fn check_shift(&self, delta_millis: i64) -> Result<()> {
        if self.entries.is_empty() {
            return Err(ConvertError::TrackEmpty);
        }
        if delta_millis == 0 {
            return Err(ConvertError::InvalidInput(
                "shift delta must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Write every entry shifted by `delta_millis` to `destination`.
    ///
    /// Each entry becomes a SubRip block: id, shifted timing, text and a
    /// blank separator line, so the output loads back as a track. The track
    /// itself is left untouched. A failure mid-stream leaves whatever was
    /// already written in place.
    pub fn shift<W: Write>(&self, delta_millis: i64, destination: W) -> Result<()> {
        self.check_shift(delta_millis)?;

        let mut out = BufWriter::new(destination);
        for sub in &self.entries {
            writeln!(out, "{}", sub.id)?;
            writeln!(
                out,
                "{}",
                timecode::format_range(sub.time_in + delta_millis, sub.time_out + delta_millis)
            )?;
            writeln!(out, "{}", sub.text)?;
            writeln!(out)?;
        }
        out.flush()?;

        tracing::debug!(
            entries = self.entries.len(),
            delta_millis,
            "Wrote shifted subtitle track"
        );
        Ok(())
    }

    /// Shift into a newly created file at `path`
    ///
    /// Nothing is created or truncated when the shift is rejected.
    pub fn shift_to_file<P: AsRef<Path>>(&self, delta_millis: i64, path: P) -> Result<()> {
        self.check_shift(delta_millis)?;
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| {
            ConvertError::Write(format!("Failed to create {:?}: {}", path, e))
        })?;
        self.shift(delta_millis, file)
    }
}

/// Queries earlier than this return the first entry
const MILLIS_FAST_PATH: i64 = 1_000;
