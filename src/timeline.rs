//! Subtitle-to-frame mapping
//!
//! Each subtitle is anchored to the frame shown at its display midpoint:
//! `floor(total_frames * midpoint_ms / duration_ms)`. Only one subtitle can
//! be attached to a frame; when several land on the same index the one
//! processed last wins.

use std::collections::{BTreeMap, VecDeque};

use crate::error::{ConvertError, Result};
use crate::subtitle::{Subtitle, SubtitleTrack};

/// Compute the target frame index for one subtitle
pub fn target_frame(total_frames: u64, duration_ms: u64, subtitle: &Subtitle) -> Result<u64> {
    if duration_ms == 0 {
        return Err(ConvertError::InvalidDuration(
            "video reports a total duration of 0 ms".to_string(),
        ));
    }
    let midpoint = subtitle.midpoint().max(0) as u128;
    Ok((total_frames as u128 * midpoint / duration_ms as u128) as u64)
}

/// Frame index to subtitle association for one conversion pass
#[derive(Debug, Clone, Default)]
pub struct FrameTimeline {
    /// Target frame index -> offset of the subtitle in its track
    targets: BTreeMap<u64, usize>,
    collisions: usize,
}

impl FrameTimeline {
    /// Map every subtitle of `track` onto the frame sequence
    pub fn build(track: &SubtitleTrack, total_frames: u64, duration_ms: u64) -> Result<Self> {
        let mut timeline = Self::default();

        for (offset, subtitle) in track.entries().iter().enumerate() {
            let frame = target_frame(total_frames, duration_ms, subtitle)?;
            if let Some(previous) = timeline.targets.insert(frame, offset) {
                timeline.collisions += 1;
                tracing::debug!(
                    frame,
                    replaced = track.get(previous).map(|s| s.id),
                    by = subtitle.id,
                    "Subtitles share a target frame, keeping the later one"
                );
            }
        }

        tracing::debug!(
            targets = timeline.targets.len(),
            collisions = timeline.collisions,
            total_frames,
            duration_ms,
            "Built frame timeline"
        );
        Ok(timeline)
    }

    /// Offset of the subtitle attached to `frame`
    pub fn subtitle_at(&self, frame: u64) -> Option<usize> {
        self.targets.get(&frame).copied()
    }

    pub fn contains(&self, frame: u64) -> bool {
        self.targets.contains_key(&frame)
    }

    /// Distinct target frames in ascending order
    pub fn pending(&self) -> VecDeque<u64> {
        self.targets.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Number of subtitles dropped because their frame was already taken
    pub fn collisions(&self) -> usize {
        self.collisions
    }
}
