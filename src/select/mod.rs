//! Frame selection
//!
//! This module decides which decoded frames become pages:
//! - the `FrameSource` seam over the video decoder
//! - the three selection policies (compound, subtitle-driven, keyframe-only)
//! - per-pass statistics

pub mod policy;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::page::Rotation;

pub use policy::{run_compound, run_keyframes, run_subtitles};

/// A decoded frame that has not been converted to RGB yet
pub trait SourceFrame {
    fn is_keyframe(&self) -> bool;
}

/// Strictly sequential video frame source.
///
/// One instance per conversion; frames are pulled in order and never
/// revisited.
pub trait FrameSource {
    type Frame: SourceFrame;

    /// Total frame count reported by the container
    fn total_frames(&self) -> u64;

    /// Total duration in milliseconds
    fn duration_ms(&self) -> u64;

    /// Clockwise rotation to apply to every frame
    fn rotation(&self) -> Rotation;

    /// Decode the next frame, `None` at end of stream
    fn next_frame(&mut self) -> Result<Option<Self::Frame>>;

    /// Advance past one frame without converting it. Returns `false` at end
    /// of stream.
    fn skip_frame(&mut self) -> Result<bool>;

    /// Convert a decoded frame into an RGB raster
    fn materialize(&mut self, frame: &Self::Frame) -> Result<RgbImage>;
}

/// Page selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// First keyframe at or after each subtitle's target frame, with overlay
    #[default]
    Compound,
    /// Exactly each subtitle's target frame, with overlay
    Subtitle,
    /// Every keyframe, no overlay
    Keyframe,
}

impl SelectionMode {
    /// Whether the policy needs a subtitle track
    pub fn requires_subtitles(&self) -> bool {
        !matches!(self, SelectionMode::Keyframe)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMode::Compound => "compound",
            SelectionMode::Subtitle => "subtitle",
            SelectionMode::Keyframe => "keyframe",
        }
    }
}

impl std::fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistics for one selection pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Selection {
    /// Frame positions visited
    pub frames_scanned: u64,
    /// Frames converted to RGB
    pub materialized: u64,
    /// Pages emitted
    pub pages: usize,
    /// Pages carrying subtitle text
    pub overlaid: usize,
    /// Frame positions (1-based) that became pages, in order
    pub emitted_frames: Vec<u64>,
}
