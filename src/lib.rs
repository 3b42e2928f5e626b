//! Video Pages
//!
//! Turns a video and its SubRip subtitles into a PDF with one still frame
//! per page, the matching subtitle printed along the bottom edge.
//!
//! The pipeline is single-pass and strictly sequential per video:
//! subtitles are mapped to frame positions ([`timeline`]), a selection
//! policy walks the decoded frames once ([`select`]) and every chosen frame
//! is rotated, captioned and appended to the document ([`page`]).

pub mod config;
pub mod convert;
pub mod error;
pub mod ffmpeg;
pub mod page;
pub mod select;
pub mod subtitle;
pub mod timeline;

#[cfg(test)]
mod tests;

pub use config::ConverterConfig;
pub use convert::{ConversionReport, ConversionRequest, Converter};
pub use error::{ConvertError, Result};
pub use select::SelectionMode;
pub use subtitle::{Subtitle, SubtitleTrack};
