//! Subtitle module
//!
//! This module handles everything on the subtitle timeline:
//! - SubRip time-code parsing and formatting
//! - SubRip file parsing into ordered entries
//! - The subtitle track with point-in-time lookup and time shifting

pub mod parser;
pub mod timecode;
pub mod track;

pub use track::{Subtitle, SubtitleTrack};
