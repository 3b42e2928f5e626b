//! Conversion driver
//!
//! Loads subtitles, opens the video, runs the selected policy and writes
//! the finished document named after the video.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::ConverterConfig;
use crate::error::{ConvertError, Result};
use crate::ffmpeg::VideoSession;
use crate::page::pdf::{DocumentWriter, PdfDocument};
use crate::page::text::{FontRenderer, TextRenderer};
use crate::page::PageAssembler;
use crate::select::{self, FrameSource, Selection, SelectionMode};
use crate::subtitle::SubtitleTrack;
use crate::timeline::FrameTimeline;

/// What the caller asked for; any field may be missing or blank
#[derive(Debug, Clone, Default)]
pub struct ConversionRequest {
    pub video: Option<PathBuf>,
    pub subtitles: Option<PathBuf>,
    pub mode: Option<SelectionMode>,
}

/// A request whose required inputs are all present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionPlan {
    pub video: PathBuf,
    pub subtitles: Option<PathBuf>,
    pub mode: SelectionMode,
}

fn non_blank(path: Option<&Path>) -> Option<&Path> {
    path.filter(|p| !p.as_os_str().to_string_lossy().trim().is_empty())
}

impl ConversionPlan {
    /// Validate a request.
    ///
    /// A missing mode means compound. Compound and subtitle-driven modes
    /// without a subtitle file are rejected rather than downgraded.
    pub fn from_request(request: &ConversionRequest) -> Result<Self> {
        let video = non_blank(request.video.as_deref())
            .ok_or_else(|| ConvertError::InvalidInput("no video path given".to_string()))?;
        let mode = request.mode.unwrap_or_default();
        let subtitles = non_blank(request.subtitles.as_deref());

        if mode.requires_subtitles() && subtitles.is_none() {
            return Err(ConvertError::InvalidInput(format!(
                "{} mode needs a subtitle file",
                mode
            )));
        }
        if !mode.requires_subtitles() && subtitles.is_some() {
            tracing::debug!("Ignoring subtitle file in {} mode", mode);
        }

        Ok(Self {
            video: video.to_path_buf(),
            subtitles: subtitles
                .filter(|_| mode.requires_subtitles())
                .map(Path::to_path_buf),
            mode,
        })
    }
}

/// Outcome of one selection pass over a source
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassSummary {
    /// Distinct target frames from the subtitle mapping
    pub targets: usize,
    /// Subtitles lost to a shared target frame
    pub collisions: usize,
    #[serde(flatten)]
    pub selection: Selection,
}

/// Result of a finished conversion
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub video: PathBuf,
    pub output: PathBuf,
    pub mode: SelectionMode,
    pub subtitles: usize,
    #[serde(flatten)]
    pub pass: PassSummary,
}

/// Run `mode` over `source`, appending pages to `document`
pub fn run_pass<S, D>(
    source: &mut S,
    document: &mut D,
    mode: SelectionMode,
    track: Option<&SubtitleTrack>,
    renderer: Option<&dyn TextRenderer>,
) -> Result<PassSummary>
where
    S: FrameSource,
    D: DocumentWriter,
{
    let mut assembler = PageAssembler::new(document, renderer, source.rotation());

    if mode == SelectionMode::Keyframe {
        let selection = select::run_keyframes(source, &mut assembler)?;
        return Ok(PassSummary {
            selection,
            ..Default::default()
        });
    }

    let track = track.ok_or_else(|| {
        ConvertError::InvalidInput(format!("{} mode needs a subtitle track", mode))
    })?;
    if track.is_empty() {
        tracing::warn!("Subtitle track is empty, no pages will be selected");
    }

    let timeline = FrameTimeline::build(track, source.total_frames(), source.duration_ms())?;
    let selection = match mode {
        SelectionMode::Compound => select::run_compound(source, &timeline, track, &mut assembler)?,
        _ => select::run_subtitles(source, &timeline, track, &mut assembler)?,
    };

    Ok(PassSummary {
        targets: timeline.len(),
        collisions: timeline.collisions(),
        selection,
    })
}

/// Converts videos into documents with a fixed configuration
#[derive(Debug, Clone, Default)]
pub struct Converter {
    config: ConverterConfig,
}

impl Converter {
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Videos whose output path was already claimed by an earlier video in
    /// `videos`, mapped to (shared output, earlier video).
    ///
    /// Paths without a file name are left for [`Converter::convert`] to
    /// reject.
    pub fn output_conflicts(&self, videos: &[PathBuf]) -> HashMap<PathBuf, (PathBuf, PathBuf)> {
        let mut claimed: HashMap<PathBuf, &PathBuf> = HashMap::new();
        let mut conflicts = HashMap::new();

        for video in videos {
            let Ok(output) = self.config.output.output_path(video) else {
                continue;
            };
            match claimed.get(&output) {
                Some(&earlier) => {
                    conflicts.insert(video.clone(), (output, earlier.clone()));
                }
                None => {
                    claimed.insert(output, video);
                }
            }
        }

        conflicts
    }

    /// Convert one request.
    ///
    /// Missing or blank required inputs produce `Ok(None)` rather than an
    /// error. Decode and write failures are returned after the decoder has
    /// been closed; no output file is left behind for them.
    pub fn convert(&self, request: &ConversionRequest) -> Result<Option<ConversionReport>> {
        let plan = match ConversionPlan::from_request(request) {
            Ok(plan) => plan,
            Err(ConvertError::InvalidInput(reason)) => {
                tracing::warn!("No output: {}", reason);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        self.execute(&plan).map(Some)
    }

    /// Execute a validated plan
    pub fn execute(&self, plan: &ConversionPlan) -> Result<ConversionReport> {
        tracing::info!(mode = %plan.mode, "Converting {:?}", plan.video);

        let track = plan
            .subtitles
            .as_ref()
            .map(SubtitleTrack::load)
            .transpose()?;
        let renderer = if plan.mode.requires_subtitles() {
            let overlay = &self.config.overlay;
            Some(FontRenderer::discover(
                overlay.font_path.as_deref(),
                &overlay.font_candidates,
                overlay.font_size,
            )?)
        } else {
            None
        };
        let output = self.config.output.output_path(&plan.video)?;

        let mut session = VideoSession::open(&plan.video)?;
        let mut document = PdfDocument::new(self.config.output.compress);
        let outcome = run_pass(
            &mut session,
            &mut document,
            plan.mode,
            track.as_ref(),
            renderer.as_ref().map(|r| r as &dyn TextRenderer),
        );
        session.close();

        let pass = match outcome {
            Ok(pass) => pass,
            Err(e) => {
                tracing::debug!("Abandoning document for {:?}", plan.video);
                return Err(e);
            }
        };
        document.save(&output)?;

        tracing::info!(
            pages = pass.selection.pages,
            frames_scanned = pass.selection.frames_scanned,
            "Wrote {:?}",
            output
        );

        Ok(ConversionReport {
            video: plan.video.clone(),
            output,
            mode: plan.mode,
            subtitles: track.as_ref().map_or(0, SubtitleTrack::len),
            pass,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(video: Option<&str>, subtitles: Option<&str>, mode: Option<SelectionMode>) -> ConversionRequest {
        ConversionRequest {
            video: video.map(PathBuf::from),
            subtitles: subtitles.map(PathBuf::from),
            mode,
        }
    }

    #[test]
    fn test_plan_defaults_to_compound() {
        let plan = ConversionPlan::from_request(&request(Some("a.mp4"), Some("a.srt"), None)).unwrap();
        assert_eq!(plan.mode, SelectionMode::Compound);
        assert_eq!(plan.subtitles, Some(PathBuf::from("a.srt")));
    }

    #[test]
    fn test_plan_rejects_blank_video() {
        for video in [None, Some(""), Some("   ")] {
            let err = ConversionPlan::from_request(&request(video, Some("a.srt"), None)).unwrap_err();
            assert!(matches!(err, ConvertError::InvalidInput(_)));
        }
    }

    #[test]
    fn test_plan_rejects_missing_subtitles() {
        for mode in [None, Some(SelectionMode::Compound), Some(SelectionMode::Subtitle)] {
            let err = ConversionPlan::from_request(&request(Some("a.mp4"), Some(" "), mode)).unwrap_err();
            assert!(matches!(err, ConvertError::InvalidInput(_)));
        }
    }

    #[test]
    fn test_plan_keyframe_needs_no_subtitles() {
        let plan =
            ConversionPlan::from_request(&request(Some("a.mp4"), Some("a.srt"), Some(SelectionMode::Keyframe)))
                .unwrap();
        assert_eq!(plan.subtitles, None);
    }

    #[test]
    fn test_convert_invalid_input_is_no_output() {
        let converter = Converter::default();
        assert!(converter.convert(&request(None, None, None)).unwrap().is_none());
        assert!(converter
            .convert(&request(Some("a.mp4"), None, Some(SelectionMode::Subtitle)))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_convert_unopenable_video_fails_without_output() {
        let _ = crate::ffmpeg::init();
        let dir = tempfile::tempdir().unwrap();
        let mut config = ConverterConfig::default();
        config.output.directory = dir.path().to_path_buf();

        let converter = Converter::new(config);
        let err = converter
            .convert(&request(
                Some("/nonexistent/clip.mp4"),
                None,
                Some(SelectionMode::Keyframe),
            ))
            .unwrap_err();
        assert!(err.is_decoder_open());
        assert!(!dir.path().join("clip.pdf").exists());
    }

    #[test]
    fn test_output_conflicts_on_shared_stem() {
        let converter = Converter::default();
        let videos = vec![
            PathBuf::from("a/x.mp4"),
            PathBuf::from("b/x.mkv"),
            PathBuf::from("b/y.mp4"),
            PathBuf::from("c/x.mp4"),
        ];

        let conflicts = converter.output_conflicts(&videos);
        assert_eq!(conflicts.len(), 2);
        assert_eq!(
            conflicts[&PathBuf::from("b/x.mkv")],
            (PathBuf::from("./x.pdf"), PathBuf::from("a/x.mp4"))
        );
        assert!(conflicts.contains_key(&PathBuf::from("c/x.mp4")));
        assert!(!conflicts.contains_key(&PathBuf::from("a/x.mp4")));
        assert!(!conflicts.contains_key(&PathBuf::from("b/y.mp4")));
    }

    #[test]
    fn test_convert_missing_subtitle_file() {
        let converter = Converter::default();
        let err = converter
            .convert(&request(Some("clip.mp4"), Some("/nonexistent/clip.srt"), None))
            .unwrap_err();
        assert!(matches!(err, ConvertError::Io(_)));
    }
}
