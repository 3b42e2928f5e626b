//! The three page selection policies.
//!
//! Every policy makes a single forward pass over frame positions
//! `1..=total_frames`; nothing is ever re-decoded or sought. State such as
//! the queue of pending targets lives only for the duration of one call.

use crate::error::{ConvertError, Result};
use crate::page::pdf::DocumentWriter;
use crate::page::PageAssembler;
use crate::subtitle::SubtitleTrack;
use crate::timeline::FrameTimeline;

use super::{FrameSource, Selection, SourceFrame};

impl Selection {
    fn record(&mut self, frame: u64, overlaid: bool) {
        self.pages += 1;
        if overlaid {
            self.overlaid += 1;
        }
        self.emitted_frames.push(frame);
    }
}

fn subtitle_text<'t>(
    timeline: &FrameTimeline,
    track: &'t SubtitleTrack,
    frame: u64,
) -> Result<&'t str> {
    timeline
        .subtitle_at(frame)
        .and_then(|offset| track.get(offset))
        .map(|sub| sub.text.as_str())
        .ok_or_else(|| {
            ConvertError::InternalInconsistency(format!(
                "no subtitle attached to target frame {}",
                frame
            ))
        })
}

/// Compound policy.
///
/// Pending targets are consumed in ascending order. A frame becomes a page
/// when it is a keyframe and its position is at or past the smallest
/// pending target, so a non-key target is represented by the next keyframe
/// after it. One target is consumed per matching keyframe. The pass stops as
/// soon as the queue is empty or the stream ends, which can leave trailing
/// targets unmatched.
pub fn run_compound<S, D>(
    source: &mut S,
    timeline: &FrameTimeline,
    track: &SubtitleTrack,
    assembler: &mut PageAssembler<'_, D>,
) -> Result<Selection>
where
    S: FrameSource,
    D: DocumentWriter,
{
    let mut pending = timeline.pending();
    let mut selection = Selection::default();

    for position in 1..=source.total_frames() {
        let Some(&target) = pending.front() else {
            tracing::debug!(position, "All subtitle targets matched");
            break;
        };
        let Some(frame) = source.next_frame()? else {
            tracing::debug!(
                position,
                unmatched = pending.len(),
                "Stream ended before every subtitle target was matched"
            );
            break;
        };
        selection.frames_scanned += 1;

        if frame.is_keyframe() && position >= target {
            pending.pop_front();
            let text = subtitle_text(timeline, track, target)?;
            let image = source.materialize(&frame)?;
            selection.materialized += 1;

            tracing::debug!(position, target, "Keyframe matched subtitle target");
            assembler.emit(image, Some(text))?;
            selection.record(position, true);
        }
    }

    Ok(selection)
}

/// Subtitle-driven policy.
///
/// Extracts exactly the target frames regardless of keyframe status; every
/// other position is skipped without conversion.
pub fn run_subtitles<S, D>(
    source: &mut S,
    timeline: &FrameTimeline,
    track: &SubtitleTrack,
    assembler: &mut PageAssembler<'_, D>,
) -> Result<Selection>
where
    S: FrameSource,
    D: DocumentWriter,
{
    let mut selection = Selection::default();

    for position in 1..=source.total_frames() {
        if !timeline.contains(position) {
            if !source.skip_frame()? {
                tracing::debug!(position, "Stream ended early");
                break;
            }
            selection.frames_scanned += 1;
            continue;
        }

        let Some(frame) = source.next_frame()? else {
            tracing::debug!(position, "Stream ended early");
            break;
        };
        selection.frames_scanned += 1;

        let text = subtitle_text(timeline, track, position)?;
        let image = source.materialize(&frame)?;
        selection.materialized += 1;

        tracing::debug!(position, "Extracted subtitle target frame");
        assembler.emit(image, Some(text))?;
        selection.record(position, true);
    }

    Ok(selection)
}

/// Keyframe-only policy: every keyframe becomes a page without overlay
pub fn run_keyframes<S, D>(
    source: &mut S,
    assembler: &mut PageAssembler<'_, D>,
) -> Result<Selection>
where
    S: FrameSource,
    D: DocumentWriter,
{
    let mut selection = Selection::default();

    for position in 1..=source.total_frames() {
        let Some(frame) = source.next_frame()? else {
            tracing::debug!(position, "Stream ended early");
            break;
        };
        selection.frames_scanned += 1;

        if !frame.is_keyframe() {
            continue;
        }
        let image = source.materialize(&frame)?;
        selection.materialized += 1;

        tracing::debug!(position, "Extracted keyframe");
        assembler.emit(image, None)?;
        selection.record(position, false);
    }

    Ok(selection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Rotation;
    use crate::subtitle::Subtitle;
    use crate::tests::fixtures::{BoxRenderer, FakeSource, RecordingDocument};

    /// Track whose subtitles map to `frames` on a 10 frame / 10 s video
    fn track_for_frames(frames: &[u64]) -> SubtitleTrack {
        SubtitleTrack::with_links(
            frames
                .iter()
                .enumerate()
                .map(|(i, f)| {
                    let mid = *f as i64 * 1_000;
                    Subtitle::new(i as u32 + 1, mid - 500, mid + 500, format!("line {}", f))
                })
                .collect(),
        )
    }

    #[test]
    fn test_keyframes_only() {
        let mut source = FakeSource::new(10, 10_000, &[1, 5, 9]);
        let mut document = RecordingDocument::default();
        let mut assembler = PageAssembler::new(&mut document, None, Rotation::None);

        let selection = run_keyframes(&mut source, &mut assembler).unwrap();
        assert_eq!(selection.pages, 3);
        assert_eq!(selection.overlaid, 0);
        assert_eq!(selection.emitted_frames, vec![1, 5, 9]);
        assert_eq!(selection.frames_scanned, 10);
        assert_eq!(source.materialized, vec![1, 5, 9]);
        assert_eq!(document.pages.len(), 3);
    }

    #[test]
    fn test_subtitle_driven_extracts_exact_frames() {
        let track = track_for_frames(&[3, 7]);
        let timeline = FrameTimeline::build(&track, 10, 10_000).unwrap();
        let mut source = FakeSource::new(10, 10_000, &[1]);
        let renderer = BoxRenderer::default();
        let mut document = RecordingDocument::default();
        let mut assembler = PageAssembler::new(&mut document, Some(&renderer), Rotation::None);

        let selection = run_subtitles(&mut source, &timeline, &track, &mut assembler).unwrap();
        assert_eq!(selection.emitted_frames, vec![3, 7]);
        assert_eq!(selection.overlaid, 2);
        assert_eq!(source.materialized, vec![3, 7]);
        assert_eq!(source.skipped, vec![1, 2, 4, 5, 6, 8, 9, 10]);

        let texts: Vec<String> = renderer.draws().into_iter().map(|d| d.0).collect();
        assert_eq!(texts, vec!["line 3", "line 7"]);
    }

    #[test]
    fn test_compound_uses_next_keyframe_at_or_after_target() {
        let track = track_for_frames(&[2, 6]);
        let timeline = FrameTimeline::build(&track, 10, 10_000).unwrap();
        let mut source = FakeSource::new(10, 10_000, &[1, 4, 6, 8]);
        let renderer = BoxRenderer::default();
        let mut document = RecordingDocument::default();
        let mut assembler = PageAssembler::new(&mut document, Some(&renderer), Rotation::None);

        let selection = run_compound(&mut source, &timeline, &track, &mut assembler).unwrap();
        assert_eq!(selection.emitted_frames, vec![4, 6]);
        assert_eq!(source.materialized, vec![4, 6]);
        // Stops as soon as the queue drains
        assert_eq!(selection.frames_scanned, 6);

        let texts: Vec<String> = renderer.draws().into_iter().map(|d| d.0).collect();
        assert_eq!(texts, vec!["line 2", "line 6"]);
    }

    #[test]
    fn test_compound_drops_targets_after_last_keyframe() {
        let track = track_for_frames(&[2, 9]);
        let timeline = FrameTimeline::build(&track, 10, 10_000).unwrap();
        let mut source = FakeSource::new(10, 10_000, &[1, 4, 6, 8]);
        let renderer = BoxRenderer::default();
        let mut document = RecordingDocument::default();
        let mut assembler = PageAssembler::new(&mut document, Some(&renderer), Rotation::None);

        let selection = run_compound(&mut source, &timeline, &track, &mut assembler).unwrap();
        assert_eq!(selection.emitted_frames, vec![4]);
        assert_eq!(selection.frames_scanned, 10);
    }

    #[test]
    fn test_compound_one_target_per_keyframe() {
        let track = track_for_frames(&[2, 3]);
        let timeline = FrameTimeline::build(&track, 10, 10_000).unwrap();
        let mut source = FakeSource::new(10, 10_000, &[5, 7]);
        let renderer = BoxRenderer::default();
        let mut document = RecordingDocument::default();
        let mut assembler = PageAssembler::new(&mut document, Some(&renderer), Rotation::None);

        let selection = run_compound(&mut source, &timeline, &track, &mut assembler).unwrap();
        assert_eq!(selection.emitted_frames, vec![5, 7]);
    }

    #[test]
    fn test_short_stream_stops_cleanly() {
        // Container claims 10 frames but only 4 decode
        let mut source = FakeSource::new(10, 10_000, &[1, 3]).truncated(4);
        let mut document = RecordingDocument::default();
        let mut assembler = PageAssembler::new(&mut document, None, Rotation::None);

        let selection = run_keyframes(&mut source, &mut assembler).unwrap();
        assert_eq!(selection.frames_scanned, 4);
        assert_eq!(selection.emitted_frames, vec![1, 3]);

        let track = track_for_frames(&[8]);
        let timeline = FrameTimeline::build(&track, 10, 10_000).unwrap();
        let mut source = FakeSource::new(10, 10_000, &[1]).truncated(4);
        let renderer = BoxRenderer::default();
        let mut document = RecordingDocument::default();
        let mut assembler = PageAssembler::new(&mut document, Some(&renderer), Rotation::None);
        let selection = run_subtitles(&mut source, &timeline, &track, &mut assembler).unwrap();
        assert_eq!(selection.pages, 0);
    }

    #[test]
    fn test_decode_error_propagates() {
        let mut source = FakeSource::new(10, 10_000, &[1, 5]).failing_at(3);
        let mut document = RecordingDocument::default();
        let mut assembler = PageAssembler::new(&mut document, None, Rotation::None);

        let err = run_keyframes(&mut source, &mut assembler).unwrap_err();
        assert!(err.is_decode());
        assert_eq!(document.pages.len(), 1);
    }
}
