//! Sequential video decoder session
//!
//! Wraps an FFmpeg input context and video decoder as a [`FrameSource`].
//! One session per conversion; frames come out strictly in decode order.

use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use image::RgbImage;

use crate::error::{FfmpegError, Result};
use crate::page::Rotation;
use crate::select::{FrameSource, SourceFrame};

/// A decoded picture that has not been colour converted
pub struct DecodedFrame {
    inner: ffmpeg::frame::Video,
}

impl SourceFrame for DecodedFrame {
    fn is_keyframe(&self) -> bool {
        self.inner.is_key()
    }
}

/// Open decoder session over the best video stream of a file
pub struct VideoSession {
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    stream_index: usize,
    total_frames: u64,
    duration_ms: u64,
    rotation: Rotation,
    scaler: Option<ScalingContext>,
    eof_sent: bool,
    source_path: PathBuf,
}

impl VideoSession {
    /// Open `path` and prepare a decoder for its best video stream
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let input = ffmpeg::format::input(&path)
            .map_err(|e| FfmpegError::OpenInput(format!("Failed to open {:?}: {}", path, e)))?;

        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or(FfmpegError::NoVideoStream)?;
        let stream_index = stream.index();

        let duration_ms = container_duration_ms(&input, &stream);
        let total_frames = frame_count(&stream, duration_ms);
        let rotation = match stream.metadata().get("rotate") {
            Some(tag) => Rotation::from_metadata(Some(tag)),
            None => display_matrix(&stream)
                .map(|matrix| Rotation::from_display_matrix(&matrix))
                .unwrap_or_default(),
        };

        let context = ffmpeg::codec::Context::from_parameters(stream.parameters()).map_err(|e| {
            FfmpegError::DecoderCreate(format!(
                "Failed to create codec context for stream {}: {}",
                stream_index, e
            ))
        })?;
        let decoder = context.decoder().video().map_err(|e| {
            FfmpegError::DecoderCreate(format!(
                "Failed to open video decoder for stream {}: {}",
                stream_index, e
            ))
        })?;

        tracing::info!(
            stream_index,
            total_frames,
            duration_ms,
            rotation = rotation.degrees(),
            "Opened video {:?} ({}x{})",
            path,
            decoder.width(),
            decoder.height()
        );

        Ok(Self {
            input,
            decoder,
            stream_index,
            total_frames,
            duration_ms,
            rotation,
            scaler: None,
            eof_sent: false,
            source_path: path.to_path_buf(),
        })
    }

    /// Close the session, releasing the decoder and input context
    pub fn close(self) {
        drop(self);
    }

    /// Pull the next decoded picture, feeding packets as needed
    fn decode_next(&mut self) -> Result<Option<ffmpeg::frame::Video>> {
        loop {
            let mut frame = ffmpeg::frame::Video::empty();
            match self.decoder.receive_frame(&mut frame) {
                Ok(()) => return Ok(Some(frame)),
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                    if self.eof_sent {
                        return Ok(None);
                    }
                }
                Err(e) => {
                    return Err(FfmpegError::ReadFrame(format!(
                        "receive_frame error on stream {}: {}",
                        self.stream_index, e
                    ))
                    .into())
                }
            }

            self.feed_packet()?;
        }
    }

    /// Send the next packet of our stream to the decoder, or EOF
    fn feed_packet(&mut self) -> Result<()> {
        loop {
            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) if packet.stream() != self.stream_index => continue,
                Ok(()) => {
                    return match self.decoder.send_packet(&packet) {
                        Ok(()) => Ok(()),
                        // Corrupt packet: drop it and keep decoding
                        Err(ffmpeg::Error::InvalidData) => {
                            tracing::debug!(
                                stream_index = self.stream_index,
                                "send_packet: skipping invalid packet"
                            );
                            Ok(())
                        }
                        Err(e) => Err(FfmpegError::DecodePacket(format!(
                            "send_packet error on stream {}: {}",
                            self.stream_index, e
                        ))
                        .into()),
                    };
                }
                Err(ffmpeg::Error::Eof) => {
                    self.eof_sent = true;
                    return match self.decoder.send_eof() {
                        Ok(()) | Err(ffmpeg::Error::Eof) => Ok(()),
                        Err(e) => Err(FfmpegError::DecodePacket(format!(
                            "send_eof error on stream {}: {}",
                            self.stream_index, e
                        ))
                        .into()),
                    };
                }
                Err(e) => {
                    return Err(FfmpegError::ReadFrame(format!(
                        "Failed to read packet: {}",
                        e
                    ))
                    .into())
                }
            }
        }
    }
}

impl FrameSource for VideoSession {
    type Frame = DecodedFrame;

    fn total_frames(&self) -> u64 {
        self.total_frames
    }

    fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    fn rotation(&self) -> Rotation {
        self.rotation
    }

    fn next_frame(&mut self) -> Result<Option<DecodedFrame>> {
        Ok(self.decode_next()?.map(|inner| DecodedFrame { inner }))
    }

    fn skip_frame(&mut self) -> Result<bool> {
        Ok(self.decode_next()?.is_some())
    }

    fn materialize(&mut self, frame: &DecodedFrame) -> Result<RgbImage> {
        let source = &frame.inner;
        let (width, height) = (source.width(), source.height());

        let stale = self.scaler.as_ref().map_or(true, |s| {
            s.input().width != width
                || s.input().height != height
                || s.input().format != source.format()
        });
        if stale {
            self.scaler = Some(
                ScalingContext::get(
                    source.format(),
                    width,
                    height,
                    Pixel::RGB24,
                    width,
                    height,
                    ScalingFlags::BILINEAR,
                )
                .map_err(|e| FfmpegError::Scale(format!("Failed to create scaler: {}", e)))?,
            );
        }

        let mut rgb = ffmpeg::frame::Video::empty();
        if let Some(scaler) = self.scaler.as_mut() {
            scaler
                .run(source, &mut rgb)
                .map_err(|e| FfmpegError::Scale(format!("Failed to convert frame: {}", e)))?;
        }

        let buffer = packed_rows(rgb.data(0), rgb.stride(0), width as usize * 3, height as usize);
        RgbImage::from_raw(width, height, buffer).ok_or_else(|| {
            FfmpegError::Scale("Converted frame does not match its dimensions".to_string()).into()
        })
    }
}

impl Drop for VideoSession {
    fn drop(&mut self) {
        tracing::debug!("Closed decoder session for {:?}", self.source_path);
    }
}

/// Copy `height` rows of `row_bytes` out of a strided plane
fn packed_rows(data: &[u8], stride: usize, row_bytes: usize, height: usize) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(row_bytes * height);
    for row in data.chunks(stride).take(height) {
        buffer.extend_from_slice(&row[..row_bytes.min(row.len())]);
    }
    buffer
}

/// Container duration in milliseconds, falling back to the stream's own
fn container_duration_ms(input: &ffmpeg::format::context::Input, stream: &ffmpeg::Stream) -> u64 {
    let duration = input.duration();
    if duration > 0 {
        return (duration / (ffmpeg::ffi::AV_TIME_BASE as i64 / 1000)) as u64;
    }

    let tb = stream.time_base();
    if stream.duration() > 0 && tb.denominator() != 0 {
        return (stream.duration() as i128 * tb.numerator() as i128 * 1000
            / tb.denominator() as i128) as u64;
    }
    0
}

/// Display matrix side data of the stream's codec parameters, if any
fn display_matrix(stream: &ffmpeg::Stream) -> Option<[i32; 9]> {
    const MATRIX_BYTES: usize = 9 * std::mem::size_of::<i32>();

    // SAFETY: the stream and its codec parameters live as long as the input
    // context borrowed by `stream`; the side data is only read here.
    let bytes = unsafe {
        let parameters = (*stream.as_ptr()).codecpar;
        if parameters.is_null() {
            return None;
        }
        let side = ffmpeg::ffi::av_packet_side_data_get(
            (*parameters).coded_side_data,
            (*parameters).nb_coded_side_data,
            ffmpeg::ffi::AVPacketSideDataType::AV_PKT_DATA_DISPLAYMATRIX,
        );
        if side.is_null() || (*side).data.is_null() || ((*side).size as usize) < MATRIX_BYTES {
            return None;
        }
        std::slice::from_raw_parts((*side).data, MATRIX_BYTES)
    };

    Some(matrix_from_bytes(bytes))
}

/// Decode nine native-endian `i32` cells
fn matrix_from_bytes(bytes: &[u8]) -> [i32; 9] {
    std::array::from_fn(|i| {
        let cell = &bytes[i * 4..i * 4 + 4];
        i32::from_ne_bytes([cell[0], cell[1], cell[2], cell[3]])
    })
}

/// Frame count from the container, or estimated from duration and rate
fn frame_count(stream: &ffmpeg::Stream, duration_ms: u64) -> u64 {
    if stream.frames() > 0 {
        return stream.frames() as u64;
    }

    let rate = stream.avg_frame_rate();
    if rate.numerator() <= 0 || rate.denominator() <= 0 {
        return 0;
    }
    let estimate = duration_ms as u128 * rate.numerator() as u128 / (rate.denominator() as u128 * 1000);
    tracing::debug!(estimate, "Container has no frame count, estimating from frame rate");
    estimate as u64
}
