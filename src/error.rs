use thiserror::Error;

/// Main error type for video-to-document conversion
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] FfmpegError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Malformed timecode: {0:?}")]
    MalformedTimecode(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Subtitle parse error at line {line}: {reason}")]
    SubtitleParse { line: usize, reason: String },

    #[error("Subtitle track is empty")]
    TrackEmpty,

    #[error("Internal inconsistency: {0}")]
    InternalInconsistency(String),

    #[error("Font error: {0}")]
    Font(String),

    #[error("Document write error: {0}")]
    Write(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{failed} of {total} conversions failed")]
    ConversionsFailed { failed: usize, total: usize },
}

/// FFmpeg-specific errors
#[derive(Error, Debug)]
pub enum FfmpegError {
    #[error("FFmpeg initialization failed: {0}")]
    InitFailed(String),

    #[error("Failed to open input file: {0}")]
    OpenInput(String),

    #[error("No video stream found in source file")]
    NoVideoStream,

    #[error("Failed to create decoder: {0}")]
    DecoderCreate(String),

    #[error("Failed to decode packet: {0}")]
    DecodePacket(String),

    #[error("Failed to read frame: {0}")]
    ReadFrame(String),

    #[error("Failed to convert frame: {0}")]
    Scale(String),
}

impl ConvertError {
    /// Whether the error is the decoder failing to open the source
    pub fn is_decoder_open(&self) -> bool {
        matches!(
            self,
            ConvertError::Ffmpeg(
                FfmpegError::OpenInput(_) | FfmpegError::NoVideoStream | FfmpegError::DecoderCreate(_)
            )
        )
    }

    /// Whether the error happened while pulling frames mid-pass
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            ConvertError::Ffmpeg(
                FfmpegError::DecodePacket(_) | FfmpegError::ReadFrame(_) | FfmpegError::Scale(_)
            )
        )
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ConvertError>;
