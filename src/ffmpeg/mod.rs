//! FFmpeg module - provides the decoder behind the frame source
//!
//! This module handles:
//! - FFmpeg initialization
//! - Filtering FFmpeg's own log output
//! - The sequential video decoder session

pub mod decoder;

pub use decoder::VideoSession;
pub use ffmpeg_next as ffmpeg;

/// Initialize FFmpeg library
///
/// This should be called once at application startup.
/// Returns an error if FFmpeg fails to initialize.
pub fn init() -> Result<(), crate::error::FfmpegError> {
    ffmpeg::init().map_err(|e| {
        crate::error::FfmpegError::InitFailed(format!("ffmpeg::init() failed: {}", e))
    })?;

    tracing::info!("FFmpeg initialized");

    Ok(())
}

/// Install a custom FFmpeg log callback that drops known-noisy messages.
///
/// Must be called after `init()` and before any conversion threads start,
/// because the log callback is global state.
pub fn install_log_filter() {
    // SAFETY: both calls only touch FFmpeg's global log state and happen
    // once at startup after `ffmpeg::init()`.
    unsafe {
        ffmpeg_next::ffi::av_log_set_level(ffmpeg_next::ffi::AV_LOG_WARNING as i32);
        ffmpeg_next::ffi::av_log_set_callback(Some(ffmpeg_log_callback));
    }
}

/// Messages that are expected while decoding and converting frames
const SUPPRESSED_MESSAGES: &[&str] = &[
    "deprecated pixel format used, make sure you did set range correctly",
    "No accelerated colorspace conversion found",
    "Could not update timestamps for skipped samples",
];

unsafe extern "C" fn ffmpeg_log_callback(
    avcl: *mut std::ffi::c_void,
    level: std::ffi::c_int,
    fmt: *const std::ffi::c_char,
    vl: ffmpeg_next::ffi::va_list,
) {
    use std::ffi::CStr;

    if level > unsafe { ffmpeg_next::ffi::av_log_get_level() } {
        return;
    }

    let mut buf = [0 as std::ffi::c_char; 1024];
    let mut print_prefix: std::ffi::c_int = 1;
    ffmpeg_next::ffi::av_log_format_line(
        avcl,
        level,
        fmt,
        vl,
        buf.as_mut_ptr(),
        buf.len() as std::ffi::c_int,
        &mut print_prefix,
    );

    let msg = CStr::from_ptr(buf.as_ptr()).to_string_lossy();
    if SUPPRESSED_MESSAGES.iter().any(|s| msg.contains(s)) {
        return;
    }

    tracing::warn!(target: "ffmpeg", "{}", msg.trim_end());
}

/// Get FFmpeg version information
pub fn version_info() -> String {
    let version = unsafe { ffmpeg_next::ffi::avformat_version() };
    format!(
        "libavformat {}.{}.{}",
        version >> 16,
        (version >> 8) & 0xff,
        version & 0xff
    )
}
