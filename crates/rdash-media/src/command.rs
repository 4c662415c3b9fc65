//! FFmpeg tool discovery.

use std::path::PathBuf;

use crate::error::{MediaError, MediaResult};

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

/// Build the FFmpeg arguments that decode every `stride`-th frame as raw RGB.
///
/// Output frames are scaled to exactly `width`x`height` so the size of each
/// frame on stdout is known up front. FFmpeg autorotates before the filter
/// chain, so these must be display dimensions.
pub(crate) fn sampling_args(input: &str, stride: usize, width: u32, height: u32) -> Vec<String> {
    let filter = format!("select=not(mod(n\\,{stride})),scale={width}:{height}");

    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        input.to_string(),
        "-vf".to_string(),
        filter,
        "-vsync".to_string(),
        "vfr".to_string(),
        "-pix_fmt".to_string(),
        "rgb24".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-".to_string(),
    ]
}

/// Frame dimensions bounded by `max_width`, aspect ratio kept, height even.
pub(crate) fn scaled_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (0, 0);
    }
    if width <= max_width {
        return (width, height);
    }

    let scaled = (height as f64 * max_width as f64 / (width as f64 * 2.0)).round() as u32 * 2;
    (max_width, scaled.max(2))
}
