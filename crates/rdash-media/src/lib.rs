//! FFmpeg wrapper and local file handling for video analysis.
//!
//! This crate provides:
//! - FFprobe stream probing
//! - Interval-based frame sampling with a second-stage image cap
//! - Scoped temporary video files with a stale-file sweep
//! - Streaming download of remote videos

pub mod command;
pub mod download;
pub mod error;
pub mod frames;
pub mod probe;
pub mod temp;

pub use command::{check_ffmpeg, check_ffprobe};
pub use download::{download_video, is_supported_url, DownloadOptions};
pub use error::{MediaError, MediaResult};
pub use frames::{frame_stride, select_evenly, select_indices, Frame, FrameSampler, SampledVideo, SamplerConfig};
pub use probe::{probe_video, VideoInfo};
pub use temp::{
    has_allowed_extension, mime_type_for, sanitize_filename, sweep_stale_files, SweepReport,
    TempVideo, ALLOWED_EXTENSIONS,
};
