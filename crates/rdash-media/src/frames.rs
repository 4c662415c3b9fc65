//! Interval-based frame sampling.
//!
//! Backends that only accept still images get a bounded, evenly spaced set
//! of frames. Sampling happens in two stages:
//!
//! 1. [`FrameSampler::sample`] decodes one frame every `floor(fps * interval)`
//!    frames of playback.
//! 2. [`select_evenly`] caps the sampled set at a backend's image limit with
//!    an even stride starting at the first frame.
//!
//! Whole-video backends never see the images, only their count and timing,
//! so [`FrameSampler::for_mode`] decodes placeholders for them.

use std::io::Cursor;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage};
use rdash_models::SubmissionMode;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::command::{check_ffmpeg, sampling_args, scaled_dimensions};
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_video, VideoInfo};

/// JPEG quality used when frames are submitted to a model.
const JPEG_QUALITY: u8 = 85;

/// Width of placeholder frames decoded when only frame timing is needed.
const TIMING_ONLY_WIDTH: u32 = 2;

/// A decoded RGB frame and its position in the video.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    /// Seconds from video start
    pub timestamp: f64,
}

impl Frame {
    pub fn new(image: RgbImage, timestamp: f64) -> Self {
        Self { image, timestamp }
    }

    /// Encode the frame as JPEG.
    pub fn to_jpeg(&self) -> MediaResult<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
        encoder.encode(
            self.image.as_raw(),
            self.image.width(),
            self.image.height(),
            ColorType::Rgb8,
        )?;
        Ok(buffer.into_inner())
    }

    /// Encode the frame as base64 JPEG, as expected by image-input APIs.
    pub fn to_jpeg_base64(&self) -> MediaResult<String> {
        Ok(BASE64.encode(self.to_jpeg()?))
    }
}

/// Output of the first sampling stage.
#[derive(Debug, Clone, Default)]
pub struct SampledVideo {
    /// Frames in non-decreasing timestamp order
    pub frames: Vec<Frame>,
    /// Source frame rate
    pub fps: f64,
    /// Source frames between consecutive samples
    pub stride: usize,
}

impl SampledVideo {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Timestamp of the last sampled frame, 0 when nothing was sampled.
    pub fn last_timestamp(&self) -> f64 {
        self.frames.last().map(|f| f.timestamp).unwrap_or(0.0)
    }

    /// Second-stage cap: at most `max_images` frames at an even stride.
    pub fn capped(&self, max_images: usize) -> Vec<&Frame> {
        select_evenly(&self.frames, max_images)
    }
}

/// Frame sampler configuration.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Target spacing between sampled frames, in seconds
    pub interval_secs: f64,
    /// Frames wider than this are scaled down
    pub max_width: u32,
    /// Decoding stops once this many frames have been sampled
    pub max_frames: usize,
    /// Upper bound on a single decode
    pub decode_timeout: Duration,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 1.0,
            max_width: 512,
            max_frames: 1800,
            decode_timeout: Duration::from_secs(300),
        }
    }
}

/// Samples frames from local video files using FFmpeg.
#[derive(Debug, Clone, Default)]
pub struct FrameSampler {
    config: SamplerConfig,
}

impl FrameSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Sampler suited to a submission mode.
    ///
    /// Whole-video submission only uses the count and timestamps of sampled
    /// frames, so frames are decoded as tiny placeholders instead of
    /// full-size images.
    pub fn for_mode(&self, mode: SubmissionMode) -> FrameSampler {
        if mode.uses_frames() {
            return self.clone();
        }
        FrameSampler::new(SamplerConfig {
            max_width: TIMING_ONLY_WIDTH,
            ..self.config.clone()
        })
    }

    /// Sample one frame roughly every `interval_secs` of playback.
    ///
    /// Never fails: a video that cannot be opened, reports no frames or
    /// cannot be decoded yields an empty [`SampledVideo`].
    pub async fn sample(&self, video_path: impl AsRef<Path>) -> SampledVideo {
        let video_path = video_path.as_ref();
        let start = Instant::now();

        let info = match probe_video(video_path).await {
            Ok(info) => info,
            Err(e) => {
                warn!(path = %video_path.display(), "Failed to probe video: {}", e);
                return SampledVideo::empty();
            }
        };

        if !info.is_decodable() {
            warn!(
                path = %video_path.display(),
                fps = info.fps,
                frames = ?info.frame_count,
                "Video reports no decodable frames"
            );
            return SampledVideo::empty();
        }

        match self.decode(video_path, &info).await {
            Ok(sampled) => {
                info!(
                    path = %video_path.display(),
                    frames = sampled.len(),
                    stride = sampled.stride,
                    fps = sampled.fps,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Sampled video frames"
                );
                metrics::histogram!("rdash_sampled_frames").record(sampled.len() as f64);
                sampled
            }
            Err(e) => {
                warn!(path = %video_path.display(), "Frame decoding failed: {}", e);
                SampledVideo::empty()
            }
        }
    }

    async fn decode(&self, video_path: &Path, info: &VideoInfo) -> MediaResult<SampledVideo> {
        check_ffmpeg()?;

        let stride = frame_stride(info.fps, self.config.interval_secs);
        // FFmpeg applies rotation metadata before the scale filter
        let (display_width, display_height) = info.display_dimensions();
        let (width, height) = scaled_dimensions(display_width, display_height, self.config.max_width);
        let layout = RawFrameLayout {
            width,
            height,
            stride,
            fps: info.fps,
            max_frames: self.config.max_frames,
        };

        let args = sampling_args(&video_path.to_string_lossy(), stride, width, height);
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::ffmpeg_failed(format!("Failed to spawn FFmpeg: {}", e), None, None))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("Failed to capture FFmpeg stdout", None, None))?;

        let mut frames = Vec::new();
        let read_all = layout.read_into(&mut stdout, &mut frames);
        let outcome = tokio::time::timeout(self.config.decode_timeout, read_all).await;

        match outcome {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    timeout_secs = self.config.decode_timeout.as_secs(),
                    sampled = frames.len(),
                    "Frame decoding timed out, keeping frames sampled so far"
                );
            }
        }

        // The process is no longer needed once stdout is drained or abandoned
        let _ = child.kill().await;

        Ok(SampledVideo {
            frames,
            fps: info.fps,
            stride,
        })
    }
}

/// Shape of the raw RGB stream FFmpeg writes to stdout.
#[derive(Debug, Clone, Copy)]
struct RawFrameLayout {
    width: u32,
    height: u32,
    stride: usize,
    fps: f64,
    max_frames: usize,
}

impl RawFrameLayout {
    fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Read whole frames until EOF or `max_frames`.
    ///
    /// Frames are pushed as they arrive, so a caller that stops waiting keeps
    /// what was read. A trailing partial frame is discarded.
    async fn read_into<R>(&self, reader: &mut R, frames: &mut Vec<Frame>) -> MediaResult<()>
    where
        R: AsyncRead + Unpin,
    {
        let frame_size = self.frame_size();
        if frame_size == 0 {
            return Err(MediaError::InvalidVideo("Frame size is zero".to_string()));
        }

        loop {
            if frames.len() >= self.max_frames {
                warn!(max_frames = self.max_frames, "Frame limit reached, stopping decode");
                return Ok(());
            }

            let mut buffer = vec![0u8; frame_size];
            match reader.read_exact(&mut buffer).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(MediaError::from(e)),
            }

            let index = frames.len();
            let image = RgbImage::from_raw(self.width, self.height, buffer).ok_or_else(|| {
                MediaError::InvalidVideo("Decoded frame has unexpected size".to_string())
            })?;
            frames.push(Frame::new(image, sample_timestamp(index, self.stride, self.fps)));
        }
    }
}

/// Source frames between consecutive samples: `floor(fps * interval)`, at least 1.
pub fn frame_stride(fps: f64, interval_secs: f64) -> usize {
    let stride = (fps * interval_secs).floor();
    if stride.is_finite() && stride >= 1.0 {
        stride as usize
    } else {
        1
    }
}

/// Timestamp of the `index`-th sampled frame.
fn sample_timestamp(index: usize, stride: usize, fps: f64) -> f64 {
    (index * stride) as f64 / fps
}

/// Indices of at most `max` items chosen with stride `floor(n / max)` from index 0.
///
/// When `n <= max` (or `max == 0`, meaning no cap) every index is kept.
pub fn select_indices(n: usize, max: usize) -> Vec<usize> {
    if max == 0 || n <= max {
        return (0..n).collect();
    }

    let step = n / max;
    (0..n).step_by(step).take(max).collect()
}

/// Pick at most `max` items at an even stride, preserving order.
pub fn select_evenly<T>(items: &[T], max: usize) -> Vec<&T> {
    select_indices(items.len(), max)
        .into_iter()
        .map(|i| &items[i])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_frame_stride() {
        assert_eq!(frame_stride(30.0, 1.0), 30);
        assert_eq!(frame_stride(29.97, 1.0), 29);
        assert_eq!(frame_stride(2.0, 1.0), 2);
        assert_eq!(frame_stride(24.0, 0.5), 12);
        // Sub-frame intervals still advance
        assert_eq!(frame_stride(0.5, 1.0), 1);
        assert_eq!(frame_stride(f64::NAN, 1.0), 1);
    }

    #[test]
    fn test_sample_timestamps() {
        assert_eq!(sample_timestamp(0, 2, 2.0), 0.0);
        assert_eq!(sample_timestamp(3, 2, 2.0), 3.0);
        assert!((sample_timestamp(1, 29, 29.97) - 0.967_634).abs() < 1e-5);
    }

    #[test]
    fn test_select_indices_stride() {
        assert_eq!(select_indices(10, 5), vec![0, 2, 4, 6, 8]);
        assert_eq!(select_indices(25, 10), vec![0, 2, 4, 6, 8, 10, 12, 14, 16, 18]);
        assert_eq!(select_indices(31, 15), (0..15).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_select_indices_passthrough() {
        assert_eq!(select_indices(3, 10), vec![0, 1, 2]);
        assert_eq!(select_indices(10, 10), (0..10).collect::<Vec<_>>());
        assert_eq!(select_indices(4, 0), vec![0, 1, 2, 3]);
        assert!(select_indices(0, 5).is_empty());
    }

    #[test]
    fn test_capped_preserves_frames() {
        let sampled = SampledVideo {
            frames: (0..10)
                .map(|i| Frame::new(RgbImage::new(2, 2), i as f64))
                .collect(),
            fps: 2.0,
            stride: 2,
        };

        let capped: Vec<f64> = sampled.capped(5).iter().map(|f| f.timestamp).collect();
        assert_eq!(capped, vec![0.0, 2.0, 4.0, 6.0, 8.0]);
        assert_eq!(sampled.last_timestamp(), 9.0);
    }

    #[test]
    fn test_frame_jpeg_encoding() {
        let frame = Frame::new(RgbImage::from_pixel(8, 8, image::Rgb([200, 10, 10])), 0.0);
        let jpeg = frame.to_jpeg().unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let encoded = frame.to_jpeg_base64().unwrap();
        assert_eq!(BASE64.decode(encoded).unwrap(), jpeg);
    }

    #[tokio::test]
    async fn test_sample_missing_file_is_empty() {
        let sampled = FrameSampler::default().sample("/nonexistent/video.mp4").await;
        assert!(sampled.is_empty());
    }

    #[tokio::test]
    async fn test_sample_non_video_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("not_a_video.mp4");
        tokio::fs::write(&path, b"definitely not a video").await.unwrap();

        let sampled = FrameSampler::default().sample(&path).await;
        assert!(sampled.is_empty());
    }

    fn layout(max_frames: usize) -> RawFrameLayout {
        RawFrameLayout {
            width: 4,
            height: 2,
            stride: 2,
            fps: 2.0,
            max_frames,
        }
    }

    /// Raw RGB stream of `count` 4x2 frames, frame `j` filled with byte `j`.
    fn raw_stream(count: usize, trailing: usize) -> Vec<u8> {
        let mut stream: Vec<u8> = (0..count)
            .flat_map(|j| std::iter::repeat(j as u8).take(4 * 2 * 3))
            .collect();
        stream.extend(std::iter::repeat(0xAA).take(trailing));
        stream
    }

    /// Ten seconds at 2 fps sampled every second gives one frame per second.
    #[tokio::test]
    async fn test_read_whole_frames_until_eof() {
        let stream = raw_stream(10, 0);
        let mut frames = Vec::new();
        layout(1800).read_into(&mut stream.as_slice(), &mut frames).await.unwrap();

        assert_eq!(frames.len(), 10);
        let timestamps: Vec<f64> = frames.iter().map(|f| f.timestamp).collect();
        assert_eq!(timestamps, (0..10).map(|j| j as f64).collect::<Vec<_>>());
        assert_eq!(frames[3].image.dimensions(), (4, 2));
        assert_eq!(frames[3].image.get_pixel(3, 1), &image::Rgb([3, 3, 3]));
    }

    #[tokio::test]
    async fn test_read_discards_partial_trailing_frame() {
        let stream = raw_stream(3, 7);
        let mut frames = Vec::new();
        layout(1800).read_into(&mut stream.as_slice(), &mut frames).await.unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].image.get_pixel(0, 0), &image::Rgb([2, 2, 2]));
    }

    #[tokio::test]
    async fn test_read_stops_at_frame_limit() {
        let stream = raw_stream(10, 0);
        let mut frames = Vec::new();
        layout(4).read_into(&mut stream.as_slice(), &mut frames).await.unwrap();

        assert_eq!(frames.len(), 4);
        assert_eq!(frames[3].timestamp, 3.0);
    }

    #[tokio::test]
    async fn test_read_empty_stream() {
        let mut frames = Vec::new();
        layout(1800).read_into(&mut &b""[..], &mut frames).await.unwrap();
        assert!(frames.is_empty());

        let zero = RawFrameLayout { width: 0, ..layout(1800) };
        assert!(zero.read_into(&mut &b""[..], &mut frames).await.is_err());
    }

    #[test]
    fn test_sampler_for_mode() {
        let sampler = FrameSampler::default();
        let framed = sampler.for_mode(SubmissionMode::Frames { max_images: 10 });
        assert_eq!(framed.config().max_width, 512);

        let timing = sampler.for_mode(SubmissionMode::WholeVideo);
        assert_eq!(timing.config().max_width, TIMING_ONLY_WIDTH);
        assert_eq!(timing.config().max_frames, sampler.config().max_frames);
        assert_eq!(scaled_dimensions(1920, 1080, TIMING_ONLY_WIDTH), (2, 2));
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg and ffprobe on PATH"]
    async fn test_sample_generated_video() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("testsrc.mp4");
        let status = Command::new("ffmpeg")
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-f",
                "lavfi",
                "-i",
                "testsrc=duration=10:size=64x48:rate=2",
                "-pix_fmt",
                "yuv420p",
            ])
            .arg(&path)
            .status()
            .await
            .unwrap();
        assert!(status.success());

        let sampled = FrameSampler::default().sample(&path).await;
        assert_eq!(sampled.stride, 2);
        assert_eq!(sampled.len(), 10);

        let timestamps: Vec<f64> = sampled.frames.iter().map(|f| f.timestamp).collect();
        assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(timestamps[0], 0.0);
        assert!((sampled.last_timestamp() - 9.0).abs() < 1e-9);

        let capped: Vec<f64> = sampled.capped(5).iter().map(|f| f.timestamp).collect();
        assert_eq!(capped, vec![0.0, 2.0, 4.0, 6.0, 8.0]);
    }

    proptest! {
        #[test]
        fn prop_select_indices_cap(n in 0usize..500, max in 1usize..50) {
            let indices = select_indices(n, max);

            if n <= max {
                prop_assert_eq!(indices.len(), n);
            } else {
                let step = n / max;
                prop_assert_eq!(indices.len(), max);
                prop_assert_eq!(indices[0], 0);
                for (i, idx) in indices.iter().enumerate() {
                    prop_assert_eq!(*idx, i * step);
                }
            }

            prop_assert!(indices.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(indices.iter().all(|&i| i < n));
        }

        #[test]
        fn prop_timestamps_non_decreasing(fps in 1.0f64..120.0, interval in 0.1f64..5.0, count in 1usize..200) {
            let stride = frame_stride(fps, interval);
            let timestamps: Vec<f64> = (0..count).map(|i| sample_timestamp(i, stride, fps)).collect();
            prop_assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
            prop_assert_eq!(timestamps[0], 0.0);
        }
    }
}
