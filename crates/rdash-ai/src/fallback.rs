//! Synthetic segmentation used when a model response cannot be parsed.

use rdash_models::{AnalysisResult, Segment};

/// Upper bound on synthesized segments.
const MAX_FALLBACK_SEGMENTS: usize = 3;

/// Divide `[0, total_duration]` into equal contiguous segments.
///
/// `frame_count` is the number of frames the model was given; the segment
/// count is `min(3, frame_count / 2)`, at least 1.
pub fn fallback_segments(total_duration: f64, frame_count: usize) -> AnalysisResult {
    let total_duration = if total_duration.is_finite() && total_duration > 0.0 {
        total_duration
    } else {
        0.0
    };

    let count = (frame_count / 2).clamp(1, MAX_FALLBACK_SEGMENTS);
    let segment_duration = total_duration / count as f64;

    let segments = (0..count)
        .map(|i| {
            let start = i as f64 * segment_duration;
            // The last segment ends exactly at the total, free of rounding drift
            let end = if i + 1 == count {
                total_duration
            } else {
                (i + 1) as f64 * segment_duration
            };
            Segment::new(start, end, format!("Robot activity detected in segment {}", i + 1))
        })
        .collect();

    AnalysisResult::new(segments)
}
