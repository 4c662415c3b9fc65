//! Activity segment models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One labeled time interval of robot activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Segment {
    /// Start of the interval, seconds from video start
    pub start_time: f64,

    /// End of the interval, seconds from video start
    pub end_time: f64,

    /// What the robot is doing during the interval
    pub description: String,
}

impl Segment {
    /// Create a new segment.
    ///
    /// Reversed bounds are swapped so that `start_time <= end_time` holds.
    pub fn new(start_time: f64, end_time: f64, description: impl Into<String>) -> Self {
        let (start_time, end_time) = if start_time <= end_time {
            (start_time, end_time)
        } else {
            (end_time, start_time)
        };

        Self {
            start_time,
            end_time,
            description: description.into(),
        }
    }

    /// Length of the segment in seconds.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// The response contract returned for every analysis request.
///
/// An empty segment list is a valid result meaning that no activity was
/// identified or that the analysis could not be completed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisResult {
    pub segments: Vec<Segment>,
}

impl AnalysisResult {
    /// Create a result from a list of segments.
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// An empty, well-formed result.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether segments are ordered by start time.
    ///
    /// Model output is expected to be chronological but this is never
    /// enforced; callers may use this to log suspicious responses.
    pub fn is_chronological(&self) -> bool {
        self.segments
            .windows(2)
            .all(|w| w[0].start_time <= w[1].start_time)
    }
}

impl From<Vec<Segment>> for AnalysisResult {
    fn from(segments: Vec<Segment>) -> Self {
        Self::new(segments)
    }
}
