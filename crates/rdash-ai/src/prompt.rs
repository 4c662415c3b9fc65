//! Prompt construction.
//!
//! A prompt is made of three parts:
//! - task framing, replaceable by a caller-supplied prompt
//! - the per-frame timestamp list, for frame submission only
//! - the output schema directive
//!
//! The schema directive is the only thing holding the model to the expected
//! JSON shape, so it is appended to every prompt, custom or not.

use rdash_models::SubmissionMode;

/// System instruction shared by backends that take one.
pub const SYSTEM_INSTRUCTION: &str = "You are an AI assistant specialized in analyzing robotic videos. \
Your task is to identify and describe the distinct segments of robot activity in the footage provided.";

const FRAMES_FRAMING: &str = "Analyze the provided sequence of frames from a robotic dashcam video.
The frames are from a video showing a robot performing various tasks.";

const VIDEO_FRAMING: &str = "Analyze the provided video file, which contains footage from a robot's perspective or observing a robot.";

const ACTIVITY_GUIDANCE: &str = "Identify the distinct, chronologically ordered segments of activity performed by the robot, such as:
1. Robot picks up an object
2. Robot places an object
3. Robot navigates to a location
4. Robot manipulates a tool
5. Robot interacts with a human or its environment
6. Robot performs an inspection
7. Robot waits or is idle

For each identified segment, provide:
1. The start and end timestamps in seconds from the start of the video
2. A clear description of what the robot is doing";

const SCHEMA_DIRECTIVE: &str = r#"Format your response as a single valid JSON object with this structure:
{
  "segments": [
    {
      "start_time": <start_timestamp_in_seconds_float>,
      "end_time": <end_timestamp_in_seconds_float>,
      "description": "<Description of the robot's activity>"
    }
  ]
}

Only provide the JSON object with no additional text."#;

/// Builds analysis prompts, optionally with a caller-supplied task framing.
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    custom_prompt: Option<String>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the default task framing. Blank prompts are ignored.
    pub fn with_custom_prompt(mut self, custom_prompt: Option<&str>) -> Self {
        self.custom_prompt = custom_prompt
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        self
    }

    /// Prompt for the given submission mode.
    ///
    /// `timestamps` must match the submitted frames one to one; it is
    /// ignored for whole-video submission.
    pub fn build(&self, mode: SubmissionMode, timestamps: &[f64]) -> String {
        match mode {
            SubmissionMode::Frames { .. } => self.build_for_frames(timestamps),
            SubmissionMode::WholeVideo => self.build_for_video(),
        }
    }

    /// Prompt listing each submitted frame's timestamp.
    pub fn build_for_frames(&self, timestamps: &[f64]) -> String {
        let framing = self.framing(FRAMES_FRAMING);
        let frame_lines = timestamps
            .iter()
            .enumerate()
            .map(|(i, ts)| format!("Frame {}: {} seconds", i + 1, format_timestamp(*ts)))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "{framing}\n\nThe timestamps in seconds for each frame are as follows:\n{frame_lines}\n\n{SCHEMA_DIRECTIVE}"
        )
    }

    /// Prompt for a model that receives the whole video.
    pub fn build_for_video(&self) -> String {
        let framing = self.framing(VIDEO_FRAMING);
        format!("{framing}\n\n{SCHEMA_DIRECTIVE}")
    }

    fn framing(&self, intro: &str) -> String {
        match &self.custom_prompt {
            Some(custom) => custom.clone(),
            None => format!("{intro}\n\n{ACTIVITY_GUIDANCE}"),
        }
    }
}

/// Seconds as shown to the model. Whole values keep one decimal place.
pub fn format_timestamp(seconds: f64) -> String {
    if seconds.is_finite() && seconds.fract() == 0.0 {
        format!("{:.1}", seconds)
    } else {
        seconds.to_string()
    }
}
