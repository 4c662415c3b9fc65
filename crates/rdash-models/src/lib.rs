//! Shared data models for the robotic dashcam analyzer.
//!
//! This crate provides Serde-serializable types for:
//! - Time-stamped activity segments and the analysis result contract
//! - Model backend selection and submission modes

pub mod backend;
pub mod segment;

// Re-export common types
pub use backend::{BackendKind, BackendParseError, SubmissionMode, DEFAULT_MAX_IMAGES};
pub use segment::{AnalysisResult, Segment};
