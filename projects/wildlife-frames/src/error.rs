use std::path::PathBuf;
use thiserror::Error;

/// Domain errors that callers need to tell apart.
///
/// Batch stages inspect these (via `anyhow::Error::downcast_ref`) to decide
/// between skip-and-continue and aborting the run.
#[derive(Debug, Error)]
pub enum CurateError {
    #[error("video file not found: {0}")]
    VideoNotFound(PathBuf),

    #[error("failed to open video {path}: {reason}")]
    VideoOpen { path: PathBuf, reason: String },

    #[error("more than one entry for video '{filename}' under label '{label}'")]
    AmbiguousEntry { filename: String, label: String },

    #[error("entry for video '{filename}' under label '{label}' has no start/end")]
    MissingInterval { filename: String, label: String },

    #[error("video '{video_name}' was already extracted under label '{first_label}'")]
    DuplicateVideo {
        video_name: String,
        first_label: String,
    },

    #[error("sheet {sheet} is missing required column '{column}'")]
    MissingColumn { sheet: String, column: String },

    #[error("unknown transform '{0}'")]
    UnknownTransform(String),

    #[error("invalid parameters for transform '{name}': {reason}")]
    InvalidTransformParams { name: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("test split size must be within [0, 1], got {0}")]
    InvalidSplitSize(f64),

    #[error("no frames recorded for video '{0}'")]
    NoFramesForVideo(String),

    #[error("invalid frame record: {0}")]
    InvalidFrameRecord(String),
}

impl CurateError {
    /// Errors that only affect a single video and must not abort a batch.
    pub fn is_per_video(&self) -> bool {
        matches!(
            self,
            CurateError::VideoNotFound(_)
                | CurateError::VideoOpen { .. }
                | CurateError::AmbiguousEntry { .. }
                | CurateError::MissingInterval { .. }
                | CurateError::DuplicateVideo { .. }
        )
    }
}
