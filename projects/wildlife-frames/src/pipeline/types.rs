use image::RgbImage;
use serde::Serialize;

/// A sampled frame as produced by the extractor.
pub struct ExtractedFrame {
    pub image: RgbImage,
    pub contains_target: bool,
}

/// Outcome counters for per-item batch stages (preprocessing, filtering).
#[derive(Debug, Default, Clone, Serialize, PartialEq)]
pub struct BatchReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.failed
    }
}

/// Per-label outcome of the dataset assembler.
#[derive(Debug, Default, Clone, Serialize, PartialEq)]
pub struct LabelSummary {
    pub label: String,
    pub videos_processed: usize,
    pub videos_missing: usize,
    pub videos_failed: usize,
    pub frames_written: usize,
    pub target_frames: usize,
}

/// Outcome of the upload-format export.
#[derive(Debug, Default, Clone, Serialize, PartialEq)]
pub struct ExportReport {
    pub train_frames: usize,
    pub test_frames: usize,
    pub skipped_frames: usize,
    pub test_videos: Vec<String>,
}
