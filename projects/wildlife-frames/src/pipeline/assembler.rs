// Dataset assembler: turns annotated raw videos into the frame tree plus
// its ledger.
//
// Each label config is processed in turn. Per video the extractor streams
// sampled frames; every frame is written to
// `dataset/{video_name}/{video_name}___{frame_ind}.jpeg` and gets its ledger
// row right after the write succeeds, so the tree and the ledger stay in
// step even when decoding fails half way through a video. A video directory
// left by an earlier run is cleared before the video is extracted again.

use crate::config::{DatasetConfig, LabelConfig, BACKGROUND_CLASS};
use crate::error::CurateError;
use crate::ledger::{
    dataset_dir, ledger_path, verify_frame_tree, FrameLedger, FrameRecord, IntegrityReport,
};
use crate::pipeline::extractor::for_each_sampled_frame;
use crate::pipeline::timespan::frames_in_timespan;
use crate::pipeline::types::LabelSummary;
use crate::sheets::{rows_for_label, VideoRecord};
use crate::video::processor::batch_progress;
use crate::video::VideoSource;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

pub const METADATA_FILE_NAME: &str = "metadata.json";

/// Ledger rows produced for one label config.
#[derive(Debug, Default)]
pub struct LabelFragment {
    pub records: Vec<FrameRecord>,
    pub summary: LabelSummary,
}

/// Summary of a dataset assembly run, persisted as `metadata.json`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DatasetMetadata {
    pub created_at: DateTime<Utc>,
    pub frame_count: usize,
    pub video_count: usize,
    pub labels: Vec<LabelConfig>,
}

#[derive(Debug)]
pub struct AssemblyReport {
    pub labels: Vec<LabelSummary>,
    pub frame_count: usize,
    pub ledger_path: PathBuf,
    /// Tree check after the ledger was written. Frames of videos that were
    /// not part of this run show up as orphans.
    pub integrity: IntegrityReport,
}

enum VideoOutcome {
    Written,
    Missing,
    Failed,
}

/// Extracts frames for one label config at a time while remembering which
/// videos were already written, since frame paths do not include the label.
pub struct DatasetAssembler<'a> {
    source: &'a dyn VideoSource,
    dataset_dir: PathBuf,
    extracted: HashMap<String, String>,
}

impl<'a> DatasetAssembler<'a> {
    pub fn new(source: &'a dyn VideoSource, dataset_dir: &Path) -> Self {
        Self {
            source,
            dataset_dir: dataset_dir.to_path_buf(),
            extracted: HashMap::new(),
        }
    }

    /// Processes every row of `video_records` annotated with
    /// `label_config.name`. Videos are looked up at
    /// `src_video_dir/{folder}/{filename}`. Problems with a single video
    /// are logged and counted; only failures that affect the whole run
    /// (e.g. an unwritable destination) are returned as errors.
    pub fn split_video_files_to_frame_files(
        &mut self,
        src_video_dir: &Path,
        video_records: &[VideoRecord],
        label_config: &LabelConfig,
    ) -> Result<LabelFragment> {
        let rows = rows_for_label(video_records, &label_config.name);

        let mut occurrences: HashMap<&str, usize> = HashMap::new();
        for row in rows.iter().copied() {
            *occurrences.entry(row.filename.as_str()).or_default() += 1;
        }

        let mut fragment = LabelFragment {
            records: Vec::new(),
            summary: LabelSummary {
                label: label_config.name.clone(),
                ..Default::default()
            },
        };

        fs::create_dir_all(&self.dataset_dir)
            .with_context(|| format!("Failed to create {:?}", self.dataset_dir))?;

        let pb = batch_progress(occurrences.len() as u64, &label_config.name)?;
        let mut handled: BTreeSet<&str> = BTreeSet::new();

        for row in rows {
            if !handled.insert(row.filename.as_str()) {
                continue;
            }
            pb.inc(1);

            let result = if occurrences[row.filename.as_str()] > 1 {
                Err(CurateError::AmbiguousEntry {
                    filename: row.filename.clone(),
                    label: label_config.name.clone(),
                }
                .into())
            } else {
                self.process_video(src_video_dir, row, label_config, &mut fragment)
            };

            match result {
                Ok(VideoOutcome::Written) => fragment.summary.videos_processed += 1,
                Ok(VideoOutcome::Missing) => fragment.summary.videos_missing += 1,
                Ok(VideoOutcome::Failed) => fragment.summary.videos_failed += 1,
                Err(e) => match e.downcast_ref::<CurateError>() {
                    Some(err) if err.is_per_video() => {
                        tracing::warn!("Skipping {}: {}", row.filename, err);
                        fragment.summary.videos_failed += 1;
                    }
                    _ => {
                        pb.abandon();
                        return Err(e);
                    }
                },
            }
        }
        pb.finish_and_clear();

        tracing::info!(
            "Label {}: {} videos processed, {} missing, {} failed, {} frames ({} target)",
            label_config.name,
            fragment.summary.videos_processed,
            fragment.summary.videos_missing,
            fragment.summary.videos_failed,
            fragment.summary.frames_written,
            fragment.summary.target_frames
        );

        Ok(fragment)
    }

    fn process_video(
        &mut self,
        src_video_dir: &Path,
        row: &VideoRecord,
        label_config: &LabelConfig,
        fragment: &mut LabelFragment,
    ) -> Result<VideoOutcome> {
        let video_name = row.video_name();
        if let Some(first_label) = self.extracted.get(&video_name) {
            return Err(CurateError::DuplicateVideo {
                video_name,
                first_label: first_label.clone(),
            }
            .into());
        }

        let video_path = src_video_dir.join(&row.folder).join(&row.filename);
        let mut reader = match self.source.open(&video_path) {
            Ok(reader) => reader,
            Err(CurateError::VideoNotFound(path)) => {
                tracing::info!("Video {:?} not found, skipping", path);
                return Ok(VideoOutcome::Missing);
            }
            Err(e) => return Err(e.into()),
        };

        let frames_with_target = if label_config.is_target {
            let (start, end) = match (row.start, row.end) {
                (Some(start), Some(end)) => (start, end),
                _ => {
                    return Err(CurateError::MissingInterval {
                        filename: row.filename.clone(),
                        label: label_config.name.clone(),
                    }
                    .into())
                }
            };
            let fps = reader.source_fps().map_err(|e| CurateError::VideoOpen {
                path: video_path.clone(),
                reason: e.to_string(),
            })?;
            frames_in_timespan(start, end, fps)
        } else {
            BTreeSet::new()
        };

        tracing::debug!(
            "Extracting {} (~{} frames, {} target frames, every {} frame)",
            video_name,
            reader.frame_count().unwrap_or_default(),
            frames_with_target.len(),
            label_config.sampling_frequency
        );

        let video_dir = self.dataset_dir.join(&video_name);
        if video_dir.exists() {
            tracing::debug!("Clearing frames of a previous run in {:?}", video_dir);
            fs::remove_dir_all(&video_dir)
                .with_context(|| format!("Failed to clear {:?}", video_dir))?;
        }
        fs::create_dir_all(&video_dir)
            .with_context(|| format!("Failed to create {:?}", video_dir))?;
        self.extracted
            .insert(video_name.clone(), label_config.name.clone());

        let mut written: Vec<FrameRecord> = Vec::new();
        let result = for_each_sampled_frame(
            reader.as_mut(),
            &frames_with_target,
            label_config.sampling_frequency,
            |frame_ind, frame| {
                let target = if frame.contains_target {
                    label_config.name.as_str()
                } else {
                    BACKGROUND_CLASS
                };
                let record = FrameRecord::new(&video_name, frame_ind, target, &label_config.name)?;
                let image_path = video_dir.join(record.file_name());
                frame
                    .image
                    .save(&image_path)
                    .with_context(|| format!("Failed to write frame {:?}", image_path))?;
                written.push(record);
                Ok(())
            },
        );

        fragment.summary.frames_written += written.len();
        fragment.summary.target_frames += written
            .iter()
            .filter(|r| r.target() != BACKGROUND_CLASS)
            .count();
        fragment.records.append(&mut written);

        match result {
            Ok(stats) => {
                tracing::debug!(
                    "Decoded {} frames of {} in {:.2?}",
                    stats.processed_frames,
                    video_name,
                    stats.duration
                );
                Ok(VideoOutcome::Written)
            }
            Err(e) => {
                tracing::warn!(
                    "Extraction of {} stopped early, keeping frames written so far: {:#}",
                    video_name,
                    e
                );
                Ok(VideoOutcome::Failed)
            }
        }
    }
}

/// Single-label form of the assembler, for callers that extract one label
/// into its own frame root.
pub fn split_video_files_to_frame_files(
    src_video_dir: &Path,
    video_records: &[VideoRecord],
    dst_frame_dir: &Path,
    label_config: &LabelConfig,
    source: &dyn VideoSource,
) -> Result<LabelFragment> {
    DatasetAssembler::new(source, &dataset_dir(dst_frame_dir)).split_video_files_to_frame_files(
        src_video_dir,
        video_records,
        label_config,
    )
}

/// Runs the assembler for every configured label and writes the merged
/// ledger and `metadata.json` next to the `dataset` directory.
///
/// Raw videos are expected at `src_video_dir/{label}/{folder}/{filename}`.
pub fn create_frame_image_dataset(
    config: &DatasetConfig,
    video_records: &[VideoRecord],
    src_video_dir: &Path,
    dst_frame_dir: &Path,
    source: &dyn VideoSource,
) -> Result<AssemblyReport> {
    let mut assembler = DatasetAssembler::new(source, &dataset_dir(dst_frame_dir));
    let mut ledger = FrameLedger::new();
    let mut summaries = Vec::new();

    for label_config in &config.labels {
        tracing::info!("Processing video files for label {}", label_config.name);
        let fragment = assembler.split_video_files_to_frame_files(
            &src_video_dir.join(&label_config.name),
            video_records,
            label_config,
        )?;
        ledger.append(fragment.records)?;
        summaries.push(fragment.summary);
    }

    let path = ledger_path(dst_frame_dir);
    ledger.write(&path)?;

    let metadata = DatasetMetadata {
        created_at: Utc::now(),
        frame_count: ledger.len(),
        video_count: ledger.distinct_video_names().len(),
        labels: config.labels.clone(),
    };
    let metadata_path = dst_frame_dir.join(METADATA_FILE_NAME);
    fs::write(&metadata_path, serde_json::to_string_pretty(&metadata)?)
        .with_context(|| format!("Failed to write {:?}", metadata_path))?;

    tracing::info!(
        "Wrote {} frames from {} videos to {:?}",
        metadata.frame_count,
        metadata.video_count,
        dst_frame_dir
    );

    let integrity = verify_frame_tree(dst_frame_dir)?;

    Ok(AssemblyReport {
        labels: summaries,
        frame_count: ledger.len(),
        ledger_path: path,
        integrity,
    })
}
