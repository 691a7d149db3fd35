// Raw video housekeeping that happens before frame extraction: sorting the
// camera dumps into per-label directories and dropping videos where nothing
// moves.

use crate::pipeline::types::BatchReport;
use crate::sheets::VideoRecord;
use crate::video::filtering::video_is_empty;
use crate::video::processor::batch_progress;
use crate::video::VideoSource;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Copies `src_dir/{folder}/{filename}` to `dst_dir/{label}/{folder}/{filename}`
/// for every sheet row, which is the layout the dataset assembler reads.
/// Rows whose source file is missing are skipped.
pub fn copy_files_to_label_based_file_structure(
    video_records: &[VideoRecord],
    src_dir: &Path,
    dst_dir: &Path,
) -> Result<BatchReport> {
    tracing::info!("Setting up label based folder structure at {:?}", dst_dir);

    let mut report = BatchReport::default();
    let pb = batch_progress(video_records.len() as u64, "copying")?;

    for record in video_records {
        pb.inc(1);
        let src = src_dir.join(&record.folder).join(&record.filename);
        if !src.is_file() {
            tracing::debug!("Source file {:?} not found", src);
            report.skipped += 1;
            continue;
        }

        let dst_folder = dst_dir.join(&record.label).join(&record.folder);
        fs::create_dir_all(&dst_folder)
            .with_context(|| format!("Failed to create {:?}", dst_folder))?;

        match fs::copy(&src, dst_folder.join(&record.filename)) {
            Ok(_) => report.processed += 1,
            Err(e) => {
                tracing::warn!("Failed to copy {:?}: {}", src, e);
                report.failed += 1;
            }
        }
    }
    pb.finish_and_clear();

    tracing::info!(
        "Copied {} videos, {} not found, {} failed",
        report.processed,
        report.skipped,
        report.failed
    );
    Ok(report)
}

/// Copies every video in `src` that shows some activity into `dest`.
/// Empty videos are counted as skipped. With `dry_run` nothing is written.
pub fn filter_empty_videos(
    src: &Path,
    dest: &Path,
    source: &dyn VideoSource,
    threshold: u8,
    dry_run: bool,
) -> Result<BatchReport> {
    let mut files: Vec<PathBuf> = fs::read_dir(src)
        .with_context(|| format!("Failed to list videos in {:?}", src))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    if !dry_run {
        fs::create_dir_all(dest).with_context(|| format!("Failed to create {:?}", dest))?;
    }

    let mut report = BatchReport::default();
    let pb = batch_progress(files.len() as u64, "filtering")?;

    for path in files {
        pb.inc(1);
        tracing::info!("Processing file {:?}", path);

        let is_empty = source
            .open(&path)
            .map_err(anyhow::Error::from)
            .and_then(|mut reader| video_is_empty(reader.as_mut(), threshold));

        match is_empty {
            Ok(true) => {
                tracing::debug!("{:?} shows no activity", path);
                report.skipped += 1;
            }
            Ok(false) => {
                let Some(file_name) = path.file_name() else {
                    continue;
                };
                let dest_file = dest.join(file_name);
                tracing::info!("Copying {:?} to {:?}", path, dest_file);
                if !dry_run {
                    if let Err(e) = fs::copy(&path, &dest_file) {
                        tracing::warn!("Failed to copy {:?}: {}", path, e);
                        report.failed += 1;
                        continue;
                    }
                }
                report.processed += 1;
            }
            Err(e) => {
                tracing::warn!("Failed to check {:?}: {:#}", path, e);
                report.failed += 1;
            }
        }
    }
    pb.finish_and_clear();

    tracing::info!(
        "Checked {} videos: {} with activity, {} empty, {} failed",
        report.total(),
        report.processed,
        report.skipped,
        report.failed
    );
    Ok(report)
}
