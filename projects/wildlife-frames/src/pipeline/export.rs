// Upload format: a flat `train/` + `test/` tree where the class is encoded
// in the file name prefix (`{target}.{file_name}`).

use crate::ledger::{dataset_dir, ledger_path, FrameLedger};
use crate::pipeline::split::calc_test_split_indices;
use crate::pipeline::types::ExportReport;
use crate::video::processor::batch_progress;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

pub const TRAIN_DIR_NAME: &str = "train";
pub const TEST_DIR_NAME: &str = "test";

/// Copies every ledger frame under `src_root` into the upload layout under
/// `dst_root`. The split is made per video so frames of one video never end
/// up on both sides. The source tree is only read.
pub fn convert_file_structure_to_upload_format(
    src_root: &Path,
    dst_root: &Path,
    test_split_size: f64,
    seed: u64,
) -> Result<ExportReport> {
    let ledger = FrameLedger::read(&ledger_path(src_root))?;
    let src_dataset = dataset_dir(src_root);

    let video_names = ledger.distinct_video_names();
    let test_indices = calc_test_split_indices(video_names.len(), test_split_size, seed)?;
    let test_videos: HashSet<&str> = test_indices
        .iter()
        .map(|&i| video_names[i].as_str())
        .collect();

    tracing::info!(
        "Exporting {} frames from {} videos ({} test videos) to {:?}",
        ledger.len(),
        video_names.len(),
        test_videos.len(),
        dst_root
    );

    for dir_name in [TRAIN_DIR_NAME, TEST_DIR_NAME] {
        let dir = dst_root.join(dir_name);
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }

    let mut report = ExportReport {
        test_videos: test_indices.iter().map(|&i| video_names[i].clone()).collect(),
        ..Default::default()
    };

    let pb = batch_progress(ledger.len() as u64, "exporting")?;
    for record in ledger.records() {
        pb.inc(1);
        let is_test = test_videos.contains(record.video_name());
        let split_dir = if is_test { TEST_DIR_NAME } else { TRAIN_DIR_NAME };

        let src_path = record.image_path(&src_dataset);
        let dst_path = dst_root
            .join(split_dir)
            .join(format!("{}.{}", record.target(), record.file_name()));

        match fs::copy(&src_path, &dst_path) {
            Ok(_) if is_test => report.test_frames += 1,
            Ok(_) => report.train_frames += 1,
            Err(e) => {
                tracing::warn!("Failed to copy {:?}: {}", src_path, e);
                report.skipped_frames += 1;
            }
        }
    }
    pb.finish_and_clear();

    tracing::info!(
        "Exported {} train and {} test frames, skipped {}",
        report.train_frames,
        report.test_frames,
        report.skipped_frames
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{parse_frame_file_name, FrameRecord};

    fn build_tree(root: &Path, videos: &[&str], frames_per_video: u64) -> FrameLedger {
        let mut ledger = FrameLedger::new();
        for video in videos {
            for ind in 0..frames_per_video {
                let target = if ind % 2 == 0 { "rat" } else { "background" };
                let record = FrameRecord::new(video, ind, target, "rat").unwrap();
                let path = record.image_path(&dataset_dir(root));
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(&path, record.file_name()).unwrap();
                ledger.push(record).unwrap();
            }
        }
        ledger.write(&ledger_path(root)).unwrap();
        ledger
    }

    fn list(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_upload_layout_and_video_grouping() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        build_tree(src.path(), &["a", "b", "c", "d"], 3);

        let report =
            convert_file_structure_to_upload_format(src.path(), dst.path(), 0.5, 7).unwrap();

        assert_eq!(report.test_videos.len(), 2);
        assert_eq!(report.test_frames, 6);
        assert_eq!(report.train_frames, 6);
        assert_eq!(report.skipped_frames, 0);

        let test_files = list(&dst.path().join(TEST_DIR_NAME));
        let train_files = list(&dst.path().join(TRAIN_DIR_NAME));

        for name in test_files.iter().chain(train_files.iter()) {
            let (target, file_name) = name.split_once('.').unwrap();
            assert!(target == "rat" || target == "background");
            assert!(parse_frame_file_name(file_name).is_some());
        }

        let video_of = |name: &String| {
            let (_, file_name) = name.split_once('.').unwrap();
            parse_frame_file_name(file_name).unwrap().0
        };
        let test_set: HashSet<String> = test_files.iter().map(video_of).collect();
        let train_set: HashSet<String> = train_files.iter().map(video_of).collect();
        assert!(test_set.is_disjoint(&train_set));
        let expected: HashSet<String> = report.test_videos.iter().cloned().collect();
        assert_eq!(test_set, expected);

        assert!(dst
            .path()
            .join(if expected.contains("a") { TEST_DIR_NAME } else { TRAIN_DIR_NAME })
            .join("background.a___1.jpeg")
            .exists());
    }

    #[test]
    fn test_same_seed_same_export() {
        let src = tempfile::tempdir().unwrap();
        build_tree(src.path(), &["a", "b", "c", "d", "e"], 1);

        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let r1 = convert_file_structure_to_upload_format(src.path(), first.path(), 0.4, 11).unwrap();
        let r2 = convert_file_structure_to_upload_format(src.path(), second.path(), 0.4, 11).unwrap();

        assert_eq!(r1, r2);
        assert_eq!(
            list(&first.path().join(TEST_DIR_NAME)),
            list(&second.path().join(TEST_DIR_NAME))
        );
    }

    #[test]
    fn test_missing_image_is_skipped_and_source_untouched() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let ledger = build_tree(src.path(), &["a"], 2);
        fs::remove_file(ledger.records()[1].image_path(&dataset_dir(src.path()))).unwrap();
        let before = fs::read_to_string(ledger_path(src.path())).unwrap();

        let report =
            convert_file_structure_to_upload_format(src.path(), dst.path(), 0.0, 0).unwrap();

        assert_eq!(report.train_frames, 1);
        assert_eq!(report.skipped_frames, 1);
        assert!(report.test_videos.is_empty());
        assert_eq!(fs::read_to_string(ledger_path(src.path())).unwrap(), before);
        assert_eq!(list(&dst.path().join(TRAIN_DIR_NAME)), vec!["rat.a___0.jpeg"]);
    }
}
