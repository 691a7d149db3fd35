// Frame information ledger
//
// The ledger (`frame_information.csv`) is the only index from a frame image
// to its class. Every stage after extraction reads it, and the relabel
// session is the only writer besides the assembler.

use crate::error::CurateError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const LEDGER_FILE_NAME: &str = "frame_information.csv";
pub const DATASET_DIR_NAME: &str = "dataset";
pub const FRAME_EXTENSION: &str = "jpeg";
const FRAME_SEPARATOR: &str = "___";

pub fn ledger_path(root: &Path) -> PathBuf {
    root.join(LEDGER_FILE_NAME)
}

pub fn dataset_dir(root: &Path) -> PathBuf {
    root.join(DATASET_DIR_NAME)
}

/// Canonical image name for a frame: `{video_name}___{frame_ind}.jpeg`.
pub fn frame_file_name(video_name: &str, frame_ind: u64) -> String {
    format!(
        "{}{}{}.{}",
        video_name, FRAME_SEPARATOR, frame_ind, FRAME_EXTENSION
    )
}

/// Inverse of [`frame_file_name`].
pub fn parse_frame_file_name(file_name: &str) -> Option<(String, u64)> {
    let stem = file_name.strip_suffix(&format!(".{}", FRAME_EXTENSION))?;
    let (video_name, frame_ind) = stem.rsplit_once(FRAME_SEPARATOR)?;
    if video_name.is_empty() {
        return None;
    }
    Some((video_name.to_string(), frame_ind.parse().ok()?))
}

/// One row of the ledger.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    video_name: String,
    frame_ind: u64,
    file_name: String,
    target: String,
    label: String,
}

impl FrameRecord {
    pub fn new(
        video_name: &str,
        frame_ind: u64,
        target: &str,
        label: &str,
    ) -> Result<Self, CurateError> {
        let record = Self {
            video_name: video_name.to_string(),
            frame_ind,
            file_name: frame_file_name(video_name, frame_ind),
            target: target.to_string(),
            label: label.to_string(),
        };
        record.validate()?;
        Ok(record)
    }

    fn validate(&self) -> Result<(), CurateError> {
        if self.video_name.is_empty() {
            return Err(CurateError::InvalidFrameRecord(
                "video_name is empty".to_string(),
            ));
        }
        if self.video_name.contains(FRAME_SEPARATOR) || self.video_name.contains('/') {
            return Err(CurateError::InvalidFrameRecord(format!(
                "video_name '{}' contains a reserved sequence",
                self.video_name
            )));
        }
        if self.target.is_empty() || self.label.is_empty() {
            return Err(CurateError::InvalidFrameRecord(format!(
                "{} has an empty target or label",
                self.file_name
            )));
        }
        let expected = frame_file_name(&self.video_name, self.frame_ind);
        if self.file_name != expected {
            return Err(CurateError::InvalidFrameRecord(format!(
                "file_name '{}' does not match '{}'",
                self.file_name, expected
            )));
        }
        Ok(())
    }

    pub fn video_name(&self) -> &str {
        &self.video_name
    }

    pub fn frame_ind(&self) -> u64 {
        self.frame_ind
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Location of this frame's image inside a dataset directory.
    pub fn image_path(&self, dataset_dir: &Path) -> PathBuf {
        dataset_dir.join(&self.video_name).join(&self.file_name)
    }

    fn key(&self) -> (String, u64) {
        (self.video_name.clone(), self.frame_ind)
    }
}

/// Ordered collection of frame records with unique `(video_name, frame_ind)`
/// keys.
#[derive(Debug, Default, Clone)]
pub struct FrameLedger {
    records: Vec<FrameRecord>,
    /// Key to position in `records`.
    index: HashMap<(String, u64), usize>,
}

impl FrameLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<FrameRecord>) -> Result<Self, CurateError> {
        let mut ledger = Self::new();
        for record in records {
            ledger.push(record)?;
        }
        Ok(ledger)
    }

    pub fn push(&mut self, record: FrameRecord) -> Result<(), CurateError> {
        let key = record.key();
        if self.index.contains_key(&key) {
            return Err(CurateError::InvalidFrameRecord(format!(
                "duplicate ledger entry for {}",
                record.file_name
            )));
        }
        self.index.insert(key, self.records.len());
        self.records.push(record);
        Ok(())
    }

    pub fn append(&mut self, records: Vec<FrameRecord>) -> Result<(), CurateError> {
        for record in records {
            self.push(record)?;
        }
        Ok(())
    }

    pub fn records(&self) -> &[FrameRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct video names in order of first appearance.
    pub fn distinct_video_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .filter(|r| seen.insert(r.video_name.as_str()))
            .map(|r| r.video_name.clone())
            .collect()
    }

    pub fn video_frames<'a>(&'a self, video_name: &'a str) -> impl Iterator<Item = &'a FrameRecord> {
        self.records
            .iter()
            .filter(move |r| r.video_name == video_name)
    }

    fn position(&self, video_name: &str, frame_ind: u64) -> Option<usize> {
        self.index
            .get(&(video_name.to_string(), frame_ind))
            .copied()
    }

    pub fn contains(&self, video_name: &str, frame_ind: u64) -> bool {
        self.position(video_name, frame_ind).is_some()
    }

    pub fn get(&self, video_name: &str, frame_ind: u64) -> Option<&FrameRecord> {
        self.position(video_name, frame_ind)
            .map(|pos| &self.records[pos])
    }

    /// Overwrites the target of an existing row. Returns false if no row has
    /// the given key; the ledger never grows through this call. An empty
    /// target is rejected and leaves the row untouched.
    pub fn set_target(
        &mut self,
        video_name: &str,
        frame_ind: u64,
        target: &str,
    ) -> Result<bool, CurateError> {
        let Some(pos) = self.position(video_name, frame_ind) else {
            return Ok(false);
        };
        let record = &mut self.records[pos];
        if target.is_empty() {
            return Err(CurateError::InvalidFrameRecord(format!(
                "{} cannot be given an empty target",
                record.file_name
            )));
        }
        record.target = target.to_string();
        Ok(true)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open ledger {:?}", path))?;

        let mut ledger = Self::new();
        for (row, result) in reader.deserialize::<FrameRecord>().enumerate() {
            let record =
                result.with_context(|| format!("Malformed ledger row {} in {:?}", row + 1, path))?;
            record.validate()?;
            ledger.push(record)?;
        }

        tracing::debug!("Read {} ledger rows from {:?}", ledger.len(), path);
        Ok(ledger)
    }

    /// Writes the ledger through a temporary file so an interrupted write
    /// never leaves a truncated ledger behind.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp_path)
                .with_context(|| format!("Failed to create ledger {:?}", tmp_path))?;
            for record in &self.records {
                writer.serialize(record)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to move ledger into place at {:?}", path))?;

        tracing::debug!("Wrote {} ledger rows to {:?}", self.len(), path);
        Ok(())
    }
}

/// Result of comparing a ledger with the images on disk.
#[derive(Debug, Default, Serialize)]
pub struct IntegrityReport {
    pub ledger_rows: usize,
    pub image_files: usize,
    /// Ledger rows whose image is missing.
    pub missing_images: Vec<String>,
    /// Image files with no ledger row (or in the wrong video directory).
    pub orphan_images: Vec<PathBuf>,
}

impl IntegrityReport {
    pub fn is_consistent(&self) -> bool {
        self.missing_images.is_empty() && self.orphan_images.is_empty()
    }
}

/// Checks the one-row-per-image invariant of a frame root. Read only: any
/// repair has to be done explicitly by the caller.
pub fn verify_frame_tree(root: &Path) -> Result<IntegrityReport> {
    let ledger = FrameLedger::read(&ledger_path(root))?;
    let dataset = dataset_dir(root);

    let mut on_disk: BTreeSet<(String, u64)> = BTreeSet::new();
    let mut report = IntegrityReport {
        ledger_rows: ledger.len(),
        ..Default::default()
    };

    if dataset.exists() {
        for entry in WalkDir::new(&dataset)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            report.image_files += 1;
            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy();
            let parent = path
                .parent()
                .and_then(|p| p.file_name())
                .map(|s| s.to_string_lossy().into_owned());

            match parse_frame_file_name(&file_name) {
                Some((video_name, frame_ind))
                    if parent.as_deref() == Some(video_name.as_str())
                        && ledger.contains(&video_name, frame_ind) =>
                {
                    on_disk.insert((video_name, frame_ind));
                }
                _ => report.orphan_images.push(path.to_path_buf()),
            }
        }
    }

    report.missing_images = ledger
        .records
        .iter()
        .filter(|r| !on_disk.contains(&r.key()))
        .map(|r| r.file_name.clone())
        .collect();

    if report.is_consistent() {
        tracing::info!(
            "Frame tree at {:?} is consistent ({} rows)",
            root,
            report.ledger_rows
        );
    } else {
        tracing::warn!(
            "Frame tree at {:?} diverges from ledger: {} missing images, {} orphan images",
            root,
            report.missing_images.len(),
            report.orphan_images.len()
        );
    }

    Ok(report)
}
