// Annotation service seam
//
// Frames can be handed to an external annotation tool and the returned
// classifications merged back into the ledger. The tool itself is reached
// through `AnnotationService`; `ManifestService` is a file based
// implementation that exchanges JSON manifests through a shared directory.

use crate::ledger::{dataset_dir, FrameLedger};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// One frame as published to the service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FrameSample {
    pub image_path: PathBuf,
    pub video_name: String,
    pub frame_ind: u64,
    pub classification: String,
}

/// A classification returned by the service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FrameAnnotation {
    pub video_name: String,
    pub frame_ind: u64,
    pub classification: String,
}

pub trait AnnotationService {
    fn create_dataset(&mut self, dataset_name: &str, samples: Vec<FrameSample>) -> Result<()>;
    /// Starts an annotation job identified by `anno_key`.
    fn annotate(&mut self, dataset_name: &str, anno_key: &str, classes: &[String]) -> Result<()>;
    fn load_annotations(&mut self, dataset_name: &str, anno_key: &str)
        -> Result<Vec<FrameAnnotation>>;
    fn export(&self, dataset_name: &str, export_dir: &Path) -> Result<()>;
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct MergeReport {
    pub updated: usize,
    pub unchanged: usize,
    /// Annotations for frames the ledger does not know about.
    pub unknown: usize,
    /// Annotations with a class outside the job's classes.
    pub rejected: usize,
}

/// Publishes every ledger frame under `root` as a dataset named
/// `dataset_name`. Returns the number of samples.
pub fn publish_ledger(
    service: &mut dyn AnnotationService,
    dataset_name: &str,
    ledger: &FrameLedger,
    root: &Path,
) -> Result<usize> {
    let dataset = dataset_dir(root);
    let samples: Vec<FrameSample> = ledger
        .records()
        .iter()
        .map(|r| FrameSample {
            image_path: r.image_path(&dataset),
            video_name: r.video_name().to_string(),
            frame_ind: r.frame_ind(),
            classification: r.target().to_string(),
        })
        .collect();

    let count = samples.len();
    service.create_dataset(dataset_name, samples)?;
    tracing::info!("Published {} frames as dataset {}", count, dataset_name);
    Ok(count)
}

/// Loads the annotations of job `anno_key` and writes them into the ledger
/// targets. Only existing rows are touched, and only with one of `classes`.
pub fn apply_annotations(
    service: &mut dyn AnnotationService,
    dataset_name: &str,
    anno_key: &str,
    classes: &[String],
    ledger: &mut FrameLedger,
) -> Result<MergeReport> {
    let annotations = service.load_annotations(dataset_name, anno_key)?;
    let mut report = MergeReport::default();

    for annotation in annotations {
        if !classes.contains(&annotation.classification) {
            tracing::warn!(
                "Rejecting class '{}' for frame {} of {}",
                annotation.classification,
                annotation.frame_ind,
                annotation.video_name
            );
            report.rejected += 1;
            continue;
        }
        let current = ledger
            .get(&annotation.video_name, annotation.frame_ind)
            .map(|r| r.target() == annotation.classification);
        match current {
            None => {
                tracing::debug!(
                    "Ignoring annotation for unknown frame {} of {}",
                    annotation.frame_ind,
                    annotation.video_name
                );
                report.unknown += 1;
            }
            Some(true) => report.unchanged += 1,
            Some(false) => {
                ledger.set_target(
                    &annotation.video_name,
                    annotation.frame_ind,
                    &annotation.classification,
                )?;
                report.updated += 1;
            }
        }
    }

    tracing::info!(
        "Merged annotations {}: {} updated, {} unchanged, {} unknown, {} rejected",
        anno_key,
        report.updated,
        report.unchanged,
        report.unknown,
        report.rejected
    );
    Ok(report)
}

const SAMPLES_FILE_NAME: &str = "samples.json";

#[derive(Serialize, Deserialize)]
struct AnnotationRequest {
    anno_key: String,
    classes: Vec<String>,
    samples: Vec<FrameSample>,
}

/// Exchanges datasets and annotation jobs as JSON files under
/// `{root}/{dataset_name}/`. Annotators answer a job by dropping
/// `{anno_key}.annotations.json` next to the request.
pub struct ManifestService {
    root: PathBuf,
}

impl ManifestService {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn dataset_path(&self, dataset_name: &str) -> PathBuf {
        self.root.join(dataset_name)
    }

    fn read_samples(&self, dataset_name: &str) -> Result<Vec<FrameSample>> {
        let path = self.dataset_path(dataset_name).join(SAMPLES_FILE_NAME);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read dataset manifest {:?}", path))?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl AnnotationService for ManifestService {
    fn create_dataset(&mut self, dataset_name: &str, samples: Vec<FrameSample>) -> Result<()> {
        let dir = self.dataset_path(dataset_name);
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {:?}", dir))?;
        fs::write(
            dir.join(SAMPLES_FILE_NAME),
            serde_json::to_string_pretty(&samples)?,
        )?;
        Ok(())
    }

    fn annotate(&mut self, dataset_name: &str, anno_key: &str, classes: &[String]) -> Result<()> {
        let request = AnnotationRequest {
            anno_key: anno_key.to_string(),
            classes: classes.to_vec(),
            samples: self.read_samples(dataset_name)?,
        };
        let path = self
            .dataset_path(dataset_name)
            .join(format!("{}.request.json", anno_key));
        fs::write(&path, serde_json::to_string_pretty(&request)?)
            .with_context(|| format!("Failed to write annotation request {:?}", path))?;
        tracing::info!("Annotation job {} written to {:?}", anno_key, path);
        Ok(())
    }

    fn load_annotations(
        &mut self,
        dataset_name: &str,
        anno_key: &str,
    ) -> Result<Vec<FrameAnnotation>> {
        let path = self
            .dataset_path(dataset_name)
            .join(format!("{}.annotations.json", anno_key));
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read annotations {:?}", path))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Copies the dataset images into `{export_dir}/{classification}/`.
    fn export(&self, dataset_name: &str, export_dir: &Path) -> Result<()> {
        for sample in self.read_samples(dataset_name)? {
            let class_dir = export_dir.join(&sample.classification);
            fs::create_dir_all(&class_dir)?;
            let Some(file_name) = sample.image_path.file_name() else {
                continue;
            };
            if let Err(e) = fs::copy(&sample.image_path, class_dir.join(file_name)) {
                tracing::warn!("Failed to export {:?}: {}", sample.image_path, e);
            }
        }
        Ok(())
    }
}
