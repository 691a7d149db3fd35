// Preprocessing: a small registry of named image transforms, composed in the
// order they appear in the configuration and applied to every ledger frame.

use crate::error::CurateError;
use crate::ledger::{dataset_dir, ledger_path, FrameLedger};
use crate::pipeline::types::BatchReport;
use crate::video::processor::batch_progress;
use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

pub trait FrameTransform: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, image: RgbImage) -> RgbImage;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResizeTarget {
    /// Exact output size.
    Exact { height: u32, width: u32 },
    /// Shorter edge becomes this length, aspect ratio kept.
    ShorterEdge(u32),
}

pub struct Resize {
    target: ResizeTarget,
}

impl Resize {
    pub fn new(target: ResizeTarget) -> Self {
        Self { target }
    }

    fn from_params(params: &Value) -> Result<Self, CurateError> {
        let invalid = |reason: &str| CurateError::InvalidTransformParams {
            name: "img_size".to_string(),
            reason: reason.to_string(),
        };
        let positive = |v: &Value| -> Option<u32> {
            v.as_u64()
                .filter(|&n| n > 0)
                .and_then(|n| u32::try_from(n).ok())
        };

        let target = match params {
            Value::Array(dims) if dims.len() == 2 => {
                match (positive(&dims[0]), positive(&dims[1])) {
                    (Some(height), Some(width)) => ResizeTarget::Exact { height, width },
                    _ => return Err(invalid("expected two positive integers [height, width]")),
                }
            }
            Value::Number(_) => match positive(params) {
                Some(edge) => ResizeTarget::ShorterEdge(edge),
                None => return Err(invalid("size must be a positive integer")),
            },
            _ => return Err(invalid("expected [height, width] or a single integer")),
        };
        Ok(Self::new(target))
    }

    fn output_size(&self, width: u32, height: u32) -> (u32, u32) {
        match self.target {
            ResizeTarget::Exact { height, width } => (width, height),
            ResizeTarget::ShorterEdge(edge) => {
                if width <= height {
                    let long = (edge as u64 * height as u64 / width.max(1) as u64) as u32;
                    (edge, long.max(1))
                } else {
                    let long = (edge as u64 * width as u64 / height.max(1) as u64) as u32;
                    (long.max(1), edge)
                }
            }
        }
    }
}

impl FrameTransform for Resize {
    fn name(&self) -> &str {
        "img_size"
    }

    fn apply(&self, image: RgbImage) -> RgbImage {
        let (width, height) = self.output_size(image.width(), image.height());
        if (width, height) == image.dimensions() {
            return image;
        }
        imageops::resize(&image, width, height, FilterType::Triangle)
    }
}

/// Luma conversion, kept as three channels so later steps and the JPEG
/// writer see the same pixel layout.
pub struct Grayscale;

impl FrameTransform for Grayscale {
    fn name(&self) -> &str {
        "grayscale"
    }

    fn apply(&self, image: RgbImage) -> RgbImage {
        DynamicImage::ImageLuma8(imageops::grayscale(&image)).to_rgb8()
    }
}

/// Transforms applied in sequence.
#[derive(Default)]
pub struct ComposedTransform {
    steps: Vec<Box<dyn FrameTransform>>,
}

impl ComposedTransform {
    pub fn push(&mut self, step: Box<dyn FrameTransform>) {
        self.steps.push(step);
    }

    pub fn apply(&self, image: RgbImage) -> RgbImage {
        self.steps.iter().fold(image, |img, step| step.apply(img))
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl std::fmt::Debug for ComposedTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.step_names()).finish()
    }
}

/// Builds the transform chain described by `config`, keeping its key order.
pub fn compose_transforms(config: &Map<String, Value>) -> Result<ComposedTransform, CurateError> {
    let mut composed = ComposedTransform::default();
    for (name, params) in config {
        match name.as_str() {
            "img_size" => composed.push(Box::new(Resize::from_params(params)?)),
            "grayscale" => match params {
                Value::Bool(false) => {}
                Value::Bool(true) | Value::Null => composed.push(Box::new(Grayscale)),
                _ => {
                    return Err(CurateError::InvalidTransformParams {
                        name: name.clone(),
                        reason: "expected true, false or null".to_string(),
                    })
                }
            },
            _ => return Err(CurateError::UnknownTransform(name.clone())),
        }
    }
    Ok(composed)
}

fn same_root(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Applies `transform` to every frame listed in the ledger under `src_root`
/// and writes the result under `dst_root`. With `src_root == dst_root` the
/// images are replaced in place; otherwise `dst_root` gets a ledger holding
/// only the rows whose image was written.
pub fn preprocess_images(
    transform: &ComposedTransform,
    src_root: &Path,
    dst_root: &Path,
) -> Result<BatchReport> {
    let ledger = FrameLedger::read(&ledger_path(src_root))?;
    let src_dataset = dataset_dir(src_root);
    let dst_dataset = dataset_dir(dst_root);
    let in_place = same_root(src_root, dst_root);

    tracing::info!(
        "Preprocessing {} frames with {:?}{}",
        ledger.len(),
        transform,
        if in_place { " (in place)" } else { "" }
    );

    let mut report = BatchReport::default();
    let mut written = FrameLedger::new();
    let pb = batch_progress(ledger.len() as u64, "preprocessing")?;

    for record in ledger.records() {
        pb.inc(1);
        let src_path = record.image_path(&src_dataset);
        let dst_path = record.image_path(&dst_dataset);

        let result = (|| -> Result<()> {
            let image = image::open(&src_path)
                .with_context(|| format!("Failed to read frame {:?}", src_path))?
                .to_rgb8();
            let processed = transform.apply(image);
            if let Some(parent) = dst_path.parent() {
                fs::create_dir_all(parent)?;
            }
            processed
                .save(&dst_path)
                .with_context(|| format!("Failed to write frame {:?}", dst_path))?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                report.processed += 1;
                if !in_place {
                    written.push(record.clone())?;
                }
            }
            Err(e) => {
                tracing::warn!("Skipping {}: {:#}", record.file_name(), e);
                report.failed += 1;
                if !in_place && dst_path.exists() {
                    fs::remove_file(&dst_path)
                        .with_context(|| format!("Failed to remove partial frame {:?}", dst_path))?;
                }
            }
        }
    }
    pb.finish_and_clear();

    if !in_place {
        written.write(&ledger_path(dst_root))?;
        if report.failed > 0 {
            tracing::warn!(
                "Ledger at {:?} leaves out {} frames that failed to preprocess",
                dst_root,
                report.failed
            );
        }
    }

    tracing::info!(
        "Preprocessed {} frames, {} failed",
        report.processed,
        report.failed
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{verify_frame_tree, FrameRecord};
    use image::Rgb;
    use serde_json::json;

    fn transforms(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_compose_keeps_config_order() {
        let composed =
            compose_transforms(&transforms(json!({"grayscale": true, "img_size": [2, 3]}))).unwrap();
        assert_eq!(composed.step_names(), vec!["grayscale", "img_size"]);

        let image = RgbImage::from_pixel(6, 4, Rgb([200, 10, 10]));
        let out = composed.apply(image);
        assert_eq!(out.dimensions(), (3, 2));
        let px = out.get_pixel(1, 1);
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }

    #[test]
    fn test_compose_errors() {
        assert!(matches!(
            compose_transforms(&transforms(json!({"blur": 1}))),
            Err(CurateError::UnknownTransform(name)) if name == "blur"
        ));
        for bad in [json!([48]), json!([0, 48]), json!("48x48"), json!(-3)] {
            assert!(matches!(
                compose_transforms(&transforms(json!({ "img_size": bad }))),
                Err(CurateError::InvalidTransformParams { .. })
            ));
        }
        assert!(compose_transforms(&transforms(json!({"grayscale": false})))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_shorter_edge_keeps_aspect_ratio() {
        let resize = Resize::new(ResizeTarget::ShorterEdge(10));
        assert_eq!(resize.apply(RgbImage::new(40, 20)).dimensions(), (20, 10));
        assert_eq!(resize.apply(RgbImage::new(20, 30)).dimensions(), (10, 15));
    }

    #[test]
    fn test_preprocess_images_to_new_root() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();

        let ledger = FrameLedger::from_records(vec![
            FrameRecord::new("v", 0, "rat", "rat").unwrap(),
            FrameRecord::new("v", 1, "background", "rat").unwrap(),
            FrameRecord::new("w", 0, "background", "rat").unwrap(),
        ])
        .unwrap();
        ledger.write(&ledger_path(src.path())).unwrap();

        let src_dataset = dataset_dir(src.path());
        for record in ledger.records().iter().take(2) {
            let path = record.image_path(&src_dataset);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            RgbImage::from_pixel(16, 12, Rgb([90, 90, 90]))
                .save(&path)
                .unwrap();
        }

        let composed = compose_transforms(&transforms(json!({"img_size": [6, 8]}))).unwrap();
        let report = preprocess_images(&composed, src.path(), dst.path()).unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.failed, 1);

        let out = image::open(dataset_dir(dst.path()).join("v").join("v___1.jpeg")).unwrap();
        assert_eq!((out.width(), out.height()), (8, 6));
        let copied = FrameLedger::read(&ledger_path(dst.path())).unwrap();
        assert_eq!(copied.records(), &ledger.records()[..2]);
        assert!(verify_frame_tree(dst.path()).unwrap().is_consistent());

        let untouched = image::open(src_dataset.join("v").join("v___1.jpeg")).unwrap();
        assert_eq!((untouched.width(), untouched.height()), (16, 12));
    }

    #[test]
    fn test_corrupt_frame_left_out_of_new_root() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let ledger = FrameLedger::from_records(vec![
            FrameRecord::new("v", 0, "rat", "rat").unwrap(),
            FrameRecord::new("v", 1, "background", "rat").unwrap(),
        ])
        .unwrap();
        ledger.write(&ledger_path(src.path())).unwrap();

        let src_dataset = dataset_dir(src.path());
        let good = ledger.records()[0].image_path(&src_dataset);
        fs::create_dir_all(good.parent().unwrap()).unwrap();
        RgbImage::new(8, 8).save(&good).unwrap();
        fs::write(ledger.records()[1].image_path(&src_dataset), b"not a jpeg").unwrap();

        let composed = compose_transforms(&transforms(json!({"img_size": 4}))).unwrap();
        let report = preprocess_images(&composed, src.path(), dst.path()).unwrap();
        assert_eq!((report.processed, report.failed), (1, 1));

        let integrity = verify_frame_tree(dst.path()).unwrap();
        assert!(integrity.is_consistent());
        assert_eq!(integrity.ledger_rows, 1);
        assert_eq!(integrity.image_files, 1);
        assert_eq!(FrameLedger::read(&ledger_path(src.path())).unwrap().len(), 2);
    }

    #[test]
    fn test_preprocess_images_in_place() {
        let root = tempfile::tempdir().unwrap();
        let ledger =
            FrameLedger::from_records(vec![FrameRecord::new("v", 0, "rat", "rat").unwrap()]).unwrap();
        ledger.write(&ledger_path(root.path())).unwrap();
        let path = ledger.records()[0].image_path(&dataset_dir(root.path()));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::new(10, 10).save(&path).unwrap();

        let composed = compose_transforms(&transforms(json!({"img_size": 4}))).unwrap();
        let report = preprocess_images(&composed, root.path(), root.path()).unwrap();

        assert_eq!(report.processed, 1);
        let out = image::open(&path).unwrap();
        assert_eq!((out.width(), out.height()), (4, 4));
    }
}
