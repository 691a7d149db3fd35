// Label sheets
//
// Video annotations come from a spreadsheet with one sheet per camera
// folder. Sheets are read as CSV: either a single file that already has a
// `folder` column, or a directory of `<folder>.csv` files that get stacked
// with the file stem as `folder`.

use crate::error::CurateError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const REQUIRED_COLUMNS: [&str; 4] = ["filename", "label", "start", "end"];

/// One annotated video.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VideoRecord {
    pub filename: String,
    pub folder: String,
    pub label: String,
    /// Seconds into the video where the target appears.
    pub start: Option<f64>,
    /// Seconds into the video where the target leaves.
    pub end: Option<f64>,
}

impl VideoRecord {
    /// File name without extension; used as `video_name` in the ledger.
    pub fn video_name(&self) -> String {
        Path::new(&self.filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.filename.clone())
    }
}

#[derive(Deserialize)]
struct SheetRow {
    filename: String,
    label: String,
    #[serde(default)]
    start: Option<f64>,
    #[serde(default)]
    end: Option<f64>,
    #[serde(default)]
    folder: Option<String>,
}

/// Reads every sheet under `path` and stacks the rows.
pub fn read_label_sheets(path: &Path) -> Result<Vec<VideoRecord>> {
    let records = if path.is_dir() {
        let mut sheet_paths: Vec<PathBuf> = fs::read_dir(path)
            .with_context(|| format!("Failed to list sheets in {:?}", path))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension()
                    .and_then(|s| s.to_str())
                    .map(|s| s.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
            })
            .collect();
        sheet_paths.sort();

        let mut records = Vec::new();
        for sheet_path in sheet_paths {
            let sheet_name = sheet_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            records.extend(read_sheet(&sheet_path, Some(&sheet_name))?);
        }
        records
    } else {
        read_sheet(path, None)?
    };

    tracing::info!("Read {} video entries from {:?}", records.len(), path);
    Ok(records)
}

/// Reads one sheet. When `sheet_name` is given it becomes the `folder` of
/// every row, otherwise the sheet must carry its own `folder` column.
pub fn read_sheet(path: &Path, sheet_name: Option<&str>) -> Result<Vec<VideoRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open sheet {:?}", path))?;

    let headers = reader.headers()?.clone();
    let folder_column = sheet_name.is_none().then_some("folder");
    for column in REQUIRED_COLUMNS.iter().copied().chain(folder_column) {
        if !headers.iter().any(|h| h == column) {
            return Err(CurateError::MissingColumn {
                sheet: path.display().to_string(),
                column: column.to_string(),
            }
            .into());
        }
    }

    let mut records = Vec::new();
    for (row, result) in reader.deserialize::<SheetRow>().enumerate() {
        let row_data =
            result.with_context(|| format!("Malformed row {} in sheet {:?}", row + 1, path))?;
        let folder = match sheet_name {
            Some(name) => name.to_string(),
            None => row_data.folder.unwrap_or_default(),
        };
        records.push(VideoRecord {
            filename: row_data.filename,
            folder,
            label: row_data.label,
            start: row_data.start,
            end: row_data.end,
        });
    }
    Ok(records)
}

/// Rows annotated with `label`, in sheet order.
pub fn rows_for_label<'a>(records: &'a [VideoRecord], label: &str) -> Vec<&'a VideoRecord> {
    records.iter().filter(|r| r.label == label).collect()
}
