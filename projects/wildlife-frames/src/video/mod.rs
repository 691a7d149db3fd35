pub mod ffmpeg_reader;
pub mod filtering;
pub mod processor;

use crate::error::CurateError;
use anyhow::Result;
use image::RgbImage;
use std::path::Path;

/// Forward-only access to the decoded frames of one video.
pub trait VideoReader {
    fn source_fps(&self) -> Result<f64>;
    /// Estimated number of frames, as reported by the container.
    fn frame_count(&self) -> Result<usize>;
    /// Next frame in decode order, `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// Opens video files. Split from `VideoReader` so batch stages can be run
/// against synthetic videos.
pub trait VideoSource {
    fn open(&self, path: &Path) -> Result<Box<dyn VideoReader>, CurateError>;
}

pub struct FfmpegSource;

impl VideoSource for FfmpegSource {
    fn open(&self, path: &Path) -> Result<Box<dyn VideoReader>, CurateError> {
        let reader = ffmpeg_reader::FfmpegReader::open(path)?;
        Ok(Box::new(reader))
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use image::Rgb;
    use std::collections::HashMap;
    use std::path::PathBuf;

    /// Solid-color frames where frame `i` has red channel `i`.
    pub fn ramp_frames(n_frames: usize) -> Vec<RgbImage> {
        (0..n_frames)
            .map(|i| RgbImage::from_pixel(4, 4, Rgb([(i % 256) as u8, 0, 0])))
            .collect()
    }

    pub struct SyntheticReader {
        fps: f64,
        frames: std::vec::IntoIter<RgbImage>,
        total: usize,
    }

    impl SyntheticReader {
        pub fn new(fps: f64, n_frames: usize) -> Self {
            Self::from_frames(fps, ramp_frames(n_frames))
        }

        pub fn from_frames(fps: f64, frames: Vec<RgbImage>) -> Self {
            let total = frames.len();
            Self {
                fps,
                frames: frames.into_iter(),
                total,
            }
        }
    }

    impl VideoReader for SyntheticReader {
        fn source_fps(&self) -> Result<f64> {
            Ok(self.fps)
        }

        fn frame_count(&self) -> Result<usize> {
            Ok(self.total)
        }

        fn next_frame(&mut self) -> Result<Option<RgbImage>> {
            Ok(self.frames.next())
        }
    }

    /// Serves synthetic videos for paths whose file exists on disk, so tests
    /// exercise the same not-found handling as the real backend.
    #[derive(Default)]
    pub struct SyntheticSource {
        videos: HashMap<PathBuf, (f64, Vec<RgbImage>)>,
    }

    impl SyntheticSource {
        pub fn with_video(self, path: &Path, fps: f64, n_frames: usize) -> Self {
            self.with_frames(path, fps, ramp_frames(n_frames))
        }

        pub fn with_frames(mut self, path: &Path, fps: f64, frames: Vec<RgbImage>) -> Self {
            self.videos.insert(path.to_path_buf(), (fps, frames));
            self
        }
    }

    impl VideoSource for SyntheticSource {
        fn open(&self, path: &Path) -> Result<Box<dyn VideoReader>, CurateError> {
            if !path.is_file() {
                return Err(CurateError::VideoNotFound(path.to_path_buf()));
            }
            let (fps, frames) = self
                .videos
                .get(path)
                .ok_or_else(|| CurateError::VideoOpen {
                    path: path.to_path_buf(),
                    reason: "not a synthetic video".to_string(),
                })?;
            Ok(Box::new(SyntheticReader::from_frames(*fps, frames.clone())))
        }
    }
}
