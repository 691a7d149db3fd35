// Naive activity detection used to drop videos where nothing moves.

use crate::video::processor::process_video;
use crate::video::VideoReader;
use anyhow::Result;
use image::RgbImage;

/// Default per-channel difference that counts as a change.
pub const DEFAULT_ACTIVITY_THRESHOLD: u8 = 50;

/// Number of channel values whose absolute difference between two frames is
/// at least `threshold`. Frames of different size count as fully changed.
pub fn count_changed_values(previous: &RgbImage, current: &RgbImage, threshold: u8) -> usize {
    if previous.dimensions() != current.dimensions() {
        return current.as_raw().len().max(1);
    }
    previous
        .as_raw()
        .iter()
        .zip(current.as_raw())
        .filter(|(a, b)| a.abs_diff(**b) >= threshold)
        .count()
}

/// True if no pair of consecutive frames differs by at least `threshold`.
/// Decoding stops early at the first change.
pub fn video_is_empty(reader: &mut dyn VideoReader, threshold: u8) -> Result<bool> {
    let mut previous: Option<RgbImage> = None;
    let result = process_video(reader, |_ind: u64, frame: RgbImage| {
        if let Some(prev) = &previous {
            if count_changed_values(prev, &frame, threshold) > 0 {
                anyhow::bail!(ActivityFound);
            }
        }
        previous = Some(frame);
        Ok(())
    });

    match result {
        Ok(_) => Ok(true),
        Err(e) if e.is::<ActivityFound>() => Ok(false),
        Err(e) => Err(e),
    }
}

#[derive(Debug)]
struct ActivityFound;

impl std::fmt::Display for ActivityFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "activity found")
    }
}

impl std::error::Error for ActivityFound {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::testing::SyntheticReader;
    use image::Rgb;

    #[test]
    fn test_static_video_is_empty() {
        let frames = vec![RgbImage::from_pixel(4, 4, Rgb([10, 10, 10])); 6];
        let mut reader = SyntheticReader::from_frames(5.0, frames);
        assert!(video_is_empty(&mut reader, DEFAULT_ACTIVITY_THRESHOLD).unwrap());
    }

    #[test]
    fn test_small_changes_below_threshold_are_ignored() {
        let frames = vec![
            RgbImage::from_pixel(4, 4, Rgb([10, 10, 10])),
            RgbImage::from_pixel(4, 4, Rgb([40, 10, 10])),
        ];
        let mut reader = SyntheticReader::from_frames(5.0, frames);
        assert!(video_is_empty(&mut reader, DEFAULT_ACTIVITY_THRESHOLD).unwrap());
    }

    #[test]
    fn test_moving_video_is_not_empty() {
        let mut moved = RgbImage::from_pixel(4, 4, Rgb([10, 10, 10]));
        moved.put_pixel(2, 2, Rgb([200, 10, 10]));
        let frames = vec![
            RgbImage::from_pixel(4, 4, Rgb([10, 10, 10])),
            RgbImage::from_pixel(4, 4, Rgb([10, 10, 10])),
            moved,
        ];
        let mut reader = SyntheticReader::from_frames(5.0, frames);
        assert!(!video_is_empty(&mut reader, DEFAULT_ACTIVITY_THRESHOLD).unwrap());
    }

    #[test]
    fn test_count_changed_values() {
        let a = RgbImage::from_pixel(2, 1, Rgb([0, 0, 0]));
        let mut b = a.clone();
        b.put_pixel(1, 0, Rgb([60, 0, 255]));
        assert_eq!(count_changed_values(&a, &b, 50), 2);
    }
}
