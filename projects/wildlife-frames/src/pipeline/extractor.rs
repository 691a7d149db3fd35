// Frame extraction: one linear pass over a video, keeping every Nth frame
// and flagging the frames that fall inside the labeled interval.

use crate::pipeline::types::ExtractedFrame;
use crate::video::processor::{process_video, ProcessingStats};
use crate::video::VideoReader;
use anyhow::{bail, Result};
use image::RgbImage;
use std::collections::{BTreeMap, BTreeSet};

/// Streams the sampled frames of `reader` into `processor`.
///
/// Every frame is decoded, but only indices divisible by
/// `sampling_frequency` are emitted. `contains_target` is computed from the
/// absolute decode index.
pub fn for_each_sampled_frame<F>(
    reader: &mut dyn VideoReader,
    frames_with_target: &BTreeSet<u64>,
    sampling_frequency: u32,
    mut processor: F,
) -> Result<ProcessingStats>
where
    F: FnMut(u64, ExtractedFrame) -> Result<()>,
{
    if sampling_frequency == 0 {
        bail!("sampling_frequency must be at least 1");
    }
    let stride = sampling_frequency as u64;

    process_video(reader, |frame_ind: u64, image: RgbImage| {
        if frame_ind % stride != 0 {
            return Ok(());
        }
        let frame = ExtractedFrame {
            image,
            contains_target: frames_with_target.contains(&frame_ind),
        };
        processor(frame_ind, frame)
    })
}

/// Collects the sampled frames of a video, keyed by frame index.
pub fn read_frames_in_video(
    reader: &mut dyn VideoReader,
    frames_with_target: &BTreeSet<u64>,
    sampling_frequency: u32,
) -> Result<BTreeMap<u64, ExtractedFrame>> {
    let mut frames = BTreeMap::new();
    for_each_sampled_frame(
        reader,
        frames_with_target,
        sampling_frequency,
        |frame_ind, frame| {
            frames.insert(frame_ind, frame);
            Ok(())
        },
    )?;
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::testing::SyntheticReader;

    #[test]
    fn test_sampling_stride() {
        let mut reader = SyntheticReader::new(10.0, 10);
        let targets: BTreeSet<u64> = [3, 4, 5].into_iter().collect();

        let frames = read_frames_in_video(&mut reader, &targets, 4).unwrap();

        let keys: Vec<u64> = frames.keys().copied().collect();
        assert_eq!(keys, vec![0, 4, 8]);
        assert!(!frames[&0].contains_target);
        assert!(frames[&4].contains_target);
        assert!(!frames[&8].contains_target);
    }

    #[test]
    fn test_emitted_image_matches_decode_index() {
        let mut reader = SyntheticReader::new(10.0, 7);
        let frames = read_frames_in_video(&mut reader, &BTreeSet::new(), 3).unwrap();

        for (frame_ind, frame) in &frames {
            assert_eq!(frame.image.get_pixel(0, 0)[0] as u64, *frame_ind);
            assert!(!frame.contains_target);
        }
        assert_eq!(frames.len(), 3);
    }

    #[test]
    fn test_frequency_one_keeps_all_frames() {
        let mut reader = SyntheticReader::new(10.0, 5);
        let targets: BTreeSet<u64> = (0..5).collect();
        let frames = read_frames_in_video(&mut reader, &targets, 1).unwrap();
        assert_eq!(frames.len(), 5);
        assert!(frames.values().all(|f| f.contains_target));
    }

    #[test]
    fn test_zero_frequency_rejected() {
        let mut reader = SyntheticReader::new(10.0, 5);
        assert!(read_frames_in_video(&mut reader, &BTreeSet::new(), 0).is_err());
    }
}
