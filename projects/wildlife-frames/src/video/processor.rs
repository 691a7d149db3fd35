use crate::video::VideoReader;
use anyhow::Result;
use image::RgbImage;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

pub struct ProcessingStats {
    pub processed_frames: usize,
    pub duration: Duration,
}

/// A trait for handling decoded frames. This separates the "how to process"
/// from the "how to read" logic.
pub trait FrameProcessor {
    fn process(&mut self, frame_ind: u64, frame: RgbImage) -> Result<()>;
}

/// Blanket implementation so any closure with the right signature
/// automatically implements FrameProcessor.
impl<F> FrameProcessor for F
where
    F: FnMut(u64, RgbImage) -> Result<()>,
{
    fn process(&mut self, frame_ind: u64, frame: RgbImage) -> Result<()> {
        self(frame_ind, frame)
    }
}

/// Drain a reader once, in decode order, handing each frame and its absolute
/// index to `processor`.
pub fn process_video<P>(reader: &mut dyn VideoReader, mut processor: P) -> Result<ProcessingStats>
where
    P: FrameProcessor,
{
    let start_time = Instant::now();
    let mut processed_frames = 0usize;

    while let Some(frame) = reader.next_frame()? {
        processor.process(processed_frames as u64, frame)?;
        processed_frames += 1;
    }

    Ok(ProcessingStats {
        processed_frames,
        duration: start_time.elapsed(),
    })
}

/// Progress bar used by the batch stages.
pub fn batch_progress(len: u64, message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );
    pb.set_message(message.to_string());
    Ok(pb)
}
