use super::VideoReader;
use crate::error::CurateError;
use anyhow::{anyhow, Context, Result};
use ffmpeg_next::ffi;
use image::RgbImage;
use std::path::Path;

// ---------------------------------------------------------------------------
// FfmpegReader
// ---------------------------------------------------------------------------

/// Video reader backed by FFmpeg via ffmpeg-next.
/// Decodes sequentially on the CPU and converts every frame to RGB24.
pub struct FfmpegReader {
    input_ctx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::codec::decoder::Video,
    video_stream_index: usize,
    /// Lazily created on first frame (source format is only known then).
    scaler: Option<ffmpeg_next::software::scaling::Context>,
    width: u32,
    height: u32,
    source_fps: f64,
    total_frames: usize,
    /// Persistent packet object to avoid allocations.
    reuse_packet: ffmpeg_next::codec::packet::Packet,
    /// Whether we've sent EOF to the decoder.
    eof_sent: bool,
}

impl FfmpegReader {
    pub fn open(path: &Path) -> Result<Self, CurateError> {
        if !path.is_file() {
            return Err(CurateError::VideoNotFound(path.to_path_buf()));
        }
        let open_error = |reason: String| CurateError::VideoOpen {
            path: path.to_path_buf(),
            reason,
        };

        ffmpeg_next::init().map_err(|e| open_error(format!("ffmpeg init failed: {}", e)))?;

        let input_ctx = ffmpeg_next::format::input(&path).map_err(|e| open_error(e.to_string()))?;

        let video_stream = input_ctx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| open_error("no video stream found".to_string()))?;

        let video_stream_index = video_stream.index();

        let rational_fps = video_stream.avg_frame_rate();
        let source_fps = if rational_fps.denominator() > 0 && rational_fps.numerator() > 0 {
            rational_fps.numerator() as f64 / rational_fps.denominator() as f64
        } else {
            tracing::warn!(
                "FfmpegReader: could not determine FPS of {:?}, defaulting to 30.0",
                path
            );
            30.0
        };

        let total_frames = video_stream.frames() as usize;
        let duration_secs = input_ctx.duration() as f64 / ffi::AV_TIME_BASE as f64;

        let calculated_total_frames = if total_frames == 0 {
            (duration_secs * source_fps).round() as usize
        } else {
            total_frames
        };

        let decoder_ctx =
            ffmpeg_next::codec::context::Context::from_parameters(video_stream.parameters())
                .map_err(|e| open_error(format!("failed to create decoder context: {}", e)))?;

        let decoder = decoder_ctx
            .decoder()
            .video()
            .map_err(|e| open_error(format!("failed to open video decoder: {}", e)))?;

        let width = decoder.width();
        let height = decoder.height();

        tracing::debug!(
            "FfmpegReader: opened {:?}, duration={:.2}s, fps={:.2}, estimated_total={}, size={}x{}",
            path,
            duration_secs,
            source_fps,
            calculated_total_frames,
            width,
            height
        );

        Ok(Self {
            input_ctx,
            decoder,
            video_stream_index,
            scaler: None,
            width,
            height,
            source_fps,
            total_frames: calculated_total_frames,
            reuse_packet: ffmpeg_next::codec::packet::Packet::empty(),
            eof_sent: false,
        })
    }

    /// Pull the next decoded frame into `target_frame`.
    /// Returns `false` once the decoder is drained.
    fn decode_loop(&mut self, target_frame: &mut ffmpeg_next::util::frame::Video) -> Result<bool> {
        loop {
            // 1. Try to receive a decoded frame
            match self.decoder.receive_frame(target_frame) {
                Ok(()) => return Ok(true),
                Err(ffmpeg_next::Error::Other { errno: ffi::EAGAIN }) => {
                    if self.eof_sent {
                        return Ok(false);
                    }
                }
                Err(ffmpeg_next::Error::Eof) => return Ok(false),
                Err(e) => return Err(anyhow!("Decoder error: {}", e)),
            }

            // 2. Feed packets until we find a video packet OR reach EOF
            let mut found_packet = false;
            while self.reuse_packet.read(&mut self.input_ctx).is_ok() {
                if self.reuse_packet.stream() == self.video_stream_index {
                    self.decoder
                        .send_packet(&self.reuse_packet)
                        .context("Failed to send packet to decoder")?;
                    found_packet = true;
                    break;
                }
            }

            if !found_packet {
                // Input exhausted, flush the decoder
                self.decoder
                    .send_eof()
                    .context("Failed to send EOF to decoder")?;
                self.eof_sent = true;
            }
        }
    }

    fn convert_to_rgb(
        &mut self,
        frame: &ffmpeg_next::util::frame::Video,
    ) -> Result<ffmpeg_next::util::frame::Video> {
        if self.scaler.is_none() {
            let scaler = ffmpeg_next::software::scaling::Context::get(
                frame.format(),
                self.width,
                self.height,
                ffmpeg_next::format::Pixel::RGB24,
                self.width,
                self.height,
                ffmpeg_next::software::scaling::Flags::BILINEAR,
            )
            .context("Failed to create scaler")?;
            self.scaler = Some(scaler);
        }

        let scaler = self
            .scaler
            .as_mut()
            .ok_or_else(|| anyhow!("Scaler not initialised"))?;
        let mut rgb_frame = ffmpeg_next::util::frame::Video::empty();
        scaler
            .run(frame, &mut rgb_frame)
            .context("Scaler failed")?;
        Ok(rgb_frame)
    }
}

/// Copy an RGB24 ffmpeg frame into an owned `RgbImage`, dropping row padding.
fn rgb_frame_to_image(frame: &ffmpeg_next::util::frame::Video) -> Result<RgbImage> {
    let width = frame.width();
    let height = frame.height();
    let data = frame.data(0);
    let stride = frame.stride(0);
    let row_len = width as usize * 3;

    let mut buffer = Vec::with_capacity(row_len * height as usize);
    for y in 0..height as usize {
        let src_offset = y * stride;
        buffer.extend_from_slice(&data[src_offset..src_offset + row_len]);
    }

    RgbImage::from_raw(width, height, buffer)
        .ok_or_else(|| anyhow!("Frame buffer does not match {}x{}", width, height))
}

impl VideoReader for FfmpegReader {
    fn source_fps(&self) -> Result<f64> {
        Ok(self.source_fps)
    }

    fn frame_count(&self) -> Result<usize> {
        Ok(self.total_frames)
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let mut raw_frame = ffmpeg_next::util::frame::Video::empty();
        if !self.decode_loop(&mut raw_frame)? {
            return Ok(None);
        }
        let rgb_frame = self.convert_to_rgb(&raw_frame)?;
        Ok(Some(rgb_frame_to_image(&rgb_frame)?))
    }
}
