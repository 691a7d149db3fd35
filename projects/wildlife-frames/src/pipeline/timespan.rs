use std::collections::BTreeSet;

/// Frame indices covered by the interval `[t_start, t_end]` (seconds) of a
/// video decoded at `fps`.
///
/// A start that falls between two frames is floored and an end that falls
/// between two frames is ceiled, so the set may include one boundary frame
/// of ambiguous class on each side but never misses a frame of the interval.
/// The returned range is half open: `[start, end)`.
pub fn frames_in_timespan(t_start: f64, t_end: f64, fps: f64) -> BTreeSet<u64> {
    let t_frame = 1.0 / fps;

    let mut frame_start = t_start / t_frame;
    if frame_start % 1.0 > 0.0 {
        tracing::debug!(
            "Start frame {} is not on a frame boundary, flooring",
            frame_start
        );
        frame_start = frame_start.floor();
    }

    let mut frame_end = t_end / t_frame;
    if frame_end % 1.0 > 0.0 {
        tracing::debug!("End frame {} is not on a frame boundary, ceiling", frame_end);
        frame_end = frame_end.ceil();
    }

    tracing::debug!(
        "Frames with target start at frame {} and end at {}",
        frame_start,
        frame_end
    );

    let start = frame_start.max(0.0) as u64;
    let end = frame_end.max(0.0) as u64;
    (start..end).collect()
}
