//! Per-frame pitch tracking with the `pitch_detection` YIN detector.

use pitch_detection::detector::PitchDetector;
use pitch_detection::detector::yin::YINDetector;
use rayon::prelude::*;

use super::frames::Frames;

#[derive(Debug, Clone, Copy)]
pub struct YinParams {
    pub fmin_hz: f64,
    pub fmax_hz: f64,
    /// Minimum clarity (0..1) for a frame to count as voiced.
    pub clarity_threshold: f64,
    /// Frames quieter than this RMS are not analyzed.
    pub silence_rms: f64,
}

impl YinParams {
    /// The detector gates on total frame power, not RMS.
    fn power_threshold(&self, frame_length: usize) -> f32 {
        (self.silence_rms * self.silence_rms * frame_length as f64) as f32
    }
}

/// Estimate the pitch of every frame. Unvoiced or silent frames are `NaN`.
///
/// Each rayon worker owns one detector, since detection needs scratch buffers.
pub fn pitch_track(frames: &Frames, sample_rate: u32, params: &YinParams) -> Vec<f64> {
    let size = frames.frame_length();
    let power = params.power_threshold(size);
    (0..frames.len())
        .into_par_iter()
        .map_init(
            || YINDetector::<f32>::new(size, size / 2),
            |detector, i| {
                detector
                    .get_pitch(
                        frames.frame(i),
                        sample_rate as usize,
                        power,
                        params.clarity_threshold as f32,
                    )
                    .map(|pitch| f64::from(pitch.frequency))
                    .filter(|f| f.is_finite() && (params.fmin_hz..=params.fmax_hz).contains(f))
                    .unwrap_or(f64::NAN)
            },
        )
        .collect()
}
