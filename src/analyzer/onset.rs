//! Onset and tempo detection, delegated to `stratum_dsp`.

use stratum_dsp::features::onset::energy_flux::detect_energy_flux_onsets;

#[derive(Debug, Clone, Copy)]
pub struct OnsetParams {
    pub frame_length: usize,
    pub hop_length: usize,
    /// Energy rise, in dB, that counts as an onset.
    pub threshold_db: f64,
    /// Minimum frames between two onsets; closer ones are merged into the first.
    pub wait: usize,
}

/// Detect note onsets and return them as frame indices on the `hop_length` grid.
///
/// A detector failure is logged and treated as "no onsets".
pub fn detect_onsets(samples: &[f32], params: &OnsetParams) -> Vec<usize> {
    if samples.is_empty() {
        return Vec::new();
    }
    match detect_energy_flux_onsets(
        samples,
        params.frame_length,
        params.hop_length,
        params.threshold_db as _,
    ) {
        Ok(positions) => onset_frames(&positions, params.hop_length, params.wait),
        Err(e) => {
            log::warn!("Onset detection failed: {}", e);
            Vec::new()
        }
    }
}

/// Sample positions to sorted frame indices, dropping onsets within `wait`
/// frames of the last kept one.
fn onset_frames(positions: &[usize], hop_length: usize, wait: usize) -> Vec<usize> {
    let mut frames: Vec<usize> = positions
        .iter()
        .map(|&p| (p + hop_length / 2) / hop_length)
        .collect();
    frames.sort_unstable();

    let mut kept: Vec<usize> = Vec::with_capacity(frames.len());
    for frame in frames {
        match kept.last() {
            Some(&last) if frame <= last + wait => {}
            _ => kept.push(frame),
        }
    }
    kept
}

/// Estimate the tempo in BPM, rounded to one decimal.
/// Falls back to `default_bpm` when no beat can be found.
pub fn estimate_tempo(samples: &[f32], sample_rate: u32, default_bpm: f64) -> f64 {
    if samples.is_empty() {
        return default_bpm;
    }
    match stratum_dsp::analyze_audio(samples, sample_rate, stratum_dsp::AnalysisConfig::default()) {
        Ok(result) => {
            let bpm = f64::from(result.bpm);
            if bpm.is_finite() && bpm > 0.0 {
                (bpm * 10.0).round() / 10.0
            } else {
                log::debug!("No tempo found, using {} BPM", default_bpm);
                default_bpm
            }
        }
        Err(e) => {
            log::debug!("Tempo estimation failed ({}), using {} BPM", e, default_bpm);
            default_bpm
        }
    }
}
