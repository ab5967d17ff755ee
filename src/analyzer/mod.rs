pub mod decode;
pub mod frames;
pub mod onset;
pub mod yin;

use decode::DecodedAudio;
use frames::Frames;
use thiserror::Error;

use crate::config::{AnalysisConfig, EventSource};
use crate::notes::PitchEvent;

/// Frames examined after an onset when picking its pitch.
const ONSET_SETTLE_FRAMES: usize = 4;

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("Decode error: {0}")]
    Decode(#[from] decode::DecodeError),
    #[error("Invalid analysis config: {0}")]
    InvalidConfig(String),
}

/// What the analyzer extracted from one recording.
#[derive(Debug, Clone)]
pub struct AudioAnalysis {
    /// Pitch events in time order. Unvoiced events carry a NaN frequency.
    pub events: Vec<PitchEvent>,
    pub tempo_bpm: f64,
    pub duration_secs: f64,
    pub sample_rate: u32,
}

/// Turns encoded audio into pitch events and a tempo estimate.
pub trait AudioAnalyzer {
    fn analyze(
        &self,
        audio: &[u8],
        format_hint: Option<&str>,
    ) -> Result<AudioAnalysis, AnalyzeError>;
}

/// Monophonic analyzer: YIN pitch per frame, energy-flux onsets and tempo.
#[derive(Debug, Clone)]
pub struct YinAnalyzer {
    config: AnalysisConfig,
}

impl YinAnalyzer {
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalyzeError> {
        validate(&config)?;
        Ok(Self { config })
    }

    /// Analyze already-decoded mono audio.
    pub fn analyze_decoded(&self, audio: &DecodedAudio) -> AudioAnalysis {
        let cfg = &self.config;
        let frames = Frames::new(&audio.samples, cfg.frame_length, cfg.hop_length);
        let frame_rate = audio.sample_rate as f64 / cfg.hop_length as f64;

        let pitches = yin::pitch_track(
            &frames,
            audio.sample_rate,
            &yin::YinParams {
                fmin_hz: cfg.fmin_hz,
                fmax_hz: cfg.fmax_hz,
                clarity_threshold: cfg.clarity_threshold,
                silence_rms: cfg.silence_rms,
            },
        );

        let tempo_bpm =
            onset::estimate_tempo(&audio.samples, audio.sample_rate, cfg.default_tempo_bpm);

        let events = match cfg.event_source {
            EventSource::Frames => pitches
                .iter()
                .enumerate()
                .map(|(i, &f)| PitchEvent::new(i as f64 / frame_rate, f))
                .collect(),
            EventSource::Onsets => {
                let onsets = onset::detect_onsets(
                    &audio.samples,
                    &onset::OnsetParams {
                        frame_length: cfg.frame_length,
                        hop_length: cfg.hop_length,
                        threshold_db: cfg.onset_threshold_db,
                        wait: cfg.onset_wait,
                    },
                );
                events_at_onsets(&onsets, &pitches, frame_rate)
            }
        };

        log::debug!(
            "{} frames, {} events, tempo {:.1} BPM",
            frames.len(),
            events.len(),
            tempo_bpm
        );

        AudioAnalysis {
            events,
            tempo_bpm,
            duration_secs: audio.duration_secs(),
            sample_rate: audio.sample_rate,
        }
    }
}

impl AudioAnalyzer for YinAnalyzer {
    fn analyze(
        &self,
        audio: &[u8],
        format_hint: Option<&str>,
    ) -> Result<AudioAnalysis, AnalyzeError> {
        let decoded = decode::decode_audio(audio, format_hint)?;
        Ok(self.analyze_decoded(&decoded))
    }
}

fn validate(cfg: &AnalysisConfig) -> Result<(), AnalyzeError> {
    if cfg.hop_length == 0 {
        return Err(AnalyzeError::InvalidConfig("hop_length must be > 0".into()));
    }
    if cfg.frame_length < 64 {
        return Err(AnalyzeError::InvalidConfig("frame_length must be >= 64".into()));
    }
    if !(cfg.fmin_hz > 0.0 && cfg.fmin_hz < cfg.fmax_hz) {
        return Err(AnalyzeError::InvalidConfig(format!(
            "need 0 < fmin_hz < fmax_hz, got {} and {}",
            cfg.fmin_hz, cfg.fmax_hz
        )));
    }
    if !(cfg.clarity_threshold > 0.0 && cfg.clarity_threshold <= 1.0) {
        return Err(AnalyzeError::InvalidConfig(format!(
            "clarity_threshold must be in (0, 1], got {}",
            cfg.clarity_threshold
        )));
    }
    if !(cfg.note_duration > 0.0) {
        return Err(AnalyzeError::InvalidConfig("note_duration must be > 0".into()));
    }
    Ok(())
}

/// One event per onset. The pitch is the median of the voiced frames in the
/// few frames after the onset, stopping at the next onset, so the partially
/// filled onset frame does not decide the note alone.
fn events_at_onsets(onsets: &[usize], pitches: &[f64], frame_rate: f64) -> Vec<PitchEvent> {
    onsets
        .iter()
        .enumerate()
        .map(|(k, &start)| {
            let next = onsets.get(k + 1).copied().unwrap_or(pitches.len());
            let end = (start + ONSET_SETTLE_FRAMES + 1).min(next).min(pitches.len());
            let mut voiced: Vec<f64> = pitches[start.min(end)..end]
                .iter()
                .copied()
                .filter(|f| f.is_finite() && *f > 0.0)
                .collect();
            let freq = median(&mut voiced).unwrap_or(f64::NAN);
            PitchEvent::new(start as f64 / frame_rate, freq)
        })
        .collect()
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    Some(values[values.len() / 2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::notes_from_pitch_events;
    use std::f32::consts::PI;

    const SR: u32 = 22050;

    fn melody(freqs: &[f32], on: f32, gap: f32) -> Vec<f32> {
        let mut out = vec![0.0; (gap * SR as f32) as usize];
        for &f in freqs {
            out.extend(
                (0..(on * SR as f32) as usize)
                    .map(|i| 0.5 * (2.0 * PI * f * i as f32 / SR as f32).sin()),
            );
            out.extend(std::iter::repeat_n(0.0, (gap * SR as f32) as usize));
        }
        out
    }

    #[test]
    fn test_onset_events_follow_melody() {
        let samples = melody(&[261.63, 329.63, 392.0], 0.4, 0.3);
        let bytes = decode::encode_wav_i16(&samples, SR);
        let analyzer = YinAnalyzer::new(AnalysisConfig::default()).unwrap();
        let analysis = analyzer.analyze(&bytes, Some("wav")).unwrap();

        let mut names: Vec<String> = notes_from_pitch_events(&analysis.events)
            .into_iter()
            .map(|n| n.pitch_name)
            .collect();
        names.dedup();
        assert_eq!(names, vec!["C4", "E4", "G4"]);
        assert!(analysis.events.windows(2).all(|w| w[0].time_secs < w[1].time_secs));
        assert_eq!(analysis.sample_rate, SR);
    }

    #[test]
    fn test_frame_events_cover_every_frame() {
        let samples = melody(&[440.0], 1.0, 0.2);
        let config = AnalysisConfig {
            event_source: EventSource::Frames,
            ..AnalysisConfig::default()
        };
        let analyzer = YinAnalyzer::new(config).unwrap();
        let decoded = DecodedAudio { samples: samples.clone(), sample_rate: SR };
        let analysis = analyzer.analyze_decoded(&decoded);

        assert_eq!(analysis.events.len(), Frames::new(&samples, 2048, 512).len());
        let notes = notes_from_pitch_events(&analysis.events);
        assert!(notes.len() < analysis.events.len(), "silence frames should be unvoiced");
        let a4 = notes.iter().filter(|n| n.pitch_name == "A4").count();
        assert!(a4 * 10 >= notes.len() * 9, "{a4} of {} notes were A4", notes.len());
    }

    #[test]
    fn test_silence_has_no_voiced_events() {
        let decoded = DecodedAudio { samples: vec![0.0; SR as usize], sample_rate: SR };
        let analyzer = YinAnalyzer::new(AnalysisConfig::default()).unwrap();
        let analysis = analyzer.analyze_decoded(&decoded);
        assert!(notes_from_pitch_events(&analysis.events).is_empty());
        assert_eq!(analysis.tempo_bpm, 120.0);
    }

    #[test]
    fn test_garbage_bytes_fail() {
        let analyzer = YinAnalyzer::new(AnalysisConfig::default()).unwrap();
        let result = analyzer.analyze(b"RIFF\x00\x00not really a wav", Some("wav"));
        assert!(matches!(result, Err(AnalyzeError::Decode(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad = AnalysisConfig { hop_length: 0, ..AnalysisConfig::default() };
        assert!(YinAnalyzer::new(bad).is_err());
        let bad = AnalysisConfig { fmin_hz: 500.0, fmax_hz: 100.0, ..AnalysisConfig::default() };
        assert!(YinAnalyzer::new(bad).is_err());
        let bad = AnalysisConfig { clarity_threshold: 1.5, ..AnalysisConfig::default() };
        assert!(YinAnalyzer::new(bad).is_err());
    }

    #[test]
    fn test_median_and_onset_windows() {
        assert_eq!(median(&mut []), None);
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));

        let pitches = vec![f64::NAN, 440.0, 441.0, 439.0, f64::NAN, 220.0, 220.0];
        let events = events_at_onsets(&[0, 5], &pitches, 10.0);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].frequency_hz, 440.0);
        assert_eq!(events[1].time_secs, 0.5);
        assert_eq!(events[1].frequency_hz, 220.0);
    }
}
