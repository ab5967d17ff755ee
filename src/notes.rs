use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::solfege::SemitoneClass;

/// Reference pitch: A4 = MIDI 69 = 440 Hz.
pub const A4_MIDI: i32 = 69;
pub const A4_HZ: f64 = 440.0;

/// Nominal length of every detected note, in quarter notes (an eighth note).
/// No rhythm is inferred from onset spacing.
pub const DEFAULT_NOTE_DURATION: f64 = 0.5;

/// Pitch class names, sharps spelling, indexed by semitone class.
pub const PITCH_CLASS_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// One detected pitch at a point in time, as produced by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PitchEvent {
    pub time_secs: f64,
    pub frequency_hz: f64,
}

impl PitchEvent {
    pub fn new(time_secs: f64, frequency_hz: f64) -> Self {
        Self { time_secs, frequency_hz }
    }

    /// Voiced frames carry a finite, positive frequency. NaN, zero,
    /// negative and infinite values all mark unvoiced frames.
    pub fn is_voiced(&self) -> bool {
        self.frequency_hz.is_finite() && self.frequency_hz > 0.0
    }
}

/// A detected note annotated with its solfege syllable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    pub pitch_name: String,
    pub midi: i32,
    #[serde(serialize_with = "serialize_semitone_class")]
    pub semitone_class: SemitoneClass,
    pub solfege: &'static str,
    pub duration_units: f64,
    pub frequency_hz: f64,
    pub time_secs: f64,
}

fn serialize_semitone_class<S: serde::Serializer>(
    class: &SemitoneClass,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(class.index() as u8)
}

impl Note {
    /// Build a note from a voiced pitch event.
    /// Returns `None` for unvoiced events.
    pub fn from_event(event: &PitchEvent, duration_units: f64) -> Option<Self> {
        if !event.is_voiced() {
            return None;
        }
        let midi = round_half_up(midi_from_frequency(event.frequency_hz));
        let semitone_class = SemitoneClass::from_midi(midi);
        Some(Self {
            pitch_name: pitch_name_for_midi(midi),
            midi,
            semitone_class,
            solfege: semitone_class.solfege(),
            duration_units,
            frequency_hz: event.frequency_hz,
            time_secs: event.time_secs,
        })
    }
}

/// Convert pitch events into notes with the default nominal duration.
/// Unvoiced events are skipped; order is preserved.
pub fn notes_from_pitch_events(events: &[PitchEvent]) -> Vec<Note> {
    notes_from_pitch_events_with_duration(events, DEFAULT_NOTE_DURATION)
}

pub fn notes_from_pitch_events_with_duration(
    events: &[PitchEvent],
    duration_units: f64,
) -> Vec<Note> {
    events
        .iter()
        .filter_map(|e| Note::from_event(e, duration_units))
        .collect()
}

/// Fractional MIDI number for a frequency: `69 + 12 * log2(f / 440)`.
pub fn midi_from_frequency(frequency_hz: f64) -> f64 {
    A4_MIDI as f64 + 12.0 * (frequency_hz / A4_HZ).log2()
}

/// Equal-tempered frequency of a MIDI note number.
pub fn frequency_for_midi(midi: i32) -> f64 {
    A4_HZ * 2f64.powf((midi - A4_MIDI) as f64 / 12.0)
}

/// Round half up: 60.5 -> 61, -0.5 -> 0.
fn round_half_up(x: f64) -> i32 {
    (x + 0.5).floor() as i32
}

/// Scientific pitch name with the octave boundary at C (MIDI 60 = "C4").
pub fn pitch_name_for_midi(midi: i32) -> String {
    let class = SemitoneClass::from_midi(midi);
    let octave = midi.div_euclid(12) - 1;
    format!("{}{}", PITCH_CLASS_NAMES[class.index()], octave)
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NoteError {
    #[error("Unrecognized pitch name: {0:?}")]
    UnrecognizedPitchName(String),
    #[error("Octave out of range in {0:?}")]
    OctaveOutOfRange(String),
}

static PITCH_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<letter>[A-Ga-g])(?P<accidental>[#b♯♭]?)(?P<octave>-?\d{1,2})?$").unwrap()
});

/// Parse a pitch name like "C", "C#4", "Db3" or "B-1" into a MIDI number.
/// A missing octave means octave 4.
pub fn parse_pitch_name(name: &str) -> Result<i32, NoteError> {
    let trimmed = name.trim();
    let caps = PITCH_NAME_RE
        .captures(trimmed)
        .ok_or_else(|| NoteError::UnrecognizedPitchName(name.to_string()))?;

    let base = match caps["letter"].to_ascii_uppercase().as_str() {
        "C" => 0,
        "D" => 2,
        "E" => 4,
        "F" => 5,
        "G" => 7,
        "A" => 9,
        "B" => 11,
        _ => return Err(NoteError::UnrecognizedPitchName(name.to_string())),
    };
    let alter = match caps.name("accidental").map(|m| m.as_str()) {
        Some("#") | Some("♯") => 1,
        Some("b") | Some("♭") => -1,
        _ => 0,
    };
    let octave: i32 = match caps.name("octave") {
        Some(m) => m
            .as_str()
            .parse()
            .map_err(|_| NoteError::OctaveOutOfRange(name.to_string()))?,
        None => 4,
    };
    if !(-1..=9).contains(&octave) {
        return Err(NoteError::OctaveOutOfRange(name.to_string()));
    }

    Ok((octave + 1) * 12 + base + alter)
}

/// Solfege syllable for a pitch name, e.g. "F#3" -> "Fi".
pub fn solfege_for_pitch_name(name: &str) -> Result<&'static str, NoteError> {
    parse_pitch_name(name).map(|midi| SemitoneClass::from_midi(midi).solfege())
}
