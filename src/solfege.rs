
use thiserror::Error;

/// Number of semitone classes in the chromatic scale.
pub const SEMITONES: usize = 12;

/// Chromatic solfege syllables indexed by semitone class (0 = C = Do).
/// Raised syllables (Di, Ri, Fi, Si, Li) name the black keys in fixed-Do C major.
pub const SOLFEGE_TABLE: [&str; SEMITONES] = [
    "Do", "Di", "Re", "Ri", "Mi", "Fa", "Fi", "Sol", "Si", "La", "Li", "Ti",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolfegeError {
    #[error("Invalid semitone class {0} (expected 0..=11)")]
    InvalidSemitoneClass(i32),
}

/// Look up the solfege syllable for a semitone class.
pub fn solfege_for(semitone_class: i32) -> Result<&'static str, SolfegeError> {
    SemitoneClass::new(semitone_class).map(SemitoneClass::solfege)
}

/// A pitch reduced modulo 12. Always in `0..=11`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SemitoneClass(u8);

impl SemitoneClass {
    pub fn new(value: i32) -> Result<Self, SolfegeError> {
        if (0..SEMITONES as i32).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(SolfegeError::InvalidSemitoneClass(value))
        }
    }

    /// Semitone class of a MIDI note number. Negative numbers wrap upward
    /// (MIDI -1 is class 11).
    pub fn from_midi(midi: i32) -> Self {
        Self(midi.rem_euclid(SEMITONES as i32) as u8)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn solfege(self) -> &'static str {
        SOLFEGE_TABLE[self.index()]
    }
}
