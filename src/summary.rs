use std::collections::HashMap;

use serde::Serialize;

use crate::notes::Note;

/// One row of the solfa analysis table: a distinct pitch and how often it occurred.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PitchGroupSummary {
    pub pitch_name: String,
    pub solfege: &'static str,
    /// Frequency of the first note seen for this pitch.
    pub frequency_hz: f64,
    pub count: usize,
}

/// Group notes by pitch name and sort the groups by ascending frequency.
///
/// Each group keeps the frequency of its first note. Groups with equal
/// frequency are ordered by pitch name so the output is deterministic.
pub fn summarize(notes: &[Note]) -> Vec<PitchGroupSummary> {
    let mut groups: Vec<PitchGroupSummary> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for note in notes {
        match index.get(note.pitch_name.as_str()) {
            Some(&i) => groups[i].count += 1,
            None => {
                index.insert(note.pitch_name.as_str(), groups.len());
                groups.push(PitchGroupSummary {
                    pitch_name: note.pitch_name.clone(),
                    solfege: note.solfege,
                    frequency_hz: note.frequency_hz,
                    count: 1,
                });
            }
        }
    }

    groups.sort_by(|a, b| {
        a.frequency_hz
            .total_cmp(&b.frequency_hz)
            .then_with(|| a.pitch_name.cmp(&b.pitch_name))
    });
    groups
}

/// Headline numbers for the performance analysis section of a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceStats {
    pub total_notes: usize,
    pub distinct_pitches: usize,
    /// Lowest and highest pitch by summary frequency. `None` without notes.
    pub lowest: Option<String>,
    pub highest: Option<String>,
}

impl PerformanceStats {
    pub fn from_notes(notes: &[Note]) -> Self {
        Self::from_summary(notes.len(), &summarize(notes))
    }

    pub fn from_summary(total_notes: usize, summary: &[PitchGroupSummary]) -> Self {
        Self {
            total_notes,
            distinct_pitches: summary.len(),
            lowest: summary.first().map(|g| g.pitch_name.clone()),
            highest: summary.last().map(|g| g.pitch_name.clone()),
        }
    }

    /// "C4 to G5", or `None` when nothing was detected.
    pub fn pitch_range(&self) -> Option<String> {
        match (&self.lowest, &self.highest) {
            (Some(lo), Some(hi)) => Some(format!("{lo} to {hi}")),
            _ => None,
        }
    }
}
