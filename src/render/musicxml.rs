//! MusicXML 3.1 export of a detected note sequence.

use std::fmt::Write;

use super::escape_markup;
use crate::notes::{Note, PITCH_CLASS_NAMES};
use crate::solfege::SemitoneClass;

/// Divisions per quarter note (sixteenth-note resolution).
const DIVISIONS: u32 = 4;
/// Divisions in one 4/4 measure.
const MEASURE_DIVISIONS: u32 = 4 * DIVISIONS;

/// Export notes as a single-part, treble-clef, 4/4 score in C major.
/// Every note carries its solfege syllable as a lyric.
pub fn to_musicxml(notes: &[Note], tempo_bpm: f64, title: &str) -> String {
    let mut xml = String::new();
    let w = &mut xml;
    // Writing to a String cannot fail.
    let _ = writeln!(w, r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>"#);
    let _ = writeln!(
        w,
        r#"<!DOCTYPE score-partwise PUBLIC "-//Recordare//DTD MusicXML 3.1 Partwise//EN" "http://www.musicxml.org/dtds/partwise.dtd">"#
    );
    let _ = writeln!(w, r#"<score-partwise version="3.1">"#);
    let _ = writeln!(w, "  <work><work-title>{}</work-title></work>", escape_markup(title));
    let _ = writeln!(
        w,
        r#"  <part-list><score-part id="P1"><part-name>Voice</part-name></score-part></part-list>"#
    );
    let _ = writeln!(w, r#"  <part id="P1">"#);

    let measures = split_measures(notes);
    for (i, measure) in measures.iter().enumerate() {
        let _ = writeln!(w, r#"    <measure number="{}">"#, i + 1);
        if i == 0 {
            write_first_measure_header(w, tempo_bpm);
        }
        if measure.is_empty() {
            let _ = writeln!(
                w,
                r#"      <note><rest measure="yes"/><duration>{MEASURE_DIVISIONS}</duration></note>"#
            );
        }
        for note in measure {
            write_note(w, note);
        }
        let _ = writeln!(w, "    </measure>");
    }

    let _ = writeln!(w, "  </part>");
    let _ = writeln!(w, "</score-partwise>");
    xml
}

fn write_first_measure_header(w: &mut String, tempo_bpm: f64) {
    let _ = writeln!(
        w,
        "      <attributes><divisions>{DIVISIONS}</divisions>\
         <key><fifths>0</fifths><mode>major</mode></key>\
         <time><beats>4</beats><beat-type>4</beat-type></time>\
         <clef><sign>G</sign><line>2</line></clef></attributes>"
    );
    let _ = writeln!(
        w,
        r#"      <direction placement="above"><direction-type><metronome><beat-unit>quarter</beat-unit><per-minute>{tempo:.0}</per-minute></metronome></direction-type><sound tempo="{tempo:.1}"/></direction>"#,
        tempo = tempo_bpm
    );
}

fn write_note(w: &mut String, note: &Note) {
    let (step, alter, octave) = pitch_parts(note.midi);
    let duration = note_divisions(note);
    let _ = write!(w, "      <note><pitch><step>{step}</step>");
    if alter != 0 {
        let _ = write!(w, "<alter>{alter}</alter>");
    }
    let _ = write!(w, "<octave>{octave}</octave></pitch><duration>{duration}</duration>");
    if let Some((kind, dotted)) = note_type(duration) {
        let _ = write!(w, "<type>{kind}</type>");
        if dotted {
            let _ = write!(w, "<dot/>");
        }
    }
    let _ = writeln!(
        w,
        r#"<lyric number="1"><syllabic>single</syllabic><text>{}</text></lyric></note>"#,
        escape_markup(note.solfege)
    );
}

/// Group notes into 4/4 measures without splitting a note across a barline.
fn split_measures(notes: &[Note]) -> Vec<Vec<&Note>> {
    let mut measures: Vec<Vec<&Note>> = vec![Vec::new()];
    let mut filled = 0;
    for note in notes {
        let d = note_divisions(note);
        if filled > 0 && filled + d > MEASURE_DIVISIONS {
            measures.push(Vec::new());
            filled = 0;
        }
        if let Some(current) = measures.last_mut() {
            current.push(note);
        }
        filled += d;
    }
    measures
}

fn note_divisions(note: &Note) -> u32 {
    ((note.duration_units * DIVISIONS as f64).round() as u32).clamp(1, MEASURE_DIVISIONS)
}

/// MusicXML note type for a duration in divisions, with a dot flag.
fn note_type(divisions: u32) -> Option<(&'static str, bool)> {
    match divisions {
        1 => Some(("16th", false)),
        2 => Some(("eighth", false)),
        3 => Some(("eighth", true)),
        4 => Some(("quarter", false)),
        6 => Some(("quarter", true)),
        8 => Some(("half", false)),
        12 => Some(("half", true)),
        16 => Some(("whole", false)),
        _ => None,
    }
}

/// Step letter, chromatic alteration and octave, spelled with sharps.
fn pitch_parts(midi: i32) -> (char, i32, i32) {
    let name = PITCH_CLASS_NAMES[SemitoneClass::from_midi(midi).index()];
    let step = name.chars().next().unwrap_or('C');
    let alter = if name.ends_with('#') { 1 } else { 0 };
    (step, alter, midi.div_euclid(12) - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::{PitchEvent, notes_from_pitch_events};

    fn scale_notes(count: usize) -> Vec<Note> {
        let events: Vec<PitchEvent> = (0..count)
            .map(|i| PitchEvent::new(i as f64 * 0.5, 261.63 * 2f64.powf(i as f64 / 12.0)))
            .collect();
        notes_from_pitch_events(&events)
    }

    #[test]
    fn test_pitch_parts() {
        assert_eq!(pitch_parts(60), ('C', 0, 4));
        assert_eq!(pitch_parts(61), ('C', 1, 4));
        assert_eq!(pitch_parts(71), ('B', 0, 4));
        assert_eq!(pitch_parts(21), ('A', 0, 0));
    }

    #[test]
    fn test_eighth_notes_fill_measures_of_eight() {
        let notes = scale_notes(10);
        let measures = split_measures(&notes);
        assert_eq!(measures.len(), 2);
        assert_eq!(measures[0].len(), 8);
        assert_eq!(measures[1].len(), 2);
    }

    #[test]
    fn test_document_structure() {
        let xml = to_musicxml(&scale_notes(3), 100.0, "Etude & Co");
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains(r#"<score-partwise version="3.1">"#));
        assert!(xml.contains("<work-title>Etude &amp; Co</work-title>"));
        assert!(xml.contains("<per-minute>100</per-minute>"));
        assert!(xml.contains(r#"<sound tempo="100.0"/>"#));
        assert_eq!(xml.matches("<note>").count(), 3);
        assert!(xml.contains("<step>C</step><alter>1</alter><octave>4</octave>"));
        assert!(xml.contains("<duration>2</duration><type>eighth</type>"));
        assert!(xml.contains("<text>Di</text>"));
        assert!(xml.trim_end().ends_with("</score-partwise>"));
    }

    #[test]
    fn test_empty_score_has_measure_rest() {
        let xml = to_musicxml(&[], 120.0, "Empty");
        assert!(xml.contains(r#"<rest measure="yes"/>"#));
        assert!(xml.contains(r#"<measure number="1">"#));
    }
}
