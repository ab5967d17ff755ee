use std::fmt::Write;

use super::{ImageFormat, RenderError, RenderedImage, Renderer, escape_markup};
use crate::config::RenderConfig;
use crate::notes::{Note, frequency_for_midi};

/// MIDI number drawn on the middle staff line.
const MIDDLE_MIDI: i32 = 60;
/// Horizontal room reserved for the clef, in staff spaces.
const CLEF_WIDTH: f64 = 5.0;
const HEADER_HEIGHT: f64 = 5.0;
const FOOTER_HEIGHT: f64 = 3.0;
/// Gap between a note head and its solfege label, in staff spaces.
const LABEL_OFFSET: f64 = 1.5;

/// Local renderer: draws a treble staff with solfege labels as SVG.
///
/// Note heads sit at `(midi - 60) / 2` staff spaces from the middle line.
/// Stems point down for notes on or above the middle line and up below it;
/// labels go on the opposite side of the head from the stem.
pub struct StaffRenderer {
    style: RenderConfig,
    title: String,
    author: String,
}

impl StaffRenderer {
    pub fn new(style: RenderConfig, title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            style,
            title: title.into(),
            author: author.into(),
        }
    }

    /// Render to an SVG document string.
    pub fn to_svg(&self, notes: &[Note], tempo_bpm: f64) -> Result<String, RenderError> {
        if notes.is_empty() {
            return Err(RenderError::NothingToRender);
        }
        let s = &self.style;
        let scale = s.scale;

        let positions: Vec<f64> = notes.iter().map(staff_position).collect();
        let reach = s.stem_length + LABEL_OFFSET + 1.0;
        let top = positions.iter().cloned().fold(4.5, f64::max) + reach;
        let bottom = positions.iter().cloned().fold(-4.5, f64::min) - reach;

        let width = (CLEF_WIDTH + notes.len() as f64 * s.note_spacing + 2.0) * scale;
        let staff_height = top - bottom;
        let height = (HEADER_HEIGHT + staff_height + FOOTER_HEIGHT) * scale;
        // Staff-space coordinates to pixels; staff position grows upward.
        let px_x = |x: f64| x * scale;
        let px_y = |pos: f64| (HEADER_HEIGHT + top - pos) * scale;

        let mut svg = String::new();
        let w = &mut svg;
        // Writing to a String cannot fail.
        let _ = writeln!(
            w,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width:.1}" height="{height:.1}" viewBox="0 0 {width:.1} {height:.1}" font-family="Times New Roman, Times, serif">"#
        );
        let _ = writeln!(
            w,
            r#"<rect width="100%" height="100%" fill="{}"/>"#,
            escape_markup(&s.background_color)
        );
        let _ = writeln!(
            w,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="middle" font-size="{:.1}" font-weight="bold">{}</text>"#,
            width / 2.0,
            2.0 * scale,
            1.4 * scale,
            escape_markup(&self.title)
        );
        let _ = writeln!(
            w,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="middle" font-size="{:.1}">Tempo: {:.1} BPM | Key: C Major</text>"#,
            width / 2.0,
            3.5 * scale,
            scale,
            tempo_bpm
        );

        let staff_color = escape_markup(&s.staff_color);
        for line in -2..=2 {
            let y = px_y(line as f64);
            let _ = writeln!(
                w,
                r#"<line x1="{:.1}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="{staff_color}" stroke-width="{:.2}"/>"#,
                px_x(0.5),
                width - px_x(0.5),
                s.staff_line_width
            );
        }
        let _ = writeln!(
            w,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="middle" font-size="{:.1}" fill="{staff_color}">&#x1D11E;</text>"#,
            px_x(CLEF_WIDTH / 2.0),
            px_y(-2.5),
            6.5 * scale
        );

        let note_color = escape_markup(&s.note_color);
        let radius = s.note_radius * scale;
        for (i, (note, &pos)) in notes.iter().zip(&positions).enumerate() {
            let x = px_x(CLEF_WIDTH + (i as f64 + 0.5) * s.note_spacing);
            let y = px_y(pos);
            let stem_direction = if pos >= 0.0 { -1.0 } else { 1.0 };
            let stem_x = x + radius;

            let _ = writeln!(
                w,
                r#"<circle cx="{x:.1}" cy="{y:.1}" r="{radius:.1}" fill="{note_color}" stroke="{note_color}"><title>{} ({:.1} Hz)</title></circle>"#,
                escape_markup(&note.pitch_name),
                frequency_for_midi(note.midi)
            );
            let _ = writeln!(
                w,
                r#"<line x1="{stem_x:.1}" y1="{y:.1}" x2="{stem_x:.1}" y2="{:.1}" stroke="{note_color}" stroke-width="{:.2}"/>"#,
                px_y(pos + stem_direction * s.stem_length),
                (s.stem_width * scale).max(1.0)
            );
            let _ = writeln!(
                w,
                r#"<text x="{x:.1}" y="{:.1}" text-anchor="middle" dominant-baseline="middle" font-size="{:.1}" font-weight="bold">{}</text>"#,
                px_y(pos - LABEL_OFFSET * stem_direction),
                0.9 * scale,
                escape_markup(note.solfege)
            );
        }

        let _ = writeln!(
            w,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="middle" font-size="{:.1}" font-style="italic">Generated by {}</text>"#,
            width / 2.0,
            height - scale,
            0.8 * scale,
            escape_markup(&self.author)
        );
        svg.push_str("</svg>\n");
        Ok(svg)
    }
}

impl Renderer for StaffRenderer {
    fn name(&self) -> &'static str {
        "staff"
    }

    fn render(&self, notes: &[Note], tempo_bpm: f64) -> Result<RenderedImage, RenderError> {
        let svg = self.to_svg(notes, tempo_bpm)?;
        Ok(RenderedImage {
            format: ImageFormat::Svg,
            bytes: svg.into_bytes(),
        })
    }
}

/// Vertical position in staff spaces, 0 = middle line (middle C).
fn staff_position(note: &Note) -> f64 {
    (note.midi - MIDDLE_MIDI) as f64 / 2.0
}
