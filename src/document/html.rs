use std::fmt::Write;

use base64::{Engine, engine::general_purpose};

use super::{
    Document, DocumentBuilder, DocumentError, NOTATION_UNAVAILABLE_TEXT, ReportFormat, ReportMeta,
};
use crate::pipeline::Transcription;
use crate::render::escape_markup;

const STYLE: &str = "body{font-family:'Times New Roman',Times,serif;max-width:52em;margin:2em auto;color:#000}\
h1.title{font-size:28pt;text-align:center}\
.center{text-align:center}\
.author{font-size:14pt;font-style:italic}\
figure{margin:1em 0;text-align:center}\
figure img{max-width:100%}\
table{border-collapse:collapse;width:100%}\
th{background:#4f81bd;color:#fff}\
th,td{border:1px solid #95b3d7;padding:.3em .6em;text-align:left}\
tr:nth-child(even) td{background:#dbe5f1}\
footer{margin-top:3em;text-align:center;font-size:9pt;color:#555}";

/// Standalone HTML transcription report with the staff image inlined.
pub struct HtmlReport;

impl DocumentBuilder for HtmlReport {
    fn format(&self) -> ReportFormat {
        ReportFormat::Html
    }

    fn build(&self, t: &Transcription, meta: &ReportMeta) -> Result<Document, DocumentError> {
        let title = escape_markup(&meta.title);
        let author = escape_markup(&meta.author);
        let mut html = String::new();
        let w = &mut html;
        // Writing to a String cannot fail.
        let _ = writeln!(w, "<!DOCTYPE html>");
        let _ = writeln!(w, r#"<html lang="en"><head><meta charset="utf-8">"#);
        let _ = writeln!(w, "<title>{title}</title><style>{STYLE}</style></head><body>");

        let _ = writeln!(w, r#"<h1 class="title">{title}</h1>"#);
        let _ = writeln!(w, r#"<h2 class="center">Music Transcription Report</h2>"#);
        let _ = writeln!(w, r#"<p class="center author">Generated by {author}</p>"#);
        if let Some(source) = &t.source {
            let _ = writeln!(w, r#"<p class="center">Source: {}</p>"#, escape_markup(source));
        }
        let _ = writeln!(
            w,
            r#"<p class="center">Tempo: {:.1} BPM | Key: C Major</p>"#,
            t.tempo_bpm
        );
        let _ = writeln!(
            w,
            r#"<p class="center"><small>{}</small></p>"#,
            t.generated_at.format("%Y-%m-%d %H:%M UTC")
        );

        match &t.rendered {
            Some(rendered) => {
                let encoded = general_purpose::STANDARD.encode(&rendered.image.bytes);
                let _ = writeln!(w, "<h2>Staff Notation</h2>");
                let _ = writeln!(
                    w,
                    r#"<figure><img alt="Staff notation" src="data:{};base64,{}"><figcaption>Figure 1: Staff notation with solfa syllables</figcaption></figure>"#,
                    rendered.image.format.media_type(),
                    encoded
                );
            }
            None => {
                let _ = writeln!(w, "<h2>Staff Notation Unavailable</h2>");
                let _ = writeln!(w, "<p>{NOTATION_UNAVAILABLE_TEXT}</p>");
            }
        }

        let _ = writeln!(w, "<h2>Solfa Analysis</h2>");
        let _ = writeln!(
            w,
            "<table><thead><tr><th>Note</th><th>Solfa Syllable</th><th>Frequency (Hz)</th><th>Count</th></tr></thead><tbody>"
        );
        for row in &t.summary {
            let _ = writeln!(
                w,
                "<tr><td>{}</td><td>{}</td><td>{:.1} Hz</td><td>{}</td></tr>",
                escape_markup(&row.pitch_name),
                escape_markup(row.solfege),
                row.frequency_hz,
                row.count
            );
        }
        let _ = writeln!(w, "</tbody></table>");

        let _ = writeln!(w, "<h3>Performance Analysis</h3>");
        let _ = writeln!(w, "<p>Total notes detected: {}</p>", t.stats.total_notes);
        let range = t.stats.pitch_range().unwrap_or_else(|| "none".to_string());
        let _ = writeln!(w, "<p>Pitch range: {}</p>", escape_markup(&range));
        if !t.notes.is_empty() {
            let syllables: Vec<&str> = t.notes.iter().map(|n| n.solfege).collect();
            let _ = writeln!(w, "<p>Solfa sequence: {}</p>", escape_markup(&syllables.join(" ")));
        }

        let _ = writeln!(w, "<footer>&copy; {author} | {title}</footer>");
        let _ = writeln!(w, "</body></html>");

        Ok(Document {
            format: ReportFormat::Html,
            bytes: html.into_bytes(),
        })
    }
}
