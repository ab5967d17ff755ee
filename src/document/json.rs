use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{
    Document, DocumentBuilder, DocumentError, NOTATION_UNAVAILABLE_TEXT, ReportFormat, ReportMeta,
};
use crate::notes::Note;
use crate::pipeline::Transcription;
use crate::render::RenderFailure;
use crate::summary::{PerformanceStats, PitchGroupSummary};

/// Machine-readable transcription report.
pub struct JsonReport;

#[derive(Serialize)]
struct JsonDocument<'a> {
    title: &'a str,
    author: &'a str,
    source: Option<&'a str>,
    generated_at: DateTime<Utc>,
    key: &'static str,
    tempo_bpm: f64,
    duration_secs: f64,
    staff_notation: StaffNotation<'a>,
    summary: &'a [PitchGroupSummary],
    stats: &'a PerformanceStats,
    notes: &'a [Note],
}

#[derive(Serialize)]
struct StaffNotation<'a> {
    available: bool,
    strategy: Option<&'static str>,
    media_type: Option<&'static str>,
    notice: Option<&'static str>,
    failures: &'a [RenderFailure],
}

impl DocumentBuilder for JsonReport {
    fn format(&self) -> ReportFormat {
        ReportFormat::Json
    }

    fn build(&self, t: &Transcription, meta: &ReportMeta) -> Result<Document, DocumentError> {
        let staff_notation = match &t.rendered {
            Some(r) => StaffNotation {
                available: true,
                strategy: Some(r.strategy),
                media_type: Some(r.image.format.media_type()),
                notice: None,
                failures: &t.render_failures,
            },
            None => StaffNotation {
                available: false,
                strategy: None,
                media_type: None,
                notice: Some(NOTATION_UNAVAILABLE_TEXT),
                failures: &t.render_failures,
            },
        };

        let doc = JsonDocument {
            title: &meta.title,
            author: &meta.author,
            source: t.source.as_deref(),
            generated_at: t.generated_at,
            key: "C Major",
            tempo_bpm: t.tempo_bpm,
            duration_secs: t.duration_secs,
            staff_notation,
            summary: &t.summary,
            stats: &t.stats,
            notes: &t.notes,
        };

        let mut bytes = serde_json::to_vec_pretty(&doc)?;
        bytes.push(b'\n');
        Ok(Document {
            format: ReportFormat::Json,
            bytes,
        })
    }
}
