pub mod html;
pub mod json;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::Transcription;

/// Shown in place of the staff image when no renderer succeeded.
pub const NOTATION_UNAVAILABLE_TEXT: &str =
    "Notation rendering failed. Below is your solfa analysis.";

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("IO error writing {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Html,
    Json,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Json => "json",
        }
    }

    pub fn builder(self) -> Box<dyn DocumentBuilder + Send + Sync> {
        match self {
            Self::Html => Box::new(html::HtmlReport),
            Self::Json => Box::new(json::JsonReport),
        }
    }
}

/// Title and credit lines printed on every report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta {
    pub title: String,
    pub author: String,
}

/// Assembles a finished transcription into a report artifact.
pub trait DocumentBuilder {
    fn format(&self) -> ReportFormat;
    fn build(
        &self,
        transcription: &Transcription,
        meta: &ReportMeta,
    ) -> Result<Document, DocumentError>;
}

/// A built report, ready to be written out.
#[derive(Debug, Clone)]
pub struct Document {
    pub format: ReportFormat,
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn save(&self, path: &Path) -> Result<(), DocumentError> {
        std::fs::write(path, &self.bytes).map_err(|source| DocumentError::Write {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_builders_match() {
        for format in [ReportFormat::Html, ReportFormat::Json] {
            assert_eq!(format.builder().format(), format);
        }
        assert_eq!(ReportFormat::Json.extension(), "json");
    }

    #[test]
    fn test_save_and_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let doc = Document { format: ReportFormat::Json, bytes: b"{}".to_vec() };

        let path = dir.path().join("report.json");
        doc.save(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"{}");

        let bad = dir.path().join("no/such/dir/report.json");
        assert!(matches!(doc.save(&bad), Err(DocumentError::Write { .. })));
    }
}
