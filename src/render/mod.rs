pub mod flat_io;
pub mod musicxml;
pub mod staff;

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::notes::Note;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("No notes to render")]
    NothingToRender,
    #[error("Renderer not configured: {0}")]
    NotConfigured(String),
    #[error("HTTP error: {0}")]
    Http(#[from] ureq::Error),
    #[error("Unexpected response: {0}")]
    BadResponse(String),
    #[error("Render failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Svg,
    Png,
}

impl ImageFormat {
    pub fn media_type(self) -> &'static str {
        match self {
            Self::Svg => "image/svg+xml",
            Self::Png => "image/png",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Png => "png",
        }
    }
}

/// Escape text for inclusion in XML, SVG or HTML content and attributes.
pub fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// An encoded notation image.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedImage {
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

/// Draws a note sequence as staff notation.
pub trait Renderer {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;
    fn render(&self, notes: &[Note], tempo_bpm: f64) -> Result<RenderedImage, RenderError>;
}

/// A successful render and the strategy that produced it.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub strategy: &'static str,
    pub image: RenderedImage,
    /// Strategies that failed before this one succeeded.
    pub failures: Vec<RenderFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderFailure {
    pub strategy: &'static str,
    pub error: String,
}

/// Every strategy in the chain failed.
#[derive(Debug, Clone)]
pub struct RenderingUnavailable {
    pub failures: Vec<RenderFailure>,
}

impl fmt::Display for RenderingUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failures.is_empty() {
            return write!(f, "No renderers configured");
        }
        write!(f, "All renderers failed: ")?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", failure.strategy, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for RenderingUnavailable {}

/// Ordered fallback over rendering strategies. The first success wins;
/// each strategy is tried once.
#[derive(Default)]
pub struct RenderChain {
    strategies: Vec<Box<dyn Renderer + Send + Sync>>,
}

impl RenderChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, renderer: impl Renderer + Send + Sync + 'static) -> Self {
        self.strategies.push(Box::new(renderer));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn render(&self, notes: &[Note], tempo_bpm: f64) -> Result<Rendered, RenderingUnavailable> {
        let mut failures = Vec::new();
        for strategy in &self.strategies {
            match strategy.render(notes, tempo_bpm) {
                Ok(image) => {
                    log::debug!("Rendered {} notes with {}", notes.len(), strategy.name());
                    return Ok(Rendered {
                        strategy: strategy.name(),
                        image,
                        failures,
                    });
                }
                Err(e) => {
                    log::info!("Renderer {} failed: {}", strategy.name(), e);
                    failures.push(RenderFailure {
                        strategy: strategy.name(),
                        error: e.to_string(),
                    });
                }
            }
        }
        Err(RenderingUnavailable { failures })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Test double: succeeds or fails on demand and counts calls.
    pub(crate) struct StubRenderer {
        pub name: &'static str,
        pub succeed: bool,
        pub calls: Arc<AtomicUsize>,
    }

    impl StubRenderer {
        pub(crate) fn new(name: &'static str, succeed: bool) -> Self {
            Self { name, succeed, calls: Arc::new(AtomicUsize::new(0)) }
        }
    }

    impl Renderer for StubRenderer {
        fn name(&self) -> &'static str {
            self.name
        }

        fn render(&self, _notes: &[Note], _tempo_bpm: f64) -> Result<RenderedImage, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                Ok(RenderedImage { format: ImageFormat::Png, bytes: self.name.as_bytes().to_vec() })
            } else {
                Err(RenderError::Failed(format!("{} is down", self.name)))
            }
        }
    }

    #[test]
    fn test_first_success_short_circuits() {
        let second = StubRenderer::new("second", true);
        let second_calls = second.calls.clone();
        let chain = RenderChain::new()
            .with(StubRenderer::new("first", true))
            .with(second);

        let rendered = chain.render(&[], 120.0).unwrap();
        assert_eq!(rendered.strategy, "first");
        assert!(rendered.failures.is_empty());
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_falls_back_in_order() {
        let chain = RenderChain::new()
            .with(StubRenderer::new("local", false))
            .with(StubRenderer::new("remote", true));
        let rendered = chain.render(&[], 120.0).unwrap();
        assert_eq!(rendered.strategy, "remote");
        assert_eq!(rendered.image.bytes, b"remote");
        assert_eq!(rendered.failures.len(), 1);
        assert_eq!(rendered.failures[0].strategy, "local");
    }

    #[test]
    fn test_all_fail_is_unavailable() {
        let local = StubRenderer::new("local", false);
        let local_calls = local.calls.clone();
        let chain = RenderChain::new()
            .with(local)
            .with(StubRenderer::new("remote", false));

        let err = chain.render(&[], 120.0).unwrap_err();
        assert_eq!(err.failures.len(), 2);
        assert_eq!(local_calls.load(Ordering::SeqCst), 1, "no retries");
        let msg = err.to_string();
        assert!(msg.contains("local: Render failed: local is down"));
        assert!(msg.contains("remote"));
    }

    #[test]
    fn test_escape_markup() {
        assert_eq!(
            escape_markup("Sol & La <b>\"x\"</b> 'y'"),
            "Sol &amp; La &lt;b&gt;&quot;x&quot;&lt;/b&gt; &#39;y&#39;"
        );
        assert_eq!(escape_markup("Do"), "Do");
    }

    #[test]
    fn test_empty_chain_is_unavailable() {
        let err = RenderChain::new().render(&[], 120.0).unwrap_err();
        assert!(err.failures.is_empty());
        assert_eq!(err.to_string(), "No renderers configured");
    }
}
