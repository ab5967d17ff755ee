use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;
use walkdir::WalkDir;

use crate::analyzer::{AnalyzeError, AudioAnalyzer, YinAnalyzer};
use crate::config::AppConfig;
use crate::document::{Document, DocumentBuilder, DocumentError, ReportMeta};
use crate::notes::{Note, notes_from_pitch_events_with_duration};
use crate::render::flat_io::FlatIoRenderer;
use crate::render::staff::StaffRenderer;
use crate::render::{RenderChain, RenderFailure, Rendered, RenderingUnavailable};
use crate::summary::{PerformanceStats, PitchGroupSummary, summarize};
use crate::SUPPORTED_EXTENSIONS;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Audio analysis failed: {0}")]
    AudioAnalysisFailed(#[from] AnalyzeError),
    #[error("Document assembly failed: {0}")]
    DocumentAssemblyFailed(#[from] DocumentError),
    #[error("IO error reading {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error creating {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Everything derived from one recording, before it becomes a document.
#[derive(Debug, Clone)]
pub struct Transcription {
    /// File name of the input, when it came from disk.
    pub source: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub tempo_bpm: f64,
    pub duration_secs: f64,
    pub notes: Vec<Note>,
    pub summary: Vec<PitchGroupSummary>,
    pub stats: PerformanceStats,
    /// Staff image, if any renderer succeeded.
    pub rendered: Option<Rendered>,
    /// Renderers that failed, in the order they were tried.
    pub render_failures: Vec<RenderFailure>,
}

/// Audio in, transcription out: analyze, convert, summarize, render.
pub struct Transcriber {
    analyzer: Box<dyn AudioAnalyzer + Send + Sync>,
    renderers: RenderChain,
    note_duration: f64,
}

impl Transcriber {
    pub fn new(
        analyzer: impl AudioAnalyzer + Send + Sync + 'static,
        renderers: RenderChain,
        note_duration: f64,
    ) -> Self {
        Self {
            analyzer: Box::new(analyzer),
            renderers,
            note_duration,
        }
    }

    /// Build the standard pipeline: YIN analysis, then the local staff
    /// renderer (if enabled) falling back to Flat.io. `render = false`
    /// leaves the chain empty so reports carry no image.
    pub fn from_config(config: &AppConfig, render: bool) -> Result<Self, PipelineError> {
        let analyzer = YinAnalyzer::new(config.analysis.clone())?;
        let mut renderers = RenderChain::new();
        if render {
            if config.render.local {
                renderers = renderers.with(StaffRenderer::new(
                    config.render.clone(),
                    config.title.clone(),
                    config.author.clone(),
                ));
            }
            renderers = renderers.with(FlatIoRenderer::new(
                config.flat_io.clone(),
                config.title.clone(),
            ));
        }
        log::debug!("Render chain: {:?}", renderers.names());
        Ok(Self::new(analyzer, renderers, config.analysis.note_duration))
    }

    /// Transcribe encoded audio. Rendering failures are not errors: the
    /// transcription simply has no image.
    pub fn transcribe(
        &self,
        audio: &[u8],
        format_hint: Option<&str>,
        source: Option<String>,
    ) -> Result<Transcription, PipelineError> {
        let analysis = self.analyzer.analyze(audio, format_hint)?;
        let notes = notes_from_pitch_events_with_duration(&analysis.events, self.note_duration);
        let summary = summarize(&notes);
        let stats = PerformanceStats::from_summary(notes.len(), &summary);

        let (rendered, render_failures) = if self.renderers.is_empty() {
            (None, Vec::new())
        } else {
            match self.renderers.render(&notes, analysis.tempo_bpm) {
                Ok(rendered) => {
                    let failures = rendered.failures.clone();
                    (Some(rendered), failures)
                }
                Err(RenderingUnavailable { failures }) => {
                    log::warn!(
                        "Staff notation unavailable for {}: every renderer failed",
                        source.as_deref().unwrap_or("input")
                    );
                    (None, failures)
                }
            }
        };

        log::info!(
            "{}: {} notes, {} distinct pitches, {:.1} BPM",
            source.as_deref().unwrap_or("input"),
            notes.len(),
            summary.len(),
            analysis.tempo_bpm
        );

        Ok(Transcription {
            source,
            generated_at: Utc::now(),
            tempo_bpm: analysis.tempo_bpm,
            duration_secs: analysis.duration_secs,
            notes,
            summary,
            stats,
            rendered,
            render_failures,
        })
    }

    pub fn transcribe_file(&self, path: &Path) -> Result<Transcription, PipelineError> {
        let bytes = std::fs::read(path).map_err(|source| PipelineError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let ext = path.extension().and_then(|e| e.to_str());
        let name = path.file_name().map(|f| f.to_string_lossy().to_string());
        self.transcribe(&bytes, ext, name)
    }

    /// Transcribe and assemble a report in one step.
    pub fn transcribe_to_document(
        &self,
        path: &Path,
        builder: &dyn DocumentBuilder,
        meta: &ReportMeta,
    ) -> Result<Document, PipelineError> {
        let transcription = self.transcribe_file(path)?;
        Ok(builder.build(&transcription, meta)?)
    }
}

/// Expand files and directories into the audio files to process, sorted.
/// Explicit file arguments are kept whatever their extension.
pub fn collect_audio_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        for entry in WalkDir::new(path).follow_links(true).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let ext = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_lowercase();
            if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
                files.push(entry.into_path());
            }
        }
    }
    files.sort();
    files.dedup();
    files
}

/// `<dir>/<stem>_solfa.<ext>`, next to the input unless `output_dir` is set.
pub fn output_path(input: &Path, output_dir: Option<&Path>, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "recording".to_string());
    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(format!("{stem}_solfa.{extension}"))
}

/// Output path for every input, in order, with no two inputs sharing a report.
///
/// The first input keeps `<stem>_solfa.<ext>`. Later inputs that would land
/// on a taken path use `<file name>_solfa.<ext>`, then `<stem>_solfa_<n>.<ext>`.
pub fn plan_output_paths(
    files: &[PathBuf],
    output_dir: Option<&Path>,
    extension: &str,
) -> Vec<PathBuf> {
    let mut taken: HashSet<PathBuf> = HashSet::with_capacity(files.len());
    files
        .iter()
        .map(|input| {
            let preferred = output_path(input, output_dir, extension);
            let mut out = preferred.clone();
            if taken.contains(&out) {
                let name = input
                    .file_name()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "recording".to_string());
                out = preferred.with_file_name(format!("{name}_solfa.{extension}"));
                let stem = input
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "recording".to_string());
                let mut n = 2;
                while taken.contains(&out) {
                    out = preferred.with_file_name(format!("{stem}_solfa_{n}.{extension}"));
                    n += 1;
                }
                log::warn!(
                    "{} shares a report name with another input; writing {}",
                    input.display(),
                    out.display()
                );
            }
            taken.insert(out.clone());
            out
        })
        .collect()
}

pub struct TranscribeResult {
    pub transcribed: u64,
    pub failed: u64,
    pub outputs: Vec<PathBuf>,
}

/// Transcribe many files in parallel and write one report per file.
///
/// Each file is independent: a failure is logged and counted, and the rest
/// of the batch carries on.
pub fn transcribe_files(
    transcriber: &Transcriber,
    files: &[PathBuf],
    output_dir: Option<&Path>,
    builder: &(dyn DocumentBuilder + Sync),
    meta: &ReportMeta,
    jobs: usize,
) -> Result<TranscribeResult, PipelineError> {
    if files.is_empty() {
        log::info!("No audio files to transcribe");
        return Ok(TranscribeResult {
            transcribed: 0,
            failed: 0,
            outputs: Vec::new(),
        });
    }

    if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir).map_err(|source| PipelineError::CreateDir {
            path: dir.display().to_string(),
            source,
        })?;
    }

    log::info!("Transcribing {} files with {} workers", files.len(), jobs);

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-"),
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()?;

    let planned = plan_output_paths(files, output_dir, builder.format().extension());
    let results: Vec<(PathBuf, Result<PathBuf, PipelineError>)> = pool.install(|| {
        use rayon::prelude::*;
        files
            .par_iter()
            .zip(planned)
            .map(|(input, out)| {
                let result = transcriber
                    .transcribe_to_document(input, builder, meta)
                    .and_then(|doc| doc.save(&out).map_err(PipelineError::from))
                    .map(|()| out);
                pb.inc(1);
                (input.clone(), result)
            })
            .collect()
    });

    let mut transcribed: u64 = 0;
    let mut failed: u64 = 0;
    let mut outputs = Vec::new();
    for (input, result) in results {
        match result {
            Ok(out) => {
                log::info!("{} -> {}", input.display(), out.display());
                transcribed += 1;
                outputs.push(out);
            }
            Err(e) => {
                log::warn!("Transcription failed for {}: {}", input.display(), e);
                failed += 1;
            }
        }
    }

    pb.finish_with_message(format!("Done: {} transcribed, {} failed", transcribed, failed));

    Ok(TranscribeResult {
        transcribed,
        failed,
        outputs,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::analyzer::AudioAnalysis;
    use crate::document::ReportFormat;
    use crate::notes::{PitchEvent, notes_from_pitch_events};
    use crate::render::tests::StubRenderer;

    /// C4, C4, D4 with nothing rendered and the local renderer recorded as failed.
    pub(crate) fn sample_transcription() -> Transcription {
        let notes = notes_from_pitch_events(&[
            PitchEvent::new(0.0, 261.63),
            PitchEvent::new(0.5, 261.63),
            PitchEvent::new(1.0, 293.66),
        ]);
        let summary = summarize(&notes);
        let stats = PerformanceStats::from_summary(notes.len(), &summary);
        Transcription {
            source: Some("take1.wav".into()),
            generated_at: Utc::now(),
            tempo_bpm: 120.0,
            duration_secs: 1.5,
            notes,
            summary,
            stats,
            rendered: None,
            render_failures: vec![RenderFailure {
                strategy: "staff",
                error: "No notes to render".into(),
            }],
        }
    }

    struct FixedAnalyzer(Result<Vec<PitchEvent>, ()>);

    impl AudioAnalyzer for FixedAnalyzer {
        fn analyze(
            &self,
            _audio: &[u8],
            _hint: Option<&str>,
        ) -> Result<AudioAnalysis, AnalyzeError> {
            match &self.0 {
                Ok(events) => Ok(AudioAnalysis {
                    events: events.clone(),
                    tempo_bpm: 90.0,
                    duration_secs: 2.0,
                    sample_rate: 22050,
                }),
                Err(()) => Err(AnalyzeError::InvalidConfig("analyzer offline".into())),
            }
        }
    }

    fn c_c_d() -> Vec<PitchEvent> {
        vec![
            PitchEvent::new(0.0, 261.63),
            PitchEvent::new(0.25, f64::NAN),
            PitchEvent::new(0.5, 261.63),
            PitchEvent::new(1.0, 293.66),
        ]
    }

    #[test]
    fn test_transcribe_builds_notes_and_summary() {
        let t = Transcriber::new(FixedAnalyzer(Ok(c_c_d())), RenderChain::new(), 0.5);
        let result = t.transcribe(b"", None, Some("x.wav".into())).unwrap();
        assert_eq!(result.notes.len(), 3);
        assert_eq!(result.summary.len(), 2);
        assert_eq!(result.summary[0].count, 2);
        assert_eq!(result.stats.total_notes, 3);
        assert_eq!(result.tempo_bpm, 90.0);
        assert!(result.rendered.is_none());
        assert!(result.render_failures.is_empty());
    }

    #[test]
    fn test_transcribe_uses_fallback_renderer() {
        let chain = RenderChain::new()
            .with(StubRenderer::new("local", false))
            .with(StubRenderer::new("remote", true));
        let t = Transcriber::new(FixedAnalyzer(Ok(c_c_d())), chain, 0.5);
        let result = t.transcribe(b"", None, None).unwrap();
        assert_eq!(result.rendered.as_ref().map(|r| r.strategy), Some("remote"));
        assert_eq!(result.render_failures.len(), 1);
    }

    #[test]
    fn test_rendering_unavailable_is_not_fatal() {
        let chain = RenderChain::new()
            .with(StubRenderer::new("local", false))
            .with(StubRenderer::new("remote", false));
        let t = Transcriber::new(FixedAnalyzer(Ok(c_c_d())), chain, 0.5);
        let result = t.transcribe(b"", None, None).unwrap();
        assert!(result.rendered.is_none());
        assert_eq!(result.render_failures.len(), 2);
        assert_eq!(result.notes.len(), 3);
    }

    #[test]
    fn test_analysis_failure_surfaces() {
        let t = Transcriber::new(FixedAnalyzer(Err(())), RenderChain::new(), 0.5);
        assert!(matches!(
            t.transcribe(b"", None, None),
            Err(PipelineError::AudioAnalysisFailed(_))
        ));
    }

    #[test]
    fn test_all_unvoiced_input_gives_empty_report() {
        let events: Vec<PitchEvent> = (0..5).map(|i| PitchEvent::new(i as f64, -1.0)).collect();
        let t = Transcriber::new(FixedAnalyzer(Ok(events)), RenderChain::new(), 0.5);
        let result = t.transcribe(b"", None, None).unwrap();
        assert!(result.notes.is_empty());
        assert!(result.summary.is_empty());
    }

    #[test]
    fn test_plan_output_paths_never_share_a_report() {
        let files = vec![
            PathBuf::from("/a/take.wav"),
            PathBuf::from("/a/take.flac"),
            PathBuf::from("/b/take.wav"),
            PathBuf::from("/c/take.wav"),
            PathBuf::from("/a/other.wav"),
        ];
        let out = Path::new("/out");
        let planned = plan_output_paths(&files, Some(out), "json");
        assert_eq!(
            planned,
            vec![
                out.join("take_solfa.json"),
                out.join("take.flac_solfa.json"),
                out.join("take.wav_solfa.json"),
                out.join("take_solfa_2.json"),
                out.join("other_solfa.json"),
            ]
        );

        // Without an output dir, inputs in different directories do not collide.
        let planned = plan_output_paths(&files[..3], None, "html");
        assert_eq!(planned[0], PathBuf::from("/a/take_solfa.html"));
        assert_eq!(planned[1], PathBuf::from("/a/take.flac_solfa.html"));
        assert_eq!(planned[2], PathBuf::from("/b/take_solfa.html"));
    }

    #[test]
    fn test_transcribe_files_same_stem_writes_every_report() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("take.wav");
        let flac = dir.path().join("take.flac");
        std::fs::write(&wav, b"wav").unwrap();
        std::fs::write(&flac, b"flac").unwrap();
        let out_dir = dir.path().join("reports");

        let t = Transcriber::new(FixedAnalyzer(Ok(c_c_d())), RenderChain::new(), 0.5);
        let meta = ReportMeta { title: "T".into(), author: "A".into() };
        let builder = ReportFormat::Json.builder();
        let result =
            transcribe_files(&t, &[wav, flac], Some(&out_dir), builder.as_ref(), &meta, 2).unwrap();

        assert_eq!(result.transcribed, 2);
        assert_eq!(result.failed, 0);
        let on_disk = std::fs::read_dir(&out_dir).unwrap().count();
        assert_eq!(on_disk as u64, result.transcribed);
        let sources: HashSet<String> = result
            .outputs
            .iter()
            .map(|p| {
                let doc: serde_json::Value =
                    serde_json::from_slice(&std::fs::read(p).unwrap()).unwrap();
                doc["source"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(sources, HashSet::from(["take.wav".to_string(), "take.flac".to_string()]));
    }

    #[test]
    fn test_unusable_output_dir_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("reports");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let input = dir.path().join("take.wav");
        std::fs::write(&input, b"wav").unwrap();

        let t = Transcriber::new(FixedAnalyzer(Ok(c_c_d())), RenderChain::new(), 0.5);
        let meta = ReportMeta { title: "T".into(), author: "A".into() };
        let builder = ReportFormat::Json.builder();
        let result = transcribe_files(&t, &[input], Some(&blocker), builder.as_ref(), &meta, 1);
        assert!(matches!(result, Err(PipelineError::CreateDir { .. })));
    }

    #[test]
    fn test_output_path() {
        assert_eq!(
            output_path(Path::new("/music/take 1.wav"), None, "html"),
            PathBuf::from("/music/take 1_solfa.html")
        );
        assert_eq!(
            output_path(Path::new("/music/take.flac"), Some(Path::new("/out")), "json"),
            PathBuf::from("/out/take_solfa.json")
        );
    }

    #[test]
    fn test_collect_audio_files() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("set1");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("b.wav"), b"").unwrap();
        std::fs::write(dir.path().join("a.FLAC"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let files = collect_audio_files(&[dir.path().to_path_buf()]);
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.FLAC", "b.wav"]);

        let explicit = collect_audio_files(&[dir.path().join("notes.txt")]);
        assert_eq!(explicit.len(), 1);
    }

    #[test]
    fn test_transcribe_files_counts_failures() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.wav");
        std::fs::write(&good, b"ignored by the fixed analyzer").unwrap();
        let missing = dir.path().join("missing.wav");
        let out_dir = dir.path().join("reports");

        let t = Transcriber::new(FixedAnalyzer(Ok(c_c_d())), RenderChain::new(), 0.5);
        let meta = ReportMeta { title: "T".into(), author: "A".into() };
        let builder = ReportFormat::Json.builder();
        let result = transcribe_files(
            &t,
            &[good, missing],
            Some(&out_dir),
            builder.as_ref(),
            &meta,
            2,
        )
        .unwrap();

        assert_eq!(result.transcribed, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.outputs, vec![out_dir.join("good_solfa.json")]);
        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&result.outputs[0]).unwrap()).unwrap();
        assert_eq!(written["source"], "good.wav");
        assert_eq!(written["summary"][0]["solfege"], "Do");
    }

    #[test]
    fn test_end_to_end_wav_to_html() {
        use crate::analyzer::decode::encode_wav_i16;
        use std::f32::consts::PI;

        let sr = 22050u32;
        let mut samples = vec![0.0f32; sr as usize / 4];
        samples.extend(
            (0..sr as usize / 2).map(|i| 0.5 * (2.0 * PI * 440.0 * i as f32 / sr as f32).sin()),
        );
        samples.extend(vec![0.0f32; sr as usize / 4]);

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a4.wav");
        std::fs::write(&input, encode_wav_i16(&samples, sr)).unwrap();

        let mut config = AppConfig::default();
        config.analysis.event_source = crate::config::EventSource::Frames;
        let t = Transcriber::from_config(&config, true).unwrap();
        let meta = ReportMeta { title: config.title.clone(), author: config.author.clone() };
        let doc = t
            .transcribe_to_document(&input, ReportFormat::Html.builder().as_ref(), &meta)
            .unwrap();
        let html = String::from_utf8(doc.bytes).unwrap();
        assert!(html.contains("<td>A4</td><td>La</td>"));
        assert!(html.contains("data:image/svg+xml;base64,"));
    }
}
