use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lashir::config::AppConfig;
use lashir::document::{ReportFormat, ReportMeta};
use lashir::pipeline::{self, Transcriber, Transcription};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lashir", version, about = "Sound to solfa converter")]
struct Cli {
    /// Path to a config file (defaults to the XDG config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum FormatArg {
    Html,
    Json,
}

impl From<FormatArg> for ReportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Html => ReportFormat::Html,
            FormatArg::Json => ReportFormat::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Transcribe recordings into solfa reports
    Transcribe {
        /// Audio files or directories to transcribe
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Directory for reports (defaults to config output_dir, then next to each input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Report format (defaults to config format)
        #[arg(long, value_enum)]
        format: Option<FormatArg>,

        /// Number of parallel workers (0 = auto-detect from config)
        #[arg(short = 'j', long, default_value = "0")]
        jobs: usize,

        /// Skip staff notation rendering
        #[arg(long)]
        no_render: bool,
    },

    /// Print the detected notes of a recording
    Notes {
        /// Audio file
        file: PathBuf,
    },

    /// Print the per-pitch summary and performance stats of a recording
    Summary {
        /// Audio file
        file: PathBuf,
    },

    /// Render a recording's staff notation to an image file
    Render {
        /// Audio file
        file: PathBuf,

        /// Output image path (defaults to <stem>_staff.<svg|png> next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Convert note names (e.g. C4, F#3, Bb) to solfa syllables
    Convert {
        /// Note names
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Print the chromatic solfa table
    Table,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = AppConfig::load(cli.config.as_deref());

    match cli.command {
        Commands::Transcribe { paths, output, format, jobs, no_render } => {
            let files = pipeline::collect_audio_files(&paths);
            if files.is_empty() {
                anyhow::bail!("No audio files found in the given paths.");
            }

            let format: ReportFormat = format.map(Into::into).unwrap_or(config.format);
            let output_dir = output.or_else(|| config.output_dir.clone());
            let workers = if jobs > 0 { jobs } else { config.resolve_workers() };

            let transcriber = Transcriber::from_config(&config, !no_render)
                .context("Failed to set up transcription")?;
            let builder = format.builder();
            let result = pipeline::transcribe_files(
                &transcriber,
                &files,
                output_dir.as_deref(),
                builder.as_ref(),
                &report_meta(&config),
                workers,
            )
            .context("Transcription failed")?;
            println!(
                "Transcription complete: {} transcribed, {} failed",
                result.transcribed, result.failed
            );
        }

        Commands::Notes { file } => {
            let t = transcribe_one(&config, &file, false)?;
            if t.notes.is_empty() {
                println!("No voiced notes detected.");
                return Ok(());
            }
            println!("{:>8}  {:<5} {:<4} {:>9}", "Time", "Pitch", "Solfa", "Hz");
            println!("{}", "-".repeat(31));
            for note in &t.notes {
                println!(
                    "{:>7.2}s  {:<5} {:<4} {:>9.1}",
                    note.time_secs, note.pitch_name, note.solfege, note.frequency_hz
                );
            }
            println!();
            println!("{} notes, tempo {:.1} BPM", t.notes.len(), t.tempo_bpm);
        }

        Commands::Summary { file } => {
            let t = transcribe_one(&config, &file, false)?;
            print_summary(&t);
        }

        Commands::Render { file, output } => {
            let transcriber = Transcriber::from_config(&config, true)
                .context("Failed to set up transcription")?;
            let t = transcriber
                .transcribe_file(&file)
                .with_context(|| format!("Failed to transcribe {}", file.display()))?;
            let Some(rendered) = t.rendered else {
                for failure in &t.render_failures {
                    eprintln!("  {}: {}", failure.strategy, failure.error);
                }
                anyhow::bail!("Staff notation unavailable for {}", file.display());
            };
            let out = output.unwrap_or_else(|| {
                let stem = file
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default();
                file.with_file_name(format!("{stem}_staff.{}", rendered.image.format.extension()))
            });
            std::fs::write(&out, &rendered.image.bytes)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            println!("Rendered with {} -> {}", rendered.strategy, out.display());
        }

        Commands::Convert { names } => {
            let mut failed = 0;
            for name in &names {
                match lashir::notes::solfege_for_pitch_name(name) {
                    Ok(solfege) => println!("{:<6} {}", name, solfege),
                    Err(e) => {
                        eprintln!("{:<6} error: {}", name, e);
                        failed += 1;
                    }
                }
            }
            if failed > 0 {
                anyhow::bail!("{} of {} note names could not be converted", failed, names.len());
            }
        }

        Commands::Table => {
            println!("{:>8}  {:<5} {}", "Semitone", "Note", "Solfa");
            println!("{}", "-".repeat(22));
            for (i, solfege) in lashir::solfege::SOLFEGE_TABLE.iter().enumerate() {
                println!("{:>8}  {:<5} {}", i, lashir::notes::PITCH_CLASS_NAMES[i], solfege);
            }
        }
    }

    Ok(())
}

fn report_meta(config: &AppConfig) -> ReportMeta {
    ReportMeta {
        title: config.title.clone(),
        author: config.author.clone(),
    }
}

fn transcribe_one(
    config: &AppConfig,
    file: &std::path::Path,
    render: bool,
) -> Result<Transcription> {
    let transcriber = Transcriber::from_config(config, render)
        .context("Failed to set up transcription")?;
    transcriber
        .transcribe_file(file)
        .with_context(|| format!("Failed to transcribe {}", file.display()))
}

fn print_summary(t: &Transcription) {
    if t.summary.is_empty() {
        println!("No voiced notes detected.");
        return;
    }
    println!("{:<6} {:<6} {:>10} {:>6}", "Pitch", "Solfa", "Frequency", "Count");
    println!("{}", "-".repeat(31));
    for group in &t.summary {
        println!(
            "{:<6} {:<6} {:>7.1} Hz {:>6}",
            group.pitch_name, group.solfege, group.frequency_hz, group.count
        );
    }
    println!();
    println!("Total notes detected: {}", t.stats.total_notes);
    println!("Distinct pitches:     {}", t.stats.distinct_pitches);
    println!(
        "Pitch range:          {}",
        t.stats.pitch_range().unwrap_or_else(|| "none".to_string())
    );
    println!("Tempo:                {:.1} BPM", t.tempo_bpm);
}
