//! Stemdeck command line
//!
//! Usage:
//!   stemdeck separate <audio> [--stems vocals,drums,..] [--config path]
//!   stemdeck chords <audio> [--at ms] [--config path]
//!   stemdeck init-config [path]
//!
//! Set `RUST_LOG=debug` for progress and provider details.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use stemdeck_core::chords::ChordProgression;
use stemdeck_core::config::{default_config_path, save_config, AppConfig};
use stemdeck_core::separation::{ProgressCallback, SeparationProgress};
use stemdeck_core::session::PlayerSession;
use stemdeck_core::transport::MemoryTransport;
use stemdeck_core::Stem;

#[derive(Parser, Debug)]
#[command(name = "stemdeck", about = "Stem separation and chord timelines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Split an audio file into stems through the configured providers
    Separate {
        audio: PathBuf,
        /// Stems to produce (default: from config)
        #[arg(long, value_delimiter = ',', value_parser = parse_stem)]
        stems: Vec<Stem>,
        /// Config file (default: platform config dir)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the chord timeline of an audio file
    Chords {
        audio: PathBuf,
        /// Also show the chords at this position
        #[arg(long = "at", value_name = "MS")]
        at_ms: Option<u64>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Write the default configuration
    InitConfig { path: Option<PathBuf> },
}

fn parse_stem(name: &str) -> std::result::Result<Stem, String> {
    Stem::from_name(name).ok_or_else(|| format!("unknown stem '{}'", name))
}

fn load_session(config_path: Option<PathBuf>, stems: Vec<Stem>) -> Result<PlayerSession> {
    let path = config_path.unwrap_or_else(default_config_path);
    let mut config = AppConfig::load(&path);
    if !stems.is_empty() {
        config.separation.options.stems = stems.into_iter().collect();
    }
    log::info!(
        "Providers: {:?}, working directory {:?}",
        config.separation.providers,
        config.work_dir()
    );

    // No output device here; stems are only loaded to validate them
    let transport = Arc::new(MemoryTransport::new());
    PlayerSession::from_config(&config, transport).context("Failed to create HTTP client")
}

async fn separate(audio: PathBuf, stems: Vec<Stem>, config: Option<PathBuf>) -> Result<()> {
    let mut session = load_session(config, stems)?;
    session.load_source(&audio).await;

    let progress: ProgressCallback = Arc::new(|p: SeparationProgress| {
        println!("[{:>5.1}%] {:<11} {}", p.progress, p.stage, p.message);
    });
    let tracks = session
        .separate_current(Some(progress))
        .await
        .with_context(|| format!("Separation of {:?} failed", audio))?;

    println!();
    for (stem, path) in tracks.iter() {
        println!("{:<13} {}", stem.label(), path.display());
    }
    Ok(())
}

/// Header line of the chord listing; the key label already names its scale
fn summary_line(progression: &ChordProgression) -> String {
    format!(
        "Key {} | {} BPM | {} | confidence {:.2}",
        progression.key, progression.tempo_bpm, progression.time_signature, progression.confidence
    )
}

async fn chords(audio: PathBuf, at_ms: Option<u64>, config: Option<PathBuf>) -> Result<()> {
    let mut session = load_session(config, Vec::new())?;
    session.load_source(&audio).await;
    let progression = session
        .analyze_current()
        .await
        .with_context(|| format!("Chord analysis of {:?} failed", audio))?;

    println!("{}", summary_line(progression));
    for chord in &progression.chords {
        println!(
            "{:>8.1}s  {:<6} {}",
            chord.time_ms as f64 / 1000.0,
            chord.name,
            chord.notes.join(" ")
        );
    }

    if let Some(at) = at_ms {
        let cursor = progression.cursor_at(at);
        let next: Vec<&str> = cursor.upcoming.iter().map(|c| c.name.as_str()).collect();
        match cursor.current {
            Some(current) => println!("\nAt {} ms: {} (next: {})", at, current.name, next.join(", ")),
            None => println!("\nAt {} ms: no chord", at),
        }
    }
    Ok(())
}

fn init_config(path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(default_config_path);
    if path.exists() {
        bail!("{:?} already exists", path);
    }
    save_config(&AppConfig::default(), &path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Separate {
            audio,
            stems,
            config,
        } => separate(audio, stems, config).await,
        Commands::Chords {
            audio,
            at_ms,
            config,
        } => chords(audio, at_ms, config).await,
        Commands::InitConfig { path } => init_config(path),
    }
}
