//! actiongraph CLI: build an action graph from a corpus of interactions.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use actiongraph::config::CorpusConfig;
use actiongraph::corpus::{Corpus, CorpusInput, IngestReport};

#[derive(Parser)]
#[command(
    name = "actiongraph",
    version,
    about = "Entity identification and motif recognition for biochemical action graphs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest protoforms and interactions from a JSON corpus.
    Ingest {
        /// Path to the corpus JSON file.
        #[arg(long)]
        file: PathBuf,

        /// Optional TOML configuration.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the resulting action graph, tags and typings as JSON.
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Show counts for the action graph built from a corpus.
    Info {
        /// Path to the corpus JSON file.
        #[arg(long)]
        file: PathBuf,
    },

    /// Ingest a corpus and print only the warnings it raises.
    Check {
        /// Path to the corpus JSON file.
        #[arg(long)]
        file: PathBuf,
    },
}

fn build(file: &Path, config: CorpusConfig) -> Result<(Corpus, IngestReport)> {
    let input = CorpusInput::load(file)?;
    let mut corpus = Corpus::new(config);
    let report = corpus.ingest(&input)?;
    Ok((corpus, report))
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest {
            file,
            config,
            export,
        } => {
            let config = match config {
                Some(path) => CorpusConfig::load(&path)?,
                None => CorpusConfig::default(),
            };
            let (corpus, report) = build(&file, config)?;
            println!(
                "Ingested {} protoforms and {} interactions from {} ({} motifs recognised)",
                report.protoforms.len(),
                report.interactions.len(),
                file.display(),
                report.registered()
            );
            for warning in report.warnings() {
                println!("  warning: {warning}");
            }
            if let Some(path) = export {
                let json = serde_json::to_string_pretty(&corpus.export()).into_diagnostic()?;
                std::fs::write(&path, json).into_diagnostic()?;
                println!("Exported action graph to {}", path.display());
            }
            println!("{}", corpus.info());
        }

        Commands::Info { file } => {
            let (corpus, _) = build(&file, CorpusConfig::default())?;
            println!("{}", corpus.info());
        }

        Commands::Check { file } => {
            let (_, report) = build(&file, CorpusConfig::default())?;
            let mut count = 0;
            for warning in report.warnings() {
                println!("{warning}");
                count += 1;
            }
            if count == 0 {
                println!("No warnings.");
            }
        }
    }

    Ok(())
}
