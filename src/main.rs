//! # docqa CLI
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa serve` | Start the HTTP server |
//! | `docqa ask <file> -q "<question>"...` | Ask one or more questions about a file in one session |
//! | `docqa chunk <file>` | Print the normalized chunks of a file (no model calls) |
//!
//! ## Examples
//!
//! ```bash
//! docqa ask paper.pdf -q "What is the main point of the document?" -q "What about its limitations?"
//! docqa chunk notes.txt --config ./config/docqa.toml
//! docqa serve --verbose
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docqa::config::{self, Config};
use docqa::extract::DocumentFormat;
use docqa::pipeline::Pipeline;
use docqa::server::{self, DEFAULT_QUESTION};
use docqa_core::chunk::chunk_text;
use docqa_core::normalize::normalize;
use tracing_subscriber::EnvFilter;

/// docqa: ask questions about a single document.
#[derive(Parser)]
#[command(name = "docqa", version, about = "Ask questions about a single uploaded document")]
struct Cli {
    /// Path to a TOML configuration file. Built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Ingest a document and ask questions about it, in order, in one session.
    ///
    /// Later questions can refer back to earlier answers ("What about its
    /// limitations?"); they are rewritten into standalone queries first.
    Ask {
        /// Document to ingest (.txt, .pdf or .docx).
        file: PathBuf,

        /// Question to ask; repeat for follow-ups.
        #[arg(short, long = "question", default_value = DEFAULT_QUESTION)]
        question: Vec<String>,
    },

    /// Print the normalized chunks of a document without calling any model.
    Chunk {
        file: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("docqa={},docqa_core={}", level, level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => config::load_config(p),
        None => Ok(Config::default()),
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("Not a file path: {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let cfg = load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve => {
            server::run_server(cfg).await?;
        }
        Commands::Ask { file, question } => {
            run_ask(cfg, &file, &question).await?;
        }
        Commands::Chunk { file } => {
            run_chunk(&cfg, &file)?;
        }
    }

    Ok(())
}

async fn run_ask(cfg: Config, file: &Path, questions: &[String]) -> Result<()> {
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let pipeline = Pipeline::from_config(cfg)?;
    let session_id = pipeline.ingest(&file_name(file)?, bytes).await?;

    let mut result = Ok(());
    for q in questions {
        match pipeline.query(&session_id, q).await {
            Ok(outcome) => {
                println!("Q: {}", q);
                println!("A: {}", outcome.answer);
                println!();
            }
            Err(e) => {
                result = Err(e.into());
                break;
            }
        }
    }

    pipeline.close(&session_id).await?;
    result
}

fn run_chunk(cfg: &Config, file: &Path) -> Result<()> {
    let name = file_name(file)?;
    let format = DocumentFormat::from_filename(&name)?;
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let text = normalize(&format.extract(&bytes)?);
    let chunks = chunk_text(
        &name,
        &text,
        cfg.chunking.max_chars,
        cfg.chunking.overlap_chars,
    );

    for chunk in &chunks {
        println!(
            "--- chunk {} ({} chars) ---",
            chunk.chunk_index,
            chunk.text.chars().count()
        );
        println!("{}", chunk.text);
    }
    println!("{} chunks", chunks.len());
    Ok(())
}
