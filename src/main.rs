//! # RAG Harness CLI (`rag`)
//!
//! ## Usage
//!
//! ```bash
//! rag [--config ./config/rag.toml] [-v] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag normalize "<text>"` | Print normalized text |
//! | `rag chunk <file>` | Print the passages of one file |
//! | `rag ingest --dir <dir>` | Build a corpus and print its size |
//! | `rag search "<question>" --file <f>` | Print the retrieved passages with scores |
//! | `rag ask "<question>" --dir <dir>` | Answer from the documents, with sources |
//! | `rag sentences "<question>" --file <f>` | Best sentences of the top passage |
//!
//! Without `--config`, built-in defaults apply: offline hashing embeddings
//! and no generation service, so `search`, `chunk`, and `sentences` work
//! out of the box while `ask` needs a `[generation]` provider.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use rag_harness::commands::{self, SourceArgs};
use rag_harness::config::{self, Config};
use rag_harness::logging;

#[derive(Parser)]
#[command(
    name = "rag",
    about = "Answer questions from your own documents with retrieval-augmented generation",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Default)]
struct Sources {
    /// Document to ingest (repeatable).
    #[arg(long = "file")]
    files: Vec<PathBuf>,

    /// Directory to ingest, filtered by `ingest.include_globs` (repeatable).
    #[arg(long = "dir")]
    dirs: Vec<PathBuf>,

    /// Inline document text (repeatable).
    #[arg(long = "text")]
    texts: Vec<String>,
}

impl From<Sources> for SourceArgs {
    fn from(s: Sources) -> Self {
        SourceArgs {
            files: s.files,
            dirs: s.dirs,
            texts: s.texts,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the normalized form of a text.
    Normalize { text: String },

    /// Extract one file and print its passages (index, length, text).
    Chunk { file: PathBuf },

    /// Build a corpus from the given documents and print a summary.
    Ingest {
        #[command(flatten)]
        sources: Sources,
    },

    /// Print the passages retrieved for a question.
    Search {
        question: String,
        #[command(flatten)]
        sources: Sources,
    },

    /// Answer a question from the given documents.
    ///
    /// The answer is followed by the passages it was grounded on.
    Ask {
        question: String,
        #[command(flatten)]
        sources: Sources,
    },

    /// Print the sentences of the best passage that best match a question.
    Sentences {
        question: String,
        #[command(flatten)]
        sources: Sources,
        /// Number of sentences to print.
        #[arg(long, default_value_t = 3)]
        top_n: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Normalize { text } => commands::run_normalize(&cfg, &text)?,
        Commands::Chunk { file } => commands::run_chunk(&cfg, &file)?,
        Commands::Ingest { sources } => commands::run_ingest(&cfg, &sources.into()).await?,
        Commands::Search { question, sources } => {
            commands::run_search(&cfg, &question, &sources.into()).await?
        }
        Commands::Ask { question, sources } => {
            commands::run_ask(&cfg, &question, &sources.into()).await?
        }
        Commands::Sentences {
            question,
            sources,
            top_n,
        } => commands::run_sentences(&cfg, &question, &sources.into(), top_n).await?,
    }

    Ok(())
}
