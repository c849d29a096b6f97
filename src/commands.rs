//! Implementations of the `rag` subcommands.
//!
//! Each `run_*` function loads what it needs from the [`Config`], does its
//! work through the library, and prints results to stdout. Files that could
//! not be read are listed on stderr.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use rag_harness_core::chunk::chunk_text;
use rag_harness_core::models::RawDocument;

use crate::config::Config;
use crate::extract::{collect_paths, Extractor, FormatRegistry};
use crate::pipeline::{Answer, Corpus, PipelineSettings, RagPipeline};

/// Documents named on the command line.
#[derive(Debug, Default, Clone)]
pub struct SourceArgs {
    pub files: Vec<PathBuf>,
    pub dirs: Vec<PathBuf>,
    /// Inline text, one document each.
    pub texts: Vec<String>,
}

impl SourceArgs {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty() && self.texts.is_empty()
    }

    /// Explicit files first, then each directory's matches, deduplicated.
    pub fn paths(&self, config: &Config) -> Result<Vec<PathBuf>> {
        let mut paths = self.files.clone();
        for dir in &self.dirs {
            paths.extend(collect_paths(dir, &config.ingest.include_globs)?);
        }
        let mut seen = std::collections::HashSet::new();
        paths.retain(|p| seen.insert(p.clone()));
        Ok(paths)
    }
}

/// Extract, ingest, and print skipped files to stderr.
async fn build_corpus(
    pipeline: &RagPipeline,
    config: &Config,
    sources: &SourceArgs,
) -> Result<Option<Corpus>> {
    if sources.is_empty() {
        bail!("No documents given. Use --file, --dir, or --text.");
    }

    let paths = sources.paths(config)?;
    let texts = sources
        .texts
        .iter()
        .enumerate()
        .map(|(i, text)| RawDocument::plain(format!("text-{}", i + 1), text.clone()))
        .collect();
    let report = pipeline.ingest_sources(&paths, texts).await?;

    for failure in &report.failures {
        eprintln!("skipped: {}", failure);
    }
    Ok(report.outcome.into_corpus())
}

pub fn run_normalize(config: &Config, text: &str) -> Result<()> {
    let normalizer = config.normalize.normalizer()?;
    println!("{}", normalizer.normalize(text));
    Ok(())
}

pub fn run_chunk(config: &Config, file: &Path) -> Result<()> {
    let settings = PipelineSettings::from_config(config)?;
    let doc = FormatRegistry::default()
        .extract(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let text = match &settings.normalizer {
        Some(normalizer) => normalizer.normalize(&doc.text),
        None => doc.text.clone(),
    };

    let passages = chunk_text(&doc.id, &text, &settings.chunking)?;
    if passages.is_empty() {
        println!("No passages.");
        return Ok(());
    }
    for p in &passages {
        println!("{}\t{}\t{}", p.index, p.length, p.text);
    }
    println!("{} passages", passages.len());
    Ok(())
}

pub async fn run_search(config: &Config, question: &str, sources: &SourceArgs) -> Result<()> {
    let pipeline = RagPipeline::from_config(config)?;
    let Some(corpus) = build_corpus(&pipeline, config, sources).await? else {
        println!("{}", Answer::NoData.render());
        return Ok(());
    };

    let hits = pipeline.retrieve(&corpus, question).await?;
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.4}] {} #{}",
            i + 1,
            hit.score,
            hit.passage.source_id,
            hit.passage.index
        );
        println!("   {}", hit.passage.text);
    }
    Ok(())
}

pub async fn run_ask(config: &Config, question: &str, sources: &SourceArgs) -> Result<()> {
    let pipeline = RagPipeline::from_config(config)?;
    let answer = match build_corpus(&pipeline, config, sources).await? {
        Some(corpus) => pipeline.ask(&corpus, question).await,
        None => Answer::NoData,
    };
    println!("{}", answer.render());
    Ok(())
}

pub async fn run_sentences(
    config: &Config,
    question: &str,
    sources: &SourceArgs,
    top_n: usize,
) -> Result<()> {
    let pipeline = RagPipeline::from_config(config)?;
    let Some(corpus) = build_corpus(&pipeline, config, sources).await? else {
        println!("{}", Answer::NoData.render());
        return Ok(());
    };

    for m in pipeline.best_sentences(&corpus, question, top_n).await? {
        println!("[{:.4}] {}", m.score, m.text);
    }
    Ok(())
}

/// Build a corpus and report its size, to check a document set before
/// asking questions.
pub async fn run_ingest(config: &Config, sources: &SourceArgs) -> Result<()> {
    let pipeline = RagPipeline::from_config(config)?;
    match build_corpus(&pipeline, config, sources).await? {
        Some(corpus) => {
            println!("corpus {}", corpus.id());
            println!("  built at: {}", corpus.built_at().to_rfc3339());
            println!("  documents: {}", corpus.documents().len());
            println!("  passages: {}", corpus.passage_count());
            println!(
                "  dims: {}",
                corpus.index().dims().map(|d| d.to_string()).unwrap_or_default()
            );
        }
        None => println!("{}", Answer::NoData.render()),
    }
    Ok(())
}
