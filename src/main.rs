//! # ragbox CLI
//!
//! Command-line interface for the document question-answering pipeline.
//!
//! ## Usage
//!
//! ```bash
//! ragbox --config ./ragbox.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragbox ingest` | Vectorize staged documents and archive them |
//! | `ragbox ask "<question>"` | Answer one question against the index |
//! | `ragbox chat` | Interactive multi-turn session |
//!
//! ## Environment
//!
//! `PINECONE_API_KEY` authenticates against the vector index and
//! `GEMINI_API_KEY` against the language model. Both are read from the
//! environment, never from the config file.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

use ragbox::chain::{Answer, RetrievalChain};
use ragbox::chunker::Chunker;
use ragbox::config::{self, Config, StagingConfig};
use ragbox::conversation::ConversationState;
use ragbox::embedding::create_embedder;
use ragbox::index::PineconeIndex;
use ragbox::ingest::{IngestReport, IngestionEngine};
use ragbox::llm::GeminiClient;

/// ragbox — ask questions about your own documents.
#[derive(Parser)]
#[command(
    name = "ragbox",
    about = "A document question-answering pipeline: local embeddings, remote vector index, LLM answer synthesis",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./ragbox.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one batch ingestion pass over the staging directory.
    ///
    /// Loads every staged document, chunks and embeds it, upserts the
    /// vectors, and moves the file into the processed archive. Documents
    /// that fail are reported and left in place for the next run.
    Ingest {
        /// Show document and chunk counts without embedding or uploading.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of documents to process.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Answer a single question against the ingested documents.
    Ask {
        /// The question to answer.
        question: String,
    },

    /// Start an interactive chat session.
    ///
    /// Maintains conversation history for the lifetime of the session.
    /// Type `exit`, `quit`, or `q` to end it.
    Chat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest { dry_run, limit } => run_ingest(&cfg, dry_run, limit).await?,
        Commands::Ask { question } => {
            let chain = build_chain(&cfg)?;
            let mut state = ConversationState::new();
            let answer = chain.ask(&question, &mut state).await?;
            print_answer(&answer);
        }
        Commands::Chat => run_chat(&cfg).await?,
    }

    Ok(())
}

async fn run_ingest(cfg: &Config, dry_run: bool, limit: Option<usize>) -> Result<()> {
    let chunker = Chunker::new(cfg.chunking.chunk_size, cfg.chunking.overlap)?;
    let embedder = create_embedder(&cfg.embedding)?;
    let index = Box::new(PineconeIndex::new(&cfg.index)?);

    let engine = IngestionEngine::new(chunker, embedder, index, cfg.embedding.batch_size);
    let report = engine.run(&cfg.staging, dry_run, limit).await?;

    print!("{}", ingest_summary(&report, &cfg.staging, dry_run));
    for failure in &report.failed {
        eprintln!("warning: {}: {}", failure.name, failure.reason);
    }
    println!("ok");

    Ok(())
}

fn ingest_summary(report: &IngestReport, staging: &StagingConfig, dry_run: bool) -> String {
    let mut out = String::new();

    if dry_run {
        out.push_str("ingest (dry-run)\n");
    } else {
        out.push_str("ingest\n");
    }
    out.push_str(&format!("  documents processed: {}\n", report.processed.len()));
    out.push_str(&format!("  chunks upserted: {}\n", report.chunks_upserted));
    // Nothing is relocated in a dry run, so there is nothing to report moved.
    if !dry_run {
        for name in &report.processed {
            out.push_str(&format!(
                "  moved: {} -> {}\n",
                name,
                staging.processed_path().display()
            ));
        }
    }
    if !report.failed.is_empty() {
        out.push_str(&format!("  failed: {}\n", report.failed.len()));
    }
    if report.processed.is_empty() && report.failed.is_empty() {
        out.push_str(&format!(
            "  staging directory {} is empty. Add documents and run again.\n",
            staging.root.display()
        ));
    }

    out
}

fn build_chain(cfg: &Config) -> Result<RetrievalChain> {
    let embedder = create_embedder(&cfg.embedding)?;
    let index = Box::new(PineconeIndex::new(&cfg.index)?);
    let llm = Box::new(GeminiClient::new(&cfg.llm)?);
    Ok(RetrievalChain::new(
        embedder,
        index,
        llm,
        cfg.retrieval.clone(),
    ))
}

async fn run_chat(cfg: &Config) -> Result<()> {
    let chain = build_chain(cfg)?;
    let mut state = ConversationState::new();

    println!("Chat ready. Type 'exit', 'quit' or 'q' to quit.");

    let stdin = std::io::stdin();
    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let query = line.trim();

        if matches!(query.to_lowercase().as_str(), "exit" | "quit" | "q") {
            println!("Ending session.");
            break;
        }
        if query.is_empty() {
            continue;
        }

        match chain.ask(query, &mut state).await {
            Ok(answer) => print_answer(&answer),
            Err(e) => eprintln!("Error: {:#}", e),
        }
    }

    Ok(())
}

fn print_answer(answer: &Answer) {
    println!("\nAnswer:\n{}\n", answer.text);
    if !answer.sources.is_empty() {
        println!("Sources:");
        for citation in &answer.sources {
            println!(
                "  - {} (chunk {}, score {:.2})",
                citation.document_id, citation.chunk_index, citation.score
            );
        }
        println!();
    }
}
