//! # pdfchat CLI
//!
//! The `pdfchat` binary ingests PDFs into the vector store and answers
//! questions about them with retrieval-augmented chat.
//!
//! ## Usage
//!
//! ```bash
//! pdfchat --config ./config/pdfchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pdfchat init` | Create the SQLite database and run schema migrations |
//! | `pdfchat ingest <pdf>...` | Extract, chunk, embed and store PDFs |
//! | `pdfchat ask "<question>"` | Answer one question |
//! | `pdfchat chat` | Interactive chat (`/reset`, `/quit`) |
//! | `pdfchat search "<question>"` | Show retrieved context without calling the chat model |
//! | `pdfchat stats` | Collection statistics |
//! | `pdfchat serve` | Start the HTTP API |
//!
//! Logs go to stderr; set `RUST_LOG` to change the level (default `pdfchat=info`).

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use pdfchat::config::{self, Config};
use pdfchat::pipeline::Pipeline;
use pdfchat::session::ChatSession;
use pdfchat::store::{SqliteStore, VectorStore};
use pdfchat::{ingest, search, server, stats};

/// pdfchat: chat with your PDFs.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/pdfchat.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "pdfchat",
    about = "Retrieval-augmented chat over PDF documents",
    version,
    long_about = "pdfchat extracts text from PDF documents, stores embedded chunks in a local \
    SQLite vector store, and answers questions with a hosted chat model using the most relevant \
    chunks and earlier conversation turns as context."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pdfchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file, its tables, and the configured
    /// collection. Running it again is safe.
    Init,

    /// Ingest one or more PDF files.
    ///
    /// Unchanged chunks of a previously ingested file are not re-embedded.
    Ingest {
        /// PDF files to ingest.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Ask a single question and print the answer.
    Ask {
        question: String,
    },

    /// Start an interactive chat on stdin.
    ///
    /// `/reset` clears the transcript, `/quit` exits.
    Chat,

    /// Show the context retrieved for a question.
    Search {
        query: String,

        /// Also print the assembled context block.
        #[arg(long)]
        context: bool,
    },

    /// Show collection statistics.
    Stats,

    /// Start the HTTP API server.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = SqliteStore::open(&cfg).await?;
            let created = store.ensure_collection(&cfg.store.collection).await;
            store.close().await;
            created?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { paths } => {
            ingest::run_ingest(&cfg, &paths).await?;
        }
        Commands::Ask { question } => {
            run_ask(&cfg, &question).await?;
        }
        Commands::Chat => {
            run_chat(&cfg).await?;
        }
        Commands::Search { query, context } => {
            search::run_search(&cfg, &query, context).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pdfchat=info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_ask(cfg: &Config, question: &str) -> Result<()> {
    if question.trim().is_empty() {
        anyhow::bail!("question must not be empty");
    }

    let pipeline = Arc::new(Pipeline::open(cfg).await?);
    let mut session = ChatSession::new(pipeline.clone());
    let outcome = session.ask(question).await;
    pipeline.close().await;

    println!("{}", outcome?.reply);
    Ok(())
}

async fn run_chat(cfg: &Config) -> Result<()> {
    let pipeline = Arc::new(Pipeline::open(cfg).await?);
    let result = chat_loop(pipeline.clone()).await;
    pipeline.close().await;
    result
}

async fn chat_loop(pipeline: Arc<Pipeline>) -> Result<()> {
    let mut session = ChatSession::new(pipeline);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("pdfchat: type a question, /reset to start over, /quit to exit.");
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                session.reset();
                println!("(transcript cleared)");
                continue;
            }
            _ => {}
        }

        match session.ask(input).await {
            Ok(outcome) => {
                println!("{}", outcome.reply);
                println!();
            }
            Err(e) => eprintln!("error: {}", e),
        }
    }

    Ok(())
}
