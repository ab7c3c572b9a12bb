//! Lexant CLI — terminal interface for the Lexant legal-research assistant.
//!
//! Provides both single-question and interactive modes.

use clap::Parser;
use lexant_core::citations::resolve::CitationResolver;
use lexant_core::embedding::{EmbeddingCache, EmbeddingStore, LocalEmbedder, SqliteEmbeddingStore};
use lexant_core::engine::{AskRequest, AssistantEngine};
use lexant_core::providers::{HistoryTurn, create_provider};
use lexant_core::retrieval::backends::CourtListenerBackend;
use lexant_core::retrieval::{Retriever, SearchBackend};
use lexant_core::types::{Answer, SourceMode};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Lexant: California legal research with verified answers
#[derive(Parser, Debug)]
#[command(name = "lexant", version, about, long_about = None)]
struct Cli {
    /// Question to answer (starts interactive mode if omitted)
    question: Option<String>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the full verification report as JSON
    #[arg(long)]
    report: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "lexant=warn",
        1 => "lexant=info,lexant_core=info",
        _ => "lexant=debug,lexant_core=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn build_engine(config_path: Option<&PathBuf>) -> anyhow::Result<AssistantEngine> {
    let config = lexant_core::load_config(config_path.map(|p| p.as_path()))
        .map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))?;

    let provider = create_provider(&config.llm)?;

    let case_law: Arc<dyn SearchBackend> = Arc::new(CourtListenerBackend::new(None));
    let retriever = Retriever::new(vec![case_law.clone()], config.llm.retry.clone());
    let resolver = CitationResolver::new(case_law);

    let store: Option<Arc<dyn EmbeddingStore>> = match &config.cache.store_path {
        Some(path) => match SqliteEmbeddingStore::open(path, config.cache.ttl_secs) {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                tracing::warn!(error = %e, "Durable embedding cache unavailable");
                None
            }
        },
        None => None,
    };
    let embeddings = Arc::new(EmbeddingCache::new(
        config.cache.lru_capacity,
        store,
        Arc::new(LocalEmbedder::new(128)),
    ));

    Ok(AssistantEngine::new(
        provider,
        retriever,
        Some(resolver),
        embeddings,
        config,
    ))
}

fn render_answer(answer: &Answer, show_report: bool) {
    println!("{}\n", answer.text);

    if !answer.sources.is_empty() {
        println!("Sources:");
        for source in &answer.sources {
            let id = source.id.map(|i| i.to_string()).unwrap_or_default();
            println!("  [{id}] {} — {}", source.title, source.url);
        }
    }
    if let Some(status) = answer.verification_status {
        println!("\nVerification: {status}");
    }
    if show_report {
        if let Some(ref report) = answer.verification_report {
            match serde_json::to_string_pretty(report) {
                Ok(json) => println!("\n{json}"),
                Err(e) => eprintln!("could not render report: {e}"),
            }
        }
    }
}

async fn run_question(
    engine: &AssistantEngine,
    question: String,
    history: Vec<HistoryTurn>,
    show_report: bool,
) -> anyhow::Result<Option<HistoryTurn>> {
    let request = AskRequest {
        question: question.clone(),
        mode: SourceMode::General,
        history,
        authoritative_sources: Vec::new(),
    };
    match engine.ask(request).await {
        Ok(answer) => {
            render_answer(&answer, show_report);
            Ok(Some(HistoryTurn {
                user: question,
                assistant: answer.text,
            }))
        }
        Err(e) if e.is_cancellation() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn interactive(engine: AssistantEngine, show_report: bool) -> anyhow::Result<()> {
    println!("Lexant — California legal research. Ctrl-D to exit.");
    println!("This tool provides legal information, not legal advice.\n");

    let stdin = std::io::stdin();
    let mut history: Vec<HistoryTurn> = Vec::new();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim().to_string();
        if question.is_empty() {
            continue;
        }
        if let Some(turn) =
            run_question(&engine, question, history.clone(), show_report).await?
        {
            history.push(turn);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let engine = build_engine(cli.config.as_ref())?;
    match cli.question {
        Some(question) => {
            run_question(&engine, question, Vec::new(), cli.report).await?;
        }
        None => interactive(engine, cli.report).await?,
    }
    Ok(())
}
