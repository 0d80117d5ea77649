use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use harbor_config::{ConfigLoader, HarborConfig};
use harbor_core::{Clock, SystemClock};
use harbor_llm::{
    EmbeddingProvider, GenerationProvider, OpenAiCompatEmbedding, OpenAiCompatGeneration,
};
use harbor_memory::{
    backfill_embeddings, MemoryStore, RetentionConfig, RetentionManager, RetrievalConfig,
    RetrievalEngine,
};
use harbor_runtime::signals::{HeuristicEnergy, KeywordRelevance};
use harbor_runtime::{ContextComposer, ConversationPipeline, PolicyEngine};

#[derive(Parser)]
#[command(name = "harbor", about = "Harbor — companion agent with tiered memory")]
struct Cli {
    /// Path to harbor.toml (default: $HARBOR_CONFIG or ~/.harbor/harbor.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat in the terminal (the default)
    Chat {
        /// Owner identity for this session
        #[arg(short, long, default_value = "local")]
        owner: String,
    },
    /// Run one retention pass and exit
    Retention,
    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> harbor_core::Result<()> {
    let loader = ConfigLoader::load(cli.config.as_deref())?;
    let config = loader.get();
    harbor_config::init_tracing(&config.logging);

    match cli.command.unwrap_or(Command::Chat {
        owner: "local".into(),
    }) {
        Command::Chat { owner } => cmd_chat(config, owner).await,
        Command::Retention => cmd_retention(config).await,
        Command::Config => {
            let rendered = toml::to_string_pretty(&config)
                .map_err(|e| harbor_core::HarborError::Config(e.to_string()))?;
            println!("# {}", loader.path().display());
            print!("{rendered}");
            Ok(())
        }
    }
}

fn open_store(config: &HarborConfig, clock: Arc<dyn Clock>) -> harbor_core::Result<Arc<MemoryStore>> {
    let db_path = config.db_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Arc::new(MemoryStore::open(&db_path, clock)?))
}

async fn cmd_chat(config: HarborConfig, owner: String) -> harbor_core::Result<()> {
    if config.services.api_key.is_none() {
        eprintln!("warning: no API key configured.");
        eprintln!("   Add to [services] in harbor.toml:  api_key = \"sk-...\"");
        eprintln!("   Or set env var: export HARBOR_API_KEY=sk-...");
        eprintln!();
    }
    let api_key = config.services.api_key.clone().unwrap_or_default();

    let mut generation = OpenAiCompatGeneration::new(api_key.clone());
    if let Some(ref url) = config.services.base_url {
        generation = generation.with_base_url(url.clone());
    }
    if let Some(ref model) = config.services.generation_model {
        generation = generation.with_model(model.clone());
    }
    let generation: Arc<dyn GenerationProvider> = Arc::new(generation);

    let mut embedder = OpenAiCompatEmbedding::new(api_key);
    if let Some(ref url) = config.services.base_url {
        embedder = embedder.with_base_url(url.clone());
    }
    if let Some(ref model) = config.services.embedding_model {
        embedder = embedder.with_model(model.clone(), 1536);
    }
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(embedder);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = open_store(&config, Arc::clone(&clock))?;

    let retrieval = Arc::new(RetrievalEngine::new(
        Arc::clone(&store),
        Arc::clone(&embedder),
        RetrievalConfig {
            ef_construction: config.memory.index.ef_construction,
            ef_search: config.memory.index.ef_search,
            embedding_deadline: Duration::from_secs(config.pipeline.embedding_deadline_secs),
        },
    ));
    let composer = ContextComposer::new(
        retrieval,
        Arc::clone(&store),
        Arc::new(KeywordRelevance::default()),
    );
    let policy = PolicyEngine::new(config.policy.stressor_threshold, Arc::new(HeuristicEnergy));
    let pipeline = ConversationPipeline::new(
        composer,
        policy,
        Arc::clone(&generation),
        Arc::clone(&embedder),
        Arc::clone(&store),
        Arc::clone(&clock),
        config.pipeline.clone(),
    );

    // Retention runs alongside the chat loop.
    let retention = Arc::new(RetentionManager::new(
        Arc::clone(&store),
        Arc::clone(&clock),
        RetentionConfig {
            max_age_days: config.memory.retention_max_age_days,
            batch_size: config.memory.retention_batch_size,
            interval: Duration::from_secs(config.memory.retention_interval_secs),
            ..RetentionConfig::default()
        },
    ));
    tokio::spawn(Arc::clone(&retention).run());

    println!("Harbor chat — type 'exit' or Ctrl+C to quit");
    println!();

    use tokio::io::AsyncBufReadExt;
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        eprint!("you> ");
        use std::io::Write;
        std::io::stderr().flush().ok();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => break,
        };
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message == "exit" || message == "quit" {
            break;
        }

        match pipeline.process_turn(&owner, message, None).await {
            Ok(outcome) => {
                println!("{}", outcome.response);
                println!();
            }
            Err(e) => {
                error!(error = %e, "turn failed");
                eprintln!("(turn failed: {e})");
            }
        }

        // Repair any records stored without an embedding.
        if let Err(e) = backfill_embeddings(&store, embedder.as_ref(), &owner, 64).await {
            tracing::debug!(error = %e, "embedding backfill deferred");
        }
    }

    println!("goodbye");
    Ok(())
}

async fn cmd_retention(config: HarborConfig) -> harbor_core::Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = open_store(&config, Arc::clone(&clock))?;

    let manager = RetentionManager::new(
        store,
        clock,
        RetentionConfig {
            max_age_days: config.memory.retention_max_age_days,
            batch_size: config.memory.retention_batch_size,
            interval: Duration::from_secs(config.memory.retention_interval_secs),
            ..RetentionConfig::default()
        },
    );
    let report = manager.run_once().await?;
    println!(
        "pruned {} records across {} owners ({} failed)",
        report.records_pruned, report.owners_processed, report.owners_failed
    );
    Ok(())
}
