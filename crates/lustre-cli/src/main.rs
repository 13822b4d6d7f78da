//! CLI entry point for the Lustre backend (for operators and dev).

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use lustre_core::{
    app_data_dir, load_config, load_config_from, load_persisted, rebuild, set_catalog_path,
    telemetry, watch_catalog, ChatOrchestrator, ChatRequest, Config, ConversationTurn,
    FilterConstraints, JsonCatalogSource, OllamaClient, ProductSummary, SnapshotHandle,
};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "lustre")]
#[command(about = "Lustre: product recommendations from your catalog")]
struct Cli {
    /// Read config from this file instead of the app data directory.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show whether an index is loaded and how many products it holds.
    Status,
    /// Show where Lustre stores its config and index (app data directory).
    DataDir,
    /// Remember the catalog JSON file used for rebuilds.
    SetCatalog {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// Embed the catalog, replace the index, and save it.
    Rebuild {
        /// Catalog file; defaults to the configured one.
        #[arg(long, value_name = "PATH")]
        catalog: Option<PathBuf>,
    },
    /// Retrieve and filter products without calling the model.
    Search {
        query: String,
        #[command(flatten)]
        filters: Filters,
    },
    /// Ask for a recommendation.
    Chat {
        query: String,
        #[command(flatten)]
        filters: Filters,
        /// JSON array of prior turns: [{"role": "user", "text": "..."}].
        #[arg(long, value_name = "FILE")]
        history: Option<PathBuf>,
        /// Seconds to wait for the model before giving up.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Rebuild whenever the catalog file changes.
    Watch {
        #[arg(long, value_name = "PATH")]
        catalog: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct Filters {
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    min_price: Option<f64>,
    #[arg(long)]
    max_price: Option<f64>,
    /// Number of products wanted.
    #[arg(long)]
    limit: Option<usize>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => match load_config_from(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => load_config(),
    };
    telemetry::init(&cfg.logging.level);

    let result = match cli.command.unwrap_or(Commands::Status) {
        Commands::Status => status(&cfg),
        Commands::DataDir => match app_data_dir() {
            Some(p) => {
                println!("{}", p.display());
                Ok(())
            }
            None => Err("could not determine app data directory".to_string()),
        },
        Commands::SetCatalog { path } => set_catalog_path(&path)
            .map(|()| println!("Catalog set to {}", path.display()))
            .map_err(|e| e.to_string()),
        Commands::Rebuild { catalog } => run_rebuild(&cfg, catalog).await,
        Commands::Search { query, filters } => search(&cfg, &query, &filters).await,
        Commands::Chat {
            query,
            filters,
            history,
            timeout_secs,
        } => chat(&cfg, query, filters, history.as_deref(), timeout_secs).await,
        Commands::Watch { catalog } => watch(cfg, catalog).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

type Orchestrator = ChatOrchestrator<OllamaClient, OllamaClient>;

/// Loads the persisted index and wires it to Ollama.
fn orchestrator(cfg: &Config) -> Result<Orchestrator, String> {
    let snapshot = load_persisted(cfg.index_dir().as_deref(), cfg.index.dimension)
        .map_err(|e| format!("{e} (run `lustre rebuild`)"))?;
    let client = OllamaClient::from_config(&cfg.ollama).map_err(|e| e.to_string())?;
    let handle = Arc::new(SnapshotHandle::new(snapshot));
    Ok(ChatOrchestrator::new(handle, client.clone(), client, cfg))
}

fn catalog_source(cfg: &Config, explicit: Option<PathBuf>) -> Result<JsonCatalogSource, String> {
    explicit
        .or_else(|| cfg.catalog_path())
        .map(JsonCatalogSource::new)
        .ok_or_else(|| "no catalog configured (use `lustre set-catalog <PATH>`)".to_string())
}

fn status(cfg: &Config) -> Result<(), String> {
    println!("Lustre backend");
    match orchestrator(cfg) {
        Ok(o) => {
            let s = o.status();
            println!("  index loaded: {}", s.index_loaded);
            println!("  products: {}", s.total_products);
            println!("  build: {}", s.build_id);
            println!("  model: {} at {}", s.model, cfg.ollama.url);
        }
        Err(e) => println!("  index: {}", e),
    }
    match cfg.catalog_path() {
        Some(p) => println!("  catalog: {}", p.display()),
        None => println!("  catalog: (not set)"),
    }
    Ok(())
}

async fn run_rebuild(cfg: &Config, catalog: Option<PathBuf>) -> Result<(), String> {
    let source = catalog_source(cfg, catalog)?;
    let o = orchestrator(cfg).or_else(|_| fresh_orchestrator(cfg))?;
    let report = rebuild(
        o.snapshots(),
        &source,
        o.retriever().embedder(),
        &cfg.index,
        cfg.index_dir().as_deref(),
    )
    .await
    .map_err(|e| e.to_string())?;
    print_json(&report)
}

/// Orchestrator over an empty index, for rebuilding over inconsistent artifacts.
fn fresh_orchestrator(cfg: &Config) -> Result<Orchestrator, String> {
    let snapshot = load_persisted(None, cfg.index.dimension).map_err(|e| e.to_string())?;
    let client = OllamaClient::from_config(&cfg.ollama).map_err(|e| e.to_string())?;
    Ok(ChatOrchestrator::new(
        Arc::new(SnapshotHandle::new(snapshot)),
        client.clone(),
        client,
        cfg,
    ))
}

async fn search(cfg: &Config, query: &str, filters: &Filters) -> Result<(), String> {
    let o = orchestrator(cfg)?;
    let constraints = FilterConstraints {
        min_score: Some(cfg.retrieval.min_score),
        category: filters.category.clone(),
        min_price: filters.min_price,
        max_price: filters.max_price,
    };
    let limit = filters.limit.unwrap_or(cfg.retrieval.default_limit);
    let found = o
        .search(query, &constraints, limit)
        .await
        .map_err(|e| e.to_string())?;
    let summaries: Vec<ProductSummary> = found.iter().map(ProductSummary::from).collect();
    print_json(&summaries)
}

async fn chat(
    cfg: &Config,
    query: String,
    filters: Filters,
    history: Option<&Path>,
    timeout_secs: Option<u64>,
) -> Result<(), String> {
    let o = orchestrator(cfg)?;
    let history = match history {
        Some(path) => read_history(path)?,
        None => Vec::new(),
    };
    let request = ChatRequest {
        query,
        category: filters.category,
        min_price: filters.min_price,
        max_price: filters.max_price,
        history,
        limit: filters.limit,
        timeout: timeout_secs.map(Duration::from_secs),
    };
    let response = o.chat(&request).await.map_err(|e| e.to_string())?;
    print_json(&response)
}

fn read_history(path: &Path) -> Result<Vec<ConversationTurn>, String> {
    let raw = std::fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    serde_json::from_str(&raw).map_err(|e| format!("{}: {}", path.display(), e))
}

async fn watch(cfg: Config, catalog: Option<PathBuf>) -> Result<(), String> {
    let source = catalog_source(&cfg, catalog)?;
    let o = Arc::new(orchestrator(&cfg).or_else(|_| fresh_orchestrator(&cfg))?);
    let runtime = tokio::runtime::Handle::current();
    let path = source.path().to_path_buf();
    println!("Watching {} (Ctrl+C to stop)", path.display());

    tokio::task::spawn_blocking(move || {
        watch_catalog(&path, move |_| {
            let result = runtime.block_on(rebuild(
                o.snapshots(),
                &source,
                o.retriever().embedder(),
                &cfg.index,
                cfg.index_dir().as_deref(),
            ));
            match result {
                Ok(report) => println!("Rebuilt: {} product(s)", report.indexed),
                Err(e) => eprintln!("Rebuild failed: {}", e),
            }
        })
    })
    .await
    .map_err(|e| e.to_string())?
    .map_err(|e| e.to_string())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let s = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", s);
    Ok(())
}
