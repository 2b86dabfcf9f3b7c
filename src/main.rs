//! Calliope - Quality-Gated Generation Engine
//!
//! Command-line entry point: runs single items or batch manifests through
//! the quality gate, inspects the attempt log, and prints sweet-spot
//! recommendations mined from it.

use clap::{Parser, Subcommand};

use calliope_core::{
    AttemptStore, BatchRunner, ConnectionMode, ContentType, ContextKey, EngineConfig,
    GateOutcome, GenerationEngine, HttpGenerationClient, ItemId, ItemRequest, ParameterSet,
    PromptAssembler, Result, StaticPromptAssembler, SweetSpotAnalyzer,
};

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, warn, Level};
use tracing_subscriber::{self, EnvFilter};

/// Get the default learning store path using the XDG data directory
fn get_default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("calliope")
        .join("attempts.db")
}

/// Get the learning store path from CLI arg, env var, or default
fn get_db_path(cli_path: Option<String>) -> String {
    cli_path
        .or_else(|| std::env::var("CALLIOPE_DB_PATH").ok())
        .unwrap_or_else(|| get_default_db_path().to_string_lossy().to_string())
}

/// One entry in a batch manifest file
#[derive(Debug, Deserialize)]
struct ManifestItem {
    /// Item UUID; a fresh one is minted when absent
    id: Option<String>,

    /// Content type to generate (must have configured defaults)
    content_type: String,

    /// Learning bucket; items without one share the global bucket
    #[serde(default)]
    context: Option<String>,

    /// Item facts the prompt is assembled around
    prompt: String,
}

/// Assembler backed by the per-item instructions of a batch manifest
struct ManifestAssembler {
    instructions: HashMap<ItemId, String>,
}

impl PromptAssembler for ManifestAssembler {
    fn assemble(&self, request: &ItemRequest, params: &ParameterSet) -> String {
        let instruction = self
            .instructions
            .get(&request.item_id)
            .map(String::as_str)
            .unwrap_or("");
        format!(
            "Write a {} for this item. Aim for roughly {} words.\n\n{}",
            request.content_type, params.target_words, instruction
        )
    }
}

/// Open the learning store, creating parent directories as needed
async fn open_store(db_path: &str) -> Result<Arc<AttemptStore>> {
    if let Some(parent) = PathBuf::from(db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = AttemptStore::open(ConnectionMode::Local(PathBuf::from(db_path))).await?;
    Ok(Arc::new(store))
}

/// Build the engine with the standard evaluator set
fn build_engine(config: &EngineConfig, store: Arc<AttemptStore>) -> Result<GenerationEngine> {
    let client = Arc::new(HttpGenerationClient::new(config.generation.clone())?);
    Ok(GenerationEngine::with_default_evaluators(
        config, client, store,
    ))
}

/// Print one gate outcome in the requested format
fn print_outcome(request: &ItemRequest, outcome: &GateOutcome, format: &str) -> Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    match outcome {
        GateOutcome::Accepted {
            text,
            score,
            threshold,
            attempts,
        } => {
            println!("✓ Accepted after {} attempt(s)", attempts);
            println!("  Item:  {}", request.item_id);
            println!("  Score: {:.3} (threshold {:.2})", score, threshold);
            println!();
            println!("{}", text);
        }
        GateOutcome::Exhausted {
            attempts,
            last_score,
            threshold,
            diagnostics,
            dominant,
        } => {
            println!("✗ Attempt budget exhausted after {} attempts", attempts);
            println!("  Item: {}", request.item_id);
            match last_score {
                Some(score) => {
                    println!("  Last score: {:.3} (threshold {:.2})", score, threshold)
                }
                None => println!("  Last attempt was incomplete and never scored"),
            }
            if !dominant.is_empty() {
                println!("  Dominant issues: {}", dominant.join(", "));
            }
            if !diagnostics.is_empty() {
                println!("  Final attempt diagnostics:");
                for diag in diagnostics {
                    println!("    - {}", diag.category());
                }
            }
        }
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "calliope")]
#[command(about = "Quality-gated generation engine for catalog copy", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,

    /// Set log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Learning store path (overrides CALLIOPE_DB_PATH env var and default)
    #[arg(long)]
    db_path: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the learning store
    Init,

    /// Run the quality gate for one item
    Generate {
        /// Item UUID (a fresh one is minted if not given)
        #[arg(short, long)]
        item: Option<String>,

        /// Content type to generate (e.g. "description")
        #[arg(short = 't', long)]
        content_type: String,

        /// Learning bucket (e.g. item category); defaults to the global bucket
        #[arg(long)]
        context: Option<String>,

        /// Inline item facts for the prompt
        #[arg(short, long)]
        prompt: Option<String>,

        /// File containing the item facts
        #[arg(long)]
        prompt_file: Option<String>,

        /// Output format (text/json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run a JSON manifest of items through the bounded pool
    Batch {
        /// Manifest file: a JSON array of {id?, content_type, context?, prompt}
        #[arg(short, long)]
        manifest: String,

        /// Max concurrent items (overrides configuration)
        #[arg(long)]
        max_concurrent: Option<usize>,
    },

    /// Print the sweet-spot recommendation for a bucket
    Recommend {
        /// Content type
        #[arg(short = 't', long)]
        content_type: String,

        /// Learning bucket; defaults to the global bucket
        #[arg(long)]
        context: Option<String>,
    },

    /// Show recorded attempts for an item
    History {
        /// Item UUID
        #[arg(short, long)]
        item: String,

        /// Maximum attempts to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Use the specified level for calliope, WARN for noisy external crates
    let filter = EnvFilter::new(format!(
        "calliope={},hyper=warn,reqwest=warn",
        level.as_str().to_lowercase()
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // Logs to stderr; generated text goes to stdout
        .init();

    debug!("Calliope v{} starting...", env!("CARGO_PKG_VERSION"));

    let db_path = get_db_path(cli.db_path.clone());
    let config_path = cli.config.as_deref().map(Path::new);

    match cli.command {
        Commands::Init => {
            debug!("Initializing learning store at {}", db_path);
            let _store = open_store(&db_path).await?;
            println!("✓ Learning store initialized: {}", db_path);
            Ok(())
        }

        Commands::Generate {
            item,
            content_type,
            context,
            prompt,
            prompt_file,
            format,
        } => {
            let config = EngineConfig::load(config_path)?;

            let instruction = match (prompt, prompt_file) {
                (Some(text), None) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)?,
                (Some(_), Some(_)) => {
                    return Err(
                        anyhow::anyhow!("Use either --prompt or --prompt-file, not both").into(),
                    )
                }
                (None, None) => {
                    return Err(
                        anyhow::anyhow!("One of --prompt or --prompt-file is required").into(),
                    )
                }
            };

            let item_id = match item {
                Some(id_str) => ItemId::from_string(&id_str)
                    .map_err(|e| anyhow::anyhow!("Invalid item ID '{}': {}", id_str, e))?,
                None => ItemId::new(),
            };

            let request = ItemRequest {
                item_id,
                content_type: ContentType::new(content_type),
                context: ContextKey::new(context.unwrap_or_default()),
            };

            let store = open_store(&db_path).await?;
            let engine = build_engine(&config, store)?;
            let assembler = StaticPromptAssembler::new(instruction);

            let outcome = engine
                .generate_with_quality_gate(&request, &assembler)
                .await?;
            print_outcome(&request, &outcome, &format)
        }

        Commands::Batch {
            manifest,
            max_concurrent,
        } => {
            let config = EngineConfig::load(config_path)?;

            let manifest_text = std::fs::read_to_string(&manifest)?;
            let entries: Vec<ManifestItem> = serde_json::from_str(&manifest_text)?;
            if entries.is_empty() {
                println!("Manifest is empty; nothing to do");
                return Ok(());
            }

            let mut requests = Vec::with_capacity(entries.len());
            let mut instructions = HashMap::with_capacity(entries.len());
            for entry in entries {
                let item_id = match entry.id {
                    Some(id_str) => ItemId::from_string(&id_str)
                        .map_err(|e| anyhow::anyhow!("Invalid item ID '{}': {}", id_str, e))?,
                    None => ItemId::new(),
                };
                instructions.insert(item_id, entry.prompt);
                requests.push(ItemRequest {
                    item_id,
                    content_type: ContentType::new(entry.content_type),
                    context: ContextKey::new(entry.context.unwrap_or_default()),
                });
            }

            let store = open_store(&db_path).await?;
            let engine = Arc::new(build_engine(&config, store)?);
            let concurrency = max_concurrent.unwrap_or(config.batch.max_concurrent);
            let runner = BatchRunner::new(engine, concurrency);

            // Ctrl-C drains queued items as cancelled; items already in
            // flight run to their next durable record
            let stop = runner.stop_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Stop requested, draining in-flight items");
                    stop.store(true, Ordering::SeqCst);
                }
            });

            let assembler = Arc::new(ManifestAssembler { instructions });
            let (results, summary) = runner.run(requests, assembler).await;

            println!(
                "Batch complete: {} accepted, {} exhausted, {} failed ({} total)",
                summary.accepted,
                summary.exhausted,
                summary.failed,
                summary.total()
            );
            for result in &results {
                match &result.outcome {
                    Ok(GateOutcome::Accepted {
                        score, attempts, ..
                    }) => {
                        println!(
                            "  ✓ {}  score {:.3} in {} attempt(s)",
                            result.request.item_id, score, attempts
                        );
                    }
                    Ok(GateOutcome::Exhausted {
                        attempts, dominant, ..
                    }) => {
                        println!(
                            "  ✗ {}  exhausted after {} attempts [{}]",
                            result.request.item_id,
                            attempts,
                            dominant.join(", ")
                        );
                    }
                    Err(e) => {
                        println!("  ✗ {}  failed: {}", result.request.item_id, e);
                    }
                }
            }
            Ok(())
        }

        Commands::Recommend {
            content_type,
            context,
        } => {
            let config = EngineConfig::load(config_path)?;
            let store = open_store(&db_path).await?;

            let content_type = ContentType::new(content_type);
            let context = ContextKey::new(context.unwrap_or_default());

            let analyzer = SweetSpotAnalyzer::new(Arc::clone(&store), config.learning.min_samples);
            match analyzer.recommend(&content_type, &context).await? {
                Some(rec) => {
                    println!(
                        "Sweet spot for ({}, {}) from {} accepted attempts:",
                        rec.content_type, rec.context, rec.sample_count
                    );
                    for (name, range) in &rec.ranges {
                        println!("  {:<24} {:.3} .. {:.3}", name, range.min, range.max);
                    }
                }
                None => {
                    let samples = store
                        .accepted_parameters(&content_type, &context)
                        .await?
                        .len();
                    println!(
                        "No recommendation for ({}, {}): {} accepted attempt(s) recorded, {} required",
                        content_type, context, samples, config.learning.min_samples
                    );
                }
            }
            Ok(())
        }

        Commands::History { item, limit } => {
            let store = open_store(&db_path).await?;
            let item_id = ItemId::from_string(&item)
                .map_err(|e| anyhow::anyhow!("Invalid item ID '{}': {}", item, e))?;

            let mut attempts = store.attempts_for_item(item_id).await?;
            if attempts.is_empty() {
                println!("No attempts recorded for item {}", item_id);
                return Ok(());
            }
            let total = attempts.len();
            if total > limit {
                attempts = attempts.split_off(total - limit);
            }

            println!("{} attempt(s) for item {}:", total, item_id);
            for attempt in &attempts {
                let verdict = if attempt.accepted {
                    "accepted".to_string()
                } else {
                    match attempt.rejection {
                        Some(reason) => format!("rejected ({})", reason),
                        None => "rejected".to_string(),
                    }
                };
                let score = match attempt.composite_score {
                    Some(s) => format!("{:.3}", s),
                    None => "-".to_string(),
                };
                println!(
                    "  #{:<2} {}  score {}  threshold {:.2}  {}",
                    attempt.attempt_index,
                    attempt.created_at.format("%Y-%m-%d %H:%M:%S"),
                    score,
                    attempt.effective_threshold,
                    verdict
                );
                for diag in &attempt.diagnostics {
                    println!("      - {}", diag.category());
                }
            }
            Ok(())
        }
    }
}
