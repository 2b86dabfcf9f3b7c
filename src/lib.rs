//! Calliope - Quality-Gated Generation Engine
//!
//! A generation engine for catalog copy that refuses to ship bad text:
//! - Per-item retry loop with an adaptive acceptance threshold
//! - Multi-evaluator quality scoring (AI likelihood, realism, structure)
//! - Diagnostic-driven parameter adjustment between attempts
//! - Append-only attempt log mined for per-bucket sweet spots
//! - Bounded batch pool for running many items concurrently
//!
//! # Architecture
//!
//! The system is organized into several layers:
//! - **Types**: Core data structures (ParameterSet, GenerationAttempt, etc.)
//! - **Params**: Base parameter registry and per-attempt derivation
//! - **Generation**: Service client and completion validation
//! - **Quality**: Evaluators and weighted composite scoring
//! - **Learning**: Append-only attempt store and sweet-spot mining
//! - **Engine**: The retry state machine that ties them together
//!
//! # Example
//!
//! ```ignore
//! use calliope_core::{
//!     AttemptStore, ConnectionMode, EngineConfig, GenerationEngine,
//!     HttpGenerationClient, ItemRequest, StaticPromptAssembler,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> calliope_core::Result<()> {
//!     let config = EngineConfig::load(Some("calliope.toml".as_ref()))?;
//!     let store = Arc::new(
//!         AttemptStore::open(ConnectionMode::Local("attempts.db".into())).await?,
//!     );
//!     let client = Arc::new(HttpGenerationClient::new(config.generation.clone())?);
//!     let engine = GenerationEngine::with_default_evaluators(&config, client, store);
//!
//!     let request = ItemRequest {
//!         item_id: calliope_core::ItemId::new(),
//!         content_type: calliope_core::ContentType::new("description"),
//!         context: calliope_core::ContextKey::new("kitchen"),
//!     };
//!     let assembler = StaticPromptAssembler::new("A ceramic pour-over coffee dripper.");
//!
//!     let outcome = engine.generate_with_quality_gate(&request, &assembler).await?;
//!     println!("accepted: {}", outcome.is_accepted());
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod generation;
pub mod learning;
pub mod params;
pub mod quality;
pub mod types;

// Re-export commonly used types
pub use batch::{BatchItemResult, BatchRunner, BatchSummary};
pub use config::EngineConfig;
pub use engine::{
    Decision, GenerationEngine, PromptAssembler, RetryController, StaticPromptAssembler,
};
pub use error::{CalliopeError, Result};
pub use generation::{CompletionValidator, GenerationClient, HttpGenerationClient};
pub use learning::{
    AttemptStore, ConnectionMode, LearningIntegrator, SweetSpotAnalyzer,
};
pub use params::{ParameterManager, ParameterStore};
pub use quality::{Evaluator, QualityOrchestrator};
pub use types::{
    AttemptId, ContentType, ContextKey, Diagnostic, EvaluatorResult, GateOutcome,
    GeneratedText, GenerationAttempt, ItemId, ItemRequest, ParameterRange, ParameterSet,
    QualityReport, RejectionReason, SweetSpotRecommendation, Usage,
};
