//! Common test utilities and helpers

use async_trait::async_trait;
use calliope_core::config::BaseParameters;
use calliope_core::{
    AttemptStore, ConnectionMode, ContextKey, Diagnostic, EngineConfig, Evaluator,
    EvaluatorResult, GeneratedText, GenerationClient, ParameterSet, QualityOrchestrator, Result,
    Usage,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Create an in-memory attempt store for testing
pub async fn create_test_store() -> Arc<AttemptStore> {
    Arc::new(
        AttemptStore::open(ConnectionMode::InMemory)
            .await
            .expect("Failed to create test store"),
    )
}

/// Engine configuration with one "description" content type and the
/// standard threshold schedule (0.70 base, 0.55 floor, 0.05 step, 5 attempts)
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.content_types.insert(
        "description".to_string(),
        BaseParameters {
            temperature: 0.8,
            repetition_penalty: 1.1,
            novelty: 0.3,
            target_words: 30,
            voice: BTreeMap::new(),
        },
    );
    config
}

/// Generation client that replays a scripted sequence of responses
///
/// Records the parameter set of every call so tests can assert on the
/// adjustments the engine derived between attempts.
pub struct ScriptedClient {
    responses: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<ParameterSet>>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Parameter sets received so far, in call order
    pub fn received(&self) -> Vec<ParameterSet> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    async fn generate(&self, _prompt: &str, params: &ParameterSet) -> Result<GeneratedText> {
        self.calls.lock().unwrap().push(params.clone());
        let text = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedClient ran out of responses");
        Ok(GeneratedText {
            text,
            usage: Usage {
                input_tokens: 25,
                output_tokens: 40,
            },
        })
    }
}

/// Evaluator that always returns the same normalized score and diagnostics
pub struct FixedEvaluator {
    name: String,
    normalized: f64,
    diagnostics: Vec<Diagnostic>,
}

impl FixedEvaluator {
    pub fn new(name: &str, normalized: f64) -> Self {
        Self {
            name: name.to_string(),
            normalized,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_diagnostics(name: &str, normalized: f64, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            name: name.to_string(),
            normalized,
            diagnostics,
        }
    }
}

#[async_trait]
impl Evaluator for FixedEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn score(&self, _text: &str, _context: &ContextKey) -> Result<EvaluatorResult> {
        Ok(EvaluatorResult::new(
            self.name.clone(),
            self.normalized * 100.0,
            self.normalized,
            self.diagnostics.clone(),
        ))
    }
}

/// Evaluator that always fails with a transport error
pub struct FailingEvaluator {
    name: String,
}

impl FailingEvaluator {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Evaluator for FailingEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn score(&self, _text: &str, _context: &ContextKey) -> Result<EvaluatorResult> {
        Err(calliope_core::CalliopeError::Transport(
            "evaluator backend unreachable".to_string(),
        ))
    }
}

/// Orchestrator with one fixed-score evaluator at weight 1.0
pub fn single_evaluator_orchestrator(config: &mut EngineConfig, score: f64) -> QualityOrchestrator {
    config.evaluators.weights.insert("fixed".to_string(), 1.0);
    let mut orchestrator = QualityOrchestrator::new(&config.evaluators);
    orchestrator.register(Arc::new(FixedEvaluator::new("fixed", score)));
    orchestrator
}

/// A complete two-sentence candidate that passes completion validation
pub const COMPLETE_TEXT: &str = "This ceramic dripper brews a clean cup in four minutes flat. \
     The ridged cone keeps the paper filter from sticking, so hot water flows evenly through \
     the whole coffee bed every single time.";

/// A candidate that ends mid-thought and fails completion validation
pub const TRUNCATED_TEXT: &str = "This ceramic dripper brews a clean cup in four minutes flat. \
     The ridged cone keeps the paper filter from";
