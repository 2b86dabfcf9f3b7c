//! Read access to the declarative parameter configuration
//!
//! The store answers two questions: what are the base parameters for a
//! content type, and what is the declared valid range for a named parameter.
//! All values come from [`EngineConfig`]; the store never invents defaults.

use crate::config::{EngineConfig, RangeConfig};
use crate::error::{CalliopeError, Result};
use crate::types::{ContentType, ParameterRange, ParameterSet};
use std::collections::BTreeMap;

/// Lookup view over per content-type defaults and declared ranges
#[derive(Debug, Clone)]
pub struct ParameterStore {
    base: BTreeMap<String, ParameterSet>,
    ranges: RangeConfig,
}

impl ParameterStore {
    /// Build the store from validated configuration
    pub fn new(config: &EngineConfig) -> Self {
        let base = config
            .content_types
            .iter()
            .map(|(name, params)| (name.clone(), params.to_parameter_set()))
            .collect();

        Self {
            base,
            ranges: config.ranges.clone(),
        }
    }

    /// Base parameters for a content type
    pub fn base_for(&self, content_type: &ContentType) -> Result<ParameterSet> {
        self.base
            .get(content_type.as_str())
            .cloned()
            .ok_or_else(|| CalliopeError::UnknownContentType(content_type.to_string()))
    }

    /// Declared valid range for a flat-namespace parameter name
    pub fn range_of(&self, name: &str) -> Option<ParameterRange> {
        self.ranges.range_of(name)
    }

    /// Clamp a value into its declared range; passthrough for undeclared names
    pub fn clamp(&self, name: &str, value: f64) -> f64 {
        match self.range_of(name) {
            Some(range) => range.clamp(value),
            None => value,
        }
    }

    /// All configured content types
    pub fn content_types(&self) -> Vec<ContentType> {
        self.base.keys().map(ContentType::new).collect()
    }
}
