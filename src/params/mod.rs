//! Parameter derivation for generation attempts
//!
//! Two collaborating pieces:
//!
//! - **ParameterStore**: read access to the declarative base configuration
//!   (per content-type defaults, declared valid ranges). Pure lookup, no
//!   behavior beyond merge.
//! - **ParameterManager**: produces the concrete [`ParameterSet`] for one
//!   generation call by combining store defaults, sweet-spot recommendations,
//!   and diagnostic-driven retry adjustments.
//!
//! [`ParameterSet`]: crate::types::ParameterSet

pub mod manager;
pub mod store;

pub use manager::ParameterManager;
pub use store::ParameterStore;
