//! Append-only learning store and sweet-spot mining
//!
//! Every generation attempt, accepted or not, lands in the
//! `generation_attempts` table exactly once and is never mutated afterwards.
//! Single writer per record through [`LearningIntegrator`]; concurrent
//! readers ([`SweetSpotAnalyzer`], history views) see snapshot-consistent
//! data, so recommendations may lag the newest writes.

pub mod integrator;
pub mod schema;
pub mod store;
pub mod sweet_spot;

pub use integrator::LearningIntegrator;
pub use schema::init_attempts_table;
pub use store::{AttemptStore, ConnectionMode};
pub use sweet_spot::SweetSpotAnalyzer;
