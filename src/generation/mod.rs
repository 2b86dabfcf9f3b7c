//! Generation service adapter and completion validation
//!
//! - **GenerationClient**: trait over the external generative text service;
//!   [`HttpGenerationClient`] is the production implementation with bounded
//!   timeouts, transport-level retry, and retryable/fatal error
//!   classification. Transport retries never consume quality attempts.
//! - **CompletionValidator**: detects truncated output before any quality
//!   scoring runs.

pub mod client;
pub mod completion;

pub use client::{GenerationClient, HttpGenerationClient};
pub use completion::CompletionValidator;
