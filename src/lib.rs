//! maac-forge: scenario generation and trial execution for MAAC evaluation.
//!
//! This library sweeps a domain x tier x repetition x model grid, renders a
//! scenario for every position, validates its complexity against the
//! intended tier and schedules trials of accepted scenarios against model
//! providers.

// Core modules
pub mod cli;
pub mod complexity;
pub mod config;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod scenario;
pub mod scheduler;
pub mod storage;

// Re-export commonly used error types
pub use error::{ConfigError, GenerationError, LlmError};
pub use scheduler::{OrchestratorError, PoolError, QueueError};
pub use storage::StoreError;
