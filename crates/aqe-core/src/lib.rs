//! AQE Core - Shared types for the AQE agent fleet
//!
//! This crate provides the agent type registry, identifiers, and the error
//! taxonomy used by the learning engine.

// Clippy pedantic allows - these are intentional design choices
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::module_name_repetitions)]

pub mod agent;
pub mod error;
pub mod types;
pub mod util;

pub use agent::{AgentInstanceId, AgentType};
pub use error::{LearningError, Result};
pub use types::*;
