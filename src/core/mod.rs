//! Core domain models for stagerun
//!
//! This module defines the pipeline document, stages, trigger conditions,
//! stage outcomes and the aggregated pipeline result.

pub mod condition;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod result;
pub mod stage;
pub mod state;

pub use condition::{evaluate, is_eligible, Eligibility, TriggerContext};
pub use config::{load, load_file};
pub use error::{CommandError, ParseError};
pub use pipeline::*;
pub use result::*;
pub use stage::*;
pub use state::*;
