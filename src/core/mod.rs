//! Core domain models
//!
//! This module defines the fundamental data structures that represent
//! workflows, steps, the checkpoint record and the failure taxonomy.

pub mod condition;
pub mod config;
pub mod context;
pub mod failure;
pub mod pipeline;
pub mod state;
pub mod step;

pub use context::*;
pub use failure::*;
pub use pipeline::*;
pub use state::*;
pub use step::*;
