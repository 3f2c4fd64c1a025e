//! Assistant Orchestrator
//!
//! The decision-making core of a personal AI assistant:
//! - Routes inbound requests through deterministic gates before any LLM call
//! - Decomposes complex requests into multi-step plans run by specialist
//!   executors
//! - Runs each step in a bounded reason/act loop over a tool registry
//! - Escalates destructive actions to a human approval channel and executes
//!   them at most once, after sign-off
//!
//! FLOW:
//! INPUT → GATES → (PROPOSE | PLAN → EXECUTE | CLASSIFY → DISPATCH) → REPLY

pub mod api;
pub mod approval;
pub mod channel;
pub mod config;
pub mod error;
pub mod executor;
pub mod llm;
pub mod models;
pub mod planner;
pub mod router;
pub mod tools;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use router::Router;
