//! Mail triage: message lifecycle orchestration for LLM-backed mail classification.

pub mod api;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod mail;
pub mod orchestrator;
pub mod queue;
pub mod store;
