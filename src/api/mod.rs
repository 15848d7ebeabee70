//! HTTP surface: thin axum handlers over the orchestrator.

mod error;
pub mod routes;

pub use error::ApiError;
pub use routes::{ApiState, api_routes};
