//! Jenkins REST API wire models
//!
//! Field names follow the camelCase JSON emitted by `/api/json` endpoints.

pub mod models;

pub use models::*;
