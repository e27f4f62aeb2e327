//! Quick-deployment API models

pub mod models;

pub use models::*;
