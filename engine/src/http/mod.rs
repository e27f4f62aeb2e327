//! Jenkins build runner client

pub mod builds;
pub mod client;
pub mod jobs;
pub mod pool;
pub mod system;
