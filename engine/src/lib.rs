//! Rollout library
//!
//! Quick deployment campaigns executed as Jenkins builds.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod resolver;
pub mod server;
pub mod storage;
pub mod utils;
pub mod workers;
