//! Local HTTP API

pub mod extract;
pub mod handlers;
pub mod jenkins;
pub mod response;
pub mod serve;
pub mod state;
