//! Campaign orchestration

pub mod dispatch;
pub mod fsm;
pub mod orchestrator;
