//! Orchestration use cases.

pub mod gather_voices;
pub mod monitor;
pub mod run_round;
pub mod run_session;
