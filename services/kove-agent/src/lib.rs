//! # Kove Agent
//!
//! The exporter process: watch intake, evaluation dispatch and the HTTP
//! surface serving the violation metrics.

pub mod runtime;
pub mod server;

pub use runtime::Agent;
pub use server::{router, AgentState};
