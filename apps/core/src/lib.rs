//! Campus Assist core.
//!
//! Multilingual (en, hi, gu, mr, raj) question answering for a campus office:
//! keyword intent matching over a static knowledge base, per-session context,
//! and handoff to a human when confidence is low.

pub mod brain;
pub mod config;
pub mod error;
pub mod server;
pub mod telemetry;
pub mod turn_log;

#[cfg(test)]
mod tests;
