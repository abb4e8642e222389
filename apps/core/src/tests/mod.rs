//! Test Module
//!
//! Cross-component test suites for the campus assistant.
//!
//! ## Test Categories
//! - `pipeline_tests`: Language, matching and handoff through `CampusAssistant::handle`
//! - `session_tests`: Session store concurrency and turn ordering
//! - `turn_log_tests`: SQLite conversation log and daily aggregates
//! - `server_tests`: HTTP routes
