//! DRIP — Automated daily DCA purchases on the Gemini exchange
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod venue;
pub mod engine;
pub mod sheets;
pub mod storage;
