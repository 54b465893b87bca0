//! COINPULSE — crypto opportunity monitor with self-grading advice
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod market;
pub mod engine;
pub mod storage;
pub mod dashboard;
