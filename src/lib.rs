//! AGORA — Autonomous Deliberative Trading Agent
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod session;
pub mod retry;
pub mod data;
pub mod llm;
pub mod debate;
pub mod memory;
pub mod ledger;
pub mod engine;
pub mod storage;
pub mod dashboard;
