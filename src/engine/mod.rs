//! Core engine — the daily deliberate → execute → revalue cycle.

pub mod orchestrator;
pub mod reflection;
