//! Core engine — score → advise → reconcile, and the loops that drive it.

pub mod scorer;
pub mod tracker;
pub mod holdings;
pub mod monitor;
pub mod scheduler;
