//! Orchestration layer: job ledger, batch fan-out, activity persistence,
//! and the [`engine::GenerationEngine`] that wires ledger, prediction
//! client, and asset store together.

pub mod activity;
pub mod batch;
pub mod engine;
pub mod events;
pub mod ledger;
pub mod preferences;

#[cfg(test)]
mod testing;

pub use engine::GenerationEngine;
pub use events::JobEvent;
pub use ledger::JobLedger;
