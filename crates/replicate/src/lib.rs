//! Remote prediction client.
//!
//! Speaks the provider's HTTP API: create a prediction, drive it to a
//! terminal state over a server-sent-event feed or by fixed-interval
//! polling, cancel it best-effort, and upload reference files. The
//! orchestration layer depends only on the [`client::PredictionProvider`]
//! trait; [`client::ReplicateClient`] is the one concrete transport.

pub mod api;
pub mod client;
pub mod poll;
pub mod prediction;
pub mod stream;

pub use client::{PredictionProvider, ReplicateClient, ReplicateConfig};
pub use prediction::{Prediction, PredictionStatus, PredictionUrls};
