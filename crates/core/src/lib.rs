//! Domain types shared across the darkroom generation pipeline.
//!
//! Pure data and logic only: no I/O, no async. The job state machine,
//! the generation request and its per-model option sets, the error
//! taxonomy, content hashing, and batch naming all live here.

pub mod error;
pub mod hashing;
pub mod job;
pub mod naming;
pub mod request;
