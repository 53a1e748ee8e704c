//! `rofilter` Server — read-only request filtering stage, connection reply
//! delivery, and an async downstream adapter.

pub mod network;
pub mod pipeline;
pub mod telemetry;

pub use pipeline::{AsyncStage, ProcessorConfig, ReadOnlyRequestProcessor, StageRunnable};

#[cfg(test)]
mod test_support;
