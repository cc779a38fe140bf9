//! Pub/sub execution runtime for chained tools
//!
//! This crate provides the engine that runs a subscription graph: the
//! registry mapping producers to their consumers, the dispatcher that fans
//! every output envelope out to its subscribers, the completion tracker
//! whose return to zero ends the run, and the worker that orchestrates all
//! of it.

mod dispatcher;
mod registry;
mod tracker;
mod worker;

pub use registry::SubscriptionRegistry;
pub use tracker::CompletionTracker;
pub use worker::{RunReport, RunState, SeedPolicy, SinkOutput, Worker, WorkerConfig, WorkerError};
