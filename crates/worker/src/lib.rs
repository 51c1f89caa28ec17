//! Research job worker.
//!
//! Claims queued jobs from the Job Store one at a time, dispatches each to
//! the research engine, records the outcome, and runs the stale-job reaper
//! alongside. Any number of worker processes may share one database; the
//! claim's row lock is the only coordination between them.

pub mod config;
pub mod dispatcher;
pub mod recorder;
pub mod reaper;
pub mod runner;

pub use config::WorkerConfig;
pub use runner::{CycleOutcome, Worker, WorkerError};
