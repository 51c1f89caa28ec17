//! Domain types and pure logic for the research job queue.
//!
//! Nothing in this crate touches the database or the network; the
//! repository and worker crates build on these types.

pub mod error;
pub mod job_outcome;
pub mod retry;
pub mod types;
