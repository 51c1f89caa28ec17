//! Repository layer. Each repo is a zero-sized struct with associated
//! functions that take a pool reference.

pub mod job_repo;

pub use job_repo::JobRepo;
