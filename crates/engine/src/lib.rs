//! Client for the external research engine.
//!
//! The engine runs the AI research pipeline for one task per request. This
//! crate wraps its HTTP API with [`reqwest`] and exposes the
//! [`ResearchBackend`] trait that the worker dispatches through.

pub mod api;
pub mod backend;

pub use api::{ResearchEngineApi, ResearchEngineError};
pub use backend::ResearchBackend;
