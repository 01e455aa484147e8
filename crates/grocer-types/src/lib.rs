//! Shared types for the grocer crates: row models, request payloads,
//! notifications and the backend contract.

pub mod api;
pub mod backend;
pub mod events;
pub mod models;

pub use backend::{Backend, BackendError};
