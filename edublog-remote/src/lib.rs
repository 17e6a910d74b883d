//! Remote adapter for the EduBlog sync core.
//!
//! The drain only needs three calls against the hosted backend: insert a
//! record, update a record by id, delete a record by id. [`RemoteBackend`]
//! is that seam; [`RestBackend`] implements it against a PostgREST-style
//! table API.

pub mod backend;
pub mod client;
pub mod config;
pub mod error;

pub use backend::RemoteBackend;
pub use client::RestBackend;
pub use config::RemoteConfig;
pub use error::{RemoteError, RemoteResult};
