//! Shared types for the camrec recording dispatcher: endpoint and URL
//! construction, artifact naming, wire messages and configuration.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod naming;
pub mod protocol;
