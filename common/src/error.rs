//! Typed errors raised before a job reaches the worker pool.
//!
//! Both kinds abort the job synchronously and are reported back in the
//! acknowledgment; nothing is enqueued.

use thiserror::Error;

/// Malformed endpoint data or URL text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("protocol is empty")]
    EmptyProtocol,

    #[error("invalid protocol {0:?}")]
    InvalidProtocol(String),

    #[error("host is empty")]
    EmptyHost,

    #[error("invalid host {0:?}")]
    InvalidHost(String),

    #[error("invalid path {0:?}: `?` and `#` belong to the query map")]
    InvalidPath(String),

    #[error("not a URL with an authority: {0}")]
    MissingAuthority(String),

    #[error("cannot parse {url}: {reason}")]
    Unparseable { url: String, reason: String },
}

/// A structural name could not be derived from the connection URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamingError {
    #[error("path has {found} segment(s), need at least {expected}")]
    MissingSegments { expected: usize, found: usize },

    #[error("missing query parameter `{0}`")]
    MissingParam(&'static str),

    #[error("unusable {name} {value:?} in artifact name")]
    InvalidComponent { name: &'static str, value: String },

    #[error("cannot parse URL for naming: {0}")]
    InvalidUrl(String),
}
