//! Error types for the panel API client.
//!
//! # Design
//! Every public operation returns either a fully decoded value or exactly one
//! `Error`. Login failures get their own `Auth` variant because they are fatal
//! to session construction, while per-call failures are split by where they
//! happened: the transport (`Transport`), the server's status line (`Api`), or
//! the shape of an otherwise successful body (`Decode`). Nothing is retried or
//! swallowed; variants carry the raw status and body for diagnosis.

use thiserror::Error;

use crate::adaptive::MalformedFieldError;
use crate::links::LinkError;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a login exchange failed.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The panel answered, but not with a successful login.
    #[error("login rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    /// The login request never got a response.
    #[error("login transport failure: {0}")]
    Transport(#[source] ureq::Error),
}

/// Errors returned by `Session` and the endpoint wrappers.
#[derive(Debug, Error)]
pub enum Error {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Connection refused, timeout, TLS failure, or a body that could not be read.
    #[error("transport error: {0}")]
    Transport(#[from] ureq::Error),

    /// A well-formed response outside 200..=299. `body` is passed through as-is.
    #[error("HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// A 2xx response whose body did not match the expected shape.
    #[error("failed to decode response body: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
        body: String,
    },

    #[error(transparent)]
    MalformedField(#[from] MalformedFieldError),

    #[error("invalid base url {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The request payload could not be serialized to JSON.
    #[error("failed to encode request payload: {0}")]
    Encode(#[source] serde_json::Error),

    #[error(transparent)]
    Link(#[from] LinkError),

    /// The panel reported `success: false`. Only produced by `ApiResponse::into_result`.
    #[error("panel rejected the operation: {msg}")]
    Rejected { msg: String },
}

impl Error {
    /// HTTP status attached to this error, if the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::Auth(AuthError::Rejected { status, .. }) => Some(*status),
            _ => None,
        }
    }
}
