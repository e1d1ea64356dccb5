//! Blocking client for a proxy administration panel's control-plane API.
//!
//! # Overview
//! `Session::open` logs in once and keeps the panel's session cookie in the
//! transport's cookie store; every endpoint call after that is a single
//! authenticated request through `Session::execute`. Response bodies go
//! through two codecs that absorb differences between panel releases:
//! `Adaptive<T>` for fields that may arrive double-encoded as JSON strings,
//! and `EpochTime<R>` for epoch integers in seconds or milliseconds.
//!
//! # Design
//! - Endpoint wrappers are split into pure `build_*` functions (method, path,
//!   body as data) and `Session` methods that execute them.
//! - Status classification happens before decoding: non-2xx is `Error::Api`
//!   with the body untouched, shape mismatches are `Error::Decode`.
//! - No retries, re-login, caching or background work happen inside the
//!   library. Every call is bounded by the session's configured timeout.

pub mod adaptive;
pub mod client;
pub mod epoch;
pub mod error;
pub mod http;
pub mod links;
pub mod session;
pub mod types;

pub use adaptive::{Adaptive, MalformedFieldError};
pub use client::MessageResponse;
pub use epoch::{EpochTime, Millis, PanelTime, Resolution, Seconds, TimeUnit};
pub use error::{AuthError, Error, Result};
pub use http::{HttpMethod, HttpRequest, HttpResponse, RequestBody, API_PREFIX};
pub use links::LinkError;
pub use session::{Session, SessionConfig, TrustPolicy};
pub use types::{
    ApiResponse, Client, ClientTraffic, Inbound, InboundSettings, RealityInnerSettings, RealitySettings,
    StreamSettings, TcpHeader, TcpSettings,
};
