//! Authenticated panel session.
//!
//! # Design
//! `Session` owns one blocking ureq `Agent` whose cookie store holds the
//! panel's session cookie. `open` logs in exactly once before returning, so
//! every request made afterwards carries the cookie without caller
//! involvement. The cookie store is written only by the transport from
//! `Set-Cookie` headers; nothing here touches it directly.
//!
//! There is no automatic re-login, retry or caching. A call made with an
//! expired session fails like any other rejected call and the caller decides
//! whether to `login` again. Methods take `&self`, so independent reads may
//! share one session across threads once `open` has returned.

use std::fmt;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use ureq::typestate::WithBody;
use ureq::{Agent, RequestBuilder};
use url::Url;

use crate::error::{AuthError, Error, Result};
use crate::http::{check_status, HttpMethod, HttpRequest, HttpResponse, RequestBody};
use crate::types::ApiResponse;

pub const DEFAULT_PORT: u16 = 2053;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SUBSCRIPTION_PORT: u16 = 2096;
pub const DEFAULT_SUBSCRIPTION_PATH: &str = "/sub/";

const LOGIN_PATH: &str = "/login";

/// How server certificates are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustPolicy {
    #[default]
    Verify,
    /// Accept any certificate. For panels running with self-signed certificates.
    AcceptInvalidCerts,
}

/// Connection parameters for `Session::open`.
#[derive(Clone, Deserialize)]
pub struct SessionConfig {
    pub base_url: String,
    /// Management port substituted into `base_url`.
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub trust: TrustPolicy,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_subscription_port")]
    pub subscription_port: u16,
    #[serde(default = "default_subscription_path")]
    pub subscription_path: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_subscription_port() -> u16 {
    DEFAULT_SUBSCRIPTION_PORT
}

fn default_subscription_path() -> String {
    DEFAULT_SUBSCRIPTION_PATH.to_string()
}

impl SessionConfig {
    pub fn new(base_url: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            password: password.into(),
            trust: TrustPolicy::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            subscription_port: DEFAULT_SUBSCRIPTION_PORT,
            subscription_path: default_subscription_path(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_trust(mut self, trust: TrustPolicy) -> Self {
        self.trust = trust;
        self
    }

    /// Whole seconds, rounded up; anything under one second becomes one.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let partial = u64::from(timeout.subsec_nanos() > 0);
        self.timeout_secs = timeout.as_secs().saturating_add(partial).max(1);
        self
    }

    pub fn with_subscription(mut self, port: u16, path: impl Into<String>) -> Self {
        self.subscription_port = port;
        self.subscription_path = path.into();
        self
    }

    /// Per-call bound. A configured `0` is treated as one second, never as
    /// an immediate timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("base_url", &self.base_url)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("trust", &self.trust)
            .field("timeout_secs", &self.timeout_secs)
            .field("subscription_port", &self.subscription_port)
            .field("subscription_path", &self.subscription_path)
            .finish()
    }
}

/// Put `port` into the authority of `raw`, keeping scheme and path prefix.
/// Query and fragment are dropped and a trailing `/` is trimmed.
pub fn normalize_base_url(raw: &str, port: u16) -> Result<String> {
    let invalid = |reason: &str| Error::InvalidBaseUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };
    let mut url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
    if url.host_str().is_none() || url.cannot_be_a_base() {
        return Err(invalid("missing host"));
    }
    url.set_port(Some(port)).map_err(|()| invalid("scheme cannot carry a port"))?;
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// A logged-in connection to one panel.
pub struct Session {
    agent: Agent,
    base_url: String,
    scheme: String,
    host: String,
    config: SessionConfig,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Build the transport and log in. No session is returned unless login succeeds.
    pub fn open(config: SessionConfig) -> Result<Self> {
        let base_url = normalize_base_url(&config.base_url, config.port)?;
        // Host and scheme of the configured URL feed the link helpers.
        let parsed = Url::parse(&config.base_url).map_err(|e| Error::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;
        let scheme = parsed.scheme().to_string();
        let host = parsed.host_str().unwrap_or_default().to_string();

        let tls = ureq::tls::TlsConfig::builder()
            .disable_verification(config.trust == TrustPolicy::AcceptInvalidCerts)
            .build();
        let agent = Agent::config_builder()
            .timeout_global(Some(config.timeout()))
            .http_status_as_error(false)
            .tls_config(tls)
            .build()
            .new_agent();

        let session = Self {
            agent,
            base_url,
            scheme,
            host,
            config,
        };
        session.login()?;
        Ok(session)
    }

    /// Run the login exchange. The panel's `Set-Cookie` lands in the agent's
    /// cookie store; calling this again renews an expired session.
    pub fn login(&self) -> Result<()> {
        let url = format!("{}{LOGIN_PATH}", self.base_url);
        debug!(%url, username = %self.config.username, "logging in");

        let mut response = self
            .agent
            .post(&url)
            .send_form([
                ("username", self.config.username.as_str()),
                ("password", self.config.password.as_str()),
                ("twoFactorCode", ""),
            ])
            .map_err(AuthError::Transport)?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(AuthError::Transport)?;

        check_login(status, body).inspect_err(|e| warn!(%url, error = %e, "login rejected"))?;
        info!(base_url = %self.base_url, "logged in");
        Ok(())
    }

    /// Send one request and return the raw response, classified by status.
    pub fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        if !request.body.is_empty() && !request.method.allows_body() {
            return Err(Error::InvalidRequest(format!(
                "{} {} must not carry a body",
                request.method.as_str(),
                request.path
            )));
        }
        let url = request.url(&self.base_url);

        let result = match request.method {
            HttpMethod::Get => self.agent.get(&url).call(),
            HttpMethod::Delete => self.agent.delete(&url).call(),
            HttpMethod::Post => send(self.agent.post(&url), &request.body),
            HttpMethod::Put => send(self.agent.put(&url), &request.body),
        };
        let mut response = result?;
        let status = response.status().as_u16();
        let body = response.body_mut().read_to_string()?;
        debug!(method = request.method.as_str(), %url, status, "panel call");

        check_status(HttpResponse { status, body })
    }

    /// Send one request and decode the body as `T`.
    pub fn call<T: DeserializeOwned>(&self, request: &HttpRequest) -> Result<T> {
        self.execute(request)?.decode()
    }

    /// Send one request and decode the result envelope around `T`.
    pub fn call_api<T: DeserializeOwned>(&self, request: &HttpRequest) -> Result<ApiResponse<T>> {
        self.call(request)
    }

    /// `base_url` with the management port, as used for every request.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Host of the configured base URL, without port.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

fn send(builder: RequestBuilder<WithBody>, body: &RequestBody) -> std::result::Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        RequestBody::Empty => builder.send_empty(),
        RequestBody::Json(text) => builder.content_type("application/json").send(text.as_bytes()),
        RequestBody::Form(fields) => builder.send_form(fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
    }
}

/// A login succeeds on HTTP 200 unless the body is a result envelope with
/// `success: false`, which is how the panel reports bad credentials.
fn check_login(status: u16, body: String) -> std::result::Result<(), AuthError> {
    if status != 200 {
        return Err(AuthError::Rejected { status, body });
    }
    match serde_json::from_str::<ApiResponse<serde_json::Value>>(&body) {
        Ok(envelope) if !envelope.success => Err(AuthError::Rejected { status, body }),
        _ => Ok(()),
    }
}
