//! HTTP request and response types described as plain data.
//!
//! # Design
//! Endpoint wrappers build `HttpRequest` values without touching the network
//! and `Session::execute` performs the single round-trip. Keeping requests as
//! data makes every endpoint's method, path and body checkable in unit tests
//! and keeps status classification (`check_status`) independent of the
//! transport.
//!
//! A request carries exactly one body kind: nothing, JSON text, or flat
//! form fields. Bodies on GET and DELETE are rejected before any I/O.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Fixed path segment in front of every authenticated endpoint.
pub const API_PREFIX: &str = "/panel/api";

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether a request body may be attached.
    pub fn allows_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }
}

/// Request payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Sent as `application/json`.
    Json(String),
    /// Sent as `application/x-www-form-urlencoded`.
    Form(Vec<(String, String)>),
}

impl RequestBody {
    pub fn json<T: Serialize + ?Sized>(payload: &T) -> Result<Self> {
        serde_json::to_string(payload).map(RequestBody::Json).map_err(Error::Encode)
    }

    pub fn form<K, V, I>(fields: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        RequestBody::Form(fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }

    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            RequestBody::Empty => None,
            RequestBody::Json(_) => Some("application/json"),
            RequestBody::Form(_) => Some("application/x-www-form-urlencoded"),
        }
    }
}

/// An API request relative to `API_PREFIX`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Path below the API prefix, always starting with `/`.
    pub path: String,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, path: &str, body: RequestBody) -> Result<Self> {
        if !body.is_empty() && !method.allows_body() {
            return Err(Error::InvalidRequest(format!(
                "{} {path} must not carry a body",
                method.as_str()
            )));
        }
        Ok(Self {
            method,
            path: normalize_path(path),
            body,
        })
    }

    pub fn get(path: &str) -> Self {
        Self {
            method: HttpMethod::Get,
            path: normalize_path(path),
            body: RequestBody::Empty,
        }
    }

    pub fn post(path: &str, body: RequestBody) -> Self {
        Self {
            method: HttpMethod::Post,
            path: normalize_path(path),
            body,
        }
    }

    /// Absolute URL for this request under `base`.
    pub fn url(&self, base: &str) -> String {
        format!("{base}{API_PREFIX}{}", self.path)
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    /// Decode the body of a response already known to be successful.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|source| Error::Decode {
            source,
            body: self.body.clone(),
        })
    }
}

/// Map any status outside 200..=299 to `Error::Api` without looking at the body.
pub fn check_status(response: HttpResponse) -> Result<HttpResponse> {
    if (200..300).contains(&response.status) {
        return Ok(response);
    }
    Err(Error::Api {
        status: response.status,
        body: response.body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_with_body_is_rejected() {
        let err = HttpRequest::new(HttpMethod::Get, "/inbounds/list", RequestBody::Json("{}".into()))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn delete_with_form_is_rejected() {
        let body = RequestBody::form([("id", "1")]);
        assert!(HttpRequest::new(HttpMethod::Delete, "/x", body).is_err());
    }

    #[test]
    fn post_accepts_either_body_kind() {
        let json = HttpRequest::new(HttpMethod::Post, "/a", RequestBody::Json("{}".into())).unwrap();
        assert_eq!(json.body.content_type(), Some("application/json"));
        let form = HttpRequest::new(HttpMethod::Post, "/a", RequestBody::form([("k", "v")])).unwrap();
        assert_eq!(form.body.content_type(), Some("application/x-www-form-urlencoded"));
    }

    #[test]
    fn missing_leading_slash_is_added() {
        let req = HttpRequest::get("inbounds/list");
        assert_eq!(req.path, "/inbounds/list");
        assert_eq!(
            req.url("https://panel.example.com:2053"),
            "https://panel.example.com:2053/panel/api/inbounds/list"
        );
    }

    #[test]
    fn success_range_passes() {
        for status in [200, 201, 204, 299] {
            let resp = HttpResponse {
                status,
                body: String::new(),
            };
            assert!(check_status(resp).is_ok(), "status {status}");
        }
    }

    #[test]
    fn server_error_is_api_error_with_verbatim_body() {
        let resp = HttpResponse {
            status: 500,
            body: r#"{"msg":"server error"}"#.to_string(),
        };
        match check_status(resp).unwrap_err() {
            Error::Api { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, r#"{"msg":"server error"}"#);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn redirect_is_not_success() {
        let resp = HttpResponse {
            status: 302,
            body: String::new(),
        };
        assert!(matches!(check_status(resp), Err(Error::Api { status: 302, .. })));
    }

    #[test]
    fn bad_body_is_decode_error() {
        let resp = HttpResponse {
            status: 200,
            body: "not json".to_string(),
        };
        let err = resp.decode::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, Error::Decode { ref body, .. } if body == "not json"));
    }

    #[test]
    fn json_body_from_payload() {
        let body = RequestBody::json(&serde_json::json!({"a": 1})).unwrap();
        assert_eq!(body, RequestBody::Json(r#"{"a":1}"#.to_string()));
    }
}
