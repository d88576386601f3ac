//! HTTP route handlers
//!
//! Each module owns one path prefix and matches on `(method, subpath)`.
//! Handlers return `Result<Response<FullBody>>`; the dispatcher turns any
//! error into the JSON error body through [`error_response`].

pub mod auth;
pub mod centers;
pub mod company_admin;
pub mod counselors;
pub mod finance;
pub mod financial_sessions;
pub mod health;
pub mod notifications;
pub mod payments;
pub mod resources;
pub mod sessions;
pub mod super_admin;

pub use health::health_check;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::error;

use crate::types::{Result, WellspringError};

pub type FullBody = Full<Bytes>;

/// Success envelope shared by every endpoint
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<FullBody> {
    let json = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

/// 200 with `{ success: true, data }`
pub fn ok<T: Serialize>(data: T) -> Result<Response<FullBody>> {
    Ok(json_response(
        StatusCode::OK,
        &ApiResponse {
            success: true,
            message: None,
            data,
        },
    ))
}

/// 201 with `{ success: true, message, data }`
pub fn created<T: Serialize>(message: &str, data: T) -> Result<Response<FullBody>> {
    Ok(json_response(
        StatusCode::CREATED,
        &ApiResponse {
            success: true,
            message: Some(message.to_string()),
            data,
        },
    ))
}

/// 200 with `{ success: true, message, data }`
pub fn ok_with<T: Serialize>(message: &str, data: T) -> Result<Response<FullBody>> {
    Ok(json_response(
        StatusCode::OK,
        &ApiResponse {
            success: true,
            message: Some(message.to_string()),
            data,
        },
    ))
}

/// Translate an error into its status and JSON body.
/// Server faults are logged here with the detail the client never sees.
pub fn error_response(err: WellspringError) -> Response<FullBody> {
    if err.is_server_fault() {
        error!(error = %err, "request failed");
    }
    let (status, body) = err.into_body();
    json_response(status, &body)
}

/// Deserialize a JSON body; an empty body reads as `{}`
pub fn parse_json<T: DeserializeOwned>(req: &Request<Bytes>) -> Result<T> {
    let body = req.body();
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::from_slice(b"{}")?);
    }
    Ok(serde_json::from_slice(body)?)
}

/// Decoded query-string parameters
#[derive(Debug, Default)]
pub struct Query {
    params: HashMap<String, String>,
}

impl Query {
    pub fn from_request(req: &Request<Bytes>) -> Self {
        Self::from_query_string(req.uri().query())
    }

    pub fn from_query_string(query: Option<&str>) -> Self {
        let mut params = HashMap::new();
        if let Some(q) = query {
            for pair in q.split('&') {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                if key.is_empty() {
                    continue;
                }
                let value = urlencoding::decode(&value.replace('+', " "))
                    .map(|v| v.into_owned())
                    .unwrap_or_default();
                params.insert(key.to_string(), value);
            }
        }
        Self { params }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Parse a parameter; a malformed value is a validation error
    pub fn parse<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| WellspringError::invalid(key, format!("invalid value '{raw}'"))),
        }
    }

    pub fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some("true") | Some("1"))
    }
}

/// Path segments after `prefix`, e.g. `["abc", "status"]`
pub fn segments<'a>(path: &'a str, prefix: &str) -> Vec<&'a str> {
    path.strip_prefix(prefix)
        .unwrap_or("")
        .split('/')
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse a JSON string value into a kebab/snake-case enum
pub fn parse_enum<T: DeserializeOwned>(field: &str, raw: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| WellspringError::invalid(field, format!("unknown value '{raw}'")))
}

pub fn route_not_found() -> Result<Response<FullBody>> {
    Err(WellspringError::NotFound("Route".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::SessionStatus;

    #[test]
    fn test_query_decoding() {
        let q = Query::from_query_string(Some("search=box%20breathing&year=2024&refresh=true&x"));
        assert_eq!(q.get("search"), Some("box breathing"));
        assert_eq!(q.parse::<i32>("year").unwrap(), Some(2024));
        assert!(q.flag("refresh"));
        assert_eq!(q.get("x"), None);
        assert!(q.parse::<u32>("search").is_err());
    }

    #[test]
    fn test_segments() {
        assert_eq!(segments("/counseling-sessions/abc/status", "/counseling-sessions"), vec!["abc", "status"]);
        assert!(segments("/counseling-sessions", "/counseling-sessions").is_empty());
    }

    #[test]
    fn test_parse_enum() {
        let status: SessionStatus = parse_enum("status", "completed").unwrap();
        assert_eq!(status, SessionStatus::Completed);
        assert!(parse_enum::<SessionStatus>("status", "finished").is_err());
    }

    #[test]
    fn test_empty_body_reads_as_object() {
        #[derive(serde::Deserialize)]
        struct Body {
            #[serde(default)]
            notes: Option<String>,
        }
        let req = Request::new(Bytes::new());
        let body: Body = parse_json(&req).unwrap();
        assert!(body.notes.is_none());
    }
}
