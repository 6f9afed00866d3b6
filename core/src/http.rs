//! HTTP transport types shared by the request builder and the interceptors.
//!
//! # Design
//! Requests and responses are described as plain data. The transport builds
//! an `HttpRequest` (base URL joined, bearer credential attached), executes it
//! with reqwest and hands back an `HttpResponse`, which the normalizer then
//! interprets. Keeping both ends as data lets the outbound and inbound
//! interceptors be tested without a network.

use std::fmt;

use serde_json::Value;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Only reads may be replayed automatically.
    pub fn is_read(self) -> bool {
        matches!(self, HttpMethod::Get)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// An outgoing request described as plain data.
///
/// `url` is absolute; `path` is kept for diagnostics. `credential` is the
/// bearer token that was attached, so the inbound side can tell which session
/// a 401 belongs to.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub credential: Option<String>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A received response described as plain data.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body parsed as JSON, or `Value::Null` when it is empty or not JSON.
    pub fn json_body(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_get_is_a_read() {
        assert!(HttpMethod::Get.is_read());
        for method in [HttpMethod::Post, HttpMethod::Put, HttpMethod::Patch, HttpMethod::Delete] {
            assert!(!method.is_read(), "{method} must not be replayed");
        }
    }

    #[test]
    fn header_lookup_ignores_case() {
        let req = HttpRequest {
            method: HttpMethod::Get,
            url: "http://localhost/x".to_string(),
            path: "/x".to_string(),
            query: Vec::new(),
            headers: vec![("Authorization".to_string(), "Bearer abc".to_string())],
            body: None,
            credential: Some("abc".to_string()),
        };
        assert_eq!(req.header("authorization"), Some("Bearer abc"));
        assert_eq!(req.header("accept"), None);
    }

    #[test]
    fn non_json_body_reads_as_null() {
        let resp = HttpResponse {
            status: 502,
            body: "<html>bad gateway</html>".to_string(),
        };
        assert!(!resp.is_success());
        assert_eq!(resp.json_body(), Value::Null);
    }
}
