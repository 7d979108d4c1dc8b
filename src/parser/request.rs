//! Request representation and the minimal wire parser feeding the router.

use std::collections::HashMap;
use std::str::FromStr;
use serde::de::DeserializeOwned;

use crate::parser::error::Error;
use crate::parser::method::Method;
use crate::parser::version::HttpVersion;

/// Represents an HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// The request path, without the query string
    pub path: String,
    /// The raw query string (text after the first `?`), if the target had one
    pub query: Option<String>,
    /// The HTTP version
    pub version: HttpVersion,
    /// The HTTP headers
    pub headers: HashMap<String, String>,
    /// The request body
    pub body: Vec<u8>,
    /// Query parameters decoded from `query`
    pub query_params: HashMap<String, String>,
}

impl HttpRequest {
    /// Create a request from a request target such as `/users/7?expand=1`.
    ///
    /// The target is split at the first `?`; an empty query (`/foo?`) is kept
    /// as `Some("")` so that it can be echoed back verbatim.
    pub fn new(method: Method, target: impl Into<String>, version: HttpVersion, headers: HashMap<String, String>) -> Self {
        let target = target.into();
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target, None),
        };

        let query_params = query
            .as_deref()
            .map(parse_query)
            .unwrap_or_default();

        Self {
            method,
            path,
            query,
            version,
            headers,
            body: Vec::new(),
            query_params,
        }
    }

    /// Create a request with a body.
    pub fn with_body(method: Method, target: impl Into<String>, version: HttpVersion, headers: HashMap<String, String>, body: Vec<u8>) -> Self {
        let mut request = Self::new(method, target, version, headers);
        request.body = body;
        request
    }

    /// Shorthand used by handlers and tests: an HTTP/1.1 request with no headers.
    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::GET, target, HttpVersion::Http11, HashMap::new())
    }

    /// Rebuild the request target (`path` plus `?query` when present).
    pub fn target(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{query}", self.path),
            None => self.path.clone(),
        }
    }

    /// Get a header value, ignoring the case of `name`.
    pub fn get_header(&self, name: &str) -> Option<&String> {
        self.headers.iter().find_map(|(k, v)| {
            if k.eq_ignore_ascii_case(name) {
                Some(v)
            } else {
                None
            }
        })
    }

    /// Check if a header exists.
    pub fn has_header(&self, name: &str) -> bool {
        self.get_header(name).is_some()
    }

    /// Parse the request body as JSON.
    ///
    /// Fails with [`Error::MissingHeader`] unless the request declares a JSON
    /// content type.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        if !self.is_json() {
            return Err(Error::MissingHeader("Content-Type: application/json".to_string()));
        }
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Check if the request has a JSON body.
    pub fn is_json(&self) -> bool {
        self.get_header("Content-Type")
            .is_some_and(|content_type| content_type.starts_with("application/json"))
    }

    /// Get a query parameter value.
    pub fn get_query_param(&self, name: &str) -> Option<&String> {
        self.query_params.get(name)
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

/// Parse an HTTP request head (and any body bytes that follow it) from a byte slice.
pub fn parse_request(input: &[u8]) -> Result<HttpRequest, Error> {
    let input_str = std::str::from_utf8(input)
        .map_err(|_| Error::MalformedRequestLine("Invalid UTF-8".to_string()))?;

    let (head, body) = match input_str.split_once("\r\n\r\n") {
        Some((head, body)) => (head, body),
        None => (input_str, ""),
    };

    let mut lines = head.lines();
    let request_line = lines.next().filter(|line| !line.is_empty()).ok_or(Error::EmptyRequest)?;

    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(Error::MalformedRequestLine(request_line.to_string()));
    }

    let method = Method::from_str(parts[0])?;

    // Only origin-form targets reach the router.
    let target = parts[1];
    if !target.starts_with('/') {
        return Err(Error::InvalidTarget(target.to_string()));
    }

    let version = HttpVersion::from_str(parts[2])?;

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::InvalidHeaderFormat(line.to_string()))?;
        headers.insert(name.trim().to_string(), value.trim().to_string());
    }

    if version == HttpVersion::Http11 && !headers.keys().any(|k| k.eq_ignore_ascii_case("Host")) {
        return Err(Error::MissingHeader("Host".to_string()));
    }

    Ok(HttpRequest::with_body(method, target, version, headers, body.as_bytes().to_vec()))
}
