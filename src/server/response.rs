//! HTTP response types and utilities.

use std::collections::HashMap;
use serde::Serialize;

use crate::parser::HttpVersion;
use crate::server::error::Error;
use crate::server::output::OutputEnv;

/// HTTP status codes with their standard reason phrases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok = 200,
    Created = 201,
    Accepted = 202,
    NoContent = 204,
    MovedPermanently = 301,
    Found = 302,
    BadRequest = 400,
    Unauthorized = 401,
    Forbidden = 403,
    NotFound = 404,
    MethodNotAllowed = 405,
    InternalServerError = 500,
    NotImplemented = 501,
    BadGateway = 502,
    ServiceUnavailable = 503,
}

impl StatusCode {
    /// Get the reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::Accepted => "Accepted",
            StatusCode::NoContent => "No Content",
            StatusCode::MovedPermanently => "Moved Permanently",
            StatusCode::Found => "Found",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::BadGateway => "Bad Gateway",
            StatusCode::ServiceUnavailable => "Service Unavailable",
        }
    }

    /// The numeric code.
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }
}

/// Represents an HTTP response.
///
/// Besides being plain data, a response is the concrete implementation of
/// the output protocol (see [`Responder`](crate::server::Responder)): once
/// prepared against an [`OutputEnv`] it serializes itself into that
/// environment's sink.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// The HTTP status code
    pub status: StatusCode,
    /// The HTTP headers
    pub headers: HashMap<String, String>,
    /// The response body
    pub body: Vec<u8>,
    pub(crate) output: Option<OutputEnv>,
    pub(crate) written: bool,
}

impl HttpResponse {
    /// Create a new HTTP response with the given status code.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
            output: None,
            written: false,
        }
    }

    /// A response whose body is the stock HTML page for `status`.
    pub fn generic(status: StatusCode) -> Self {
        let code = status.as_u16();
        let reason = status.reason_phrase();
        Self::new(status)
            .with_content_type("text/html; charset=utf-8")
            .with_body_string(format!(
                "<html><head><title>{code} {reason}</title></head><body><h1>{code} {reason}</h1></body></html>"
            ))
    }

    /// A `302 Found` pointing at `location`.
    pub fn redirect(location: impl Into<String>) -> Self {
        Self::generic(StatusCode::Found).with_header("Location", location)
    }

    /// Set the response body with a string.
    pub fn with_body_string(self, body: impl Into<String>) -> Self {
        self.with_body_bytes(body.into().into_bytes())
    }

    /// Set the response body with bytes.
    pub fn with_body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        let content_length = self.body.len().to_string();
        self.with_header("Content-Length", content_length)
    }

    /// Add or replace a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the content type.
    pub fn with_content_type(self, content_type: impl Into<String>) -> Self {
        self.with_header("Content-Type", content_type)
    }

    /// Set the response body with a JSON value.
    pub fn with_json<T: Serialize>(self, value: &T) -> Result<Self, Error> {
        let json = serde_json::to_vec(value).map_err(Error::JsonError)?;
        Ok(self
            .with_header("Content-Type", "application/json")
            .with_body_bytes(json))
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Convert the response to HTTP/1.1 bytes, body included.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.serialize(HttpVersion::Http11, true)
    }

    pub(crate) fn serialize(&self, version: HttpVersion, include_body: bool) -> Vec<u8> {
        let mut bytes = format!(
            "{version} {} {}\r\n",
            self.status.as_u16(),
            self.status.reason_phrase()
        )
        .into_bytes();

        for (name, value) in &self.headers {
            bytes.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        bytes.extend_from_slice(b"\r\n");

        if include_body {
            bytes.extend_from_slice(&self.body);
        }
        bytes
    }
}
