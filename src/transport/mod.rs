//! HTTP capability the driver is built on.
//!
//! The core never talks to a socket directly: session resolution and query
//! execution go through a [`Transport`], so the production
//! [`ReqwestTransport`] can be swapped for a scripted one in tests.

mod http;

pub use self::http::ReqwestTransport;

use bytes::{Bytes, BytesMut};
use futures_util::stream::{Stream, StreamExt};
use std::error::Error;
use std::fmt;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;
use url::Url;


/// Content types that mark a line-framed (streaming) response body.
pub const LINE_FRAMED_CONTENT_TYPES: [&str; 3] = [
    "application/x-ndjson",
    "application/jsonlines",
    "application/x-jsonlines",
];


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}


#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    Text(String),
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}


#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    pub fn get(url: Url) -> Self {
        Self { method: Method::Get, url, headers: vec![], body: None }
    }

    pub fn post(url: Url, body: RequestBody) -> Self {
        Self { method: Method::Post, url, headers: vec![], body: Some(body) }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header("Authorization", format!("Bearer {token}"))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}


pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

pub enum ResponseBody {
    Buffered(Bytes),
    Streaming(BodyStream),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffered(bytes) => write!(f, "Buffered({} bytes)", bytes.len()),
            Self::Streaming(_) => write!(f, "Streaming"),
        }
    }
}


#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are stored lower-cased.
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether the server answered with a line-framed body.
    pub fn is_line_framed(&self) -> bool {
        self.header("content-type").is_some_and(|content_type| {
            let media_type = content_type.split(';').next().unwrap_or("").trim();
            LINE_FRAMED_CONTENT_TYPES
                .iter()
                .any(|framed| media_type.eq_ignore_ascii_case(framed))
        })
    }

    /// Turn the body into a chunk stream, whichever way it arrived.
    pub fn into_stream(self) -> BodyStream {
        match self.body {
            ResponseBody::Streaming(stream) => stream,
            ResponseBody::Buffered(bytes) => {
                Box::pin(futures_util::stream::iter([Ok::<Bytes, TransportError>(bytes)]))
            }
        }
    }

    /// Drain the body into memory.
    pub async fn into_bytes(self) -> Result<Bytes, TransportError> {
        match self.body {
            ResponseBody::Buffered(bytes) => Ok(bytes),
            ResponseBody::Streaming(mut stream) => {
                let mut buffer = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buffer.extend_from_slice(&chunk?);
                }
                Ok(buffer.freeze())
            }
        }
    }
}


/// Failure below the HTTP status level.
#[derive(Debug)]
pub enum TransportError {
    Cancelled,
    Http(reqwest::Error),
    InvalidUrl(String),
    Io(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "Request was cancelled"),
            Self::Http(e) => write!(f, "HTTP request failed: {e}"),
            Self::InvalidUrl(url) => write!(f, "Invalid URL: '{url}'"),
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl Error for TransportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Http(source) => Some(source),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        TransportError::Http(error)
    }
}

impl From<url::ParseError> for TransportError {
    fn from(error: url::ParseError) -> Self {
        TransportError::InvalidUrl(error.to_string())
    }
}


/// Sends one HTTP request and hands back the status, headers and body.
///
/// Implementations must abort pending I/O and return
/// [`TransportError::Cancelled`] once `cancel` fires.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn send(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, TransportError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    fn response(content_type: &str, body: ResponseBody) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: vec![("content-type".into(), content_type.into())],
            body,
        }
    }

    #[test]
    fn detects_line_framed_content_types() {
        let cases = [
            ("application/x-ndjson", true),
            ("application/x-ndjson; charset=utf-8", true),
            ("Application/JSONLines", true),
            ("application/json", false),
            ("text/plain", false),
        ];
        for (content_type, expected) in cases {
            let resp = response(content_type, ResponseBody::Buffered(Bytes::new()));
            assert_eq!(resp.is_line_framed(), expected, "{content_type}");
        }
    }

    #[tokio::test]
    async fn drains_streaming_bodies() {
        let chunks: Vec<Result<Bytes, TransportError>> =
            vec![Ok(Bytes::from_static(b"ab")), Ok(Bytes::from_static(b"cd"))];
        let resp = response(
            "application/x-ndjson",
            ResponseBody::Streaming(Box::pin(futures_util::stream::iter(chunks))),
        );
        assert_eq!(resp.into_bytes().await.unwrap(), Bytes::from_static(b"abcd"));
    }

    #[test]
    fn request_headers_are_case_insensitive() {
        let url = Url::parse("https://example.com").unwrap();
        let request = HttpRequest::get(url).with_bearer("abc");
        assert_eq!(request.header("authorization"), Some("Bearer abc"));
    }
}
