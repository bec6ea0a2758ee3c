use super::{HttpRequest, HttpResponse, Method, RequestBody, ResponseBody, Transport, TransportError};

use bytes::Bytes;
use futures_util::StreamExt;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;


const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("firebolt-driver/", env!("CARGO_PKG_VERSION"));


/// [`Transport`] backed by a shared `reqwest` client.
///
/// Line-framed responses are handed back as a chunk stream so the caller can
/// decode them incrementally; every other body is read fully.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        Self::with_connect_timeout(DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn with_connect_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, TransportError> {
        let method = request.method;
        // Query strings can carry session parameters; log the path only.
        let target = format!("{}{}", request.url.host_str().unwrap_or(""), request.url.path());

        let mut builder = match method {
            Method::Get => self.client.get(request.url),
            Method::Post => self.client.post(request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            Some(RequestBody::Text(text)) => builder.body(text),
            Some(RequestBody::Json(value)) => builder.json(&value),
            Some(RequestBody::Form(fields)) => builder.form(&fields),
            None => builder,
        };

        let started = Instant::now();
        tracing::debug!("Sending {} to {}", method, target);

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            response = builder.send() => response?,
        };

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        tracing::debug!(
            "Response from {}: status={} elapsed_ms={}",
            target,
            status,
            started.elapsed().as_millis()
        );

        let mut http_response = HttpResponse {
            status,
            headers,
            body: ResponseBody::Buffered(Bytes::new()),
        };

        if http_response.is_success() && http_response.is_line_framed() {
            let stream = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(TransportError::from));
            http_response.body = ResponseBody::Streaming(Box::pin(stream));
        } else {
            let bytes = tokio::select! {
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                bytes = response.bytes() => bytes?,
            };
            http_response.body = ResponseBody::Buffered(bytes);
        }

        Ok(http_response)
    }
}
