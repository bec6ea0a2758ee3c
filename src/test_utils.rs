#[cfg(test)]
pub mod test_utils {
    use crate::session::{AccountCache, ConnectionSession, SessionResolver, SessionSettings};
    use crate::transport::{HttpRequest, HttpResponse, ResponseBody, Transport, TransportError};

    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio_util::sync::CancellationToken;

    /// Scripted transport: records every request and answers with the
    /// queued responses in order.
    #[derive(Debug, Default)]
    pub struct MockTransport {
        responses: Mutex<VecDeque<HttpResponse>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl MockTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn push(&self, response: HttpResponse) {
            self.responses.lock().unwrap().push_back(response);
        }

        pub fn push_json(&self, status: u16, body: &str) {
            self.push_with_headers(status, &[("Content-Type", "application/json")], body);
        }

        pub fn push_with_headers(&self, status: u16, headers: &[(&str, &str)], body: &str) {
            self.push(HttpResponse {
                status,
                headers: headers
                    .iter()
                    .map(|(name, value)| (name.to_lowercase(), value.to_string()))
                    .collect(),
                body: ResponseBody::Buffered(Bytes::from(body.to_string())),
            });
        }

        /// A line-framed body delivered one line per chunk.
        pub fn push_lines(&self, lines: &[&str]) {
            let chunks: Vec<Result<Bytes, TransportError>> = lines
                .iter()
                .map(|line| Ok(Bytes::from(format!("{line}\n"))))
                .collect();
            self.push(HttpResponse {
                status: 200,
                headers: vec![("content-type".to_string(), "application/x-ndjson".to_string())],
                body: ResponseBody::Streaming(Box::pin(futures_util::stream::iter(chunks))),
            });
        }

        pub fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Transport for MockTransport {
        async fn send(
            &self,
            request: HttpRequest,
            cancel: &CancellationToken,
        ) -> Result<HttpResponse, TransportError> {
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| TransportError::Io("no scripted response".to_string()))
        }
    }

    /// Queue a service-account login: token, account resolution (unless the
    /// account is expected to be cached) and the system engine URL.
    pub fn push_v2_login(mock: &MockTransport, infra_version: Option<u32>, resolve: bool) {
        mock.push_json(200, r#"{"access_token": "tok", "expires_in": 3600}"#);
        if resolve {
            let body = match infra_version {
                Some(version) => format!(r#"{{"id": "acc-1", "infraVersion": {version}}}"#),
                None => r#"{"id": "acc-1"}"#.to_string(),
            };
            mock.push_json(200, &body);
        }
        mock.push_json(200, r#"{"engineUrl": "system.example.com"}"#);
    }

    /// Test fixture: a session opened on the system engine of account `acme`.
    pub async fn open_system_session(mock: &Arc<MockTransport>) -> ConnectionSession {
        let resolver = SessionResolver::with_cache(mock.clone(), Arc::new(AccountCache::new()));
        let settings = SessionSettings::new("client", "secret").with_account("acme");
        let mut session = ConnectionSession::with_resolver(settings, resolver);

        push_v2_login(mock, Some(2), true);
        session.open().await.unwrap();
        session
    }
}
