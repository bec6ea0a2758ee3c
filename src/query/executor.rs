use crate::error::{AsyncQueryError, FireboltError, FireboltErrorKind, ServerError};
use crate::result::{ResultTable, RowCursor, StreamingProtocol};
use crate::session::{normalize_url, ResolvedSession};
use crate::transport::{HttpRequest, HttpResponse, RequestBody, Transport};

use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use url::{form_urlencoded, Url};


const UPDATE_PARAMETERS_HEADER: &str = "firebolt-update-parameters";
const REMOVE_PARAMETERS_HEADER: &str = "firebolt-remove-parameters";
const RESET_SESSION_HEADER: &str = "firebolt-reset-session";
const UPDATE_ENDPOINT_HEADER: &str = "firebolt-update-endpoint";

/// Parameters the driver sends itself and will not take from `SET`.
const RESERVED_PARAMETERS: [&str; 2] = ["output_format", "async"];

static SET_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*SET\s+([A-Za-z_][A-Za-z0-9_.]*)\s*=\s*(.*?)[\s;]*$").unwrap()
});


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    JsonCompact,
    JsonLinesCompact,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::JsonCompact => "JSON_Compact",
            OutputFormat::JsonLinesCompact => "JSONLines_Compact",
        }
    }
}


/// Ordered, per-connection set of query-string parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionParameters {
    entries: Vec<(String, String)>,
}

impl SessionParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace, keeping the original position on replace.
    pub fn set(&mut self, name: &str, value: &str) {
        match self.entries.iter_mut().find(|(key, _)| key == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(key, _)| key != name);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn into_vec(self) -> Vec<(String, String)> {
        self.entries
    }
}

/// Split a `SET name = value` statement. `None` if `sql` is not a `SET`.
pub fn parse_set_directive(sql: &str) -> Option<Result<(String, String), FireboltError>> {
    let trimmed = sql.trim_start();
    let is_set = trimmed
        .get(..4)
        .is_some_and(|head| head.eq_ignore_ascii_case("set ") || head.eq_ignore_ascii_case("set\t"));
    if !is_set {
        return None;
    }

    let parsed: Result<(String, String), FireboltError> = SET_DIRECTIVE
        .captures(sql)
        .map(|captures| (captures[1].to_string(), captures[2].to_string()))
        .filter(|(name, value)| {
            !value.is_empty() && !RESERVED_PARAMETERS.iter().any(|r| name.eq_ignore_ascii_case(r))
        })
        .ok_or_else(|| FireboltErrorKind::InvalidSetDirective(sql.trim().to_string()).into());
    Some(parsed)
}


/// Sends SQL to a resolved engine and turns the answer into a [`RowCursor`].
#[derive(Debug)]
pub struct QueryExecutor {
    transport: Arc<dyn Transport>,
    session: ResolvedSession,
    parameters: SessionParameters,
}

impl QueryExecutor {
    /// Query pairs carried by the session's engine URL become parameters.
    pub fn new(transport: Arc<dyn Transport>, mut session: ResolvedSession) -> Self {
        let mut parameters = SessionParameters::new();
        for (name, value) in session.parameters.drain(..) {
            parameters.set(&name, &value);
        }
        for (name, value) in session.engine_url.query_pairs() {
            parameters.set(&name, &value);
        }
        session.engine_url.set_query(None);

        Self { transport, session, parameters }
    }

    pub fn session(&self) -> &ResolvedSession {
        &self.session
    }

    pub fn parameters(&self) -> &SessionParameters {
        &self.parameters
    }

    /// Hand back the session, with the parameters accumulated so far.
    pub fn into_session(self) -> ResolvedSession {
        let mut session = self.session;
        session.parameters = self.parameters.into_vec();
        session
    }

    /// Run `sql`, asking for a buffered result.
    pub async fn execute(
        &mut self,
        sql: &str,
        cancel: &CancellationToken,
    ) -> Result<RowCursor, FireboltError> {
        self.execute_with_format(sql, OutputFormat::JsonCompact, cancel).await
    }

    /// Run `sql`, asking for a line-framed result.
    pub async fn execute_streaming(
        &mut self,
        sql: &str,
        cancel: &CancellationToken,
    ) -> Result<RowCursor, FireboltError> {
        self.execute_with_format(sql, OutputFormat::JsonLinesCompact, cancel).await
    }

    async fn execute_with_format(
        &mut self,
        sql: &str,
        format: OutputFormat,
        cancel: &CancellationToken,
    ) -> Result<RowCursor, FireboltError> {
        if let Some(directive) = parse_set_directive(sql) {
            let (name, value) = directive?;
            tracing::debug!("Setting session parameter '{}'", name);
            self.parameters.set(&name, &value);
            return Ok(RowCursor::empty());
        }

        let response = self.send(sql, format, &[], cancel).await?;

        // The server picks the framing; the requested format is only a hint.
        if response.is_line_framed() {
            let status = response.status;
            let protocol = StreamingProtocol::open(response.into_stream(), status, cancel.clone()).await?;
            return Ok(RowCursor::streaming(protocol));
        }

        let body = read_body(response, cancel).await?;
        Ok(RowCursor::buffered(ResultTable::from_bytes(&body)?))
    }

    /// Submit `sql` for server-side asynchronous execution and return its token.
    pub async fn submit_async(
        &mut self,
        sql: &str,
        cancel: &CancellationToken,
    ) -> Result<String, FireboltError> {
        if parse_set_directive(sql).is_some() {
            return Err(FireboltErrorKind::UnsupportedOperation("SET statements cannot run asynchronously").into());
        }

        let response = self
            .send(sql, OutputFormat::JsonCompact, &[("async", "true")], cancel)
            .await?;
        let body = read_body(response, cancel).await?;
        let value: serde_json::Value = serde_json::from_slice(&body)?;

        value
            .get("token")
            .and_then(|token| token.as_str())
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AsyncQueryError::MissingToken.into())
    }

    /// Session parameters go out as `name=value` exactly as they were set;
    /// everything else is form-encoded.
    fn request_url(&self, format: OutputFormat, extra: &[(&str, &str)]) -> Url {
        let mut query = form_urlencoded::Serializer::new(String::new());
        if let Some(database) = &self.session.database {
            query.append_pair("database", database);
        }
        let mut query = query.finish();

        for (name, value) in self.parameters.iter() {
            if !query.is_empty() {
                query.push('&');
            }
            query.push_str(&format!("{name}={value}"));
        }

        let mut trailing = form_urlencoded::Serializer::for_suffix(query, 0);
        trailing.append_pair("output_format", format.as_str());
        for (name, value) in extra {
            trailing.append_pair(name, value);
        }

        let mut url = self.session.engine_url.clone();
        url.set_query(Some(&trailing.finish()));
        url
    }

    async fn send(
        &mut self,
        sql: &str,
        format: OutputFormat,
        extra: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, FireboltError> {
        let url = self.request_url(format, extra);
        let request = HttpRequest::post(url, RequestBody::Text(sql.to_string()))
            .with_header("Content-Type", "text/plain")
            .with_bearer(&self.session.access_token);

        let started = Instant::now();
        let response = self.transport.send(request, cancel).await?;
        tracing::debug!(
            "Query answered with status {} in {} ms",
            response.status,
            started.elapsed().as_millis()
        );

        if !response.is_success() {
            let status = response.status;
            let body = read_body(response, cancel).await?;
            let error = ServerError::from_body(status, &body);
            tracing::warn!("Query failed: {}", error);
            return Err(error.into());
        }

        self.apply_headers(&response)?;
        Ok(response)
    }

    /// Apply the session changes the server asked for.
    fn apply_headers(&mut self, response: &HttpResponse) -> Result<(), FireboltError> {
        if response.header(RESET_SESSION_HEADER).is_some() {
            tracing::debug!("Server reset the session parameters");
            self.parameters.clear();
        }

        if let Some(names) = response.header(REMOVE_PARAMETERS_HEADER) {
            for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                self.parameters.remove(name);
            }
        }

        if let Some(pairs) = response.header(UPDATE_PARAMETERS_HEADER) {
            for pair in pairs.split(',') {
                let Some((name, value)) = pair.split_once('=') else {
                    continue;
                };
                let (name, value) = (name.trim(), value.trim());
                if name == "database" {
                    tracing::debug!("Server switched database to '{}'", value);
                    self.session.database = Some(value.to_string());
                } else {
                    self.parameters.set(name, value);
                }
            }
        }

        if let Some(endpoint) = response.header(UPDATE_ENDPOINT_HEADER) {
            let mut url = normalize_url(endpoint)?;
            for (name, value) in url.query_pairs() {
                self.parameters.set(&name, &value);
            }
            url.set_query(None);
            tracing::debug!("Server moved the session to {}", url);
            self.session.engine_url = url;
        }

        Ok(())
    }
}

async fn read_body(response: HttpResponse, cancel: &CancellationToken) -> Result<bytes::Bytes, FireboltError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(FireboltErrorKind::Cancelled.into()),
        body = response.into_bytes() => Ok(body?),
    }
}
