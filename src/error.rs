use crate::session::SessionError;
use crate::transport::TransportError;
use crate::types::{CoercionError, TypeGrammarError};

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;


#[derive(Debug)]
#[non_exhaustive]
pub struct FireboltError {
    pub kind: FireboltErrorKind
}

impl FireboltError {
    pub fn new(kind: FireboltErrorKind) -> Self {
        Self { kind }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, FireboltErrorKind::Cancelled)
    }
}

impl fmt::Display for FireboltError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FireboltError: {}", self.kind)
    }
}

impl Error for FireboltError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.kind)
    }
}

#[derive(Debug)]
pub enum FireboltErrorKind {
    AsyncQuery(AsyncQueryError),
    Cancelled,
    Coercion(CoercionError),
    Deserialization(String),
    Index { ordinal: usize, column_count: usize },
    InvalidSetDirective(String),
    ParameterCount { expected: usize, supplied: usize },
    Server(ServerError),
    Session(SessionError),
    State(&'static str),
    StreamProtocol(StreamProtocolError),
    Transport(TransportError),
    TypeGrammar(TypeGrammarError),
    UnknownColumn(String),
    UnsupportedOperation(&'static str),
}

impl fmt::Display for FireboltErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AsyncQuery(e) => write!(f, "{e}"),
            Self::Cancelled => write!(f, "Operation was cancelled"),
            Self::Coercion(e) => write!(f, "{e}"),
            Self::Deserialization(msg) => write!(f, "Failed to decode response body: {msg}"),
            Self::Index { ordinal, column_count } => {
                write!(f, "Column ordinal {ordinal} is out of range for {column_count} column(s)")
            },
            Self::InvalidSetDirective(sql) => write!(f, "Invalid SET statement: '{sql}'"),
            Self::ParameterCount { expected, supplied } => {
                write!(f, "Query has {expected} placeholder(s) but {supplied} parameter(s) were bound")
            },
            Self::Server(e) => write!(f, "{e}"),
            Self::Session(e) => write!(f, "{e}"),
            Self::State(msg) => write!(f, "Invalid state: {msg}"),
            Self::StreamProtocol(e) => write!(f, "{e}"),
            Self::Transport(e) => write!(f, "{e}"),
            Self::TypeGrammar(e) => write!(f, "{e}"),
            Self::UnknownColumn(name) => write!(f, "No column named '{name}'"),
            Self::UnsupportedOperation(op) => write!(f, "Unsupported operation: {op}"),
        }
    }
}

impl Error for FireboltErrorKind {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::AsyncQuery(source) => Some(source),
            Self::Coercion(source) => Some(source),
            Self::Server(source) => Some(source),
            Self::Session(source) => Some(source),
            Self::StreamProtocol(source) => Some(source),
            Self::Transport(source) => Some(source),
            Self::TypeGrammar(source) => Some(source),
            _ => None,
        }
    }
}

impl From<FireboltErrorKind> for FireboltError {
    fn from(kind: FireboltErrorKind) -> Self {
        FireboltError { kind }
    }
}

impl From<AsyncQueryError> for FireboltError {
    fn from(error: AsyncQueryError) -> Self {
        FireboltError { kind: FireboltErrorKind::AsyncQuery(error) }
    }
}

impl From<CoercionError> for FireboltError {
    fn from(error: CoercionError) -> Self {
        FireboltError { kind: FireboltErrorKind::Coercion(error) }
    }
}

impl From<ServerError> for FireboltError {
    fn from(error: ServerError) -> Self {
        FireboltError { kind: FireboltErrorKind::Server(error) }
    }
}

impl From<SessionError> for FireboltError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::Transport(TransportError::Cancelled) => {
                FireboltError { kind: FireboltErrorKind::Cancelled }
            },
            other => FireboltError { kind: FireboltErrorKind::Session(other) },
        }
    }
}

impl From<StreamProtocolError> for FireboltError {
    fn from(error: StreamProtocolError) -> Self {
        FireboltError { kind: FireboltErrorKind::StreamProtocol(error) }
    }
}

impl From<TransportError> for FireboltError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Cancelled => FireboltError { kind: FireboltErrorKind::Cancelled },
            other => FireboltError { kind: FireboltErrorKind::Transport(other) },
        }
    }
}

impl From<TypeGrammarError> for FireboltError {
    fn from(error: TypeGrammarError) -> Self {
        FireboltError { kind: FireboltErrorKind::TypeGrammar(error) }
    }
}

impl From<serde_json::Error> for FireboltError {
    fn from(error: serde_json::Error) -> Self {
        FireboltError { kind: FireboltErrorKind::Deserialization(error.to_string()) }
    }
}


/// One entry of a structured server error body.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub help_link: Option<String>,
    #[serde(default)]
    pub location: Option<serde_json::Value>,
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(severity) = &self.severity {
            write!(f, "{severity}: ")?;
        }
        if let Some(name) = &self.name {
            write!(f, "{name}")?;
            if let Some(code) = &self.code {
                write!(f, " ({code})")?;
            }
            write!(f, " - ")?;
        }
        write!(f, "{}", self.description.as_deref().unwrap_or("no description"))?;
        if let Some(resolution) = &self.resolution {
            write!(f, ", resolution: {resolution}")?;
        }
        Ok(())
    }
}


/// Error reported by the server, surfaced verbatim.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerError {
    pub status: u16,
    pub message: String,
    pub errors: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct StructuredBody {
    errors: Vec<ErrorDetail>,
}

impl ServerError {
    /// Decode a non-success response body.
    ///
    /// Structured `{"errors": [...]}` bodies keep their details; a JSON
    /// `message` or `error` field is used next; anything else is taken as text.
    pub fn from_body(status: u16, body: &[u8]) -> Self {
        if let Ok(structured) = serde_json::from_slice::<StructuredBody>(body) {
            if !structured.errors.is_empty() {
                return Self::from_details(status, structured.errors);
            }
        }

        let message = match serde_json::from_slice::<serde_json::Value>(body) {
            Ok(serde_json::Value::Object(map)) => ["message", "error_description", "error"]
                .iter()
                .find_map(|key| map.get(*key).and_then(|v| v.as_str()).map(str::to_string)),
            _ => None,
        };
        let message = message.unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());
        let message = if message.is_empty() { format!("HTTP status {status}") } else { message };

        Self { status, message, errors: vec![] }
    }

    pub fn from_details(status: u16, errors: Vec<ErrorDetail>) -> Self {
        let message = errors
            .iter()
            .map(ErrorDetail::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Self { status, message, errors }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Server responded with status {}: {}", self.status, self.message)
    }
}

impl Error for ServerError {}


#[derive(Debug, Clone, PartialEq)]
pub enum StreamProtocolError {
    Malformed(String),
    UnexpectedMessage { expected: &'static str, found: &'static str },
}

impl fmt::Display for StreamProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(line) => write!(f, "Malformed stream message: '{line}'"),
            Self::UnexpectedMessage { expected, found } => {
                write!(f, "Unexpected stream message: expected {expected}, found {found}")
            },
        }
    }
}

impl Error for StreamProtocolError {}


#[derive(Debug, Clone, PartialEq)]
pub enum AsyncQueryError {
    MissingQueryId(String),
    MissingToken,
    StatusUnavailable(String),
}

impl fmt::Display for AsyncQueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingQueryId(token) => {
                write!(f, "Status of async query '{token}' carries no query_id")
            },
            Self::MissingToken => write!(f, "Async submission returned no token"),
            Self::StatusUnavailable(token) => {
                write!(f, "No status was returned for async query '{token}'")
            },
        }
    }
}

impl Error for AsyncQueryError {}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn firebolt_error_display_formats_correctly() {
        let cases: Vec<(FireboltErrorKind, &str)> = vec![
            (FireboltErrorKind::Cancelled, "cancelled"),
            (FireboltErrorKind::Index { ordinal: 3, column_count: 2 }, "ordinal 3 is out of range"),
            (FireboltErrorKind::State("cursor not positioned"), "cursor not positioned"),
            (FireboltErrorKind::UnsupportedOperation("column projection"), "Unsupported operation"),
            (FireboltErrorKind::ParameterCount { expected: 2, supplied: 1 }, "2 placeholder(s)"),
            (FireboltErrorKind::InvalidSetDirective("SET x".into()), "Invalid SET"),
            (
                FireboltErrorKind::AsyncQuery(AsyncQueryError::MissingQueryId("tok".into())),
                "carries no query_id",
            ),
            (
                FireboltErrorKind::StreamProtocol(StreamProtocolError::UnexpectedMessage {
                    expected: "START",
                    found: "DATA",
                }),
                "expected START, found DATA",
            ),
        ];

        for (kind, expect) in cases {
            let text = kind.to_string();
            assert!(
                text.contains(expect),
                "Expected `{}` in `{}`",
                expect,
                text
            );
        }
    }

    #[test]
    fn server_error_decodes_structured_body() {
        let body = br#"{"errors":[{"code":"42P01","name":"UnknownTable","severity":"ERROR","description":"table t does not exist","helpLink":"https://docs"}]}"#;
        let error = ServerError::from_body(400, body);

        assert_eq!(error.status, 400);
        assert_eq!(error.errors.len(), 1);
        assert_eq!(error.errors[0].help_link.as_deref(), Some("https://docs"));
        assert!(error.message.contains("UnknownTable (42P01)"));
        assert!(error.message.contains("table t does not exist"));
    }

    #[test]
    fn server_error_falls_back_to_message_or_text() {
        let cases: Vec<(&[u8], &str)> = vec![
            (br#"{"message":"engine is stopped"}"#, "engine is stopped"),
            (br#"{"error":"access_denied"}"#, "access_denied"),
            (b"Bad gateway\n", "Bad gateway"),
            (b"", "HTTP status 502"),
        ];

        for (body, expect) in cases {
            let error = ServerError::from_body(502, body);
            assert_eq!(error.message, expect);
            assert!(error.errors.is_empty());
        }
    }

    #[test]
    fn transport_cancellation_maps_to_cancelled() {
        let error: FireboltError = TransportError::Cancelled.into();
        assert!(error.is_cancelled());

        let error: FireboltError = SessionError::Transport(TransportError::Cancelled).into();
        assert!(error.is_cancelled());
    }

    #[test]
    fn firebolt_error_source_is_accessible() {
        let error: FireboltError = CoercionError::InvalidBoolean("maybe".into()).into();
        let source = error.source().unwrap().to_string();
        assert!(source.contains("maybe"));
    }
}
