use firebolt_driver::{FireboltError, FireboltErrorKind};
use serde::Serialize;


#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "message", rename_all = "snake_case")]
pub enum CommandErrorJson {
    Cancelled(String),
    Client(String),
    Connection(String),
    Result(String),
    Server(String),
    Other(String),
}

impl CommandErrorJson {
    pub fn message(&self) -> &str {
        match self {
            Self::Cancelled(m) | Self::Client(m) | Self::Connection(m)
            | Self::Result(m) | Self::Server(m) | Self::Other(m) => m,
        }
    }
}

impl From<&anyhow::Error> for CommandErrorJson {
    fn from(e: &anyhow::Error) -> Self {
        let message = format!("{e}");

        let Some(error) = e.downcast_ref::<FireboltError>() else {
            return Self::Other(message);
        };
        match &error.kind {
            FireboltErrorKind::Cancelled => Self::Cancelled(message),
            FireboltErrorKind::Server(_) | FireboltErrorKind::AsyncQuery(_) => Self::Server(message),
            FireboltErrorKind::Session(_) | FireboltErrorKind::Transport(_) => Self::Connection(message),
            FireboltErrorKind::Coercion(_)
            | FireboltErrorKind::Deserialization(_)
            | FireboltErrorKind::StreamProtocol(_)
            | FireboltErrorKind::TypeGrammar(_) => Self::Result(message),
            _ => Self::Client(message),
        }
    }
}


#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Success,
    Error,
}

#[derive(Debug, Serialize)]
pub struct CommandOutput<T: Serialize> {
    pub command: String,
    pub status: CommandStatus,
    pub data: Option<T>,
    pub error: Option<CommandErrorJson>,
}

impl<T: Serialize> CommandOutput<T> {
    pub fn from_result(command: String, result: anyhow::Result<T>) -> Self {
        match result {
            Ok(data) => Self { command, status: CommandStatus::Success, data: Some(data), error: None },
            Err(e) => Self { command, status: CommandStatus::Error, data: None, error: Some((&e).into()) },
        }
    }
}
