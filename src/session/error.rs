use crate::transport::TransportError;

use std::error::Error;
use std::fmt;


/// Failure while opening a session. Always fatal for that attempt.
#[derive(Debug)]
pub enum SessionError {
    AccountNotFound(String),
    Authentication { status: u16, message: String },
    EngineNotFound(String),
    EngineNotRunning { engine: String, status: String },
    EngineUrlUnresolved,
    InvalidUrl(String),
    MissingAccount,
    MissingDatabase,
    Transport(TransportError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccountNotFound(account) => write!(f, "Account '{account}' was not found"),
            Self::Authentication { status, message } => {
                write!(f, "Authentication failed with status {status}: {message}")
            },
            Self::EngineNotFound(engine) => write!(f, "Engine '{engine}' was not found"),
            Self::EngineNotRunning { engine, status } => {
                write!(f, "Engine '{engine}' is not running (status: {status})")
            },
            Self::EngineUrlUnresolved => write!(f, "Engine URL could not be resolved"),
            Self::InvalidUrl(url) => write!(f, "Invalid endpoint URL: '{url}'"),
            Self::MissingAccount => write!(f, "An account name is required for this login"),
            Self::MissingDatabase => write!(f, "Either an engine or a database must be provided"),
            Self::Transport(e) => write!(f, "Network failure during session setup: {e}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transport(source) => Some(source),
            _ => None,
        }
    }
}

impl From<TransportError> for SessionError {
    fn from(error: TransportError) -> Self {
        SessionError::Transport(error)
    }
}
