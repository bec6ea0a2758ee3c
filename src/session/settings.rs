use super::error::SessionError;

use std::fmt;
use url::Url;


/// Engine name reserved for the always-available metadata engine.
pub const SYSTEM_ENGINE_NAME: &str = "system";
pub const DEFAULT_ENVIRONMENT: &str = "app";


#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    /// Username/password login against the account API.
    V1,
    /// Service-account (client id/secret) login against the identity API.
    V2,
}

impl ProtocolVersion {
    pub fn number(&self) -> u8 {
        match self {
            ProtocolVersion::V1 => 1,
            ProtocolVersion::V2 => 2,
        }
    }
}


/// Everything needed to open a session. Replacing it forces a reconnect.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub principal: String,
    pub secret: String,
    pub endpoint: Option<String>,
    pub environment: String,
    pub account: Option<String>,
    pub engine: Option<String>,
    pub database: Option<String>,
}

impl fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSettings")
            .field("principal", &self.principal)
            .field("secret", &"***")
            .field("endpoint", &self.endpoint)
            .field("environment", &self.environment)
            .field("account", &self.account)
            .field("engine", &self.engine)
            .field("database", &self.database)
            .finish()
    }
}

impl SessionSettings {
    pub fn new(principal: &str, secret: &str) -> Self {
        Self {
            principal: principal.to_string(),
            secret: secret.to_string(),
            endpoint: None,
            environment: DEFAULT_ENVIRONMENT.to_string(),
            account: None,
            engine: None,
            database: None,
        }
    }

    pub fn with_account(mut self, account: &str) -> Self {
        self.account = Some(account.to_string());
        self
    }

    pub fn with_engine(mut self, engine: &str) -> Self {
        self.engine = Some(engine.to_string());
        self
    }

    pub fn with_database(mut self, database: &str) -> Self {
        self.database = Some(database.to_string());
        self
    }

    pub fn with_environment(mut self, environment: &str) -> Self {
        self.environment = environment.to_string();
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = Some(endpoint.to_string());
        self
    }

    /// Email-style principals log in with protocol 1, everything else is a
    /// service account.
    pub fn protocol_version(&self) -> ProtocolVersion {
        if self.principal.contains('@') {
            ProtocolVersion::V1
        } else {
            ProtocolVersion::V2
        }
    }

    pub fn is_system_engine(&self) -> bool {
        self.engine
            .as_deref()
            .is_none_or(|engine| engine.trim().is_empty() || engine.eq_ignore_ascii_case(SYSTEM_ENGINE_NAME))
    }

    /// Base URL of the account API.
    pub fn api_url(&self) -> Result<Url, SessionError> {
        let endpoint = match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("api.{}.firebolt.io", self.environment),
        };
        normalize_url(&endpoint)
    }

    /// Base URL of the identity provider used by service accounts.
    pub fn identity_url(&self) -> Result<Url, SessionError> {
        normalize_url(&format!("id.{}.firebolt.io", self.environment))
    }

    /// Whether `other` differs only in its database.
    pub fn same_identity(&self, other: &SessionSettings) -> bool {
        self.principal == other.principal
            && self.secret == other.secret
            && self.endpoint == other.endpoint
            && self.environment == other.environment
            && self.account == other.account
            && self.engine == other.engine
    }
}


/// Prefix scheme-less URLs with `https://` and parse them.
pub fn normalize_url(raw: &str) -> Result<Url, SessionError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SessionError::EngineUrlUnresolved);
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    Url::parse(&with_scheme).map_err(|_| SessionError::InvalidUrl(trimmed.to_string()))
}

/// Append percent-encoded path segments to `base`.
pub(crate) fn join_segments(base: &Url, segments: &[&str]) -> Result<Url, SessionError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| SessionError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}


/// The outcome of session resolution: where to send queries and as whom.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedSession {
    pub engine_url: Url,
    pub is_system_engine: bool,
    pub database: Option<String>,
    pub account_id: Option<String>,
    pub infra_version: u32,
    pub protocol_version: ProtocolVersion,
    pub access_token: String,
    /// Parameters the server asked to send with every query.
    pub parameters: Vec<(String, String)>,
}

impl fmt::Debug for ResolvedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedSession")
            .field("engine_url", &self.engine_url.as_str())
            .field("is_system_engine", &self.is_system_engine)
            .field("database", &self.database)
            .field("account_id", &self.account_id)
            .field("infra_version", &self.infra_version)
            .field("protocol_version", &self.protocol_version)
            .field("parameters", &self.parameters)
            .finish()
    }
}
