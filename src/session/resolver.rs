use super::auth;
use super::cache::{AccountCache, AccountCacheEntry};
use super::error::SessionError;
use super::settings::{join_segments, normalize_url, ProtocolVersion, ResolvedSession, SessionSettings};
use crate::error::{FireboltError, FireboltErrorKind, ServerError};
use crate::query::{quote_identifier, QueryExecutor, ToSqlLiteral};
use crate::transport::{HttpRequest, Transport};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;


#[derive(Deserialize)]
struct SystemEngineResponse {
    #[serde(rename = "engineUrl")]
    engine_url: String,
}

#[derive(Deserialize)]
struct AccountResolveResponse {
    id: String,
    #[serde(rename = "infraVersion", default)]
    infra_version: Option<u32>,
}

#[derive(Deserialize)]
struct AccountIdResponse {
    account_id: String,
}

#[derive(Deserialize)]
struct DefaultAccountResponse {
    account: DefaultAccount,
}

#[derive(Deserialize)]
struct DefaultAccount {
    id: String,
}

#[derive(Deserialize)]
struct EngineUrlResponse {
    engine_url: String,
}


/// Turns [`SessionSettings`] into a [`ResolvedSession`]: logs in, finds the
/// account and locates the engine to query.
#[derive(Clone, Debug)]
pub struct SessionResolver {
    transport: Arc<dyn Transport>,
    cache: Arc<AccountCache>,
}

impl SessionResolver {
    /// A resolver backed by the process-wide account cache.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_cache(transport, AccountCache::shared())
    }

    pub fn with_cache(transport: Arc<dyn Transport>, cache: Arc<AccountCache>) -> Self {
        Self { transport, cache }
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    pub fn cache(&self) -> &Arc<AccountCache> {
        &self.cache
    }

    pub async fn open_session(
        &self,
        settings: &SessionSettings,
        cancel: &CancellationToken,
    ) -> Result<ResolvedSession, FireboltError> {
        let started = Instant::now();
        let token = auth::authenticate(self.transport.as_ref(), settings, cancel).await?;

        let session = match settings.protocol_version() {
            ProtocolVersion::V2 => self.resolve_v2(settings, token, cancel).await?,
            ProtocolVersion::V1 => self.resolve_v1(settings, token, cancel).await?,
        };

        tracing::info!(
            "Resolved engine {} (system: {}, infra version: {}) in {} ms",
            session.engine_url,
            session.is_system_engine,
            session.infra_version,
            started.elapsed().as_millis()
        );
        Ok(session)
    }

    async fn resolve_v2(
        &self,
        settings: &SessionSettings,
        token: String,
        cancel: &CancellationToken,
    ) -> Result<ResolvedSession, FireboltError> {
        let account = settings
            .account
            .as_deref()
            .filter(|account| !account.trim().is_empty())
            .ok_or(SessionError::MissingAccount)?;
        let api = settings.api_url()?;

        let entry = self.account_entry(settings, &api, account, &token, cancel).await?;

        let url = join_segments(&api, &["web", "v3", "account", account, "engineUrl"])?;
        let response: SystemEngineResponse = self
            .get_json(url, &token, cancel, || SessionError::AccountNotFound(account.to_string()))
            .await?;

        let system = ResolvedSession {
            engine_url: normalize_url(&response.engine_url)?,
            is_system_engine: true,
            database: settings.database.clone(),
            account_id: Some(entry.account_id),
            infra_version: entry.infra_version,
            protocol_version: ProtocolVersion::V2,
            access_token: token,
            parameters: vec![],
        };

        let engine = match settings.engine.as_deref() {
            Some(engine) if !settings.is_system_engine() => engine,
            _ => return Ok(system),
        };

        if system.infra_version >= 2 {
            self.attach_engine(system, engine, cancel).await
        } else {
            self.lookup_engine(system, engine, settings, cancel).await
        }
    }

    /// Newer accounts switch engines with `USE ENGINE`; the server answers
    /// with the engine endpoint in a response header.
    async fn attach_engine(
        &self,
        system: ResolvedSession,
        engine: &str,
        cancel: &CancellationToken,
    ) -> Result<ResolvedSession, FireboltError> {
        let mut executor = QueryExecutor::new(self.transport.clone(), system);
        let system_url = executor.session().engine_url.clone();

        let mut cursor = executor
            .execute(&format!("USE ENGINE {}", quote_identifier(engine)), cancel)
            .await
            .map_err(session_failure)?;
        cursor.close();

        if executor.session().engine_url == system_url {
            return Err(SessionError::EngineNotFound(engine.to_string()).into());
        }

        let mut session = executor.into_session();
        session.is_system_engine = false;
        Ok(session)
    }

    /// Older accounts look the engine up in `information_schema.engines`.
    async fn lookup_engine(
        &self,
        system: ResolvedSession,
        engine: &str,
        settings: &SessionSettings,
        cancel: &CancellationToken,
    ) -> Result<ResolvedSession, FireboltError> {
        let mut executor = QueryExecutor::new(self.transport.clone(), system);
        let sql = format!(
            "SELECT url, attached_to, status FROM information_schema.engines WHERE engine_name = {}",
            engine.to_sql_literal()
        );
        let mut cursor = executor.execute(&sql, cancel).await.map_err(session_failure)?;

        if !cursor.advance().await.map_err(session_failure)? {
            return Err(SessionError::EngineNotFound(engine.to_string()).into());
        }
        let url = cursor.get_string(0)?.ok_or(SessionError::EngineUrlUnresolved)?;
        let attached_to = cursor.get_string(1)?;
        let status = cursor.get_string(2)?.unwrap_or_default();
        cursor.close();

        if !status.eq_ignore_ascii_case("running") {
            return Err(SessionError::EngineNotRunning {
                engine: engine.to_string(),
                status,
            }.into());
        }

        let mut session = executor.into_session();
        session.engine_url = normalize_url(&url)?;
        session.is_system_engine = false;
        session.database = settings.database.clone().or(attached_to);
        session.parameters = vec![];
        Ok(session)
    }

    async fn resolve_v1(
        &self,
        settings: &SessionSettings,
        token: String,
        cancel: &CancellationToken,
    ) -> Result<ResolvedSession, FireboltError> {
        let api = settings.api_url()?;

        let account_id = match settings.account.as_deref().filter(|a| !a.trim().is_empty()) {
            Some(account) => self.account_entry(settings, &api, account, &token, cancel).await?.account_id,
            None => {
                let url = join_segments(&api, &["iam", "v2", "account"])?;
                let response: DefaultAccountResponse = self
                    .get_json(url, &token, cancel, || SessionError::AccountNotFound("default".to_string()))
                    .await?;
                response.account.id
            },
        };

        let mut url = join_segments(&api, &["core", "v1", "accounts", &account_id])?;
        let not_found = match (settings.engine.as_deref(), settings.database.as_deref()) {
            (Some(engine), _) if !settings.is_system_engine() => {
                url = join_segments(&url, &["engines:getURLByName"])?;
                url.query_pairs_mut().append_pair("engine_name", engine);
                SessionError::EngineNotFound(engine.to_string())
            },
            (_, Some(database)) => {
                url = join_segments(&url, &["engines:getURLByDatabaseName"])?;
                url.query_pairs_mut().append_pair("database_name", database);
                SessionError::EngineUrlUnresolved
            },
            _ => return Err(SessionError::MissingDatabase.into()),
        };
        let response: EngineUrlResponse = self.get_json(url, &token, cancel, || not_found).await?;

        Ok(ResolvedSession {
            engine_url: normalize_url(&response.engine_url)?,
            is_system_engine: false,
            database: settings.database.clone(),
            account_id: Some(account_id),
            infra_version: 1,
            protocol_version: ProtocolVersion::V1,
            access_token: token,
            parameters: vec![],
        })
    }

    /// Account id and infra version, from the cache when possible.
    async fn account_entry(
        &self,
        settings: &SessionSettings,
        api: &Url,
        account: &str,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<AccountCacheEntry, FireboltError> {
        let protocol = settings.protocol_version();
        if let Some(entry) = self.cache.get(&settings.environment, account, protocol).await {
            tracing::debug!("Account cache hit for '{}'", account);
            return Ok(entry);
        }
        tracing::debug!("Account cache miss for '{}'", account);

        let entry = match protocol {
            ProtocolVersion::V2 => {
                let url = join_segments(api, &["web", "v3", "account", account, "resolve"])?;
                let response: AccountResolveResponse = self
                    .get_json(url, token, cancel, || SessionError::AccountNotFound(account.to_string()))
                    .await?;
                AccountCacheEntry {
                    account_id: response.id,
                    infra_version: response.infra_version.unwrap_or(1),
                }
            },
            ProtocolVersion::V1 => {
                let mut url = join_segments(api, &["iam", "v2", "accounts:getIdByName"])?;
                url.query_pairs_mut().append_pair("accountName", account);
                let response: AccountIdResponse = self
                    .get_json(url, token, cancel, || SessionError::AccountNotFound(account.to_string()))
                    .await?;
                AccountCacheEntry { account_id: response.account_id, infra_version: 1 }
            },
        };

        Ok(self.cache.insert_if_absent(&settings.environment, account, protocol, entry).await)
    }

    /// GET a JSON document; a 404 is reported as `not_found()`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        token: &str,
        cancel: &CancellationToken,
        not_found: impl FnOnce() -> SessionError,
    ) -> Result<T, FireboltError> {
        let started = Instant::now();
        let path = url.path().to_string();
        let response = self
            .transport
            .send(HttpRequest::get(url).with_bearer(token), cancel)
            .await
            .map_err(SessionError::from)?;
        let status = response.status;
        let success = response.is_success();
        let body = response.into_bytes().await.map_err(SessionError::from)?;
        tracing::debug!("GET {} -> {} in {} ms", path, status, started.elapsed().as_millis());

        if status == 404 {
            return Err(not_found().into());
        }
        if !success {
            return Err(ServerError::from_body(status, &body).into());
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Engine lookups run as queries; a failed request there is a failed open.
fn session_failure(error: FireboltError) -> FireboltError {
    match error.kind {
        FireboltErrorKind::Transport(error) => SessionError::from(error).into(),
        _ => error,
    }
}
