use super::resolver::SessionResolver;
use super::settings::SessionSettings;
use crate::error::{FireboltError, FireboltErrorKind};
use crate::query::{AsyncQueryTracker, QueryBuilder, QueryExecutor};
use crate::result::RowCursor;
use crate::transport::{ReqwestTransport, Transport};

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Open,
}


/// A connection to one engine: `Closed -> open() -> Open -> close() -> Closed`.
///
/// Sessions are engine-scoped, so every settings change while open is a full
/// close and reopen.
#[derive(Debug)]
pub struct ConnectionSession {
    settings: SessionSettings,
    resolver: SessionResolver,
    executor: Option<QueryExecutor>,
}

impl ConnectionSession {
    /// A session over HTTPS, sharing the process-wide account cache.
    pub fn new(settings: SessionSettings) -> Result<Self, FireboltError> {
        let transport = ReqwestTransport::new()?;
        Ok(Self::with_transport(settings, Arc::new(transport)))
    }

    pub fn with_transport(settings: SessionSettings, transport: Arc<dyn Transport>) -> Self {
        Self::with_resolver(settings, SessionResolver::new(transport))
    }

    pub fn with_resolver(settings: SessionSettings, resolver: SessionResolver) -> Self {
        Self { settings, resolver, executor: None }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn state(&self) -> ConnectionState {
        match self.executor {
            Some(_) => ConnectionState::Open,
            None => ConnectionState::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub async fn open(&mut self) -> Result<(), FireboltError> {
        self.open_cancellable(&CancellationToken::new()).await
    }

    /// No-op when already open.
    pub async fn open_cancellable(&mut self, cancel: &CancellationToken) -> Result<(), FireboltError> {
        if self.is_open() {
            return Ok(());
        }

        let session = self.resolver.open_session(&self.settings, cancel).await?;
        if session.engine_url.host_str().is_none_or(str::is_empty) {
            return Err(FireboltErrorKind::State("no engine URL was resolved").into());
        }

        tracing::info!(
            "Opened session on {} (database: {})",
            session.engine_url,
            session.database.as_deref().unwrap_or("<none>")
        );
        self.executor = Some(QueryExecutor::new(self.resolver.transport(), session));
        Ok(())
    }

    /// Drops the resolved session and its parameters. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.executor.take().is_some() {
            tracing::info!("Closed session");
        }
    }

    /// Replace the settings, reconnecting if open and anything changed.
    pub async fn update_settings(&mut self, settings: SessionSettings) -> Result<(), FireboltError> {
        if settings == self.settings {
            return Ok(());
        }
        let reopen = self.is_open();
        if reopen && self.settings.same_identity(&settings) {
            tracing::debug!("Changing database to {:?}, reopening session", settings.database);
        } else if reopen {
            tracing::debug!("Connection settings changed, reopening session");
        }
        self.close();
        self.settings = settings;
        if reopen {
            self.open().await?;
        }
        Ok(())
    }

    pub async fn change_database(&mut self, database: &str) -> Result<(), FireboltError> {
        let settings = self.settings.clone().with_database(database);
        self.update_settings(settings).await
    }

    /// The database queries run against; the server may have switched it.
    pub fn database(&self) -> Option<&str> {
        match &self.executor {
            Some(executor) => executor.session().database.as_deref(),
            None => self.settings.database.as_deref(),
        }
    }

    pub fn engine_url(&self) -> Option<&Url> {
        self.executor.as_ref().map(|executor| &executor.session().engine_url)
    }

    pub fn is_system_engine(&self) -> bool {
        match &self.executor {
            Some(executor) => executor.session().is_system_engine,
            None => self.settings.is_system_engine(),
        }
    }

    pub async fn execute(&mut self, sql: &str) -> Result<RowCursor, FireboltError> {
        self.execute_cancellable(sql, &CancellationToken::new()).await
    }

    pub async fn execute_cancellable(
        &mut self,
        sql: &str,
        cancel: &CancellationToken,
    ) -> Result<RowCursor, FireboltError> {
        self.executor()?.execute(sql, cancel).await
    }

    pub async fn execute_streaming(&mut self, sql: &str) -> Result<RowCursor, FireboltError> {
        self.execute_streaming_cancellable(sql, &CancellationToken::new()).await
    }

    pub async fn execute_streaming_cancellable(
        &mut self,
        sql: &str,
        cancel: &CancellationToken,
    ) -> Result<RowCursor, FireboltError> {
        self.executor()?.execute_streaming(sql, cancel).await
    }

    /// Start a parameterised query, see [`QueryBuilder`].
    pub fn query(&mut self, sql: &str) -> QueryBuilder<'_> {
        QueryBuilder::new(self, sql)
    }

    pub async fn submit_async(&mut self, sql: &str) -> Result<String, FireboltError> {
        self.submit_async_cancellable(sql, &CancellationToken::new()).await
    }

    pub async fn submit_async_cancellable(
        &mut self,
        sql: &str,
        cancel: &CancellationToken,
    ) -> Result<String, FireboltError> {
        self.executor()?.submit_async(sql, cancel).await
    }

    pub fn async_queries(&mut self) -> Result<AsyncQueryTracker<'_>, FireboltError> {
        Ok(AsyncQueryTracker::new(self.executor()?))
    }

    pub async fn server_version(&mut self) -> Result<String, FireboltError> {
        let mut cursor = self.execute("SELECT VERSION()").await?;
        if !cursor.advance().await? {
            return Err(FireboltErrorKind::State("server returned no version").into());
        }
        let version = cursor.get_string(0)?.unwrap_or_default();
        cursor.close();
        Ok(version)
    }

    fn executor(&mut self) -> Result<&mut QueryExecutor, FireboltError> {
        self.executor
            .as_mut()
            .ok_or_else(|| FireboltErrorKind::State("session is not open").into())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AccountCache;
    use crate::test_utils::test_utils::{open_system_session, push_v2_login, MockTransport};

    fn session(mock: &Arc<MockTransport>, settings: SessionSettings) -> ConnectionSession {
        let resolver = SessionResolver::with_cache(mock.clone(), Arc::new(AccountCache::new()));
        ConnectionSession::with_resolver(settings, resolver)
    }

    #[tokio::test]
    async fn opens_and_closes() {
        let mock = MockTransport::new();
        let mut session = open_system_session(&mock).await;

        assert_eq!(session.state(), ConnectionState::Open);
        assert!(session.is_system_engine());
        assert_eq!(session.engine_url().unwrap().host_str(), Some("system.example.com"));

        session.close();
        session.close();
        assert_eq!(session.state(), ConnectionState::Closed);
        assert!(session.engine_url().is_none());
    }

    #[tokio::test]
    async fn closed_session_refuses_queries() {
        let mock = MockTransport::new();
        let mut session = session(&mock, SessionSettings::new("id", "secret").with_account("acme"));

        let error = session.execute("SELECT 1").await.unwrap_err();

        assert!(matches!(error.kind, FireboltErrorKind::State(_)));
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn change_database_reopens() {
        let mock = MockTransport::new();
        let mut session = open_system_session(&mock).await;
        session.execute("SET time_zone = UTC").await.unwrap();

        push_v2_login(&mock, Some(2), false);
        session.change_database("sales").await.unwrap();
        assert_eq!(session.database(), Some("sales"));
        assert!(session.is_open());

        mock.push_json(200, r#"{"meta": [], "data": []}"#);
        session.execute("SELECT 1").await.unwrap();
        let query = mock.requests().last().unwrap().url.query().unwrap().to_string();
        assert_eq!(query, "database=sales&output_format=JSON_Compact");
    }

    #[tokio::test]
    async fn engine_change_reopens_on_new_engine() {
        let mock = MockTransport::new();
        let mut session = open_system_session(&mock).await;

        push_v2_login(&mock, Some(2), false);
        mock.push_with_headers(
            200,
            &[("Firebolt-Update-Endpoint", "https://user.example.com/?engine=analytics")],
            "",
        );
        let settings = session.settings().clone().with_engine("analytics");
        session.update_settings(settings).await.unwrap();

        assert!(session.is_open());
        assert!(!session.is_system_engine());
        assert_eq!(session.engine_url().unwrap().host_str(), Some("user.example.com"));
    }

    #[tokio::test]
    async fn unchanged_settings_keep_the_session() {
        let mock = MockTransport::new();
        let mut session = open_system_session(&mock).await;
        let sent = mock.requests().len();

        let settings = session.settings().clone();
        session.update_settings(settings).await.unwrap();

        assert!(session.is_open());
        assert_eq!(mock.requests().len(), sent);
    }

    #[tokio::test]
    async fn closed_settings_change_does_not_connect() {
        let mock = MockTransport::new();
        let mut session = session(&mock, SessionSettings::new("id", "secret").with_account("acme"));

        session.change_database("sales").await.unwrap();

        assert_eq!(session.state(), ConnectionState::Closed);
        assert_eq!(session.database(), Some("sales"));
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn reads_server_version() {
        let mock = MockTransport::new();
        let mut session = open_system_session(&mock).await;
        mock.push_json(200, r#"{"meta": [{"name": "version()", "type": "text"}], "data": [["4.12.0"]]}"#);

        assert_eq!(session.server_version().await.unwrap(), "4.12.0");
    }

    #[tokio::test]
    async fn tracks_async_queries() {
        let mock = MockTransport::new();
        let mut session = open_system_session(&mock).await;
        mock.push_json(200, r#"{"token": "t-1"}"#);
        mock.push_json(
            200,
            r#"{"meta": [{"name": "status", "type": "text"}, {"name": "query_id", "type": "text"}],
                "data": [["ENDED_SUCCESSFULLY", "q-1"]]}"#,
        );

        let token = session.submit_async("INSERT INTO t VALUES (1)").await.unwrap();
        let successful = session.async_queries().unwrap().is_successful(&token).await.unwrap();

        assert_eq!(successful, Some(true));
    }
}
