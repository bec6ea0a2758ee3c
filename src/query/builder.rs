//! Fluent parameter binding on top of [`ConnectionSession`].
//!
//! ```no_run
//! use firebolt_driver::{ConnectionSession, SessionSettings};
//!
//! # tokio_test::block_on(async {
//! let settings = SessionSettings::new("client-id", "client-secret")
//!     .with_account("my-account")
//!     .with_database("analytics");
//! let mut session = ConnectionSession::new(settings).unwrap();
//! session.open().await.unwrap();
//!
//! let mut cursor = session
//!     .query("SELECT * FROM events WHERE id = ? AND kind = ?")
//!     .bind(42)
//!     .bind("click")
//!     .execute()
//!     .await
//!     .unwrap();
//!
//! while cursor.advance().await.unwrap() {
//!     println!("{:?}", cursor.get(0).unwrap());
//! }
//! # });
//! ```

use super::literal::{substitute, ToSqlLiteral};
use crate::error::FireboltError;
use crate::result::RowCursor;
use crate::session::ConnectionSession;

use tokio_util::sync::CancellationToken;


pub struct QueryBuilder<'a> {
    session: &'a mut ConnectionSession,
    query: String,
    params: Vec<String>,
    streaming: bool,
    cancel: CancellationToken,
}

impl<'a> QueryBuilder<'a> {
    pub(crate) fn new(session: &'a mut ConnectionSession, query: &str) -> Self {
        Self {
            session,
            query: query.to_string(),
            params: Vec::new(),
            streaming: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn bind<T: ToSqlLiteral>(mut self, value: T) -> Self {
        self.params.push(value.to_sql_literal());
        self
    }

    /// Ask the server for a line-framed result.
    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The statement with every placeholder replaced.
    pub fn sql(&self) -> Result<String, FireboltError> {
        substitute(&self.query, &self.params)
    }

    pub async fn execute(self) -> Result<RowCursor, FireboltError> {
        let sql = self.sql()?;
        if self.streaming {
            self.session.execute_streaming_cancellable(&sql, &self.cancel).await
        } else {
            self.session.execute_cancellable(&sql, &self.cancel).await
        }
    }
}
