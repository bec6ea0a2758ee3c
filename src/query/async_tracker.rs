use super::executor::QueryExecutor;
use super::literal::ToSqlLiteral;
use crate::error::{AsyncQueryError, FireboltError};
use crate::result::RowCursor;

use tokio_util::sync::CancellationToken;


#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AsyncQueryState {
    Running,
    EndedSuccessfully,
    /// Any other status the server reports, kept verbatim.
    Terminal(String),
}

impl AsyncQueryState {
    pub fn from_status(status: &str) -> Self {
        match status.trim() {
            s if s.eq_ignore_ascii_case("RUNNING") => AsyncQueryState::Running,
            s if s.eq_ignore_ascii_case("ENDED_SUCCESSFULLY") => AsyncQueryState::EndedSuccessfully,
            s => AsyncQueryState::Terminal(s.to_string()),
        }
    }
}


/// Server-side status of an asynchronous query. Never cached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AsyncQueryStatus {
    pub state: AsyncQueryState,
    pub query_id: Option<String>,
    pub error_message: Option<String>,
}

impl AsyncQueryStatus {
    pub fn is_running(&self) -> bool {
        self.state == AsyncQueryState::Running
    }

    /// `None` while the query is still running.
    pub fn is_successful(&self) -> Option<bool> {
        match self.state {
            AsyncQueryState::Running => None,
            AsyncQueryState::EndedSuccessfully => Some(true),
            AsyncQueryState::Terminal(_) => Some(false),
        }
    }
}


/// Polls and cancels asynchronous queries through ordinary SQL calls.
pub struct AsyncQueryTracker<'a> {
    executor: &'a mut QueryExecutor,
    cancel: CancellationToken,
}

impl<'a> AsyncQueryTracker<'a> {
    pub fn new(executor: &'a mut QueryExecutor) -> Self {
        Self { executor, cancel: CancellationToken::new() }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn status(&mut self, token: &str) -> Result<AsyncQueryStatus, FireboltError> {
        let sql = format!("CALL fb_GetAsyncStatus({})", token.to_sql_literal());
        let mut cursor = self.executor.execute(&sql, &self.cancel).await?;

        if !cursor.advance().await? {
            return Err(AsyncQueryError::StatusUnavailable(token.to_string()).into());
        }
        let status = optional_text(&cursor, "status")?
            .ok_or_else(|| AsyncQueryError::StatusUnavailable(token.to_string()))?;
        let query_id = optional_text(&cursor, "query_id")?.filter(|id| !id.is_empty());
        let error_message = optional_text(&cursor, "error_message")?.filter(|m| !m.is_empty());
        cursor.close();

        tracing::debug!("Async query '{}' reported status '{}'", token, status);
        Ok(AsyncQueryStatus {
            state: AsyncQueryState::from_status(&status),
            query_id,
            error_message,
        })
    }

    pub async fn is_running(&mut self, token: &str) -> Result<bool, FireboltError> {
        Ok(self.status(token).await?.is_running())
    }

    pub async fn is_successful(&mut self, token: &str) -> Result<Option<bool>, FireboltError> {
        Ok(self.status(token).await?.is_successful())
    }

    /// Cancel the query behind `token`.
    ///
    /// Returns `true` once the cancel statement ran; the server is not asked
    /// again whether the query actually stopped.
    pub async fn cancel(&mut self, token: &str) -> Result<bool, FireboltError> {
        let status = self.status(token).await?;
        let query_id = status
            .query_id
            .ok_or_else(|| AsyncQueryError::MissingQueryId(token.to_string()))?;

        let sql = format!("CANCEL QUERY WHERE query_id = {}", query_id.as_str().to_sql_literal());
        let mut cursor = self.executor.execute(&sql, &self.cancel).await?;
        cursor.close();

        tracing::info!("Cancelled async query '{}'", query_id);
        Ok(true)
    }
}

/// Text of the named column in the current row, if the column exists.
fn optional_text(cursor: &RowCursor, column: &str) -> Result<Option<String>, FireboltError> {
    match cursor.ordinal(column) {
        Ok(ordinal) => cursor.get_string(ordinal),
        Err(_) => Ok(None),
    }
}
