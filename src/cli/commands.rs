use firebolt_driver::query::AsyncQueryState;
use firebolt_driver::{ConnectionSession, RowCursor};

use serde_json::{json, Value};


/// Runs `sql` and collects every row, with the column layout and, on the
/// buffered path, the server's statistics.
pub async fn query(session: &mut ConnectionSession, sql: &str, stream: bool) -> anyhow::Result<Value> {
    tracing::debug!("Running query (streaming: {stream})");
    let mut cursor = if stream {
        session.execute_streaming(sql).await?
    } else {
        session.execute(sql).await?
    };

    let columns = columns(&cursor)?;
    let mut rows = Vec::new();
    while cursor.advance().await? {
        let mut row = Vec::with_capacity(cursor.column_count());
        for ordinal in 0..cursor.column_count() {
            row.push(cursor.get(ordinal)?.map_or(Value::Null, |value| value.to_json()));
        }
        rows.push(Value::Array(row));
    }
    let statistics = cursor.statistics().map(serde_json::to_value).transpose()?;
    cursor.close();

    tracing::info!("Fetched {} row(s)", rows.len());
    Ok(json!({
        "columns": columns,
        "rows": rows,
        "statistics": statistics,
    }))
}

fn columns(cursor: &RowCursor) -> anyhow::Result<Vec<Value>> {
    (0..cursor.column_count())
        .map(|ordinal| -> anyhow::Result<Value> {
            Ok(json!({
                "name": cursor.column_name(ordinal)?,
                "type": cursor.column_type(ordinal)?.to_string(),
            }))
        })
        .collect()
}

pub async fn version(session: &mut ConnectionSession) -> anyhow::Result<Value> {
    let version = session.server_version().await?;
    Ok(json!({ "version": version }))
}

pub async fn submit(session: &mut ConnectionSession, sql: &str) -> anyhow::Result<Value> {
    let token = session.submit_async(sql).await?;
    tracing::info!("Submitted asynchronous query");
    Ok(json!({ "token": token }))
}

pub async fn status(session: &mut ConnectionSession, token: &str) -> anyhow::Result<Value> {
    let status = session.async_queries()?.status(token).await?;
    Ok(json!({
        "token": token,
        "state": state_name(&status.state),
        "running": status.is_running(),
        "successful": status.is_successful(),
        "query_id": status.query_id,
        "error_message": status.error_message,
    }))
}

fn state_name(state: &AsyncQueryState) -> &str {
    match state {
        AsyncQueryState::Running => "RUNNING",
        AsyncQueryState::EndedSuccessfully => "ENDED_SUCCESSFULLY",
        AsyncQueryState::Terminal(status) => status,
    }
}

pub async fn cancel(session: &mut ConnectionSession, token: &str) -> anyhow::Result<Value> {
    let cancelled = session.async_queries()?.cancel(token).await?;
    Ok(json!({ "token": token, "cancelled": cancelled }))
}
