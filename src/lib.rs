/*!
# firebolt-driver

<b>An async Rust client driver for the Firebolt cloud SQL data warehouse.</b>

This crate turns a set of credentials into an authenticated session against a
Firebolt engine, sends SQL over HTTP and hands the answer back as typed,
cursor-addressable rows, whether the server replied with one buffered JSON
document or a line-framed stream.

## ✨ Features

- 🔐 **Service-account and email logins**, with the protocol picked from the principal;
- 🧭 **Engine resolution** through the system engine, with a process-wide account cache;
- 🪶 **Async execution** on `tokio`, cancellable with a `CancellationToken`;
- 🧩 **Parameterized queries** through [`ToSqlLiteral`];
- 🌊 **Streaming results** read one frame at a time;
- ⏱️ **Server-side async queries**, submitted, polled and cancelled.

## Getting Started

```no_run
use firebolt_driver::{ConnectionSession, SessionSettings};

# #[tokio::main]
# async fn main() -> Result<(), Box<dyn std::error::Error>> {
let settings = SessionSettings::new("client-id", "client-secret")
    .with_account("my-account")
    .with_engine("my-engine")
    .with_database("analytics");

let mut session = ConnectionSession::new(settings)?;
session.open().await?;

let mut cursor = session
    .query("SELECT id, name FROM users WHERE id > ?")
    .bind(100)
    .execute()
    .await?;

while cursor.advance().await? {
    let id: Option<i64> = cursor.get_i64(0)?;
    let name: Option<String> = cursor.get_string(1)?;
    println!("{id:?} {name:?}");
}
# Ok(())
# }
```

## 🧠 Concepts

- <b>[`ConnectionSession`]</b>: opens, closes and reconnects a session; the entry point.
- <b>[`SessionResolver`](crate::session::SessionResolver)</b>: login, account and engine lookup.
- <b>[`QueryExecutor`](crate::query::QueryExecutor)</b>: sends SQL and applies server-directed session changes.
- <b>[`RowCursor`]</b>: forward-only access to rows, buffered or streamed.
- <b>[`AsyncQueryTracker`](crate::query::AsyncQueryTracker)</b>: status and cancellation of async queries.

## Disclaimer:

This project is not affiliated with, endorsed by, or sponsored by Firebolt Analytics.
*/

pub mod error;
pub mod query;
pub mod result;
pub mod session;
pub mod transport;
pub mod types;

pub use error::{AsyncQueryError, ErrorDetail, FireboltError, FireboltErrorKind, ServerError, StreamProtocolError};
pub use query::{AsyncQueryTracker, QueryBuilder, ToSqlLiteral};
pub use result::{ResultTable, RowCursor, StreamingProtocol};
pub use session::{ConnectionSession, ConnectionState, SessionError, SessionSettings};
pub use types::{NativeValue, TypeDescriptor};

#[cfg(test)]
mod test_utils;
