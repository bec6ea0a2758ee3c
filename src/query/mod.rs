mod async_tracker;
mod builder;
mod executor;
mod literal;

pub use async_tracker::{AsyncQueryState, AsyncQueryStatus, AsyncQueryTracker};
pub use builder::QueryBuilder;
pub use executor::{parse_set_directive, OutputFormat, QueryExecutor, SessionParameters};
pub use literal::{quote_identifier, substitute, ToSqlLiteral};
