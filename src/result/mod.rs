//! Query results: the buffered table, the streaming protocol and the cursor
//! that hides which of the two produced the rows.

mod cursor;
mod stream;
mod table;

pub use cursor::{ColumnProjection, RowCursor};
pub use stream::{StreamState, StreamingFrame, StreamingProtocol};
pub use table::{ColumnDescriptor, ResultTable, Row, Statistics};
