use super::stream::StreamingProtocol;
use super::table::{ColumnDescriptor, ResultTable, Row, Statistics};
use crate::error::{FireboltError, FireboltErrorKind};
use crate::types::{self, Decimal, FromNative, NativeValue, TypeDescriptor};

use chrono::{NaiveDate, NaiveDateTime};


enum Backend {
    Table { table: ResultTable, current: Option<usize>, next: usize },
    Stream(StreamingProtocol),
}

/// Forward-only cursor over a query result.
///
/// The backend is picked once, from the shape of the server response, and
/// never changes. A cursor is not meant to be shared between tasks; using it
/// after [`close`](Self::close) panics.
pub struct RowCursor {
    backend: Backend,
    closed: bool,
}

impl std::fmt::Debug for RowCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match &self.backend {
            Backend::Table { .. } => "buffered",
            Backend::Stream(_) => "streaming",
        };
        f.debug_struct("RowCursor")
            .field("backend", &backend)
            .field("columns", &self.columns())
            .field("closed", &self.closed)
            .finish()
    }
}

impl RowCursor {
    pub fn buffered(table: ResultTable) -> Self {
        Self {
            backend: Backend::Table { table, current: None, next: 0 },
            closed: false,
        }
    }

    pub fn streaming(protocol: StreamingProtocol) -> Self {
        Self { backend: Backend::Stream(protocol), closed: false }
    }

    /// A cursor with no columns and no rows.
    pub fn empty() -> Self {
        Self::buffered(ResultTable::empty())
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.backend, Backend::Stream(_))
    }

    fn ensure_open(&self) {
        assert!(!self.closed, "RowCursor used after close");
    }

    /// Move to the next row, returning `false` once the rows are exhausted.
    pub async fn advance(&mut self) -> Result<bool, FireboltError> {
        self.ensure_open();
        match &mut self.backend {
            Backend::Table { table, current, next } => {
                if *next < table.row_count() {
                    *current = Some(*next);
                    *next += 1;
                    Ok(true)
                } else {
                    *current = None;
                    Ok(false)
                }
            },
            Backend::Stream(protocol) => protocol.advance().await,
        }
    }

    fn columns(&self) -> &[ColumnDescriptor] {
        match &self.backend {
            Backend::Table { table, .. } => table.columns(),
            Backend::Stream(protocol) => protocol.columns(),
        }
    }

    fn types(&self) -> &[TypeDescriptor] {
        match &self.backend {
            Backend::Table { table, .. } => table.column_types(),
            Backend::Stream(protocol) => protocol.column_types(),
        }
    }

    fn current_row(&self) -> Option<&Row> {
        match &self.backend {
            Backend::Table { table, current, .. } => current.map(|index| &table.rows()[index]),
            Backend::Stream(protocol) => protocol.current(),
        }
    }

    fn check_ordinal(&self, ordinal: usize) -> Result<(), FireboltError> {
        let column_count = self.columns().len();
        if ordinal >= column_count {
            return Err(FireboltErrorKind::Index { ordinal, column_count }.into());
        }
        Ok(())
    }

    pub fn column_count(&self) -> usize {
        self.ensure_open();
        self.columns().len()
    }

    pub fn column_name(&self, ordinal: usize) -> Result<&str, FireboltError> {
        self.ensure_open();
        self.check_ordinal(ordinal)?;
        Ok(&self.columns()[ordinal].name)
    }

    pub fn column_type(&self, ordinal: usize) -> Result<&TypeDescriptor, FireboltError> {
        self.ensure_open();
        self.check_ordinal(ordinal)?;
        Ok(&self.types()[ordinal])
    }

    /// Ordinal of the first column named `name`, ignoring case.
    pub fn ordinal(&self, name: &str) -> Result<usize, FireboltError> {
        self.ensure_open();
        self.columns()
            .iter()
            .position(|column| column.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| FireboltErrorKind::UnknownColumn(name.to_string()).into())
    }

    pub fn has_rows(&self) -> bool {
        self.ensure_open();
        match &self.backend {
            Backend::Table { table, .. } => !table.is_empty(),
            Backend::Stream(protocol) => protocol.has_rows(),
        }
    }

    /// Raw text of a cell in the current row.
    pub fn get_raw(&self, ordinal: usize) -> Result<Option<&str>, FireboltError> {
        self.ensure_open();
        self.check_ordinal(ordinal)?;
        let row = self
            .current_row()
            .ok_or(FireboltErrorKind::State("cursor is not positioned on a row"))?;
        Ok(row[ordinal].as_deref())
    }

    /// Typed value of a cell in the current row.
    pub fn get(&self, ordinal: usize) -> Result<Option<NativeValue>, FireboltError> {
        let raw = self.get_raw(ordinal)?;
        Ok(types::coerce(raw, &self.types()[ordinal])?)
    }

    pub fn is_null(&self, ordinal: usize) -> Result<bool, FireboltError> {
        Ok(self.get_raw(ordinal)?.is_none())
    }

    /// Read a cell and cast it to `T`.
    pub fn get_as<T: FromNative>(&self, ordinal: usize) -> Result<Option<T>, FireboltError> {
        match self.get(ordinal)? {
            Some(value) => Ok(Some(T::from_native(value)?)),
            None => Ok(None),
        }
    }

    pub fn get_bool(&self, ordinal: usize) -> Result<Option<bool>, FireboltError> {
        self.get_as(ordinal)
    }

    pub fn get_i8(&self, ordinal: usize) -> Result<Option<i8>, FireboltError> {
        self.get_as(ordinal)
    }

    pub fn get_i16(&self, ordinal: usize) -> Result<Option<i16>, FireboltError> {
        self.get_as(ordinal)
    }

    pub fn get_i32(&self, ordinal: usize) -> Result<Option<i32>, FireboltError> {
        self.get_as(ordinal)
    }

    pub fn get_i64(&self, ordinal: usize) -> Result<Option<i64>, FireboltError> {
        self.get_as(ordinal)
    }

    pub fn get_f32(&self, ordinal: usize) -> Result<Option<f32>, FireboltError> {
        self.get_as(ordinal)
    }

    pub fn get_f64(&self, ordinal: usize) -> Result<Option<f64>, FireboltError> {
        self.get_as(ordinal)
    }

    pub fn get_decimal(&self, ordinal: usize) -> Result<Option<Decimal>, FireboltError> {
        self.get_as(ordinal)
    }

    pub fn get_string(&self, ordinal: usize) -> Result<Option<String>, FireboltError> {
        self.get_as(ordinal)
    }

    pub fn get_date(&self, ordinal: usize) -> Result<Option<NaiveDate>, FireboltError> {
        self.get_as(ordinal)
    }

    pub fn get_datetime(&self, ordinal: usize) -> Result<Option<NaiveDateTime>, FireboltError> {
        self.get_as(ordinal)
    }

    pub fn statistics(&self) -> Option<&Statistics> {
        self.ensure_open();
        match &self.backend {
            Backend::Table { table, .. } => table.statistics(),
            Backend::Stream(protocol) => protocol.statistics(),
        }
    }

    /// Random-access view of one column. Buffered results only.
    pub fn column(&self, ordinal: usize) -> Result<ColumnProjection<'_>, FireboltError> {
        self.ensure_open();
        self.check_ordinal(ordinal)?;
        match &self.backend {
            Backend::Table { table, .. } => Ok(ColumnProjection { table, ordinal }),
            Backend::Stream(_) => Err(FireboltErrorKind::UnsupportedOperation(
                "column projection on a streaming result",
            ).into()),
        }
    }

    /// Release the result. Safe to call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        if let Backend::Stream(protocol) = &mut self.backend {
            protocol.close();
        }
        self.closed = true;
    }
}


/// One column of a buffered result, addressable by row index.
#[derive(Clone, Copy, Debug)]
pub struct ColumnProjection<'a> {
    table: &'a ResultTable,
    ordinal: usize,
}

impl<'a> ColumnProjection<'a> {
    pub fn len(&self) -> usize {
        self.table.row_count()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn column_type(&self) -> &'a TypeDescriptor {
        &self.table.column_types()[self.ordinal]
    }

    pub fn get_raw(&self, row: usize) -> Result<Option<&'a str>, FireboltError> {
        let cells = self
            .table
            .rows()
            .get(row)
            .ok_or(FireboltErrorKind::State("row index is out of range"))?;
        Ok(cells[self.ordinal].as_deref())
    }

    pub fn get(&self, row: usize) -> Result<Option<NativeValue>, FireboltError> {
        let raw = self.get_raw(row)?;
        Ok(types::coerce(raw, self.column_type())?)
    }
}
