use crate::error::{FireboltError, FireboltErrorKind};
use crate::types::{self, grammar, TypeDescriptor};

use serde::{Deserialize, Serialize};


/// Name and wire type of one result column.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub wire_type: String,
}

impl ColumnDescriptor {
    pub fn new(name: &str, wire_type: &str) -> Self {
        Self { name: name.to_string(), wire_type: wire_type.to_string() }
    }
}

/// Raw cells of one row; `None` is a server-side null.
pub type Row = Vec<Option<String>>;

/// Query statistics attached to a result, when the server sends them.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Statistics {
    #[serde(default)]
    pub elapsed: Option<f64>,
    #[serde(default)]
    pub rows_read: Option<u64>,
    #[serde(default)]
    pub bytes_read: Option<u64>,
    #[serde(default)]
    pub time_before_execution: Option<f64>,
    #[serde(default)]
    pub time_to_execute: Option<f64>,
    #[serde(default)]
    pub scanned_bytes_cache: Option<u64>,
    #[serde(default)]
    pub scanned_bytes_storage: Option<u64>,
}

/// Shape of a buffered (`JSON_Compact`) response body.
#[derive(Debug, Deserialize)]
struct BufferedResponse {
    #[serde(default)]
    meta: Vec<ColumnDescriptor>,
    #[serde(default)]
    data: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    statistics: Option<Statistics>,
}


/// Rows and columns of a fully buffered result.
#[derive(Clone, Debug, Default)]
pub struct ResultTable {
    columns: Vec<ColumnDescriptor>,
    types: Vec<TypeDescriptor>,
    rows: Vec<Row>,
    statistics: Option<Statistics>,
}

impl ResultTable {
    /// Build a table, parsing every column type up front.
    pub fn new(
        columns: Vec<ColumnDescriptor>,
        rows: Vec<Row>,
        statistics: Option<Statistics>,
    ) -> Result<Self, FireboltError> {
        let types = parse_column_types(&columns)?;
        if let Some((index, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != columns.len()) {
            return Err(FireboltErrorKind::Deserialization(format!(
                "row {index} has {} cell(s), expected {}",
                row.len(),
                columns.len()
            )).into());
        }

        Ok(Self { columns, types, rows, statistics })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Decode a buffered response body. An empty body is an empty result.
    pub fn from_bytes(body: &[u8]) -> Result<Self, FireboltError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::empty());
        }

        let response: BufferedResponse = serde_json::from_slice(body)?;
        let rows = response
            .data
            .iter()
            .map(|row| row.iter().map(types::cell_text).collect())
            .collect();

        Self::new(response.meta, rows, response.statistics)
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column_types(&self) -> &[TypeDescriptor] {
        &self.types
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn statistics(&self) -> Option<&Statistics> {
        self.statistics.as_ref()
    }
}

pub(crate) fn parse_column_types(
    columns: &[ColumnDescriptor],
) -> Result<Vec<TypeDescriptor>, FireboltError> {
    columns
        .iter()
        .map(|column| grammar::parse(&column.wire_type).map_err(FireboltError::from))
        .collect()
}
