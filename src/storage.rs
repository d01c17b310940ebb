//! Storage collaborator: statement rendering per dialect and execution.

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use sea_query::{PostgresQueryBuilder, SelectStatement, SqliteQueryBuilder, Value, Values};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::StorageError;

/// SQL dialect a compiled statement is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    #[default]
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Renders the statement with values inlined. Meant for display only.
    pub fn render(self, statement: &SelectStatement) -> String {
        match self {
            Dialect::Postgres => statement.to_string(PostgresQueryBuilder),
            Dialect::Sqlite => statement.to_string(SqliteQueryBuilder),
        }
    }

    /// Builds the statement with placeholders and the bound values.
    pub fn build(self, statement: &SelectStatement) -> (String, Values) {
        match self {
            Dialect::Postgres => statement.build(PostgresQueryBuilder),
            Dialect::Sqlite => statement.build(SqliteQueryBuilder),
        }
    }
}

/// One column of one fetched row.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Cell {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Integer(v) => Some(*v),
            Cell::Real(v) => Some(*v as i64),
            Cell::Text(s) => s.parse().ok(),
            Cell::Null => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Integer(v) => Some(*v as f64),
            Cell::Real(v) => Some(*v),
            Cell::Text(s) => s.parse().ok(),
            Cell::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }
}

/// Executes statements produced by the engine.
pub trait Storage {
    fn dialect(&self) -> Dialect;

    fn fetch_rows(&self, statement: &SelectStatement) -> Result<Vec<Vec<Cell>>, StorageError>;
}

/// SQLite-backed storage, used by the console and the test suite.
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Ok(Self::new(Connection::open_in_memory()?))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Runs schema or fixture scripts.
    pub fn execute_batch(&self, sql: &str) -> Result<(), StorageError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}

impl Storage for SqliteStorage {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn fetch_rows(&self, statement: &SelectStatement) -> Result<Vec<Vec<Cell>>, StorageError> {
        let (sql, values) = Dialect::Sqlite.build(statement);
        debug!(sql = %sql, params = values.0.len(), "executing statement");

        let params = values
            .0
            .into_iter()
            .map(bind_value)
            .collect::<Result<Vec<_>, _>>()?;

        let run = || -> Result<Vec<Vec<Cell>>, StorageError> {
            let mut stmt = self.conn.prepare(&sql)?;
            let width = stmt.column_count();
            let mut rows = stmt.query(params_from_iter(params.iter()))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut cells = Vec::with_capacity(width);
                for idx in 0..width {
                    cells.push(read_cell(row.get_ref(idx)?, idx)?);
                }
                out.push(cells);
            }
            Ok(out)
        };

        run().inspect_err(|e| {
            error!(sql = %sql, error = %e, "storage rejected statement");
        })
    }
}

fn bind_value(value: Value) -> Result<SqlValue, StorageError> {
    let bound = match value {
        Value::Bool(v) => v.map_or(SqlValue::Null, |b| SqlValue::Integer(b as i64)),
        Value::TinyInt(v) => v.map_or(SqlValue::Null, |n| SqlValue::Integer(n.into())),
        Value::SmallInt(v) => v.map_or(SqlValue::Null, |n| SqlValue::Integer(n.into())),
        Value::Int(v) => v.map_or(SqlValue::Null, |n| SqlValue::Integer(n.into())),
        Value::BigInt(v) => v.map_or(SqlValue::Null, SqlValue::Integer),
        Value::TinyUnsigned(v) => v.map_or(SqlValue::Null, |n| SqlValue::Integer(n.into())),
        Value::SmallUnsigned(v) => v.map_or(SqlValue::Null, |n| SqlValue::Integer(n.into())),
        Value::Unsigned(v) => v.map_or(SqlValue::Null, |n| SqlValue::Integer(n.into())),
        Value::BigUnsigned(v) => match v {
            Some(n) => SqlValue::Integer(i64::try_from(n).unwrap_or(i64::MAX)),
            None => SqlValue::Null,
        },
        Value::Float(v) => v.map_or(SqlValue::Null, |n| SqlValue::Real(n.into())),
        Value::Double(v) => v.map_or(SqlValue::Null, SqlValue::Real),
        Value::String(v) => v.map_or(SqlValue::Null, |s| SqlValue::Text(*s)),
        Value::Char(v) => v.map_or(SqlValue::Null, |c| SqlValue::Text(c.to_string())),
        Value::Bytes(v) => v.map_or(SqlValue::Null, |b| SqlValue::Blob(*b)),
        Value::ChronoDate(v) => v.map_or(SqlValue::Null, |d| {
            SqlValue::Text(d.format("%Y-%m-%d").to_string())
        }),
        Value::ChronoDateTime(v) => v.map_or(SqlValue::Null, |dt| {
            SqlValue::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string())
        }),
        other => return Err(StorageError::UnsupportedValue(format!("{other:?}"))),
    };
    Ok(bound)
}

fn read_cell(value: ValueRef<'_>, column: usize) -> Result<Cell, StorageError> {
    match value {
        ValueRef::Null => Ok(Cell::Null),
        ValueRef::Integer(n) => Ok(Cell::Integer(n)),
        ValueRef::Real(f) => Ok(Cell::Real(f)),
        ValueRef::Text(bytes) => Ok(Cell::Text(String::from_utf8_lossy(bytes).into_owned())),
        ValueRef::Blob(_) => Err(StorageError::Decode {
            column,
            found: "blob".to_string(),
        }),
    }
}
