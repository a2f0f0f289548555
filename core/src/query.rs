//! SQL query path
//!
//! SQL never goes through an interpreter plugin. The query is handed to a
//! [`QueryRunner`] and the result is rendered in the table view instead of the
//! terminal. Query runs produce no snapshot.

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Batch, Connection, Statement};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::types::QueryResult;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Dataset location is not supported: {0}")]
    UnsupportedDataset(String),

    #[error("Could not load dataset {path}: {source}")]
    Dataset {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Query is empty")]
    Empty,

    #[error("Only one statement can be run at a time")]
    MultipleStatements,

    #[error("{0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Query task failed: {0}")]
    Task(String),
}

#[async_trait]
pub trait QueryRunner: Send + Sync {
    /// Run `query` against the dataset named by `data_url`, or an empty
    /// database when there is none.
    async fn run_query(&self, query: &str, data_url: Option<&str>)
        -> Result<QueryResult, QueryError>;
}

/* ===================== SQLite ===================== */

/// Runs each query on a private copy of its dataset, so learners can modify
/// tables freely without affecting the next run.
#[derive(Debug, Clone, Default)]
pub struct SqliteQueryRunner;

impl SqliteQueryRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl QueryRunner for SqliteQueryRunner {
    async fn run_query(
        &self,
        query: &str,
        data_url: Option<&str>,
    ) -> Result<QueryResult, QueryError> {
        let query = query.to_string();
        let data_url = data_url.map(str::to_string);
        tokio::task::spawn_blocking(move || run_blocking(&query, data_url.as_deref()))
            .await
            .map_err(|e| QueryError::Task(e.to_string()))?
    }
}

/// Local path for a dataset location. Only plain paths and `file://` URLs
/// are accepted.
fn dataset_path(data_url: &str) -> Result<PathBuf, QueryError> {
    if let Some(path) = data_url.strip_prefix("file://") {
        return Ok(PathBuf::from(path));
    }
    if data_url.contains("://") {
        return Err(QueryError::UnsupportedDataset(data_url.to_string()));
    }
    Ok(PathBuf::from(data_url))
}

fn open_copy(source: &Path) -> Result<(Connection, NamedTempFile), QueryError> {
    let dataset_err = |source_err: std::io::Error| QueryError::Dataset {
        path: source.display().to_string(),
        source: source_err,
    };
    let copy = NamedTempFile::new().map_err(dataset_err)?;
    std::fs::copy(source, copy.path()).map_err(dataset_err)?;
    let conn = Connection::open(copy.path())?;
    Ok((conn, copy))
}

fn run_blocking(query: &str, data_url: Option<&str>) -> Result<QueryResult, QueryError> {
    let (conn, _copy) = match data_url.filter(|u| !u.is_empty()) {
        Some(url) => {
            let path = dataset_path(url)?;
            debug!(path = %path.display(), "opening dataset copy");
            let (conn, copy) = open_copy(&path)?;
            (conn, Some(copy))
        }
        None => (Connection::open_in_memory()?, None),
    };

    let mut batch = Batch::new(&conn, query);
    let mut statement = batch.next()?.ok_or(QueryError::Empty)?;
    if batch.next()?.is_some() {
        return Err(QueryError::MultipleStatements);
    }
    execute_statement(&mut statement)
}

fn execute_statement(statement: &mut Statement<'_>) -> Result<QueryResult, QueryError> {
    if statement.column_count() == 0 {
        let changes = statement.execute([])?;
        debug!(changes, "statement executed");
        return Ok(QueryResult {
            changes,
            ..Default::default()
        });
    }

    let column_names: Vec<String> = statement
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let width = column_names.len();

    let mut rows = Vec::new();
    let mut cursor = statement.query([])?;
    while let Some(row) = cursor.next()? {
        let mut cells = Vec::with_capacity(width);
        for idx in 0..width {
            cells.push(render_value(row.get_ref(idx)?));
        }
        rows.push(cells);
    }

    Ok(QueryResult {
        rows,
        column_names,
        changes: 0,
    })
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        ValueRef::Blob(bytes) => format!("<blob {} bytes>", bytes.len()),
    }
}
