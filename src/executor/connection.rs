use indexmap::IndexMap;
use log::{debug, info};
use rand::Rng;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Instant;

use super::driver::{DriverError, RawHandle};
use crate::sql::builder::{self, Conditions};
use crate::sql::{SqlArgs, SqlError, SqlValue};
use crate::topology::ConnectionDetails;

/// Fraction of queries that get an info-level structured log record.
const QUERY_LOG_SAMPLE_RATE: f64 = 0.01;

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Sql(#[from] SqlError),

    #[error("failed to read SQL script '{0}': {1}")]
    ScriptRead(String, String),

    #[error("select_field() returned {0} rows instead of 1")]
    NotSingleRow(usize),
}

/// Executed statement plus everything the driver reported back.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub query: String,
    pub args: SqlArgs,
    pub affected: u64,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl QueryResult {
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows keyed by column name, in result order.
    pub fn rows_as_dicts(&self) -> Vec<IndexMap<String, SqlValue>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }
}

/// Statement execution surface: `query` is the one required method, the
/// composed SELECT/INSERT/UPDATE/DELETE operations are provided on top.
pub trait SqlClient {
    fn query(&mut self, sql: &str, args: &SqlArgs) -> Result<QueryResult, ConnectionError>;

    fn select(
        &mut self,
        table: &str,
        columns: &str,
        conds: &Conditions,
    ) -> Result<QueryResult, ConnectionError> {
        let stmt = builder::select(table, columns, conds);
        self.query(&stmt.sql, &stmt.args)
    }

    fn select_as_dicts(
        &mut self,
        table: &str,
        columns: &str,
        conds: &Conditions,
    ) -> Result<Vec<IndexMap<String, SqlValue>>, ConnectionError> {
        Ok(self.select(table, columns, conds)?.rows_as_dicts())
    }

    /// Selects exactly one field from exactly one row.
    fn select_field(
        &mut self,
        table: &str,
        column: &str,
        conds: &Conditions,
    ) -> Result<SqlValue, ConnectionError> {
        let result = self.select(table, column, conds)?;
        if result.num_rows() != 1 {
            return Err(ConnectionError::NotSingleRow(result.num_rows()));
        }
        Ok(result.rows[0].first().cloned().unwrap_or(SqlValue::Null))
    }

    fn insert(
        &mut self,
        table: &str,
        data: &Conditions,
        ignore_duplicates: bool,
    ) -> Result<QueryResult, ConnectionError> {
        let stmt = builder::insert(table, data, ignore_duplicates)?;
        self.query(&stmt.sql, &stmt.args)
    }

    fn update(
        &mut self,
        table: &str,
        data: &Conditions,
        conds: &Conditions,
    ) -> Result<QueryResult, ConnectionError> {
        let stmt = builder::update(table, data, conds);
        self.query(&stmt.sql, &stmt.args)
    }

    fn delete(&mut self, table: &str, conds: &Conditions) -> Result<QueryResult, ConnectionError> {
        let stmt = builder::delete(table, conds);
        self.query(&stmt.sql, &stmt.args)
    }
}

/// Thin wrapper around a live driver handle.
#[derive(Debug)]
pub struct Connection<H: RawHandle> {
    raw: H,
    info: Option<ConnectionDetails>,
}

impl<H: RawHandle> Connection<H> {
    pub fn new(raw: H, info: Option<ConnectionDetails>) -> Self {
        Self { raw, info }
    }

    /// Routing metadata this connection was opened with, if any.
    pub fn info(&self) -> Option<&ConnectionDetails> {
        self.info.as_ref()
    }

    pub fn query(&mut self, sql: &str, args: &SqlArgs) -> Result<QueryResult, ConnectionError> {
        self.execute_logged(sql, args)
    }

    fn execute_logged(&mut self, sql: &str, args: &SqlArgs) -> Result<QueryResult, ConnectionError> {
        if args.is_empty() {
            debug!("SQL query: {}", sql);
        } else {
            debug!("SQL query: {} (with args: {:?})", sql, args);
        }

        let started = Instant::now();
        let raw = self.raw.execute(sql, args)?;
        let elapsed = started.elapsed();

        if rand::thread_rng().gen::<f64>() < QUERY_LOG_SAMPLE_RATE {
            let script = env::args().next().unwrap_or_else(|| "interactive?".to_string());
            let target = self
                .info
                .as_ref()
                .map(|info| info.describe())
                .unwrap_or_default();
            info!(
                "SQL {} ({} num_rows={} elapsed_ms={} script={})",
                sql,
                target,
                raw.affected,
                elapsed.as_millis(),
                script
            );
        }

        Ok(QueryResult {
            query: sql.to_string(),
            args: args.clone(),
            affected: raw.affected,
            columns: raw.columns,
            rows: raw.rows,
        })
    }

    /// Executes a SQL script statement by statement: lines accumulate until
    /// one ends with `;`, blank lines and `--` comments are skipped, and a
    /// trailing unterminated statement still runs. Commits once at the end.
    ///
    /// With `ignore_duplicates` set, driver errors on the "already exists"
    /// whitelist are swallowed; everything else propagates.
    pub fn exec_sql_script(
        &mut self,
        path: &Path,
        ignore_duplicates: bool,
    ) -> Result<(), ConnectionError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConnectionError::ScriptRead(path.display().to_string(), e.to_string()))?;
        debug!("SQL script: {}", path.display());

        let mut statement = String::new();
        for line in content.lines() {
            let stripped = line.trim();
            if stripped.is_empty() || stripped.starts_with("--") {
                continue;
            }
            statement.push_str(line);
            statement.push('\n');
            if stripped.ends_with(';') {
                self.exec_script_statement(&statement, ignore_duplicates)?;
                statement.clear();
            }
        }
        if !statement.trim().is_empty() {
            self.exec_script_statement(&statement, ignore_duplicates)?;
        }

        self.commit()
    }

    /// Hands the whole script to the driver as one execute, then commits.
    pub fn exec_sql_script_at_once(&mut self, path: &Path) -> Result<(), ConnectionError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConnectionError::ScriptRead(path.display().to_string(), e.to_string()))?;
        self.raw.execute(&content, &SqlArgs::new())?;
        self.commit()
    }

    fn exec_script_statement(
        &mut self,
        statement: &str,
        ignore_duplicates: bool,
    ) -> Result<(), ConnectionError> {
        debug!("SQL statement: {}", statement.trim());
        match self.raw.execute(statement, &SqlArgs::new()) {
            Ok(_) => Ok(()),
            Err(e) if ignore_duplicates && e.is_duplicate_object() => {
                debug!("ignoring duplicate-object error: {}", e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn last_insert_id(&mut self) -> Result<u64, ConnectionError> {
        Ok(self.raw.last_insert_id()?)
    }

    pub fn commit(&mut self) -> Result<(), ConnectionError> {
        Ok(self.raw.commit()?)
    }

    pub fn close(&mut self) -> Result<(), ConnectionError> {
        Ok(self.raw.close()?)
    }
}

impl<H: RawHandle> SqlClient for Connection<H> {
    fn query(&mut self, sql: &str, args: &SqlArgs) -> Result<QueryResult, ConnectionError> {
        self.execute_logged(sql, args)
    }
}
