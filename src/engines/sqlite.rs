//! SQLite FTS5 engine implementation
//!
//! The relational engine. Ranks matches with the FTS5 `rank` column (bm25)
//! and cuts the result window with `ROW_NUMBER()`, so pagination means the
//! same thing here as it does for the inverted-index engines.

use super::traits::*;
use crate::config::{EngineConfig, EngineKind};
use crate::search::{SearchError, SearchRequest, SearchResult};
use anyhow::{anyhow, bail, Result as AnyhowResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, InterruptHandle, OpenFlags};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// SQLite full-text search engine over one FTS5 table
pub struct SqliteFts {
    name: String,
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
    window_sql: Arc<str>,
    count_sql: Arc<str>,
    fields: Vec<String>,
    timeout: Duration,
}

impl SqliteFts {
    /// Open the database read-only
    pub fn open(config: &EngineConfig, timeout: Duration) -> AnyhowResult<Self> {
        let path = config
            .path
            .as_deref()
            .ok_or_else(|| anyhow!("engine {} has no database path", config.name))?;
        let conn = open_read_only(path)?;
        Self::from_connection(config, conn, timeout)
    }

    /// Wrap an already open connection
    pub fn from_connection(
        config: &EngineConfig,
        conn: Connection,
        timeout: Duration,
    ) -> AnyhowResult<Self> {
        let table = identifier(&config.index)?;
        let id = identifier(&config.id_field)?;
        let unit = identifier(&config.unit_field)?;
        let fields = config
            .fields
            .iter()
            .map(|f| identifier(f).map(str::to_string))
            .collect::<AnyhowResult<Vec<_>>>()?;

        conn.busy_timeout(timeout)?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE name = ?1)",
            params![table],
            |row| row.get(0),
        )?;
        if !exists {
            bail!("engine {}: table {} does not exist", config.name, table);
        }

        let window_sql = format!(
            r#"WITH matches AS (
                   SELECT "{id}" AS doc_id, rank AS score
                   FROM "{table}"
                   WHERE "{table}" MATCH ?1 AND (?2 IS NULL OR "{unit}" = ?2)
               ),
               ranked AS (
                   SELECT doc_id, ROW_NUMBER() OVER (ORDER BY score, doc_id) AS rn
                   FROM matches
               )
               SELECT doc_id FROM ranked WHERE rn > ?3 AND rn <= ?4 ORDER BY rn"#
        );
        let count_sql = format!(
            r#"SELECT COUNT(*) FROM "{table}"
               WHERE "{table}" MATCH ?1 AND (?2 IS NULL OR "{unit}" = ?2)"#
        );

        Ok(Self {
            name: config.name.clone(),
            interrupt: Arc::new(conn.get_interrupt_handle()),
            conn: Arc::new(Mutex::new(conn)),
            window_sql: window_sql.into(),
            count_sql: count_sql.into(),
            fields,
            timeout,
        })
    }

    /// Turn free text into an FTS5 expression that matches every term.
    ///
    /// Each term becomes an FTS5 string, so operators and punctuation in user
    /// input are searched for literally instead of parsed.
    fn match_expression(&self, query: &str) -> String {
        let terms = query
            .split_whitespace()
            .filter(|t| t.chars().any(char::is_alphanumeric))
            .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(" ");

        if self.fields.is_empty() || terms.is_empty() {
            terms
        } else {
            format!("{{{}}} : ({})", self.fields.join(" "), terms)
        }
    }
}

fn open_read_only(path: &Path) -> AnyhowResult<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
        | OpenFlags::SQLITE_OPEN_NO_MUTEX
        | OpenFlags::SQLITE_OPEN_URI;
    Ok(Connection::open_with_flags(path, flags)?)
}

/// Table and column names are spliced into SQL, so only plain identifiers pass
fn identifier(name: &str) -> AnyhowResult<&str> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(anyhow!("invalid SQL identifier: {:?}", name))
    }
}

/// Classify a rusqlite failure into the canonical taxonomy
fn map_sqlite_error(err: rusqlite::Error, timeout: Duration) -> SearchError {
    match err {
        rusqlite::Error::SqliteFailure(e, msg) => {
            let msg = msg.unwrap_or_default();
            match e.code {
                ErrorCode::OperationInterrupted => SearchError::BackendTimeout(timeout),
                ErrorCode::Unknown if msg.contains("fts5") => {
                    SearchError::InvalidQuery("full-text expression rejected".to_string())
                }
                ErrorCode::Unknown if msg.contains("no such") => {
                    SearchError::BackendUnavailable("search table is missing".to_string())
                }
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                    SearchError::BackendUnavailable("database is busy".to_string())
                }
                code => SearchError::BackendUnavailable(format!("database failure ({:?})", code)),
            }
        }
        rusqlite::Error::InvalidColumnType(..)
        | rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::InvalidColumnIndex(_)
        | rusqlite::Error::InvalidColumnName(_) => {
            SearchError::MappingError("identifier column has an unexpected type".to_string())
        }
        other => SearchError::BackendUnavailable(format!("database failure: {}", other)),
    }
}

fn interrupted() -> rusqlite::Error {
    rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_INTERRUPT),
        None,
    )
}

/// Read one result window and the total match count.
///
/// `abandoned` is checked before each statement: an interrupt only reaches
/// a statement that is already running.
fn run_window(
    conn: &Connection,
    abandoned: &AtomicBool,
    window_sql: &str,
    count_sql: &str,
    expression: &str,
    unit_no: Option<&str>,
    from: u64,
    end: u64,
) -> rusqlite::Result<EngineResults> {
    if abandoned.load(Ordering::Acquire) {
        return Err(interrupted());
    }
    let total: i64 = conn
        .prepare_cached(count_sql)?
        .query_row(params![expression, unit_no], |row| row.get(0))?;

    if abandoned.load(Ordering::Acquire) {
        return Err(interrupted());
    }
    let mut stmt = conn.prepare_cached(window_sql)?;
    let ids = stmt
        .query_map(params![expression, unit_no, from as i64, end as i64], |row| {
            row.get::<_, rusqlite::types::Value>(0)
        })?
        .map(|value| match value? {
            rusqlite::types::Value::Text(s) => Ok(s),
            rusqlite::types::Value::Integer(i) => Ok(i.to_string()),
            other => Err(rusqlite::Error::InvalidColumnType(
                0,
                "doc_id".to_string(),
                other.data_type(),
            )),
        })
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(EngineResults::new(total.max(0) as u64, ids))
}

#[async_trait]
impl Engine for SqliteFts {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Sqlite
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, request: &SearchRequest) -> Result<SearchResult, SearchError> {
        let conn = self.conn.clone();
        let window_sql = self.window_sql.clone();
        let count_sql = self.count_sql.clone();
        let expression = self.match_expression(request.query());
        if expression.is_empty() {
            return Err(SearchError::InvalidQuery(
                "query has no searchable terms".to_string(),
            ));
        }
        let unit_no = request.unit_no().map(str::to_string);
        let from = u64::from(request.from());
        let end = request.end();
        let timeout = self.timeout;

        // Set when the caller gave up, so no further statement is started
        let abandoned = Arc::new(AtomicBool::new(false));
        let abandoned_in_task = abandoned.clone();

        let start = Instant::now();
        let mut task = tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| SearchError::BackendUnavailable("connection is poisoned".to_string()))?;
            run_window(
                &conn,
                &abandoned_in_task,
                &window_sql,
                &count_sql,
                &expression,
                unit_no.as_deref(),
                from,
                end,
            )
            .map_err(|e| map_sqlite_error(e, timeout))
        });

        let results = match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(Ok(results))) => results,
            Ok(Ok(Err(e))) => {
                warn!("Query failed for {}: {}", self.name, e);
                return Err(e);
            }
            Ok(Err(e)) => {
                warn!("Query task failed for {}: {}", self.name, e);
                return Err(SearchError::BackendUnavailable("query task failed".to_string()));
            }
            Err(_) => {
                abandoned.store(true, Ordering::Release);
                self.interrupt.interrupt();
                // Wait for the statement to unwind so the connection is free
                // before the next call starts
                let _ = task.await;
                warn!("Timeout for engine {}", self.name);
                return Err(SearchError::BackendTimeout(timeout));
            }
        };
        let elapsed = start.elapsed();

        debug!(
            "Engine {} returned {} of {} hits in {:?}",
            self.name,
            results.ids.len(),
            results.total,
            elapsed
        );

        Ok(results.into_result(elapsed, request))
    }
}
