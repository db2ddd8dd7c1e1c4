//! Database session seam
//!
//! The monitor only needs "open a session with these parameters" and
//! "run a parameterized statement and give me text rows". Every statement
//! the monitor issues casts its output columns to `text`, so a row is an
//! ordered list of nullable strings with typed accessors on top.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_postgres::types::ToSql;
use tokio_postgres::NoTls;
use tracing::debug;

use super::params::NodeConnectionParams;

/// Connection-level failures
#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Query failed: {0}")]
    Query(String),
    #[error("Row decode failed: {0}")]
    Decode(String),
    #[error("Statement timed out after {0:?}")]
    Timeout(Duration),
    #[error("Connection closed")]
    Closed,
}

impl ConnectionError {
    /// Whether the session should be dropped and re-established
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Timeout(_) | Self::Closed)
    }
}

/// Failure to read a required column
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("Missing column '{0}'")]
    MissingColumn(String),
    #[error("Column '{0}' is NULL")]
    Null(String),
    #[error("Column '{column}' has unparsable value '{value}'")]
    Parse { column: String, value: String },
}

/// One result row: column name to nullable text value, in select order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    columns: Vec<(String, Option<String>)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: Option<&str>) -> Self {
        self.columns
            .push((column.into(), value.map(str::to_string)));
        self
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Value of a column, `None` when missing or NULL
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .and_then(|(_, value)| value.as_deref())
    }

    pub fn get_str(&self, column: &str) -> Result<&str, RowError> {
        let (_, value) = self
            .columns
            .iter()
            .find(|(name, _)| name == column)
            .ok_or_else(|| RowError::MissingColumn(column.to_string()))?;
        value
            .as_deref()
            .ok_or_else(|| RowError::Null(column.to_string()))
    }

    pub fn get_i64(&self, column: &str) -> Result<i64, RowError> {
        let value = self.get_str(column)?;
        value.trim().parse().map_err(|_| RowError::Parse {
            column: column.to_string(),
            value: value.to_string(),
        })
    }

    pub fn get_f64(&self, column: &str) -> Result<f64, RowError> {
        let value = self.get_str(column)?;
        value.trim().parse().map_err(|_| RowError::Parse {
            column: column.to_string(),
            value: value.to_string(),
        })
    }

    /// Accepts PostgreSQL boolean text forms
    pub fn get_bool(&self, column: &str) -> Result<bool, RowError> {
        let value = self.get_str(column)?;
        match value.trim().to_ascii_lowercase().as_str() {
            "t" | "true" | "on" | "yes" | "1" => Ok(true),
            "f" | "false" | "off" | "no" | "0" => Ok(false),
            _ => Err(RowError::Parse {
                column: column.to_string(),
                value: value.to_string(),
            }),
        }
    }
}

/// An open database session owned by one node handle
#[async_trait]
pub trait Session: Send {
    /// Run a statement with text parameters
    ///
    /// Statements that produce no result set return an empty vector.
    async fn query(&mut self, sql: &str, params: &[&str]) -> Result<Vec<Row>, ConnectionError>;

    fn is_closed(&self) -> bool;
}

/// Opens sessions from connection parameters
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        params: &NodeConnectionParams,
        default_port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn Session>, ConnectionError>;
}

/// tokio-postgres backed connector
#[derive(Debug, Default, Clone)]
pub struct PgConnector {
    application_name: Option<String>,
}

impl PgConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn connect(
        &self,
        params: &NodeConnectionParams,
        default_port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn Session>, ConnectionError> {
        let host = params
            .host()
            .ok_or_else(|| ConnectionError::Connect("no host".into()))?;

        let mut config = tokio_postgres::Config::new();
        config
            .host(host)
            .port(params.port().unwrap_or(default_port))
            .connect_timeout(params.connect_timeout().unwrap_or(timeout));
        if let Some(user) = params.user() {
            config.user(user);
        }
        if let Some(dbname) = params.dbname() {
            config.dbname(dbname);
        }
        if let Some(password) = params.password() {
            config.password(password);
        }
        if let Some(name) = &self.application_name {
            config.application_name(name);
        }

        debug!(host = %host, "Connecting to node");
        let (client, connection) = config.connect(NoTls).await.map_err(classify_error)?;

        let task_host = host.to_string();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(host = %task_host, error = %e, "Node connection terminated");
            }
        });

        Ok(Box::new(PgSession { client }))
    }
}

/// Session over a tokio-postgres client
///
/// Statements run outside any explicit transaction, so each one commits on
/// its own. Dropping the client closes the socket.
struct PgSession {
    client: tokio_postgres::Client,
}

#[async_trait]
impl Session for PgSession {
    async fn query(&mut self, sql: &str, params: &[&str]) -> Result<Vec<Row>, ConnectionError> {
        let params: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let rows = self
            .client
            .query(sql, &params)
            .await
            .map_err(classify_error)?;

        rows.iter()
            .map(|row| {
                let mut out = Row::new();
                for (idx, column) in row.columns().iter().enumerate() {
                    let value: Option<String> = row
                        .try_get(idx)
                        .map_err(|e| ConnectionError::Decode(e.to_string()))?;
                    out = out.with(column.name(), value.as_deref());
                }
                Ok(out)
            })
            .collect()
    }

    fn is_closed(&self) -> bool {
        self.client.is_closed()
    }
}

fn classify_error(e: tokio_postgres::Error) -> ConnectionError {
    if e.is_closed() {
        return ConnectionError::Closed;
    }
    match e.code() {
        // class 28: invalid authorization specification
        Some(code) if code.code().starts_with("28") => ConnectionError::Auth(e.to_string()),
        Some(_) => ConnectionError::Query(e.to_string()),
        None => ConnectionError::Connect(e.to_string()),
    }
}
