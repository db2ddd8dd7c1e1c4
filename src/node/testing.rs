//! Scripted in-memory cluster for tests

use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::connection::{ConnectionError, Connector, Row, Session};
use super::params::NodeConnectionParams;
use super::queries;

/// State of one fake server
#[derive(Debug, Clone)]
pub struct FakeNode {
    pub reachable: bool,
    pub auth_denied: bool,
    pub deny_ddl: bool,
    /// Accept connections but never answer statements
    pub stalled: bool,
    pub in_recovery: bool,
    pub receive_lsn: Option<String>,
    pub replay_lsn: Option<String>,
    pub replay_ts: Option<f64>,
    pub now_ts: f64,
    pub current_lsn: String,
    pub start_time: String,
    pub settings: HashMap<String, String>,
    pub connections: i64,
    pub buffer_cache: Option<(i64, i64)>,
    pub heartbeat_table: bool,
    pub heartbeats: Vec<String>,
    /// (node_id, node_name, conninfo)
    pub members: Vec<(i64, String, String)>,
    pub connects: usize,
    pub queries: usize,
}

impl FakeNode {
    pub fn primary() -> Self {
        let mut settings = HashMap::new();
        settings.insert("max_connections".to_string(), "100".to_string());
        Self {
            reachable: true,
            auth_denied: false,
            deny_ddl: false,
            stalled: false,
            in_recovery: false,
            receive_lsn: None,
            replay_lsn: None,
            replay_ts: None,
            now_ts: 1_000.0,
            current_lsn: "0/3000".to_string(),
            start_time: "2026-01-01T00:00:00+00".to_string(),
            settings,
            connections: 5,
            buffer_cache: Some((10, 90)),
            heartbeat_table: false,
            heartbeats: Vec::new(),
            members: Vec::new(),
            connects: 0,
            queries: 0,
        }
    }

    pub fn replica() -> Self {
        Self {
            in_recovery: true,
            receive_lsn: Some("0/2800".to_string()),
            replay_lsn: Some("0/2000".to_string()),
            replay_ts: Some(990.0),
            ..Self::primary()
        }
    }

    fn answer(&mut self, sql: &str, params: &[&str]) -> Result<Vec<Row>, ConnectionError> {
        self.queries += 1;

        match sql {
            queries::PING => one(Row::new().with("ok", Some("1"))),
            queries::IS_IN_RECOVERY => one(
                Row::new().with("in_recovery", Some(if self.in_recovery { "true" } else { "false" })),
            ),
            queries::REPLICA_POSITIONS => {
                let replay_ts = self.replay_ts.map(|ts| ts.to_string());
                one(Row::new()
                    .with("receive_lsn", self.receive_lsn.as_deref())
                    .with("replay_lsn", self.replay_lsn.as_deref())
                    .with("replay_ts", replay_ts.as_deref()))
            }
            queries::PRIMARY_POSITION if self.in_recovery => Err(ConnectionError::Query(
                "recovery is in progress".into(),
            )),
            queries::PRIMARY_POSITION => one(Row::new()
                .with("now_ts", Some(self.now_ts.to_string().as_str()))
                .with("current_lsn", Some(self.current_lsn.as_str()))),
            queries::SETTING => {
                let name = params.first().copied().unwrap_or_default();
                match self.settings.get(name) {
                    Some(value) => one(Row::new().with("value", Some(value.as_str()))),
                    None => Err(ConnectionError::Query(format!(
                        "unrecognized configuration parameter \"{}\"",
                        name
                    ))),
                }
            }
            queries::CONNECTION_COUNT => {
                one(Row::new().with("connections", Some(self.connections.to_string().as_str())))
            }
            queries::BUFFER_CACHE => match self.buffer_cache {
                Some((free, used)) => one(Row::new()
                    .with("free", Some(free.to_string().as_str()))
                    .with("used", Some(used.to_string().as_str()))),
                None => Err(ConnectionError::Query(
                    "relation \"pg_buffercache\" does not exist".into(),
                )),
            },
            queries::START_TIME => one(Row::new().with("start_time", Some(self.start_time.as_str()))),
            queries::CREATE_HEARTBEAT_TABLE if self.deny_ddl => {
                Err(ConnectionError::Query("permission denied for schema public".into()))
            }
            queries::CREATE_HEARTBEAT_TABLE => {
                self.heartbeat_table = true;
                Ok(Vec::new())
            }
            queries::UPSERT_HEARTBEAT if !self.heartbeat_table => Err(ConnectionError::Query(
                "relation \"cluster_logger_heartbeat\" does not exist".into(),
            )),
            queries::UPSERT_HEARTBEAT => {
                let name = params.first().copied().unwrap_or_default();
                self.heartbeats.push(name.to_string());
                Ok(Vec::new())
            }
            queries::MEMBERSHIP => Ok(self
                .members
                .iter()
                .map(|(id, name, conninfo)| {
                    Row::new()
                        .with("node_id", Some(id.to_string().as_str()))
                        .with("node_name", Some(name.as_str()))
                        .with("conninfo", Some(conninfo.as_str()))
                })
                .collect()),
            other => Err(ConnectionError::Query(format!("unexpected statement: {}", other))),
        }
    }
}

fn one(row: Row) -> Result<Vec<Row>, ConnectionError> {
    Ok(vec![row])
}

/// Shared set of fake servers keyed by host
#[derive(Debug, Clone, Default)]
pub struct FakeCluster {
    nodes: Arc<Mutex<HashMap<String, FakeNode>>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, host: &str, node: FakeNode) {
        self.nodes.lock().unwrap().insert(host.to_string(), node);
    }

    pub fn update(&self, host: &str, f: impl FnOnce(&mut FakeNode)) {
        let mut nodes = self.nodes.lock().unwrap();
        f(nodes.get_mut(host).expect("unknown fake host"));
    }

    pub fn node(&self, host: &str) -> FakeNode {
        self.nodes.lock().unwrap().get(host).cloned().expect("unknown fake host")
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl Connector for FakeCluster {
    async fn connect(
        &self,
        params: &NodeConnectionParams,
        _default_port: u16,
        _timeout: Duration,
    ) -> Result<Box<dyn Session>, ConnectionError> {
        let host = params.host().unwrap_or_default().to_string();
        let mut nodes = self.nodes.lock().unwrap();
        let node = match nodes.get_mut(&host) {
            Some(node) if node.reachable => node,
            _ => return Err(ConnectionError::Connect(format!("{}: connection refused", host))),
        };
        if node.auth_denied {
            return Err(ConnectionError::Auth("password authentication failed".into()));
        }
        node.connects += 1;
        Ok(Box::new(FakeSession {
            host,
            cluster: self.clone(),
        }))
    }
}

struct FakeSession {
    host: String,
    cluster: FakeCluster,
}

#[async_trait]
impl Session for FakeSession {
    async fn query(&mut self, sql: &str, params: &[&str]) -> Result<Vec<Row>, ConnectionError> {
        let stalled = self
            .cluster
            .nodes
            .lock()
            .unwrap()
            .get(&self.host)
            .is_some_and(|n| n.reachable && n.stalled);
        if stalled {
            std::future::pending::<()>().await;
        }

        let mut nodes = self.cluster.nodes.lock().unwrap();
        match nodes.get_mut(&self.host) {
            Some(node) if node.reachable => node.answer(sql, params),
            _ => Err(ConnectionError::Closed),
        }
    }

    fn is_closed(&self) -> bool {
        let nodes = self.cluster.nodes.lock().unwrap();
        !nodes.get(&self.host).is_some_and(|n| n.reachable)
    }
}

/// A local port with nothing listening on it
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
