//! Connection parameters for a single cluster member
//!
//! Parameters come from the `conninfo` column of the registration table,
//! a libpq keyword/value string such as
//! `host=db2 port=5432 user=repmgr dbname=repmgr connect_timeout=2`.

use std::time::Duration;

use thiserror::Error;

/// Malformed conninfo text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConninfoError {
    #[error("Missing '=' after keyword '{0}'")]
    MissingEquals(String),
    #[error("Empty keyword at offset {0}")]
    EmptyKeyword(usize),
    #[error("Unterminated quoted value for '{0}'")]
    UnterminatedQuote(String),
    #[error("No host in conninfo")]
    MissingHost,
    #[error("Invalid port '{0}'")]
    InvalidPort(String),
}

/// Ordered keyword/value connection attributes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeConnectionParams {
    pairs: Vec<(String, String)>,
}

impl NodeConnectionParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Insert or replace a keyword, keeping its original position
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.pairs.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Host name (falls back to `hostaddr`)
    pub fn host(&self) -> Option<&str> {
        self.get("host").or_else(|| self.get("hostaddr"))
    }

    pub fn port(&self) -> Option<u16> {
        self.get("port").and_then(|p| p.parse().ok())
    }

    pub fn user(&self) -> Option<&str> {
        self.get("user")
    }

    pub fn dbname(&self) -> Option<&str> {
        self.get("dbname")
    }

    pub fn password(&self) -> Option<&str> {
        self.get("password")
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.get("connect_timeout")
            .and_then(|t| t.parse::<u64>().ok())
            .filter(|t| *t > 0)
            .map(Duration::from_secs)
    }

    /// Parse a libpq keyword/value conninfo string
    ///
    /// A host is required; a port, if present, must be numeric.
    pub fn from_conninfo(conninfo: &str) -> Result<Self, ConninfoError> {
        let mut params = Self::new();
        let chars: Vec<char> = conninfo.chars().collect();
        let mut i = 0;

        loop {
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            if i >= chars.len() {
                break;
            }

            let key_start = i;
            while i < chars.len() && chars[i] != '=' && !chars[i].is_whitespace() {
                i += 1;
            }
            let key: String = chars[key_start..i].iter().collect();
            if key.is_empty() {
                return Err(ConninfoError::EmptyKeyword(key_start));
            }

            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            if i >= chars.len() || chars[i] != '=' {
                return Err(ConninfoError::MissingEquals(key));
            }
            i += 1;
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }

            let mut value = String::new();
            if i < chars.len() && chars[i] == '\'' {
                i += 1;
                let mut closed = false;
                while i < chars.len() {
                    match chars[i] {
                        '\\' if i + 1 < chars.len() => {
                            value.push(chars[i + 1]);
                            i += 2;
                        }
                        '\'' => {
                            closed = true;
                            i += 1;
                            break;
                        }
                        c => {
                            value.push(c);
                            i += 1;
                        }
                    }
                }
                if !closed {
                    return Err(ConninfoError::UnterminatedQuote(key));
                }
            } else {
                while i < chars.len() && !chars[i].is_whitespace() {
                    if chars[i] == '\\' && i + 1 < chars.len() {
                        i += 1;
                    }
                    value.push(chars[i]);
                    i += 1;
                }
            }

            params.set(key, value);
        }

        if params.host().map_or(true, str::is_empty) {
            return Err(ConninfoError::MissingHost);
        }
        if let Some(port) = params.get("port") {
            if port.parse::<u16>().is_err() {
                return Err(ConninfoError::InvalidPort(port.to_string()));
            }
        }

        Ok(params)
    }
}
