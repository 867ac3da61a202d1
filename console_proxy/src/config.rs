use std::{
    env, fs, io,
    net::{Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::command::{DEFAULT_COMMAND_PORT, FRAME_HEADER_LEN};

pub const BUILTIN_PROXY_CONFIG: &str = include_str!("data/proxy_config.json");

/// Environment variable naming a proxy config file to load instead of the
/// builtin one.
pub const PROXY_CONFIG_ENV: &str = "CONSOLE_PROXY_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    bind: SocketAddr,
    read_timeout_ms: u64,
    join_timeout_ms: u64,
    max_datagram_bytes: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_COMMAND_PORT)),
            read_timeout_ms: 250,
            join_timeout_ms: 1000,
            max_datagram_bytes: 65507,
        }
    }
}

impl ProxyConfig {
    pub fn builtin() -> Self {
        serde_json::from_str(BUILTIN_PROXY_CONFIG).expect("builtin proxy config should parse")
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, ProxyConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ProxyConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let config = ProxyConfig::from_json_str(&contents)?;
        Ok(config)
    }

    /// Loads the file named by `CONSOLE_PROXY_CONFIG`, or the builtin config
    /// when the variable is unset.
    pub fn from_env() -> Result<Self, ProxyConfigError> {
        match env::var_os(PROXY_CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::builtin()),
        }
    }

    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    pub fn bind(&self) -> SocketAddr {
        self.bind
    }

    /// Upper bound on how long the receiver blocks before rechecking its
    /// running flag. Never zero, which sockets reject.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn max_datagram_bytes(&self) -> usize {
        self.max_datagram_bytes.max(FRAME_HEADER_LEN + 1)
    }
}

#[derive(Debug, Error)]
pub enum ProxyConfigError {
    #[error("failed to parse proxy config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read proxy config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
