use crate::node_address::NodeAddress;
use crate::p2p::ban_list::BanList;
use crate::p2p::connection_config::{ConnectionConfig, NetworkConfig};
use crate::transport::{LocalhostTransport, TorSettings, TorTransport, Transport};
use crate::version::message_version_for;
use crate::{Error, Result};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const ENV_PREFIX: &str = "TRADENET";

// For explanation, see issue: https://github.com/serde-rs/serde/issues/368
fn default_port() -> u16 {
    9999
}
fn default_network() -> String {
    "mainnet".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Localhost,
    Tor,
}

impl Default for TransportKind {
    fn default() -> Self {
        TransportKind::Localhost
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransportKind::Localhost => write!(f, "localhost"),
            TransportKind::Tor => write!(f, "tor"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Selects the message version, peers of other networks are disconnected.
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(default)]
    pub transport: TransportKind,
    /// The SOCKS5 port of the onion router, `host:port`.
    #[serde(default)]
    pub tor_proxy: Option<String>,
    /// The onion address published for this node, `host:port`.
    #[serde(default)]
    pub hidden_service: Option<String>,
    #[serde(default)]
    pub banned_peers: Vec<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub limits: NetworkSettings,
}

/// The tunables of `ConnectionConfig`, durations in the unit their name says.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConnectionSettings {
    pub msg_throttle_per_sec: usize,
    pub msg_throttle_per_10_sec: usize,
    pub send_msg_throttle_trigger_ms: u64,
    pub send_msg_throttle_sleep_ms: u64,
    pub read_timeout_secs: u64,
    pub max_permitted_message_size: usize,
    pub permitted_message_size_extended: usize,
    pub close_grace_period_ms: u64,
    pub close_send_timeout_ms: u64,
    pub expected_initial_data_requests: u32,
    pub peer_reset_timeout_secs: u64,
    pub completed_timeout_secs: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        let config = ConnectionConfig::default();
        ConnectionSettings {
            msg_throttle_per_sec: config.msg_throttle_per_sec,
            msg_throttle_per_10_sec: config.msg_throttle_per_10_sec,
            send_msg_throttle_trigger_ms: config.send_msg_throttle_trigger.as_millis() as u64,
            send_msg_throttle_sleep_ms: config.send_msg_throttle_sleep.as_millis() as u64,
            read_timeout_secs: config.read_timeout.as_secs(),
            max_permitted_message_size: config.max_permitted_message_size,
            permitted_message_size_extended: config.permitted_message_size_extended,
            close_grace_period_ms: config.close_grace_period.as_millis() as u64,
            close_send_timeout_ms: config.close_send_timeout.as_millis() as u64,
            expected_initial_data_requests: config.expected_initial_data_requests,
            peer_reset_timeout_secs: config.peer_reset_timeout.as_secs(),
            completed_timeout_secs: config.completed_timeout.as_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NetworkSettings {
    pub create_socket_timeout_secs: u64,
    pub shutdown_timeout_ms: u64,
    pub max_workers: usize,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        let config = NetworkConfig::default();
        NetworkSettings {
            create_socket_timeout_secs: config.create_socket_timeout.as_secs(),
            shutdown_timeout_ms: config.shutdown_timeout.as_millis() as u64,
            max_workers: config.max_workers,
        }
    }
}

impl Settings {
    /// Reads the settings file, if there is one at `path`, and applies `TRADENET_*` environment
    /// overrides on top. Nested keys use a double underscore, e.g. `TRADENET_LIMITS__MAX_WORKERS`.
    pub fn load(path: &Path) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn message_version(&self) -> Result<u32> {
        message_version_for(&self.network).ok_or_else(|| {
            Error::Config(ConfigError::Message(format!("unknown network {}", self.network)))
        })
    }

    pub fn connection_config(&self) -> Result<ConnectionConfig> {
        let c = &self.connection;
        Ok(ConnectionConfig {
            msg_throttle_per_sec: c.msg_throttle_per_sec,
            msg_throttle_per_10_sec: c.msg_throttle_per_10_sec,
            send_msg_throttle_trigger: Duration::from_millis(c.send_msg_throttle_trigger_ms),
            send_msg_throttle_sleep: Duration::from_millis(c.send_msg_throttle_sleep_ms),
            read_timeout: Duration::from_secs(c.read_timeout_secs),
            max_permitted_message_size: c.max_permitted_message_size,
            permitted_message_size_extended: c.permitted_message_size_extended,
            message_version: self.message_version()?,
            close_grace_period: Duration::from_millis(c.close_grace_period_ms),
            close_send_timeout: Duration::from_millis(c.close_send_timeout_ms),
            expected_initial_data_requests: c.expected_initial_data_requests,
            peer_reset_timeout: Duration::from_secs(c.peer_reset_timeout_secs),
            completed_timeout: Duration::from_secs(c.completed_timeout_secs),
            ..ConnectionConfig::default()
        })
    }

    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            create_socket_timeout: Duration::from_secs(self.limits.create_socket_timeout_secs),
            shutdown_timeout: Duration::from_millis(self.limits.shutdown_timeout_ms),
            max_workers: self.limits.max_workers,
        }
    }

    pub fn ban_list(&self) -> Result<BanList> {
        let banned = self
            .banned_peers
            .iter()
            .map(|peer| peer.parse::<NodeAddress>())
            .collect::<Result<Vec<_>>>()?;
        Ok(BanList::new(banned))
    }

    pub fn transport(&self) -> Result<Arc<dyn Transport>> {
        match self.transport {
            TransportKind::Localhost => Ok(Arc::new(LocalhostTransport::new())),
            TransportKind::Tor => {
                let proxy = self
                    .tor_proxy
                    .as_ref()
                    .ok_or_else(|| missing("tor_proxy"))?
                    .parse::<SocketAddr>()
                    .map_err(|err| Error::Config(ConfigError::Message(format!("tor_proxy: {}", err))))?;
                let hidden_service =
                    self.hidden_service.as_ref().ok_or_else(|| missing("hidden_service"))?.parse()?;
                Ok(Arc::new(TorTransport::new(TorSettings { proxy, hidden_service })))
            }
        }
    }

    pub fn log_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}

fn missing(key: &str) -> Error {
    Error::Config(ConfigError::NotFound(key.to_string()))
}
