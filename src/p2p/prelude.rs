pub use crate::{Error, Result};

pub use super::ban_list::{BanFilter, BanList};
pub use super::close_connection_reason::CloseConnectionReason;
pub use super::connection::{CompletionHandler, Connection, ConnectionContext, Direction};
pub use super::connection_config::{ConnectionConfig, NetworkConfig};
pub use super::connection_state::PeerType;
pub use super::listener::{
    ConnectionListener, MessageListener, SetupListener, SupportedCapabilitiesListener,
};
pub use super::network_node::NetworkNode;
pub use super::rule_violation::RuleViolation;

pub use crate::capability::{Capabilities, Capability};
pub use crate::message::{NetworkEnvelope, Payload};
pub use crate::node_address::NodeAddress;
pub use crate::user_thread::UserThread;

pub use tokio::time::{timeout, Duration};

pub use std::pin::Pin;
pub use std::sync::Arc;

pub use futures::{Future, FutureExt};

pub use crate::colored::Colorize;

pub use tracing::{debug, error, info, trace, warn};
