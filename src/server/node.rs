use crate::message::NetworkEnvelope;
use crate::p2p::close_connection_reason::CloseConnectionReason;
use crate::p2p::connection::{Connection, ConnectionContext};
use crate::p2p::listener::{ConnectionListener, MessageListener, SetupListener};
use crate::p2p::network_node::NetworkNode;
use crate::p2p::statistic_reporter::StatisticsReporter;
use crate::server::Settings;
use crate::user_thread::UserThread;
use crate::{Error, Result};

use crate::colored::Colorize;

use actix::{Actor, Addr};

use std::sync::Arc;

use tracing::{error, info};

/// A started node and the actor reporting its traffic.
pub struct RunningNode {
    pub network_node: NetworkNode,
    pub reporter: Addr<StatisticsReporter>,
}

/// Starts a node from `settings`. Has to be called from within an actix system.
pub async fn run(settings: Settings) -> Result<RunningNode> {
    let user_thread = UserThread::start()?;
    let context = ConnectionContext::new(settings.connection_config()?, user_thread)
        .with_ban_filter(Arc::new(settings.ban_list()?));
    let transport = settings.transport()?;
    info!("Node is starting on the {} transport, port {}", settings.transport, settings.port);

    let network_node = NetworkNode::new(settings.port, transport, context, settings.network_config());
    let logger = Arc::new(NodeLogger);
    network_node.add_message_listener(logger.clone());
    network_node.add_connection_listener(logger.clone());
    let address = network_node.start(Some(logger)).await?;
    info!("Node is reachable at {}", address.to_string().green());

    let reporter = StatisticsReporter::default().start();
    Ok(RunningNode { network_node, reporter })
}

// Logs what the node sees, the binary has no other use for the messages.
struct NodeLogger;

impl MessageListener for NodeLogger {
    fn on_message(&self, envelope: &NetworkEnvelope, connection: &Connection) {
        info!("Received {} from {}", envelope.payload.name().cyan(), connection);
    }
}

impl ConnectionListener for NodeLogger {
    fn on_connection(&self, connection: &Connection) {
        info!("{} {}", "Connected:".green(), connection);
    }

    fn on_disconnect(&self, reason: CloseConnectionReason, connection: &Connection) {
        info!("{} {} reason={}", "Disconnected:".yellow(), connection, reason);
    }

    fn on_error(&self, error: &Error) {
        error!("Connection error: {}", error);
    }
}

impl SetupListener for NodeLogger {
    fn on_tor_node_ready(&self) {
        info!("Transport is ready");
    }

    fn on_hidden_service_published(&self) {
        info!("Node address is published");
    }

    fn on_setup_failed(&self, error: &Error) {
        error!("Setup failed: {}", error);
    }
}
