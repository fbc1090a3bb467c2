//! Socket providers. A node is started on exactly one transport, which hands out the listening
//! socket for inbound connections and connects to peers for outbound ones.

mod localhost;
pub mod socks5;
mod tor;

pub use localhost::LocalhostTransport;
pub use tor::{TorSettings, TorTransport};

use crate::node_address::NodeAddress;
use crate::p2p::listener::SetupListener;
use crate::Result;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};

pub trait Transport: Send + Sync {
    /// Opens the listening socket on `port` and returns it with the address peers use to reach
    /// this node. Readiness is reported to `setup` while starting. A failure is returned and
    /// reported by the caller.
    fn start(
        &self,
        port: u16,
        setup: Arc<dyn SetupListener>,
    ) -> Pin<Box<dyn Future<Output = Result<(NodeAddress, TcpListener)>> + Send>>;

    /// Connects to `peer`, failing with `Error::Timeout` after `timeout`.
    fn connect(
        &self,
        peer: &NodeAddress,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<TcpStream>> + Send>>;
}
