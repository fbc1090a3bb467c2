use super::Transport;

use crate::node_address::NodeAddress;
use crate::p2p::listener::SetupListener;
use crate::{Error, Result};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};

use tracing::{debug, info};

/// Plain TCP on the loopback interface, used for tests and local networks.
#[derive(Debug, Clone, Default)]
pub struct LocalhostTransport;

impl LocalhostTransport {
    pub fn new() -> Self {
        LocalhostTransport
    }
}

impl Transport for LocalhostTransport {
    fn start(
        &self,
        port: u16,
        setup: Arc<dyn SetupListener>,
    ) -> Pin<Box<dyn Future<Output = Result<(NodeAddress, TcpListener)>> + Send>> {
        Box::pin(async move {
            let listener = TcpListener::bind(("127.0.0.1", port)).await?;
            let port = listener.local_addr()?.port();
            info!("localhost transport listening on port {}", port);
            setup.on_tor_node_ready();
            Ok((NodeAddress::localhost(port), listener))
        })
    }

    fn connect(
        &self,
        peer: &NodeAddress,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<TcpStream>> + Send>> {
        let peer = peer.clone();
        Box::pin(async move {
            debug!("connecting to {}", peer);
            match tokio::time::timeout(timeout, TcpStream::connect((peer.host_name(), peer.port()))).await
            {
                Ok(socket) => Ok(socket?),
                Err(_) => Err(Error::Timeout(format!("connecting to {}", peer))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct Ready(AtomicBool);

    impl SetupListener for Ready {
        fn on_tor_node_ready(&self) {
            self.0.store(true, Ordering::SeqCst);
        }

        fn on_setup_failed(&self, _error: &Error) {}
    }

    #[actix_rt::test]
    async fn test_start_and_connect() {
        let transport = LocalhostTransport::new();
        let ready = Arc::new(Ready::default());
        let (address, listener) = transport.start(0, ready.clone()).await.unwrap();
        assert!(ready.0.load(Ordering::SeqCst));
        assert_eq!(address.host_name(), "localhost");
        assert_ne!(address.port(), 0);

        let (connected, accepted) =
            tokio::join!(transport.connect(&address, Duration::from_secs(5)), listener.accept());
        assert!(connected.is_ok());
        assert!(accepted.is_ok());
    }

    #[actix_rt::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let result = LocalhostTransport::new()
            .connect(&NodeAddress::localhost(port), Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(Error::IO(_))));
    }
}
