use super::{socks5, Transport};

use crate::node_address::NodeAddress;
use crate::p2p::listener::SetupListener;
use crate::{Error, Result};

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};

use tracing::{debug, info};

const PROXY_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the externally managed onion router can be reached.
#[derive(Debug, Clone)]
pub struct TorSettings {
    /// The SOCKS5 port of the router.
    pub proxy: SocketAddr,
    /// The published hidden service, forwarding to the local listening port.
    pub hidden_service: NodeAddress,
}

/// Onion routing through a running router: outbound connections go through its SOCKS5 proxy,
/// inbound ones arrive from its hidden service on the loopback interface.
pub struct TorTransport {
    settings: TorSettings,
}

impl TorTransport {
    pub fn new(settings: TorSettings) -> Self {
        TorTransport { settings }
    }
}

impl Transport for TorTransport {
    fn start(
        &self,
        port: u16,
        setup: Arc<dyn SetupListener>,
    ) -> Pin<Box<dyn Future<Output = Result<(NodeAddress, TcpListener)>> + Send>> {
        let settings = self.settings.clone();
        Box::pin(async move {
            match tokio::time::timeout(PROXY_CHECK_TIMEOUT, TcpStream::connect(settings.proxy)).await {
                Ok(Ok(_)) => info!("onion proxy {} is reachable", settings.proxy),
                Ok(Err(err)) => {
                    return Err(Error::Setup(format!("onion proxy {}: {}", settings.proxy, err)))
                }
                Err(_) => return Err(Error::Setup(format!("onion proxy {} timed out", settings.proxy))),
            }
            setup.on_tor_node_ready();

            let listener = TcpListener::bind(("127.0.0.1", port)).await?;
            info!(
                "hidden service {} forwards to {}",
                settings.hidden_service,
                listener.local_addr()?
            );
            Ok((settings.hidden_service.clone(), listener))
        })
    }

    fn connect(
        &self,
        peer: &NodeAddress,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<TcpStream>> + Send>> {
        let proxy = self.settings.proxy;
        let peer = peer.clone();
        Box::pin(async move {
            debug!("connecting to {} via {}", peer, proxy);
            match tokio::time::timeout(timeout, socks5::connect(proxy, &peer)).await {
                Ok(socket) => socket,
                Err(_) => Err(Error::Timeout(format!("connecting to {} via {}", peer, proxy))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailOnSetup;

    impl SetupListener for FailOnSetup {
        fn on_tor_node_ready(&self) {
            panic!("proxy is not running");
        }

        fn on_setup_failed(&self, _error: &Error) {}
    }

    #[actix_rt::test]
    async fn test_start_fails_without_proxy() {
        let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy = unused.local_addr().unwrap();
        drop(unused);

        let transport = TorTransport::new(TorSettings {
            proxy,
            hidden_service: NodeAddress::new("3a5dkb7xlb4n5rfe.onion", 9999),
        });
        let result = transport.start(0, Arc::new(FailOnSetup)).await;
        assert!(matches!(result, Err(Error::Setup(_))));
    }

    #[actix_rt::test]
    async fn test_start_publishes_hidden_service() {
        let proxy = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let hidden_service = NodeAddress::new("3a5dkb7xlb4n5rfe.onion", 9999);
        let transport = TorTransport::new(TorSettings {
            proxy: proxy.local_addr().unwrap(),
            hidden_service: hidden_service.clone(),
        });

        struct Ignore;
        impl SetupListener for Ignore {
            fn on_setup_failed(&self, _error: &Error) {}
        }
        let (address, _listener) = transport.start(0, Arc::new(Ignore)).await.unwrap();
        assert_eq!(address, hidden_service);
    }
}
