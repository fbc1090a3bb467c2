#[macro_use]
extern crate serde_derive;
#[macro_use(Message, MessageResponse)]
extern crate actix_derive;
extern crate colored;

pub mod capability;
pub mod channel;
pub mod message;
pub mod node_address;
pub mod p2p;
pub mod server;
pub mod transport;
pub mod user_thread;
pub mod version;

#[cfg(test)]
pub(crate) mod test_util;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    IO(#[from] std::io::Error),
    #[error("codec: {0}")]
    Codec(#[from] bincode::Error),
    #[error("config: {0}")]
    Config(#[from] config::ConfigError),
    #[error("actix mailbox: {0}")]
    Actix(#[from] actix::MailboxError),

    // send errors
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("we do not send a message to ourselves")]
    SelfConnection,
    #[error("connection is stopped")]
    ConnectionStopped,
    #[error("shutdown in progress")]
    ShutDownInProgress,
    #[error("the send task was dropped before completing")]
    Canceled,
    #[error("send failed: {0}")]
    SendFailed(String),

    // transport errors
    #[error("socks5: {0}")]
    Socks(String),
    #[error("no tokio runtime is available")]
    NoRuntime,
    #[error("transport setup failed: {0}")]
    Setup(String),

    /// Error when parsing a node address `host:port`
    #[error("invalid node address: {0}")]
    AddressParse(String),
}

pub type Result<T> = std::result::Result<T, Error>;
