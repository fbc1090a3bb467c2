//! The client side of a SOCKS5 `CONNECT` with a domain name target and no authentication, which
//! is what the onion proxy expects. Name resolution happens in the proxy.

use crate::node_address::NodeAddress;
use crate::{Error, Result};

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const VERSION: u8 = 5;
const NO_AUTHENTICATION: u8 = 0;
const CMD_CONNECT: u8 = 1;
const ATYP_IPV4: u8 = 1;
const ATYP_DOMAIN: u8 = 3;
const ATYP_IPV6: u8 = 4;
const SUCCEEDED: u8 = 0;

/// Connects to `target` through the proxy at `proxy`. The returned stream is positioned after
/// the proxy's reply and carries the target's bytes.
pub async fn connect(proxy: SocketAddr, target: &NodeAddress) -> Result<TcpStream> {
    let host = target.host_name().as_bytes();
    if host.is_empty() || host.len() > 255 {
        return Err(Error::Socks(format!("invalid host name length {}", host.len())));
    }
    let mut stream = TcpStream::connect(proxy).await?;

    stream.write_all(&[VERSION, 1, NO_AUTHENTICATION]).await?;
    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await?;
    if choice != [VERSION, NO_AUTHENTICATION] {
        return Err(Error::Socks(format!("proxy refused unauthenticated access: {:?}", choice)));
    }

    let mut request = vec![VERSION, CMD_CONNECT, 0, ATYP_DOMAIN, host.len() as u8];
    request.extend_from_slice(host);
    request.extend_from_slice(&target.port().to_be_bytes());
    stream.write_all(&request).await?;

    let mut reply = [0u8; 4];
    stream.read_exact(&mut reply).await?;
    if reply[0] != VERSION {
        return Err(Error::Socks(format!("unexpected version {}", reply[0])));
    }
    if reply[1] != SUCCEEDED {
        return Err(Error::Socks(format!("connect to {} failed: {}", target, reply_message(reply[1]))));
    }
    // the bound address is of no use to us but has to be consumed
    let bound_len = match reply[3] {
        ATYP_IPV4 => 4,
        ATYP_IPV6 => 16,
        ATYP_DOMAIN => stream.read_u8().await? as usize,
        other => return Err(Error::Socks(format!("unknown address type {}", other))),
    };
    let mut bound = vec![0u8; bound_len + 2];
    stream.read_exact(&mut bound).await?;
    Ok(stream)
}

fn reply_message(code: u8) -> &'static str {
    match code {
        1 => "general failure",
        2 => "connection not allowed by ruleset",
        3 => "network unreachable",
        4 => "host unreachable",
        5 => "connection refused",
        6 => "TTL expired",
        7 => "command not supported",
        8 => "address type not supported",
        _ => "unknown error",
    }
}
