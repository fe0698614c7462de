//! Destination resolution.
//!
//! Every worker owns one connected UDP socket. Connecting a datagram socket
//! fixes its peer so that each send is a plain `send(2)` with no per-call
//! address handling.
//!
//! The destination service is either a port number or a service name such as
//! `statsd`, looked up through `getaddrinfo(3)` the way the system resolver
//! does for any datagram client.

use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket},
};

use dns_lookup::{AddrInfoHints, SockType};
use tracing::{debug, trace};

/// Errors produced by [`connect`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The destination could not be resolved
    #[error("Failed to resolve {host}:{service}: {source}")]
    Resolve {
        /// Destination host
        host: String,
        /// Destination port or service name
        service: String,
        /// Underlying IO error
        #[source]
        source: Box<io::Error>,
    },
    /// Resolution succeeded but produced no addresses
    #[error("No address found for {host}:{service}")]
    NoAddress {
        /// Destination host
        host: String,
        /// Destination port or service name
        service: String,
    },
    /// No resolved address could be bound and connected
    #[error("Opening network socket to {addr} failed: {source}")]
    Connect {
        /// The last address attempted
        addr: SocketAddr,
        /// Underlying IO error
        #[source]
        source: Box<io::Error>,
    },
}

/// Resolve `host` and `service` and return a UDP socket connected to the
/// first address that accepts a connection.
///
/// # Errors
///
/// Function will return an error if the destination does not resolve or no
/// resolved address could be connected.
pub fn connect(host: &str, service: &str) -> Result<UdpSocket, Error> {
    let addrs = resolve(host, service).map_err(|source| Error::Resolve {
        host: host.to_string(),
        service: service.to_string(),
        source: Box::new(source),
    })?;

    let mut last_failure = None;
    for addr in addrs {
        match open(addr) {
            Ok(socket) => {
                debug!("UDP socket connected to {addr}");
                return Ok(socket);
            }
            Err(err) => {
                trace!("connecting to {addr} failed: {err}");
                last_failure = Some((addr, err));
            }
        }
    }

    match last_failure {
        Some((addr, source)) => Err(Error::Connect {
            addr,
            source: Box::new(source),
        }),
        None => Err(Error::NoAddress {
            host: host.to_string(),
            service: service.to_string(),
        }),
    }
}

/// Resolve `host` and `service` to the addresses a datagram socket may
/// connect to, in resolver order.
///
/// # Errors
///
/// Function will return an error if the resolver fails or the service is
/// unknown.
pub fn resolve(host: &str, service: &str) -> io::Result<Vec<SocketAddr>> {
    if let Ok(port) = service.parse::<u16>() {
        return Ok((host, port).to_socket_addrs()?.collect());
    }

    let hints = AddrInfoHints {
        socktype: SockType::DGram.into(),
        ..AddrInfoHints::default()
    };
    dns_lookup::getaddrinfo(Some(host), Some(service), Some(hints))
        .map_err(io::Error::from)?
        .map(|info| info.map(|info| info.sockaddr))
        .collect()
}

fn open(addr: SocketAddr) -> io::Result<UdpSocket> {
    let local: SocketAddr = if addr.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(local)?;
    socket.connect(addr)?;
    Ok(socket)
}
