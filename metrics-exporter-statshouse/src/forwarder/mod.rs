use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs as _, UdpSocket},
    time::Duration,
};

pub mod sync;

/// A datagram transport to the aggregator.
///
/// The client connects lazily, on the first flush that has something to send, and drops the connection after any send
/// failure so that the next flush starts from a fresh one.
pub trait Transport {
    /// An established connection.
    type Connection;

    /// Establishes a connection to the aggregator.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the connection cannot be established.
    fn connect(&mut self) -> io::Result<Self::Connection>;

    /// Sends a single datagram, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the datagram cannot be sent.
    fn send(&mut self, conn: &mut Self::Connection, payload: &[u8]) -> io::Result<usize>;

    /// Tears down a connection.
    fn close(&mut self, conn: Self::Connection) {
        drop(conn);
    }
}

#[derive(Clone, Debug)]
pub(crate) struct RemoteAddr(Vec<SocketAddr>);

impl<'a> TryFrom<&'a str> for RemoteAddr {
    type Error = String;

    fn try_from(addr: &'a str) -> Result<Self, Self::Error> {
        match addr.to_socket_addrs() {
            Ok(addrs) => {
                let addrs = addrs.collect::<Vec<_>>();
                if addrs.is_empty() {
                    Err(format!("'{addr}' did not resolve to any socket address"))
                } else {
                    Ok(RemoteAddr(addrs))
                }
            }
            Err(e) => Err(e.to_string()),
        }
    }
}

impl From<SocketAddr> for RemoteAddr {
    fn from(addr: SocketAddr) -> Self {
        RemoteAddr(vec![addr])
    }
}

/// UDP transport.
///
/// Each connection binds an ephemeral local socket and connects it to the remote address.
#[derive(Clone, Debug)]
pub struct UdpTransport {
    remote_addr: RemoteAddr,
    write_timeout: Duration,
}

impl UdpTransport {
    pub(crate) fn new(remote_addr: RemoteAddr, write_timeout: Duration) -> Self {
        UdpTransport { remote_addr, write_timeout }
    }
}

impl Transport for UdpTransport {
    type Connection = UdpSocket;

    fn connect(&mut self) -> io::Result<UdpSocket> {
        let addrs = &self.remote_addr.0[..];
        let socket = match addrs.first() {
            Some(SocketAddr::V6(_)) => UdpSocket::bind((Ipv6Addr::UNSPECIFIED, 0))?,
            _ => UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?,
        };

        socket.connect(addrs)?;

        // A zero timeout is rejected by the socket; treat it as "no timeout".
        socket.set_write_timeout(Some(self.write_timeout).filter(|t| !t.is_zero()))?;
        Ok(socket)
    }

    fn send(&mut self, socket: &mut UdpSocket, payload: &[u8]) -> io::Result<usize> {
        socket.send(payload)
    }
}
