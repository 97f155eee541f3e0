//! Datagram transport abstraction.
//!
//! The core consumes a transport that delivers opaque byte vectors with no
//! ordering and no reliability guarantee; everything above it (records,
//! replay window, handshake retransmission) is built for that. The only
//! implementation shipped here is a thin adapter over a connected
//! [`tokio::net::UdpSocket`]; tests use an in-memory channel pair.

use std::io;

use tokio::net::{ToSocketAddrs, UdpSocket};

/// Largest datagram the adapter will accept.
const MAX_DATAGRAM: usize = 65_535;

/// A bidirectional, unreliable, unordered datagram channel.
pub trait Datagram {
    /// Send one datagram. Best effort; delivery is not guaranteed.
    fn send(&mut self, payload: &[u8]) -> impl std::future::Future<Output = io::Result<()>> + Send;

    /// Receive the next datagram, whatever its source or validity;
    /// record-level validation discriminates.
    fn recv(&mut self) -> impl std::future::Future<Output = io::Result<Vec<u8>>> + Send;
}

/// Connected UDP socket adapter.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind an ephemeral local port and connect to `remote`.
    pub async fn connect(remote: impl ToSocketAddrs) -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(remote).await?;
        Ok(Self { socket })
    }

    /// Wrap an already connected socket.
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self { socket }
    }

    /// Borrow the underlying socket.
    pub fn socket(&self) -> &UdpSocket {
        &self.socket
    }
}

impl Datagram for UdpTransport {
    async fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        self.socket.send(payload).await.map(|_| ())
    }

    async fn recv(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let n = self.socket.recv(&mut buf).await?;
        buf.truncate(n);
        Ok(buf)
    }
}

/// Decorator that hides an inner transport behind TLS camouflage.
///
/// Every outbound datagram is wrapped in TLS application-data records and
/// every inbound datagram is unwrapped before delivery. Datagrams that do
/// not parse as TLS records (port scans, stray traffic) are dropped
/// silently, matching the record layer's own discipline.
pub struct Camouflaged<T> {
    inner: T,
}

impl<T: Datagram> Camouflaged<T> {
    /// Wrap a transport.
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Recover the inner transport.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Datagram + Send> Datagram for Camouflaged<T> {
    async fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        self.inner.send(&crate::wrapper::wrap(payload)).await
    }

    async fn recv(&mut self) -> io::Result<Vec<u8>> {
        loop {
            let datagram = self.inner.recv().await?;
            match crate::wrapper::unwrap_all(&datagram) {
                Ok(payload) => return Ok(payload),
                Err(err) => {
                    tracing::debug!("dropping non-TLS datagram: {err}");
                }
            }
        }
    }
}
