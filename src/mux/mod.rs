
pub mod mux_func;

pub use mux_func::{match_dtls, match_range, match_stun, MatchFunc};

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::UdpSocket;
use util::{Buffer, Conn};

type UtilResult<T> = std::result::Result<T, util::Error>;

/// UnicastConn is a logical socket over the session's shared UDP socket,
/// restricted to a single remote peer. The DTLS agent reads and writes it as
/// a plain [`Conn`]; when a higher-priority candidate arrives the remote
/// target moves underneath without disturbing the consumer.
pub struct UnicastConn {
    socket: Arc<UdpSocket>,
    remote: Mutex<SocketAddr>,
    buffer: Buffer,
}

impl UnicastConn {
    pub fn new(socket: Arc<UdpSocket>, remote: SocketAddr) -> Self {
        UnicastConn {
            socket,
            remote: Mutex::new(remote),
            buffer: Buffer::new(0, 0),
        }
    }

    /// Redirects outbound traffic to a new remote transport address.
    pub fn set_remote(&self, remote: SocketAddr) {
        let mut current = self.remote.lock().unwrap();
        *current = remote;
    }

    pub fn remote(&self) -> SocketAddr {
        *self.remote.lock().unwrap()
    }

    /// Queues an inbound datagram for the consumer. Called by the session
    /// demux loop for every non-STUN datagram.
    pub(crate) async fn feed(&self, datagram: &[u8]) -> UtilResult<usize> {
        self.buffer.write(datagram).await
    }

    pub async fn close(&self) {
        self.buffer.close().await;
    }
}

#[async_trait]
impl Conn for UnicastConn {
    async fn connect(&self, _addr: SocketAddr) -> UtilResult<()> {
        Err(util::Error::Other("Not applicable".to_owned()))
    }

    async fn recv(&self, buf: &mut [u8]) -> UtilResult<usize> {
        self.buffer.read(buf, None).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> UtilResult<(usize, SocketAddr)> {
        let n = self.buffer.read(buf, None).await?;
        Ok((n, self.remote()))
    }

    async fn send(&self, buf: &[u8]) -> UtilResult<usize> {
        let remote = self.remote();
        self.socket
            .send_to(buf, remote)
            .await
            .map_err(util::Error::from_std)
    }

    async fn send_to(&self, _buf: &[u8], _target: SocketAddr) -> UtilResult<usize> {
        Err(util::Error::Other("Not applicable".to_owned()))
    }

    fn local_addr(&self) -> UtilResult<SocketAddr> {
        self.socket.local_addr().map_err(util::Error::from_std)
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        Some(self.remote())
    }

    async fn close(&self) -> UtilResult<()> {
        self.buffer.close().await;
        Ok(())
    }

    fn as_any(&self) -> &(dyn std::any::Any + Send + Sync) {
        self
    }
}
