//! UDP transport: a multicast receiver for node discovery broadcasts, a
//! unicast receiver/sender pair for point-to-point traffic, and the
//! socket-option plumbing both share.
//!
//! Each receiver owns a background thread that polls its socket with a
//! short read timeout and forwards datagrams over an `mpsc` channel,
//! checking a shared `AtomicBool` for shutdown between reads rather than
//! blocking forever on a socket that might never see more traffic.

pub mod multicast;
mod unicast;

pub use multicast::MulticastReceiver;
pub use unicast::{UnicastReceiver, UnicastSender};

use crate::error::{Result, TransportError};
use std::net::UdpSocket;
use std::time::Duration;

/// A single inbound datagram plus the address it arrived from.
#[derive(Debug, Clone)]
pub struct Datagram {
    pub data: Vec<u8>,
    pub from: std::net::SocketAddr,
}

const READ_BUF_LEN: usize = 1500;
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Apply `SO_REUSEADDR`/`SO_REUSEPORT` so multiple listeners (e.g. this
/// process and another ECHONET controller on the same host) can bind the
/// same multicast group concurrently.
fn set_reuse(socket: &socket2::Socket) -> Result<()> {
    socket
        .set_reuse_address(true)
        .map_err(TransportError::SocketBind)?;
    #[cfg(unix)]
    socket
        .set_reuse_port(true)
        .map_err(TransportError::SocketBind)?;
    Ok(())
}

fn apply_poll_timeout(socket: &UdpSocket) -> Result<()> {
    socket
        .set_read_timeout(Some(POLL_TIMEOUT))
        .map_err(TransportError::SocketFatal)
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}
