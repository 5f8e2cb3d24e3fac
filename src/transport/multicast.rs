use super::{apply_poll_timeout, is_timeout, set_reuse, Datagram, READ_BUF_LEN};
use crate::error::{Result, TransportError};
use socket2::{Domain, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Listens on a multicast group (224.0.23.0:3610 for ECHONET Lite) and
/// forwards every received datagram on an `mpsc` channel until stopped.
pub struct MulticastReceiver {
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl MulticastReceiver {
    /// Bind `group:port` and start receiving on a background thread.
    pub fn start(group: Ipv4Addr, port: u16) -> Result<(MulticastReceiver, Receiver<Datagram>)> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, None).map_err(TransportError::SocketBind)?;
        set_reuse(&socket)?;
        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        socket
            .bind(&bind_addr.into())
            .map_err(TransportError::SocketBind)?;
        socket
            .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
            .map_err(TransportError::SocketBind)?;

        let socket: UdpSocket = socket.into();
        apply_poll_timeout(&socket)?;

        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();

        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; READ_BUF_LEN];
            while !thread_stop.load(Ordering::Relaxed) {
                match socket.recv_from(&mut buf) {
                    Ok((len, from)) if len > 0 => {
                        let datagram = Datagram {
                            data: buf[..len].to_vec(),
                            from,
                        };
                        if tx.send(datagram).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) if is_timeout(&e) => continue,
                    Err(e) => {
                        log::warn!("multicast receive error: {}", e);
                        break;
                    }
                }
            }
        });

        Ok((
            MulticastReceiver {
                handle: Some(handle),
                stop,
            },
            rx,
        ))
    }

    /// Signal the background thread to stop and wait for it to exit.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for MulticastReceiver {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// Helper used by callers that only need the local multicast address
/// ECHONET Lite reserves.
pub fn echonet_multicast_addr() -> SocketAddr {
    SocketAddr::new(Ipv4Addr::new(224, 0, 23, 0).into(), 3610)
}
