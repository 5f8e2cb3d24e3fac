use super::{apply_poll_timeout, is_timeout, set_reuse, Datagram, READ_BUF_LEN};
use crate::error::{Result, TransportError};
use socket2::{Domain, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Listens on `0.0.0.0:port` for unicast replies (e.g. `GetRes` frames
/// sent back from a device that received a multicast request) and
/// forwards them on an `mpsc` channel until stopped.
pub struct UnicastReceiver {
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl UnicastReceiver {
    pub fn start(port: u16) -> Result<(UnicastReceiver, Receiver<Datagram>)> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, None).map_err(TransportError::SocketBind)?;
        set_reuse(&socket)?;
        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        socket
            .bind(&bind_addr.into())
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
                        log::warn!("unicast receive error: {}", e);
                        break;
                    }
                }
            }
        });

        Ok((
            UnicastReceiver {
                handle: Some(handle),
                stop,
            },
            rx,
        ))
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for UnicastReceiver {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// A connected UDP socket for sending frames to one fixed destination
/// (multicast group or a specific device's unicast address).
pub struct UnicastSender {
    socket: UdpSocket,
}

impl UnicastSender {
    pub fn connect(destination: SocketAddr) -> Result<UnicastSender> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).map_err(TransportError::SocketBind)?;
        socket.connect(destination).map_err(TransportError::SocketBind)?;
        Ok(UnicastSender { socket })
    }

    pub fn send(&self, data: &[u8]) -> Result<()> {
        self.socket.send(data).map_err(TransportError::SocketFatal)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn sender_delivers_to_bound_receiver() {
        let listener = UdpSocket::bind("127.0.0.1:0").unwrap();
        listener.set_read_timeout(Some(Duration::from_secs(1))).unwrap();
        let addr = listener.local_addr().unwrap();

        let sender = UnicastSender::connect(addr).unwrap();
        sender.send(b"hello").unwrap();

        let mut buf = [0u8; 16];
        let (len, _) = listener.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"hello");
    }
}
