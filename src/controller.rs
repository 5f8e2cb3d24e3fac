//! `ControllerNode`: owns the LAN-side listeners, a TID counter, a node
//! list, and the class dictionary; drives discovery and periodic polling
//! and dispatches inbound frames to the metrics sink.

use crate::class_dictionary::ClassDictionary;
use crate::decode::{self, DecodedObject};
use crate::error::Result;
use crate::frame::{Esv, Frame};
use crate::metrics::MetricsSink;
use crate::object::Object;
use crate::transport::{multicast::echonet_multicast_addr, Datagram, MulticastReceiver, UnicastReceiver, UnicastSender};

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const ECHONET_PORT: u16 = 3610;
const STARTUP_SETTLE: Duration = Duration::from_secs(3);
const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// A discovered node profile and the device objects it has announced.
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub devices: Vec<Object>,
}

/// `source address → Node`, mutated only by listener dispatch threads.
#[derive(Debug, Clone, Default)]
pub struct NodeList(HashMap<SocketAddr, Node>);

impl NodeList {
    pub fn add(&mut self, addr: SocketAddr, object: Object) {
        self.0.entry(addr).or_default().devices.push(object);
    }

    pub fn snapshot(&self) -> HashMap<SocketAddr, Node> {
        self.0.clone()
    }
}

pub struct ControllerNode {
    sender: UnicastSender,
    dictionary: Arc<ClassDictionary>,
    metrics: Arc<dyn MetricsSink>,
    tid: u16,
    node_list: Arc<Mutex<NodeList>>,
    stop: Arc<AtomicBool>,
    multicast_receiver: Option<MulticastReceiver>,
    unicast_receiver: Option<UnicastReceiver>,
}

impl ControllerNode {
    pub fn new(dictionary: Arc<ClassDictionary>, metrics: Arc<dyn MetricsSink>) -> Result<ControllerNode> {
        let sender = UnicastSender::connect(echonet_multicast_addr())?;
        Ok(ControllerNode {
            sender,
            dictionary,
            metrics,
            tid: 0,
            node_list: Arc::new(Mutex::new(NodeList::default())),
            stop: Arc::new(AtomicBool::new(false)),
            multicast_receiver: None,
            unicast_receiver: None,
        })
    }

    pub fn node_list(&self) -> Arc<Mutex<NodeList>> {
        self.node_list.clone()
    }

    fn next_tid(&mut self) -> u16 {
        let tid = self.tid;
        self.tid = self.tid.wrapping_add(1);
        tid
    }

    /// Starts both listeners on their own threads, runs the startup
    /// announcement sequence, then blocks running the 30 s poll loop
    /// until `stop()` is called from another thread.
    pub fn start(&mut self) -> Result<()> {
        let multicast_rx = self.spawn_multicast_listener()?;
        let unicast_rx = self.spawn_unicast_listener()?;

        self.startup_sequence()?;

        self.poll_loop(multicast_rx, unicast_rx);
        Ok(())
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    fn spawn_multicast_listener(&mut self) -> Result<Receiver<Datagram>> {
        let addr = echonet_multicast_addr();
        let ip = match addr.ip() {
            std::net::IpAddr::V4(v4) => v4,
            _ => unreachable!("echonet multicast address is always IPv4"),
        };
        let (receiver, rx) = MulticastReceiver::start(ip, ECHONET_PORT)?;
        self.multicast_receiver = Some(receiver);
        Ok(rx)
    }

    fn spawn_unicast_listener(&mut self) -> Result<Receiver<Datagram>> {
        let (receiver, rx) = UnicastReceiver::start(ECHONET_PORT)?;
        self.unicast_receiver = Some(receiver);
        Ok(rx)
    }

    /// Emit, in order with the same TID: Inf (announce), InfReq (v1.0
    /// discovery), Get (v1.1 profile query). Then sleep to let peers
    /// respond before the poll loop starts dispatching.
    fn startup_sequence(&mut self) -> Result<()> {
        let tid = self.next_tid();
        self.send_frame(Frame::announce(tid))?;
        self.send_frame(Frame::inf_req(tid))?;
        self.send_frame(Frame::profile_get(tid))?;
        std::thread::sleep(STARTUP_SETTLE);
        Ok(())
    }

    fn send_frame(&mut self, frame: Frame) -> Result<()> {
        self.sender.send(&frame.serialize())
    }

    /// Drains both listener channels with a short poll, dispatching each
    /// datagram, and re-broadcasts an aircon Get every 30 s. Runs until
    /// `stop()` flips the cancellation flag.
    fn poll_loop(&mut self, multicast_rx: Receiver<Datagram>, unicast_rx: Receiver<Datagram>) {
        let mut last_poll = std::time::Instant::now();

        while !self.stop.load(Ordering::Relaxed) {
            if let Ok(datagram) = multicast_rx.try_recv() {
                self.dispatch(datagram);
            }
            if let Ok(datagram) = unicast_rx.try_recv() {
                self.dispatch(datagram);
            }

            if last_poll.elapsed() >= POLL_INTERVAL {
                let tid = self.next_tid();
                if let Err(e) = self.send_frame(Frame::aircon_get(tid)) {
                    log::warn!("periodic poll send failed: {}", e);
                }
                last_poll = std::time::Instant::now();
            }

            std::thread::sleep(Duration::from_millis(50));
        }
    }

    /// Parse, decode, and act on one inbound datagram. Never panics or
    /// propagates: malformed frames and decode failures are logged and
    /// dropped.
    fn dispatch(&mut self, datagram: Datagram) {
        let frame = match Frame::parse(&datagram.data) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("dropping unparsable frame from {}: {}", datagram.from, e);
                return;
            }
        };

        let target = frame.target_object();
        let class_info = self.dictionary.get(target.class_group, target.class);
        log::debug!("[{}] {:?} {} ({})", datagram.from, frame.esv, target, class_info.desc);

        let decoded = decode::decode(target, &frame.properties);

        match frame.esv {
            Esv::Inf => {
                let mut nodes = self.node_list.lock().expect("node list lock poisoned");
                nodes.add(datagram.from, target);
            }
            Esv::GetRes => {
                if let DecodedObject::Aircon(state) = decoded {
                    let ip = datagram.from.ip().to_string();
                    let location = state.location.label();
                    self.metrics.publish(
                        "home_aircon_temperature",
                        &[("ip", ip.as_str()), ("location", location.as_str()), ("type", "room")],
                        state.internal_temp_c,
                    );
                    self.metrics.publish(
                        "home_aircon_temperature",
                        &[("ip", ip.as_str()), ("location", location.as_str()), ("type", "outside")],
                        state.outdoor_temp_c,
                    );
                }
            }
            esv if esv.is_negative_response() => {
                log::warn!("negative response from {}: {:?}", datagram.from, frame.esv);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Object;

    #[test]
    fn node_list_groups_devices_by_address() {
        let mut list = NodeList::default();
        let addr: SocketAddr = "192.0.2.1:3610".parse().unwrap();
        list.add(addr, Object::NODE_PROFILE);
        list.add(addr, Object::new(0x01, 0x30, 0x01));

        let snapshot = list.snapshot();
        assert_eq!(snapshot[&addr].devices.len(), 2);
    }
}
