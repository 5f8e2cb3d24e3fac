//! BP35C2 session state machine: Active Scan, PANA authentication, and
//! reliable UDP request/response framing over the line-oriented serial
//! protocol.

use super::line::{unexpected, Erxudp, Line};
use crate::error::{ProtocolError, Result};
use crate::serial_line::LineTransport;
use std::time::{Duration, Instant};

/// ECHONET Lite's reserved UDP port, as carried in `ERXUDP`'s destination
/// port field.
const ECHONET_PORT: u16 = 0x0E1A;

const SCAN_DEADLINE: Duration = Duration::from_secs(30);
const JOIN_DEADLINE: Duration = Duration::from_secs(300);
const SEND_DEADLINE: Duration = Duration::from_secs(300);
const MAX_SCAN_DURATION: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Configured,
    Scanning,
    PanDescribed,
    Joined,
    Terminated,
}

/// The PAN coordinator descriptor produced by Active Scan and completed
/// by `SKLL64` address resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanDescriptor {
    pub channel: String,
    pub pan_id: String,
    pub mac_addr_hex: String,
    pub ipv6_addr: String,
}

pub struct Bp35c2Session {
    serial: Box<dyn LineTransport>,
    state: SessionState,
    descriptor: Option<PanDescriptor>,
}

impl Bp35c2Session {
    pub fn new(serial: impl LineTransport + 'static) -> Bp35c2Session {
        Bp35c2Session {
            serial: Box::new(serial),
            state: SessionState::Uninitialized,
            descriptor: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Test-only seam: force the session straight into `state` with a
    /// minimal descriptor, so callers in other modules can exercise
    /// `send_udp` without replaying the full connect flow.
    #[cfg(test)]
    pub fn force_state_for_test(&mut self, state: SessionState, ipv6_addr: &str) {
        self.state = state;
        self.descriptor = Some(PanDescriptor {
            ipv6_addr: ipv6_addr.to_string(),
            ..Default::default()
        });
    }

    /// Runs the full connect flow: validate credentials, configure the
    /// B-route identity, Active Scan, resolve the address, tune the
    /// radio to the found channel/PAN, and authenticate.
    pub fn connect(&mut self, route_id: &str, password: &str) -> Result<()> {
        if route_id.is_empty() || password.is_empty() {
            return Err(ProtocolError::EmptyCredentials.into());
        }

        let version = self.version()?;
        log::info!("BP35C2 firmware version: {}", version);

        self.set_password(password)?;
        self.set_route_id(route_id)?;
        self.state = SessionState::Configured;

        let descriptor = self.active_scan()?;
        self.state = SessionState::Scanning;

        let descriptor = self.resolve_address(descriptor)?;
        self.state = SessionState::PanDescribed;
        self.descriptor = Some(descriptor.clone());

        self.set_channel(&descriptor.channel)?;
        self.set_pan_id(&descriptor.pan_id)?;

        self.join(&descriptor.ipv6_addr)?;
        self.state = SessionState::Joined;

        Ok(())
    }

    /// `SKVER`, always issued first, logged, never gated on.
    fn version(&mut self) -> Result<String> {
        self.serial.send(b"SKVER\r\n")?;
        expect_echo(&mut self.serial)?;
        let reply = self.serial.recv_line()?;
        expect_ok(&mut self.serial)?;
        Ok(String::from_utf8_lossy(&reply).into_owned())
    }

    fn set_password(&mut self, password: &str) -> Result<()> {
        let cmd = format!("SKSETPWD C {}\r\n", password);
        self.serial.send(cmd.as_bytes())?;
        expect_echo(&mut self.serial)?;
        expect_ok(&mut self.serial)?;
        Ok(())
    }

    fn set_route_id(&mut self, route_id: &str) -> Result<()> {
        let cmd = format!("SKSETRBID {}\r\n", route_id);
        self.serial.send(cmd.as_bytes())?;
        expect_echo(&mut self.serial)?;
        expect_ok(&mut self.serial)?;
        Ok(())
    }

    fn set_channel(&mut self, channel: &str) -> Result<()> {
        let cmd = format!("SKSREG S2 {}\r\n", channel);
        self.serial.send(cmd.as_bytes())?;
        expect_echo(&mut self.serial)?;
        expect_ok(&mut self.serial)?;
        Ok(())
    }

    fn set_pan_id(&mut self, pan_id: &str) -> Result<()> {
        let cmd = format!("SKSREG S3 {}\r\n", pan_id);
        self.serial.send(cmd.as_bytes())?;
        expect_echo(&mut self.serial)?;
        expect_ok(&mut self.serial)?;
        Ok(())
    }

    /// Active Scan: try durations 4..=8, stopping at the first
    /// `EVENT 20` + `EPANDESC` block. `EVENT 22` means nothing was found
    /// at that duration; retry at the next duration up to the bound.
    fn active_scan(&mut self) -> Result<PanDescriptor> {
        let mut duration = 4u32;
        loop {
            if duration > MAX_SCAN_DURATION {
                return Err(ProtocolError::NoDescriptor.into());
            }

            let cmd = format!("SKSCAN 2 FFFFFFFF {} 0\r\n", duration);
            self.serial.send(cmd.as_bytes())?;
            expect_echo(&mut self.serial)?;
            expect_ok(&mut self.serial)?;

            let deadline = Instant::now() + SCAN_DEADLINE;
            match self.await_scan_result(deadline)? {
                Some(descriptor) => return Ok(descriptor),
                None => duration += 1,
            }
        }
    }

    /// Reads lines until `EVENT 22` (nothing found this round) or
    /// `EVENT 20` followed immediately by an `EPANDESC` block.
    fn await_scan_result(&mut self, deadline: Instant) -> Result<Option<PanDescriptor>> {
        loop {
            if Instant::now() > deadline {
                return Err(ProtocolError::DeadlineExceeded.into());
            }
            let line = match self.serial.recv_line() {
                Ok(l) => l,
                Err(_) if Instant::now() <= deadline => continue,
                Err(e) => return Err(e),
            };

            match Line::classify(&line) {
                Line::Event { code: 22, .. } => return Ok(None),
                Line::Event { code: 20, .. } => {
                    self.expect_epandesc_header(deadline)?;
                    return self.read_epandesc(deadline).map(Some);
                }
                _ => continue,
            }
        }
    }

    fn expect_epandesc_header(&mut self, deadline: Instant) -> Result<()> {
        loop {
            if Instant::now() > deadline {
                return Err(ProtocolError::DeadlineExceeded.into());
            }
            let line = self.serial.recv_line()?;
            if line.starts_with(b"EPANDESC") {
                return Ok(());
            }
        }
    }

    /// Reads the fixed-order `EPANDESC` detail block: `Channel`,
    /// `Channel Page`, `Pan ID`, `Addr`, `LQI`, `Side`, `PairID`. Order is
    /// load-bearing, this advances line by line rather than searching.
    fn read_epandesc(&mut self, deadline: Instant) -> Result<PanDescriptor> {
        let mut descriptor = PanDescriptor::default();

        let channel = self.recv_field(deadline)?;
        descriptor.channel = field_value(&channel, "Channel")?;
        let _channel_page = self.recv_field(deadline)?; // Channel Page, unused
        let pan_id = self.recv_field(deadline)?;
        descriptor.pan_id = field_value(&pan_id, "Pan ID")?;
        let addr = self.recv_field(deadline)?;
        descriptor.mac_addr_hex = field_value(&addr, "Addr")?;
        let _lqi = self.recv_field(deadline)?;
        let _side = self.recv_field(deadline)?;
        let _pair_id = self.recv_field(deadline)?;

        Ok(descriptor)
    }

    fn recv_field(&mut self, deadline: Instant) -> Result<Line> {
        loop {
            if Instant::now() > deadline {
                return Err(ProtocolError::DeadlineExceeded.into());
            }
            let line = self.serial.recv_line()?;
            return Ok(Line::classify(&line));
        }
    }

    fn resolve_address(&mut self, mut descriptor: PanDescriptor) -> Result<PanDescriptor> {
        let cmd = format!("SKLL64 {}\r\n", descriptor.mac_addr_hex);
        self.serial.send(cmd.as_bytes())?;
        expect_echo(&mut self.serial)?;
        let line = self.serial.recv_line()?;
        descriptor.ipv6_addr = String::from_utf8_lossy(&line).trim().to_string();
        Ok(descriptor)
    }

    /// `SKJOIN` and wait for `EVENT 25` (success) or `EVENT 24` (failure).
    /// Intermediate `EVENT 21`/`ERXUDP` lines carry the PANA handshake and
    /// are opaque to this layer.
    fn join(&mut self, ipv6_addr: &str) -> Result<()> {
        let cmd = format!("SKJOIN {}\r\n", ipv6_addr);
        self.serial.send(cmd.as_bytes())?;
        expect_echo(&mut self.serial)?;
        expect_ok(&mut self.serial)?;

        let deadline = Instant::now() + JOIN_DEADLINE;
        loop {
            if Instant::now() > deadline {
                return Err(ProtocolError::DeadlineExceeded.into());
            }
            let line = match self.serial.recv_line() {
                Ok(l) => l,
                Err(_) => continue,
            };
            match Line::classify(&line) {
                Line::Event { code: 25, .. } => return Ok(()),
                Line::Event { code: 24, .. } => return Err(ProtocolError::JoinFailed.into()),
                _ => continue,
            }
        }
    }

    /// Sends `payload` as a UDP datagram to the joined peer and blocks
    /// until the matching `ERXUDP` response (destination port 0x0E1A)
    /// arrives, retrying serial timeouts until `deadline`.
    pub fn send_udp(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        if self.state != SessionState::Joined {
            return Err(ProtocolError::NotJoined.into());
        }
        let descriptor = self.descriptor.clone().ok_or(ProtocolError::NotJoined)?;

        let mut cmd = format!(
            "SKSENDTO 1 {} 0E1A 1 0 {:04X} ",
            descriptor.ipv6_addr,
            payload.len()
        )
        .into_bytes();
        cmd.extend_from_slice(payload);
        cmd.extend_from_slice(b"\r\n");
        self.serial.send(&cmd)?;

        let deadline = Instant::now() + SEND_DEADLINE;
        loop {
            if Instant::now() > deadline {
                return Err(ProtocolError::DeadlineExceeded.into());
            }
            let line = match self.serial.recv_line() {
                Ok(l) => l,
                Err(_) => continue,
            };
            if let Line::Erxudp(Erxudp { lport, payload, .. }) = Line::classify(&line) {
                if lport == ECHONET_PORT {
                    return Ok(payload);
                }
                log::debug!("ignoring ERXUDP on port {:#06x}", lport);
            }
        }
    }

    /// Idempotent close: issues `SKTERM` only if currently `Joined`.
    pub fn close(&mut self) {
        if self.state == SessionState::Joined {
            if let Err(e) = self.serial.send(b"SKTERM\r\n") {
                log::warn!("SKTERM failed: {}", e);
            }
        }
        self.state = SessionState::Terminated;
    }
}

impl Drop for Bp35c2Session {
    fn drop(&mut self) {
        self.close();
    }
}

fn expect_echo(serial: &mut dyn LineTransport) -> Result<()> {
    let line = serial.recv_line()?;
    match Line::classify(&line) {
        Line::Echo(_) => Ok(()),
        other => Err(unexpected(&other).into()),
    }
}

fn expect_ok(serial: &mut dyn LineTransport) -> Result<()> {
    let line = serial.recv_line()?;
    match Line::classify(&line) {
        Line::Ok => Ok(()),
        other => Err(unexpected(&other).into()),
    }
}

fn field_value(line: &Line, expected_field: &str) -> Result<String> {
    match line {
        Line::Epandesc { field, value } if field == expected_field.as_bytes() => {
            Ok(String::from_utf8_lossy(value).into_owned())
        }
        other => Err(unexpected(other).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SerialError;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// A scripted in-memory stand-in for the serial line: `recv_line`
    /// hands back canned lines in order and reports a timeout once
    /// exhausted; every `send` is recorded for assertions on which AT
    /// commands the session actually issued.
    struct ScriptedTransport {
        lines: VecDeque<Vec<u8>>,
        sent: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedTransport {
        fn new(lines: Vec<Vec<u8>>) -> (ScriptedTransport, Arc<Mutex<Vec<String>>>) {
            let sent = Arc::new(Mutex::new(Vec::new()));
            (
                ScriptedTransport {
                    lines: lines.into_iter().collect(),
                    sent: sent.clone(),
                },
                sent,
            )
        }
    }

    impl LineTransport for ScriptedTransport {
        fn send(&mut self, line: &[u8]) -> Result<()> {
            self.sent
                .lock()
                .expect("sent log lock poisoned")
                .push(String::from_utf8_lossy(line).trim_end().to_string());
            Ok(())
        }

        fn recv_line(&mut self) -> Result<Vec<u8>> {
            self.lines.pop_front().ok_or_else(|| SerialError::Timeout.into())
        }
    }

    fn scan_round(duration: u32, found: bool) -> Vec<Vec<u8>> {
        let mut lines = vec![
            format!("SKSCAN 2 FFFFFFFF {} 0", duration).into_bytes(),
            b"OK".to_vec(),
        ];
        if found {
            lines.push(b"EVENT 20".to_vec());
            lines.push(b"EPANDESC".to_vec());
            lines.push(b"  Channel:21".to_vec());
            lines.push(b"  Channel Page:09".to_vec());
            lines.push(b"  Pan ID:8888".to_vec());
            lines.push(b"  Addr:001D129012345678".to_vec());
            lines.push(b"  LQI:A0".to_vec());
            lines.push(b"  Side:0".to_vec());
            lines.push(b"  PairID:12345678".to_vec());
        } else {
            lines.push(b"EVENT 22".to_vec());
        }
        lines
    }

    #[test]
    fn empty_credentials_are_rejected_before_touching_serial() {
        let (transport, sent) = ScriptedTransport::new(vec![]);
        let mut session = Bp35c2Session::new(transport);
        assert!(matches!(
            session.connect("", "pw"),
            Err(crate::error::Error::Protocol(ProtocolError::EmptyCredentials))
        ));
        assert!(matches!(
            session.connect("id", ""),
            Err(crate::error::Error::Protocol(ProtocolError::EmptyCredentials))
        ));
        // Neither rejected attempt should have written anything to the wire.
        assert!(sent.lock().unwrap().is_empty());
    }

    /// S5: three `EVENT 22` rounds at durations 4, 5, 6, then a find at 7.
    #[test]
    fn s5_active_scan_retries_then_returns_descriptor() {
        let mut lines = Vec::new();
        lines.extend(scan_round(4, false));
        lines.extend(scan_round(5, false));
        lines.extend(scan_round(6, false));
        lines.extend(scan_round(7, true));
        let (transport, sent) = ScriptedTransport::new(lines);
        let mut session = Bp35c2Session::new(transport);

        let descriptor = session.active_scan().expect("duration 7 should find a PAN");
        assert_eq!(descriptor.channel, "21");
        assert_eq!(descriptor.pan_id, "8888");
        assert_eq!(descriptor.mac_addr_hex, "001D129012345678");

        let commands = sent.lock().unwrap();
        assert_eq!(
            commands.iter().filter(|c| c.starts_with("SKSCAN")).count(),
            4,
            "duration 9 must never be attempted once duration 7 finds a PAN"
        );
        assert!(!commands.iter().any(|c| c.contains(" 8 0") || c.contains(" 9 0")));
    }

    /// P8: Active Scan never issues a scan past duration 8.
    #[test]
    fn p8_active_scan_stops_at_duration_eight() {
        let mut lines = Vec::new();
        for d in 4..=8 {
            lines.extend(scan_round(d, false));
        }
        let (transport, sent) = ScriptedTransport::new(lines);
        let mut session = Bp35c2Session::new(transport);

        assert!(matches!(
            session.active_scan(),
            Err(crate::error::Error::Protocol(ProtocolError::NoDescriptor))
        ));

        let commands = sent.lock().unwrap();
        let scans: Vec<&String> = commands.iter().filter(|c| c.starts_with("SKSCAN")).collect();
        assert_eq!(scans.len(), 5, "durations 4 through 8 inclusive, no more");
        assert!(!scans.iter().any(|c| c.contains("FFFFFFFF 9 0")));
    }

    fn erxudp_line(lport: u16, payload: &[u8]) -> Vec<u8> {
        let header = format!(
            "ERXUDP FE80:0000:0000:0000:021C:6400:030C:12A4 \
             FE80:0000:0000:0000:021D:1291:0000:0574 0E1A {:04X} \
             001C6400030C12A4 1 0 0 {:04X} ",
            lport,
            payload.len()
        );
        let mut line = header.into_bytes();
        line.extend_from_slice(payload);
        line
    }

    /// P9 / S4: `send_udp` skips an `ERXUDP` on the PANA port and returns
    /// only the payload addressed to the ECHONET Lite port.
    #[test]
    fn p9_send_udp_filters_by_destination_port() {
        let response_payload: Vec<u8> = vec![
            0x10, 0x81, 0x00, 0x01, 0x02, 0x88, 0x01, 0x05, 0xFF, 0x01, 0x72, 0x01, 0xE7, 0x04, 0x00, 0x00, 0x01,
            0xF8,
        ];
        let lines = vec![
            b"EVENT 21".to_vec(),
            b"OK".to_vec(),
            erxudp_line(0x02CC, b"opaque pana noise"),
            erxudp_line(ECHONET_PORT, &response_payload),
        ];
        let (transport, _sent) = ScriptedTransport::new(lines);
        let mut session = Bp35c2Session::new(transport);
        session.state = SessionState::Joined;
        session.descriptor = Some(PanDescriptor {
            channel: "21".into(),
            pan_id: "8888".into(),
            mac_addr_hex: "001D129012345678".into(),
            ipv6_addr: "FE80:0000:0000:0000:021D:1291:0000:0574".into(),
        });

        let request = vec![0x10, 0x81, 0x00, 0x01, 0x05, 0xFF, 0x01, 0x02, 0x88, 0x01, 0x62, 0x01, 0xE7, 0x00];
        let response = session.send_udp(&request).expect("ECHONET-port ERXUDP should be returned");
        assert_eq!(response, response_payload);
    }

    #[test]
    fn send_udp_requires_joined_state() {
        let (transport, _sent) = ScriptedTransport::new(vec![]);
        let mut session = Bp35c2Session::new(transport);
        assert!(matches!(
            session.send_udp(&[]),
            Err(crate::error::Error::Protocol(ProtocolError::NotJoined))
        ));
    }

    fn connect_script(join_event: u32) -> Vec<Vec<u8>> {
        let mut lines = vec![
            b"SKVER".to_vec(),
            b"EVER 1.2.10".to_vec(),
            b"OK".to_vec(),
            b"SKSETPWD C hunter2hunter2".to_vec(),
            b"OK".to_vec(),
            b"SKSETRBID 00112233445566778899AABBCCDDEEFF".to_vec(),
            b"OK".to_vec(),
        ];
        lines.extend(scan_round(4, true));
        lines.push(b"SKLL64 001D129012345678".to_vec());
        lines.push(b"FE80:0000:0000:0000:021D:1291:0000:0574".to_vec());
        lines.push(b"SKSREG S2 21".to_vec());
        lines.push(b"OK".to_vec());
        lines.push(b"SKSREG S3 8888".to_vec());
        lines.push(b"OK".to_vec());
        lines.push(b"SKJOIN FE80:0000:0000:0000:021D:1291:0000:0574".to_vec());
        lines.push(b"OK".to_vec());
        lines.push(b"EVENT 21".to_vec());
        lines.push(format!("EVENT {}", join_event).into_bytes());
        lines
    }

    /// P10: a join terminated by `EVENT 25` reaches `Joined`.
    #[test]
    fn p10_join_success_reaches_joined_state() {
        let (transport, _sent) = ScriptedTransport::new(connect_script(25));
        let mut session = Bp35c2Session::new(transport);
        session.connect("00112233445566778899AABBCCDDEEFF", "hunter2hunter2").unwrap();
        assert_eq!(session.state(), SessionState::Joined);
    }

    /// P10: a join terminated by `EVENT 24` yields `JoinFailed` and never
    /// reaches `Joined`.
    #[test]
    fn p10_join_failure_yields_join_failed() {
        let (transport, _sent) = ScriptedTransport::new(connect_script(24));
        let mut session = Bp35c2Session::new(transport);
        let err = session.connect("00112233445566778899AABBCCDDEEFF", "hunter2hunter2").unwrap_err();
        assert!(matches!(err, crate::error::Error::Protocol(ProtocolError::JoinFailed)));
        assert_ne!(session.state(), SessionState::Joined);
    }

    #[test]
    fn close_is_idempotent_and_only_sends_skterm_when_joined() {
        let (transport, sent) = ScriptedTransport::new(vec![]);
        let mut session = Bp35c2Session::new(transport);
        session.close();
        session.close();
        assert!(sent.lock().unwrap().is_empty(), "SKTERM must not be sent outside the Joined state");

        let (transport, sent) = ScriptedTransport::new(vec![]);
        let mut session = Bp35c2Session::new(transport);
        session.state = SessionState::Joined;
        session.close();
        session.close();
        assert_eq!(sent.lock().unwrap().len(), 1, "a second close() must not resend SKTERM");
    }
}
