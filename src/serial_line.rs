//! Line-oriented serial driver for the BP35C2 Wi-SUN module: 115200 8N1,
//! one second read timeout, lines delimited by `\r\n`. Unlike a typical
//! text protocol, a line may carry binary payload bytes (an `ERXUDP`
//! datagram) after its ASCII header, so framing is strictly "read until
//! the CRLF terminator", never "read until the first non-ASCII byte".

use crate::error::{Result, SerialError};
use std::io::{Read, Write};
use std::time::Duration;

const BAUD_RATE: u32 = 115_200;
const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// The line-oriented transport seam the BP35C2 session talks through.
/// `SerialLine` is the only production implementation; tests substitute
/// a scripted in-memory transport so the session state machine can be
/// exercised without a physical Wi-SUN module.
pub trait LineTransport: Send {
    fn send(&mut self, line: &[u8]) -> Result<()>;
    fn recv_line(&mut self) -> Result<Vec<u8>>;
}

pub struct SerialLine {
    port: Box<dyn serialport::SerialPort>,
    buf: Vec<u8>,
    send_seq: u64,
    recv_seq: u64,
}

impl SerialLine {
    /// Open `path` at 115200-8N1 with a one second read timeout.
    pub fn open(path: &str) -> Result<SerialLine> {
        let port = serialport::new(path, BAUD_RATE)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(SerialError::Open)?;

        Ok(SerialLine {
            port,
            buf: Vec::with_capacity(4096),
            send_seq: 0,
            recv_seq: 0,
        })
    }

    /// Send a command line. `line` should already end with `\r\n`.
    pub fn send(&mut self, line: &[u8]) -> Result<()> {
        self.send_seq += 1;
        log::debug!("send[{}]: {}", self.send_seq, String::from_utf8_lossy(line));
        self.port.write_all(line).map_err(SerialError::from)?;
        Ok(())
    }

    /// Read one line, trimmed of the trailing `\r\n`. Binary payload bytes
    /// embedded after a text header are preserved verbatim.
    pub fn recv_line(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(pos) = find_crlf(&self.buf) {
                let line = self.buf[..pos].to_vec();
                self.buf.drain(..pos + 2);
                self.recv_seq += 1;
                log::debug!("recv[{}]: {}", self.recv_seq, String::from_utf8_lossy(&line));
                return Ok(line);
            }

            let mut chunk = [0u8; 256];
            match self.port.read(&mut chunk) {
                Ok(0) => continue,
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) => return Err(SerialError::from(e).into()),
            }
        }
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

impl LineTransport for SerialLine {
    fn send(&mut self, line: &[u8]) -> Result<()> {
        SerialLine::send(self, line)
    }

    fn recv_line(&mut self) -> Result<Vec<u8>> {
        SerialLine::recv_line(self)
    }
}
