//! Classifies a raw line from the BP35C2 module into a tagged variant so
//! the session state machine never has to re-derive meaning from a
//! string prefix more than once.

use crate::error::ProtocolError;

/// One classified line from the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// The module echoing back a command we sent.
    Echo(Vec<u8>),
    Ok,
    Fail(Vec<u8>),
    /// `EVENT <code> ...` (code plus the remaining whitespace-separated args).
    Event { code: u32, args: Vec<Vec<u8>> },
    /// One `<field>:<value>` line inside an `EPANDESC` block.
    Epandesc { field: Vec<u8>, value: Vec<u8> },
    /// A fully parsed `ERXUDP` notification.
    Erxudp(Erxudp),
    Other(Vec<u8>),
}

/// A decoded `ERXUDP <src> <dst> <rport> <lport> <mac> <rssi> <secured> <side> <len> <payload>` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Erxudp {
    pub sender_ipv6: String,
    pub dest_ipv6: String,
    pub rport: u16,
    pub lport: u16,
    pub sender_mac: String,
    pub secured: bool,
    pub payload: Vec<u8>,
}

impl Line {
    /// Classify a line that has already been stripped of its trailing
    /// `\r\n` by the serial driver.
    pub fn classify(raw: &[u8]) -> Line {
        if raw == b"OK" {
            return Line::Ok;
        }
        if let Some(rest) = strip_prefix(raw, b"FAIL") {
            return Line::Fail(rest.to_vec());
        }
        if let Some(rest) = strip_prefix(raw, b"EVENT") {
            return parse_event(rest).unwrap_or_else(|| Line::Other(raw.to_vec()));
        }
        if let Some(rest) = strip_prefix(raw, b"ERXUDP") {
            return parse_erxudp(rest)
                .map(Line::Erxudp)
                .unwrap_or_else(|| Line::Other(raw.to_vec()));
        }
        // Checked ahead of the EPANDESC colon heuristic below: an echoed
        // `SKJOIN <ipv6>` or `SKLL64`-reply line carries colons of its own
        // (IPv6 addresses), and would otherwise be misread as an EPANDESC
        // field/value pair.
        if looks_like_echo(raw) {
            return Line::Echo(raw.to_vec());
        }
        if let Some(pos) = raw.iter().position(|&b| b == b':') {
            // EPANDESC detail lines ("  Channel:21", "  Pan ID:8888", ...)
            // are the only colon-delimited lines this protocol emits.
            let field = trim(&raw[..pos]).to_vec();
            let value = trim(&raw[pos + 1..]).to_vec();
            if !field.is_empty() {
                return Line::Epandesc { field, value };
            }
        }
        Line::Other(raw.to_vec())
    }
}

fn strip_prefix<'a>(raw: &'a [u8], prefix: &[u8]) -> Option<&'a [u8]> {
    raw.strip_prefix(prefix)
}

fn trim(b: &[u8]) -> &[u8] {
    let start = b.iter().position(|&c| c != b' ').unwrap_or(b.len());
    let end = b.iter().rposition(|&c| c != b' ').map(|i| i + 1).unwrap_or(start);
    &b[start..end]
}

fn parse_event(rest: &[u8]) -> Option<Line> {
    let rest = trim(rest);
    let mut parts = rest.split(|&b| b == b' ').filter(|p| !p.is_empty());
    let code_str = parts.next()?;
    let code = std::str::from_utf8(code_str).ok()?.parse::<u32>().ok()?;
    let args = parts.map(|p| p.to_vec()).collect();
    Some(Line::Event { code, args })
}

fn parse_erxudp(rest: &[u8]) -> Option<Erxudp> {
    let rest = trim(rest);
    // Exactly 9 space-separated header fields precede the payload; the
    // payload is everything after the 9th space, never re-tokenized.
    let mut start = 0usize;
    let mut fields = Vec::with_capacity(9);
    let mut spaces_seen = 0;
    for (i, &b) in rest.iter().enumerate() {
        if b == b' ' {
            fields.push(&rest[start..i]);
            start = i + 1;
            spaces_seen += 1;
            if spaces_seen == 9 {
                break;
            }
        }
    }
    if fields.len() < 9 {
        return None;
    }
    let payload = rest[start..].to_vec();

    let sender_ipv6 = std::str::from_utf8(fields[0]).ok()?.to_string();
    let dest_ipv6 = std::str::from_utf8(fields[1]).ok()?.to_string();
    let rport = u16::from_str_radix(std::str::from_utf8(fields[2]).ok()?, 16).ok()?;
    let lport = u16::from_str_radix(std::str::from_utf8(fields[3]).ok()?, 16).ok()?;
    let sender_mac = std::str::from_utf8(fields[4]).ok()?.to_string();
    let secured = fields[6] == b"1";

    Some(Erxudp {
        sender_ipv6,
        dest_ipv6,
        rport,
        lport,
        sender_mac,
        secured,
        payload,
    })
}

/// Heuristic: a line that starts with `SK` is almost certainly the
/// module echoing a command we just sent (every command this driver
/// issues is an `SKxxx` AT command).
fn looks_like_echo(raw: &[u8]) -> bool {
    raw.starts_with(b"SK")
}

/// Convenience used by the session state machine to reject an
/// unexpected classification with a typed error.
pub fn unexpected(line: &Line) -> ProtocolError {
    ProtocolError::UnexpectedEvent(format!("{:?}", line))
}
