//! The ECHONET Lite fixed-format frame: parsing, serialization, and the
//! canonical request builders used by the controller and the smart meter
//! client.
//!
//! ```text
//! EHD1(1)=0x10 │ EHD2(1)=0x81 │ TID(2) │ SEOJ(3) │ DEOJ(3) │ ESV(1) │ OPC(1) │ (EPC,PDC,EDT)*OPC
//! ```

use crate::error::{CodecError, Result};
use crate::object::Object;
use crate::property::Property;

const EHD1: u8 = 0x10;
const EHD2_FIXED: u8 = 0x81;

/// Echonet service code, the verb of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Esv {
    SetI,
    SetC,
    Get,
    InfReq,
    SetGet,
    SetRes,
    GetRes,
    Inf,
    InfC,
    InfCRes,
    SetGetRes,
    SetISna,
    SetCSna,
    GetSna,
    InfSna,
    SetGetSna,
}

impl Esv {
    pub fn from_byte(b: u8) -> Option<Esv> {
        use Esv::*;
        Some(match b {
            0x60 => SetI,
            0x61 => SetC,
            0x62 => Get,
            0x63 => InfReq,
            0x6E => SetGet,
            0x71 => SetRes,
            0x72 => GetRes,
            0x73 => Inf,
            0x74 => InfC,
            0x7A => InfCRes,
            0x7E => SetGetRes,
            0x50 => SetISna,
            0x51 => SetCSna,
            0x52 => GetSna,
            0x53 => InfSna,
            0x5E => SetGetSna,
            _ => return None,
        })
    }

    pub fn to_byte(self) -> u8 {
        use Esv::*;
        match self {
            SetI => 0x60,
            SetC => 0x61,
            Get => 0x62,
            InfReq => 0x63,
            SetGet => 0x6E,
            SetRes => 0x71,
            GetRes => 0x72,
            Inf => 0x73,
            InfC => 0x74,
            InfCRes => 0x7A,
            SetGetRes => 0x7E,
            SetISna => 0x50,
            SetCSna => 0x51,
            GetSna => 0x52,
            InfSna => 0x53,
            SetGetSna => 0x5E,
        }
    }

    /// True for the "response/notification" group (SetRes..SetGetRes);
    /// these carry data that *originates* from SEOJ. Requests and negative
    /// responses carry data describing what was asked of DEOJ.
    pub fn is_response_or_notification(self) -> bool {
        use Esv::*;
        matches!(self, SetRes | GetRes | Inf | InfC | InfCRes | SetGetRes)
    }

    pub fn is_request(self) -> bool {
        use Esv::*;
        matches!(self, SetI | SetC | Get | InfReq | SetGet)
    }

    pub fn is_negative_response(self) -> bool {
        use Esv::*;
        matches!(self, SetISna | SetCSna | GetSna | InfSna | SetGetSna)
    }
}

/// A fully parsed ECHONET Lite fixed-format frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub tid: u16,
    pub seoj: Object,
    pub deoj: Object,
    pub esv: Esv,
    pub properties: Vec<Property>,
}

impl Frame {
    pub fn new(tid: u16, seoj: Object, deoj: Object, esv: Esv, properties: Vec<Property>) -> Self {
        Frame {
            tid,
            seoj,
            deoj,
            esv,
            properties,
        }
    }

    /// The object whose data this frame actually describes: SEOJ for a
    /// response/notification, DEOJ for a request.
    pub fn target_object(&self) -> Object {
        if self.esv.is_response_or_notification() {
            self.seoj
        } else {
            self.deoj
        }
    }

    /// Parse a raw byte sequence into a `Frame`. Single pass; slices into
    /// `data` rather than allocating per property (the data is copied once
    /// into each `Property`, preserving order).
    pub fn parse(data: &[u8]) -> Result<Frame> {
        if data.len() < 9 {
            return Err(CodecError::TooShort(data.len()).into());
        }
        if data[0] != EHD1 || data[1] != EHD2_FIXED {
            return Err(CodecError::BadHeader.into());
        }

        if data.len() < 12 {
            return Err(CodecError::TooShort(data.len()).into());
        }

        let tid = u16::from_be_bytes([data[2], data[3]]);

        let esv_byte = data[10];
        let esv = Esv::from_byte(esv_byte).ok_or(CodecError::BadHeader)?;
        let opc = data[11] as usize;

        let mut properties = Vec::with_capacity(opc);
        let mut offset = 12usize;
        for _ in 0..opc {
            if offset + 2 > data.len() {
                return Err(CodecError::BadLength.into());
            }
            let epc = data[offset];
            let pdc = data[offset + 1] as usize;
            let start = offset + 2;
            let end = start + pdc;
            if end > data.len() {
                return Err(CodecError::BadLength.into());
            }
            properties.push(Property::new(epc, data[start..end].to_vec()));
            offset = end;
        }

        Ok(Frame {
            tid,
            seoj: Object::from_bytes([data[4], data[5], data[6]]),
            deoj: Object::from_bytes([data[7], data[8], data[9]]),
            esv,
            properties,
        })
    }

    /// Serialize this frame to its wire form. `OPC` is always computed
    /// from `properties.len()`, never stored independently.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(12 + self.properties.len() * 2);
        out.push(EHD1);
        out.push(EHD2_FIXED);
        out.extend_from_slice(&self.tid.to_be_bytes());
        out.extend_from_slice(&self.seoj.to_bytes());
        out.extend_from_slice(&self.deoj.to_bytes());
        out.push(self.esv.to_byte());
        out.push(self.properties.len() as u8);
        for p in &self.properties {
            out.push(p.code);
            out.push(p.length());
            out.extend_from_slice(&p.data);
        }
        out
    }

    /// Announce this controller to the network: `INF` from/to the node
    /// profile carrying an instance-list-notification for ourselves.
    pub fn announce(tid: u16) -> Frame {
        Frame::new(
            tid,
            Object::NODE_PROFILE,
            Object::NODE_PROFILE,
            Esv::Inf,
            vec![Property::new(0xD5, vec![0x01, 0x05, 0xFF, 0x01])],
        )
    }

    /// v1.0-style discovery: request an instance-list notification from
    /// every node profile on the network.
    pub fn inf_req(tid: u16) -> Frame {
        Frame::new(
            tid,
            Object::CONTROLLER,
            Object::NODE_PROFILE,
            Esv::InfReq,
            vec![Property::empty(0xD5)],
        )
    }

    /// v1.1-style profile query: Get the standard node-profile properties.
    pub fn profile_get(tid: u16) -> Frame {
        let codes = [0x80, 0x82, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7, 0x9F];
        Frame::new(
            tid,
            Object::CONTROLLER,
            Object::NODE_PROFILE,
            Esv::Get,
            codes.iter().map(|&c| Property::empty(c)).collect(),
        )
    }

    /// Query a Home Air Conditioner's location and measured temperatures.
    pub fn aircon_get(tid: u16) -> Frame {
        let codes = [0x81, 0x83, 0xBB, 0xBE];
        Frame::new(
            tid,
            Object::CONTROLLER,
            Object::new(Object::HOME_AIRCON_GROUP, Object::HOME_AIRCON_CLASS, 0x01),
            Esv::Get,
            codes.iter().map(|&c| Property::empty(c)).collect(),
        )
    }

    /// Query the Low-Voltage Smart Meter's instantaneous power.
    pub fn instant_power_get(tid: u16) -> Frame {
        Frame::new(
            tid,
            Object::CONTROLLER,
            Object::new(Object::SMART_METER_GROUP, Object::SMART_METER_CLASS, 0x01),
            Esv::Get,
            vec![Property::empty(0xE7)],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &str) -> Vec<u8> {
        bytes
            .split_whitespace()
            .map(|b| u8::from_str_radix(b, 16).unwrap())
            .collect()
    }

    #[test]
    fn too_short_is_rejected() {
        assert!(matches!(
            Frame::parse(&[0x10, 0x81, 0, 0]),
            Err(crate::error::Error::Codec(CodecError::TooShort(_)))
        ));
    }

    #[test]
    fn bad_header_is_rejected() {
        let mut bytes = Frame::announce(0).serialize();
        bytes[0] = 0x20;
        assert!(matches!(
            Frame::parse(&bytes),
            Err(crate::error::Error::Codec(CodecError::BadHeader))
        ));
    }

    #[test]
    fn s1_announce_matches_canonical_bytes() {
        let expected = hex("10 81 00 01 0e f0 01 0e f0 01 73 01 d5 04 01 05 ff 01");
        assert_eq!(Frame::announce(1).serialize(), expected);
    }

    #[test]
    fn s2_inf_req_and_profile_get_match_canonical_bytes() {
        let inf_req = hex("10 81 00 01 05 ff 01 0e f0 01 63 01 d5 00");
        assert_eq!(Frame::inf_req(1).serialize(), inf_req);

        let get = hex("10 81 00 01 05 ff 01 0e f0 01 62 08 80 00 82 00 d3 00 d4 00 d5 00 d6 00 d7 00 9f 00");
        assert_eq!(Frame::profile_get(1).serialize(), get);
    }

    #[test]
    fn s3_aircon_get_matches_canonical_bytes() {
        let expected = hex("10 81 00 00 05 ff 01 01 30 01 62 04 81 00 83 00 bb 00 be 00");
        assert_eq!(Frame::aircon_get(0).serialize(), expected);
    }

    #[test]
    fn p1_every_builder_round_trips() {
        for f in [
            Frame::announce(7),
            Frame::inf_req(7),
            Frame::profile_get(7),
            Frame::aircon_get(7),
            Frame::instant_power_get(7),
        ] {
            let bytes = f.serialize();
            assert_eq!(Frame::parse(&bytes).unwrap(), f);
        }
    }

    #[test]
    fn p2_parse_then_serialize_is_identity() {
        let original = hex(
            "10 81 00 00 01 30 01 05 ff 01 72 04 81 01 41 83 11 fe 00 00 08 60 f1 89 30 6d f5 00 00 00 00 00 00 00 bb 01 1c be 01 19",
        );
        let frame = Frame::parse(&original).unwrap();
        assert_eq!(frame.serialize(), original);
    }

    #[test]
    fn p3_opc_equals_property_count() {
        let f = Frame::profile_get(1);
        let bytes = f.serialize();
        assert_eq!(bytes[11] as usize, f.properties.len());
    }

    #[test]
    fn target_object_picks_seoj_for_responses_and_deoj_for_requests() {
        let get = Frame::aircon_get(0);
        assert_eq!(get.target_object(), get.deoj);

        let res = Frame::new(0, Object::CONTROLLER, Object::NODE_PROFILE, Esv::GetRes, vec![]);
        assert_eq!(res.target_object(), res.seoj);
    }
}
