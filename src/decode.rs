//! Property decoders: turn an object's class plus its ordered raw
//! properties into a typed `DecodedObject`. Dispatch is two-level
//! (class-group, class) → property code; an unrecognized class falls back
//! to `DecodedObject::Raw`, carrying the properties unchanged.

use crate::error::DecodeError;
use crate::object::{Location, Object};
use crate::property::Property;
use byteorder::{BigEndian, ByteOrder};

/// The decoded state of whatever object produced a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedObject {
    Aircon(AirconState),
    SmartMeter(SmartMeterState),
    NodeProfile(NodeProfileState),
    Raw(Vec<Property>),
}

/// Home Air Conditioner (0x01, 0x30) state decoded from a property list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AirconState {
    pub location: Location,
    pub internal_temp_c: f64,
    pub outdoor_temp_c: f64,
}

/// Low-Voltage Smart Meter (0x02, 0x88) state. Only instantaneous power is
/// promoted to a typed field; other recognized meter properties (cumulative
/// energy, current, etc.) are retained raw.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SmartMeterState {
    pub instant_power_w: Option<u32>,
    pub raw: Vec<Property>,
}

/// Node profile (0x0E, 0xF0) notification contents. None of these produce
/// structured state beyond the instance list; they exist mostly to be
/// logged by the controller.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeProfileState {
    pub operation_status_on: Option<bool>,
    pub instance_list: Vec<Object>,
    pub raw: Vec<Property>,
}

/// Decode `properties` under the given class. Per-property decode
/// failures (bad length) are soft: the property is skipped and decoding
/// continues with the rest of the frame, matching the original system's
/// tolerance for malformed individual properties.
pub fn decode(class: Object, properties: &[Property]) -> DecodedObject {
    if class.is_home_aircon() {
        DecodedObject::Aircon(decode_aircon(properties))
    } else if class.is_smart_meter() {
        DecodedObject::SmartMeter(decode_smart_meter(properties))
    } else if class.is_node_profile() {
        DecodedObject::NodeProfile(decode_node_profile(properties))
    } else {
        DecodedObject::Raw(properties.to_vec())
    }
}

fn decode_aircon(properties: &[Property]) -> AirconState {
    let mut state = AirconState {
        location: Location {
            code: crate::object::LocationCode::Unknown,
            number: 0,
            free_form: false,
        },
        internal_temp_c: 0.0,
        outdoor_temp_c: 0.0,
    };

    for p in properties {
        match p.code {
            0x81 => match expect_len(p, 1) {
                Ok(()) => state.location = Location::decode(p.data[0]),
                Err(_) => continue,
            },
            0x83 => {
                // ID: leading byte 0xFE marks a manufacturer-code + id
                // payload; other leading bytes are carried as-is. Neither
                // is promoted to a typed field, so decoding is a no-op
                // beyond the length check.
                if p.data.is_empty() {
                    continue;
                }
            }
            0xBB => match expect_len(p, 1) {
                // The source treats this byte as unsigned, not the signed
                // interpretation ECHONET Lite specifies. Reproduced here
                // deliberately to match the original's behavior.
                Ok(()) => state.internal_temp_c = p.data[0] as f64,
                Err(_) => continue,
            },
            0xBE => match expect_len(p, 1) {
                Ok(()) => state.outdoor_temp_c = p.data[0] as f64,
                Err(_) => continue,
            },
            _ => {}
        }
    }

    state
}

fn decode_smart_meter(properties: &[Property]) -> SmartMeterState {
    let mut state = SmartMeterState::default();

    for p in properties {
        match p.code {
            0xE7 if p.length() == 4 => {
                state.instant_power_w = Some(BigEndian::read_u32(&p.data));
            }
            _ => state.raw.push(p.clone()),
        }
    }

    state
}

fn decode_node_profile(properties: &[Property]) -> NodeProfileState {
    let mut state = NodeProfileState::default();

    for p in properties {
        match p.code {
            0x80 if !p.data.is_empty() => {
                state.operation_status_on = Some(p.data[0] == 0x30);
            }
            0xD5 | 0xD6 if !p.data.is_empty() => {
                let count = p.data[0] as usize;
                let rest = &p.data[1..];
                state.instance_list = rest
                    .chunks_exact(3)
                    .take(count)
                    .map(|c| Object::from_bytes([c[0], c[1], c[2]]))
                    .collect();
            }
            _ => state.raw.push(p.clone()),
        }
    }

    state
}

fn expect_len(p: &Property, len: u8) -> Result<(), DecodeError> {
    if p.length() == len {
        Ok(())
    } else {
        Err(DecodeError::BadLength {
            epc: p.code,
            len: p.length(),
        })
    }
}
