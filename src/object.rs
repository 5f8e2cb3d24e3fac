//! ECHONET Lite object identifiers and the handful of class groups/classes
//! this crate gives structured treatment to.

/// A 3-byte ECHONET object identifier: `(class-group, class, instance)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Object {
    pub class_group: u8,
    pub class: u8,
    pub instance: u8,
}

impl Object {
    pub const fn new(class_group: u8, class: u8, instance: u8) -> Self {
        Object {
            class_group,
            class,
            instance,
        }
    }

    /// Node profile object, `0x0EF001`, every ECHONET node hosts one.
    pub const NODE_PROFILE: Object = Object::new(0x0E, 0xF0, 0x01);

    /// This controller's own object id, `0x05FF01`.
    pub const CONTROLLER: Object = Object::new(0x05, 0xFF, 0x01);

    pub const HOME_AIRCON_GROUP: u8 = 0x01;
    pub const HOME_AIRCON_CLASS: u8 = 0x30;

    pub const SMART_METER_GROUP: u8 = 0x02;
    pub const SMART_METER_CLASS: u8 = 0x88;

    /// `is_node_profile(o) ↔ o.class_group = 0x0E ∧ o.class = 0xF0`
    pub fn is_node_profile(&self) -> bool {
        self.class_group == Object::NODE_PROFILE.class_group && self.class == Object::NODE_PROFILE.class
    }

    pub fn is_home_aircon(&self) -> bool {
        self.class_group == Self::HOME_AIRCON_GROUP && self.class == Self::HOME_AIRCON_CLASS
    }

    pub fn is_smart_meter(&self) -> bool {
        self.class_group == Self::SMART_METER_GROUP && self.class == Self::SMART_METER_CLASS
    }

    pub fn class_key(&self) -> (u8, u8) {
        (self.class_group, self.class)
    }

    pub fn to_bytes(self) -> [u8; 3] {
        [self.class_group, self.class, self.instance]
    }

    pub fn from_bytes(b: [u8; 3]) -> Self {
        Object::new(b[0], b[1], b[2])
    }
}

impl std::fmt::Display for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02x}{:02x}{:02x}", self.class_group, self.class, self.instance)
    }
}

/// Installation-location code carried in EPC 0x81, decoded from a single
/// byte: bit7 set means "free-form" (carries no structured meaning),
/// otherwise bits 6..3 select one of fifteen named locations and bits 2..0
/// are a numeric suffix distinguishing multiple instances in the same room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationCode {
    Living,
    Dining,
    Kitchen,
    Bathroom,
    Lavatory,
    Washroom,
    Corridor,
    Room,
    Stairs,
    Entrance,
    Closet,
    Garden,
    Garage,
    Balcony,
    Other,
    Unknown,
}

impl LocationCode {
    fn from_code(code: u8) -> Self {
        match code {
            1 => LocationCode::Living,
            2 => LocationCode::Dining,
            3 => LocationCode::Kitchen,
            4 => LocationCode::Bathroom,
            5 => LocationCode::Lavatory,
            6 => LocationCode::Washroom,
            7 => LocationCode::Corridor,
            8 => LocationCode::Room,
            9 => LocationCode::Stairs,
            10 => LocationCode::Entrance,
            11 => LocationCode::Closet,
            12 => LocationCode::Garden,
            13 => LocationCode::Garage,
            14 => LocationCode::Balcony,
            15 => LocationCode::Other,
            _ => LocationCode::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LocationCode::Living => "Living",
            LocationCode::Dining => "Dining",
            LocationCode::Kitchen => "Kitchen",
            LocationCode::Bathroom => "Bathroom",
            LocationCode::Lavatory => "Lavatory",
            LocationCode::Washroom => "Washroom",
            LocationCode::Corridor => "Corridor",
            LocationCode::Room => "Room",
            LocationCode::Stairs => "Stairs",
            LocationCode::Entrance => "Entrance",
            LocationCode::Closet => "Closet",
            LocationCode::Garden => "Garden",
            LocationCode::Garage => "Garage",
            LocationCode::Balcony => "Balcony",
            LocationCode::Other => "Other",
            LocationCode::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for LocationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded installation location: a named room plus a numeric suffix used
/// to tell apart multiple instances of the same room (e.g. `Room1`,
/// `Room2`). `free_form` is set when bit7 of the source byte was set, in
/// which case `code`/`number` carry no meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub code: LocationCode,
    pub number: u8,
    pub free_form: bool,
}

impl Location {
    /// Decode the single-byte EPC 0x81 installation-location value.
    pub fn decode(byte: u8) -> Location {
        if byte >> 7 == 1 {
            return Location {
                code: LocationCode::Unknown,
                number: 0,
                free_form: true,
            };
        }
        let code = (byte >> 3) & 0x0F;
        let number = byte & 0x07;
        Location {
            code: LocationCode::from_code(code),
            number,
            free_form: false,
        }
    }

    /// Render as `<Name><suffix>`, omitting the suffix when it is zero,
    /// matching the metrics label format used by the original exporter.
    pub fn label(&self) -> String {
        if self.number == 0 {
            self.code.to_string()
        } else {
            format!("{}{}", self.code, self.number)
        }
    }
}
