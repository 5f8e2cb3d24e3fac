//! Static, human-readable descriptions of ECHONET classes and their
//! properties, loaded from a directory of per-class CSV files (one file
//! per class, named `0x<group><class>.csv`, each row `EPC,Detail,...`
//! after a header row starting with `EPC`).
//!
//! This is purely descriptive metadata for logging/metrics labels, it
//! plays no part in frame parsing or [`crate::decode`].

use std::collections::HashMap;
use std::path::Path;

/// `(class_group, class)` keyed table of [`ClassInfo`].
#[derive(Debug, Clone, Default)]
pub struct ClassDictionary {
    classes: HashMap<(u8, u8), ClassInfo>,
}

/// Static information about one ECHONET class.
#[derive(Debug, Clone, Default)]
pub struct ClassInfo {
    pub class_group: u8,
    pub class: u8,
    pub desc: String,
    pub properties: HashMap<u8, PropertyInfo>,
}

/// Static information about one property of a class.
#[derive(Debug, Clone)]
pub struct PropertyInfo {
    pub code: u8,
    pub detail: String,
}

impl ClassDictionary {
    pub fn new() -> Self {
        ClassDictionary::default()
    }

    fn add(&mut self, info: ClassInfo) {
        self.classes.insert((info.class_group, info.class), info);
    }

    /// Look up a class, falling back to a synthetic "unknown" entry with
    /// no known properties rather than failing.
    pub fn get(&self, class_group: u8, class: u8) -> ClassInfo {
        self.classes
            .get(&(class_group, class))
            .cloned()
            .unwrap_or_else(|| ClassInfo {
                class_group,
                class,
                desc: "unknown".to_string(),
                properties: HashMap::new(),
            })
    }

    /// Load every `0x<hex>.csv` file in `dir` as a class's property table,
    /// then register the node profile (0x0E, 0xF0) and controller
    /// (0x05, 0xFF) entries that the upstream database does not carry:
    /// the node profile gets its instance/class-count/instance-list
    /// properties (0xD3-0xD7) added on top of whatever `DeviceObject.csv`
    /// contributed, and the controller gets an empty property table.
    ///
    /// Unreadable or malformed files are skipped, not fatal. The
    /// dictionary degrades to "unknown" entries for the classes they
    /// would have described.
    pub fn load(dir: &Path) -> ClassDictionary {
        let mut dict = ClassDictionary::new();

        let entries = match std::fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                log::warn!("could not read class dictionary dir {}: {}", dir.display(), e);
                return dict;
            }
        };

        let mut device_object_properties = None;

        for entry in entries.flatten() {
            let path = entry.path();
            let stem = match path.file_stem().and_then(|s| s.to_str()) {
                Some(s) => s,
                None => continue,
            };

            if stem.eq_ignore_ascii_case("DeviceObject") {
                device_object_properties = load_properties(&path);
                continue;
            }

            let codes = match class_code_from_name(stem) {
                Some(c) => c,
                None => continue,
            };

            if let Some(properties) = load_properties(&path) {
                dict.add(ClassInfo {
                    class_group: codes[0],
                    class: codes[1],
                    desc: String::new(),
                    properties,
                });
            }
        }

        if let Some(mut properties) = device_object_properties {
            properties.insert(0xD3, PropertyInfo { code: 0xD3, detail: "number of self-node instances".into() });
            properties.insert(0xD4, PropertyInfo { code: 0xD4, detail: "number of self-node classes".into() });
            properties.insert(0xD5, PropertyInfo { code: 0xD5, detail: "instance list notification".into() });
            properties.insert(0xD6, PropertyInfo { code: 0xD6, detail: "self-node instance list S".into() });
            properties.insert(0xD7, PropertyInfo { code: 0xD7, detail: "self-node class list S".into() });
            dict.add(ClassInfo {
                class_group: 0x0E,
                class: 0xF0,
                desc: "node profile".into(),
                properties,
            });
        }

        dict.add(ClassInfo {
            class_group: 0x05,
            class: 0xFF,
            desc: "controller".into(),
            properties: HashMap::new(),
        });

        dict
    }
}

/// Parse `0x<group><class>` from a file stem, ignoring files that don't
/// match (e.g. `DeviceObject`, `README`).
fn class_code_from_name(stem: &str) -> Option<[u8; 2]> {
    let hex_part = stem.strip_prefix("0x")?;
    if hex_part.len() != 4 {
        return None;
    }
    let group = u8::from_str_radix(&hex_part[0..2], 16).ok()?;
    let class = u8::from_str_radix(&hex_part[2..4], 16).ok()?;
    Some([group, class])
}

fn load_properties(path: &Path) -> Option<HashMap<u8, PropertyInfo>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| log::warn!("failed to open {}: {}", path.display(), e))
        .ok()?;

    let mut properties = HashMap::new();
    let mut epc_began = false;

    for record in reader.records().flatten() {
        let Some(first) = record.get(0) else { continue };
        if first == "EPC" {
            epc_began = true;
            continue;
        }
        if !epc_began {
            continue;
        }
        let Some(hex_code) = first.strip_prefix("0x") else { continue };
        let Ok(code) = u8::from_str_radix(hex_code, 16) else {
            log::debug!("failed to decode property code {} in {}", first, path.display());
            continue;
        };
        let detail = record.get(1).unwrap_or("").to_string();
        properties.insert(code, PropertyInfo { code, detail });
    }

    Some(properties)
}
