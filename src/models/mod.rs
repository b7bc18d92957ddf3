use serde::{Deserialize, Serialize};
use chrono::NaiveDateTime;

/// Number of meter slots on the stick and in the registry file
pub const MAX_METERS: usize = 16;
/// AES-128 key length
pub const KEY_LENGTH: usize = 16;

/// Meter medium as used in the wM-Bus address field
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MeterType {
    Electricity,
    Gas,
    Heat,
    Water,
    Other(u8),
}

impl MeterType {
    pub fn from_code(code: u8) -> Self {
        return match code {
            0x02 => MeterType::Electricity,
            0x03 => MeterType::Gas,
            0x04 => MeterType::Heat,
            0x07 => MeterType::Water,
            c => MeterType::Other(c),
        };
    }

    pub fn code(&self) -> u8 {
        return match self {
            MeterType::Electricity => 0x02,
            MeterType::Gas => 0x03,
            MeterType::Heat => 0x04,
            MeterType::Water => 0x07,
            MeterType::Other(c) => *c,
        };
    }

    pub fn to_string(&self) -> String {
        match self {
            MeterType::Electricity => "Electricity".to_string(),
            MeterType::Gas => "Gas".to_string(),
            MeterType::Heat => "Heat".to_string(),
            MeterType::Water => "Water".to_string(),
            MeterType::Other(c) => format!("Other({:#04x})", c),
        }
    }
}

/// wM-Bus radio mode of the stick
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RadioMode {
    S2,
    T2,
}

impl RadioMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim() {
            "S" | "S2" | "s" | "s2" => Some(RadioMode::S2),
            "T" | "T2" | "t" | "t2" => Some(RadioMode::T2),
            _ => None,
        }
    }

    pub fn to_string(&self) -> String {
        match self {
            RadioMode::S2 => "S2".to_string(),
            RadioMode::T2 => "T2".to_string(),
        }
    }
}

/// One known meter. Identifiers are plain integers here, the BCD packing only
/// exists in the registry file (see `registry::record`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterDefinition {
    /// Raw 16 bit manufacturer id (FLAG code packing), never 0 for a real meter
    pub manufacturer_id: u16,
    /// Serial number, at most 8 decimal digits
    pub ident: u32,
    pub meter_type: MeterType,
    /// At most 2 decimal digits
    pub version: u8,
    pub key: [u8; KEY_LENGTH],
}

impl MeterDefinition {
    pub fn new(manufacturer_id: u16, ident: u32, meter_type: MeterType, version: u8) -> Self {
        MeterDefinition {
            manufacturer_id,
            ident,
            meter_type,
            version,
            key: [0; KEY_LENGTH],
        }
    }

    pub fn with_key(mut self, key: [u8; KEY_LENGTH]) -> Self {
        self.key = key;
        self
    }

    /// The key the vendor tools ship as default
    pub fn default_key() -> [u8; KEY_LENGTH] {
        let mut key = [0u8; KEY_LENGTH];
        for (i, b) in key.iter_mut().enumerate() {
            *b = 0x1C + 3 * i as u8;
        }
        return key;
    }

    /// Short tuple as used in log lines: "15b5 12345678 02 01"
    pub fn label(&self) -> String {
        return format!("{:04x} {:08} {:02x} {:02}", self.manufacturer_id, self.ident, self.meter_type.code(), self.version);
    }
}

/// Taken from: https://www.m-bus.de/man.html
pub fn manufacturer_code(id: u16) -> String {
    let letter = |v: u16| -> char {
        let v = (v & 0x1F) as u8;
        if v == 0 || v > 26 {
            return '?';
        }
        return (v + 64) as char;
    };
    return format!("{}{}{}", letter(id >> 10), letter(id >> 5), letter(id));
}

/// Inverse of `manufacturer_code`, accepts exactly three letters A-Z
pub fn manufacturer_id(code: &str) -> Option<u16> {
    let code = code.trim().to_ascii_uppercase();
    if code.len() != 3 || !code.bytes().all(|c| c.is_ascii_uppercase()) {
        return None;
    }
    let mut id: u16 = 0;
    for c in code.bytes() {
        id = (id << 5) | (c - 64) as u16;
    }
    return Some(id);
}

/// Bitmask reported by the stick for every received packet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketInfo(pub u8);

impl PacketInfo {
    pub const WAS_NOT_ENCRYPTED: u8 = 0x01;
    pub const IS_ENCRYPTED: u8 = 0x02;
    pub const WAS_ENCRYPTED: u8 = 0x04;
    pub const DECRYPTION_ERROR: u8 = 0x08;

    pub fn has(&self, flag: u8) -> bool {
        return self.0 & flag == flag;
    }

    /// Reduce the flags to a single state. A decryption error wins over a
    /// successful decryption if the stick ever reports both.
    pub fn encryption(&self) -> EncryptionStatus {
        if self.has(Self::DECRYPTION_ERROR) {
            return EncryptionStatus::DecryptionError;
        }
        if self.has(Self::WAS_ENCRYPTED) {
            return EncryptionStatus::Decrypted;
        }
        if self.has(Self::IS_ENCRYPTED) {
            return EncryptionStatus::Encrypted;
        }
        if self.has(Self::WAS_NOT_ENCRYPTED) {
            return EncryptionStatus::NotEncrypted;
        }
        return EncryptionStatus::Unknown;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionStatus {
    NotEncrypted,
    Decrypted,
    DecryptionError,
    /// Still encrypted, the stick has no matching key
    Encrypted,
    Unknown,
}

impl EncryptionStatus {
    pub fn to_string(&self) -> String {
        match self {
            EncryptionStatus::NotEncrypted => "not encrypted".to_string(),
            EncryptionStatus::Decrypted => "Decryption OK".to_string(),
            EncryptionStatus::DecryptionError => "Decryption ERROR".to_string(),
            EncryptionStatus::Encrypted => "is encrypted".to_string(),
            EncryptionStatus::Unknown => "unknown".to_string(),
        }
    }
}

/// Stick side counters delivered with every reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingDiagnostics {
    pub pic_counter: u32,
    pub tx_counter: u32,
    pub config_word: u16,
    pub status: u8,
}

/// One decoded radio packet for one meter
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RfReading {
    pub mantissa: i32,
    pub exponent: i8,
    pub payload: Vec<u8>,
    pub rssi_dbm: i16,
    pub access_number: u8,
    pub packet_info: PacketInfo,
    pub diagnostics: ReadingDiagnostics,
}

/// What the telemetry sinks write, one line or element per reading
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub timestamp: NaiveDateTime,
    pub value: f64,
    pub payload: Vec<u8>,
    pub rssi_dbm: i16,
    pub diagnostics: ReadingDiagnostics,
}

impl LogRecord {
    pub fn from_reading(timestamp: NaiveDateTime, value: f64, reading: &RfReading) -> Self {
        LogRecord {
            timestamp,
            value,
            payload: reading.payload.clone(),
            rssi_dbm: reading.rssi_dbm,
            diagnostics: reading.diagnostics,
        }
    }

    pub fn payload_hex(&self) -> String {
        return hex::encode_upper(&self.payload);
    }
}
