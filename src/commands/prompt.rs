use lazy_static::lazy_static;
use regex::Regex;
use crate::models::{manufacturer_id, MeterType, KEY_LENGTH};

lazy_static! {
    static ref HEX_MANUFACTURER: Regex = Regex::new(r"^(0[xX])?[0-9A-Fa-f]{1,4}$").unwrap();
    static ref LETTER_MANUFACTURER: Regex = Regex::new(r"^[A-Za-z]{3}$").unwrap();
    static ref IDENT: Regex = Regex::new(r"^[0-9]{1,8}$").unwrap();
    static ref VERSION: Regex = Regex::new(r"^[0-9]{1,2}$").unwrap();
    static ref KEY: Regex = Regex::new(r"^[0-9A-Fa-f]{32}$").unwrap();
}

/// Source of answers for interactive commands
pub trait Prompter {
    /// None when the input is closed
    fn read_line(&mut self, prompt: &str) -> Option<String>;
}

/// The raw id in hex ("1593", "0x1593", "ABC") or three letters with at
/// least one outside A-F ("ELS"). Zero marks an empty slot and is refused.
pub fn parse_manufacturer(input: &str) -> Option<u16> {
    let input = input.trim();
    if LETTER_MANUFACTURER.is_match(input) && !input.chars().all(|c| c.is_ascii_hexdigit()) {
        return manufacturer_id(input);
    }
    if !HEX_MANUFACTURER.is_match(input) {
        return None;
    }
    let digits = input.trim_start_matches("0x").trim_start_matches("0X");
    return match u16::from_str_radix(digits, 16) {
        Ok(0) | Err(_) => None,
        Ok(id) => Some(id),
    };
}

pub fn parse_ident(input: &str) -> Option<u32> {
    let input = input.trim();
    if !IDENT.is_match(input) {
        return None;
    }
    return input.parse().ok();
}

/// Returns the type and whether the input was understood. Anything but
/// 2, 3, 4 or 7 falls back to electricity.
pub fn parse_meter_type(input: &str) -> (MeterType, bool) {
    return match input.trim() {
        "2" => (MeterType::Electricity, true),
        "3" => (MeterType::Gas, true),
        "4" => (MeterType::Heat, true),
        "7" => (MeterType::Water, true),
        _ => (MeterType::Electricity, false),
    };
}

pub fn parse_version(input: &str) -> Option<u8> {
    let input = input.trim();
    if !VERSION.is_match(input) {
        return None;
    }
    return input.parse().ok();
}

pub fn parse_key(input: &str) -> Option<[u8; KEY_LENGTH]> {
    let input = input.trim();
    if !KEY.is_match(input) {
        return None;
    }
    let mut key = [0u8; KEY_LENGTH];
    hex::decode_to_slice(input, &mut key).ok()?;
    return Some(key);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyChoice {
    Zero,
    Default,
    Custom,
}

impl KeyChoice {
    pub fn from_str(input: &str) -> Option<Self> {
        match input.trim() {
            "0" => Some(KeyChoice::Zero),
            "1" => Some(KeyChoice::Default),
            "2" => Some(KeyChoice::Custom),
            _ => None,
        }
    }
}
