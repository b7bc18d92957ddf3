use crate::models::{MeterDefinition, MeterType, KEY_LENGTH};

/*
    On disk layout of one slot, little endian, the natural C layout of the
    vendor struct so existing meter.dat files stay readable:

    0..2    manufacturer id
    2..4    padding
    4..8    ident, BCD
    8       type
    9       version, BCD
    10..26  AES key
    26..28  padding
*/
pub const RECORD_SIZE: usize = 28;

/// 12345678 -> 0x12345678, None if the value has more than 8 digits
pub fn to_bcd(value: u32) -> Option<u32> {
    if value > 99_999_999 {
        return None;
    }
    let mut v = value;
    let mut bcd: u32 = 0;
    let mut shift = 0;
    while v > 0 {
        bcd |= (v % 10) << shift;
        v /= 10;
        shift += 4;
    }
    return Some(bcd);
}

/// 0x12345678 -> 12345678, None if any nibble is not a decimal digit
pub fn from_bcd(bcd: u32) -> Option<u32> {
    let mut value: u32 = 0;
    for nibble in (0..8).rev() {
        let digit = (bcd >> (nibble * 4)) & 0x0F;
        if digit > 9 {
            return None;
        }
        value = value * 10 + digit;
    }
    return Some(value);
}

/// Empty slots encode as all zero
pub fn encode(slot: Option<&MeterDefinition>) -> [u8; RECORD_SIZE] {
    let mut buf = [0u8; RECORD_SIZE];
    let meter = match slot {
        Some(m) => m,
        None => return buf,
    };

    /* Values were range checked when the definition was built, saturate anyway */
    let ident = to_bcd(meter.ident).unwrap_or(0x9999_9999);
    let version = to_bcd(meter.version as u32).unwrap_or(0x99) as u8;

    buf[0..2].copy_from_slice(&meter.manufacturer_id.to_le_bytes());
    buf[4..8].copy_from_slice(&ident.to_le_bytes());
    buf[8] = meter.meter_type.code();
    buf[9] = version;
    buf[10..10 + KEY_LENGTH].copy_from_slice(&meter.key);
    return buf;
}

#[derive(Debug, PartialEq)]
pub enum Decoded {
    Empty,
    Meter(MeterDefinition),
    /// Manufacturer set, but ident or version are not valid BCD
    Corrupt,
}

pub fn decode(buf: &[u8; RECORD_SIZE]) -> Decoded {
    let manufacturer_id = u16::from_le_bytes([buf[0], buf[1]]);
    if manufacturer_id == 0 {
        return Decoded::Empty;
    }

    let ident = match from_bcd(u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]])) {
        Some(i) => i,
        None => return Decoded::Corrupt,
    };
    let version = match from_bcd(buf[9] as u32) {
        Some(v) => v as u8,
        None => return Decoded::Corrupt,
    };

    let mut key = [0u8; KEY_LENGTH];
    key.copy_from_slice(&buf[10..10 + KEY_LENGTH]);

    return Decoded::Meter(MeterDefinition {
        manufacturer_id,
        ident,
        meter_type: MeterType::from_code(buf[8]),
        version,
        key,
    });
}

#[cfg(test)]
mod record_tests {
    use super::*;

    #[test]
    fn bcd_conversion() {
        assert_eq!(to_bcd(12345678), Some(0x12345678));
        assert_eq!(to_bcd(1), Some(0x1));
        assert_eq!(to_bcd(0), Some(0));
        assert_eq!(to_bcd(100_000_000), None);
        assert_eq!(from_bcd(0x12345678), Some(12345678));
        assert_eq!(from_bcd(0x0000_0042), Some(42));
        assert_eq!(from_bcd(0x1234567A), None);
    }

    #[test]
    fn known_layout() {
        let meter = MeterDefinition::new(0x15B5, 12345678, MeterType::Water, 1)
            .with_key(MeterDefinition::default_key());
        let buf = encode(Some(&meter));

        assert_eq!(&buf[0..4], &[0xB5, 0x15, 0x00, 0x00]);
        assert_eq!(&buf[4..8], &[0x78, 0x56, 0x34, 0x12]);
        assert_eq!(buf[8], 0x07);
        assert_eq!(buf[9], 0x01);
        assert_eq!(buf[10], 0x1C);
        assert_eq!(&buf[26..28], &[0, 0]);

        assert_eq!(decode(&buf), Decoded::Meter(meter));
    }

    #[test]
    fn empty_and_corrupt_records() {
        assert_eq!(encode(None), [0u8; RECORD_SIZE]);
        assert_eq!(decode(&[0u8; RECORD_SIZE]), Decoded::Empty);

        let mut buf = encode(Some(&MeterDefinition::new(1, 1, MeterType::Gas, 1)));
        buf[9] = 0xAB;
        assert_eq!(decode(&buf), Decoded::Corrupt);
    }
}
