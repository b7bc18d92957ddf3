use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
    #[error("Exponent {0} is out of range")]
    ExponentOutOfRange(i8),
}

/// Scale a raw reading, value = mantissa * 10^exponent.
///
/// The power of ten is built by integer multiplication and applied with a
/// single multiply or divide, 123 * 10^-2 is the float nearest to 1.23.
/// Powers above 10^19 do not fit the accumulator and are rejected.
pub fn decode_value(mantissa: i32, exponent: i8) -> Result<f64, DecodeError> {
    let mut factor: u64 = 1;
    for _ in 0..exponent.unsigned_abs() {
        factor = factor.checked_mul(10).ok_or(DecodeError::ExponentOutOfRange(exponent))?;
    }

    if exponent < 0 {
        return Ok(mantissa as f64 / factor as f64);
    }
    return Ok(mantissa as f64 * factor as f64);
}
