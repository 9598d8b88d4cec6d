//! Shared numeric helpers: register conversion, rounding and spoken numbers

use serde::{Deserialize, Serialize};

/// Full scale of the sensor's 16-bit registers
const RAW_FULL_SCALE: f64 = 65535.0;

/// Convert a raw temperature register to degrees Celsius.
///
/// Covers -45 °C (raw 0) to 130 °C (raw 0xFFFF).
pub fn raw_to_celsius(raw: u16) -> f64 {
    -45.0 + 175.0 * f64::from(raw) / RAW_FULL_SCALE
}

/// Convert a raw humidity register to percent relative humidity (0 to 100).
pub fn raw_to_relative_humidity(raw: u16) -> f64 {
    100.0 * f64::from(raw) / RAW_FULL_SCALE
}

/// Round to one decimal digit.
///
/// The value is scaled by ten in binary floating point and rounded half away
/// from zero, so `21.05 -> 21.1`, `21.15 -> 21.2` and `-3.25 -> -3.3`.
pub fn round_to_one_decimal(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Language the skill speaks in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Fr,
    En,
}

impl Locale {
    /// Character placed between the integer and fractional digits
    pub fn decimal_separator(self) -> char {
        match self {
            Locale::Fr => ',',
            Locale::En => '.',
        }
    }
}

/// Render `x` with `precision` fractional digits for speech.
///
/// A value whose rendered fraction is all zeros loses it entirely
/// (`21.0 -> "21"`, `20.96 -> "21"` at one digit), and the decimal point is
/// replaced by the locale's separator (`21.5 -> "21,5"` in French).
pub fn format_spoken_number(x: f64, precision: usize, locale: Locale) -> String {
    let rendered = format!("{:.*}", precision, x);
    let whole = match rendered.split_once('.') {
        Some((whole, frac)) if frac.bytes().all(|b| b == b'0') => Some(whole.to_string()),
        _ => None,
    };
    let rendered = whole.unwrap_or(rendered);

    // no "minus zero" for small negatives
    if rendered == "-0" {
        return "0".to_string();
    }
    rendered.replace('.', &locale.decimal_separator().to_string())
}
