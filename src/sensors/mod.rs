//! Sensors module - ambient readings taken over the two-wire bus

pub mod sht31;

/// Which physical quantity a caller is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Temperature,
    Humidity,
}

/// One decoded reading from the sensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub temperature_celsius: f64,
    pub relative_humidity_percent: f64,
}

impl Measurement {
    /// Pick the value for `quantity`
    pub fn value(&self, quantity: Quantity) -> f64 {
        match quantity {
            Quantity::Temperature => self.temperature_celsius,
            Quantity::Humidity => self.relative_humidity_percent,
        }
    }
}
