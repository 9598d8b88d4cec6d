//! SHT31 temperature and humidity sensor over I2C
//!
//! One measurement is a single-shot transaction: write the trigger command,
//! wait for the conversion, read six bytes back. Nothing is cached between
//! calls.

use super::{Measurement, Quantity};
use crate::shared::{raw_to_celsius, raw_to_relative_humidity};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{Error as _, ErrorKind, I2c};
use thiserror::Error;

/// Fixed bus address of the sensor (ADDR pin low)
pub const ADDRESS: u8 = 0x44;

/// Single shot, high repeatability, clock stretching disabled
pub const MEASURE_COMMAND: [u8; 2] = [0x2C, 0x06];

/// Conversion time the sensor needs before data can be read
pub const CONVERSION_TIME_MS: u32 = 200;

/// Size of a sample: temperature word, CRC, humidity word, CRC
pub const SAMPLE_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    #[error("writing measurement command to {address:#04x} failed ({kind:?}): {detail}")]
    BusWrite {
        address: u8,
        kind: ErrorKind,
        detail: String,
    },
    #[error("reading sample from {address:#04x} failed ({kind:?}): {detail}")]
    BusRead {
        address: u8,
        kind: ErrorKind,
        detail: String,
    },
    #[error("expected 6 bytes from sensor, got {0}")]
    InvalidLength(usize),
    #[error("{word} checksum mismatch: computed {computed:#04x}, sensor sent {received:#04x}")]
    Checksum {
        word: &'static str,
        computed: u8,
        received: u8,
    },
}

impl SensorError {
    /// True when the bus itself failed (device absent, NACK, I/O fault)
    pub fn is_bus_fault(&self) -> bool {
        matches!(self, SensorError::BusWrite { .. } | SensorError::BusRead { .. })
    }
}

/// The six bytes returned by one measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample([u8; SAMPLE_LEN]);

impl RawSample {
    pub fn bytes(&self) -> &[u8; SAMPLE_LEN] {
        &self.0
    }

    pub fn temperature_word(&self) -> u16 {
        u16::from_be_bytes([self.0[0], self.0[1]])
    }

    pub fn humidity_word(&self) -> u16 {
        u16::from_be_bytes([self.0[3], self.0[4]])
    }

    /// Check bytes 2 and 5 against the CRC of their preceding word
    pub fn verify_checksums(&self) -> Result<(), SensorError> {
        check_word("temperature", [self.0[0], self.0[1]], self.0[2])?;
        check_word("humidity", [self.0[3], self.0[4]], self.0[5])
    }

    /// Decode into physical units. Checksum bytes are not looked at.
    pub fn decode(&self) -> Measurement {
        Measurement {
            temperature_celsius: raw_to_celsius(self.temperature_word()),
            relative_humidity_percent: raw_to_relative_humidity(self.humidity_word()),
        }
    }
}

impl From<[u8; SAMPLE_LEN]> for RawSample {
    fn from(bytes: [u8; SAMPLE_LEN]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for RawSample {
    type Error = SensorError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; SAMPLE_LEN] = bytes
            .try_into()
            .map_err(|_| SensorError::InvalidLength(bytes.len()))?;
        Ok(Self(bytes))
    }
}

/// CRC-8 used by Sensirion parts: poly 0x31, init 0xFF, no reflection
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0xFF;
    for byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
    }
    crc
}

fn check_word(word: &'static str, data: [u8; 2], received: u8) -> Result<(), SensorError> {
    let computed = crc8(&data);
    if computed == received {
        Ok(())
    } else {
        Err(SensorError::Checksum {
            word,
            computed,
            received,
        })
    }
}

/// Driver owning the bus handle and a delay provider
#[derive(Debug)]
pub struct Sht31<I2C, D> {
    i2c: I2C,
    delay: D,
    verify_checksum: bool,
}

impl<I2C, D> Sht31<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self {
            i2c,
            delay,
            verify_checksum: false,
        }
    }

    /// Reject samples whose CRC bytes don't match (off by default)
    pub fn with_checksum_verification(mut self, enabled: bool) -> Self {
        self.verify_checksum = enabled;
        self
    }

    /// Run the trigger, wait, read sequence and return the raw bytes.
    ///
    /// Bus failures are returned as-is; there is no retry here.
    pub fn read_sample(&mut self) -> Result<RawSample, SensorError> {
        self.i2c
            .write(ADDRESS, &MEASURE_COMMAND)
            .map_err(|e| SensorError::BusWrite {
                address: ADDRESS,
                kind: e.kind(),
                detail: format!("{:?}", e),
            })?;

        self.delay.delay_ms(CONVERSION_TIME_MS);

        let mut buf = [0u8; SAMPLE_LEN];
        self.i2c
            .read(ADDRESS, &mut buf)
            .map_err(|e| SensorError::BusRead {
                address: ADDRESS,
                kind: e.kind(),
                detail: format!("{:?}", e),
            })?;

        tracing::debug!("SHT31 raw sample: {:02x?}", buf);
        Ok(RawSample::from(buf))
    }

    /// Take a fresh reading of both quantities
    pub fn sample(&mut self) -> Result<Measurement, SensorError> {
        let raw = self.read_sample()?;
        if self.verify_checksum {
            raw.verify_checksums()?;
        }
        Ok(raw.decode())
    }

    /// Take a fresh reading and return only `quantity`
    pub fn measure(&mut self, quantity: Quantity) -> Result<f64, SensorError> {
        Ok(self.sample()?.value(quantity))
    }

    /// Give the bus and delay back
    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorType, NoAcknowledgeSource, Operation};

    /// In-memory bus that records every transaction
    #[derive(Debug, Default)]
    pub(crate) struct FakeBus {
        pub response: [u8; SAMPLE_LEN],
        pub fail_write: Option<ErrorKind>,
        pub fail_read: Option<ErrorKind>,
        pub writes: Vec<(u8, Vec<u8>)>,
        pub reads: Vec<(u8, usize)>,
    }

    impl FakeBus {
        pub(crate) fn returning(response: [u8; SAMPLE_LEN]) -> Self {
            Self {
                response,
                ..Self::default()
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.writes.len() + self.reads.len()
        }
    }

    impl ErrorType for FakeBus {
        type Error = ErrorKind;
    }

    impl I2c for FakeBus {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            for op in operations {
                match op {
                    Operation::Write(bytes) => {
                        self.writes.push((address, bytes.to_vec()));
                        if let Some(kind) = self.fail_write {
                            return Err(kind);
                        }
                    }
                    Operation::Read(buf) => {
                        self.reads.push((address, buf.len()));
                        if let Some(kind) = self.fail_read {
                            return Err(kind);
                        }
                        buf.copy_from_slice(&self.response[..buf.len()]);
                    }
                }
            }
            Ok(())
        }
    }

    /// Delay that only remembers how long it was asked to wait
    #[derive(Debug, Default)]
    pub(crate) struct FakeDelay {
        pub waited_ns: u64,
    }

    impl DelayNs for FakeDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.waited_ns += u64::from(ns);
        }
    }

    pub(crate) const SAMPLE: [u8; SAMPLE_LEN] = [0x66, 0x4D, 0x00, 0x5C, 0x5A, 0x00];

    #[test]
    fn test_transaction_sequence() {
        let mut sensor = Sht31::new(FakeBus::returning(SAMPLE), FakeDelay::default());
        let raw = sensor.read_sample().unwrap();
        assert_eq!(raw.bytes(), &SAMPLE);

        let (bus, delay) = sensor.release();
        assert_eq!(bus.writes, vec![(0x44, vec![0x2C, 0x06])]);
        assert_eq!(bus.reads, vec![(0x44, 6)]);
        assert!(delay.waited_ns >= 200_000_000);
    }

    #[test]
    fn test_decode_known_sample() {
        let m = RawSample::from(SAMPLE).decode();
        assert_eq!(RawSample::from(SAMPLE).temperature_word(), 26189);
        assert_eq!(RawSample::from(SAMPLE).humidity_word(), 23642);
        assert!((m.temperature_celsius - 24.933).abs() < 0.001);
        assert!((m.relative_humidity_percent - 36.075).abs() < 0.001);
    }

    #[test]
    fn test_measure_selects_quantity() {
        let mut sensor = Sht31::new(FakeBus::returning(SAMPLE), FakeDelay::default());
        let h = sensor.measure(Quantity::Humidity).unwrap();
        assert!((h - 36.075).abs() < 0.001);
        let t = sensor.measure(Quantity::Temperature).unwrap();
        assert!((t - 24.933).abs() < 0.001);

        // every call is a fresh transaction
        let (bus, _) = sensor.release();
        assert_eq!(bus.writes.len(), 2);
        assert_eq!(bus.reads.len(), 2);
    }

    #[test]
    fn test_write_failure_skips_read() {
        let mut bus = FakeBus::returning(SAMPLE);
        bus.fail_write = Some(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        let mut sensor = Sht31::new(bus, FakeDelay::default());

        let err = sensor.sample().unwrap_err();
        assert!(matches!(err, SensorError::BusWrite { address: 0x44, .. }));
        assert!(err.is_bus_fault());

        let (bus, delay) = sensor.release();
        assert!(bus.reads.is_empty());
        assert_eq!(delay.waited_ns, 0);
    }

    #[test]
    fn test_read_failure() {
        let mut bus = FakeBus::returning(SAMPLE);
        bus.fail_read = Some(ErrorKind::Bus);
        let mut sensor = Sht31::new(bus, FakeDelay::default());

        let err = sensor.sample().unwrap_err();
        assert!(matches!(err, SensorError::BusRead { kind: ErrorKind::Bus, .. }));
        assert!(err.is_bus_fault());
    }

    #[test]
    fn test_invalid_length_rejected() {
        let err = RawSample::try_from(&SAMPLE[..5]).unwrap_err();
        assert_eq!(err, SensorError::InvalidLength(5));
        assert!(!err.is_bus_fault());
        assert!(RawSample::try_from(&[0u8; 7][..]).is_err());
        assert_eq!(RawSample::try_from(&SAMPLE[..]).unwrap(), RawSample::from(SAMPLE));
    }

    #[test]
    fn test_crc8_datasheet_vector() {
        assert_eq!(crc8(&[0xBE, 0xEF]), 0x92);
    }

    #[test]
    fn test_checksums_ignored_by_default() {
        // SAMPLE carries zeroed CRC bytes
        let mut sensor = Sht31::new(FakeBus::returning(SAMPLE), FakeDelay::default());
        assert!(sensor.sample().is_ok());
    }

    #[test]
    fn test_checksum_verification() {
        let mut good = SAMPLE;
        good[2] = crc8(&good[0..2]);
        good[5] = crc8(&good[3..5]);
        let mut sensor =
            Sht31::new(FakeBus::returning(good), FakeDelay::default()).with_checksum_verification(true);
        assert!(sensor.sample().is_ok());

        let mut sensor =
            Sht31::new(FakeBus::returning(SAMPLE), FakeDelay::default()).with_checksum_verification(true);
        let err = sensor.sample().unwrap_err();
        assert!(matches!(err, SensorError::Checksum { word: "temperature", .. }));
        assert!(!err.is_bus_fault());
    }
}
