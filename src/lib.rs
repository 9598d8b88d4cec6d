//! snips-sht31: voice assistant skill for an SHT31 temperature/humidity sensor
//!
//! Layers:
//! - sensors: SHT31 driver over any `embedded-hal` I2C bus
//! - shared: register conversion and spoken number formatting
//! - dialogue: intent routing, reply composition, Hermes over MQTT
//! - skill: the pipeline tying them together

pub mod config;
pub mod dialogue;
pub mod sensors;
pub mod shared;
pub mod skill;
