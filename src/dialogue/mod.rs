//! Dialogue module - intents in, spoken replies out

pub mod composer;
pub mod hermes;
pub mod router;

use crate::sensors::sht31::SensorError;
use thiserror::Error;

/// A recognized spoken command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub name: String,
    pub site_id: String,
    pub session_id: String,
}

/// Why a request could not be answered with a reading
#[derive(Debug, Error)]
pub enum Failure {
    #[error("sensor unavailable: {0}")]
    SensorUnavailable(#[source] SensorError),
    #[error(transparent)]
    Uncategorized(#[from] anyhow::Error),
}

/// Category used to pick the apology sentence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    SensorUnavailable,
    Uncategorized,
}

impl Failure {
    pub fn kind(&self) -> FailureKind {
        match self {
            Failure::SensorUnavailable(_) => FailureKind::SensorUnavailable,
            Failure::Uncategorized(_) => FailureKind::Uncategorized,
        }
    }
}

impl From<SensorError> for Failure {
    fn from(e: SensorError) -> Self {
        if e.is_bus_fault() {
            Failure::SensorUnavailable(e)
        } else {
            Failure::Uncategorized(e.into())
        }
    }
}

/// Where finished conversations go
pub trait DialogueSink {
    /// Close `session_id`, speaking `text` to the user
    fn end_session(&mut self, session_id: &str, text: &str) -> anyhow::Result<()>;
}
