//! Intent routing: which measurement, if any, an intent asks for

use super::Intent;
use crate::config::IntentNames;
use crate::sensors::Quantity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Measure(Quantity),
    Ignored,
}

/// Two-entry dispatch table guarded by the site filter
#[derive(Debug, Clone)]
pub struct IntentRouter {
    site_id: String,
    intents: IntentNames,
}

impl IntentRouter {
    pub fn new(site_id: impl Into<String>, intents: IntentNames) -> Self {
        Self {
            site_id: site_id.into(),
            intents,
        }
    }

    pub fn route(&self, intent: &Intent) -> Route {
        if intent.site_id != self.site_id {
            tracing::debug!(
                "Ignoring {} from site {:?} (this is {:?})",
                intent.name,
                intent.site_id,
                self.site_id
            );
            return Route::Ignored;
        }

        if intent.name == self.intents.temperature {
            Route::Measure(Quantity::Temperature)
        } else if intent.name == self.intents.humidity {
            Route::Measure(Quantity::Humidity)
        } else {
            tracing::debug!("Ignoring unknown intent {:?}", intent.name);
            Route::Ignored
        }
    }
}
