//! Spoken replies: reading sentences and the apology reactions

use super::{DialogueSink, Failure, FailureKind};
use crate::sensors::Quantity;
use crate::shared::{format_spoken_number, round_to_one_decimal, Locale};

/// Fractional digits spoken for a reading
const SPOKEN_PRECISION: usize = 1;

/// Sentences for one language
#[derive(Debug)]
struct Phrases {
    temperature: (&'static str, &'static str),
    humidity: (&'static str, &'static str),
    sensor_unavailable: &'static str,
    uncategorized: &'static str,
}

const FRENCH: Phrases = Phrases {
    temperature: ("Il fait actuellement", "degrés"),
    humidity: ("L'humidité est de", "%"),
    sensor_unavailable: "Désolée, je n'ai pas de réponse des capteurs.",
    uncategorized: "Désolée, il y a eu une erreur.",
};

const ENGLISH: Phrases = Phrases {
    temperature: ("It is currently", "degrees"),
    humidity: ("The humidity is", "%"),
    sensor_unavailable: "Sorry, I got no answer from the sensors.",
    uncategorized: "Sorry, something went wrong.",
};

fn phrases(locale: Locale) -> &'static Phrases {
    match locale {
        Locale::Fr => &FRENCH,
        Locale::En => &ENGLISH,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResponseComposer {
    locale: Locale,
}

impl ResponseComposer {
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }

    /// Sentence announcing `value` for `quantity`
    pub fn sentence(&self, quantity: Quantity, value: f64) -> String {
        let phrases = phrases(self.locale);
        let (before, after) = match quantity {
            Quantity::Temperature => phrases.temperature,
            Quantity::Humidity => phrases.humidity,
        };
        let number = format_spoken_number(round_to_one_decimal(value), SPOKEN_PRECISION, self.locale);
        format!("{} {} {}", before, number, after)
    }

    /// Fixed apology for a failure category
    pub fn reaction(&self, kind: FailureKind) -> &'static str {
        let phrases = phrases(self.locale);
        match kind {
            FailureKind::SensorUnavailable => phrases.sensor_unavailable,
            FailureKind::Uncategorized => phrases.uncategorized,
        }
    }

    /// End the session with either the reading or an apology.
    ///
    /// Returns what was spoken.
    pub fn respond<S: DialogueSink>(
        &self,
        sink: &mut S,
        session_id: &str,
        quantity: Quantity,
        result: Result<f64, Failure>,
    ) -> anyhow::Result<String> {
        let text = match result {
            Ok(value) => self.sentence(quantity, value),
            Err(failure) => self.reaction(failure.kind()).to_string(),
        };
        sink.end_session(session_id, &text)?;
        Ok(text)
    }
}
