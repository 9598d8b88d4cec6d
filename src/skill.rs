//! The skill pipeline: route the intent, read the sensor, speak the answer

use crate::dialogue::composer::ResponseComposer;
use crate::dialogue::router::{IntentRouter, Route};
use crate::dialogue::{DialogueSink, Failure, FailureKind, Intent};
use crate::sensors::sht31::Sht31;
use crate::sensors::Quantity;
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// What happened to one intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// Not for us: nothing was read and nothing was said
    Ignored,
    /// The session was ended with this sentence
    Answered(String),
}

#[derive(Debug)]
pub struct Skill<I2C, D> {
    sensor: Sht31<I2C, D>,
    router: IntentRouter,
    composer: ResponseComposer,
}

impl<I2C, D> Skill<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    pub fn new(sensor: Sht31<I2C, D>, router: IntentRouter, composer: ResponseComposer) -> Self {
        Self {
            sensor,
            router,
            composer,
        }
    }

    pub fn composer(&self) -> ResponseComposer {
        self.composer
    }

    /// Handle one intent to completion, ending its session at most once.
    ///
    /// The only error returned is the sink failing to end the session.
    pub fn handle<S: DialogueSink>(&mut self, intent: &Intent, sink: &mut S) -> anyhow::Result<Handled> {
        let quantity = match self.router.route(intent) {
            Route::Measure(quantity) => quantity,
            Route::Ignored => return Ok(Handled::Ignored),
        };

        let result = self.measure(quantity);
        let text = self
            .composer
            .respond(sink, &intent.session_id, quantity, result)?;
        tracing::info!("Session {} ended: {:?}", intent.session_id, text);
        Ok(Handled::Answered(text))
    }

    fn measure(&mut self, quantity: Quantity) -> Result<f64, Failure> {
        match self.sensor.measure(quantity) {
            Ok(value) => {
                match quantity {
                    Quantity::Temperature => tracing::info!(celsius = value, "Temperature read"),
                    Quantity::Humidity => tracing::info!(humidity = value, "Humidity read"),
                }
                Ok(value)
            }
            Err(e) if e.is_bus_fault() => {
                tracing::error!("No sensor found on the bus: {}", e);
                Err(e.into())
            }
            Err(e) => {
                tracing::error!("Sensor reading rejected: {}", e);
                Err(e.into())
            }
        }
    }
}

/// Serve intents one at a time until the channel closes.
///
/// Each intent runs on the blocking pool while the next one waits, so the
/// bus never sees two measurements at once. A panic while handling is
/// answered with the generic apology and the skill keeps serving.
pub async fn serve<I2C, D, S>(skill: Skill<I2C, D>, sink: S, mut intents: mpsc::Receiver<Intent>)
where
    I2C: I2c + Send + 'static,
    D: DelayNs + Send + 'static,
    S: DialogueSink + Clone + Send + 'static,
{
    let composer = skill.composer();
    let skill = Arc::new(Mutex::new(skill));

    while let Some(intent) = intents.recv().await {
        let session_id = intent.session_id.clone();
        let worker = Arc::clone(&skill);
        let mut worker_sink = sink.clone();

        let handled = tokio::task::spawn_blocking(move || {
            let mut skill = worker.lock().unwrap_or_else(PoisonError::into_inner);
            skill.handle(&intent, &mut worker_sink)
        })
        .await;

        match handled {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::error!("Failed to end session {}: {:#}", session_id, e),
            Err(e) => {
                tracing::error!("Intent handler for session {} crashed: {}", session_id, e);
                let mut sink = sink.clone();
                let apology = composer.reaction(FailureKind::Uncategorized);
                if let Err(e) = sink.end_session(&session_id, apology) {
                    tracing::error!("Failed to end session {}: {:#}", session_id, e);
                }
            }
        }
    }

    tracing::info!("Intent channel closed, worker stopping");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntentNames;
    use crate::dialogue::tests::{intent, RecordingSink};
    use crate::sensors::sht31::tests::{FakeBus, FakeDelay, SAMPLE};
    use crate::shared::Locale;
    use embedded_hal::i2c::{ErrorKind, ErrorType, NoAcknowledgeSource, Operation};

    fn skill(bus: FakeBus) -> Skill<FakeBus, FakeDelay> {
        Skill::new(
            Sht31::new(bus, FakeDelay::default()),
            IntentRouter::new("salon", IntentNames::default()),
            ResponseComposer::new(Locale::Fr),
        )
    }

    fn bus_calls(skill: Skill<FakeBus, FakeDelay>) -> usize {
        skill.sensor.release().0.calls()
    }

    #[test]
    fn test_temperature_answer() {
        let mut skill = skill(FakeBus::returning(SAMPLE));
        let mut sink = RecordingSink::default();

        let handled = skill.handle(&intent("checkTemperature", "salon"), &mut sink).unwrap();
        let expected = "Il fait actuellement 24,9 degrés".to_string();
        assert_eq!(handled, Handled::Answered(expected.clone()));
        assert_eq!(sink.ended(), vec![("session-1".to_string(), expected)]);
    }

    #[test]
    fn test_humidity_answer() {
        let mut skill = skill(FakeBus::returning(SAMPLE));
        let mut sink = RecordingSink::default();

        skill.handle(&intent("checkHumidity", "salon"), &mut sink).unwrap();
        assert_eq!(sink.ended()[0].1, "L'humidité est de 36,1 %");
    }

    #[test]
    fn test_other_site_touches_nothing() {
        let mut skill = skill(FakeBus::returning(SAMPLE));
        let mut sink = RecordingSink::default();

        let handled = skill.handle(&intent("checkTemperature", "kitchen"), &mut sink).unwrap();
        assert_eq!(handled, Handled::Ignored);
        assert!(sink.ended().is_empty());
        assert_eq!(bus_calls(skill), 0);
    }

    #[test]
    fn test_unknown_intent_touches_nothing() {
        let mut skill = skill(FakeBus::returning(SAMPLE));
        let mut sink = RecordingSink::default();

        let handled = skill.handle(&intent("playMusic", "salon"), &mut sink).unwrap();
        assert_eq!(handled, Handled::Ignored);
        assert!(sink.ended().is_empty());
        assert_eq!(bus_calls(skill), 0);
    }

    #[test]
    fn test_bus_failure_apologizes_once() {
        for (fail_write, fail_read) in [
            (Some(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)), None),
            (None, Some(ErrorKind::Other)),
        ] {
            let mut bus = FakeBus::returning(SAMPLE);
            bus.fail_write = fail_write;
            bus.fail_read = fail_read;
            let mut skill = skill(bus);
            let mut sink = RecordingSink::default();

            skill.handle(&intent("checkHumidity", "salon"), &mut sink).unwrap();
            assert_eq!(
                sink.ended(),
                vec![(
                    "session-1".to_string(),
                    "Désolée, je n'ai pas de réponse des capteurs.".to_string()
                )]
            );
        }
    }

    #[test]
    fn test_checksum_failure_is_generic_apology() {
        let mut skill = Skill::new(
            Sht31::new(FakeBus::returning(SAMPLE), FakeDelay::default()).with_checksum_verification(true),
            IntentRouter::new("salon", IntentNames::default()),
            ResponseComposer::new(Locale::Fr),
        );
        let mut sink = RecordingSink::default();

        skill.handle(&intent("checkTemperature", "salon"), &mut sink).unwrap();
        assert_eq!(sink.ended()[0].1, "Désolée, il y a eu une erreur.");
    }

    #[derive(Debug)]
    struct PanickingBus;

    impl ErrorType for PanickingBus {
        type Error = ErrorKind;
    }

    impl I2c for PanickingBus {
        fn transaction(&mut self, _: u8, _: &mut [Operation<'_>]) -> Result<(), Self::Error> {
            panic!("bus driver bug");
        }
    }

    #[tokio::test]
    async fn test_serve_handles_intents_in_order() {
        let (tx, rx) = mpsc::channel(8);
        let sink = RecordingSink::default();

        let mut first = intent("checkTemperature", "salon");
        first.session_id = "a".to_string();
        let mut ignored = intent("checkTemperature", "garage");
        ignored.session_id = "b".to_string();
        let mut last = intent("checkHumidity", "salon");
        last.session_id = "c".to_string();

        for i in [first, ignored, last] {
            tx.send(i).await.unwrap();
        }
        drop(tx);

        serve(skill(FakeBus::returning(SAMPLE)), sink.clone(), rx).await;

        assert_eq!(
            sink.ended(),
            vec![
                ("a".to_string(), "Il fait actuellement 24,9 degrés".to_string()),
                ("c".to_string(), "L'humidité est de 36,1 %".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_serve_survives_panic() {
        let (tx, rx) = mpsc::channel(8);
        let sink = RecordingSink::default();
        let skill = Skill::new(
            Sht31::new(PanickingBus, FakeDelay::default()),
            IntentRouter::new("salon", IntentNames::default()),
            ResponseComposer::new(Locale::Fr),
        );

        let mut second = intent("checkHumidity", "salon");
        second.session_id = "session-2".to_string();
        tx.send(intent("checkTemperature", "salon")).await.unwrap();
        tx.send(second).await.unwrap();
        drop(tx);

        serve(skill, sink.clone(), rx).await;

        let apology = "Désolée, il y a eu une erreur.".to_string();
        assert_eq!(
            sink.ended(),
            vec![
                ("session-1".to_string(), apology.clone()),
                ("session-2".to_string(), apology),
            ]
        );
    }
}
