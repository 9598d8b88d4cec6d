//! Hermes protocol over MQTT: intent messages in, endSession out

use super::{DialogueSink, Intent};
use crate::config::MqttConfig;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, Outgoing, QoS};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

pub const END_SESSION_TOPIC: &str = "hermes/dialogueManager/endSession";

// === Wire Types ===

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentMessage {
    pub session_id: String,
    #[serde(default)]
    pub site_id: String,
    pub intent: IntentClassification,
    #[serde(default)]
    pub input: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentClassification {
    pub intent_name: String,
    #[serde(default)]
    pub confidence_score: Option<f32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndSessionMessage<'a> {
    pub session_id: &'a str,
    pub text: &'a str,
}

impl From<IntentMessage> for Intent {
    fn from(msg: IntentMessage) -> Self {
        Intent {
            name: msg.intent.intent_name,
            site_id: msg.site_id,
            session_id: msg.session_id,
        }
    }
}

pub fn parse_intent(payload: &[u8]) -> Result<IntentMessage, serde_json::Error> {
    serde_json::from_slice(payload)
}

// === Session Sink ===

/// Ends sessions by publishing on the dialogue manager topic
#[derive(Debug, Clone)]
pub struct HermesSink {
    client: AsyncClient,
}

impl HermesSink {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

impl DialogueSink for HermesSink {
    fn end_session(&mut self, session_id: &str, text: &str) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(&EndSessionMessage { session_id, text })?;
        // try_publish never waits, so it is safe from the blocking worker
        self.client
            .try_publish(END_SESSION_TOPIC, QoS::AtLeastOnce, false, payload)?;
        tracing::debug!("endSession {} -> {:?}", session_id, text);
        Ok(())
    }
}

// === Connection ===

pub fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let mut opts = MqttOptions::new(&config.client_id, &config.host, config.port);
    opts.set_keep_alive(Duration::from_secs(30));
    if let Some(username) = &config.username {
        opts.set_credentials(username, config.password.as_deref().unwrap_or(""));
    }
    opts
}

/// Whether the event loop should keep going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Drive the MQTT event loop, forwarding intents to the worker.
///
/// Returns once our Disconnect has gone out, so everything queued before it
/// (pending endSession publishes included) reached the broker.
pub async fn pump(
    mut eventloop: EventLoop,
    client: AsyncClient,
    topics: Vec<String>,
    intents: mpsc::Sender<Intent>,
) {
    loop {
        match eventloop.poll().await {
            Ok(event) => {
                if dispatch(event, &client, &topics, &intents).await == Flow::Stop {
                    return;
                }
            }
            Err(e) => {
                tracing::error!("mqtt eventloop error: {}; retrying in 2s", e);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

/// React to one event from the broker connection.
///
/// Subscriptions are (re)issued on every ConnAck so a broker restart does
/// not silently stop the skill.
pub async fn dispatch(
    event: Event,
    client: &AsyncClient,
    topics: &[String],
    intents: &mpsc::Sender<Intent>,
) -> Flow {
    match event {
        Event::Incoming(Incoming::ConnAck(ack)) => {
            tracing::info!("mqtt connected: {:?}", ack.code);
            for topic in topics {
                match client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                    Ok(()) => tracing::info!("subscribed: {}", topic),
                    Err(e) => tracing::error!("subscribe error for '{}': {}", topic, e),
                }
            }
        }
        Event::Incoming(Incoming::Publish(p)) => match parse_intent(&p.payload) {
            Ok(msg) => {
                tracing::info!(
                    "{} <- session {} from site {:?} (confidence {:?})",
                    p.topic,
                    msg.session_id,
                    msg.site_id,
                    msg.intent.confidence_score
                );
                if let Some(input) = &msg.input {
                    tracing::debug!("heard: {:?}", input);
                }
                if intents.send(msg.into()).await.is_err() {
                    tracing::info!("Intent worker gone, stopping mqtt loop");
                    return Flow::Stop;
                }
            }
            Err(e) => tracing::warn!("Dropping malformed intent on {}: {}", p.topic, e),
        },
        Event::Outgoing(Outgoing::Disconnect) => {
            tracing::info!("mqtt disconnect sent");
            return Flow::Stop;
        }
        other => tracing::trace!("mqtt event: {:?}", other),
    }
    Flow::Continue
}
