//! snips-sht31: answers "what's the temperature / humidity" on a Snips site
//!
//! Connects to the Hermes MQTT bus, listens for the two intents, reads the
//! SHT31 on the local I2C bus and ends the session with the spoken result.

use anyhow::Context;
use clap::{Parser, Subcommand};
use linux_embedded_hal::{Delay, I2cdev};
use snips_sht31::config::{Config, SensorConfig};
use snips_sht31::dialogue::composer::ResponseComposer;
use snips_sht31::dialogue::hermes::{self, HermesSink};
use snips_sht31::dialogue::router::IntentRouter;
use snips_sht31::sensors::sht31::Sht31;
use snips_sht31::sensors::Quantity;
use snips_sht31::skill::{self, Skill};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How long shutdown waits for the MQTT event loop to drain
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

// === CLI ===

#[derive(Parser)]
#[command(name = "snips-sht31")]
#[command(about = "Voice assistant skill reading an SHT31 temperature/humidity sensor")]
struct Cli {
    /// Config file to use instead of ~/.config/snips-sht31/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Answer intents for this site instead of the configured one
    #[arg(long)]
    site_id: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the config file in your editor
    Config,
    /// Take one reading and print it
    Measure,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Config) => {
            run_config_command(cli.config)?;
        }
        Some(Commands::Measure) => {
            init_tracing();
            let config = Config::load(cli.config.as_deref());
            run_measure_command(&config)?;
        }
        None => {
            init_tracing();
            let config = Config::load(cli.config.as_deref()).with_site_override(cli.site_id);
            run_skill(config).await?;
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn open_sensor(config: &SensorConfig) -> anyhow::Result<Sht31<I2cdev, Delay>> {
    let bus = I2cdev::new(&config.i2c_device)
        .with_context(|| format!("Could not open I2C bus {}", config.i2c_device.display()))?;
    Ok(Sht31::new(bus, Delay).with_checksum_verification(config.verify_checksum))
}

/// Open config file in user's editor
fn run_config_command(path: Option<PathBuf>) -> anyhow::Result<()> {
    let config_path = match path {
        Some(p) => p,
        None => Config::path().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?,
    };

    // Create config dir if needed
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Create config file from template if it doesn't exist
    if !config_path.exists() {
        let template = include_str!("../config.toml.example");
        std::fs::write(&config_path, template)?;
        println!("Created config file: {}", config_path.display());
    }

    let editor = std::env::var("EDITOR")
        .or_else(|_| std::env::var("VISUAL"))
        .unwrap_or_else(|_| "nano".to_string());

    println!("Opening {} with {}", config_path.display(), editor);

    std::process::Command::new(&editor)
        .arg(&config_path)
        .status()?;

    Ok(())
}

/// Read the sensor once and show what would be spoken
fn run_measure_command(config: &Config) -> anyhow::Result<()> {
    let mut sensor = open_sensor(&config.sensor)?;
    let raw = sensor.read_sample().context("No sensor found")?;
    if config.sensor.verify_checksum {
        raw.verify_checksums()?;
    }
    let measurement = raw.decode();
    let composer = ResponseComposer::new(config.locale);

    println!("Raw: {:02x?}", raw.bytes());
    println!("Celsius: {:.2} °C", measurement.temperature_celsius);
    println!("Humidity: {:.2} %", measurement.relative_humidity_percent);
    for quantity in [Quantity::Temperature, Quantity::Humidity] {
        println!("  \"{}\"", composer.sentence(quantity, measurement.value(quantity)));
    }

    Ok(())
}

/// Run the skill until Ctrl-C
async fn run_skill(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting snips-sht31 for site {:?}", config.site_id);

    let sensor = open_sensor(&config.sensor)?;
    let skill = Skill::new(
        sensor,
        IntentRouter::new(config.site_id.clone(), config.intents.clone()),
        ResponseComposer::new(config.locale),
    );

    let (client, eventloop) = rumqttc::AsyncClient::new(hermes::mqtt_options(&config.mqtt), 32);
    tracing::info!("mqtt -> {}:{}", config.mqtt.host, config.mqtt.port);

    let (tx, rx) = mpsc::channel(32);
    let topics = config.intent_topics().to_vec();
    let mut pump = tokio::spawn(hermes::pump(eventloop, client.clone(), topics, tx));

    tokio::select! {
        _ = skill::serve(skill, HermesSink::new(client.clone()), rx) => {}
        res = tokio::signal::ctrl_c() => {
            res.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Interrupted, shutting down");
        }
    }

    // let the event loop flush queued publishes and send the Disconnect
    match client.try_disconnect() {
        Ok(()) => {
            if tokio::time::timeout(DISCONNECT_GRACE, &mut pump).await.is_err() {
                tracing::warn!("mqtt disconnect not sent within {:?}", DISCONNECT_GRACE);
            }
        }
        Err(e) => tracing::warn!("mqtt disconnect failed: {}", e),
    }
    pump.abort();

    tracing::info!("snips-sht31 stopped");
    Ok(())
}
