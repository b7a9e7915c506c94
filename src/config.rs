use anyhow::Error;
use pi_pinout::{GpioPin, PhysicalPin, WiringPiPin};
use serde::{Deserialize, Serialize};

use crate::link::Security;

#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct Config {
    pub wifi: WifiConfig,
    pub indicator: IndicatorConfig,
    #[serde(default)]
    pub bringup: BringupConfig,
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct WifiConfig {
    pub ssid: String,
    pub psk: String,
    pub security: Security,
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct IndicatorConfig {
    /// Number of pixels on the status strip, fixed by board topology
    pub pixels: usize,
    pub red_pin: Pin,
    pub green_pin: Pin,
    pub blue_pin: Pin,
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub enum Pin {
    Physical(PhysicalPin),
    Gpio(GpioPin),
    WiringPi(WiringPiPin),
}

/// Bring-up timing. Exposed as configuration so the poll loop and the probe
/// can be driven by a virtual clock in tests.
#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct BringupConfig {
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub probe_grace_ms: u64,
    pub probe_timeout_ms: u64,
    pub probe_target: String,
}

impl Default for BringupConfig {
    fn default() -> Self {
        BringupConfig {
            timeout_ms: 15_000,
            poll_interval_ms: 100,
            probe_grace_ms: 3_000,
            probe_timeout_ms: 4_000,
            probe_target: "google.com".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Config, Error> {
        Self::load_from("config.ron")
    }

    pub fn load_from(path: &str) -> Result<Config, Error> {
        let config = std::fs::read_to_string(path)?;
        let config: Config = ron::from_str(&config)?;
        Ok(config)
    }
}
