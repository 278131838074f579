use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Deserialize, Serialize)]
pub struct RawConfig {
    pub lamp: Lamp,
    pub night: Night,
    pub store: Store,
}

impl RawConfig {
    /// Parse the config file at the specified path.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut file =
            File::open(path).context(format!("Failed to open config file at {:?}", path))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .context("Failed to read config file to string")?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn example() -> Self {
        Self {
            lamp: Lamp {
                max_brightness: 100,
                resolution_bits: 12,
                tick_ms: 100,
            },
            night: Night {
                start_hour: 17,
                end_hour: 8,
            },
            store: Store {
                path: PathBuf::from_str("thresholds.toml").unwrap(),
            },
        }
    }
}

#[derive(Debug, PartialEq, Deserialize, Serialize)]
pub struct Lamp {
    /// Requested max brightness, 0..=100.
    pub max_brightness: u8,

    /// PWM duty resolution in bits.
    pub resolution_bits: u8,

    /// Control tick period in milliseconds.
    pub tick_ms: u32,
}

#[derive(Debug, PartialEq, Deserialize, Serialize)]
pub struct Night {
    /// Hour of day (0..=23) at which the controller starts running.
    pub start_hour: u8,

    /// Hour of day (0..=23) at which it stops.
    pub end_hour: u8,
}

#[derive(Debug, PartialEq, Deserialize, Serialize)]
pub struct Store {
    /// Path of the TOML file holding the persisted thresholds.
    pub path: PathBuf,
}

/// Validated configuration.
#[derive(Debug)]
pub struct Config {
    pub lamp: Lamp,
    pub night: Night,
    pub store: Store,
}

impl TryFrom<RawConfig> for Config {
    type Error = anyhow::Error;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        if raw.lamp.max_brightness > 100 {
            anyhow::bail!("lamp.max_brightness must be 0..=100");
        }
        if !(1..=16).contains(&raw.lamp.resolution_bits) {
            anyhow::bail!("lamp.resolution_bits must be 1..=16");
        }
        if raw.lamp.tick_ms == 0 {
            anyhow::bail!("lamp.tick_ms must be positive");
        }
        if raw.night.start_hour > 23 || raw.night.end_hour > 23 {
            anyhow::bail!("night hours must be 0..=23");
        }
        Ok(Config {
            lamp: raw.lamp,
            night: raw.night,
            store: raw.store,
        })
    }
}

impl Config {
    /// Whether the controller is driven at this hour of day.
    pub fn is_night(&self, hour: u8) -> bool {
        if self.night.start_hour <= self.night.end_hour {
            hour >= self.night.start_hour && hour < self.night.end_hour
        } else {
            hour >= self.night.start_hour || hour < self.night.end_hour
        }
    }
}
