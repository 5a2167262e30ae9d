use std::{env, fs, path::PathBuf, time::Duration};

use opccomm::{BROADCAST_CHANNEL, DEFAULT_PORT, Pixel};
use serde::Deserialize;

use crate::{
  correction::DEFAULT_GAMMA,
  pixel::{MAX_LEDS, MIN_LEDS},
};

const ENV_CONFIG: &str = "OPCLED_CONFIG";
const ENV_HOST: &str = "OPCLED_HOST";
const ENV_PORT: &str = "OPCLED_PORT";
const ENV_LED_COUNT: &str = "OPCLED_LED_COUNT";
const ENV_CHANNEL: &str = "OPCLED_CHANNEL";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
  pub host: String,
  pub port: u16,
  pub channel: u8,
  pub led_count: usize,
  pub gamma: f32,
  pub connect_timeout_ms: u64,
  pub close_timeout_ms: u64,
  pub animation: AnimationDefaults,
}

/// Starting values for the live animation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnimationDefaults {
  pub color: Pixel,
  pub brightness: u8,
  pub speed: u8,
  pub span: u8,
  pub mixer_delay_ms: u32,
  pub pulse_delay_ms: u32,
  pub pulse_pause_ms: u32,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      host: "127.0.0.1".to_string(),
      port: DEFAULT_PORT,
      channel: BROADCAST_CHANNEL,
      led_count: 64,
      gamma: DEFAULT_GAMMA,
      connect_timeout_ms: 1_000,
      close_timeout_ms: 400,
      animation: AnimationDefaults::default(),
    }
  }
}

impl Default for AnimationDefaults {
  fn default() -> Self {
    Self {
      color: [0xFF, 0x00, 0x00],
      brightness: 100,
      speed: 60,
      span: 5,
      mixer_delay_ms: 10,
      pulse_delay_ms: 10,
      pulse_pause_ms: 1_000,
    }
  }
}

impl Config {
  /// Defaults, then the JSON file named by `OPCLED_CONFIG`, then individual env overrides.
  pub fn load() -> Result<Self, ConfigError> {
    let mut config = match env::var(ENV_CONFIG) {
      Ok(path) => Self::from_file(PathBuf::from(path))?,
      Err(_) => Self::default(),
    };

    if let Ok(host) = env::var(ENV_HOST) {
      config.host = host;
    }
    if let Some(port) = env_override(ENV_PORT)? {
      config.port = port;
    }
    if let Some(led_count) = env_override(ENV_LED_COUNT)? {
      config.led_count = led_count;
    }
    if let Some(channel) = env_override(ENV_CHANNEL)? {
      config.channel = channel;
    }

    config.validate()?;
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
  }

  pub fn from_file(path: PathBuf) -> Result<Self, ConfigError> {
    let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Load { path, source })?;
    let config = Self::from_json(&raw)?;
    Ok(config)
  }

  pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
    let config: Self = serde_json::from_str(raw)?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    validate_led_count(self.led_count)
  }

  pub fn addr(&self) -> String {
    format!("{}:{}", self.host, self.port)
  }

  pub fn connect_timeout(&self) -> Duration {
    Duration::from_millis(self.connect_timeout_ms)
  }

  pub fn close_timeout(&self) -> Duration {
    Duration::from_millis(self.close_timeout_ms)
  }
}

pub fn validate_led_count(led_count: usize) -> Result<(), ConfigError> {
  if (MIN_LEDS..=MAX_LEDS).contains(&led_count) {
    Ok(())
  } else {
    Err(ConfigError::LedCount(led_count))
  }
}

fn env_override<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
  match env::var(var) {
    Ok(value) => value
      .parse()
      .map(Some)
      .map_err(|_| ConfigError::Env { var, value }),
    Err(_) => Ok(None),
  }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
  #[error("led count {0} is outside {MIN_LEDS}..={MAX_LEDS}")]
  LedCount(usize),
  #[error("failed to read configuration file {path:?}: {source}")]
  Load {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("invalid configuration: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("invalid value {value:?} for {var}")]
  Env { var: &'static str, value: String },
}
