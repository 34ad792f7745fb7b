//! Configuration management for the sht21pid daemon.
//!
//! Handles locating, parsing and validating the YAML file that lists the
//! installed sensors, the multiplexer addresses and the three output sinks.

use log::{LevelFilter, debug, info};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{drivers::sht21::protocol::SHT21_ADDR, error::ConfigError, sensors::SensorRegistry};

/// Name of the process log inside `log_directory`.
pub const APPLICATION_LOG_NAME: &str = "sht21-application.log";

/// Placeholder user shipped in the sample configuration.
const PLACEHOLDER_USER: &str = "invalid";

/// Immutable configuration, loaded once at startup.
///
/// # Example
///
/// ```yaml
/// version: 1
/// SENSORS:
///   present: "0x0003"
///   mux1_addr: "0x70"
///   mux2_addr: "0x71"
/// LEDS:
///   enabled: true
///   humidity_threshold: 60.0
/// INFLUX:
///   enabled: false
///   server: "localhost:8086"
///   database: "storage"
///   user: "writer"
///   password: "secret"
/// CONFIGURATION:
///   log_directory: "/var/log/sht21pid/"
///   log_file: "readings.csv"
///   log_enabled: true
///   log_level: "INFO"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Configuration version for compatibility checking.
    pub version: u8,

    #[serde(rename = "SENSORS", alias = "sensors")]
    pub sensors: SensorsCfg,

    #[serde(rename = "LEDS", alias = "leds")]
    pub leds: LedsCfg,

    #[serde(rename = "INFLUX", alias = "influx")]
    pub influx: InfluxCfg,

    #[serde(rename = "CONFIGURATION", alias = "configuration")]
    pub configuration: GeneralCfg,
}

/// Installed sensors and the multiplexers in front of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorsCfg {
    /// Presence bitmask, bit `i` set means slot `i + 1` is installed.
    #[serde(with = "hex")]
    pub present: u16,

    /// Bus address of the multiplexer for slots 1-8.
    #[serde(with = "hex")]
    pub mux1_addr: u8,

    /// Bus address of the multiplexer for slots 9-16.
    #[serde(with = "hex")]
    pub mux2_addr: u8,

    /// Bus number, opened as `/dev/i2c-<bus>`.
    #[serde(default = "defaults::bus")]
    pub bus: u8,
}

/// Indicator LEDs and the humidity threshold that drives them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedsCfg {
    #[serde(with = "flag")]
    pub enabled: bool,

    /// Readings strictly above this relative humidity light their channel.
    pub humidity_threshold: f64,

    /// Number of physical indicator channels.
    #[serde(default = "defaults::led_count")]
    pub count: usize,

    #[serde(default = "defaults::led_gpio")]
    pub gpio: i32,

    #[serde(default = "defaults::led_dma")]
    pub dma: i32,

    #[serde(default = "defaults::led_frequency_hz")]
    pub frequency_hz: u32,

    #[serde(default = "defaults::led_brightness")]
    pub brightness: u8,

    #[serde(default)]
    pub invert: bool,

    /// Colours as `0xGGRRBB` (strip byte order), indexed by the per-channel count.
    #[serde(default = "defaults::led_palette")]
    pub palette: [u32; 4],
}

/// Remote time-series store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxCfg {
    #[serde(with = "flag")]
    pub enabled: bool,

    /// `host:port` of the write endpoint.
    pub server: String,
    pub database: String,
    pub user: String,
    pub password: String,

    #[serde(default = "defaults::timeout_seconds")]
    pub timeout_seconds: u64,
}

/// Logging and scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralCfg {
    pub log_directory: PathBuf,

    /// Data log, relative to `log_directory`.
    pub log_file: String,

    #[serde(with = "flag")]
    pub log_enabled: bool,

    pub log_level: String,

    /// Seconds between poll cycles in daemon mode.
    #[serde(default = "defaults::poll_interval")]
    pub poll_interval: u64,
}

impl Config {
    /// Loads configuration from `path` or the standard locations.
    ///
    /// Searches in this order:
    /// 1. Provided path parameter
    /// 2. `SHT21PID_CONFIG` environment variable
    /// 3. `$XDG_CONFIG_HOME/sht21pid/config.yml` or `~/.config/sht21pid/config.yml`
    /// 4. `/etc/sht21pid/config.yml`
    pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p,
            None => locate_config()?,
        };

        info!("Loading config from: {}", config_path.display());
        Self::load_from_path(&config_path)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Config =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Checks values that parse but cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::UnsupportedVersion(self.version));
        }

        let SensorsCfg {
            mux1_addr,
            mux2_addr,
            ..
        } = self.sensors;
        for (name, addr) in [("mux1_addr", mux1_addr), ("mux2_addr", mux2_addr)] {
            if addr > 0x7F {
                return Err(invalid(format!(
                    "SENSORS.{name} 0x{addr:02X} is not a 7-bit bus address"
                )));
            }
            if addr == SHT21_ADDR {
                return Err(invalid(format!(
                    "SENSORS.{name} 0x{addr:02X} collides with the sensor address"
                )));
            }
        }
        if mux1_addr == mux2_addr {
            return Err(invalid(format!(
                "SENSORS.mux1_addr and mux2_addr are both 0x{mux1_addr:02X}"
            )));
        }

        if !self.leds.humidity_threshold.is_finite() {
            return Err(invalid("LEDS.humidity_threshold must be a finite number"));
        }
        if self.leds.count == 0 {
            return Err(invalid("LEDS.count must be at least 1"));
        }

        if self.influx.enabled {
            if self.influx.user == PLACEHOLDER_USER {
                return Err(invalid(
                    "configure the INFLUX user and password before enabling it",
                ));
            }
            if self.influx.server.trim().is_empty() {
                return Err(invalid("INFLUX.server must not be empty"));
            }
        }

        if self.influx.timeout_seconds == 0 {
            return Err(invalid("INFLUX.timeout_seconds must be positive"));
        }

        if self.configuration.poll_interval == 0 {
            return Err(invalid("CONFIGURATION.poll_interval must be positive"));
        }
        self.level_filter()?;

        Ok(())
    }

    /// Installed sensors in ascending slot order.
    pub fn registry(&self) -> SensorRegistry {
        SensorRegistry::from_mask(self.sensors.present)
    }

    /// Full path of the data log.
    pub fn data_log_path(&self) -> PathBuf {
        self.configuration
            .log_directory
            .join(&self.configuration.log_file)
    }

    /// Full path of the process log.
    pub fn application_log_path(&self) -> PathBuf {
        self.configuration
            .log_directory
            .join(APPLICATION_LOG_NAME)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.configuration.poll_interval)
    }

    /// `log_level` as a filter; accepts the usual level names in any case.
    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        parse_level(&self.configuration.log_level)
    }

    /// Writes the effective configuration to the debug log, password redacted.
    pub fn log_summary(&self) {
        debug!("SENSORS.present:\t\t0x{:04X}", self.sensors.present);
        debug!("SENSORS.mux1_addr:\t\t0x{:02X}", self.sensors.mux1_addr);
        debug!("SENSORS.mux2_addr:\t\t0x{:02X}", self.sensors.mux2_addr);
        debug!("SENSORS.bus:\t\t\t{}", self.sensors.bus);
        debug!("LEDS.enabled:\t\t\t{}", self.leds.enabled);
        debug!("LEDS.humidity_threshold:\t{}", self.leds.humidity_threshold);
        debug!("LEDS.count:\t\t\t{}", self.leds.count);
        debug!("INFLUX.enabled:\t\t{}", self.influx.enabled);
        debug!("INFLUX.server:\t\t\t{}", self.influx.server);
        debug!("INFLUX.database:\t\t{}", self.influx.database);
        debug!("INFLUX.user:\t\t\t{}", self.influx.user);
        debug!("INFLUX.password:\t\t********");
        debug!("CONFIGURATION.log_enabled:\t{}", self.configuration.log_enabled);
        debug!("CONFIGURATION.log_file:\t{}", self.data_log_path().display());
        debug!("CONFIGURATION.log_level:\t{}", self.configuration.log_level);
        debug!("CONFIGURATION.poll_interval:\t{}", self.configuration.poll_interval);
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

fn parse_level(level: &str) -> Result<LevelFilter, ConfigError> {
    match level.trim().to_ascii_uppercase().as_str() {
        "WARNING" => Ok(LevelFilter::Warn),
        "CRITICAL" | "FATAL" => Ok(LevelFilter::Error),
        other => other
            .parse::<LevelFilter>()
            .map_err(|_| invalid(format!("unknown log level '{level}'"))),
    }
}

fn locate_config() -> Result<PathBuf, ConfigError> {
    // 2) ENV
    if let Ok(env_path) = env::var("SHT21PID_CONFIG") {
        return Ok(PathBuf::from(env_path));
    }

    // 3) XDG_CONFIG_HOME or $HOME/.config
    if let Some(mut cfg_dir) = env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|h| Path::new(&h).join(".config")))
    {
        cfg_dir.push("sht21pid/config.yml");
        if cfg_dir.exists() {
            return Ok(cfg_dir);
        }
    }

    // 4) /etc
    let etc = Path::new("/etc/sht21pid/config.yml");
    if etc.exists() {
        return Ok(etc.to_path_buf());
    }

    Err(ConfigError::NotFound)
}

mod defaults {
    pub fn bus() -> u8 {
        1
    }

    pub fn led_count() -> usize {
        4
    }

    pub fn led_gpio() -> i32 {
        18
    }

    pub fn led_dma() -> i32 {
        10
    }

    pub fn led_frequency_hz() -> u32 {
        800_000
    }

    pub fn led_brightness() -> u8 {
        63
    }

    /// Off, dim green, dim yellow, magenta (`0xGGRRBB`).
    pub fn led_palette() -> [u32; 4] {
        [0x000000, 0x050000, 0x101000, 0x006463]
    }

    pub fn timeout_seconds() -> u64 {
        10
    }

    pub fn poll_interval() -> u64 {
        60
    }
}

/// Hex values given as strings, with or without `0x`.
///
/// Bare YAML integers are rejected; YAML has already read their digits as decimal.
mod hex {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use serde_yaml::Value;

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<u64>,
    {
        let text = match Value::deserialize(deserializer)? {
            Value::String(s) => s,
            Value::Number(n) => {
                return Err(D::Error::custom(format!(
                    "hex value {n} must be quoted, e.g. \"0x{n}\""
                )));
            }
            other => {
                return Err(D::Error::custom(format!(
                    "expected a quoted hex string, found {other:?}"
                )));
            }
        };

        let digits = text.trim();
        let digits = digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(digits);
        let value = u64::from_str_radix(digits, 16)
            .map_err(|e| D::Error::custom(format!("invalid hex value '{text}': {e}")))?;
        T::try_from(value).map_err(|_| D::Error::custom(format!("hex value 0x{value:X} out of range")))
    }

    pub fn serialize<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Copy + Into<u64>,
    {
        serializer.serialize_str(&format!("0x{:02X}", (*value).into()))
    }
}

/// Booleans given as YAML booleans or as `"True"`/`"false"` strings.
mod flag {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FlagValue {
        Bool(bool),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match FlagValue::deserialize(deserializer)? {
            FlagValue::Bool(b) => Ok(b),
            FlagValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(true),
                "false" | "no" | "off" | "0" => Ok(false),
                _ => Err(D::Error::custom(format!("invalid boolean '{s}'"))),
            },
        }
    }

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(*value)
    }
}
