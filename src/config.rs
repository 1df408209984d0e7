// Connection defaults, input timing, motion parameters, command line
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::commander::Step;
use crate::messages::WeatherParameter;

// AirSim RPC endpoint
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 41451;

// Protocol version handshake
pub const CLIENT_VERSION: i64 = 1;
pub const MIN_REQUIRED_SERVER_VERSION: i64 = 1;

// AirSim call defaults
pub const TAKEOFF_TIMEOUT_SEC: f32 = 20.0;
pub const ROTATE_TIMEOUT_SEC: f32 = 3e38;
pub const ROTATE_MARGIN_DEG: f32 = 5.0;

// Wait after takeoff/hover before checking the landed state
pub const SETTLE_DELAY: Duration = Duration::from_millis(1000);

// Upper bound on the hover issued at shutdown
pub const SHUTDOWN_HOVER_TIMEOUT: Duration = Duration::from_secs(5);

/// Error loading a motion config file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Motion parameters used by the input loop
///
/// Missing fields in a config file keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Distance and velocity passed to every translation the loop issues
    pub loop_step: Step,
    /// Passed to the turn operations, which do not use it to compute the target
    pub turn_degrees: f32,
    /// Absolute yaw targeted by turn right; turn left targets its negation
    pub turn_yaw_deg: f32,
    /// Timeout attached to each move request
    pub move_timeout_sec: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            loop_step: Step::DEFAULT,
            turn_degrees: 15.0,
            turn_yaw_deg: 90.0,
            move_timeout_sec: 120.0,
        }
    }
}

impl MotionConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// One `NAME=VALUE` weather setting from the command line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherSetting {
    pub parameter: WeatherParameter,
    pub value: f32,
}

impl FromStr for WeatherSetting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
        let parameter = name.trim().parse()?;
        let value: f32 = value
            .trim()
            .parse()
            .map_err(|e| format!("invalid weather value '{}': {}", value, e))?;
        if !(0.0..=1.0).contains(&value) {
            return Err(format!("weather value {} outside [0, 1]", value));
        }
        Ok(Self { parameter, value })
    }
}

/// Fly an AirSim quadrotor from the keyboard
///
/// Arrows move north/south/east/west, W/S climb/descend, A/D turn,
/// Q or Esc quits.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct Args {
    /// Simulator host
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Simulator RPC port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Vehicle name (empty selects the default vehicle)
    #[arg(long, default_value = "")]
    pub vehicle: String,

    /// Weather effect as NAME=VALUE, repeatable
    #[arg(long = "weather", value_name = "NAME=VALUE", default_value = "rain=0.5")]
    pub weather: Vec<WeatherSetting>,

    /// Leave the simulator's weather untouched
    #[arg(long)]
    pub no_weather: bool,

    /// How long a key counts as held after an autorepeat event, for terminals without release events
    #[arg(long, default_value_t = 150)]
    pub hold_ms: u64,

    /// How long a key counts as held after its first press; covers the OS autorepeat delay
    #[arg(long, default_value_t = 600)]
    pub repeat_delay_ms: u64,

    /// Longest wait for keyboard input per loop iteration
    #[arg(long, default_value_t = 10)]
    pub poll_ms: u64,

    /// Delay after takeoff before checking the vehicle left the ground
    #[arg(long, default_value_t = SETTLE_DELAY.as_millis() as u64)]
    pub settle_ms: u64,

    /// JSON file overriding motion parameters
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Args {
    /// Weather to apply, or none when disabled
    pub fn weather_settings(&self) -> Vec<WeatherSetting> {
        if self.no_weather {
            Vec::new()
        } else {
            self.weather.clone()
        }
    }

    pub fn motion_config(&self) -> Result<MotionConfig, ConfigError> {
        match &self.config {
            Some(path) => MotionConfig::load(path),
            None => Ok(MotionConfig::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::try_parse_from(["airsim-teleop"]).unwrap();
        assert_eq!(args.host, DEFAULT_HOST);
        assert_eq!(args.port, 41451);
        assert_eq!(args.settle_ms, 1000);
        // First press outlasts the autorepeat delay; repeats use the short hold
        assert!(args.repeat_delay_ms > args.hold_ms);
        assert_eq!(
            args.weather_settings(),
            vec![WeatherSetting {
                parameter: WeatherParameter::Rain,
                value: 0.5
            }]
        );
    }

    #[test]
    fn test_repeated_weather_and_disable() {
        let args = Args::try_parse_from([
            "airsim-teleop",
            "--weather",
            "fog=0.2",
            "--weather",
            "snow=1",
        ])
        .unwrap();
        let settings = args.weather_settings();
        assert_eq!(settings.len(), 2);
        assert_eq!(settings[0].parameter, WeatherParameter::Fog);
        assert_eq!(settings[1].value, 1.0);

        let args = Args::try_parse_from(["airsim-teleop", "--no-weather"]).unwrap();
        assert!(args.weather_settings().is_empty());
    }

    #[test]
    fn test_invalid_weather_rejected() {
        assert!("rain".parse::<WeatherSetting>().is_err());
        assert!("rain=1.5".parse::<WeatherSetting>().is_err());
        assert!("hail=0.5".parse::<WeatherSetting>().is_err());
        assert!(Args::try_parse_from(["airsim-teleop", "--weather", "rain=x"]).is_err());
    }

    #[test]
    fn test_motion_config_partial_override() {
        let config = MotionConfig::from_json(r#"{ "loop_step": { "distance": 5.0, "velocity": 4.0 } }"#)
            .unwrap();
        assert_eq!(config.loop_step, Step::new(5.0, 4.0));
        assert_eq!(config.turn_yaw_deg, 90.0);
        assert_eq!(config.move_timeout_sec, 120.0);
    }

    #[test]
    fn test_missing_config_file() {
        let err = MotionConfig::load(Path::new("/nonexistent/motion.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
