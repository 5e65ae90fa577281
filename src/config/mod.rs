//! Configuration management
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `SOFTPHONE__*` environment variables
//! (e.g. `SOFTPHONE__PBX__LOGIN=alice`).

use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "softphone.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub mode: Mode,
    pub pbx: PbxConfig,
    pub preferences: CallPreferences,
    pub demo: DemoConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
}

/// Which transport backs the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Timer-driven simulation, no network
    Demo,
    /// Real SIP transport towards the PBX
    Prod,
}

/// PBX connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PbxConfig {
    /// PBX signaling address, `host:port`
    pub server: Option<String>,
    /// SIP domain used in our URIs
    pub domain: Option<String>,
    pub login: Option<String>,
    pub password: Option<String>,
    pub display_name: Option<String>,
    /// Local UDP address for signaling
    pub bind_address: String,
    /// RTP port advertised in SDP
    pub rtp_port: u16,
    /// Registration lifetime in seconds
    pub register_expires: u32,
}

/// User call preferences and organization policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallPreferences {
    /// Ring an external device first and transfer the call to it once answered
    pub call_from_another_device: bool,
    pub external_device_number: Option<String>,
    /// Organization policy: refuse every incoming call with 488
    pub reject_incoming_calls: bool,
    /// Preferred capture device
    pub audio_input_device: Option<String>,
}

impl CallPreferences {
    /// External device to dial first, when that mode is on and configured
    pub fn external_device(&self) -> Option<&str> {
        if !self.call_from_another_device {
            return None;
        }
        self.external_device_number
            .as_deref()
            .map(str::trim)
            .filter(|number| !number.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Delay before a simulated outgoing call is answered
    pub accept_delay_ms: u64,
}

impl DemoConfig {
    pub fn accept_delay(&self) -> Duration {
        Duration::from_millis(self.accept_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Fallback filter when `RUST_LOG` is not set
    pub level: String,
}

impl Default for PbxConfig {
    fn default() -> Self {
        Self {
            server: None,
            domain: None,
            login: None,
            password: None,
            display_name: None,
            bind_address: "0.0.0.0:0".to_string(),
            rtp_port: 40000,
            register_expires: 600,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Demo,
            pbx: PbxConfig::default(),
            preferences: CallPreferences::default(),
            demo: DemoConfig {
                accept_delay_ms: 3000,
            },
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 8089,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Config {
    /// Load defaults, then `path` if it exists, then the environment
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let defaults = Self::default().to_toml()?;

        let config = config::Config::builder()
            .add_source(File::from_str(&defaults, FileFormat::Toml))
            .add_source(File::from(path.as_ref()).format(FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix("SOFTPHONE").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Parse a TOML document layered over the defaults
    pub fn from_toml(document: &str) -> Result<Self, ConfigError> {
        let defaults = Self::default().to_toml()?;

        let config = config::Config::builder()
            .add_source(File::from_str(&defaults, FileFormat::Toml))
            .add_source(File::from_str(document, FileFormat::Toml))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Why the PBX settings cannot be used, as shown to the user
    pub fn pbx_problem(&self) -> Option<&'static str> {
        if self.mode == Mode::Demo {
            return None;
        }

        let missing = |value: &Option<String>| value.as_deref().map_or(true, |v| v.trim().is_empty());

        if missing(&self.pbx.server) || missing(&self.pbx.domain) {
            return Some("PBX or Websocket address is missing. Please check your settings.");
        }
        if missing(&self.pbx.login) || missing(&self.pbx.password) {
            return Some(
                "Your login details are not set correctly. Please contact your administrator.",
            );
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.mode, Mode::Demo);
        assert_eq!(config.demo.accept_delay(), Duration::from_secs(3));
        assert_eq!(config.pbx_problem(), None);
    }

    #[test]
    fn test_toml_layering() {
        let config = Config::from_toml(
            r#"
            mode = "prod"

            [pbx]
            server = "pbx.example.com:5060"
            domain = "example.com"
            login = "alice"
            password = "secret"

            [preferences]
            reject_incoming_calls = true
            "#,
        )
        .unwrap();

        assert_eq!(config.mode, Mode::Prod);
        assert_eq!(config.pbx.login.as_deref(), Some("alice"));
        assert!(config.preferences.reject_incoming_calls);
        // Untouched sections keep their defaults
        assert_eq!(config.pbx.register_expires, 600);
        assert_eq!(config.demo.accept_delay_ms, 3000);
        assert_eq!(config.pbx_problem(), None);
    }

    #[test]
    fn test_pbx_problems() {
        let mut config = Config {
            mode: Mode::Prod,
            ..Config::default()
        };
        assert_eq!(
            config.pbx_problem(),
            Some("PBX or Websocket address is missing. Please check your settings.")
        );

        config.pbx.server = Some("pbx.example.com:5060".to_string());
        config.pbx.domain = Some("example.com".to_string());
        config.pbx.login = Some("alice".to_string());
        assert_eq!(
            config.pbx_problem(),
            Some("Your login details are not set correctly. Please contact your administrator.")
        );

        config.pbx.password = Some("secret".to_string());
        assert_eq!(config.pbx_problem(), None);
    }

    #[test]
    fn test_external_device() {
        let mut prefs = CallPreferences {
            external_device_number: Some(" 0475 11 22 33 ".to_string()),
            ..CallPreferences::default()
        };
        assert_eq!(prefs.external_device(), None);

        prefs.call_from_another_device = true;
        assert_eq!(prefs.external_device(), Some("0475 11 22 33"));

        prefs.external_device_number = Some("   ".to_string());
        assert_eq!(prefs.external_device(), None);
    }
}
