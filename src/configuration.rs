use crate::error::{BlindsError, Result};
use secrecy::Secret;
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};
use tracing::*;

/// Use default config if no path is provided
pub fn get_configuration(config: Option<PathBuf>) -> Result<AppConfig> {
    let settings = config::Config::builder();

    let settings = if let Some(config) = config {
        info!("Using configuration from {:?}", config);
        settings.add_source(config::File::from(config))
    } else {
        info!("Using default configuration");
        settings
            .add_source(config::File::with_name("configuration/settings").required(false))
            .add_source(config::File::with_name("configuration/dev_settings").required(false))
    };

    let settings = settings
        .add_source(config::Environment::with_prefix("APP").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub covers: CoverConfig,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    /// Names or ids exposed by the bridge, empty exposes every installed device
    #[serde(default)]
    pub devices: Vec<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ControllerConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<Secret<String>>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl ControllerConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_owned(),
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(BlindsError::MissingBaseUrl);
        }
        Ok(())
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username: None,
            password: None,
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct CoverConfig {
    /// Time a blind takes to travel from fully closed to fully open
    #[serde(default = "default_move_time_seconds")]
    pub move_time_seconds: f64,
    /// Pause between members when a group dispatches sequentially
    #[serde(default = "default_group_command_delay_ms")]
    pub group_command_delay_ms: u64,
}

impl CoverConfig {
    pub fn move_time(&self) -> Duration {
        Duration::from_secs_f64(self.move_time_seconds.max(0.0))
    }

    pub fn group_command_delay(&self) -> Duration {
        Duration::from_millis(self.group_command_delay_ms)
    }
}

impl Default for CoverConfig {
    fn default() -> Self {
        Self {
            move_time_seconds: default_move_time_seconds(),
            group_command_delay_ms: default_group_command_delay_ms(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Dispatch {
    #[default]
    Sequential,
    Parallel,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GroupConfig {
    pub name: String,
    /// Device names or `adr,ept` ids
    pub devices: Vec<String>,
    #[serde(default)]
    pub dispatch: Dispatch,
}

#[derive(Deserialize, Debug, Clone)]
pub struct PollerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval_seconds")]
    pub interval_seconds: u64,
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(1))
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: default_poll_interval_seconds(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct MqttConfig {
    #[serde(default = "default_broker_host")]
    pub broker_host: String,
    #[serde(default = "default_broker_port")]
    pub broker_port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_base_route")]
    pub base_route: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: default_broker_host(),
            broker_port: default_broker_port(),
            client_id: default_client_id(),
            base_route: default_base_route(),
        }
    }
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_move_time_seconds() -> f64 {
    30.0
}

fn default_group_command_delay_ms() -> u64 {
    150
}

fn default_poll_interval_seconds() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_broker_host() -> String {
    String::from("localhost")
}

fn default_broker_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    String::from("blinds-bridge")
}

fn default_base_route() -> String {
    String::from("blinds")
}
