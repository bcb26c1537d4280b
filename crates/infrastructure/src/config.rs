use config::{Config, ConfigError, Environment, File};
use domain::DomainError;
use domain::device::DeviceProfile;
use domain::metric::{BillingPlan, PowerGroupDefinition, PueDefinition};
use domain::rack::Rack;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
}

fn default_topic_prefix() -> String {
    "facility".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_history_depth")]
    pub history_depth: usize,
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

fn default_history_depth() -> usize {
    10
}
fn default_stale_after() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            history_depth: default_history_depth(),
            stale_after_secs: default_stale_after(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CommandConfig {
    #[serde(default = "default_command_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
}

fn default_command_timeout() -> u64 {
    5000
}
fn default_max_pending() -> usize {
    64
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_command_timeout(),
            max_pending: default_max_pending(),
        }
    }
}

impl CommandConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LivenessConfig {
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default = "default_missed_threshold")]
    pub missed_threshold: u32,
}

fn default_check_interval() -> u64 {
    15
}
fn default_missed_threshold() -> u32 {
    2
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            missed_threshold: default_missed_threshold(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct MetricsConfig {
    #[serde(default)]
    pub pue: Vec<PueDefinition>,
    #[serde(default)]
    pub power_groups: Vec<PowerGroupDefinition>,
    #[serde(default)]
    pub billing: Vec<BillingPlan>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ListenerConfig {
    #[serde(default = "default_listener_id")]
    pub listener_id: String,
    pub mqtt: MqttConfig,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_buffer_path")]
    pub buffer_path: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub commands: CommandConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    #[serde(default)]
    pub devices: Vec<DeviceProfile>,
    #[serde(default)]
    pub racks: Vec<Rack>,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

fn default_listener_id() -> String {
    "facility-listener".to_string()
}
fn default_database_url() -> String {
    "sqlite://data/facility.db?mode=rwc".to_string()
}
fn default_buffer_path() -> String {
    "sqlite://data/listener_buffer.db?mode=rwc".to_string()
}
fn default_api_port() -> u16 {
    3000
}
fn default_heartbeat_interval() -> u64 {
    30
}

impl ListenerConfig {
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .set_default("mqtt.host", "localhost")?
            .set_default("mqtt.port", 1883)?
            // Site configuration, required so the listener never starts without devices
            .add_source(File::with_name(&format!("{}/default", config_dir)).required(true))
            // Per-environment overrides
            .add_source(File::with_name(&format!("{}/{}", config_dir, run_mode)).required(false))
            // Environment variables (e.g. FACILITY__MQTT__HOST=10.0.0.1)
            .add_source(Environment::with_prefix("FACILITY").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    pub fn client_id(&self) -> String {
        self.mqtt
            .client_id
            .clone()
            .unwrap_or_else(|| self.listener_id.clone())
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.cache.stale_after_secs)
    }

    /// Check device profiles and metric definitions before anything starts
    pub fn validate(&self) -> Result<(), DomainError> {
        let mut seen = HashSet::new();
        for device in &self.devices {
            device.validate()?;
            if !seen.insert(device.id.clone()) {
                return Err(DomainError::InvalidConfiguration(format!(
                    "Duplicate device id {}",
                    device.id
                )));
            }
        }

        for pue in &self.metrics.pue {
            pue.validate()?;
        }

        for group in &self.metrics.power_groups {
            if group.analyzers.is_empty() {
                return Err(DomainError::InvalidConfiguration(format!(
                    "Power group {} has no analyzers",
                    group.group
                )));
            }
        }

        for plan in &self.metrics.billing {
            if plan.meters.is_empty() || plan.tariff_per_kwh < 0.0 {
                return Err(DomainError::InvalidConfiguration(format!(
                    "Billing plan for tenant {} needs meters and a non-negative tariff",
                    plan.tenant_id
                )));
            }
        }

        Ok(())
    }
}
