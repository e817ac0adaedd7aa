use lazy_static::lazy_static;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_yml;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unable to parse config file: {0}")]
    Yaml(#[from] serde_yml::Error),
    #[error("Config section {0} not known")]
    UnknownBase(String),
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

fn httpd_enabled_default() -> bool { return true }
fn httpd_port_default() -> u16 { return 8080 }

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct HttpdConfig {
    #[serde(default="httpd_enabled_default")]
    pub enabled: bool,
    #[serde(default="httpd_port_default")]
    pub port: u16
}

fn meter_port_name_default() -> String { return "/dev/ttyUSB0".to_string() }
fn meter_baud_rate_default() -> u32 { return 300 }
fn meter_device_address_default() -> String { return String::new() }
fn meter_timeout_default() -> u64 { return 60 }
fn meter_retries_default() -> u32 { return 1 }
fn meter_settle_ms_default() -> u64 { return 500 }
fn meter_interval_default() -> u64 { return 300 }
fn meter_stop_timeout_default() -> u64 { return 10 }

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct MeterConfig {
    #[serde(default="meter_port_name_default")]
    pub port_name: String,
    /// Initial baud rate, mode A/B/C meters always answer at 300 first
    #[serde(default="meter_baud_rate_default")]
    pub baud_rate: u32,
    #[serde(default="meter_device_address_default")]
    pub device_address: String,
    /// Seconds to wait for a complete telegram
    #[serde(default="meter_timeout_default")]
    pub timeout: u64,
    /// Additional attempts after the first one failed
    #[serde(default="meter_retries_default")]
    pub retries: u32,
    #[serde(default="meter_settle_ms_default")]
    pub settle_ms: u64,
    /// Seconds between two polls
    #[serde(default="meter_interval_default")]
    pub interval: u64,
    #[serde(default="meter_stop_timeout_default")]
    pub stop_timeout: u64,
}

impl MeterConfig {
    pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout) }
    pub fn settle_delay(&self) -> Duration { Duration::from_millis(self.settle_ms) }
    pub fn interval(&self) -> Duration { Duration::from_secs(self.interval) }
    pub fn stop_timeout(&self) -> Duration { Duration::from_secs(self.stop_timeout) }
}

fn cache_path_default() -> String { return "/tmp/emlog-cache".to_string() }
fn cache_persistent_default() -> bool { return true }

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct CacheConfig {
    #[serde(default="cache_path_default")]
    pub path: String,
    /// false keeps measurements in memory only
    #[serde(default="cache_persistent_default")]
    pub persistent: bool,
}

fn httpd_default() -> HttpdConfig { return HttpdConfig { enabled: httpd_enabled_default(), port: httpd_port_default() } }
fn meter_default() -> MeterConfig {
    return MeterConfig {
        port_name: meter_port_name_default(),
        baud_rate: meter_baud_rate_default(),
        device_address: meter_device_address_default(),
        timeout: meter_timeout_default(),
        retries: meter_retries_default(),
        settle_ms: meter_settle_ms_default(),
        interval: meter_interval_default(),
        stop_timeout: meter_stop_timeout_default(),
    }
}
fn cache_default() -> CacheConfig { return CacheConfig { path: cache_path_default(), persistent: cache_persistent_default() } }

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Config {
    #[serde(default="httpd_default")]
    pub httpd: HttpdConfig,
    #[serde(default="meter_default")]
    pub meter: MeterConfig,
    #[serde(default="cache_default")]
    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config { httpd: httpd_default(), meter: meter_default(), cache: cache_default() }
    }
}

impl Config {
    pub fn from_yaml(contents: &str) -> Result<Config, ConfigError> {
        /* An empty file is a valid config with every default */
        if contents.trim().is_empty() {
            return Ok(Config::default());
        }
        let config: Config = serde_yml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.meter.interval == 0 {
            return Err(ConfigError::Invalid("meter.interval must be at least 1 second".to_string()));
        }
        Ok(())
    }

    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Config::from_yaml(&contents)
    }

    /// Applies `PORT` from the environment on top of the file values.
    fn apply_env(&mut self, port: Option<String>) {
        if let Some(p) = port {
            match p.trim().parse::<u16>() {
                Ok(port) => self.httpd.port = port,
                Err(_) => warn!("Ignoring invalid PORT value {p:?}"),
            }
        }
    }
}

pub struct ConfigHolder {
    pub config: Config,
    pub source: Option<PathBuf>,
}

pub enum ConfigBases {
    Httpd(HttpdConfig),
    Meter(MeterConfig),
    Cache(CacheConfig),
}

fn candidate_paths(env_path: Option<String>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(p) = env_path {
        paths.push(PathBuf::from(p));
    }
    paths.push(PathBuf::from("config/emlog.yaml"));
    paths.push(PathBuf::from("emlog.yaml"));
    paths
}

impl ConfigHolder {
    pub fn load() -> Self {
        let holder = Self::load_from(
            &candidate_paths(std::env::var("EMLOG_CONFIG").ok()),
            std::env::var("PORT").ok(),
        );
        match holder {
            Ok(h) => h,
            Err(e) => panic!("Unable to load configuration: {e}"),
        }
    }

    /// Uses the first existing file out of `paths`, defaults when there is none.
    pub fn load_from(paths: &[PathBuf], port: Option<String>) -> Result<Self, ConfigError> {
        let mut source = None;
        let mut config = Config::default();

        match paths.iter().find(|p| p.is_file()) {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                config = Config::from_file(path)?;
                source = Some(path.clone());
            }
            None => {
                warn!("No configuration file found, using defaults");
            }
        }

        config.apply_env(port);
        Ok(ConfigHolder { config, source })
    }

    pub fn get_copy(&self, base: &str) -> Result<ConfigBases, ConfigError> {
        match base {
            "httpd" => { return Ok(ConfigBases::Httpd(self.config.httpd.clone())) },
            "meter" => { return Ok(ConfigBases::Meter(self.config.meter.clone())) },
            "cache" => { return Ok(ConfigBases::Cache(self.config.cache.clone())) },
            _ => { Err(ConfigError::UnknownBase(base.to_string())) }
        }
    }
}

lazy_static! {
    pub static ref CONFIG: RwLock<ConfigHolder> = RwLock::new(ConfigHolder::load());
}

#[macro_export]
macro_rules! get_config_or_panic {
    ($base: expr, $pat: path) => {
        {
            let c = $crate::config::CONFIG.read().unwrap().get_copy($base).unwrap();
            if let $pat(a) = c {
                a
            } else {
                panic!(
                    "mismatch variant when cast to {}",
                    stringify!($pat));
            }
        }
    };
}
