use std::path::PathBuf;
use std::time::Duration;

use crate::limits::RECOMMENDED_MAX_SWEEP_SECS;
use crate::model::DEFAULT_SEED;

/// Server settings, read once from `PARKHOLD_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub in_memory: bool,
    pub seed: Vec<String>,
    pub sweep_interval: Duration,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5000,
            data_dir: PathBuf::from("./data"),
            in_memory: false,
            seed: DEFAULT_SEED.iter().map(|s| s.to_string()).collect(),
            sweep_interval: Duration::from_secs(30),
            compact_threshold: 1000,
            metrics_port: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid { var: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { var, value } => write!(f, "invalid value for {var}: {value:?}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(bind) = lookup("PARKHOLD_BIND") {
            config.bind = bind;
        }
        if let Some(port) = parse(&lookup, "PARKHOLD_PORT")? {
            config.port = port;
        }
        if let Some(dir) = lookup("PARKHOLD_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(flag) = lookup("PARKHOLD_IN_MEMORY") {
            config.in_memory = match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" | "" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "PARKHOLD_IN_MEMORY",
                        value: flag,
                    });
                }
            };
        }
        if let Some(seed) = lookup("PARKHOLD_SEED") {
            config.seed = seed
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(secs) = parse::<u64>(&lookup, "PARKHOLD_SWEEP_INTERVAL_SECS")? {
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    var: "PARKHOLD_SWEEP_INTERVAL_SECS",
                    value: secs.to_string(),
                });
            }
            if secs > RECOMMENDED_MAX_SWEEP_SECS {
                tracing::warn!(
                    "sweep interval {secs}s exceeds {RECOMMENDED_MAX_SWEEP_SECS}s; occupancy may lag expiry"
                );
            }
            config.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(threshold) = parse(&lookup, "PARKHOLD_COMPACT_THRESHOLD")? {
            config.compact_threshold = threshold;
        }
        config.metrics_port = parse(&lookup, "PARKHOLD_METRICS_PORT")?;

        Ok(config)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("slots.wal")
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}
