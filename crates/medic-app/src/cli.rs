//! CLI argument definitions for the Medic coordination engine.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

use medic_core::MedicConfig;

/// Medic - coordinates remediation actions for a self-healing cluster.
#[derive(Parser, Debug, Default)]
#[command(name = "medic", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// API server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Address the API server binds to.
    #[arg(long = "bind")]
    pub bind: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Seconds between scheduler ticks.
    #[arg(long = "tick-interval")]
    pub tick_interval: Option<u64>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > MEDIC_CONFIG env var > ~/.medic/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        self.resolve_config_path_with(env_var)
    }

    fn resolve_config_path_with(&self, env: impl Fn(&str) -> Option<String>) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Some(p) = env("MEDIC_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the API server port.
    ///
    /// Priority: --port flag > MEDIC_PORT > COORDINATION_ENGINE_PORT > config value.
    fn resolve_port_with(&self, config_port: u16, env: impl Fn(&str) -> Option<String>) -> u16 {
        if let Some(p) = self.port {
            return p;
        }
        ["MEDIC_PORT", "COORDINATION_ENGINE_PORT"]
            .into_iter()
            .filter_map(|key| env(key))
            .find_map(|val| parse_port(&val))
            .unwrap_or(config_port)
    }

    /// Load the config file and layer env vars and flags over it.
    pub fn load_config(&self) -> MedicConfig {
        let path = self.resolve_config_path();
        let config = MedicConfig::load_or_default(&path);
        self.apply_overrides(config, env_var)
    }

    fn apply_overrides(
        &self,
        mut config: MedicConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> MedicConfig {
        config.general.port = self.resolve_port_with(config.general.port, &env);
        if let Some(ref bind) = self.bind {
            config.general.bind_address = bind.clone();
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(secs) = self.tick_interval {
            config.scheduler.tick_interval_secs = secs;
        }
        config
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Accepts a bare port or a service-link style value such as
/// `tcp://10.0.0.12:8080`.
fn parse_port(value: &str) -> Option<u16> {
    let value = value.trim();
    let tail = value.rsplit(':').next().unwrap_or(value);
    tail.parse::<u16>().ok()
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".medic").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".medic").join("config.toml");
    }
    PathBuf::from("config.toml")
}
