//! Command line and environment configuration

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::collector::CollectorRegistry;
use crate::error::{Error, Result};
use crate::github::GitHubConfig;

// =============================================================================
// CLI Arguments
// =============================================================================

/// GitHub billing exporter - Prometheus metrics for organization billing
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to listen on for the web interface and telemetry
    #[arg(long = "web.listen-address", env = "GBE_WEB_LISTEN_ADDRESS", default_value = "0.0.0.0:9776")]
    pub listen_address: String,

    /// Path under which to expose metrics
    #[arg(long = "web.telemetry-path", env = "GBE_WEB_TELEMETRY_PATH", default_value = "/metrics")]
    pub telemetry_path: String,

    /// GitHub token with billing read access
    #[arg(long = "github.token", env = "GBE_GITHUB_TOKEN", default_value = "", hide_env_values = true)]
    pub github_token: String,

    /// Organizations to query, separated by spaces or commas
    #[arg(long = "github.orgs", env = "GBE_GITHUB_ORGS", default_value = "")]
    pub github_orgs: String,

    /// GitHub REST API base URL
    #[arg(long = "github.api-url", env = "GBE_GITHUB_API_URL", default_value = "https://api.github.com")]
    pub github_api_url: String,

    /// Timeout of a single GitHub request in seconds
    #[arg(long = "github.request-timeout", env = "GBE_GITHUB_REQUEST_TIMEOUT", default_value = "30")]
    pub request_timeout_seconds: u64,

    /// Deadline of one collector update in seconds
    #[arg(long = "collector.timeout", env = "GBE_COLLECTOR_TIMEOUT", default_value = "60")]
    pub collector_timeout_seconds: u64,

    /// Interval between working set reloads in seconds, 0 disables
    #[arg(long = "collector.reload-interval", env = "GBE_COLLECTOR_RELOAD_INTERVAL", default_value = "3600")]
    pub reload_interval_seconds: u64,

    /// Collectors to run, separated by spaces or commas (default: all)
    #[arg(long = "collector.enable", env = "GBE_COLLECTOR_ENABLE", default_value = "")]
    pub collector_enable: String,

    /// Collectors to skip, separated by spaces or commas
    #[arg(long = "collector.disable", env = "GBE_COLLECTOR_DISABLE", default_value = "")]
    pub collector_disable: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log.level", env = "GBE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log line format (text is tracing's human readable formatter)
    #[arg(long = "log.format", env = "GBE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Log destination
    #[arg(long = "log.output", env = "GBE_LOG_OUTPUT", value_enum, default_value_t = LogOutput::Stdout)]
    pub log_output: LogOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogOutput {
    Stdout,
    Stderr,
}

impl Args {
    /// Configured organizations, de-duplicated in first-seen order
    pub fn orgs(&self) -> Vec<String> {
        split_list(&self.github_orgs)
    }

    pub fn github_config(&self) -> Result<GitHubConfig> {
        let token = self.github_token.trim();
        Ok(GitHubConfig {
            api_url: self.github_api_url.clone(),
            token: (!token.is_empty()).then(|| token.to_string()),
            request_timeout: positive_seconds("github.request-timeout", self.request_timeout_seconds)?,
        })
    }

    pub fn server_config(&self) -> Result<ServerConfig> {
        ServerConfig::new(&self.listen_address, &self.telemetry_path)
    }

    pub fn collector_timeout(&self) -> Result<Duration> {
        positive_seconds("collector.timeout", self.collector_timeout_seconds)
    }

    /// `None` when periodic reloads are disabled
    pub fn reload_interval(&self) -> Option<Duration> {
        (self.reload_interval_seconds > 0).then(|| Duration::from_secs(self.reload_interval_seconds))
    }

    /// Apply `--collector.enable` and `--collector.disable` to `registry`.
    pub fn select_collectors(&self, registry: &mut CollectorRegistry) -> Result<()> {
        select_collectors(
            registry,
            &split_list(&self.collector_enable),
            &split_list(&self.collector_disable),
        )
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn positive_seconds(flag: &str, seconds: u64) -> Result<Duration> {
    if seconds == 0 {
        return Err(Error::Config(format!("--{} must be at least one second", flag)));
    }
    Ok(Duration::from_secs(seconds))
}

/// Split a space or comma separated list, dropping empty items and repeats.
pub fn split_list(raw: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for item in raw.split(|c: char| c == ',' || c.is_whitespace()) {
        if !item.is_empty() && !items.iter().any(|seen| seen == item) {
            items.push(item.to_string());
        }
    }
    items
}

/// Narrow `registry` to `enable` (all when empty), then drop `disable`.
///
/// Every name must be registered.
pub fn select_collectors(
    registry: &mut CollectorRegistry,
    enable: &[String],
    disable: &[String],
) -> Result<()> {
    if let Some(unknown) = disable.iter().find(|name| !registry.contains(name)) {
        return Err(Error::UnknownCollector(unknown.clone()));
    }
    if !enable.is_empty() {
        registry.retain(enable)?;
    }
    for name in disable {
        registry.disable(name);
    }
    if registry.is_empty() {
        return Err(Error::Config("no collector enabled".to_string()));
    }
    Ok(())
}

/// Validated HTTP server settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen_address: SocketAddr,
    pub telemetry_path: String,
}

impl ServerConfig {
    pub fn new(listen_address: &str, telemetry_path: &str) -> Result<Self> {
        let listen_address = listen_address
            .parse()
            .map_err(|e| Error::Config(format!("invalid listen address {}: {}", listen_address, e)))?;

        if !telemetry_path.starts_with('/') || telemetry_path.len() < 2 {
            return Err(Error::Config(format!(
                "telemetry path must start with / and not be the root: {}",
                telemetry_path
            )));
        }

        Ok(Self {
            listen_address,
            telemetry_path: telemetry_path.to_string(),
        })
    }
}
