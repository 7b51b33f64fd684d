//! Configuration management for servicekit.
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, time::Duration};
use strum_macros::{AsRefStr, EnumString};

use crate::{
    connector::{ConnectionKind, Endpoint, Target},
    constants::{DEFAULT_CONNECT_TIMEOUT, SHUTDOWN_TIMEOUT},
    error::ConfigError,
    logger::{LogFormat, LogLevel},
    process::TickerConfig,
    server::ServerConfig,
    supervisor::{SupervisorConfig, UnhealthyPolicy},
};

/// Represents the structure of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Application settings.
    pub app: AppConfig,
    /// External systems the service connects to.
    #[serde(default)]
    pub connections: ConnectionsConfig,
    /// Background processes.
    #[serde(default)]
    pub processes: ProcessesConfig,
}

/// Settings of the daemon itself.
///
/// The required numeric fields default to zero so that a missing value is
/// reported by [`Config::validate`] with the field name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP API port.
    #[serde(default)]
    pub port: u16,
    /// Period of the supervisor's health check.
    #[serde(default, with = "duration_str")]
    pub check_connections_interval: Duration,
    /// Capacity of every error channel.
    #[serde(default)]
    pub error_buffer: usize,
    /// Deadline for in-flight requests on shutdown.
    #[serde(default = "default_shutdown_timeout", with = "duration_str")]
    pub shutdown_timeout: Duration,
    /// What a failed health check leads to.
    #[serde(default)]
    pub on_unhealthy: UnhealthyPolicy,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub format: LogFormat,
}

/// Every connection is optional; only configured ones are opened.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postgres: Option<TcpEndpointConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clickhouse: Option<TcpEndpointConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elasticsearch: Option<HttpEndpointConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis: Option<TcpEndpointConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rabbitmq: Option<TcpEndpointConfig>,
}

/// A backend reached over plain TCP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TcpEndpointConfig {
    pub addr: String,
    #[serde(default = "default_connect_timeout", with = "duration_str")]
    pub timeout: Duration,
}

/// A backend probed over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpEndpointConfig {
    pub url: String,
    #[serde(default = "default_connect_timeout", with = "duration_str")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessesConfig {
    #[serde(default)]
    pub ticker: TickerConfig,
}

fn default_shutdown_timeout() -> Duration {
    SHUTDOWN_TIMEOUT
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

/// Supported configuration file formats, keyed by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(ascii_case_insensitive)]
pub enum ConfigFormat {
    #[strum(serialize = "yaml", serialize = "yml")]
    Yaml,
    #[strum(serialize = "json")]
    Json,
}

impl ConfigFormat {
    /// Picks the format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_string())
            .unwrap_or_default();
        ext.parse()
            .map_err(|_| ConfigError::UnsupportedExtension(format!(".{ext}")))
    }

    fn parse(self, content: &str) -> Result<Config, ConfigError> {
        match self {
            ConfigFormat::Yaml => Ok(serde_yaml::from_str(content)?),
            ConfigFormat::Json => Ok(serde_json::from_str(content)?),
        }
    }
}

const ENV_VAR_PATTERN: &str = r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?";

/// Expands `${VAR}` and `$VAR` references from the environment.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = Regex::new(ENV_VAR_PATTERN).map_err(|e| ConfigError::Invalid(e.to_string()))?;

    let mut missing: Option<String> = None;
    let expanded = re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        match env::var(var_name) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(var_name) => Err(ConfigError::MissingEnvVar(var_name)),
        None => Ok(expanded.into_owned()),
    }
}

impl Config {
    /// Loads and parses the configuration file, expanding environment variables.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        format.parse(&expand_env_vars(&content)?)
    }

    /// Checks that the daemon can run with these values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let app = &self.app;
        if app.port == 0 {
            return Err(invalid("app.port is empty"));
        }
        if app.check_connections_interval.is_zero() {
            return Err(invalid("app.check_connections_interval is empty"));
        }
        if app.error_buffer == 0 {
            return Err(invalid("app.error_buffer is empty"));
        }
        if app.shutdown_timeout.is_zero() {
            return Err(invalid("app.shutdown_timeout is empty"));
        }

        let conns = &self.connections;
        let tcp = [
            ("postgres", &conns.postgres),
            ("clickhouse", &conns.clickhouse),
            ("redis", &conns.redis),
            ("rabbitmq", &conns.rabbitmq),
        ];
        for (name, endpoint) in tcp {
            let Some(endpoint) = endpoint else { continue };
            if endpoint.addr.trim().is_empty() {
                return Err(invalid(format!("connections.{name}.addr is empty")));
            }
            if endpoint.timeout.is_zero() {
                return Err(invalid(format!("connections.{name}.timeout is empty")));
            }
        }
        if let Some(es) = &conns.elasticsearch {
            if !(es.url.starts_with("http://") || es.url.starts_with("https://")) {
                return Err(invalid("connections.elasticsearch.url must be an http(s) URL"));
            }
            if es.timeout.is_zero() {
                return Err(invalid("connections.elasticsearch.timeout is empty"));
            }
        }

        self.processes.ticker.validate()
    }

    /// Renders the effective configuration for `--print`.
    pub fn to_pretty_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Configured connections in opening order.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        let conns = &self.connections;
        let tcp = |kind, cfg: &Option<TcpEndpointConfig>| {
            cfg.as_ref().map(|cfg| Endpoint {
                kind,
                target: Target::Tcp {
                    addr: cfg.addr.clone(),
                },
                timeout: cfg.timeout,
            })
        };
        let http = |kind, cfg: &Option<HttpEndpointConfig>| {
            cfg.as_ref().map(|cfg| Endpoint {
                kind,
                target: Target::Http {
                    url: cfg.url.clone(),
                },
                timeout: cfg.timeout,
            })
        };

        [
            tcp(ConnectionKind::Postgres, &conns.postgres),
            tcp(ConnectionKind::Clickhouse, &conns.clickhouse),
            http(ConnectionKind::Elasticsearch, &conns.elasticsearch),
            tcp(ConnectionKind::Redis, &conns.redis),
            tcp(ConnectionKind::Rabbitmq, &conns.rabbitmq),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            check_interval: self.app.check_connections_interval,
            error_buffer: self.app.error_buffer,
            on_unhealthy: self.app.on_unhealthy,
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            port: self.app.port,
            shutdown_timeout: self.app.shutdown_timeout,
            error_buffer: self.app.error_buffer,
        }
    }
}

fn invalid(reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(reason.into())
}

/// Parses `<n>ms`, `<n>s`, `<n>m`, `<n>h` or a bare number of seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let (digits, unit_secs, millis) = if let Some(n) = raw.strip_suffix("ms") {
        (n, 0, true)
    } else if let Some(n) = raw.strip_suffix('s') {
        (n, 1, false)
    } else if let Some(n) = raw.strip_suffix('m') {
        (n, 60, false)
    } else if let Some(n) = raw.strip_suffix('h') {
        (n, 3600, false)
    } else {
        (raw, 1, false)
    };

    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration: {raw:?}"))?;

    if millis {
        return Ok(Duration::from_millis(value));
    }
    value
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration out of range: {raw:?}"))
}

/// Renders a duration in the largest unit that represents it exactly.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 != 0 {
        return format!("{millis}ms");
    }
    let secs = duration.as_secs();
    match secs {
        0 => "0s".to_string(),
        s if s % 3600 == 0 => format!("{}h", s / 3600),
        s if s % 60 == 0 => format!("{}m", s / 60),
        s => format!("{s}s"),
    }
}

/// Serde adapter for human-readable durations.
pub(crate) mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => super::parse_duration(&text).map_err(de::Error::custom),
        }
    }
}
