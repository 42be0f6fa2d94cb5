//! Layered configuration: files, then `VOXLINE__*` environment variables, then
//! `serve` flags.

use std::{
    collections::HashSet,
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use voxline_api_types::channels;

use crate::domain::types::Identity;

mod cli;

pub use cli::{CliArgs, Command, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "voxline";
const ENV_PREFIX: &str = "VOXLINE";

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 10;

const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_DASHBOARD_STATS_TTL_SECS: u64 = 300;
const DEFAULT_ANALYTICS_TTL_SECS: u64 = 900;
const DEFAULT_CALL_SEARCH_TTL_SECS: u64 = 60;
const DEFAULT_USER_AGENTS_TTL_SECS: u64 = 600;

const DEFAULT_MAX_CHANNELS_PER_CONNECTION: u32 = 16;

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub realtime: RealtimeSettings,
    pub auth: AuthSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub sweep_interval_seconds: NonZeroU64,
    pub dashboard_stats_ttl_seconds: NonZeroU64,
    pub analytics_ttl_seconds: NonZeroU64,
    pub call_search_ttl_seconds: NonZeroU64,
    pub user_agents_ttl_seconds: NonZeroU64,
}

#[derive(Debug, Clone)]
pub struct RealtimeSettings {
    /// Channels a connection may subscribe to.
    pub channels: Vec<String>,
    pub max_channels_per_connection: NonZeroU32,
}

#[derive(Debug, Clone, Default)]
pub struct AuthSettings {
    pub sessions: Vec<SessionEntry>,
}

/// An opaque bearer token and the identity it resolves to.
#[derive(Clone)]
pub struct SessionEntry {
    pub token: String,
    pub identity: Identity,
}

impl std::fmt::Debug for SessionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEntry")
            .field("token", &"<redacted>")
            .field("identity", &self.identity)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("realtime.channels")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) | Some(Command::CheckConfig(args)) => {
            raw.apply_serve_overrides(&args.overrides)
        }
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    realtime: RawRealtimeSettings,
    auth: RawAuthSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(seconds) = overrides.cache_sweep_interval_seconds {
            self.cache.sweep_interval_seconds = Some(seconds);
        }
        if let Some(max) = overrides.realtime_max_channels {
            self.realtime.max_channels_per_connection = Some(max);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
            realtime,
            auth,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            cache: build_cache_settings(cache)?,
            realtime: build_realtime_settings(realtime)?,
            auth: build_auth_settings(auth)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    let graceful_shutdown = Duration::from_secs(
        non_zero_u64(graceful_secs, "server.graceful_shutdown_seconds")?.get(),
    );

    Ok(ServerSettings {
        addr,
        graceful_shutdown,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        sweep_interval_seconds: non_zero_u64(
            cache
                .sweep_interval_seconds
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
            "cache.sweep_interval_seconds",
        )?,
        dashboard_stats_ttl_seconds: non_zero_u64(
            cache
                .dashboard_stats_ttl_seconds
                .unwrap_or(DEFAULT_DASHBOARD_STATS_TTL_SECS),
            "cache.dashboard_stats_ttl_seconds",
        )?,
        analytics_ttl_seconds: non_zero_u64(
            cache.analytics_ttl_seconds.unwrap_or(DEFAULT_ANALYTICS_TTL_SECS),
            "cache.analytics_ttl_seconds",
        )?,
        call_search_ttl_seconds: non_zero_u64(
            cache
                .call_search_ttl_seconds
                .unwrap_or(DEFAULT_CALL_SEARCH_TTL_SECS),
            "cache.call_search_ttl_seconds",
        )?,
        user_agents_ttl_seconds: non_zero_u64(
            cache
                .user_agents_ttl_seconds
                .unwrap_or(DEFAULT_USER_AGENTS_TTL_SECS),
            "cache.user_agents_ttl_seconds",
        )?,
    })
}

fn build_realtime_settings(realtime: RawRealtimeSettings) -> Result<RealtimeSettings, LoadError> {
    let mut allowed = Vec::new();
    for channel in realtime.channels.unwrap_or_default() {
        let channel = channel.trim().to_string();
        if !channels::ALL.contains(&channel.as_str()) {
            return Err(LoadError::invalid(
                "realtime.channels",
                format!("unknown channel `{channel}`"),
            ));
        }
        if !allowed.contains(&channel) {
            allowed.push(channel);
        }
    }
    if allowed.is_empty() {
        allowed = channels::ALL.iter().map(|c| c.to_string()).collect();
    }

    let max = realtime
        .max_channels_per_connection
        .unwrap_or(DEFAULT_MAX_CHANNELS_PER_CONNECTION);

    Ok(RealtimeSettings {
        channels: allowed,
        max_channels_per_connection: non_zero_u32(
            max.into(),
            "realtime.max_channels_per_connection",
        )?,
    })
}

fn build_auth_settings(auth: RawAuthSettings) -> Result<AuthSettings, LoadError> {
    let mut seen = HashSet::new();
    let mut sessions = Vec::new();
    for entry in auth.sessions.unwrap_or_default() {
        let token = entry.token.trim();
        if token.is_empty() {
            return Err(LoadError::invalid("auth.sessions", "token must not be empty"));
        }
        let identity = entry.identity.trim();
        if identity.is_empty() {
            return Err(LoadError::invalid(
                "auth.sessions",
                "identity must not be empty",
            ));
        }
        if !seen.insert(token.to_string()) {
            return Err(LoadError::invalid(
                "auth.sessions",
                format!("duplicate token for identity `{identity}`"),
            ));
        }
        sessions.push(SessionEntry {
            token: token.to_string(),
            identity: Identity::new(identity),
        });
    }
    Ok(AuthSettings { sessions })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    sweep_interval_seconds: Option<u64>,
    dashboard_stats_ttl_seconds: Option<u64>,
    analytics_ttl_seconds: Option<u64>,
    call_search_ttl_seconds: Option<u64>,
    user_agents_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRealtimeSettings {
    channels: Option<Vec<String>>,
    max_channels_per_connection: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuthSettings {
    sessions: Option<Vec<RawSessionEntry>>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawSessionEntry {
    token: String,
    identity: String,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u64(value: u64, key: &'static str) -> Result<NonZeroU64, LoadError> {
    NonZeroU64::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
