use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("unsupported URL scheme `{0}` (expected http, https, ws or wss)")]
    UnsupportedScheme(String),
    #[error("realtime driver has stopped")]
    DriverStopped,
    #[error("gave up reconnecting after {attempts} attempts")]
    ReconnectsExhausted { attempts: u64 },
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to install tracing subscriber: {0}")]
    Telemetry(String),
}
