use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::{
    METRIC_BRIDGE_APPLY_MS, METRIC_CACHE_HIT, METRIC_CACHE_INVALIDATED, METRIC_CACHE_MISS,
    METRIC_CACHE_SWEPT,
};
use crate::config::{LogFormat, LoggingSettings};
use crate::realtime::{METRIC_PUSH_DELIVERED, METRIC_PUSH_FAILED, METRIC_WS_CONNECTIONS};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register units and help text with whichever recorder is installed.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT,
            Unit::Count,
            "Response cache lookups served from an unexpired entry."
        );
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "Response cache lookups that found nothing or an expired entry."
        );
        describe_counter!(
            METRIC_CACHE_INVALIDATED,
            Unit::Count,
            "Cache entries removed by key or pattern invalidation."
        );
        describe_counter!(
            METRIC_CACHE_SWEPT,
            Unit::Count,
            "Expired cache entries removed by the background sweeper."
        );
        describe_gauge!(
            METRIC_WS_CONNECTIONS,
            Unit::Count,
            "Currently registered WebSocket connections."
        );
        describe_counter!(
            METRIC_PUSH_DELIVERED,
            Unit::Count,
            "Server pushes handed to a live connection."
        );
        describe_counter!(
            METRIC_PUSH_FAILED,
            Unit::Count,
            "Server pushes dropped because the connection had gone away."
        );
        describe_histogram!(
            METRIC_BRIDGE_APPLY_MS,
            Unit::Milliseconds,
            "Time to invalidate and push for one mutation event."
        );
    });
}
