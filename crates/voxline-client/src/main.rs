//! voxline-client: subscribe to realtime channels from the terminal.

mod args;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use voxline_client::{
    Backoff, ClientConfig, ClientError, Diagnostics, Endpoint, ReadCache, RealtimeClient, Scope,
};

use args::{Cli, Commands, WatchArgs};

/// Reports stale scopes instead of refetching anything.
struct PrintingCache;

impl ReadCache for PrintingCache {
    fn mark_stale(&self, scope: Scope) {
        info!(target = "voxline_client::watch", scope = ?scope, "scope is stale");
    }
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cli.log))
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| ClientError::Telemetry(err.to_string()))?;

    match cli.command {
        Commands::Watch(args) => watch(args).await,
    }
}

async fn watch(args: WatchArgs) -> Result<(), ClientError> {
    let endpoint = Endpoint::parse(&args.url)?;
    let config = ClientConfig {
        heartbeat: Duration::from_secs(args.heartbeat_seconds.max(1)),
        backoff: Backoff {
            max_attempts: args.max_reconnect_attempts,
            ..Backoff::default()
        },
        ..ClientConfig::default()
    };

    let handle = RealtimeClient::spawn(endpoint, config, Arc::new(PrintingCache));
    for channel in &args.channels {
        handle.subscribe(channel.as_str())?;
    }
    handle.open(args.token)?;

    let mut connected = handle.connected();
    let mut notifications = handle.notifications();
    let mut progress = handle.diagnostics();
    let mut printed = HashSet::new();
    let mut outcome = Ok(());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = progress.changed() => {
                if changed.is_err() {
                    break;
                }
                let exhausted = ensure_not_exhausted(&progress.borrow_and_update());
                if exhausted.is_err() {
                    outcome = exhausted;
                    break;
                }
            }
            changed = connected.changed() => {
                if changed.is_err() {
                    break;
                }
                let up = *connected.borrow_and_update();
                info!(target = "voxline_client::watch", connected = up, "connectivity changed");
            }
            changed = notifications.changed() => {
                if changed.is_err() {
                    break;
                }
                let items = notifications.borrow_and_update().clone();
                for item in items {
                    if printed.insert(item.id.clone()) {
                        println!("{}", serde_json::to_string(&item)?);
                    }
                }
            }
        }
    }

    let diagnostics = handle.diagnostics().borrow().clone();
    handle.teardown().await;
    eprintln!("{}", serde_json::to_string_pretty(&diagnostics)?);
    outcome
}

fn ensure_not_exhausted(diagnostics: &Diagnostics) -> Result<(), ClientError> {
    if diagnostics.connection.exhausted {
        return Err(ClientError::ReconnectsExhausted {
            attempts: diagnostics.connection.reconnect_attempts,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxline_client::SyncClient;

    fn diagnostics() -> Diagnostics {
        let endpoint = Endpoint::parse("http://localhost:8080").expect("endpoint");
        SyncClient::new(endpoint, ClientConfig::default(), Arc::new(PrintingCache)).diagnostics()
    }

    #[test]
    fn exhaustion_ends_watch_with_an_error() {
        let mut current = diagnostics();
        assert!(ensure_not_exhausted(&current).is_ok());

        current.connection.exhausted = true;
        current.connection.reconnect_attempts = 5;
        let err = ensure_not_exhausted(&current).expect_err("exhausted");
        assert!(matches!(err, ClientError::ReconnectsExhausted { attempts: 5 }));
        assert_eq!(err.to_string(), "gave up reconnecting after 5 attempts");
    }
}
