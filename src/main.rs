use std::{process, sync::Arc};

use tokio::task::JoinHandle;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use voxline::{
    application::{
        dashboard::DashboardService,
        error::AppError,
        sessions::{SessionVerifier, StaticSessions},
    },
    cache::{CacheConfig, CacheStore, InvalidationBridge, spawn_sweeper},
    config,
    infra::{
        error::InfraError,
        http::{self, AppState},
        memory::InMemoryRepositories,
        telemetry,
    },
    realtime::{ChannelPolicy, ConnectionHub},
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    match command {
        config::Command::Serve(_) => {
            telemetry::init(&settings.logging).map_err(AppError::from)?;
            run_serve(settings).await
        }
        config::Command::CheckConfig(_) => {
            print_settings(&settings);
            Ok(())
        }
    }
}

struct ApplicationContext {
    state: AppState,
    store: Arc<CacheStore>,
    cache: CacheConfig,
}

fn build_application_context(settings: &config::Settings) -> Result<ApplicationContext, AppError> {
    let cache = CacheConfig::from(&settings.cache);
    let store = Arc::new(CacheStore::new());
    let hub = Arc::new(ConnectionHub::new());
    let bridge = Arc::new(InvalidationBridge::new(cache, store.clone(), hub.clone()));
    let repositories = Arc::new(InMemoryRepositories::new());

    let dashboard = Arc::new(DashboardService::new(
        cache,
        store.clone(),
        bridge,
        repositories.clone(),
        repositories.clone(),
        repositories,
    ));

    let sessions = StaticSessions::new(
        settings
            .auth
            .sessions
            .iter()
            .map(|entry| (entry.token.as_str(), entry.identity.clone())),
    );
    if sessions.is_empty() {
        return Err(InfraError::configuration(
            "auth.sessions is empty; no client could authenticate",
        )
        .into());
    }
    let sessions: Arc<dyn SessionVerifier> = Arc::new(sessions);

    let max_channels = usize::try_from(settings.realtime.max_channels_per_connection.get())
        .map_err(|err| AppError::unexpected(err.to_string()))?;
    let policy = Arc::new(ChannelPolicy::new(
        settings.realtime.channels.iter().cloned(),
        max_channels,
    ));

    Ok(ApplicationContext {
        state: AppState {
            dashboard,
            sessions,
            hub,
            policy,
        },
        store,
        cache,
    })
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let app = build_application_context(&settings)?;

    let sweeper: Option<JoinHandle<()>> = app
        .cache
        .enabled
        .then(|| spawn_sweeper(app.store.clone(), app.cache.sweep_interval));

    let result = serve_http(&settings, app.state).await;

    if let Some(handle) = sweeper {
        handle.abort();
        let _ = handle.await;
    }

    result
}

async fn serve_http(settings: &config::Settings, state: AppState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let addr = settings.server.addr;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::from(InfraError::bind(addr, err)))?;
    info!(target = "voxline::server", addr = %addr, "Listening");

    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal());
    let grace = settings.server.graceful_shutdown;

    // Open WebSockets never finish on their own, so draining is bounded.
    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        () = async {
            shutdown_signal().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                target = "voxline::server",
                grace_secs = grace.as_secs(),
                "Graceful shutdown timed out; dropping remaining connections"
            );
        }
    }

    info!(target = "voxline::server", "Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(target = "voxline::server", error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

fn print_settings(settings: &config::Settings) {
    println!("server.addr = {}", settings.server.addr);
    println!(
        "server.graceful_shutdown_seconds = {}",
        settings.server.graceful_shutdown.as_secs()
    );
    println!("logging.level = {}", settings.logging.level);
    println!("logging.format = {:?}", settings.logging.format);
    println!("cache.enabled = {}", settings.cache.enabled);
    println!(
        "cache.sweep_interval_seconds = {}",
        settings.cache.sweep_interval_seconds
    );
    println!(
        "cache.ttl_seconds = dashboard_stats:{} analytics:{} call_search:{} user_agents:{}",
        settings.cache.dashboard_stats_ttl_seconds,
        settings.cache.analytics_ttl_seconds,
        settings.cache.call_search_ttl_seconds,
        settings.cache.user_agents_ttl_seconds
    );
    println!("realtime.channels = {}", settings.realtime.channels.join(","));
    println!(
        "realtime.max_channels_per_connection = {}",
        settings.realtime.max_channels_per_connection
    );
    println!("auth.sessions = {} configured", settings.auth.sessions.len());
}
