//! Command-line surface for `voxline-client`.

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "voxline-client", version, about = "Voxline realtime channel client", long_about = None)]
pub struct Cli {
    /// Log filter, e.g. `info` or `voxline_client=debug`
    #[arg(long, env = "VOXLINE_CLIENT_LOG", default_value = "info", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect, subscribe and print pushes until interrupted
    Watch(WatchArgs),
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Server base URL, e.g. <https://dash.example.com>
    #[arg(long, env = "VOXLINE_URL")]
    pub url: String,

    /// Session token (read from env by default to keep it out of shell history)
    #[arg(long, env = "VOXLINE_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Channel to subscribe to; repeatable
    #[arg(long = "channel", required = true)]
    pub channels: Vec<String>,

    #[arg(long, default_value_t = 30)]
    pub heartbeat_seconds: u64,

    #[arg(long, default_value_t = 5)]
    pub max_reconnect_attempts: u32,
}
