//! Command-line flags.
//!
//! Every flag is optional and overrides the matching field of the YAML
//! configuration; a few can also come from the environment.

use std::path::PathBuf;

use clap::Parser;

/// WebSocket bridge for REAPER's web interface.
///
/// Polls REAPER, pushes state changes to WebSocket clients, serves the
/// web UI and proxies everything else to REAPER.
#[derive(Debug, Default, Parser)]
#[command(name = "reabridge", version, about, long_about = None)]
pub struct Cli {
    /// YAML configuration file (defaults to `reabridge.yaml` if present).
    #[arg(long, env = "REABRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Base URL of REAPER's HTTP interface.
    #[arg(long, env = "REAPER_URL")]
    pub reaper_url: Option<String>,

    /// Name to register at rc.reaper.fm/NAME (empty disables).
    #[arg(long)]
    pub reaper_rc_name: Option<String>,

    /// Semicolon-joined commands polled from REAPER and pushed to clients
    /// (empty disables polling).
    #[arg(long)]
    pub poll_get_keys: Option<String>,

    /// Milliseconds between two polls.
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Address to listen on (`:8090` listens on all interfaces).
    #[arg(long, env = "REABRIDGE_ADDR")]
    pub addr: Option<String>,

    /// WebSocket path.
    #[arg(long)]
    pub ws_path: Option<String>,

    /// Directory static files are served from.
    #[arg(long)]
    pub www_root_path: Option<PathBuf>,

    /// Health check path.
    #[arg(long)]
    pub health_path: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}
