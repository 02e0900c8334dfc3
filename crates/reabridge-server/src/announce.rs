//! Registration with the rc.reaper.fm redirect service.
//!
//! rc.reaper.fm maps a short name to a LAN address, so a phone can open
//! `rc.reaper.fm/{name}` instead of typing an IP. Registration is a single
//! unauthenticated GET carrying the local IP and port. It is best effort:
//! any failure is logged and the bridge carries on.

use std::net::IpAddr;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Registry base URL.
pub const RC_REAPER_URL: &str = "https://rc.reaper.fm";

/// User agent REAPER's own web control surface sends.
const RC_USER_AGENT: &str = "reaper_csurf_www/0.1";

/// Errors from a registration attempt.
#[derive(Debug, thiserror::Error)]
pub enum AnnounceError {
    /// The local outbound IP could not be determined.
    #[error("cannot determine local IP: {0}")]
    LocalIp(#[from] std::io::Error),

    /// The registry request failed.
    #[error("registry request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Build the registration URL for `name` at `ip:port`.
pub fn registration_url(base: &str, name: &str, ip: IpAddr, port: u16) -> String {
    format!("{}/_/{name}/{ip}/{port}", base.trim_end_matches('/'))
}

/// Determine the IP of the interface used for outbound traffic.
///
/// Connecting a UDP socket sends no packets; it only selects a route.
pub async fn local_ip() -> Result<IpAddr, AnnounceError> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect("1.1.1.1:80").await?;
    Ok(socket.local_addr()?.ip())
}

/// Register `name` for this host's `port` and return the registry's reply.
pub async fn register(client: &reqwest::Client, name: &str, port: u16) -> Result<String, AnnounceError> {
    let ip = local_ip().await?;
    let url = registration_url(RC_REAPER_URL, name, ip, port);
    info!(%url, "Registering with rc.reaper.fm");

    let body = client
        .get(&url)
        .header(reqwest::header::USER_AGENT, RC_USER_AGENT)
        .send()
        .await?
        .text()
        .await?;
    Ok(body)
}

/// Register on a background task, logging the outcome.
pub fn spawn_registration(name: String, port: u16) -> JoinHandle<()> {
    tokio::spawn(async move {
        let client = reqwest::Client::new();
        match register(&client, &name, port).await {
            Ok(reply) => info!(name, reply = reply.trim(), "rc.reaper.fm registration done"),
            Err(e) => warn!(name, error = %e, "rc.reaper.fm registration failed"),
        }
    })
}
