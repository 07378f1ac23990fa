//! Server configuration, read once from the environment at startup.
//!
//! Everything comes from `SKYCAM_*` variables with defaults that make a bare
//! `skycam-server` useful on a development machine. Firmware polling is off
//! until a source URL is configured.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::firmware::FirmwareDescriptor;
use crate::relay::{HubConfig, TakeoverPolicy};
use crate::web::WebConfig;

/// Complete server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP/WebSocket listening port (`SKYCAM_PORT`, default 3000).
    pub port: u16,
    /// Remote version-descriptor URL (`SKYCAM_FIRMWARE_URL`). Polling is
    /// disabled when unset.
    pub firmware_source_url: Option<String>,
    /// Poll period (`SKYCAM_FIRMWARE_INTERVAL_SECS`, default 600).
    pub firmware_poll_interval: Duration,
    /// Descriptor served before the first successful poll
    /// (`SKYCAM_FIRMWARE_VERSION` / `SKYCAM_FIRMWARE_BIN_URL`).
    pub initial_firmware: FirmwareDescriptor,
    /// Resolution reported before any viewer sets one
    /// (`SKYCAM_DEFAULT_RESOLUTION`, default "VGA").
    pub default_resolution: String,
    /// What to do when a second camera connects
    /// (`SKYCAM_CAMERA_TAKEOVER`: "replace" or "reject").
    pub takeover: TakeoverPolicy,
    /// Per-connection outbound queue length (`SKYCAM_OUTBOUND_BUFFER`,
    /// default 64).
    pub outbound_buffer: usize,
    /// Optional static operator UI directory (`SKYCAM_UI_PATH`).
    pub ui_path: Option<PathBuf>,
    /// Optional basic-auth credentials for the UI
    /// (`SKYCAM_UI_USER` / `SKYCAM_UI_PASS`, both required to enable).
    pub ui_auth: Option<(String, String)>,
}

impl Config {
    pub fn from_env() -> Self {
        let port: u16 = std::env::var("SKYCAM_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);

        let firmware_source_url = std::env::var("SKYCAM_FIRMWARE_URL").ok();

        let firmware_poll_interval = Duration::from_secs(
            std::env::var("SKYCAM_FIRMWARE_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(600),
        );

        let initial_firmware = FirmwareDescriptor {
            version: std::env::var("SKYCAM_FIRMWARE_VERSION")
                .unwrap_or_else(|_| "1.0.0".to_string()),
            url: std::env::var("SKYCAM_FIRMWARE_BIN_URL").unwrap_or_default(),
        };

        let default_resolution =
            std::env::var("SKYCAM_DEFAULT_RESOLUTION").unwrap_or_else(|_| "VGA".to_string());

        let takeover = std::env::var("SKYCAM_CAMERA_TAKEOVER")
            .ok()
            .and_then(|s| TakeoverPolicy::parse(&s))
            .unwrap_or_default();

        let outbound_buffer: usize = std::env::var("SKYCAM_OUTBOUND_BUFFER")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(64);

        let ui_path = std::env::var("SKYCAM_UI_PATH").map(PathBuf::from).ok();

        let ui_auth = match (
            std::env::var("SKYCAM_UI_USER"),
            std::env::var("SKYCAM_UI_PASS"),
        ) {
            (Ok(user), Ok(pass)) => Some((user, pass)),
            _ => None,
        };

        Self {
            port,
            firmware_source_url,
            firmware_poll_interval,
            initial_firmware,
            default_resolution,
            takeover,
            outbound_buffer,
            ui_path,
            ui_auth,
        }
    }

    /// The relay-relevant subset.
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            takeover: self.takeover,
            default_resolution: self.default_resolution.clone(),
            initial_firmware: self.initial_firmware.clone(),
        }
    }

    /// The web-layer subset.
    pub fn web_config(&self) -> WebConfig {
        WebConfig {
            bind: SocketAddr::from(([0, 0, 0, 0], self.port)),
            ui_path: self.ui_path.clone(),
            ui_auth: self.ui_auth.clone(),
            outbound_buffer: self.outbound_buffer,
        }
    }
}
