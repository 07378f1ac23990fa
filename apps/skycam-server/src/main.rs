//! Skycam Server — relays one camera's live stream to any number of viewers.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults (port 3000, no firmware polling)
//! skycam-server
//!
//! # Custom port
//! SKYCAM_PORT=8080 skycam-server
//!
//! # With firmware polling and a basic-auth gated UI
//! SKYCAM_FIRMWARE_URL=https://example.com/version.json \
//! SKYCAM_UI_PATH=./ui/build \
//! SKYCAM_UI_USER=admin SKYCAM_UI_PASS=secret \
//! skycam-server
//!
//! # With verbose logging
//! RUST_LOG=skycam=debug skycam-server
//! ```

use anyhow::Result;
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use skycam::firmware::FirmwareWatcher;
use skycam::relay::RelayHub;
use skycam::Config;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config = Config::from_env();

    info!("Skycam server starting");
    info!("  Port: {}", config.port);
    info!("  Default resolution: {}", config.default_resolution);
    info!("  Camera takeover: {:?}", config.takeover);
    if let Some(ref url) = config.firmware_source_url {
        info!(
            "  Firmware source: {} (every {}s)",
            url,
            config.firmware_poll_interval.as_secs()
        );
    } else {
        info!("  Firmware polling: disabled (set SKYCAM_FIRMWARE_URL to enable)");
    }
    if let Some(ref path) = config.ui_path {
        info!("  UI path: {:?}", path);
    }

    let hub = RelayHub::new(config.hub_config());

    // Graceful shutdown
    let cancel = CancellationToken::new();
    let tracker = TaskTracker::new();

    // Spawn the firmware watcher
    if let Some(url) = config.firmware_source_url.clone() {
        let watcher = FirmwareWatcher::new(hub.clone(), url, config.firmware_poll_interval)?;
        let cancel = cancel.clone();
        tracker.spawn(async move {
            tokio::select! {
                _ = watcher.run() => {}
                _ = cancel.cancelled() => {
                    info!("Firmware watcher: shutting down");
                }
            }
        });
    }

    // Spawn the web server
    let web_hub = hub.clone();
    let web_config = config.web_config();
    let web_cancel = cancel.clone();
    tracker.spawn(async move {
        tokio::select! {
            result = skycam::web::start(web_hub, web_config) => {
                if let Err(e) = result {
                    error!("Web server error: {}", e);
                }
            }
            _ = web_cancel.cancelled() => {
                info!("Web server: shutting down");
            }
        }
    });

    tracker.close();

    run_headless(hub, cancel, tracker).await
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("skycam=info".parse().unwrap()),
        )
        .init();
}

/// Headless mode: log a stats line periodically, shut down on ctrl-c.
async fn run_headless(hub: RelayHub, cancel: CancellationToken, tracker: TaskTracker) -> Result<()> {
    info!("Waiting for connections...");
    let mut stats_interval = interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                cancel.cancel();
                break;
            }
            _ = stats_interval.tick() => {
                let stats = hub.stats().await;
                info!(
                    "Stats: camera {}, {} viewers, {} frames in, {} relayed, {} dropped",
                    if stats.camera_connected { "connected" } else { "absent" },
                    stats.viewers_connected,
                    stats.frames_received,
                    stats.frames_relayed,
                    stats.frames_dropped,
                );
            }
        }
    }

    if tokio::time::timeout(Duration::from_secs(5), tracker.wait())
        .await
        .is_err()
    {
        warn!("Shutdown timed out after 5s");
    }
    Ok(())
}
