//! Firmware descriptor cache and the periodic remote version check.
//!
//! The remote source publishes a small JSON document `{version, url}`. The
//! watcher fetches it on a fixed period and hands changed descriptors to the
//! hub, which caches them and pushes an `update_available` notification to a
//! connected camera. Delivering the firmware binary itself is the camera's
//! job, not ours.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::relay::RelayHub;

/// The latest known update package, as published by the remote source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareDescriptor {
    pub version: String,
    pub url: String,
}

/// Periodically fetches the remote version descriptor and pushes
/// update-available notifications through the hub.
///
/// Fetch and parse failures are logged and the cached descriptor stays
/// untouched until the next tick. There is no backoff and no alerting.
pub struct FirmwareWatcher {
    hub: RelayHub,
    source_url: String,
    period: Duration,
    client: reqwest::Client,
}

impl FirmwareWatcher {
    pub fn new(hub: RelayHub, source_url: String, period: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            hub,
            source_url,
            period,
            client,
        })
    }

    /// Run the check loop until the task is dropped. The first check happens
    /// one full period after startup, not immediately.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.tick().await; // consume the immediate first tick
        loop {
            ticker.tick().await;
            if let Err(e) = self.check().await {
                warn!(url = %self.source_url, error = %e, "Firmware check failed");
            }
        }
    }

    /// One poll: fetch, parse, hand off to the hub.
    pub async fn check(&self) -> Result<()> {
        let desc: FirmwareDescriptor = self
            .client
            .get(&self.source_url)
            .send()
            .await
            .context("Fetching version descriptor")?
            .error_for_status()
            .context("Version source returned error status")?
            .json()
            .await
            .context("Parsing version descriptor")?;

        if !self.hub.apply_firmware(desc).await {
            debug!("Firmware version unchanged");
        }
        Ok(())
    }
}
