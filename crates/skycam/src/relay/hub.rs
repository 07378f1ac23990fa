//! The relay hub: camera slot, viewer registry, and message routing.
//!
//! All shared mutable state lives here: the single camera slot, the set of
//! viewer connections, the cached firmware descriptor, and the traffic
//! counters. Handlers in the web layer call into the hub; the hub serializes
//! every mutation behind its own locks, so a connect or disconnect racing a
//! broadcast can never corrupt either.
//!
//! Broadcast discipline: the viewer registry is snapshotted before a frame
//! is fanned out, then each handle gets a non-blocking send. A viewer that
//! joins mid-broadcast sees only later frames; one that left beforehand sees
//! nothing; a slow one loses frames instead of stalling the rest.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::{debug, info, trace, warn};

use super::connection::{ConnId, ConnectionHandle, Outbound, SendStatus};
use crate::firmware::FirmwareDescriptor;
use crate::message::{CameraCommand, CameraMessage, ViewerCommand};

/// What to do when a camera connects while the slot is already occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TakeoverPolicy {
    /// The new connection silently supersedes the old one; the old socket is
    /// left to die on its own. This is the default.
    #[default]
    Replace,
    /// The new connection is refused while the current occupant is open.
    Reject,
}

impl TakeoverPolicy {
    /// Parse a config value ("replace" / "reject", case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "replace" => Some(Self::Replace),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

/// Outcome of a camera attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// The camera now occupies the slot.
    Attached,
    /// Refused under [`TakeoverPolicy::Reject`]; the caller should close
    /// the socket.
    Rejected,
}

/// Snapshot of camera-side session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSession {
    pub connected: bool,
    /// Firmware version the current connection registered, if any.
    pub firmware_version: Option<String>,
    /// Last-commanded stream state, not a confirmed device state.
    pub streaming: bool,
    /// Sticky across camera reconnects until a viewer changes it.
    pub resolution: String,
}

/// Relay traffic counters, snapshotted from lock-free atomics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    pub camera_connected: bool,
    pub viewers_connected: usize,
    pub frames_received: u64,
    pub frames_relayed: u64,
    pub frames_dropped: u64,
    pub commands_forwarded: u64,
}

struct AtomicHubStats {
    frames_received: AtomicU64,
    frames_relayed: AtomicU64,
    frames_dropped: AtomicU64,
    commands_forwarded: AtomicU64,
}

impl AtomicHubStats {
    fn new() -> Self {
        Self {
            frames_received: AtomicU64::new(0),
            frames_relayed: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            commands_forwarded: AtomicU64::new(0),
        }
    }

    fn snapshot(&self) -> HubStats {
        HubStats {
            camera_connected: false,
            viewers_connected: 0,
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_relayed: self.frames_relayed.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            commands_forwarded: self.commands_forwarded.load(Ordering::Relaxed),
        }
    }
}

/// Hub configuration: the relay-relevant subset of the server config.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub takeover: TakeoverPolicy,
    pub default_resolution: String,
    pub initial_firmware: FirmwareDescriptor,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            takeover: TakeoverPolicy::Replace,
            default_resolution: "VGA".to_string(),
            initial_firmware: FirmwareDescriptor {
                version: "1.0.0".to_string(),
                url: String::new(),
            },
        }
    }
}

/// The single camera slot plus session state derived from it.
struct CameraSlot {
    conn: Option<ConnectionHandle>,
    firmware_version: Option<String>,
    streaming: bool,
    resolution: String,
}

struct HubInner {
    config: HubConfig,
    camera: RwLock<CameraSlot>,
    viewers: RwLock<HashMap<ConnId, ConnectionHandle>>,
    firmware: RwLock<FirmwareDescriptor>,
    stats: AtomicHubStats,
}

/// The connection broker. Clones share the same inner state.
#[derive(Clone)]
pub struct RelayHub {
    inner: Arc<HubInner>,
}

impl RelayHub {
    pub fn new(config: HubConfig) -> Self {
        let slot = CameraSlot {
            conn: None,
            firmware_version: None,
            streaming: false,
            resolution: config.default_resolution.clone(),
        };
        let firmware = RwLock::new(config.initial_firmware.clone());
        Self {
            inner: Arc::new(HubInner {
                config,
                camera: RwLock::new(slot),
                viewers: RwLock::new(HashMap::new()),
                firmware,
                stats: AtomicHubStats::new(),
            }),
        }
    }

    // ===== Camera lifecycle =====

    /// Place a new camera connection in the slot.
    ///
    /// Under [`TakeoverPolicy::Replace`] an existing occupant is superseded
    /// without being closed; its socket stays alive until it drops on its
    /// own, and its late events are ignored via the id guards below. Under
    /// [`TakeoverPolicy::Reject`] the new connection is refused while the
    /// occupant's transport is still open.
    pub async fn attach_camera(&self, handle: ConnectionHandle) -> AttachOutcome {
        let mut slot = self.inner.camera.write().await;
        if let Some(current) = &slot.conn {
            if current.is_open() && self.inner.config.takeover == TakeoverPolicy::Reject {
                warn!(camera = %handle.id(), current = %current.id(), "Camera slot occupied, refusing connection");
                return AttachOutcome::Rejected;
            }
            info!(camera = %handle.id(), superseded = %current.id(), "Camera slot taken over");
        } else {
            info!(camera = %handle.id(), "Camera connected");
        }
        // New connection, new registration lifetime. Streaming and
        // resolution carry over until commanded otherwise.
        slot.firmware_version = None;
        slot.conn = Some(handle);
        AttachOutcome::Attached
    }

    /// Clear the slot when a camera transport closes.
    ///
    /// A close event from a superseded connection must not evict the current
    /// occupant, so the slot is only cleared when `id` still matches.
    /// Resolution stays as-is; it is sticky across reconnects.
    pub async fn detach_camera(&self, id: ConnId) {
        let mut slot = self.inner.camera.write().await;
        match &slot.conn {
            Some(current) if current.id() == id => {
                slot.conn = None;
                slot.streaming = false;
                info!(camera = %id, "Camera disconnected");
            }
            Some(current) => {
                debug!(camera = %id, current = %current.id(), "Ignoring close from superseded camera");
            }
            None => {}
        }
    }

    // ===== Viewer lifecycle =====

    pub async fn add_viewer(&self, handle: ConnectionHandle) {
        let id = handle.id();
        self.inner.viewers.write().await.insert(id, handle);
        info!(viewer = %id, "Viewer connected");
    }

    pub async fn remove_viewer(&self, id: ConnId) {
        if self.inner.viewers.write().await.remove(&id).is_some() {
            info!(viewer = %id, "Viewer disconnected");
        }
    }

    // ===== Camera inbound =====

    /// Dispatch a text message from a camera connection.
    ///
    /// Unknown or malformed payloads are dropped without closing the
    /// connection. `camera_register` only applies while the sender is still
    /// the current occupant.
    pub async fn handle_camera_text(&self, id: ConnId, text: &str) {
        let msg: CameraMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                trace!(camera = %id, error = %e, "Ignoring unparseable camera message");
                return;
            }
        };
        match msg {
            CameraMessage::CameraRegister { version } => {
                let mut slot = self.inner.camera.write().await;
                match &slot.conn {
                    Some(current) if current.id() == id => {
                        info!(camera = %id, version = %version, "Camera registered");
                        slot.firmware_version = Some(version);
                    }
                    _ => {
                        debug!(camera = %id, "Ignoring register from superseded camera");
                    }
                }
            }
            CameraMessage::Health => {
                trace!(camera = %id, "Camera health ping");
            }
            CameraMessage::UpdateResult { status } => {
                info!(camera = %id, status = %status, "Camera reported update result");
            }
        }
    }

    /// Fan a binary frame out to every viewer registered when the broadcast
    /// begins.
    ///
    /// The registry is snapshotted first, so membership changes during the
    /// fan-out neither corrupt the iteration nor retroactively add
    /// recipients. Sends to closed viewers are skipped; a full viewer queue
    /// drops the frame for that viewer only.
    pub async fn handle_camera_frame(&self, id: ConnId, frame: Bytes) {
        self.inner
            .stats
            .frames_received
            .fetch_add(1, Ordering::Relaxed);

        let targets: Vec<ConnectionHandle> =
            self.inner.viewers.read().await.values().cloned().collect();

        let mut relayed = 0u64;
        let mut dropped = 0u64;
        for viewer in &targets {
            match viewer.send(Outbound::Binary(frame.clone())) {
                SendStatus::Sent => relayed += 1,
                SendStatus::Dropped => {
                    dropped += 1;
                    trace!(viewer = %viewer.id(), "Viewer queue full, frame dropped");
                }
                // Mid-disconnect; cleanup happens on the viewer's own close event.
                SendStatus::Closed => {}
            }
        }

        self.inner
            .stats
            .frames_relayed
            .fetch_add(relayed, Ordering::Relaxed);
        if dropped > 0 {
            self.inner
                .stats
                .frames_dropped
                .fetch_add(dropped, Ordering::Relaxed);
        }
        trace!(camera = %id, viewers = targets.len(), relayed, "Frame relayed");
    }

    // ===== Viewer inbound =====

    /// Dispatch a control command from a viewer.
    ///
    /// Commands are forwarded only while a camera is present and its
    /// transport reports open; otherwise the command is dropped silently and
    /// no state changes.
    pub async fn handle_viewer_text(&self, id: ConnId, text: &str) {
        let cmd: ViewerCommand = match serde_json::from_str(text) {
            Ok(cmd) => cmd,
            Err(e) => {
                trace!(viewer = %id, error = %e, "Ignoring unparseable viewer message");
                return;
            }
        };

        let mut slot = self.inner.camera.write().await;
        let Some(camera) = slot.conn.as_ref().filter(|c| c.is_open()).cloned() else {
            debug!(viewer = %id, "No open camera, dropping command");
            return;
        };

        match &cmd {
            ViewerCommand::StartStream => slot.streaming = true,
            ViewerCommand::StopStream => slot.streaming = false,
            ViewerCommand::SetResolution { value } => slot.resolution = value.clone(),
        }

        let forward = CameraCommand::from(cmd);
        if let Ok(payload) = serde_json::to_string(&forward) {
            if camera.send(Outbound::Text(payload)) == SendStatus::Sent {
                self.inner
                    .stats
                    .commands_forwarded
                    .fetch_add(1, Ordering::Relaxed);
            }
            debug!(viewer = %id, command = ?forward, "Command forwarded to camera");
        }
    }

    // ===== Firmware =====

    /// Current cached firmware descriptor.
    pub async fn firmware(&self) -> FirmwareDescriptor {
        self.inner.firmware.read().await.clone()
    }

    /// Install a freshly fetched descriptor.
    ///
    /// When the version differs from the cached one (exact string
    /// inequality) the cache is replaced wholesale and an open camera is
    /// notified once, best effort (no ack, no retry). Repeated observations
    /// of the same version do nothing. Returns whether the cache changed.
    pub async fn apply_firmware(&self, desc: FirmwareDescriptor) -> bool {
        {
            let mut cached = self.inner.firmware.write().await;
            if cached.version == desc.version {
                return false;
            }
            info!(old = %cached.version, new = %desc.version, "New firmware available");
            *cached = desc.clone();
        }

        let slot = self.inner.camera.read().await;
        if let Some(camera) = slot.conn.as_ref().filter(|c| c.is_open()) {
            let notify = CameraCommand::UpdateAvailable {
                version: desc.version,
                url: desc.url,
            };
            if let Ok(payload) = serde_json::to_string(&notify) {
                let _ = camera.send(Outbound::Text(payload));
                info!(camera = %camera.id(), "Update notification sent");
            }
        }
        true
    }

    // ===== Introspection =====

    pub async fn camera_session(&self) -> CameraSession {
        let slot = self.inner.camera.read().await;
        CameraSession {
            connected: slot.conn.as_ref().is_some_and(|c| c.is_open()),
            firmware_version: slot.firmware_version.clone(),
            streaming: slot.streaming,
            resolution: slot.resolution.clone(),
        }
    }

    pub async fn stats(&self) -> HubStats {
        let mut stats = self.inner.stats.snapshot();
        stats.viewers_connected = self.inner.viewers.read().await.len();
        stats.camera_connected = self
            .inner
            .camera
            .read()
            .await
            .conn
            .as_ref()
            .is_some_and(|c| c.is_open());
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn hub() -> RelayHub {
        RelayHub::new(HubConfig::default())
    }

    fn reject_hub() -> RelayHub {
        RelayHub::new(HubConfig {
            takeover: TakeoverPolicy::Reject,
            ..HubConfig::default()
        })
    }

    fn conn() -> (ConnectionHandle, mpsc::Receiver<Outbound>) {
        ConnectionHandle::new(8)
    }

    fn frame(byte: u8) -> Bytes {
        Bytes::from(vec![byte; 16])
    }

    fn recv_json(rx: &mut mpsc::Receiver<Outbound>) -> serde_json::Value {
        match rx.try_recv() {
            Ok(Outbound::Text(text)) => serde_json::from_str(&text).unwrap(),
            other => panic!("Expected a text payload, got {:?}", other),
        }
    }

    // ========== Broadcast delivery ==========

    #[tokio::test]
    async fn broadcast_reaches_exactly_the_open_viewers() {
        let hub = hub();
        let (cam, _cam_rx) = conn();
        let cam_id = cam.id();
        hub.attach_camera(cam).await;

        let (v1, mut rx1) = conn();
        let (v2, mut rx2) = conn();
        let (v3, mut rx3) = conn();
        let v2_id = v2.id();
        hub.add_viewer(v1).await;
        hub.add_viewer(v2).await;
        hub.add_viewer(v3).await;

        hub.remove_viewer(v2_id).await;
        hub.handle_camera_frame(cam_id, frame(0xAB)).await;

        assert_eq!(rx1.try_recv(), Ok(Outbound::Binary(frame(0xAB))));
        assert_eq!(rx3.try_recv(), Ok(Outbound::Binary(frame(0xAB))));
        assert!(rx2.try_recv().is_err(), "Removed viewer must not receive");
    }

    #[tokio::test]
    async fn late_viewer_sees_only_later_frames() {
        let hub = hub();
        let (cam, _cam_rx) = conn();
        let cam_id = cam.id();
        hub.attach_camera(cam).await;

        hub.handle_camera_frame(cam_id, frame(1)).await;

        let (viewer, mut rx) = conn();
        hub.add_viewer(viewer).await;
        hub.handle_camera_frame(cam_id, frame(2)).await;

        assert_eq!(rx.try_recv(), Ok(Outbound::Binary(frame(2))));
        assert!(rx.try_recv().is_err(), "No backlog is delivered");
    }

    #[tokio::test]
    async fn frames_are_relayed_verbatim() {
        let hub = hub();
        let (cam, _cam_rx) = conn();
        let cam_id = cam.id();
        hub.attach_camera(cam).await;

        let (viewer, mut rx) = conn();
        hub.add_viewer(viewer).await;

        let payload = Bytes::from_static(&[0xFF, 0xD8, 0x00, 0x42, 0xFF, 0xD9]);
        hub.handle_camera_frame(cam_id, payload.clone()).await;

        assert_eq!(rx.try_recv(), Ok(Outbound::Binary(payload)));
    }

    #[tokio::test]
    async fn full_viewer_queue_drops_for_that_viewer_only() {
        let hub = hub();
        let (cam, _cam_rx) = conn();
        let cam_id = cam.id();
        hub.attach_camera(cam).await;

        let (slow, mut slow_rx) = ConnectionHandle::new(1);
        let (fast, mut fast_rx) = ConnectionHandle::new(8);
        hub.add_viewer(slow).await;
        hub.add_viewer(fast).await;

        for i in 0..3 {
            hub.handle_camera_frame(cam_id, frame(i)).await;
        }

        let mut fast_count = 0;
        while fast_rx.try_recv().is_ok() {
            fast_count += 1;
        }
        let mut slow_count = 0;
        while slow_rx.try_recv().is_ok() {
            slow_count += 1;
        }
        assert_eq!(fast_count, 3, "Fast viewer gets every frame");
        assert_eq!(slow_count, 1, "Slow viewer keeps only what fit");

        let stats = hub.stats().await;
        assert_eq!(stats.frames_received, 3);
        assert_eq!(stats.frames_relayed, 4);
        assert_eq!(stats.frames_dropped, 2);
    }

    #[tokio::test]
    async fn broadcast_with_no_viewers_is_a_noop() {
        let hub = hub();
        let (cam, _cam_rx) = conn();
        let cam_id = cam.id();
        hub.attach_camera(cam).await;

        hub.handle_camera_frame(cam_id, frame(7)).await;

        let stats = hub.stats().await;
        assert_eq!(stats.frames_received, 1);
        assert_eq!(stats.frames_relayed, 0);
    }

    // ========== Viewer commands ==========

    #[tokio::test]
    async fn set_resolution_updates_slot_and_forwards_once() {
        let hub = hub();
        let (cam, mut cam_rx) = conn();
        hub.attach_camera(cam).await;

        let (viewer, _rx) = conn();
        let viewer_id = viewer.id();
        hub.add_viewer(viewer).await;

        hub.handle_viewer_text(viewer_id, r#"{"type":"set_resolution","value":"SVGA"}"#)
            .await;

        assert_eq!(hub.camera_session().await.resolution, "SVGA");

        let forwarded = recv_json(&mut cam_rx);
        assert_eq!(forwarded["type"], "set_resolution");
        assert_eq!(forwarded["value"], "SVGA");
        assert!(cam_rx.try_recv().is_err(), "Exactly one message forwarded");
    }

    #[tokio::test]
    async fn commands_without_camera_are_dropped_silently() {
        let hub = hub();
        let (viewer, _rx) = conn();
        let viewer_id = viewer.id();
        hub.add_viewer(viewer).await;

        hub.handle_viewer_text(viewer_id, r#"{"type":"start_stream"}"#)
            .await;
        hub.handle_viewer_text(viewer_id, r#"{"type":"set_resolution","value":"XGA"}"#)
            .await;

        let session = hub.camera_session().await;
        assert!(!session.streaming);
        assert_eq!(session.resolution, "VGA", "No camera, no mutation");
        assert_eq!(hub.stats().await.commands_forwarded, 0);
    }

    #[tokio::test]
    async fn commands_to_closed_camera_are_dropped() {
        let hub = hub();
        let (cam, cam_rx) = conn();
        hub.attach_camera(cam).await;
        drop(cam_rx); // transport gone, slot not yet cleaned up

        let (viewer, _rx) = conn();
        let viewer_id = viewer.id();
        hub.add_viewer(viewer).await;

        hub.handle_viewer_text(viewer_id, r#"{"type":"start_stream"}"#)
            .await;

        assert!(!hub.camera_session().await.streaming);
        assert_eq!(hub.stats().await.commands_forwarded, 0);
    }

    #[tokio::test]
    async fn repeated_start_stream_forwards_every_time() {
        let hub = hub();
        let (cam, mut cam_rx) = conn();
        hub.attach_camera(cam).await;

        let (viewer, _rx) = conn();
        let viewer_id = viewer.id();
        hub.add_viewer(viewer).await;

        hub.handle_viewer_text(viewer_id, r#"{"type":"start_stream"}"#)
            .await;
        hub.handle_viewer_text(viewer_id, r#"{"type":"start_stream"}"#)
            .await;

        assert!(hub.camera_session().await.streaming);
        assert_eq!(recv_json(&mut cam_rx)["type"], "start_stream");
        assert_eq!(recv_json(&mut cam_rx)["type"], "start_stream");
        assert_eq!(hub.stats().await.commands_forwarded, 2);
    }

    #[tokio::test]
    async fn stop_stream_clears_the_flag() {
        let hub = hub();
        let (cam, mut cam_rx) = conn();
        hub.attach_camera(cam).await;

        let (viewer, _rx) = conn();
        let viewer_id = viewer.id();
        hub.add_viewer(viewer).await;

        hub.handle_viewer_text(viewer_id, r#"{"type":"start_stream"}"#)
            .await;
        assert!(hub.camera_session().await.streaming);

        hub.handle_viewer_text(viewer_id, r#"{"type":"stop_stream"}"#)
            .await;
        assert!(!hub.camera_session().await.streaming);
        assert_eq!(recv_json(&mut cam_rx)["type"], "start_stream");
        assert_eq!(recv_json(&mut cam_rx)["type"], "stop_stream");
    }

    #[tokio::test]
    async fn malformed_viewer_payloads_are_ignored() {
        let hub = hub();
        let (cam, mut cam_rx) = conn();
        hub.attach_camera(cam).await;

        let (viewer, _rx) = conn();
        let viewer_id = viewer.id();
        hub.add_viewer(viewer).await;

        hub.handle_viewer_text(viewer_id, "not json at all").await;
        hub.handle_viewer_text(viewer_id, r#"{"type":"reboot"}"#).await;
        hub.handle_viewer_text(viewer_id, r#"{"value":"VGA"}"#).await;

        assert!(cam_rx.try_recv().is_err(), "Nothing was forwarded");
        let session = hub.camera_session().await;
        assert!(!session.streaming);
        assert_eq!(session.resolution, "VGA");
    }

    // ========== Camera messages ==========

    #[tokio::test]
    async fn camera_register_records_the_version() {
        let hub = hub();
        let (cam, _cam_rx) = conn();
        let cam_id = cam.id();
        hub.attach_camera(cam).await;

        assert_eq!(hub.camera_session().await.firmware_version, None);

        hub.handle_camera_text(cam_id, r#"{"type":"camera_register","version":"2.1.0"}"#)
            .await;

        assert_eq!(
            hub.camera_session().await.firmware_version,
            Some("2.1.0".to_string())
        );
    }

    #[tokio::test]
    async fn health_and_update_result_mutate_nothing() {
        let hub = hub();
        let (cam, _cam_rx) = conn();
        let cam_id = cam.id();
        hub.attach_camera(cam).await;

        hub.handle_camera_text(cam_id, r#"{"type":"health"}"#).await;
        hub.handle_camera_text(cam_id, r#"{"type":"update_result","status":"ok"}"#)
            .await;

        let session = hub.camera_session().await;
        assert!(session.connected);
        assert_eq!(session.firmware_version, None);
        assert!(!session.streaming);
    }

    #[tokio::test]
    async fn malformed_camera_payloads_are_ignored() {
        let hub = hub();
        let (cam, _cam_rx) = conn();
        let cam_id = cam.id();
        hub.attach_camera(cam).await;

        hub.handle_camera_text(cam_id, "}{").await;
        hub.handle_camera_text(cam_id, r#"{"type":"self_destruct"}"#)
            .await;

        assert!(hub.camera_session().await.connected);
    }

    // ========== Camera lifecycle ==========

    #[tokio::test]
    async fn detach_resets_streaming_but_keeps_resolution() {
        let hub = hub();
        let (cam, _cam_rx) = conn();
        let cam_id = cam.id();
        hub.attach_camera(cam).await;

        let (viewer, _rx) = conn();
        let viewer_id = viewer.id();
        hub.add_viewer(viewer).await;
        hub.handle_viewer_text(viewer_id, r#"{"type":"start_stream"}"#)
            .await;
        hub.handle_viewer_text(viewer_id, r#"{"type":"set_resolution","value":"QVGA"}"#)
            .await;

        hub.detach_camera(cam_id).await;

        let session = hub.camera_session().await;
        assert!(!session.connected);
        assert!(!session.streaming, "Streaming is forced off on disconnect");
        assert_eq!(session.resolution, "QVGA", "Resolution survives disconnect");
    }

    #[tokio::test]
    async fn resolution_is_sticky_across_reconnect() {
        let hub = hub();
        let (cam_a, _rx_a) = conn();
        let cam_a_id = cam_a.id();
        hub.attach_camera(cam_a).await;

        let (viewer, _rx) = conn();
        let viewer_id = viewer.id();
        hub.add_viewer(viewer).await;
        hub.handle_viewer_text(viewer_id, r#"{"type":"set_resolution","value":"QVGA"}"#)
            .await;

        hub.detach_camera(cam_a_id).await;

        let (cam_b, _rx_b) = conn();
        hub.attach_camera(cam_b).await;

        assert_eq!(hub.camera_session().await.resolution, "QVGA");
    }

    #[tokio::test]
    async fn stale_close_does_not_evict_the_successor() {
        let hub = hub();
        let (cam_a, _rx_a) = conn();
        let cam_a_id = cam_a.id();
        hub.attach_camera(cam_a).await;

        let (cam_b, _rx_b) = conn();
        let cam_b_id = cam_b.id();
        hub.attach_camera(cam_b).await;

        // The superseded connection's close handler fires late.
        hub.detach_camera(cam_a_id).await;
        assert!(hub.camera_session().await.connected, "B must still hold the slot");

        hub.detach_camera(cam_b_id).await;
        assert!(!hub.camera_session().await.connected);
    }

    #[tokio::test]
    async fn takeover_resets_the_registered_version() {
        let hub = hub();
        let (cam_a, _rx_a) = conn();
        let cam_a_id = cam_a.id();
        hub.attach_camera(cam_a).await;
        hub.handle_camera_text(cam_a_id, r#"{"type":"camera_register","version":"1.0.0"}"#)
            .await;

        let (cam_b, _rx_b) = conn();
        hub.attach_camera(cam_b).await;

        assert_eq!(
            hub.camera_session().await.firmware_version,
            None,
            "Version belongs to the connection that registered it"
        );
    }

    #[tokio::test]
    async fn register_from_superseded_camera_is_ignored() {
        let hub = hub();
        let (cam_a, _rx_a) = conn();
        let cam_a_id = cam_a.id();
        hub.attach_camera(cam_a).await;

        let (cam_b, _rx_b) = conn();
        hub.attach_camera(cam_b).await;

        hub.handle_camera_text(cam_a_id, r#"{"type":"camera_register","version":"9.9.9"}"#)
            .await;

        assert_eq!(hub.camera_session().await.firmware_version, None);
    }

    #[tokio::test]
    async fn reject_policy_refuses_a_second_camera() {
        let hub = reject_hub();
        let (cam_a, _rx_a) = conn();
        assert_eq!(hub.attach_camera(cam_a).await, AttachOutcome::Attached);

        let (cam_b, _rx_b) = conn();
        assert_eq!(hub.attach_camera(cam_b).await, AttachOutcome::Rejected);
    }

    #[tokio::test]
    async fn reject_policy_allows_replacing_a_dead_occupant() {
        let hub = reject_hub();
        let (cam_a, rx_a) = conn();
        hub.attach_camera(cam_a).await;
        drop(rx_a); // transport closed but close event not yet processed

        let (cam_b, _rx_b) = conn();
        assert_eq!(hub.attach_camera(cam_b).await, AttachOutcome::Attached);
    }

    #[tokio::test]
    async fn superseded_camera_frames_still_relay() {
        // The old socket is not closed on takeover; while it lives, its
        // frames keep flowing to viewers.
        let hub = hub();
        let (cam_a, _rx_a) = conn();
        let cam_a_id = cam_a.id();
        hub.attach_camera(cam_a).await;
        let (cam_b, _rx_b) = conn();
        hub.attach_camera(cam_b).await;

        let (viewer, mut rx) = conn();
        hub.add_viewer(viewer).await;

        hub.handle_camera_frame(cam_a_id, frame(9)).await;
        assert_eq!(rx.try_recv(), Ok(Outbound::Binary(frame(9))));
    }

    // ========== Firmware ==========

    fn descriptor(version: &str) -> FirmwareDescriptor {
        FirmwareDescriptor {
            version: version.to_string(),
            url: format!("https://example.com/fw-{version}.bin"),
        }
    }

    #[tokio::test]
    async fn new_version_updates_cache_and_notifies_once() {
        let hub = hub();
        let (cam, mut cam_rx) = conn();
        hub.attach_camera(cam).await;

        assert!(hub.apply_firmware(descriptor("1.0.1")).await);
        assert_eq!(hub.firmware().await, descriptor("1.0.1"));

        let notify = recv_json(&mut cam_rx);
        assert_eq!(notify["type"], "update_available");
        assert_eq!(notify["version"], "1.0.1");
        assert_eq!(notify["url"], "https://example.com/fw-1.0.1.bin");

        // Same version observed again: no cache write, no second push.
        assert!(!hub.apply_firmware(descriptor("1.0.1")).await);
        assert!(cam_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn firmware_update_without_camera_only_updates_cache() {
        let hub = hub();
        assert!(hub.apply_firmware(descriptor("2.0.0")).await);
        assert_eq!(hub.firmware().await.version, "2.0.0");
    }

    #[tokio::test]
    async fn firmware_update_skips_a_closed_camera() {
        let hub = hub();
        let (cam, cam_rx) = conn();
        hub.attach_camera(cam).await;
        drop(cam_rx);

        assert!(hub.apply_firmware(descriptor("3.0.0")).await);
        assert_eq!(hub.firmware().await.version, "3.0.0");
    }

    // ========== Policy parsing ==========

    #[test]
    fn takeover_policy_parses_config_values() {
        assert_eq!(TakeoverPolicy::parse("replace"), Some(TakeoverPolicy::Replace));
        assert_eq!(TakeoverPolicy::parse("Reject"), Some(TakeoverPolicy::Reject));
        assert_eq!(TakeoverPolicy::parse("banish"), None);
    }
}
