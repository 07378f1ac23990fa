//! Control-plane message types for the relay protocol.
//!
//! Every control message is a UTF-8 JSON object with a `type` discriminator;
//! binary WebSocket payloads are video frames and never pass through these
//! types. A payload that does not match a known schema simply fails to
//! parse and the caller drops it; parse failures never close a connection.

use serde::{Deserialize, Serialize};

/// Messages a camera sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CameraMessage {
    /// Announces the camera along with its running firmware version.
    CameraRegister { version: String },
    /// Liveness ping. Carries no payload and expects no reply.
    Health,
    /// Outcome of a previously pushed firmware update.
    UpdateResult { status: String },
}

/// Control commands a viewer sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerCommand {
    StartStream,
    StopStream,
    /// Any string is accepted here. The operator UI presents an enumerated
    /// set of resolutions, but the protocol does not enforce it.
    SetResolution { value: String },
}

/// Messages the server sends to the camera.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CameraCommand {
    StartStream,
    StopStream,
    SetResolution { value: String },
    /// Out-of-band notification that a newer firmware package exists.
    UpdateAvailable { version: String, url: String },
}

impl From<ViewerCommand> for CameraCommand {
    fn from(cmd: ViewerCommand) -> Self {
        match cmd {
            ViewerCommand::StartStream => CameraCommand::StartStream,
            ViewerCommand::StopStream => CameraCommand::StopStream,
            ViewerCommand::SetResolution { value } => CameraCommand::SetResolution { value },
        }
    }
}
