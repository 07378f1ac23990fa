//! Skycam — cloud relay for a single live camera and many viewers.
//!
//! One camera connects over a WebSocket and pushes binary video frames plus
//! JSON status messages. Any number of viewers connect over their own
//! WebSockets to watch the stream and issue control commands (start/stop,
//! resolution). The relay hub in [`relay`] is the broker between the two;
//! [`web`] is the axum surface that carries it; [`firmware`] polls a remote
//! version descriptor and pushes update-available notifications down to the
//! camera.

pub mod config;
pub mod firmware;
pub mod message;
pub mod relay;
pub mod web;

pub use config::Config;
pub use firmware::{FirmwareDescriptor, FirmwareWatcher};
pub use message::{CameraCommand, CameraMessage, ViewerCommand};
pub use relay::{
    AttachOutcome, CameraSession, ConnId, ConnectionHandle, HubConfig, HubStats, Outbound,
    RelayHub, SendStatus, TakeoverPolicy,
};
