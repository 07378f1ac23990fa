//! The connection broker: connection handles, the camera slot, the viewer
//! registry, and the routing between them.

mod connection;
mod hub;

pub use connection::{ConnId, ConnectionHandle, Outbound, SendStatus};
pub use hub::{AttachOutcome, CameraSession, HubConfig, HubStats, RelayHub, TakeoverPolicy};
