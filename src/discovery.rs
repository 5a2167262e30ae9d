//! Messages exchanged with the remote discovery service.
//!
//! The websocket session itself belongs to the embedding application; this module only turns its text frames into
//! connected-device counts.

use serde::{Deserialize, Serialize};

use crate::supervisor::ConnectionSupervisor;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscoveryRequest {
  ListConnectedDevices,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscoveryMessage {
  ConnectedDevicesChanged { devices: Vec<serde_json::Value> },
  ListConnectedDevices { devices: Vec<serde_json::Value> },
  #[serde(other)]
  Unknown,
}

pub fn list_connected_devices_request() -> String {
  // a unit variant with a string tag cannot fail to serialize
  serde_json::to_string(&DiscoveryRequest::ListConnectedDevices)
    .unwrap_or_else(|_| r#"{"type":"list_connected_devices"}"#.to_string())
}

/// Applies one text frame; malformed frames are logged and dropped.
pub fn handle_message(text: &str, supervisor: &ConnectionSupervisor) -> Option<usize> {
  let message = match serde_json::from_str::<DiscoveryMessage>(text) {
    Ok(message) => message,
    Err(err) => {
      tracing::warn!("dropping malformed discovery message: {err}");
      return None;
    }
  };

  match message {
    DiscoveryMessage::ConnectedDevicesChanged { devices } | DiscoveryMessage::ListConnectedDevices { devices } => {
      supervisor.set_connected_device_count(devices.len());
      Some(devices.len())
    }
    DiscoveryMessage::Unknown => {
      tracing::trace!("ignoring discovery message: {text}");
      None
    }
  }
}
