//! Microphone permission gate

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
}

impl PermissionStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }
}

/// Resolves microphone access before a turn may listen
///
/// Asked at the start of every turn and again whenever the application
/// returns to the foreground.
#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn ensure_granted(&self) -> PermissionStatus;
}

/// Gate with a fixed answer that the host can flip at runtime
///
/// For hosts that resolve the OS prompt themselves and report the result.
#[derive(Debug)]
pub struct StaticPermissionGate {
    granted: AtomicBool,
}

impl StaticPermissionGate {
    pub fn granted() -> Self {
        Self {
            granted: AtomicBool::new(true),
        }
    }

    pub fn denied() -> Self {
        Self {
            granted: AtomicBool::new(false),
        }
    }

    pub fn set_granted(&self, granted: bool) {
        tracing::info!("Microphone permission set to {}", granted);
        self.granted.store(granted, Ordering::SeqCst);
    }
}

#[async_trait]
impl PermissionGate for StaticPermissionGate {
    async fn ensure_granted(&self) -> PermissionStatus {
        if self.granted.load(Ordering::SeqCst) {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        }
    }
}

#[cfg(feature = "audio-io")]
pub use device::DevicePermissionGate;

#[cfg(feature = "audio-io")]
mod device {
    use super::{PermissionGate, PermissionStatus};
    use async_trait::async_trait;
    use cpal::traits::{DeviceTrait, HostTrait};

    /// Treats an openable default input device as granted access
    ///
    /// On desktop platforms a denied microphone shows up as a missing device
    /// or a failing config query.
    #[derive(Debug, Default, Clone)]
    pub struct DevicePermissionGate;

    #[async_trait]
    impl PermissionGate for DevicePermissionGate {
        async fn ensure_granted(&self) -> PermissionStatus {
            let usable = tokio::task::spawn_blocking(|| {
                let host = cpal::default_host();
                match host.default_input_device() {
                    Some(device) => match device.default_input_config() {
                        Ok(_) => true,
                        Err(e) => {
                            tracing::warn!("Input device not usable: {}", e);
                            false
                        }
                    },
                    None => {
                        tracing::warn!("No default input device found");
                        false
                    }
                }
            })
            .await;

            match usable {
                Ok(true) => PermissionStatus::Granted,
                _ => PermissionStatus::Denied,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_gate_can_be_revoked() {
        let gate = StaticPermissionGate::granted();
        assert_eq!(gate.ensure_granted().await, PermissionStatus::Granted);

        gate.set_granted(false);
        assert_eq!(gate.ensure_granted().await, PermissionStatus::Denied);
        assert!(!gate.ensure_granted().await.is_granted());
    }

    #[tokio::test]
    async fn test_denied_gate() {
        let gate = StaticPermissionGate::denied();
        assert_eq!(gate.ensure_granted().await, PermissionStatus::Denied);
    }
}
