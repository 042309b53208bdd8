//! Camera discovery and selection
//!
//! Wraps platform enumeration with facing classification and the
//! kiosk's default device policy (prefer the rear-most rear camera).

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::scan_platform::ScanPlatform;

/// Which way a camera points, inferred from its label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    Front,
    Rear,
    Unknown,
}

/// Capture device enriched with facing classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraDevice {
    pub device_id: String,
    pub label: String,
    pub facing: CameraFacing,
}

/// Label heuristic, swappable in tests
pub type FacingClassifier = fn(&str) -> CameraFacing;

/// Default label heuristic. Labels are free-form vendor strings, so this
/// is best-effort only.
pub fn classify_facing(label: &str) -> CameraFacing {
    let label = label.to_ascii_lowercase();
    if label.contains("back") || label.contains("rear") {
        CameraFacing::Rear
    } else if label.contains("front") || label.contains("user") {
        CameraFacing::Front
    } else {
        CameraFacing::Unknown
    }
}

pub struct CameraProber {
    platform: Arc<dyn ScanPlatform>,
    classifier: FacingClassifier,
}

impl CameraProber {
    pub fn new(platform: Arc<dyn ScanPlatform>) -> Self {
        Self {
            platform,
            classifier: classify_facing,
        }
    }

    pub fn with_classifier(platform: Arc<dyn ScanPlatform>, classifier: FacingClassifier) -> Self {
        Self {
            platform,
            classifier,
        }
    }

    /// Enumerate capture devices, classified, in platform order.
    ///
    /// A kiosk without cameras cannot scan, so an empty enumeration is
    /// an error rather than an empty list.
    pub async fn list_cameras(&self) -> Result<Vec<CameraDevice>> {
        let discovered = self
            .platform
            .enumerate_devices()
            .await
            .map_err(|e| Error::NoDevice(format!("camera enumeration failed: {e}")))?;

        if discovered.is_empty() {
            return Err(Error::NoDevice("no camera devices found".to_string()));
        }

        let devices = discovered
            .into_iter()
            .map(|d| CameraDevice {
                facing: (self.classifier)(&d.label),
                device_id: d.device_id,
                label: d.label,
            })
            .collect();
        Ok(devices)
    }

    /// Pick the device a kiosk should scan with: the last rear-facing
    /// camera, or the last device overall when no label looks rear.
    pub async fn select_device(&self) -> Result<CameraDevice> {
        let devices = self.list_cameras().await?;
        let selected = devices
            .iter()
            .rev()
            .find(|d| d.facing == CameraFacing::Rear)
            .or_else(|| devices.last())
            .cloned();
        // list_cameras never returns an empty list
        selected.ok_or_else(|| Error::NoDevice("no camera devices found".to_string()))
    }
}
