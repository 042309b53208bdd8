//! Camera capability layer
//!
//! Abstracts device enumeration, stream acquisition and release behind a
//! trait so the scan session never touches V4L2 or zbarcam directly.

pub mod types;
mod zbar;

pub use types::{DecodeEvent, DiscoveredDevice};
pub use zbar::ZbarPlatform;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Camera capability surface
#[async_trait]
pub trait ScanPlatform: Send + Sync {
    /// Enumerate capture devices in platform order.
    async fn enumerate_devices(&self) -> Result<Vec<DiscoveredDevice>>;

    /// Acquire a device and return a live decode stream.
    ///
    /// Resolves only after the platform has granted or denied access.
    async fn open_stream(&self, device_id: &str) -> Result<OpenedStream>;
}

/// A granted camera binding plus its decode event feed
pub struct OpenedStream {
    pub lease: Box<dyn StreamLease>,
    pub events: mpsc::UnboundedReceiver<DecodeEvent>,
}

/// Exclusive hold on one capture device
#[async_trait]
pub trait StreamLease: Send {
    fn device_id(&self) -> &str;

    /// Release the device. Resolves once the hardware is actually free.
    async fn close(self: Box<Self>) -> Result<()>;
}
