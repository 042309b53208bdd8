//! Capability layer types

/// Capture device as reported by enumeration
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredDevice {
    pub device_id: String,
    pub label: String,
}

/// One event on a live decode stream
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeEvent {
    /// A frame decoded to a payload
    Decoded { text: String },
    /// A frame came and went without a decodable code
    FrameMiss { diagnostic: String },
    /// The stream ended on the platform side
    Closed { reason: String },
}
