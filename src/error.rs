//! Error types for the remote pointer
//!
//! Only the permission failures are user-visible. Dropped samples and
//! skipped publishes are reported as plain values ([`Rejection`],
//! [`crate::transport::PublishOutcome`]) because they are expected in normal
//! operation.

use thiserror::Error;

/// Failures of the permission gate, surfaced to the user as a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("Your current device does not have access to the DeviceOrientation event")]
    UnsupportedPlatform,

    #[error("You must grant access to the device's sensor for this demo")]
    PermissionDenied,
}

/// A feed line that could not be turned into an event.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Malformed feed line: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Feed line is not valid UTF-8")]
    Utf8,
}

/// Why a raw event did not update the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// An orientation field was missing or not finite
    InvalidSample,
    /// Event belongs to the input variant this session did not select
    OtherVariant,
    /// Pointer event arrived while the viewport has no area
    EmptyViewport,
}

/// Engine.IO / Socket.IO frame that could not be decoded
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Empty packet")]
    Empty,

    #[error("Unknown {layer} packet type '{kind}'")]
    UnknownType { layer: &'static str, kind: char },

    #[error("Binary packets are not supported")]
    Binary,

    #[error("Invalid packet payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Event packet without a name")]
    MissingEventName,
}
