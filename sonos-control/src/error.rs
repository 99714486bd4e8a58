//! Error types for device control operations.

use thiserror::Error;

/// Errors from talking to a Sonos device.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Network or HTTP communication error
    #[error("network error: {0}")]
    Network(String),

    /// XML or header parsing error
    #[error("parse error: {0}")]
    Parse(String),

    /// SOAP fault returned by the device
    #[error("SOAP fault: error code {0}")]
    Fault(u16),

    /// Discovery completed without finding a group coordinator.
    ///
    /// This is the only error that is fatal to the bridge: without a
    /// coordinator there is nothing to control.
    #[error("no Sonos coordinator found on the network")]
    NoCoordinator,

    /// UPnP event subscription failure (subscribe, renew, listener)
    #[error("subscription error: {0}")]
    Subscription(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ControlError>;
