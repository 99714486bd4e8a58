//! Errors surfaced to the D-Bus protocol host.

use thiserror::Error;

/// Errors from the property tables and command dispatch.
///
/// Only addressing mistakes (wrong interface or property name) reach the
/// bus; device and translation failures are absorbed inside the adapter.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("unknown interface: {0}")]
    UnknownInterface(String),

    #[error("unknown property: {interface}.{property}")]
    UnknownProperty {
        interface: String,
        property: String,
    },

    /// Value conversion failure while building a property value
    #[error(transparent)]
    Value(#[from] zbus::zvariant::Error),
}

pub type Result<T> = std::result::Result<T, AdapterError>;
