//! Error taxonomy of the core.

use std::time::Duration;

use thiserror::Error;

use crate::driver::{DriverError, SurfaceKind};

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors surfaced by the handle registry, the model tree, the behavior
/// resolver and intercepted calls.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No surface satisfied the criteria before the timeout elapsed.
    ///
    /// Never retried internally; the caller decides whether to wait longer.
    #[error("No surface found where {criteria} within {timeout:?}")]
    HandleNotFound { criteria: String, timeout: Duration },

    /// The handle existed but the driver reports it gone (or it was destroyed).
    ///
    /// The caller may re-resolve.
    #[error("Handle '{id}' is no longer active")]
    StaleHandle { id: String },

    /// Declared metadata selects a surface kind the target cannot be bound to.
    #[error("Declared selector {selector} of {type_name} cannot select a {kind}")]
    AmbiguousMetadata {
        type_name: String,
        selector: String,
        kind: SurfaceKind,
    },

    /// No construction path accepts the synthesized arguments.
    #[error("Cannot construct {type_name}: {reason}")]
    Construction { type_name: String, reason: String },

    /// A selection rule could not be built.
    #[error("Invalid criteria: {0}")]
    InvalidCriteria(String),

    /// The model node was destroyed and can no longer be used.
    #[error("Model node {0} was destroyed")]
    NodeDestroyed(u64),

    /// The session owning a handle or node has been dropped.
    #[error("Session is closed")]
    SessionClosed,

    /// An interaction body failed.
    #[error("Interaction failed: {0}")]
    Interaction(String),

    /// Error from the driving layer, passed through unchanged.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl CoreError {
    /// Builds a [`CoreError::Construction`] for the given type.
    pub fn construction(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::Construction {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error belongs to the programming-error class
    /// (bad declarations or arguments) rather than a runtime condition.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            CoreError::AmbiguousMetadata { .. }
                | CoreError::Construction { .. }
                | CoreError::InvalidCriteria(_)
        )
    }
}
