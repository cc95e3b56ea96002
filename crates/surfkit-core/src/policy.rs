//! Failure handling around intercepted calls.
//!
//! Every interaction method of a description runs through
//! [`Part::invoke`](crate::part::Part::invoke). When the body fails, the
//! [`ExceptionHandler`] bound to the node decides what happens next by
//! returning a [`Recovery`]. A node's handler is fixed when the node is built:
//! the type's own handler if it declares one, else the handler of the nearest
//! ancestor, else the session default.
//!
//! # Built-in handlers
//!
//! | Handler | Behavior |
//! |---------|----------|
//! | [`CaptureAndRethrow`] | capture a diagnostic artifact, return the error (default) |
//! | [`Rethrow`] | return the error unchanged |
//! | [`SuppressWithDefault`] | swallow the error, return `R::default()` |
//! | [`RetryThenCapture`] | retry up to `attempts` times (capped by `max_retries`), then capture and return the error |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::diagnostics::DiagnosticArtifact;
use crate::error::CoreError;
use crate::session::Session;
use crate::tree::NodeId;

/// Declaration of one intercepted method.
///
/// Meant to live in a `const` next to the method it describes:
///
/// ```
/// use std::time::Duration;
/// use surfkit_core::policy::MethodSpec;
///
/// const SUBMIT: MethodSpec = MethodSpec::interactive("submit");
/// const SLOW_SEARCH: MethodSpec =
///     MethodSpec::interactive("search").with_timeout(Duration::from_secs(20));
/// const TITLE: MethodSpec = MethodSpec::passive("title");
///
/// assert!(SUBMIT.is_interactive());
/// assert_eq!(SLOW_SEARCH.timeout_override(), Some(Duration::from_secs(20)));
/// assert!(!TITLE.is_interactive());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSpec {
    name: &'static str,
    interactive: bool,
    timeout: Option<Duration>,
}

impl MethodSpec {
    /// A method that needs its node focused before it runs.
    pub const fn interactive(name: &'static str) -> Self {
        Self {
            name,
            interactive: true,
            timeout: None,
        }
    }

    /// A method that runs without moving focus.
    pub const fn passive(name: &'static str) -> Self {
        Self {
            name,
            interactive: false,
            timeout: None,
        }
    }

    /// Overrides the driver's implicit wait for the duration of the call.
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub const fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }
}

/// What the call wrapper should do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Return the error to the caller.
    Rethrow,
    /// Run the body again. Bounded by the session's `max_retries`; once the
    /// bound is reached the error is returned. Handlers can check
    /// [`Failure::can_retry`] to capture before that happens.
    Retry,
    /// Swallow the error and return the default value of the result type.
    Suppress,
}

/// A failed call, as seen by an exception handler.
pub struct Failure<'a> {
    pub(crate) session: &'a Session,
    pub(crate) error: &'a CoreError,
    pub(crate) attempt: u32,
    pub(crate) can_retry: bool,
    pub(crate) method: &'a MethodSpec,
    pub(crate) node: NodeId,
    pub(crate) type_name: &'static str,
}

impl<'a> Failure<'a> {
    pub fn error(&self) -> &CoreError {
        self.error
    }

    /// How many times the body has run so far, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// False once the session's `max_retries` is spent. A `Retry` returned
    /// then is treated as `Rethrow`.
    pub fn can_retry(&self) -> bool {
        self.can_retry
    }

    pub fn method(&self) -> &MethodSpec {
        self.method
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Captures a diagnostic artifact for this failure and hands it to the
    /// session's sink. Includes a screenshot when the session is configured
    /// for it and the driver can take one.
    pub async fn capture_diagnostic(&self) -> Arc<DiagnosticArtifact> {
        self.session
            .capture_diagnostic(self.node, self.type_name, self.method.name(), self.error)
            .await
    }
}

/// Decides how a failed intercepted call is handled.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use surfkit_core::error::CoreError;
/// use surfkit_core::policy::{ExceptionHandler, Failure, Recovery};
///
/// /// Retries stale-handle failures once, rethrows everything else.
/// struct RetryStale;
///
/// #[async_trait]
/// impl ExceptionHandler for RetryStale {
///     async fn handle(&self, failure: &Failure<'_>) -> Recovery {
///         match failure.error() {
///             CoreError::StaleHandle { .. } if failure.attempt() == 1 => Recovery::Retry,
///             _ => Recovery::Rethrow,
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait ExceptionHandler: Send + Sync {
    async fn handle(&self, failure: &Failure<'_>) -> Recovery;
}

/// Captures a diagnostic artifact and rethrows. The session default.
#[derive(Debug, Default, Clone, Copy)]
pub struct CaptureAndRethrow;

#[async_trait]
impl ExceptionHandler for CaptureAndRethrow {
    async fn handle(&self, failure: &Failure<'_>) -> Recovery {
        failure.capture_diagnostic().await;
        Recovery::Rethrow
    }
}

/// Rethrows without capturing anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Rethrow;

#[async_trait]
impl ExceptionHandler for Rethrow {
    async fn handle(&self, _failure: &Failure<'_>) -> Recovery {
        Recovery::Rethrow
    }
}

/// Swallows every failure; the call returns the default value.
#[derive(Debug, Default, Clone, Copy)]
pub struct SuppressWithDefault;

#[async_trait]
impl ExceptionHandler for SuppressWithDefault {
    async fn handle(&self, failure: &Failure<'_>) -> Recovery {
        debug!(
            method = failure.method().name(),
            error = %failure.error(),
            "suppressing failure"
        );
        Recovery::Suppress
    }
}

/// Retries up to `attempts` times, then captures a diagnostic and rethrows.
/// The session's `max_retries` caps `attempts`.
#[derive(Debug, Clone, Copy)]
pub struct RetryThenCapture {
    pub attempts: u32,
}

#[async_trait]
impl ExceptionHandler for RetryThenCapture {
    async fn handle(&self, failure: &Failure<'_>) -> Recovery {
        if failure.attempt() <= self.attempts && failure.can_retry() {
            return Recovery::Retry;
        }
        failure.capture_diagnostic().await;
        Recovery::Rethrow
    }
}
