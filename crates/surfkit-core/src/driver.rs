//! Driving-layer trait for surface-aware UI automation.
//!
//! This module defines the [`SurfaceDriver`] trait, the narrow interface the
//! core consumes from whatever actually talks to the browser or device (a
//! WebDriver client, an Appium session, a test double). The core never starts
//! drivers or builds capabilities; it only lists surfaces, reads their live
//! properties, moves focus between them and enters frames.
//!
//! # Surfaces
//!
//! A *surface* is anything the driver can focus: a browser window or a mobile
//! context (`NATIVE_APP`, `WEBVIEW_1`, ...). Surfaces are identified by an
//! opaque [`SurfaceId`] chosen by the driver.
//!
//! ```no_run
//! use surfkit_core::driver::{SurfaceDriver, SurfaceKind};
//!
//! async fn print_windows(driver: &dyn SurfaceDriver) {
//!     for id in driver.list_surfaces(SurfaceKind::Window).await.unwrap_or_default() {
//!         let title = driver.title(&id).await.unwrap_or_default();
//!         println!("{id}: {title}");
//!     }
//! }
//! ```

use std::any::Any;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::FrameTarget;

/// Errors that can occur during driver operations.
///
/// This enum unifies errors from all driving backends behind a single type so
/// the core can react to the few cases it cares about (a surface that is gone,
/// an unsupported capability) and pass everything else through unchanged.
#[derive(Error, Debug)]
pub enum DriverError {
    /// A command or operation failed with the given message.
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// The backend is not available or not connected.
    #[error("Not connected to automation backend")]
    NotConnected,

    /// The connection to the backend was lost.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The addressed window or context no longer exists.
    #[error("Surface '{0}' is gone")]
    SurfaceGone(String),

    /// A frame on the requested path could not be entered.
    #[error("No such frame: {0}")]
    NoSuchFrame(String),

    /// The backend does not implement the requested capability.
    #[error("Not supported by this backend: {0}")]
    Unsupported(String),

    /// An operation timed out.
    #[error("Operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The kind of surface a handle addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurfaceKind {
    /// A browser window (or tab).
    Window,
    /// A mobile context: the native app or one of its web views.
    Context,
}

impl fmt::Display for SurfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceKind::Window => f.write_str("window"),
            SurfaceKind::Context => f.write_str("context"),
        }
    }
}

/// Opaque driver identifier of a surface (window handle or context name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceId(String);

impl SurfaceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SurfaceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SurfaceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Outcome of asking the driver to close a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The surface was open and is now closed.
    Closed,
    /// The surface was already gone when the request arrived.
    AlreadyClosed,
}

/// Trait for the driving layer of one automation session.
///
/// One driver instance corresponds to exactly one external session. The core
/// serializes registry operations on top of it, so implementors do not need to
/// guard against interleaved focus switches coming from the core itself.
///
/// # Required Methods
///
/// Implementors must provide: [`list_surfaces`](SurfaceDriver::list_surfaces),
/// [`title`](SurfaceDriver::title),
/// [`current_url`](SurfaceDriver::current_url),
/// [`switch_focus`](SurfaceDriver::switch_focus),
/// [`close_surface`](SurfaceDriver::close_surface),
/// [`enter_top_document`](SurfaceDriver::enter_top_document),
/// [`enter_frame`](SurfaceDriver::enter_frame)
/// and [`as_any`](SurfaceDriver::as_any).
#[async_trait]
pub trait SurfaceDriver: Send + Sync {
    /// List the live surfaces of the given kind, in the order the backend reports them.
    ///
    /// The order is only used as raw input when new surfaces are first
    /// observed; the core assigns its own stable discovery index.
    async fn list_surfaces(&self, kind: SurfaceKind) -> Result<Vec<SurfaceId>, DriverError>;

    /// Read the current title of a surface.
    async fn title(&self, id: &SurfaceId) -> Result<String, DriverError>;

    /// Read the URL the surface currently shows.
    async fn current_url(&self, id: &SurfaceId) -> Result<String, DriverError>;

    /// Read the navigation history of a surface, oldest first.
    ///
    /// The default implementation reports only the current URL. Backends that
    /// track history should override this.
    async fn navigation_history(&self, id: &SurfaceId) -> Result<Vec<String>, DriverError> {
        Ok(vec![self.current_url(id).await?])
    }

    /// Read the name of a mobile context.
    ///
    /// Appium identifies contexts by name, so the default implementation
    /// returns the identifier itself.
    async fn context_name(&self, id: &SurfaceId) -> Result<String, DriverError> {
        Ok(id.as_str().to_string())
    }

    /// Move the driver focus to the given surface.
    ///
    /// Backends should report [`DriverError::SurfaceGone`] when the surface no
    /// longer exists.
    async fn switch_focus(&self, id: &SurfaceId) -> Result<(), DriverError>;

    /// Close the given surface.
    async fn close_surface(&self, id: &SurfaceId) -> Result<CloseOutcome, DriverError>;

    /// Leave any entered frame and return to the top document of the focused surface.
    async fn enter_top_document(&self) -> Result<(), DriverError>;

    /// Enter one frame, relative to the currently entered document.
    ///
    /// # Arguments
    ///
    /// * `frame` - The frame index or locator to enter
    async fn enter_frame(&self, frame: &FrameTarget) -> Result<(), DriverError>;

    /// Read the implicit wait currently applied to element lookups.
    ///
    /// Not all backends support this. The default implementation returns
    /// an error.
    async fn implicit_wait(&self) -> Result<Duration, DriverError> {
        Err(DriverError::Unsupported("implicit_wait".to_string()))
    }

    /// Change the implicit wait applied to element lookups.
    ///
    /// Not all backends support this. The default implementation returns
    /// an error.
    async fn set_implicit_wait(&self, _timeout: Duration) -> Result<(), DriverError> {
        Err(DriverError::Unsupported("set_implicit_wait".to_string()))
    }

    /// Capture a screenshot of the focused surface.
    ///
    /// # Returns
    ///
    /// Raw PNG image bytes.
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        Err(DriverError::Unsupported("screenshot".to_string()))
    }

    /// Enables downcasting to the concrete backend.
    ///
    /// Interaction bodies use this to reach backend-specific commands
    /// (clicking, typing, ...) that the core itself never needs.
    fn as_any(&self) -> &dyn Any;
}
