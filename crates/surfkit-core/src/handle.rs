//! Identity and state of one addressable surface.
//!
//! A [`Handle`] is created by the [`HandleRegistry`](crate::registry::HandleRegistry)
//! the first time a window or context is observed and is shared by reference
//! from then on: every model node bound to the same surface holds a clone of
//! the same `Arc`, so identity comparisons are pointer comparisons.
//!
//! Only the discovery index is fixed at creation. Title, URL and context name
//! are read live from the driver on every call.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::driver::{CloseOutcome, DriverError, SurfaceDriver, SurfaceId, SurfaceKind};
use crate::error::{CoreError, Result};
use crate::registry::{HandleRegistry, RegistryShared};

/// Lifecycle state of a handle.
///
/// `Active -> Stale` happens on refresh when the driver stops reporting the
/// surface; `Destroyed` is terminal and only reached through [`Handle::destroy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandleState {
    Active,
    Stale,
    Destroyed,
}

struct HandleInner {
    id: SurfaceId,
    kind: SurfaceKind,
    discovery_index: usize,
    state: Mutex<HandleState>,
    driver: Arc<dyn SurfaceDriver>,
    registry: Weak<RegistryShared>,
}

/// Shared reference to one window or mobile context of a session.
#[derive(Clone)]
pub struct Handle {
    inner: Arc<HandleInner>,
}

impl Handle {
    pub(crate) fn new(
        id: SurfaceId,
        kind: SurfaceKind,
        discovery_index: usize,
        driver: Arc<dyn SurfaceDriver>,
        registry: Weak<RegistryShared>,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id,
                kind,
                discovery_index,
                state: Mutex::new(HandleState::Active),
                driver,
                registry,
            }),
        }
    }

    pub fn id(&self) -> &SurfaceId {
        &self.inner.id
    }

    pub fn kind(&self) -> SurfaceKind {
        self.inner.kind
    }

    /// Position at which the registry first observed this surface.
    ///
    /// Stable for the life of the session.
    pub fn discovery_index(&self) -> usize {
        self.inner.discovery_index
    }

    pub fn state(&self) -> HandleState {
        *self.inner.state.lock()
    }

    pub(crate) fn set_state(&self, state: HandleState) {
        *self.inner.state.lock() = state;
    }

    /// Reference identity: both values point at the same handle.
    pub fn ptr_eq(&self, other: &Handle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether the handle was active at the registry's last refresh.
    ///
    /// This is a cached check and does not talk to the driver. Use
    /// [`exists_fresh`](Self::exists_fresh) to refresh first.
    pub fn exists(&self) -> bool {
        self.state() == HandleState::Active
    }

    /// Refreshes the owning registry, then reports whether the handle is active.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SessionClosed`] if the registry has been dropped,
    /// or the driver error raised while listing surfaces.
    pub async fn exists_fresh(&self) -> Result<bool> {
        self.registry()?.refresh().await?;
        Ok(self.exists())
    }

    /// Live title of the surface.
    pub async fn title(&self) -> Result<String> {
        Ok(self.inner.driver.title(&self.inner.id).await?)
    }

    /// Live URL of the surface.
    pub async fn current_url(&self) -> Result<String> {
        Ok(self.inner.driver.current_url(&self.inner.id).await?)
    }

    /// Navigation history of the surface, oldest first.
    pub async fn navigation_history(&self) -> Result<Vec<String>> {
        Ok(self.inner.driver.navigation_history(&self.inner.id).await?)
    }

    /// Live name of the mobile context.
    pub async fn context_name(&self) -> Result<String> {
        Ok(self.inner.driver.context_name(&self.inner.id).await?)
    }

    /// Focuses this surface through the owning registry.
    pub async fn switch_to_me(&self) -> Result<()> {
        self.registry()?.switch_to(self).await
    }

    /// Closes the underlying surface and marks the handle destroyed.
    ///
    /// Idempotent: a handle that is already destroyed returns immediately, and
    /// a surface the driver reports as already closed is not an error. The
    /// state becomes [`HandleState::Destroyed`] even when the close request
    /// fails; the failure is then returned to the caller. The close and the
    /// state change happen under the registry's session lock.
    pub async fn destroy(&self) -> Result<()> {
        if self.state() == HandleState::Destroyed {
            return Ok(());
        }

        let outcome = match self.inner.registry.upgrade() {
            Some(shared) => HandleRegistry::from_shared(shared).close_and_forget(self).await,
            None => {
                let outcome = self.inner.driver.close_surface(&self.inner.id).await;
                self.set_state(HandleState::Destroyed);
                outcome
            }
        };

        match outcome {
            Ok(CloseOutcome::Closed) => {
                debug!(id = %self.inner.id, "surface closed");
                Ok(())
            }
            Ok(CloseOutcome::AlreadyClosed) | Err(DriverError::SurfaceGone(_)) => {
                debug!(id = %self.inner.id, "surface was already closed");
                Ok(())
            }
            Err(e) => {
                warn!(id = %self.inner.id, error = %e, "close request failed");
                Err(e.into())
            }
        }
    }

    pub(crate) fn is_owned_by(&self, shared: &Arc<RegistryShared>) -> bool {
        std::ptr::eq(self.inner.registry.as_ptr(), Arc::as_ptr(shared))
    }

    fn registry(&self) -> Result<HandleRegistry> {
        self.inner
            .registry
            .upgrade()
            .map(HandleRegistry::from_shared)
            .ok_or(CoreError::SessionClosed)
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Handle {}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("discovery_index", &self.inner.discovery_index)
            .field("state", &self.state())
            .finish()
    }
}
