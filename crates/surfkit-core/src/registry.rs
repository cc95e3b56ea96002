//! Live set of surfaces for one driver session.
//!
//! The [`HandleRegistry`] keeps every [`Handle`] it has ever observed in
//! discovery order. A refresh appends newly reported surfaces and flips
//! vanished ones to stale in place, so a handle's discovery index never
//! changes for the life of the session.
//!
//! # Serialization
//!
//! All registry operations (`refresh`, `resolve`, `switch_to`) and
//! [`Handle::destroy`] take the session lock, a `tokio::sync::Mutex` around the known-handle list and the
//! active handle. `resolve` holds it for one poll at a time and releases it
//! while sleeping.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use surfkit_core::criteria::MatchCriteria;
//! use surfkit_core::registry::HandleRegistry;
//!
//! async fn focus_login(registry: &HandleRegistry) -> surfkit_core::error::Result<()> {
//!     let login = registry
//!         .resolve(&MatchCriteria::by_title("^Login")?, Duration::from_secs(5))
//!         .await?;
//!     login.switch_to_me().await
//! }
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::criteria::MatchCriteria;
use crate::driver::{CloseOutcome, DriverError, SurfaceDriver, SurfaceId, SurfaceKind};
use crate::error::{CoreError, Result};
use crate::handle::{Handle, HandleState};
use crate::session::SessionEvent;

/// Capacity of the event channel created with a registry.
const EVENT_CHANNEL_CAPACITY: usize = 100;

#[derive(Default)]
struct RegistryState {
    known: Vec<Handle>,
    active: Option<Handle>,
}

pub(crate) struct RegistryShared {
    kind: SurfaceKind,
    driver: Arc<dyn SurfaceDriver>,
    poll_interval: Duration,
    state: Mutex<RegistryState>,
    events: broadcast::Sender<SessionEvent>,
}

/// Tracks the live handles of one session and resolves selection rules.
///
/// Cheap to clone; clones share the same state and lock.
#[derive(Clone)]
pub struct HandleRegistry {
    shared: Arc<RegistryShared>,
}

impl HandleRegistry {
    /// Creates a registry for surfaces of one kind.
    ///
    /// # Arguments
    ///
    /// * `driver` - The driving layer of the session
    /// * `kind` - Which surfaces this registry tracks (windows or contexts)
    /// * `poll_interval` - Pause between polls while resolving
    pub fn new(driver: Arc<dyn SurfaceDriver>, kind: SurfaceKind, poll_interval: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(RegistryShared {
                kind,
                driver,
                poll_interval,
                state: Mutex::new(RegistryState::default()),
                events,
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<RegistryShared>) -> Self {
        Self { shared }
    }

    pub fn kind(&self) -> SurfaceKind {
        self.shared.kind
    }

    pub fn poll_interval(&self) -> Duration {
        self.shared.poll_interval
    }

    pub fn driver(&self) -> &Arc<dyn SurfaceDriver> {
        &self.shared.driver
    }

    /// Subscribes to handle lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub(crate) fn events(&self) -> &broadcast::Sender<SessionEvent> {
        &self.shared.events
    }

    fn emit(&self, event: SessionEvent) {
        // Ignore send errors - no subscribers is expected
        let _ = self.shared.events.send(event);
    }

    /// Re-reads the live surface list from the driver and diffs it against
    /// the known handles.
    ///
    /// New identifiers are appended as active handles with the next discovery
    /// index. Known handles missing from the live list become stale; stale
    /// handles that reappear are revived with their original index. Destroyed
    /// handles are never touched.
    ///
    /// # Returns
    ///
    /// Every known handle in discovery order. Two consecutive calls with no
    /// external change return the same handles in the same order.
    pub async fn refresh(&self) -> Result<Vec<Handle>> {
        let mut state = self.shared.state.lock().await;
        self.refresh_locked(&mut state).await
    }

    async fn refresh_locked(&self, state: &mut RegistryState) -> Result<Vec<Handle>> {
        let live = self.shared.driver.list_surfaces(self.shared.kind).await?;
        let live_ids: HashSet<&SurfaceId> = live.iter().collect();

        for handle in &state.known {
            match handle.state() {
                HandleState::Active if !live_ids.contains(handle.id()) => {
                    handle.set_state(HandleState::Stale);
                    if state.active.as_ref().is_some_and(|a| a.ptr_eq(handle)) {
                        state.active = None;
                    }
                    debug!(id = %handle.id(), index = handle.discovery_index(), "handle went stale");
                    self.emit(SessionEvent::HandleStale {
                        id: handle.id().clone(),
                        discovery_index: handle.discovery_index(),
                    });
                }
                HandleState::Stale if live_ids.contains(handle.id()) => {
                    handle.set_state(HandleState::Active);
                    debug!(id = %handle.id(), index = handle.discovery_index(), "handle revived");
                    self.emit(SessionEvent::HandleRevived {
                        id: handle.id().clone(),
                        discovery_index: handle.discovery_index(),
                    });
                }
                _ => {}
            }
        }

        for id in &live {
            let tracked = state
                .known
                .iter()
                .any(|h| h.id() == id && h.state() != HandleState::Destroyed);
            if tracked {
                continue;
            }
            let handle = Handle::new(
                id.clone(),
                self.shared.kind,
                state.known.len(),
                Arc::clone(&self.shared.driver),
                Arc::downgrade(&self.shared),
            );
            debug!(id = %id, index = handle.discovery_index(), "new handle observed");
            self.emit(SessionEvent::HandleAppeared {
                id: id.clone(),
                discovery_index: handle.discovery_index(),
            });
            state.known.push(handle);
        }

        Ok(state.known.clone())
    }

    /// Polls until a handle satisfies `criteria` or `timeout` elapses.
    ///
    /// Each poll refreshes the registry and checks active handles in discovery
    /// order, so when several surfaces match at once the first-discovered one
    /// wins. Title, URL and context name are read live; a surface that vanishes
    /// mid-check simply does not match.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidCriteria`] if the rule cannot select this registry's kind
    /// - [`CoreError::HandleNotFound`] if nothing matched in time; the elapsed
    ///   time is within one poll interval of `timeout`
    /// - driver errors raised while listing surfaces
    pub async fn resolve(&self, criteria: &MatchCriteria, timeout: Duration) -> Result<Handle> {
        if !criteria.supports(self.shared.kind) {
            return Err(CoreError::InvalidCriteria(format!(
                "{} cannot select a {}",
                criteria, self.shared.kind
            )));
        }

        let start = Instant::now();
        let mut polls: u32 = 0;
        loop {
            polls += 1;
            if let Some(handle) = self.find_match(criteria).await? {
                debug!(
                    criteria = %criteria,
                    id = %handle.id(),
                    index = handle.discovery_index(),
                    polls,
                    "handle resolved"
                );
                return Ok(handle);
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                debug!(criteria = %criteria, polls, elapsed_ms = elapsed.as_millis() as u64, "resolution timed out");
                return Err(CoreError::HandleNotFound {
                    criteria: criteria.to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(self.shared.poll_interval.min(timeout - elapsed)).await;
        }
    }

    async fn find_match(&self, criteria: &MatchCriteria) -> Result<Option<Handle>> {
        let mut state = self.shared.state.lock().await;
        let known = self.refresh_locked(&mut state).await?;

        if let MatchCriteria::ByIndex(index) = criteria {
            return Ok(known.get(*index).filter(|h| h.exists()).cloned());
        }

        for handle in known.iter().filter(|h| h.exists()) {
            if self.matches(handle, criteria).await {
                return Ok(Some(handle.clone()));
            }
        }
        Ok(None)
    }

    async fn matches(&self, handle: &Handle, criteria: &MatchCriteria) -> bool {
        let outcome = match criteria {
            MatchCriteria::ByIndex(index) => Ok(handle.discovery_index() == *index),
            MatchCriteria::ByName(name) => handle.context_name().await.map(|n| &n == name),
            MatchCriteria::ByTitleRegex(pattern) => {
                handle.title().await.map(|t| pattern.is_match(&t))
            }
            MatchCriteria::ByUrlRegexSet(patterns) => handle
                .navigation_history()
                .await
                .map(|history| MatchCriteria::urls_match(patterns, &history)),
        };
        outcome.unwrap_or_else(|e| {
            trace!(id = %handle.id(), error = %e, "live read failed, treating as no match");
            false
        })
    }

    /// Focuses the given handle.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StaleHandle`] if the handle is not active, or if
    /// the driver reports the surface gone (the handle then becomes stale).
    pub async fn switch_to(&self, handle: &Handle) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        if handle.state() != HandleState::Active {
            return Err(CoreError::StaleHandle {
                id: handle.id().to_string(),
            });
        }

        match self.shared.driver.switch_focus(handle.id()).await {
            Ok(()) => {}
            Err(DriverError::SurfaceGone(_)) => {
                handle.set_state(HandleState::Stale);
                if state.active.as_ref().is_some_and(|a| a.ptr_eq(handle)) {
                    state.active = None;
                }
                self.emit(SessionEvent::HandleStale {
                    id: handle.id().clone(),
                    discovery_index: handle.discovery_index(),
                });
                return Err(CoreError::StaleHandle {
                    id: handle.id().to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        state.active = Some(handle.clone());
        trace!(id = %handle.id(), "focus switched");
        self.emit(SessionEvent::HandleFocused {
            id: handle.id().clone(),
            discovery_index: handle.discovery_index(),
        });
        Ok(())
    }

    /// The currently focused handle, or `None` if no switch has happened yet
    /// (or the focused surface has since gone away).
    pub async fn active(&self) -> Option<Handle> {
        self.shared.state.lock().await.active.clone()
    }

    /// Snapshot of every known handle in discovery order, without refreshing.
    pub async fn handles(&self) -> Vec<Handle> {
        self.shared.state.lock().await.known.clone()
    }

    /// Whether `handle` was discovered by this registry.
    pub fn owns(&self, handle: &Handle) -> bool {
        handle.is_owned_by(&self.shared)
    }

    /// Closes the handle's surface and marks it destroyed while holding the
    /// session lock, so a concurrent refresh or switch only ever observes the
    /// handle before the close or after it is destroyed.
    pub(crate) async fn close_and_forget(
        &self,
        handle: &Handle,
    ) -> std::result::Result<CloseOutcome, DriverError> {
        let mut state = self.shared.state.lock().await;
        if handle.state() == HandleState::Destroyed {
            return Ok(CloseOutcome::AlreadyClosed);
        }
        let outcome = self.shared.driver.close_surface(handle.id()).await;
        handle.set_state(HandleState::Destroyed);
        if state.active.as_ref().is_some_and(|a| a.ptr_eq(handle)) {
            state.active = None;
        }
        self.emit(SessionEvent::HandleDestroyed {
            id: handle.id().clone(),
            discovery_index: handle.discovery_index(),
        });
        outcome
    }
}

impl std::fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("kind", &self.shared.kind)
            .field("poll_interval", &self.shared.poll_interval)
            .field("state", &"<Mutex<RegistryState>>")
            .finish()
    }
}
