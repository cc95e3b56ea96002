//! Shared test helpers for surfkit-core integration tests.
//!
//! This module provides a scripted in-memory driver that records every call,
//! plus small helpers to build sessions and description types over it.

#![allow(dead_code)]

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use surfkit_core::config::SurfkitConfig;
use surfkit_core::driver::{CloseOutcome, DriverError, SurfaceDriver, SurfaceId, SurfaceKind};
use surfkit_core::frame::FrameTarget;
use surfkit_core::session::{Session, SessionBuilder};

/// Poll interval used by every test session.
pub const POLL: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Install a stderr subscriber once per test binary. `RUST_LOG` overrides the
/// default `warn` filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

// ---------------------------------------------------------------------------
// Mock driver
// ---------------------------------------------------------------------------

/// One call received by the [`MockDriver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    List(SurfaceKind),
    Switch(String),
    EnterTop,
    EnterFrame(FrameTarget),
    Close(String),
    SetImplicitWait(Duration),
    Screenshot,
}

#[derive(Debug, Clone)]
struct MockSurface {
    id: String,
    kind: SurfaceKind,
    title: String,
    history: Vec<String>,
    /// Number of list calls that must happen before the surface shows up.
    hidden_for_polls: usize,
    open: bool,
}

#[derive(Debug)]
struct MockState {
    surfaces: Vec<MockSurface>,
    list_calls: usize,
    calls: Vec<DriverCall>,
    implicit_wait: Duration,
    screenshot: Option<Vec<u8>>,
    /// How long a close request takes to return after the surface is gone.
    close_delay: Option<Duration>,
}

impl MockState {
    fn visible(&self, surface: &MockSurface) -> bool {
        surface.open && self.list_calls > surface.hidden_for_polls
    }

    fn find(&self, id: &SurfaceId) -> Result<&MockSurface, DriverError> {
        self.surfaces
            .iter()
            .find(|s| s.id == id.as_str() && self.visible(s))
            .ok_or_else(|| DriverError::SurfaceGone(id.to_string()))
    }
}

/// Scripted in-memory driver. Surfaces can be added, removed and retitled
/// while a test runs; every call is recorded in order.
pub struct MockDriver {
    state: Mutex<MockState>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                surfaces: Vec::new(),
                list_calls: 0,
                calls: Vec::new(),
                implicit_wait: Duration::from_secs(5),
                screenshot: None,
                close_delay: None,
            }),
        }
    }

    /// Adds a browser window visible from the first poll on.
    pub fn with_window(self, id: &str, title: &str, url: &str) -> Self {
        self.add_surface(id, SurfaceKind::Window, title, vec![url.to_string()], 0);
        self
    }

    /// Adds a browser window with a full navigation history.
    pub fn with_window_history(self, id: &str, title: &str, history: &[&str]) -> Self {
        let history = history.iter().map(|u| u.to_string()).collect();
        self.add_surface(id, SurfaceKind::Window, title, history, 0);
        self
    }

    /// Adds a mobile context visible from the first poll on.
    pub fn with_context(self, name: &str) -> Self {
        self.add_surface(name, SurfaceKind::Context, "", Vec::new(), 0);
        self
    }

    /// Adds a mobile context that only shows up after `polls` list calls.
    pub fn with_context_after(self, name: &str, polls: usize) -> Self {
        self.add_surface(name, SurfaceKind::Context, "", Vec::new(), polls);
        self
    }

    pub fn with_screenshot(self, png: &[u8]) -> Self {
        self.state.lock().screenshot = Some(png.to_vec());
        self
    }

    /// Close requests remove the surface at once but only return after `delay`.
    pub fn with_close_delay(self, delay: Duration) -> Self {
        self.state.lock().close_delay = Some(delay);
        self
    }

    pub fn add_surface(
        &self,
        id: &str,
        kind: SurfaceKind,
        title: &str,
        history: Vec<String>,
        hidden_for_polls: usize,
    ) {
        let mut state = self.state.lock();
        let hidden_for_polls = state.list_calls + hidden_for_polls;
        state.surfaces.push(MockSurface {
            id: id.to_string(),
            kind,
            title: title.to_string(),
            history,
            hidden_for_polls,
            open: true,
        });
    }

    /// Simulates the surface being closed by something other than the core.
    pub fn vanish(&self, id: &str) {
        for surface in self.state.lock().surfaces.iter_mut().filter(|s| s.id == id) {
            surface.open = false;
        }
    }

    /// Brings a vanished surface back under the same id.
    pub fn reappear(&self, id: &str) {
        for surface in self.state.lock().surfaces.iter_mut().filter(|s| s.id == id) {
            surface.open = true;
        }
    }

    pub fn set_title(&self, id: &str, title: &str) {
        for surface in self.state.lock().surfaces.iter_mut().filter(|s| s.id == id) {
            surface.title = title.to_string();
        }
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.state.lock().calls.clone()
    }

    /// Recorded calls other than surface listing.
    pub fn focus_calls(&self) -> Vec<DriverCall> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, DriverCall::List(_)))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().list_calls
    }

    pub fn current_implicit_wait(&self) -> Duration {
        self.state.lock().implicit_wait
    }

    fn record(&self, call: DriverCall) {
        self.state.lock().calls.push(call);
    }
}

#[async_trait]
impl SurfaceDriver for MockDriver {
    async fn list_surfaces(&self, kind: SurfaceKind) -> Result<Vec<SurfaceId>, DriverError> {
        let mut state = self.state.lock();
        state.list_calls += 1;
        state.calls.push(DriverCall::List(kind));
        Ok(state
            .surfaces
            .iter()
            .filter(|s| s.kind == kind && state.visible(s))
            .map(|s| SurfaceId::from(s.id.as_str()))
            .collect())
    }

    async fn title(&self, id: &SurfaceId) -> Result<String, DriverError> {
        Ok(self.state.lock().find(id)?.title.clone())
    }

    async fn current_url(&self, id: &SurfaceId) -> Result<String, DriverError> {
        let state = self.state.lock();
        let url = state.find(id)?.history.last().cloned().unwrap_or_default();
        Ok(url)
    }

    async fn navigation_history(&self, id: &SurfaceId) -> Result<Vec<String>, DriverError> {
        Ok(self.state.lock().find(id)?.history.clone())
    }

    async fn switch_focus(&self, id: &SurfaceId) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.calls.push(DriverCall::Switch(id.to_string()));
        state.find(id)?;
        Ok(())
    }

    async fn close_surface(&self, id: &SurfaceId) -> Result<CloseOutcome, DriverError> {
        let (outcome, delay) = {
            let mut state = self.state.lock();
            state.calls.push(DriverCall::Close(id.to_string()));
            let outcome = match state.surfaces.iter_mut().find(|s| s.id == id.as_str() && s.open) {
                Some(surface) => {
                    surface.open = false;
                    CloseOutcome::Closed
                }
                None => CloseOutcome::AlreadyClosed,
            };
            (outcome, state.close_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(outcome)
    }

    async fn enter_top_document(&self) -> Result<(), DriverError> {
        self.record(DriverCall::EnterTop);
        Ok(())
    }

    async fn enter_frame(&self, frame: &FrameTarget) -> Result<(), DriverError> {
        self.record(DriverCall::EnterFrame(frame.clone()));
        Ok(())
    }

    async fn implicit_wait(&self) -> Result<Duration, DriverError> {
        Ok(self.state.lock().implicit_wait)
    }

    async fn set_implicit_wait(&self, timeout: Duration) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.calls.push(DriverCall::SetImplicitWait(timeout));
        state.implicit_wait = timeout;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        let mut state = self.state.lock();
        state.calls.push(DriverCall::Screenshot);
        state
            .screenshot
            .clone()
            .ok_or_else(|| DriverError::Unsupported("screenshot".to_string()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Configuration used by test sessions: fast polling, short default timeout.
pub fn test_config() -> SurfkitConfig {
    SurfkitConfig {
        handle_wait_timeout_ms: 1_000,
        poll_interval_ms: POLL.as_millis() as u64,
        ..SurfkitConfig::default()
    }
}

pub fn builder(driver: &Arc<MockDriver>, kind: SurfaceKind) -> SessionBuilder {
    let driver: Arc<dyn SurfaceDriver> = driver.clone();
    Session::builder(driver, kind).config(test_config())
}

pub fn window_session(driver: &Arc<MockDriver>) -> Session {
    builder(driver, SurfaceKind::Window).build()
}

pub fn context_session(driver: &Arc<MockDriver>) -> Session {
    builder(driver, SurfaceKind::Context).build()
}

/// Declares a plain description type that keeps its `Part` in a public field.
macro_rules! description {
    ($name:ident) => {
        pub struct $name {
            pub part: surfkit_core::part::Part,
        }

        impl surfkit_core::part::UiDescription for $name {
            fn construct(part: surfkit_core::part::Part) -> surfkit_core::error::Result<Self> {
                Ok(Self { part })
            }
        }
    };
}

pub(crate) use description;
