//! Session state for one automation driver session.
//!
//! This module provides the [`Session`] type, which ties together everything
//! that belongs to one external driver session:
//!
//! - the [`HandleRegistry`] and its session lock
//! - the model tree of UI-description nodes
//! - the read-only [`MetadataTable`] of declared defaults
//! - the default exception handler and the diagnostic sink
//! - a ring buffer of recent [`CallRecord`]s
//! - a broadcast channel of [`SessionEvent`]s for watchers
//!
//! Independent sessions share no state and may run fully concurrently.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use surfkit_core::config::SurfkitConfig;
//! use surfkit_core::driver::{SurfaceDriver, SurfaceKind};
//! use surfkit_core::error::Result;
//! use surfkit_core::part::{Part, UiDescription};
//! use surfkit_core::resolver::PartArgs;
//! use surfkit_core::session::Session;
//!
//! struct HomePage {
//!     part: Part,
//! }
//!
//! impl UiDescription for HomePage {
//!     fn construct(part: Part) -> Result<Self> {
//!         Ok(Self { part })
//!     }
//! }
//!
//! async fn open_home(driver: Arc<dyn SurfaceDriver>) -> Result<HomePage> {
//!     let session = Session::builder(driver, SurfaceKind::Window)
//!         .config(SurfkitConfig::load())
//!         .build();
//!
//!     // Subscribe to events (for a watcher)
//!     let _rx = session.subscribe();
//!
//!     session.get_part::<HomePage>(PartArgs::new()).await
//! }
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::config::SurfkitConfig;
use crate::criteria::MatchCriteria;
use crate::diagnostics::{
    encode_screenshot, CallRecord, DiagnosticArtifact, DiagnosticSink, NullSink,
};
use crate::driver::{SurfaceDriver, SurfaceId, SurfaceKind};
use crate::error::{CoreError, Result};
use crate::frame::FramePath;
use crate::handle::Handle;
use crate::metadata::MetadataTable;
use crate::part::{Part, UiDescription};
use crate::policy::{CaptureAndRethrow, ExceptionHandler};
use crate::registry::HandleRegistry;
use crate::resolver::{self, ConstructionPath, PartArgs};
use crate::tree::{ModelTree, NewNode, NodeId};

/// Maximum number of call records to retain in the ring buffer.
const MAX_CALL_LOG_SIZE: usize = 1000;

/// Events broadcast to watchers when session state changes.
///
/// Sending never fails an operation; events are dropped when nobody listens
/// and lagging receivers miss the oldest ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    /// A surface was observed for the first time.
    HandleAppeared { id: SurfaceId, discovery_index: usize },

    /// A known surface disappeared from the driver's list.
    HandleStale { id: SurfaceId, discovery_index: usize },

    /// A stale surface reappeared and is active again.
    HandleRevived { id: SurfaceId, discovery_index: usize },

    /// Focus moved to a surface.
    HandleFocused { id: SurfaceId, discovery_index: usize },

    /// A surface was closed through its handle.
    HandleDestroyed { id: SurfaceId, discovery_index: usize },

    /// A model node was built.
    NodeCreated {
        node: NodeId,
        type_name: String,
        /// True when the node has no parent.
        root: bool,
    },

    /// A model node was destroyed.
    NodeDestroyed { node: NodeId },

    /// An intercepted call finished.
    CallCompleted(CallRecord),

    /// A diagnostic artifact was captured for a failed call.
    DiagnosticCaptured(Arc<DiagnosticArtifact>),
}

struct SessionInner {
    id: Uuid,
    created_at: DateTime<Utc>,
    config: SurfkitConfig,
    registry: HandleRegistry,
    metadata: MetadataTable,
    tree: parking_lot::Mutex<ModelTree>,
    default_handler: Arc<dyn ExceptionHandler>,
    sink: Arc<dyn DiagnosticSink>,
    call_log: RwLock<VecDeque<CallRecord>>,
}

/// Shared state of one automation session.
///
/// Cheap to clone; clones refer to the same session. Created through
/// [`Session::builder`].
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    driver: Arc<dyn SurfaceDriver>,
    kind: SurfaceKind,
    config: SurfkitConfig,
    metadata: MetadataTable,
    default_handler: Arc<dyn ExceptionHandler>,
    sink: Arc<dyn DiagnosticSink>,
}

impl SessionBuilder {
    /// Replaces the default configuration.
    pub fn config(mut self, config: SurfkitConfig) -> Self {
        self.config = config;
        self
    }

    /// Declared defaults of the description types used in this session.
    pub fn metadata(mut self, metadata: MetadataTable) -> Self {
        self.metadata = metadata;
        self
    }

    /// Handler for nodes whose type and ancestors declare none.
    /// Defaults to [`CaptureAndRethrow`].
    pub fn default_handler(mut self, handler: Arc<dyn ExceptionHandler>) -> Self {
        self.default_handler = handler;
        self
    }

    /// Destination for diagnostic artifacts. Defaults to [`NullSink`].
    pub fn sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn build(self) -> Session {
        let registry = HandleRegistry::new(self.driver, self.kind, self.config.poll_interval());
        let session = Session {
            inner: Arc::new(SessionInner {
                id: Uuid::new_v4(),
                created_at: Utc::now(),
                config: self.config,
                registry,
                metadata: self.metadata,
                tree: parking_lot::Mutex::new(ModelTree::new()),
                default_handler: self.default_handler,
                sink: self.sink,
                call_log: RwLock::new(VecDeque::with_capacity(MAX_CALL_LOG_SIZE)),
            }),
        };
        debug!(session = %session.inner.id, kind = %self.kind, "session created");
        session
    }
}

impl Session {
    /// Starts building a session over `driver` that tracks surfaces of `kind`.
    pub fn builder(driver: Arc<dyn SurfaceDriver>, kind: SurfaceKind) -> SessionBuilder {
        SessionBuilder {
            driver,
            kind,
            config: SurfkitConfig::default(),
            metadata: MetadataTable::new(),
            default_handler: Arc::new(CaptureAndRethrow),
            sink: Arc::new(NullSink),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    pub fn kind(&self) -> SurfaceKind {
        self.inner.registry.kind()
    }

    pub fn config(&self) -> &SurfkitConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.inner.registry
    }

    pub fn driver(&self) -> &Arc<dyn SurfaceDriver> {
        self.inner.registry.driver()
    }

    pub fn metadata(&self) -> &MetadataTable {
        &self.inner.metadata
    }

    /// Subscribes to session events.
    ///
    /// Note that broadcast receivers may miss events if they lag too far behind.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.registry.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // Ignore send errors - no subscribers is expected
        let _ = self.inner.registry.events().send(event);
    }

    /// Returns a copy of the call log, oldest first.
    pub async fn call_log(&self) -> Vec<CallRecord> {
        self.inner.call_log.read().await.iter().cloned().collect()
    }

    pub(crate) async fn record_call(&self, record: CallRecord) {
        {
            let mut log = self.inner.call_log.write().await;
            if log.len() >= MAX_CALL_LOG_SIZE {
                log.pop_front();
            }
            log.push_back(record.clone());
        }
        self.emit(SessionEvent::CallCompleted(record));
    }

    /// Builds a top-level description of type `T`.
    ///
    /// Without a selector (supplied or declared) the description binds to the
    /// focused handle, or to the first-discovered one when nothing has been
    /// focused yet.
    pub async fn get_part<T: UiDescription>(&self, args: PartArgs) -> Result<T> {
        self.construct::<T>(None, args).await
    }

    /// Builds a top-level description of type `T` bound to a known handle.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Construction`] if the handle was discovered by
    /// another session, and [`CoreError::StaleHandle`] if it is not active.
    pub async fn get_from_handle<T: UiDescription>(
        &self,
        handle: &Handle,
        frame_path: FramePath,
    ) -> Result<T> {
        let type_name = short_type_name::<T>();
        let resolved = resolver::synthesize(
            type_name,
            T::required_kind(),
            self.inner.metadata.declared_metadata_of::<T>(),
            &PartArgs::new().frame_path(frame_path),
            self.kind(),
            self.inner.config.handle_wait_timeout(),
        )?;
        if !self.inner.registry.owns(handle) {
            return Err(CoreError::construction(
                type_name,
                format!("handle {} belongs to another session", handle.id()),
            ));
        }
        if !handle.exists() {
            return Err(CoreError::StaleHandle {
                id: handle.id().to_string(),
            });
        }

        let node = NewNode {
            frame_path: resolved.frame_path,
            type_name,
            timeout: resolved.timeout,
            handler: T::exception_handler().unwrap_or_else(|| Arc::clone(&self.inner.default_handler)),
        };
        let id = self.inner.tree.lock().create_root(handle.clone(), node);
        self.finish_construction::<T>(id, type_name, true)
    }

    /// Synthesizes the construction arguments of `T` and builds it, below
    /// `parent` when one is given.
    pub(crate) async fn construct<T: UiDescription>(
        &self,
        parent: Option<NodeId>,
        args: PartArgs,
    ) -> Result<T> {
        let type_name = short_type_name::<T>();
        let resolved = resolver::synthesize(
            type_name,
            T::required_kind(),
            self.inner.metadata.declared_metadata_of::<T>(),
            &args,
            self.kind(),
            self.inner.config.handle_wait_timeout(),
        )?;

        let parent_info = match parent {
            Some(parent) => {
                let tree = self.inner.tree.lock();
                let entry = tree.get(parent)?;
                Some((parent, entry.handle.clone(), Arc::clone(&entry.handler)))
            }
            None => None,
        };

        // The parent's handler only carries over to nodes that end up below it.
        let type_handler = T::exception_handler();
        let node_with = |inherited: Option<&Arc<dyn ExceptionHandler>>| NewNode {
            frame_path: resolved.frame_path.clone(),
            type_name,
            timeout: resolved.timeout,
            handler: type_handler
                .clone()
                .or_else(|| inherited.cloned())
                .unwrap_or_else(|| Arc::clone(&self.inner.default_handler)),
        };

        let path = resolver::plan(&resolved, parent_info.is_some());
        trace!(type_name, ?path, "construction path chosen");
        let (id, root) = match path {
            ConstructionPath::InheritParent => match &parent_info {
                Some((parent, _, parent_handler)) => {
                    let node = node_with(Some(parent_handler));
                    let mut tree = self.inner.tree.lock();
                    (tree.add_child(*parent, node)?, false)
                }
                None => {
                    return Err(CoreError::construction(type_name, "no parent to inherit from"))
                }
            },
            ConstructionPath::Resolve(criteria) => {
                let handle = self.inner.registry.resolve(&criteria, resolved.timeout).await?;
                let mut tree = self.inner.tree.lock();
                match &parent_info {
                    Some((parent, parent_handle, parent_handler))
                        if parent_handle.ptr_eq(&handle) =>
                    {
                        (tree.add_child(*parent, node_with(Some(parent_handler)))?, false)
                    }
                    _ => (tree.create_root(handle, node_with(None)), true),
                }
            }
            ConstructionPath::FocusedOrFirst => {
                let handle = match self.inner.registry.active().await {
                    Some(handle) => handle,
                    None => {
                        self.inner
                            .registry
                            .resolve(&MatchCriteria::ByIndex(0), resolved.timeout)
                            .await?
                    }
                };
                let mut tree = self.inner.tree.lock();
                (tree.create_root(handle, node_with(None)), true)
            }
        };

        self.finish_construction::<T>(id, type_name, root)
    }

    fn finish_construction<T: UiDescription>(
        &self,
        id: NodeId,
        type_name: &'static str,
        root: bool,
    ) -> Result<T> {
        let part = self.part(id)?;
        self.emit(SessionEvent::NodeCreated {
            node: id,
            type_name: type_name.to_string(),
            root,
        });

        match T::construct(part) {
            Ok(description) => {
                debug!(node = %id, type_name, root, "description built");
                Ok(description)
            }
            Err(e) => {
                // The node is discarded; the surface stays open.
                let removed = self.inner.tree.lock().remove_subtree(id);
                if let Ok(removed) = removed {
                    for node in removed.removed {
                        self.emit(SessionEvent::NodeDestroyed { node });
                    }
                }
                debug!(node = %id, type_name, error = %e, "description rejected construction");
                match e {
                    CoreError::Construction { .. } => Err(e),
                    other => Err(CoreError::construction(type_name, other.to_string())),
                }
            }
        }
    }

    fn part(&self, id: NodeId) -> Result<Part> {
        let tree = self.inner.tree.lock();
        let entry = tree.get(id)?;
        Ok(Part::new(
            self.clone(),
            id,
            entry.handle.clone(),
            entry.frame_path.clone(),
            entry.timeout,
            entry.type_name,
            Arc::clone(&entry.handler),
        ))
    }

    pub fn is_alive(&self, id: NodeId) -> bool {
        self.inner.tree.lock().contains(id)
    }

    pub fn parent_of(&self, id: NodeId) -> Result<Option<NodeId>> {
        self.inner.tree.lock().parent(id)
    }

    pub fn children_of(&self, id: NodeId) -> Result<Vec<NodeId>> {
        self.inner.tree.lock().children(id)
    }

    /// Every root node, oldest first.
    pub fn roots(&self) -> Vec<NodeId> {
        self.inner.tree.lock().roots()
    }

    /// Number of live model nodes.
    pub fn node_count(&self) -> usize {
        self.inner.tree.lock().len()
    }

    /// Focuses the root's handle, then applies each frame path from the root
    /// down to `id`. Empty paths leave the driver where it is.
    pub(crate) async fn switch_to_node(&self, id: NodeId) -> Result<()> {
        let chain = self.inner.tree.lock().focus_chain(id)?;
        chain.handle.switch_to_me().await?;
        for path in &chain.frame_paths {
            path.apply(self.driver().as_ref()).await?;
        }
        trace!(node = %id, handle = %chain.handle.id(), "node focused");
        Ok(())
    }

    /// Destroys `id` and its descendants, children first. When `id` is a root
    /// whose handle still exists, the surface is closed as well.
    pub(crate) async fn destroy_node(&self, id: NodeId) -> Result<()> {
        let removed = self.inner.tree.lock().remove_subtree(id)?;
        for node in &removed.removed {
            self.emit(SessionEvent::NodeDestroyed { node: *node });
        }
        debug!(node = %id, removed = removed.removed.len(), "subtree destroyed");

        if let Some(handle) = removed.root_handle {
            if handle.exists() {
                handle.destroy().await?;
            }
        }
        Ok(())
    }

    /// Destroys every root node, closing their surfaces.
    ///
    /// Keeps going after a failure and returns the first error.
    pub async fn destroy_all(&self) -> Result<()> {
        let mut first_error = None;
        for root in self.roots() {
            if let Err(e) = self.destroy_node(root).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn screenshot(&self) -> Option<Arc<String>> {
        match self.driver().screenshot().await {
            Ok(png) => Some(encode_screenshot(&png)),
            Err(e) => {
                debug!(error = %e, "screenshot unavailable");
                None
            }
        }
    }

    pub(crate) async fn success_screenshot(&self) -> Option<Arc<String>> {
        if !self.inner.config.screenshot_on_success {
            return None;
        }
        self.screenshot().await
    }

    pub(crate) async fn capture_diagnostic(
        &self,
        node: NodeId,
        type_name: &str,
        method: &str,
        error: &CoreError,
    ) -> Arc<DiagnosticArtifact> {
        let screenshot = if self.inner.config.screenshot_on_failure {
            self.screenshot().await
        } else {
            None
        };
        let artifact = Arc::new(DiagnosticArtifact::new(
            node.as_u64(),
            type_name,
            method,
            error.to_string(),
            screenshot,
        ));
        self.inner.sink.record(Arc::clone(&artifact)).await;
        self.emit(SessionEvent::DiagnosticCaptured(Arc::clone(&artifact)));
        artifact
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("created_at", &self.inner.created_at)
            .field("kind", &self.kind())
            .field("registry", &self.inner.registry)
            .field("tree", &"<Mutex<ModelTree>>")
            .finish()
    }
}

/// Last path segment of a type name, for logs and errors.
fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
