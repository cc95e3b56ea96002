//! Typed UI descriptions and the intercepted-call wrapper.
//!
//! A UI description (page object, screen object, widget) is any type that
//! implements [`UiDescription`]. The session builds it from a [`Part`], the
//! typed view of the model node the description is bound to. Descriptions
//! keep the `Part` and route every interaction through [`Part::invoke`],
//! which focuses the node, applies call-scoped timeouts and hands failures to
//! the node's exception handler.
//!
//! # Example
//!
//! ```no_run
//! use surfkit_core::error::Result;
//! use surfkit_core::part::{Part, UiDescription};
//! use surfkit_core::policy::MethodSpec;
//! use surfkit_core::resolver::PartArgs;
//!
//! struct SearchBox {
//!     part: Part,
//! }
//!
//! impl UiDescription for SearchBox {
//!     fn construct(part: Part) -> Result<Self> {
//!         Ok(Self { part })
//!     }
//! }
//!
//! const SUBMIT: MethodSpec = MethodSpec::interactive("submit");
//!
//! impl SearchBox {
//!     async fn submit(&self) -> Result<()> {
//!         self.part
//!             .invoke(&SUBMIT, |ctx| async move {
//!                 // backend-specific work through ctx.driver() / ctx.driver_as::<D>()
//!                 let _ = ctx.handle();
//!                 Ok(())
//!             })
//!             .await
//!     }
//! }
//!
//! struct HomePage {
//!     part: Part,
//! }
//!
//! impl HomePage {
//!     async fn search_box(&self) -> Result<SearchBox> {
//!         self.part.get_part::<SearchBox>(PartArgs::new()).await
//!     }
//! }
//! ```

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info_span, warn, Instrument};

use crate::diagnostics::{CallOutcome, CallRecord};
use crate::driver::{SurfaceDriver, SurfaceKind};
use crate::error::{CoreError, Result};
use crate::frame::FramePath;
use crate::handle::Handle;
use crate::policy::{ExceptionHandler, Failure, MethodSpec, Recovery};
use crate::resolver::PartArgs;
use crate::session::Session;
use crate::tree::NodeId;

/// A type that describes part of a user interface.
pub trait UiDescription: Sized + Send + 'static {
    /// The single canonical constructor, called once the node exists.
    ///
    /// An error here discards the node and surfaces as
    /// [`CoreError::Construction`].
    fn construct(part: Part) -> Result<Self>;

    /// Surface kind this description can only live on, if any.
    fn required_kind() -> Option<SurfaceKind> {
        None
    }

    /// Handler bound to every node of this type. Descendants without their
    /// own handler inherit it.
    fn exception_handler() -> Option<Arc<dyn ExceptionHandler>> {
        None
    }
}

/// Typed view of one model node.
///
/// Cheap to clone. All clones refer to the same node; once the node is
/// destroyed every operation fails with [`CoreError::NodeDestroyed`].
#[derive(Clone)]
pub struct Part {
    session: Session,
    id: NodeId,
    handle: Handle,
    frame_path: FramePath,
    timeout: Duration,
    type_name: &'static str,
    handler: Arc<dyn ExceptionHandler>,
}

impl Part {
    pub(crate) fn new(
        session: Session,
        id: NodeId,
        handle: Handle,
        frame_path: FramePath,
        timeout: Duration,
        type_name: &'static str,
        handler: Arc<dyn ExceptionHandler>,
    ) -> Self {
        Self {
            session,
            id,
            handle,
            frame_path,
            timeout,
            type_name,
            handler,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The handle this node is bound to, shared with its parent.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// This node's own frame path (not including ancestors).
    pub fn frame_path(&self) -> &FramePath {
        &self.frame_path
    }

    /// Timeout resolved for this node at construction.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_alive(&self) -> bool {
        self.session.is_alive(self.id)
    }

    pub fn parent(&self) -> Result<Option<NodeId>> {
        self.session.parent_of(self.id)
    }

    pub fn children(&self) -> Result<Vec<NodeId>> {
        self.session.children_of(self.id)
    }

    /// Builds a description of type `T` below this node.
    ///
    /// Without a selector the child shares this node's handle. With one, the
    /// handle is resolved first; if it is a different surface the new
    /// description becomes a root of its own.
    pub async fn get_part<T: UiDescription>(&self, args: PartArgs) -> Result<T> {
        self.session.construct::<T>(Some(self.id), args).await
    }

    /// Focuses the ancestor chain, then enters this node's frames.
    pub async fn switch_to_me(&self) -> Result<()> {
        self.session.switch_to_node(self.id).await
    }

    /// Destroys this node and everything below it.
    pub async fn destroy(&self) -> Result<()> {
        self.session.destroy_node(self.id).await
    }

    /// Runs an interaction body under the node's call policy.
    ///
    /// Interactive methods focus the node first. A timeout override on the
    /// method replaces the driver's implicit wait for the duration of the
    /// body and is always restored afterwards. On success the body's value is
    /// returned unchanged. On failure the node's [`ExceptionHandler`] decides:
    /// rethrow, suppress (returning `R::default()`) or retry, with retries
    /// bounded by the session's `max_retries`.
    pub async fn invoke<R, F, Fut>(&self, method: &MethodSpec, mut body: F) -> Result<R>
    where
        R: Default + Send,
        F: FnMut(CallContext) -> Fut + Send,
        Fut: Future<Output = Result<R>> + Send,
    {
        let span = info_span!(
            "invoke",
            node = %self.id,
            type_name = self.type_name,
            method = method.name()
        );

        async move {
            let start = Instant::now();
            let max_retries = self.session.config().max_retries;
            let mut attempt: u32 = 0;

            loop {
                attempt += 1;
                let error = match self.run_once(method, &mut body, attempt).await {
                    Ok(value) => {
                        let elapsed_ms = start.elapsed().as_millis() as u64;
                        debug!(elapsed_ms, attempts = attempt, "call complete");
                        let screenshot = self.session.success_screenshot().await;
                        self.record(method, CallOutcome::Success, attempt, elapsed_ms, screenshot)
                            .await;
                        return Ok(value);
                    }
                    Err(error) => error,
                };

                let recovery = {
                    let failure = Failure {
                        session: &self.session,
                        error: &error,
                        attempt,
                        can_retry: attempt <= max_retries,
                        method,
                        node: self.id,
                        type_name: self.type_name,
                    };
                    self.handler.handle(&failure).await
                };

                let elapsed_ms = start.elapsed().as_millis() as u64;
                match recovery {
                    Recovery::Retry if attempt <= max_retries => {
                        debug!(attempt, error = %error, "retrying call");
                    }
                    Recovery::Suppress => {
                        debug!(elapsed_ms, error = %error, "call failed, suppressed");
                        self.record(
                            method,
                            CallOutcome::Suppressed(error.to_string()),
                            attempt,
                            elapsed_ms,
                            None,
                        )
                        .await;
                        return Ok(R::default());
                    }
                    Recovery::Retry | Recovery::Rethrow => {
                        debug!(elapsed_ms, attempts = attempt, error = %error, "call failed");
                        self.record(
                            method,
                            CallOutcome::Failure(error.to_string()),
                            attempt,
                            elapsed_ms,
                            None,
                        )
                        .await;
                        return Err(error);
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_once<R, F, Fut>(&self, method: &MethodSpec, body: &mut F, attempt: u32) -> Result<R>
    where
        R: Send,
        F: FnMut(CallContext) -> Fut + Send,
        Fut: Future<Output = Result<R>> + Send,
    {
        if !self.is_alive() {
            return Err(CoreError::NodeDestroyed(self.id.as_u64()));
        }
        if method.is_interactive() {
            self.switch_to_me().await?;
        }

        let ctx = CallContext {
            driver: Arc::clone(self.session.driver()),
            handle: self.handle.clone(),
            timeout: self.timeout,
            attempt,
        };

        let Some(timeout) = method.timeout_override() else {
            return body(ctx).await;
        };

        let driver = self.session.driver();
        let previous = driver.implicit_wait().await?;
        driver.set_implicit_wait(timeout).await?;
        let result = body(ctx).await;
        if let Err(e) = driver.set_implicit_wait(previous).await {
            warn!(error = %e, restore_ms = previous.as_millis() as u64, "failed to restore implicit wait");
        }
        result
    }

    async fn record(
        &self,
        method: &MethodSpec,
        outcome: CallOutcome,
        attempts: u32,
        elapsed_ms: u64,
        screenshot: Option<Arc<String>>,
    ) {
        let record = CallRecord::new(
            self.id.as_u64(),
            self.type_name,
            method.name(),
            outcome,
            attempts,
            Some(elapsed_ms),
        )
        .with_screenshot(screenshot);
        self.session.record_call(record).await;
    }
}

impl std::fmt::Debug for Part {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Part")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("handle", &self.handle)
            .field("frame_path", &self.frame_path)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// What an interaction body gets to work with.
pub struct CallContext {
    driver: Arc<dyn SurfaceDriver>,
    handle: Handle,
    timeout: Duration,
    attempt: u32,
}

impl CallContext {
    pub fn driver(&self) -> &Arc<dyn SurfaceDriver> {
        &self.driver
    }

    /// Downcasts the driver to its concrete backend type.
    pub fn driver_as<D: 'static>(&self) -> Option<&D> {
        let any: &dyn Any = self.driver.as_any();
        any.downcast_ref::<D>()
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Timeout resolved for the node.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Which run of the body this is, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
