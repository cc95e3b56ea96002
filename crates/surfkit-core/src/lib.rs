//! # surfkit-core
//!
//! Core library for surface-aware UI automation.
//!
//! This crate resolves and tracks the addressable surfaces of a live
//! automation session (browser windows, mobile app contexts), matches them
//! against fluent criteria, manages a tree of UI descriptions bound to those
//! surfaces, and wraps every interaction method with focus switching, frame
//! navigation, timeout overrides and failure handling.
//!
//! ## Modules
//!
//! - [`driver`] - The [`SurfaceDriver`](driver::SurfaceDriver) trait consumed from the driving layer
//! - [`handle`] - Shared identity and lifecycle of one surface
//! - [`registry`] - Live handle set with polling resolution
//! - [`criteria`] - Fluent selection rules
//! - [`frame`] - Frame paths inside a surface
//! - [`metadata`] - Type-level declared defaults
//! - [`resolver`] - Synthesis of construction arguments
//! - [`tree`] - Ownership tree of model nodes
//! - [`part`] - Typed descriptions and the intercepted-call wrapper
//! - [`policy`] - Exception handlers and method declarations
//! - [`diagnostics`] - Call records and failure artifacts
//! - [`session`] - Session state with event broadcasting
//! - [`config`] - Persistent configuration
//! - [`error`] - Error types
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use surfkit_core::criteria::MatchCriteria;
//! use surfkit_core::driver::{SurfaceDriver, SurfaceKind};
//! use surfkit_core::error::Result;
//! use surfkit_core::metadata::{DeclaredMetadata, MetadataTable};
//! use surfkit_core::part::{Part, UiDescription};
//! use surfkit_core::policy::MethodSpec;
//! use surfkit_core::resolver::PartArgs;
//! use surfkit_core::session::Session;
//!
//! struct LoginPage {
//!     part: Part,
//! }
//!
//! impl UiDescription for LoginPage {
//!     fn construct(part: Part) -> Result<Self> {
//!         Ok(Self { part })
//!     }
//! }
//!
//! const SIGN_IN: MethodSpec = MethodSpec::interactive("sign_in");
//!
//! impl LoginPage {
//!     async fn sign_in(&self) -> Result<()> {
//!         self.part.invoke(&SIGN_IN, |_ctx| async { Ok(()) }).await
//!     }
//! }
//!
//! async fn run(driver: Arc<dyn SurfaceDriver>) -> Result<()> {
//!     let metadata = MetadataTable::new().register::<LoginPage>(
//!         DeclaredMetadata::new()
//!             .selector(MatchCriteria::by_title("^Login")?)
//!             .timeout(Duration::from_secs(10)),
//!     );
//!     let session = Session::builder(driver, SurfaceKind::Window)
//!         .metadata(metadata)
//!         .build();
//!
//!     let login = session.get_part::<LoginPage>(PartArgs::new()).await?;
//!     login.sign_in().await?;
//!     session.destroy_all().await
//! }
//! ```

pub mod config;
pub mod criteria;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod frame;
pub mod handle;
pub mod metadata;
pub mod part;
pub mod policy;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod tree;
