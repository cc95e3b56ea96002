//! Type-level declarative defaults for UI descriptions.
//!
//! A description type may declare which surface it lives on, which frame it
//! sits in and how long to wait for its surface. These declarations are
//! registered once, before the session starts, in a [`MetadataTable`]; the
//! core reads them through [`MetadataTable::declared_metadata_of`] and never
//! inspects types at call time.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use surfkit_core::criteria::MatchCriteria;
//! use surfkit_core::frame::FramePath;
//! use surfkit_core::metadata::{DeclaredMetadata, MetadataTable};
//!
//! struct CheckoutPage;
//!
//! let table = MetadataTable::new().register::<CheckoutPage>(
//!     DeclaredMetadata::new()
//!         .selector(MatchCriteria::by_urls(["/checkout"]).unwrap())
//!         .frame_path(FramePath::new().frame("payment"))
//!         .timeout(Duration::from_secs(10)),
//! );
//! assert!(table.declared_metadata_of::<CheckoutPage>().is_some());
//! ```

use std::any::TypeId;
use std::collections::HashMap;
use std::time::Duration;

use crate::criteria::MatchCriteria;
use crate::frame::FramePath;

/// Declared defaults of one description type. Every slot is optional.
#[derive(Debug, Clone, Default)]
pub struct DeclaredMetadata {
    selector: Option<MatchCriteria>,
    frame_path: Option<FramePath>,
    timeout: Option<Duration>,
}

impl DeclaredMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default surface selector.
    pub fn selector(mut self, criteria: MatchCriteria) -> Self {
        self.selector = Some(criteria);
        self
    }

    /// Default frame path.
    pub fn frame_path(mut self, path: FramePath) -> Self {
        self.frame_path = Some(path);
        self
    }

    /// Default timeout for resolving the surface.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn declared_selector(&self) -> Option<&MatchCriteria> {
        self.selector.as_ref()
    }

    pub fn declared_frame_path(&self) -> Option<&FramePath> {
        self.frame_path.as_ref()
    }

    pub fn declared_timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Read-only lookup from description type to its declared metadata.
///
/// Populated with [`register`](Self::register) while the session is being
/// set up; the session only ever reads it afterwards.
#[derive(Debug, Clone, Default)]
pub struct MetadataTable {
    entries: HashMap<TypeId, DeclaredMetadata>,
}

impl MetadataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the declarations of `T`, replacing any earlier entry.
    pub fn register<T: 'static>(mut self, metadata: DeclaredMetadata) -> Self {
        self.entries.insert(TypeId::of::<T>(), metadata);
        self
    }

    /// Declared metadata of `T`, if any was registered.
    pub fn declared_metadata_of<T: 'static>(&self) -> Option<&DeclaredMetadata> {
        self.entries.get(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
