//! Synthesis of construction arguments for UI descriptions.
//!
//! When a caller asks for a description of type `T`, three slots have to be
//! filled: the surface selector, the frame path and the timeout. Each slot is
//! filled independently, in this order of precedence:
//!
//! 1. the value the caller supplied in [`PartArgs`]
//! 2. the value `T` declared in its [`DeclaredMetadata`]
//! 3. the fallback (no selector, the top document, the session default timeout)
//!
//! Declared metadata is a default and never overrides an explicit value, even
//! when both are present. The synthesized [`ResolvedArgs`] then map onto
//! exactly one [`ConstructionPath`].

use std::time::Duration;

use crate::criteria::MatchCriteria;
use crate::driver::SurfaceKind;
use crate::error::{CoreError, Result};
use crate::frame::FramePath;
use crate::metadata::DeclaredMetadata;

/// Arguments a caller passes when requesting a description.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use surfkit_core::frame::FramePath;
/// use surfkit_core::resolver::PartArgs;
///
/// let args = PartArgs::new()
///     .index(1)
///     .frame_path(FramePath::new().frame(0))
///     .timeout(Duration::from_secs(3));
/// assert!(args.supplied_selector().is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct PartArgs {
    selector: Option<MatchCriteria>,
    frame_path: Option<FramePath>,
    timeout: Option<Duration>,
}

impl PartArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selector(mut self, criteria: MatchCriteria) -> Self {
        self.selector = Some(criteria);
        self
    }

    /// Shorthand for `selector(MatchCriteria::ByIndex(index))`.
    pub fn index(self, index: usize) -> Self {
        self.selector(MatchCriteria::ByIndex(index))
    }

    pub fn frame_path(mut self, path: FramePath) -> Self {
        self.frame_path = Some(path);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn supplied_selector(&self) -> Option<&MatchCriteria> {
        self.selector.as_ref()
    }

    pub fn supplied_frame_path(&self) -> Option<&FramePath> {
        self.frame_path.as_ref()
    }

    pub fn supplied_timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Where the value of a slot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotSource {
    Caller,
    Declared,
    Fallback,
}

/// Canonical construction arguments with every slot resolved.
#[derive(Debug, Clone)]
pub struct ResolvedArgs {
    pub selector: Option<MatchCriteria>,
    pub frame_path: FramePath,
    pub timeout: Duration,
    pub selector_source: SlotSource,
    pub frame_path_source: SlotSource,
    pub timeout_source: SlotSource,
}

/// The single way a description is built from its resolved arguments.
#[derive(Debug, Clone)]
pub enum ConstructionPath {
    /// Become a child of the requesting node, sharing its handle.
    InheritParent,
    /// Resolve a handle with the given criteria first.
    Resolve(MatchCriteria),
    /// No parent and no selector: bind to the focused handle, or the first one.
    FocusedOrFirst,
}

/// Fills the selector, frame path and timeout slots for a description type.
///
/// # Arguments
///
/// * `type_name` - Name of the requested type, used in errors
/// * `required_kind` - Surface kind the type insists on, if any
/// * `declared` - The type's registered metadata, if any
/// * `supplied` - What the caller passed explicitly
/// * `target_kind` - Kind of surface the session's registry tracks
/// * `default_timeout` - Session default for the timeout slot
///
/// # Errors
///
/// - [`CoreError::AmbiguousMetadata`] if the declared selector (used because
///   the caller supplied none) cannot select a surface of `target_kind`
/// - [`CoreError::Construction`] if the type requires another surface kind,
///   or the caller-supplied selector cannot select `target_kind`
pub fn synthesize(
    type_name: &str,
    required_kind: Option<SurfaceKind>,
    declared: Option<&DeclaredMetadata>,
    supplied: &PartArgs,
    target_kind: SurfaceKind,
    default_timeout: Duration,
) -> Result<ResolvedArgs> {
    if let Some(required) = required_kind {
        if required != target_kind {
            return Err(CoreError::construction(
                type_name,
                format!("it lives on a {} but the session tracks {}s", required, target_kind),
            ));
        }
    }

    let (selector, selector_source) = match (
        supplied.supplied_selector(),
        declared.and_then(|d| d.declared_selector()),
    ) {
        (Some(criteria), _) => {
            if !criteria.supports(target_kind) {
                return Err(CoreError::construction(
                    type_name,
                    format!("supplied selector ({}) cannot select a {}", criteria, target_kind),
                ));
            }
            (Some(criteria.clone()), SlotSource::Caller)
        }
        (None, Some(criteria)) => {
            if !criteria.supports(target_kind) {
                return Err(CoreError::AmbiguousMetadata {
                    type_name: type_name.to_string(),
                    selector: criteria.to_string(),
                    kind: target_kind,
                });
            }
            (Some(criteria.clone()), SlotSource::Declared)
        }
        (None, None) => (None, SlotSource::Fallback),
    };

    let (frame_path, frame_path_source) = match (
        supplied.supplied_frame_path(),
        declared.and_then(|d| d.declared_frame_path()),
    ) {
        (Some(path), _) => (path.clone(), SlotSource::Caller),
        (None, Some(path)) => (path.clone(), SlotSource::Declared),
        (None, None) => (FramePath::new(), SlotSource::Fallback),
    };

    let (timeout, timeout_source) = match (
        supplied.supplied_timeout(),
        declared.and_then(|d| d.declared_timeout()),
    ) {
        (Some(timeout), _) => (timeout, SlotSource::Caller),
        (None, Some(timeout)) => (timeout, SlotSource::Declared),
        (None, None) => (default_timeout, SlotSource::Fallback),
    };

    Ok(ResolvedArgs {
        selector,
        frame_path,
        timeout,
        selector_source,
        frame_path_source,
        timeout_source,
    })
}

/// Chooses the construction path for resolved arguments.
pub fn plan(resolved: &ResolvedArgs, has_parent: bool) -> ConstructionPath {
    match (&resolved.selector, has_parent) {
        (Some(criteria), _) => ConstructionPath::Resolve(criteria.clone()),
        (None, true) => ConstructionPath::InheritParent,
        (None, false) => ConstructionPath::FocusedOrFirst,
    }
}
