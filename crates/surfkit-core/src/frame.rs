//! Frame paths inside a surface.
//!
//! A [`FramePath`] lists the nested frames a description lives in, outermost
//! first. Applying a path always starts from the top document of the focused
//! surface and enters every element in declared order.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::driver::{DriverError, SurfaceDriver};

/// One step of a frame path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum FrameTarget {
    /// The n-th frame of the current document.
    Index(u32),
    /// A frame found by name, id or selector.
    Locator(String),
}

impl fmt::Display for FrameTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameTarget::Index(index) => write!(f, "#{}", index),
            FrameTarget::Locator(locator) => write!(f, "'{}'", locator),
        }
    }
}

impl From<u32> for FrameTarget {
    fn from(index: u32) -> Self {
        FrameTarget::Index(index)
    }
}

impl From<&str> for FrameTarget {
    fn from(locator: &str) -> Self {
        FrameTarget::Locator(locator.to_string())
    }
}

impl From<String> for FrameTarget {
    fn from(locator: String) -> Self {
        FrameTarget::Locator(locator)
    }
}

/// Ordered sequence of frames, applied depth-first from the top document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FramePath(Vec<FrameTarget>);

impl FramePath {
    /// Creates an empty path (the top document itself).
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends the next, more deeply nested frame.
    ///
    /// # Example
    ///
    /// ```
    /// use surfkit_core::frame::FramePath;
    ///
    /// let path = FramePath::new().frame(0).frame("editor");
    /// assert_eq!(path.len(), 2);
    /// ```
    pub fn frame(mut self, target: impl Into<FrameTarget>) -> Self {
        self.0.push(target.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameTarget> {
        self.0.iter()
    }

    /// Enters this path on the currently focused surface.
    ///
    /// A non-empty path first returns to the top document and then enters
    /// every frame in order, even if a sibling call left the driver inside a
    /// deeper frame already. An empty path is a no-op: the driver stays in
    /// whatever frame the ancestor chain selected.
    pub async fn apply(&self, driver: &dyn SurfaceDriver) -> Result<(), DriverError> {
        if self.0.is_empty() {
            return Ok(());
        }
        driver.enter_top_document().await?;
        for target in &self.0 {
            driver.enter_frame(target).await?;
        }
        Ok(())
    }
}

impl FromIterator<FrameTarget> for FramePath {
    fn from_iter<I: IntoIterator<Item = FrameTarget>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for FramePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("top document");
        }
        let steps: Vec<String> = self.0.iter().map(|t| t.to_string()).collect();
        f.write_str(&steps.join(" > "))
    }
}
