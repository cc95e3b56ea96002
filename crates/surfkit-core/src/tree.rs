//! Ownership tree of model nodes.
//!
//! Nodes live in an arena keyed by [`NodeId`]. A parent owns the ordered list
//! of its children; a child only remembers its parent's id. Cascading destroy
//! walks the owned lists and never needs a back-pointer.
//!
//! The tree itself is synchronous bookkeeping. Driver work triggered by tree
//! operations (focus switches, frame entry, closing a root's surface) is done
//! by [`Session`](crate::session::Session) after the tree lock is released.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::frame::FramePath;
use crate::handle::Handle;
use crate::policy::ExceptionHandler;

/// Identifier of a model node, unique within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Everything the tree stores about one node.
pub(crate) struct NodeEntry {
    pub handle: Handle,
    pub frame_path: FramePath,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub type_name: &'static str,
    pub timeout: Duration,
    pub handler: Arc<dyn ExceptionHandler>,
}

/// Fields needed to insert a node.
pub(crate) struct NewNode {
    pub frame_path: FramePath,
    pub type_name: &'static str,
    pub timeout: Duration,
    pub handler: Arc<dyn ExceptionHandler>,
}

/// Focus route of a node: the handle to switch to, then each frame path from
/// the root down to the node.
pub(crate) struct FocusChain {
    pub handle: Handle,
    pub frame_paths: Vec<FramePath>,
}

/// Result of removing a subtree.
pub(crate) struct RemovedSubtree {
    /// Removed nodes, children before their parent.
    pub removed: Vec<NodeId>,
    /// The node's handle, when the node was a root.
    pub root_handle: Option<Handle>,
}

/// Arena holding every live node of a session.
///
/// Destroyed nodes are removed from the arena; an id that is no longer
/// present is reported as [`CoreError::NodeDestroyed`].
#[derive(Default)]
pub(crate) struct ModelTree {
    next_id: u64,
    nodes: HashMap<NodeId, NodeEntry>,
}

impl ModelTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> NodeId {
        self.next_id += 1;
        NodeId(self.next_id)
    }

    fn entry(&self, id: NodeId) -> Result<&NodeEntry> {
        self.nodes.get(&id).ok_or(CoreError::NodeDestroyed(id.0))
    }

    /// Builds a node with no parent bound to `handle`.
    pub fn create_root(&mut self, handle: Handle, node: NewNode) -> NodeId {
        let id = self.allocate();
        self.nodes.insert(
            id,
            NodeEntry {
                handle,
                frame_path: node.frame_path,
                parent: None,
                children: Vec::new(),
                type_name: node.type_name,
                timeout: node.timeout,
                handler: node.handler,
            },
        );
        id
    }

    /// Builds a node under `parent`, sharing the parent's handle.
    ///
    /// The child is appended to the parent's children in insertion order.
    pub fn add_child(&mut self, parent: NodeId, node: NewNode) -> Result<NodeId> {
        let handle = self.entry(parent)?.handle.clone();
        let id = self.allocate();
        self.nodes.insert(
            id,
            NodeEntry {
                handle,
                frame_path: node.frame_path,
                parent: Some(parent),
                children: Vec::new(),
                type_name: node.type_name,
                timeout: node.timeout,
                handler: node.handler,
            },
        );
        if let Some(entry) = self.nodes.get_mut(&parent) {
            entry.children.push(id);
        }
        Ok(id)
    }

    pub fn get(&self, id: NodeId) -> Result<&NodeEntry> {
        self.entry(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn children(&self, id: NodeId) -> Result<Vec<NodeId>> {
        Ok(self.entry(id)?.children.clone())
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.entry(id)?.parent)
    }

    /// Every root node, in creation order.
    pub fn roots(&self) -> Vec<NodeId> {
        let mut roots: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, entry)| entry.parent.is_none())
            .map(|(id, _)| *id)
            .collect();
        roots.sort();
        roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Walks from `id` up to its root and returns the focus route.
    pub fn focus_chain(&self, id: NodeId) -> Result<FocusChain> {
        let mut frame_paths = Vec::new();
        let mut current = self.entry(id)?;
        loop {
            frame_paths.push(current.frame_path.clone());
            match current.parent {
                Some(parent) => current = self.entry(parent)?,
                None => break,
            }
        }
        frame_paths.reverse();
        Ok(FocusChain {
            handle: current.handle.clone(),
            frame_paths,
        })
    }

    /// Removes `id` and all of its descendants, children first.
    ///
    /// The node is unlinked from its parent's children. Closing the root's
    /// surface is left to the caller, using
    /// [`RemovedSubtree::root_handle`].
    pub fn remove_subtree(&mut self, id: NodeId) -> Result<RemovedSubtree> {
        let parent = self.entry(id)?.parent;
        let mut removed = Vec::new();
        let root_handle = self.remove_recursive(id, &mut removed);

        if let Some(parent) = parent {
            if let Some(entry) = self.nodes.get_mut(&parent) {
                entry.children.retain(|child| *child != id);
            }
        }

        Ok(RemovedSubtree {
            removed,
            root_handle: if parent.is_none() { root_handle } else { None },
        })
    }

    fn remove_recursive(&mut self, id: NodeId, removed: &mut Vec<NodeId>) -> Option<Handle> {
        let children = self
            .nodes
            .get(&id)
            .map(|entry| entry.children.clone())
            .unwrap_or_default();
        for child in children {
            self.remove_recursive(child, removed);
        }
        let entry = self.nodes.remove(&id)?;
        removed.push(id);
        Some(entry.handle)
    }
}
