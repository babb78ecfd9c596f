//! Partially materialized copy of the remote scene graph.
//!
//! Nodes are addressed by [`NodeId`]; a path index is kept in step with
//! every graft so lookups never scan the tree. Ids come from a counter that
//! survives [`SceneTree::clear`], so a stale `NodeId` never aliases a newer
//! node. Detached nodes are removed outright; storage tracks live nodes only.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use stagelink_transport::{PrimRecord, protocol::parse_children};

/// Handle to a node in a [`SceneTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum ChildState {
    Leaf,
    Unqueried,
    Loaded(Vec<NodeId>),
}

#[derive(Debug, Clone)]
struct Node {
    path: String,
    name: Option<String>,
    parent: Option<NodeId>,
    children: ChildState,
}

/// Read-only view of a prim handed to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prim {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub children: Children,
}

/// Child materialization state of a [`Prim`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "prims", rename_all = "snake_case")]
pub enum Children {
    /// The host reported no children.
    Leaf,
    /// The host reported children that have not been fetched yet.
    Unqueried,
    /// Children fetched; possibly empty.
    Loaded(Vec<Prim>),
}

/// Result of [`SceneTree::graft_children`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graft {
    /// Node the children were attached to; `None` when the whole tree was replaced.
    pub target: Option<NodeId>,
    /// Paths of the direct children now attached.
    pub attached: Vec<String>,
}

/// Scene tree keyed by [`NodeId`] with a path index.
#[derive(Debug, Default)]
pub struct SceneTree {
    nodes: HashMap<NodeId, Node>,
    next_id: usize,
    index: HashMap<String, NodeId>,
    roots: Vec<NodeId>,
}

impl SceneTree {
    /// Create an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every node. Ids handed out before stay invalid.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.index.clear();
        self.roots.clear();
    }

    /// Whether the tree has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of materialized nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Look a node up by path anywhere in the tree.
    #[must_use]
    pub fn find_by_path(&self, path: &str) -> Option<NodeId> {
        self.index.get(path).copied()
    }

    /// Look a node up by path within the subtree rooted at `within`.
    #[must_use]
    pub fn find_in(&self, path: &str, within: NodeId) -> Option<NodeId> {
        let found = self.find_by_path(path)?;
        let mut cursor = Some(found);
        while let Some(id) = cursor {
            if id == within {
                return Some(found);
            }
            cursor = self.node(id).and_then(|n| n.parent);
        }
        None
    }

    /// Whether `id` refers to a node still in the tree.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Path of a node.
    #[must_use]
    pub fn path(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(|n| n.path.as_str())
    }

    /// Whether the host reported children for this node that were never fetched.
    #[must_use]
    pub fn needs_children(&self, id: NodeId) -> bool {
        matches!(
            self.node(id).map(|n| &n.children),
            Some(ChildState::Unqueried)
        )
    }

    /// Attach children to the node at `path`, replacing any it had.
    ///
    /// If `path` does not resolve the whole tree is replaced by `children`.
    /// A non-array `children` value means no children. Records whose path is
    /// already materialized elsewhere are skipped.
    pub fn graft_children(&mut self, path: &str, children: &Value) -> Graft {
        let records = parse_children(children);

        let target = self.find_by_path(path);
        match target {
            Some(id) => self.detach_children(id),
            None => self.clear(),
        }

        let attached_ids: Vec<NodeId> = records
            .into_iter()
            .filter_map(|record| self.insert(target, record))
            .collect();
        let attached = attached_ids
            .iter()
            .filter_map(|id| self.path(*id).map(str::to_owned))
            .collect();

        match target.and_then(|id| self.node_mut(id)) {
            Some(node) => node.children = ChildState::Loaded(attached_ids),
            None => self.roots = attached_ids,
        }

        Graft { target, attached }
    }

    /// Snapshot of a node and everything materialized under it.
    #[must_use]
    pub fn prim(&self, id: NodeId) -> Option<Prim> {
        let node = self.node(id)?;
        let children = match &node.children {
            ChildState::Leaf => Children::Leaf,
            ChildState::Unqueried => Children::Unqueried,
            ChildState::Loaded(ids) => {
                Children::Loaded(ids.iter().filter_map(|c| self.prim(*c)).collect())
            }
        };
        Some(Prim {
            path: node.path.clone(),
            name: node.name.clone(),
            children,
        })
    }

    /// Snapshot of the whole tree.
    #[must_use]
    pub fn roots(&self) -> Vec<Prim> {
        self.roots.iter().filter_map(|id| self.prim(*id)).collect()
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    fn insert(&mut self, parent: Option<NodeId>, record: PrimRecord) -> Option<NodeId> {
        if self.index.contains_key(&record.path) {
            tracing::warn!(path = %record.path, "Skipping prim already present in tree");
            return None;
        }

        let id = NodeId(self.next_id);
        self.next_id += 1;
        let PrimRecord {
            path,
            name,
            children,
        } = record;
        self.nodes.insert(
            id,
            Node {
                path: path.clone(),
                name,
                parent,
                children: ChildState::Leaf,
            },
        );
        self.index.insert(path, id);

        let state = match children {
            None => ChildState::Leaf,
            Some(value @ Value::Array(_)) => ChildState::Loaded(
                parse_children(&value)
                    .into_iter()
                    .filter_map(|nested| self.insert(Some(id), nested))
                    .collect(),
            ),
            Some(_) => ChildState::Unqueried,
        };
        if let Some(node) = self.node_mut(id) {
            node.children = state;
        }
        Some(id)
    }

    fn detach_children(&mut self, id: NodeId) {
        let Some(node) = self.node_mut(id) else {
            return;
        };
        let ChildState::Loaded(children) = std::mem::replace(&mut node.children, ChildState::Leaf)
        else {
            return;
        };
        for child in children {
            self.detach_children(child);
            if let Some(removed) = self.nodes.remove(&child) {
                self.index.remove(&removed.path);
            }
        }
    }
}
