use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use super::node::{Node, NodeId, NodeKind};

/// Tree of design nodes for one project: nodes keyed by id plus the ordered
/// root listing.
///
/// The JSON shape is `{"nodes": {"<id>": {...}}, "rootNodeIds": [...]}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneGraph {
    #[serde(default)]
    pub nodes: BTreeMap<NodeId, Node>,
    #[serde(default)]
    pub root_node_ids: Vec<NodeId>,
}

/// A reference to a node id that has no entry in `nodes`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DanglingReference {
    Root(NodeId),
    Child { parent: NodeId, child: NodeId },
    Parent { node: NodeId, parent: NodeId },
}

impl fmt::Display for DanglingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DanglingReference::Root(id) => write!(f, "root '{}' is missing", id),
            DanglingReference::Child { parent, child } => {
                write!(f, "child '{}' of '{}' is missing", child, parent)
            }
            DanglingReference::Parent { node, parent } => {
                write!(f, "parent '{}' of '{}' is missing", parent, node)
            }
        }
    }
}

/// SHA-256 digest of the canonical JSON encoding of a scene.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneFingerprint([u8; 32]);

impl fmt::Debug for SceneFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..6] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl SceneGraph {
    pub fn new(nodes: BTreeMap<NodeId, Node>, root_node_ids: Vec<NodeId>) -> Self {
        Self {
            nodes,
            root_node_ids,
        }
    }

    /// Build a graph from a flat node list; ids come from the nodes themselves.
    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>, root_node_ids: Vec<NodeId>) -> Self {
        let nodes = nodes
            .into_iter()
            .map(|node| (node.id.clone(), node))
            .collect();
        Self::new(nodes, root_node_ids)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.root_node_ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Structural fingerprint of the node map and the root order.
    ///
    /// Reordering roots leaves every node untouched, so both parts are hashed.
    /// Cost is linear in the size of the tree.
    pub fn fingerprint(&self) -> Result<SceneFingerprint, serde_json::Error> {
        let mut hasher = Sha256::new();
        serde_json::to_writer(&mut hasher, &(&self.nodes, &self.root_node_ids))?;
        Ok(SceneFingerprint(hasher.finalize().into()))
    }

    /// Every id referenced as a root, child or parent that is not in `nodes`.
    pub fn dangling_references(&self) -> Vec<DanglingReference> {
        let mut dangling = Vec::new();

        for root in &self.root_node_ids {
            if !self.nodes.contains_key(root) {
                dangling.push(DanglingReference::Root(root.clone()));
            }
        }

        for node in self.nodes.values() {
            for child in &node.children {
                if !self.nodes.contains_key(child) {
                    dangling.push(DanglingReference::Child {
                        parent: node.id.clone(),
                        child: child.clone(),
                    });
                }
            }
            if let Some(parent) = &node.parent_id {
                if !self.nodes.contains_key(parent) {
                    dangling.push(DanglingReference::Parent {
                        node: node.id.clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }

        dangling
    }

    pub fn count_by_kind(&self) -> BTreeMap<NodeKind, usize> {
        let mut counts = BTreeMap::new();
        for node in self.nodes.values() {
            *counts.entry(node.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Pre-order walk from the given ids, skipping missing links.
    pub fn walk<'a>(&'a self, from: &'a [NodeId]) -> impl Iterator<Item = &'a Node> + 'a {
        let mut stack: Vec<&NodeId> = from.iter().rev().collect();
        // Guards against malformed input where a node lists an ancestor as child.
        let mut seen = std::collections::HashSet::new();
        std::iter::from_fn(move || {
            while let Some(id) = stack.pop() {
                if !seen.insert(id) {
                    continue;
                }
                if let Some(node) = self.nodes.get(id) {
                    stack.extend(node.children.iter().rev());
                    return Some(node);
                }
            }
            None
        })
    }

    /// First node of `kind` in pre-order below `from`.
    pub fn find_first<'a>(&'a self, kind: NodeKind, from: &'a [NodeId]) -> Option<&'a Node> {
        self.walk(from).find(|node| node.kind == kind)
    }

    /// Ids of `id` and all of its descendants, in pre-order.
    pub fn subtree_ids(&self, id: &NodeId) -> Vec<NodeId> {
        self.walk(std::slice::from_ref(id))
            .map(|node| node.id.clone())
            .collect()
    }
}
