use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Identifier of a node inside one scene graph.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh identifier prefixed with the node kind, e.g. `wall_3f2a...`
    pub fn generate(kind: NodeKind) -> Self {
        Self(format!("{}_{}", kind.as_str(), Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Structural and furnishing element kinds of an architectural scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Site,
    Building,
    Level,
    Wall,
    Slab,
    Ceiling,
    Roof,
    Zone,
    Door,
    Window,
    Item,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Site => "site",
            NodeKind::Building => "building",
            NodeKind::Level => "level",
            NodeKind::Wall => "wall",
            NodeKind::Slab => "slab",
            NodeKind::Ceiling => "ceiling",
            NodeKind::Roof => "roof",
            NodeKind::Zone => "zone",
            NodeKind::Door => "door",
            NodeKind::Window => "window",
            NodeKind::Item => "item",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One element of the scene tree.
///
/// `parent_id` is a weak back-reference and `children` is the ordered
/// listing owned by this node. Both are maintained by the store; editing
/// actions that hand out `&mut Node` restore them afterwards.
/// Kind-specific data (geometry, materials, ...) lives in `properties` and
/// is carried through untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub children: Vec<NodeId>,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            name: None,
            parent_id: None,
            children: Vec::new(),
            properties: Map::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_children(mut self, children: Vec<NodeId>) -> Self {
        self.children = children;
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<NodeId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}
