use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::inventory::Inventory;
use super::value::Value;

/// Newtype wrapper for node IDs.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a choice leads.
///
/// `Text` is free-form: a decimal id, a variable holding an id, an
/// expression, or a `/`-separated set of those from which one resolved
/// target is picked at random.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NextRef {
    Id(NodeId),
    Text(String),
}

impl NextRef {
    /// Parse the `next` field of a leaf line. Empty means no destination.
    pub fn parse(raw: &str) -> Option<NextRef> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.parse::<u64>() {
            Ok(id) => Some(NextRef::Id(NodeId(id))),
            Err(_) => Some(NextRef::Text(raw.to_string())),
        }
    }
}

impl fmt::Display for NextRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{}", id),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<u64> for NextRef {
    fn from(id: u64) -> Self {
        Self::Id(NodeId(id))
    }
}

impl From<&str> for NextRef {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// A player-visible choice.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Choice {
    pub text: String,
    pub next: Option<NextRef>,
    pub condition: Option<String>,
    pub actions: Vec<String>,
}

/// One entry in a node's leaf list.
#[derive(Debug, Clone, PartialEq)]
pub enum Leaf {
    /// Runs automatically when the node is entered, before any choice is shown.
    Instant { actions: Vec<String> },
    Choice(Choice),
}

impl Leaf {
    pub fn actions(&self) -> &[String] {
        match self {
            Self::Instant { actions } => actions,
            Self::Choice(choice) => &choice.actions,
        }
    }

    pub fn is_instant(&self) -> bool {
        matches!(self, Self::Instant { .. })
    }

    pub fn as_choice(&self) -> Option<&Choice> {
        match self {
            Self::Choice(choice) => Some(choice),
            Self::Instant { .. } => None,
        }
    }
}

pub const DEFAULT_NODE_COLOR: &str = "#222222";

/// A `#` comment or blank line from a node's options text, kept as
/// written. It sits before the leaf at index `before`, or after the last
/// leaf when `before` is past the end.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafNote {
    pub before: usize,
    pub text: String,
}

/// One narrative beat. Position and color are editor metadata the
/// engine carries through saves untouched. Notes live only in memory;
/// the save shape holds leaves alone.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub header: String,
    pub leaves: Vec<Leaf>,
    pub notes: Vec<LeafNote>,
    pub x: f64,
    pub y: f64,
    pub color: String,
}

impl Node {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            leaves: Vec::new(),
            notes: Vec::new(),
            x: 50.0,
            y: 50.0,
            color: DEFAULT_NODE_COLOR.to_string(),
        }
    }

    pub fn with_leaves(mut self, leaves: Vec<Leaf>) -> Self {
        self.leaves = leaves;
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn instant_leaves(&self) -> impl Iterator<Item = &Vec<String>> {
        self.leaves.iter().filter_map(|leaf| match leaf {
            Leaf::Instant { actions } => Some(actions),
            Leaf::Choice(_) => None,
        })
    }

    /// Choices paired with their index in `leaves`.
    pub fn choices(&self) -> impl Iterator<Item = (usize, &Choice)> {
        self.leaves
            .iter()
            .enumerate()
            .filter_map(|(i, leaf)| leaf.as_choice().map(|choice| (i, choice)))
    }
}

/// The node table. Ids are unique by construction; a `next` pointing at
/// an id that is not here is a dead end, not a structural error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoryGraph {
    nodes: BTreeMap<NodeId, Node>,
}

impl StoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node under a fresh id. Returns false, leaving the graph
    /// untouched, if the id is taken.
    pub fn create(&mut self, id: NodeId, node: Node) -> bool {
        if self.nodes.contains_key(&id) {
            return false;
        }
        self.nodes.insert(id, node);
        true
    }

    pub fn delete(&mut self, id: NodeId) -> Option<Node> {
        self.nodes.remove(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Node ids in ascending order.
    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    /// One past the largest id, or 1 for an empty graph. Once the largest
    /// id is `u64::MAX`, the lowest unused id is handed out instead.
    pub fn next_id(&self) -> NodeId {
        match self.nodes.keys().next_back() {
            None => NodeId(1),
            Some(last) => match last.0.checked_add(1) {
                Some(next) => NodeId(next),
                None => self.lowest_free_id(),
            },
        }
    }

    fn lowest_free_id(&self) -> NodeId {
        let mut candidate = 1u64;
        for id in self.nodes.keys() {
            if id.0 > candidate {
                break;
            }
            if id.0 == candidate {
                candidate = candidate.saturating_add(1);
            }
        }
        NodeId(candidate)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().map(|(id, node)| (*id, node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}

/// Everything a save file holds.
#[derive(Debug, Clone, PartialEq)]
pub struct Story {
    pub graph: StoryGraph,
    pub vars: BTreeMap<String, Value>,
    pub inventory: Inventory,
    pub start: NodeId,
}

impl Default for Story {
    fn default() -> Self {
        Self {
            graph: StoryGraph::new(),
            vars: BTreeMap::new(),
            inventory: Inventory::new(),
            start: NodeId(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choice(text: &str, next: &str) -> Leaf {
        Leaf::Choice(Choice {
            text: text.to_string(),
            next: NextRef::parse(next),
            ..Choice::default()
        })
    }

    #[test]
    fn next_ref_parse() {
        assert_eq!(NextRef::parse(" 4 "), Some(NextRef::Id(NodeId(4))));
        assert_eq!(NextRef::parse("room"), Some(NextRef::Text("room".to_string())));
        assert_eq!(NextRef::parse("2/3"), Some(NextRef::Text("2/3".to_string())));
        assert_eq!(NextRef::parse("   "), None);
    }

    #[test]
    fn create_rejects_duplicate_id() {
        let mut graph = StoryGraph::new();
        assert!(graph.create(NodeId(1), Node::new("first")));
        assert!(!graph.create(NodeId(1), Node::new("second")));
        assert_eq!(graph.get(NodeId(1)).unwrap().header, "first");
    }

    #[test]
    fn ids_ascending_and_next_id() {
        let mut graph = StoryGraph::new();
        assert_eq!(graph.next_id(), NodeId(1));
        graph.create(NodeId(7), Node::new("g"));
        graph.create(NodeId(2), Node::new("b"));
        assert_eq!(graph.ids(), vec![NodeId(2), NodeId(7)]);
        assert_eq!(graph.next_id(), NodeId(8));
        assert!(graph.delete(NodeId(7)).is_some());
        assert_eq!(graph.next_id(), NodeId(3));
    }

    #[test]
    fn next_id_past_the_largest_id_reuses_a_gap() {
        let mut graph = StoryGraph::new();
        graph.create(NodeId(u64::MAX), Node::new("far"));
        assert_eq!(graph.next_id(), NodeId(1));
        graph.create(NodeId(1), Node::new("a"));
        graph.create(NodeId(2), Node::new("b"));
        graph.create(NodeId(5), Node::new("e"));
        assert_eq!(graph.next_id(), NodeId(3));
    }

    #[test]
    fn node_splits_instant_and_choices() {
        let node = Node::new("hub").with_leaves(vec![
            Leaf::Instant {
                actions: vec!["visits+=1".to_string()],
            },
            choice("Left", "2"),
            choice("Right", "3"),
        ]);
        assert_eq!(node.instant_leaves().count(), 1);
        let indices: Vec<usize> = node.choices().map(|(i, _)| i).collect();
        assert_eq!(indices, vec![1, 2]);
    }
}
