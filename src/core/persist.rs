/// Story files in the JSON save shape, with RON as an alternate syntax.
///
/// ```json
/// {"nodes": {"1": {"header": "...", "options": [...], "x": 50, "y": 50, "color": "#222222"}},
///  "vars": {"gold": 10}, "inventory": ["rope"], "start": 1}
/// ```
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

use crate::schema::inventory::Inventory;
use crate::schema::story::{Choice, Leaf, NextRef, Node, NodeId, Story, StoryGraph, DEFAULT_NODE_COLOR};
use crate::schema::value::Value;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("RON error: {0}")]
    Ron(#[from] ron::Error),
    #[error("RON parse error: {0}")]
    RonSpanned(#[from] ron::error::SpannedError),
    #[error("node key '{0}' is not a non-negative integer")]
    InvalidNodeKey(String),
    #[error("node {0} appears more than once")]
    DuplicateNode(NodeId),
    #[error("variable '{0}' holds a non-finite number")]
    NonFiniteValue(String),
}

fn default_position() -> f64 {
    50.0
}

fn default_color() -> String {
    DEFAULT_NODE_COLOR.to_string()
}

fn default_start() -> u64 {
    1
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// A leaf in object form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafRecord {
    #[serde(default, skip_serializing_if = "is_false")]
    pub instant: bool,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub next: Option<NextRef>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub actions: Vec<String>,
}

impl From<&Leaf> for LeafRecord {
    fn from(leaf: &Leaf) -> Self {
        match leaf {
            Leaf::Instant { actions } => LeafRecord {
                instant: true,
                text: String::new(),
                next: None,
                condition: None,
                actions: actions.clone(),
            },
            Leaf::Choice(choice) => LeafRecord {
                instant: false,
                text: choice.text.clone(),
                next: choice.next.clone(),
                condition: choice.condition.clone(),
                actions: choice.actions.clone(),
            },
        }
    }
}

impl From<LeafRecord> for Leaf {
    fn from(record: LeafRecord) -> Self {
        if record.instant {
            return Leaf::Instant {
                actions: record.actions,
            };
        }
        Leaf::Choice(Choice {
            text: record.text,
            // A blank string in the file means "no destination".
            next: record.next.filter(|next| match next {
                NextRef::Text(text) => !text.trim().is_empty(),
                NextRef::Id(_) => true,
            }),
            condition: record.condition.filter(|cond| !cond.trim().is_empty()),
            actions: record.actions,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(default)]
    pub header: String,
    #[serde(default)]
    pub options: Vec<LeafRecord>,
    #[serde(default = "default_position")]
    pub x: f64,
    #[serde(default = "default_position")]
    pub y: f64,
    #[serde(default = "default_color")]
    pub color: String,
}

/// The on-disk shape. Node keys are strings because JSON object keys are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryFile {
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeRecord>,
    #[serde(default)]
    pub vars: BTreeMap<String, Value>,
    #[serde(default)]
    pub inventory: Inventory,
    #[serde(default = "default_start")]
    pub start: u64,
}

impl StoryFile {
    pub fn from_story(story: &Story) -> StoryFile {
        let nodes = story
            .graph
            .iter()
            .map(|(id, node)| {
                let record = NodeRecord {
                    header: node.header.clone(),
                    options: node.leaves.iter().map(LeafRecord::from).collect(),
                    x: node.x,
                    y: node.y,
                    color: node.color.clone(),
                };
                (id.to_string(), record)
            })
            .collect();

        StoryFile {
            nodes,
            vars: story.vars.clone(),
            inventory: story.inventory.clone(),
            start: story.start.0,
        }
    }

    /// Build the engine-side story. Keys must be integers and unique once
    /// parsed (`"1"` and `"01"` collide).
    pub fn into_story(self) -> Result<Story, PersistError> {
        let mut graph = StoryGraph::new();
        for (key, record) in self.nodes {
            let id = key
                .trim()
                .parse::<u64>()
                .map(NodeId)
                .map_err(|_| PersistError::InvalidNodeKey(key.clone()))?;
            let node = Node {
                header: record.header,
                leaves: record.options.into_iter().map(Leaf::from).collect(),
                notes: Vec::new(),
                x: record.x,
                y: record.y,
                color: record.color,
            };
            if !graph.create(id, node) {
                return Err(PersistError::DuplicateNode(id));
            }
        }

        let start = NodeId(self.start);
        if !graph.is_empty() && !graph.contains(start) {
            warn!(%start, "start node is missing from the loaded story");
        }

        Ok(Story {
            graph,
            vars: self.vars,
            inventory: self.inventory,
            start,
        })
    }
}

/// JSON has no spelling for NaN or infinity, so such defaults cannot be saved.
fn check_finite(story: &Story) -> Result<(), PersistError> {
    match story
        .vars
        .iter()
        .find(|(_, value)| matches!(value, Value::Float(f) if !f.is_finite()))
    {
        Some((name, _)) => Err(PersistError::NonFiniteValue(name.clone())),
        None => Ok(()),
    }
}

pub fn to_json(story: &Story) -> Result<String, PersistError> {
    check_finite(story)?;
    Ok(serde_json::to_string_pretty(&StoryFile::from_story(story))?)
}

pub fn from_json(input: &str) -> Result<Story, PersistError> {
    let file: StoryFile = serde_json::from_str(input)?;
    file.into_story()
}

pub fn to_ron(story: &Story) -> Result<String, PersistError> {
    check_finite(story)?;
    Ok(ron::ser::to_string_pretty(
        &StoryFile::from_story(story),
        ron::ser::PrettyConfig::default(),
    )?)
}

pub fn parse_ron(input: &str) -> Result<Story, PersistError> {
    let file: StoryFile = ron::from_str(input)?;
    file.into_story()
}

fn is_ron(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("ron"))
}

/// Load a story file. `.ron` files are read as RON, anything else as JSON.
pub fn load(path: &Path) -> Result<Story, PersistError> {
    let contents = std::fs::read_to_string(path)?;
    if is_ron(path) {
        parse_ron(&contents)
    } else {
        from_json(&contents)
    }
}

pub fn save(story: &Story, path: &Path) -> Result<(), PersistError> {
    let contents = if is_ron(path) {
        to_ron(story)?
    } else {
        to_json(story)?
    };
    std::fs::write(path, contents)?;
    Ok(())
}
