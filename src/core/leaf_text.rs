/// Text encodings used by the authoring surface: leaf lines, `{NAME}`
/// substitution and default-variable declarations.
use std::collections::BTreeMap;
use std::fmt::Write as _;

use tracing::warn;

use super::action::split_actions;
use crate::schema::inventory::Inventory;
use crate::schema::story::{Choice, Leaf, LeafNote, NextRef, Node};
use crate::schema::value::{Value, VarStore};

/// Parse one `TEXT | NEXT | CONDITION | ACTIONS` line, or `@ACTION` for an
/// instant leaf. Blank lines and `#` comments are not leaves.
pub fn parse_leaf_line(line: &str) -> Option<Leaf> {
    let raw = line.trim();
    if raw.is_empty() || raw.starts_with('#') {
        return None;
    }
    if let Some(action) = raw.strip_prefix('@') {
        let action = action.trim();
        let actions = if action.is_empty() {
            Vec::new()
        } else {
            vec![action.to_string()]
        };
        return Some(Leaf::Instant { actions });
    }

    let mut fields = raw.splitn(4, '|').map(str::trim);
    let text = fields.next().unwrap_or_default();
    let next = fields.next().and_then(NextRef::parse);
    let condition = fields
        .next()
        .filter(|cond| !cond.is_empty())
        .map(str::to_string);
    let actions = match fields.next() {
        Some(acts) if acts.starts_with("if(") => vec![acts.to_string()],
        Some(acts) => split_actions(acts).into_iter().map(str::to_string).collect(),
        None => Vec::new(),
    };

    Some(Leaf::Choice(Choice {
        text: text.to_string(),
        next,
        condition,
        actions,
    }))
}

pub fn format_leaf(leaf: &Leaf) -> String {
    match leaf {
        Leaf::Instant { actions } => format!("@{}", actions.join(";")),
        Leaf::Choice(choice) => format!(
            "{} | {} | {} | {}",
            choice.text,
            choice.next.as_ref().map(ToString::to_string).unwrap_or_default(),
            choice.condition.as_deref().unwrap_or_default(),
            choice.actions.join(";")
        ),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SheetLine {
    Leaf(Leaf),
    /// A `#` comment or blank line, kept exactly as written.
    Verbatim(String),
}

/// The full options text of a node, line by line.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LeafSheet {
    lines: Vec<SheetLine>,
}

impl LeafSheet {
    pub fn parse(text: &str) -> LeafSheet {
        LeafSheet {
            lines: text
                .lines()
                .map(|line| match parse_leaf_line(line) {
                    Some(leaf) => SheetLine::Leaf(leaf),
                    None => SheetLine::Verbatim(line.to_string()),
                })
                .collect(),
        }
    }

    /// The sheet a node was authored from: its leaves with the notes
    /// put back in place.
    pub fn from_node(node: &Node) -> LeafSheet {
        let mut lines = Vec::with_capacity(node.leaves.len() + node.notes.len());
        let mut notes = node.notes.iter().peekable();
        for (index, leaf) in node.leaves.iter().enumerate() {
            while let Some(note) = notes.next_if(|note| note.before <= index) {
                lines.push(SheetLine::Verbatim(note.text.clone()));
            }
            lines.push(SheetLine::Leaf(leaf.clone()));
        }
        lines.extend(notes.map(|note| SheetLine::Verbatim(note.text.clone())));
        LeafSheet { lines }
    }

    pub fn lines(&self) -> &[SheetLine] {
        &self.lines
    }

    pub fn leaves(&self) -> Vec<Leaf> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                SheetLine::Leaf(leaf) => Some(leaf.clone()),
                SheetLine::Verbatim(_) => None,
            })
            .collect()
    }

    /// The comment and blank lines, anchored to the leaf that follows each.
    pub fn notes(&self) -> Vec<LeafNote> {
        let mut leaves = 0;
        let mut notes = Vec::new();
        for line in &self.lines {
            match line {
                SheetLine::Leaf(_) => leaves += 1,
                SheetLine::Verbatim(text) => notes.push(LeafNote {
                    before: leaves,
                    text: text.clone(),
                }),
            }
        }
        notes
    }

    pub fn format(&self) -> String {
        self.lines
            .iter()
            .map(|line| match line {
                SheetLine::Leaf(leaf) => format_leaf(leaf),
                SheetLine::Verbatim(raw) => raw.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Replace `{NAME}` with the variable's display form. Unknown names and
/// anything that is not a plain name stay as written.
pub fn substitute(text: &str, vars: &VarStore) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let name = &after[..close];
        match vars.get(name).filter(|_| is_plain_name(name)) {
            Some(value) => {
                let _ = write!(out, "{}", value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_plain_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Declared starting state: what the store and inventory hold when a
/// play session begins.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Defaults {
    pub vars: BTreeMap<String, Value>,
    pub inventory: Inventory,
}

impl Defaults {
    /// Parse `NAME=VALUE` and `inv:ITEM` lines. Blank lines and `#`
    /// comments are ignored; anything else is logged and skipped.
    pub fn parse(text: &str) -> Defaults {
        let mut defaults = Defaults::default();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(item) = line.strip_prefix("inv:") {
                defaults.inventory.add(item.trim());
                continue;
            }
            match line.split_once('=') {
                Some((name, value)) if is_plain_name(name.trim()) => {
                    defaults
                        .vars
                        .insert(name.trim().to_string(), Value::from_literal(value));
                }
                _ => warn!(line = number + 1, text = line, "ignoring unparsable default declaration"),
            }
        }
        defaults
    }

    /// Inverse of [`Defaults::parse`]. Strings are quoted so they read
    /// back as strings.
    pub fn format(&self) -> String {
        let mut lines: Vec<String> = self
            .vars
            .iter()
            .map(|(name, value)| match value {
                Value::String(s) => format!("{}=\"{}\"", name, s),
                other => format!("{}={}", name, other),
            })
            .collect();
        lines.extend(self.inventory.iter().map(|item| format!("inv:{}", item)));
        lines.join("\n")
    }
}
