//! Branch Engine: the scripting core of a branching-narrative editor.
//!
//! Stories are graphs of nodes whose choices are guarded by conditions,
//! mutate a variable store and inventory through a small action language,
//! and lead on through literal, indirect or randomized destinations.
//! Instant leaves run on node entry and may jump again before the player
//! sees anything. Authoring edits are undoable as whole-state snapshots.

pub mod core;
pub mod schema;

pub use crate::core::action::{execute_actions, ActionError, ExecReport, Script, ScriptCache};
pub use crate::core::cascade::{cascade, CascadeContext, CascadeError, CascadeOutcome};
pub use crate::core::condition::{evaluate_condition, Condition};
pub use crate::core::expr::{evaluate, Expr, ExprError};
pub use crate::core::history::History;
pub use crate::core::leaf_text::{format_leaf, parse_leaf_line, substitute, Defaults, LeafSheet};
pub use crate::core::persist::PersistError;
pub use crate::core::resolve::{find_dead_ends, resolve_next, DeadEnd, DeadEndReason};
pub use crate::core::session::{Issue, PlayStatus, PlayView, SessionError, StorySession};
pub use crate::schema::inventory::Inventory;
pub use crate::schema::story::{Choice, Leaf, LeafNote, NextRef, Node, NodeId, Story, StoryGraph};
pub use crate::schema::value::{Value, VarStore};
