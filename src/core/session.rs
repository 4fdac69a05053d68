/// The story session: authoring state, undo history and the play loop.
///
/// The session owns the graph, the live store and the RNG, and lends
/// them to the engine components for each operation.
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::action::{ActionError, ExecReport, ScriptCache, Skipped};
use crate::core::cascade::{cascade, CascadeContext, CascadeError, DEFAULT_MAX_CASCADE_HOPS};
use crate::core::history::History;
use crate::core::leaf_text::{substitute, Defaults, LeafSheet};
use crate::core::persist::{self, PersistError};
use crate::core::resolve::{find_dead_ends, resolve_next, resolve_target, DeadEnd, DeadEndReason};
use crate::schema::inventory::Inventory;
use crate::schema::story::{Leaf, Node, NodeId, Story, StoryGraph};
use crate::schema::value::VarStore;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
    #[error("node {0} already exists")]
    DuplicateNode(NodeId),
    #[error("no play session is running")]
    NotPlaying,
    #[error("choice {index} is not available ({available} visible)")]
    ChoiceIndex { index: usize, available: usize },
    #[error("cascade error: {0}")]
    Cascade(#[from] CascadeError),
    #[error("persistence error: {0}")]
    Persist(#[from] PersistError),
}

/// Offset applied to a duplicated node's position.
const DUPLICATE_OFFSET: f64 = 20.0;

/// Everything an undo step restores.
#[derive(Debug, Clone)]
struct Snapshot {
    graph: StoryGraph,
    start: NodeId,
    defaults: Defaults,
    vars: VarStore,
    inventory: Inventory,
    selection: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayStatus {
    /// Showing a node with at least one visible choice.
    Active,
    /// No visible choices, or the last choice led nowhere.
    Ended,
    /// The story tried to enter a node that does not exist.
    DeadEnd(NodeId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisibleChoice {
    /// Position of the leaf in the node's leaf list.
    pub leaf_index: usize,
    pub text: String,
}

/// What the player sees.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayView {
    pub node: Option<NodeId>,
    pub header: String,
    pub choices: Vec<VisibleChoice>,
    pub status: PlayStatus,
    pub path: Vec<NodeId>,
    /// Actions skipped while getting here.
    pub skipped: Vec<Skipped>,
}

#[derive(Debug, Clone)]
struct PlayState {
    node: Option<NodeId>,
    status: PlayStatus,
    path: Vec<NodeId>,
    last_report: ExecReport,
}

impl Default for PlayState {
    fn default() -> Self {
        Self {
            node: None,
            status: PlayStatus::Ended,
            path: Vec::new(),
            last_report: ExecReport::default(),
        }
    }
}

/// A structural problem the authoring layer should show.
#[derive(Debug, Clone, PartialEq)]
pub enum Issue {
    MissingStart(NodeId),
    DeadEnd(DeadEnd),
    BadAction {
        node: NodeId,
        leaf_index: usize,
        source: String,
        error: ActionError,
    },
    BadCondition {
        node: NodeId,
        leaf_index: usize,
        source: String,
    },
    Cascade {
        node: NodeId,
        error: CascadeError,
    },
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingStart(id) => write!(f, "start node {} does not exist", id),
            Self::DeadEnd(dead) => match dead.reason {
                DeadEndReason::Unresolved => write!(
                    f,
                    "node {} leaf {}: next '{}' does not resolve",
                    dead.node, dead.leaf_index, dead.next
                ),
                DeadEndReason::Missing(target) => write!(
                    f,
                    "node {} leaf {}: next '{}' leads to missing node {}",
                    dead.node, dead.leaf_index, dead.next, target
                ),
            },
            Self::BadAction {
                node,
                leaf_index,
                source,
                error,
            } => write!(f, "node {} leaf {}: action '{}': {}", node, leaf_index, source, error),
            Self::BadCondition {
                node,
                leaf_index,
                source,
            } => write!(f, "node {} leaf {}: condition '{}' does not parse", node, leaf_index, source),
            Self::Cascade { node, error } => write!(f, "entering node {}: {}", node, error),
        }
    }
}

pub struct StorySession {
    graph: StoryGraph,
    start: NodeId,
    defaults: Defaults,
    vars: VarStore,
    inventory: Inventory,
    selection: Option<NodeId>,
    history: History<Snapshot>,
    cache: ScriptCache,
    rng: StdRng,
    seed: u64,
    max_cascade_hops: usize,
    play: Option<PlayState>,
}

/// Builder for constructing a `StorySession`.
pub struct StorySessionBuilder {
    seed: u64,
    story: Option<Story>,
    story_path: Option<PathBuf>,
    defaults: Option<Defaults>,
    max_cascade_hops: usize,
    history_limit: Option<usize>,
}

impl StorySession {
    pub fn builder() -> StorySessionBuilder {
        StorySessionBuilder {
            seed: 0,
            story: None,
            story_path: None,
            defaults: None,
            max_cascade_hops: DEFAULT_MAX_CASCADE_HOPS,
            history_limit: None,
        }
    }

    // -- accessors ---------------------------------------------------------

    pub fn graph(&self) -> &StoryGraph {
        &self.graph
    }

    pub fn start(&self) -> NodeId {
        self.start
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    pub fn vars(&self) -> &VarStore {
        &self.vars
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn selection(&self) -> Option<NodeId> {
        self.selection
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.graph.ids()
    }

    pub fn next_node_id(&self) -> NodeId {
        self.graph.next_id()
    }

    /// Dead ends as seen from the live variables.
    pub fn dead_ends(&self) -> Vec<DeadEnd> {
        find_dead_ends(&self.graph, &self.vars)
    }

    /// The authored story, as it would be saved.
    pub fn story(&self) -> Story {
        Story {
            graph: self.graph.clone(),
            vars: self.defaults.vars.clone(),
            inventory: self.defaults.inventory.clone(),
            start: self.start,
        }
    }

    pub fn select(&mut self, node: Option<NodeId>) {
        self.selection = node;
    }

    // -- history -----------------------------------------------------------

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            graph: self.graph.clone(),
            start: self.start,
            defaults: self.defaults.clone(),
            vars: self.vars.clone(),
            inventory: self.inventory.clone(),
            selection: self.selection,
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.graph = snapshot.graph;
        self.start = snapshot.start;
        self.defaults = snapshot.defaults;
        self.vars = snapshot.vars;
        self.inventory = snapshot.inventory;
        self.selection = snapshot.selection;
    }

    fn push_undo(&mut self) {
        let snapshot = self.snapshot();
        self.history.push(snapshot);
    }

    /// Returns false at the bottom of history.
    pub fn undo(&mut self) -> bool {
        if !self.history.can_undo() {
            return false;
        }
        let current = self.snapshot();
        match self.history.undo(current) {
            Some(previous) => {
                self.restore(previous);
                true
            }
            None => false,
        }
    }

    /// Returns false at the top of history.
    pub fn redo(&mut self) -> bool {
        if !self.history.can_redo() {
            return false;
        }
        let current = self.snapshot();
        match self.history.redo(current) {
            Some(next) => {
                self.restore(next);
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // -- authoring ---------------------------------------------------------

    pub fn create_node(&mut self, id: NodeId, node: Node) -> Result<(), SessionError> {
        if self.graph.contains(id) {
            return Err(SessionError::DuplicateNode(id));
        }
        self.push_undo();
        self.graph.create(id, node);
        Ok(())
    }

    /// Create `Node N` under the next free id.
    pub fn add_node(&mut self) -> NodeId {
        let id = self.graph.next_id();
        self.push_undo();
        self.graph.create(id, Node::new(format!("Node {}", id)));
        self.selection = Some(id);
        id
    }

    pub fn delete_node(&mut self, id: NodeId) -> Result<Node, SessionError> {
        if !self.graph.contains(id) {
            return Err(SessionError::NodeNotFound(id));
        }
        self.push_undo();
        if self.selection == Some(id) {
            self.selection = None;
        }
        self.graph.delete(id).ok_or(SessionError::NodeNotFound(id))
    }

    /// Copy a node under the next free id, nudged down and right.
    pub fn duplicate_node(&mut self, id: NodeId) -> Result<NodeId, SessionError> {
        let mut copy = self
            .graph
            .get(id)
            .cloned()
            .ok_or(SessionError::NodeNotFound(id))?;
        copy.x += DUPLICATE_OFFSET;
        copy.y += DUPLICATE_OFFSET;
        let new_id = self.graph.next_id();
        self.push_undo();
        self.graph.create(new_id, copy);
        self.selection = Some(new_id);
        Ok(new_id)
    }

    /// Apply an arbitrary edit to one node as a single undo step.
    pub fn edit_node<F>(&mut self, id: NodeId, edit: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut Node),
    {
        if !self.graph.contains(id) {
            return Err(SessionError::NodeNotFound(id));
        }
        self.push_undo();
        if let Some(node) = self.graph.get_mut(id) {
            edit(node);
        }
        Ok(())
    }

    /// Replace a node's header and leaves from the authoring text. Comment
    /// and blank lines are kept for [`StorySession::options_text`].
    pub fn update_node(&mut self, id: NodeId, header: &str, options: &str) -> Result<(), SessionError> {
        let sheet = LeafSheet::parse(options);
        let (leaves, notes) = (sheet.leaves(), sheet.notes());
        self.edit_node(id, |node| {
            node.header = header.to_string();
            node.leaves = leaves;
            node.notes = notes;
        })
    }

    /// A node's options text as the authoring surface shows it.
    pub fn options_text(&self, id: NodeId) -> Option<String> {
        self.graph
            .get(id)
            .map(|node| LeafSheet::from_node(node).format())
    }

    pub fn set_leaves(&mut self, id: NodeId, leaves: Vec<Leaf>) -> Result<(), SessionError> {
        self.edit_node(id, |node| node.leaves = leaves)
    }

    pub fn set_start(&mut self, id: NodeId) -> Result<(), SessionError> {
        if !self.graph.contains(id) {
            return Err(SessionError::NodeNotFound(id));
        }
        self.push_undo();
        self.start = id;
        Ok(())
    }

    /// Replace the declared defaults and reseed the live state from them.
    pub fn apply_defaults_text(&mut self, text: &str) {
        self.push_undo();
        self.defaults = Defaults::parse(text);
        self.reseed();
    }

    /// Empty the story entirely.
    pub fn reset_all(&mut self) {
        self.push_undo();
        self.graph.clear();
        self.defaults = Defaults::default();
        self.vars.reset(&self.defaults.vars);
        self.inventory.clear();
        self.selection = None;
        self.start = NodeId(1);
        self.play = None;
    }

    /// Replace the whole story (an undoable step).
    pub fn load_story(&mut self, story: Story) {
        self.push_undo();
        self.graph = story.graph;
        self.start = story.start;
        self.defaults = Defaults {
            vars: story.vars,
            inventory: story.inventory,
        };
        self.reseed();
        self.selection = None;
        self.play = None;
    }

    pub fn load(&mut self, path: &Path) -> Result<(), SessionError> {
        let story = persist::load(path)?;
        info!(path = %path.display(), nodes = story.graph.len(), "loaded story");
        self.load_story(story);
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), SessionError> {
        persist::save(&self.story(), path)?;
        info!(path = %path.display(), "saved story");
        Ok(())
    }

    fn reseed(&mut self) {
        self.vars.reset(&self.defaults.vars);
        self.inventory = self.defaults.inventory.clone();
    }

    // -- validation --------------------------------------------------------

    /// Problems worth blocking on before a play-through: a missing start
    /// node, dead ends, scripts that do not parse, and instant-leaf loops.
    pub fn validate(&mut self) -> Vec<Issue> {
        let mut issues = Vec::new();
        if !self.graph.contains(self.start) {
            issues.push(Issue::MissingStart(self.start));
        }

        let mut scratch = VarStore::new();
        scratch.reset(&self.defaults.vars);
        issues.extend(find_dead_ends(&self.graph, &scratch).into_iter().map(Issue::DeadEnd));

        for (id, node) in self.graph.iter() {
            for (leaf_index, leaf) in node.leaves.iter().enumerate() {
                let script = self.cache.script(leaf.actions());
                for (source, error) in script.parse_failures() {
                    issues.push(Issue::BadAction {
                        node: id,
                        leaf_index,
                        source: source.to_string(),
                        error: error.clone(),
                    });
                }
                if let Some(condition) = leaf.as_choice().and_then(|c| c.condition.as_deref()) {
                    if !self.cache.condition(condition).is_sound() {
                        issues.push(Issue::BadCondition {
                            node: id,
                            leaf_index,
                            source: condition.to_string(),
                        });
                    }
                }
            }

            if node.instant_leaves().next().is_some() {
                let mut vars = scratch.clone();
                let mut inventory = self.defaults.inventory.clone();
                let mut rng = StdRng::seed_from_u64(self.seed);
                let ctx = CascadeContext {
                    vars: &mut vars,
                    inventory: &mut inventory,
                    rng: &mut rng,
                    cache: &mut self.cache,
                };
                if let Err(error) = cascade(&self.graph, id, ctx, self.max_cascade_hops) {
                    issues.push(Issue::Cascade { node: id, error });
                }
            }
        }
        issues
    }

    // -- play --------------------------------------------------------------

    pub fn is_playing(&self) -> bool {
        self.play.is_some()
    }

    /// Reset the live state to the defaults and enter the start node.
    pub fn start_play(&mut self) -> Result<PlayView, SessionError> {
        if !self.graph.contains(self.start) {
            return Err(CascadeError::UnknownNode(self.start).into());
        }
        self.reseed();
        self.play = Some(PlayState::default());
        info!(start = %self.start, "play started");
        if let Err(err) = self.enter(self.start, ExecReport::default()) {
            self.play = None;
            return Err(err);
        }
        self.view().ok_or(SessionError::NotPlaying)
    }

    pub fn stop_play(&mut self) {
        self.play = None;
    }

    /// Pick the `index`-th visible choice of the current node.
    pub fn choose(&mut self, index: usize) -> Result<PlayView, SessionError> {
        let play = self.play.as_ref().ok_or(SessionError::NotPlaying)?;
        let current = match (&play.status, play.node) {
            (PlayStatus::Active, Some(id)) => id,
            _ => return Err(SessionError::ChoiceIndex { index, available: 0 }),
        };

        let visible = self.visible_choices(current);
        let leaf_index = visible
            .get(index)
            .map(|choice| choice.leaf_index)
            .ok_or(SessionError::ChoiceIndex {
                index,
                available: visible.len(),
            })?;
        let choice = self
            .graph
            .get(current)
            .and_then(|node| node.leaves.get(leaf_index))
            .and_then(Leaf::as_choice)
            .cloned()
            .ok_or(SessionError::NodeNotFound(current))?;

        let report = self
            .cache
            .script(&choice.actions)
            .run(&mut self.vars, &mut self.inventory, &mut self.rng);

        // A jump requested by the choice's own actions wins over its `next`.
        let destination = match self.vars.take_jump() {
            Some(target) => resolve_target(&target, &self.vars, &mut self.rng),
            None => choice
                .next
                .as_ref()
                .and_then(|next| resolve_next(next, &self.vars, &mut self.rng)),
        };
        debug!(from = %current, choice = %choice.text, to = ?destination, "choice taken");

        match destination {
            Some(id) => self.enter(id, report)?,
            None => {
                if let Some(play) = self.play.as_mut() {
                    play.node = None;
                    play.status = PlayStatus::Ended;
                    play.last_report = report;
                }
            }
        }
        self.view().ok_or(SessionError::NotPlaying)
    }

    /// The current play view, if a play session is running.
    pub fn view(&mut self) -> Option<PlayView> {
        let play = self.play.clone()?;
        let header = play
            .node
            .and_then(|id| self.graph.get(id))
            .map(|node| substitute(&node.header, &self.vars))
            .unwrap_or_default();
        let choices = match (&play.status, play.node) {
            (PlayStatus::Active, Some(id)) => self.visible_choices(id),
            _ => Vec::new(),
        };
        Some(PlayView {
            node: play.node,
            header,
            choices,
            status: play.status,
            path: play.path,
            skipped: play.last_report.skipped,
        })
    }

    fn visible_choices(&mut self, id: NodeId) -> Vec<VisibleChoice> {
        let Some(node) = self.graph.get(id) else {
            return Vec::new();
        };
        let mut visible = Vec::new();
        for (leaf_index, choice) in node.choices() {
            let shown = match choice.condition.as_deref() {
                Some(source) => self.cache.condition(source).holds(&self.vars, &self.inventory),
                None => true,
            };
            if shown {
                visible.push(VisibleChoice {
                    leaf_index,
                    text: substitute(&choice.text, &self.vars),
                });
            }
        }
        visible
    }

    fn enter(&mut self, target: NodeId, mut report: ExecReport) -> Result<(), SessionError> {
        let (node, visited) = if self.graph.contains(target) {
            let ctx = CascadeContext {
                vars: &mut self.vars,
                inventory: &mut self.inventory,
                rng: &mut self.rng,
                cache: &mut self.cache,
            };
            let outcome = cascade(&self.graph, target, ctx, self.max_cascade_hops)?;
            report.merge(outcome.report);
            (outcome.node, outcome.visited)
        } else {
            (target, vec![target])
        };

        let status = if !self.graph.contains(node) {
            info!(%node, "dead end");
            PlayStatus::DeadEnd(node)
        } else if self.visible_choices(node).is_empty() {
            PlayStatus::Ended
        } else {
            PlayStatus::Active
        };
        debug!(%node, ?status, "entered node");

        let play = self.play.get_or_insert_with(PlayState::default);
        play.node = Some(node);
        play.status = status;
        play.path.extend(visited);
        play.last_report = report;
        Ok(())
    }
}

impl StorySessionBuilder {
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Provide a story directly.
    pub fn with_story(mut self, story: Story) -> Self {
        self.story = Some(story);
        self
    }

    /// Load the story from a `.json` or `.ron` file at build time.
    pub fn story_path(mut self, path: impl AsRef<Path>) -> Self {
        self.story_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Override the defaults carried by the story.
    pub fn with_defaults(mut self, defaults: Defaults) -> Self {
        self.defaults = Some(defaults);
        self
    }

    pub fn max_cascade_hops(mut self, hops: usize) -> Self {
        self.max_cascade_hops = hops;
        self
    }

    pub fn history_limit(mut self, limit: usize) -> Self {
        self.history_limit = Some(limit);
        self
    }

    pub fn build(self) -> Result<StorySession, SessionError> {
        let story = match self.story_path {
            Some(ref path) => persist::load(path)?,
            None => self.story.unwrap_or_default(),
        };
        let defaults = self.defaults.unwrap_or(Defaults {
            vars: story.vars,
            inventory: story.inventory,
        });

        let mut vars = VarStore::new();
        vars.reset(&defaults.vars);
        let inventory = defaults.inventory.clone();

        Ok(StorySession {
            graph: story.graph,
            start: story.start,
            defaults,
            vars,
            inventory,
            selection: None,
            history: self.history_limit.map(History::with_limit).unwrap_or_default(),
            cache: ScriptCache::new(),
            rng: StdRng::seed_from_u64(self.seed),
            seed: self.seed,
            max_cascade_hops: self.max_cascade_hops,
            play: None,
        })
    }
}
