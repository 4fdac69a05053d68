/// Instant-leaf cascade run on node entry.
use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

use super::action::{ExecReport, ScriptCache};
use super::resolve::resolve_target;
use crate::schema::inventory::Inventory;
use crate::schema::story::{NodeId, StoryGraph};
use crate::schema::value::VarStore;

pub const DEFAULT_MAX_CASCADE_HOPS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CascadeError {
    #[error("node {0} does not exist")]
    UnknownNode(NodeId),
    #[error("instant leaves starting at node {start} jumped more than {limit} times; check for a cycle")]
    HopLimit { start: NodeId, limit: usize },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CascadeOutcome {
    /// The node to show. May be absent from the graph if a jump led
    /// nowhere; the caller treats that as a dead end.
    pub node: NodeId,
    pub hops: usize,
    pub visited: Vec<NodeId>,
    pub report: ExecReport,
}

/// Mutable state the cascade runs against.
pub struct CascadeContext<'a, R: Rng> {
    pub vars: &'a mut VarStore,
    pub inventory: &'a mut Inventory,
    pub rng: &'a mut R,
    pub cache: &'a mut ScriptCache,
}

/// Enter `start`: run its instant leaves in order. A leaf that leaves a
/// pending jump to another node moves the cascade there and the scan
/// restarts from that node's first instant leaf. A jump that resolves to
/// nothing, or to the current node, is dropped and the scan continues.
pub fn cascade<R: Rng>(
    graph: &StoryGraph,
    start: NodeId,
    ctx: CascadeContext<'_, R>,
    max_hops: usize,
) -> Result<CascadeOutcome, CascadeError> {
    if !graph.contains(start) {
        return Err(CascadeError::UnknownNode(start));
    }

    let CascadeContext {
        vars,
        inventory,
        rng,
        cache,
    } = ctx;
    let mut outcome = CascadeOutcome {
        node: start,
        visited: vec![start],
        ..CascadeOutcome::default()
    };

    'enter: loop {
        let Some(node) = graph.get(outcome.node) else {
            return Ok(outcome);
        };

        for actions in node.instant_leaves() {
            let report = cache.script(actions).run(vars, inventory, rng);
            outcome.report.merge(report);

            let Some(target) = vars.take_jump() else {
                continue;
            };
            match resolve_target(&target, vars, rng) {
                Some(next) if next != outcome.node => {
                    outcome.hops += 1;
                    if outcome.hops > max_hops {
                        warn!(%start, limit = max_hops, "instant-leaf cascade exceeded hop limit");
                        return Err(CascadeError::HopLimit {
                            start,
                            limit: max_hops,
                        });
                    }
                    debug!(from = %outcome.node, to = %next, "instant jump");
                    outcome.node = next;
                    outcome.visited.push(next);
                    continue 'enter;
                }
                _ => debug!(%target, "instant jump dropped"),
            }
        }

        return Ok(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::story::{Choice, Leaf, Node, NextRef};
    use crate::schema::value::Value;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn instant(action: &str) -> Leaf {
        Leaf::Instant {
            actions: vec![action.to_string()],
        }
    }

    fn exit(next: u64) -> Leaf {
        Leaf::Choice(Choice {
            text: "on".to_string(),
            next: Some(NextRef::from(next)),
            ..Choice::default()
        })
    }

    struct Rig {
        vars: VarStore,
        inventory: Inventory,
        rng: StdRng,
        cache: ScriptCache,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                vars: VarStore::new(),
                inventory: Inventory::new(),
                rng: StdRng::seed_from_u64(3),
                cache: ScriptCache::new(),
            }
        }

        fn run(&mut self, graph: &StoryGraph, start: u64, max_hops: usize) -> Result<CascadeOutcome, CascadeError> {
            let ctx = CascadeContext {
                vars: &mut self.vars,
                inventory: &mut self.inventory,
                rng: &mut self.rng,
                cache: &mut self.cache,
            };
            cascade(graph, NodeId(start), ctx, max_hops)
        }
    }

    #[test]
    fn no_instant_leaves_stays_put() {
        let mut graph = StoryGraph::new();
        graph.create(NodeId(1), Node::new("a").with_leaves(vec![exit(2)]));
        let outcome = Rig::new().run(&graph, 1, 8).unwrap();
        assert_eq!(outcome.node, NodeId(1));
        assert_eq!(outcome.hops, 0);
    }

    #[test]
    fn single_hop() {
        let mut graph = StoryGraph::new();
        graph.create(NodeId(1), Node::new("a").with_leaves(vec![instant("goto:2"), exit(3)]));
        graph.create(NodeId(2), Node::new("b").with_leaves(vec![instant("seen=1")]));
        let mut rig = Rig::new();
        let outcome = rig.run(&graph, 1, 8).unwrap();
        assert_eq!(outcome.node, NodeId(2));
        assert_eq!(outcome.visited, vec![NodeId(1), NodeId(2)]);
        assert_eq!(rig.vars.get("seen"), Some(&Value::Int(1)));
        assert!(rig.vars.pending_jump().is_none());
    }

    #[test]
    fn jump_abandons_remaining_leaves() {
        let mut graph = StoryGraph::new();
        graph.create(
            NodeId(1),
            Node::new("a").with_leaves(vec![instant("goto:2"), instant("skipped=1")]),
        );
        graph.create(NodeId(2), Node::new("b"));
        let mut rig = Rig::new();
        rig.run(&graph, 1, 8).unwrap();
        assert!(rig.vars.get("skipped").is_none());
    }

    #[test]
    fn self_jump_is_consumed() {
        let mut graph = StoryGraph::new();
        graph.create(
            NodeId(1),
            Node::new("a").with_leaves(vec![instant("goto:1"), instant("after=1")]),
        );
        let mut rig = Rig::new();
        let outcome = rig.run(&graph, 1, 8).unwrap();
        assert_eq!(outcome.node, NodeId(1));
        assert_eq!(rig.vars.get("after"), Some(&Value::Int(1)));
    }

    #[test]
    fn cycle_hits_the_hop_limit() {
        let mut graph = StoryGraph::new();
        graph.create(NodeId(1), Node::new("a").with_leaves(vec![instant("goto:2")]));
        graph.create(NodeId(2), Node::new("b").with_leaves(vec![instant("goto:1")]));
        let err = Rig::new().run(&graph, 1, 10).unwrap_err();
        assert_eq!(
            err,
            CascadeError::HopLimit {
                start: NodeId(1),
                limit: 10
            }
        );
    }

    #[test]
    fn conditional_bounce_settles() {
        let mut graph = StoryGraph::new();
        graph.create(
            NodeId(1),
            Node::new("a").with_leaves(vec![instant("visits+=1"), instant("if(visits<3)>goto:2")]),
        );
        graph.create(NodeId(2), Node::new("b").with_leaves(vec![instant("goto:1")]));
        let mut rig = Rig::new();
        let outcome = rig.run(&graph, 1, 16).unwrap();
        assert_eq!(outcome.node, NodeId(1));
        assert_eq!(outcome.hops, 4);
        assert_eq!(rig.vars.get("visits"), Some(&Value::Int(3)));
    }

    #[test]
    fn missing_start_and_missing_target() {
        let mut graph = StoryGraph::new();
        assert_eq!(
            Rig::new().run(&graph, 1, 8),
            Err(CascadeError::UnknownNode(NodeId(1)))
        );
        graph.create(NodeId(1), Node::new("a").with_leaves(vec![instant("goto:99")]));
        let outcome = Rig::new().run(&graph, 1, 8).unwrap();
        assert_eq!(outcome.node, NodeId(99));
    }
}
