/// Next-node resolution and dead-end scanning.
///
/// A destination is a literal id or text. Text is split on `/`; each part
/// is tried as a decimal id, then as a variable holding an id, then as an
/// expression yielding one. When several parts resolve, one is picked
/// uniformly. Resolution never looks at the graph.

use rand::seq::SliceRandom;
use rand::Rng;

use super::expr::evaluate;
use crate::schema::story::{NextRef, NodeId, StoryGraph};
use crate::schema::value::{Value, VarStore};

fn as_node_id(value: &Value) -> Option<NodeId> {
    value
        .to_integer()
        .and_then(|n| u64::try_from(n).ok())
        .map(NodeId)
}

/// Resolve one `/`-free part.
pub fn resolve_part(part: &str, vars: &VarStore) -> Option<NodeId> {
    let part = part.trim();
    if part.is_empty() {
        return None;
    }
    if let Ok(id) = part.parse::<u64>() {
        return Some(NodeId(id));
    }
    if let Some(value) = vars.get(part) {
        if let Some(id) = as_node_id(value) {
            return Some(id);
        }
    }
    evaluate(part, vars).ok().as_ref().and_then(as_node_id)
}

/// Every id the reference could lead to, in written order.
pub fn resolve_candidates(next: &NextRef, vars: &VarStore) -> Vec<NodeId> {
    match next {
        NextRef::Id(id) => vec![*id],
        NextRef::Text(text) => text
            .split('/')
            .filter_map(|part| resolve_part(part, vars))
            .collect(),
    }
}

/// Pick the destination. `None` means the story ends here.
pub fn resolve_next<R: Rng>(next: &NextRef, vars: &VarStore, rng: &mut R) -> Option<NodeId> {
    resolve_candidates(next, vars).choose(rng).copied()
}

/// Resolve raw destination text, as left behind by `goto:`.
pub fn resolve_target<R: Rng>(target: &str, vars: &VarStore, rng: &mut R) -> Option<NodeId> {
    NextRef::parse(target).and_then(|next| resolve_next(&next, vars, rng))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeadEndReason {
    /// Nothing in the reference resolved.
    Unresolved,
    /// Resolved to an id with no node behind it.
    Missing(NodeId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadEnd {
    pub node: NodeId,
    pub leaf_index: usize,
    pub next: NextRef,
    pub reason: DeadEndReason,
}

/// Choices whose destination is missing from the graph or cannot be
/// resolved against `vars`. Leaves without a destination are endings,
/// not dead ends.
pub fn find_dead_ends(graph: &StoryGraph, vars: &VarStore) -> Vec<DeadEnd> {
    let mut dead_ends = Vec::new();
    for (node_id, node) in graph.iter() {
        for (leaf_index, choice) in node.choices() {
            let Some(next) = &choice.next else {
                continue;
            };
            let candidates = resolve_candidates(next, vars);
            let mut report = |reason| {
                dead_ends.push(DeadEnd {
                    node: node_id,
                    leaf_index,
                    next: next.clone(),
                    reason,
                })
            };
            if candidates.is_empty() {
                report(DeadEndReason::Unresolved);
                continue;
            }
            let mut seen = Vec::new();
            for id in candidates {
                if !graph.contains(id) && !seen.contains(&id) {
                    seen.push(id);
                    report(DeadEndReason::Missing(id));
                }
            }
        }
    }
    dead_ends
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::story::{Choice, Leaf, Node};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn vars() -> VarStore {
        [
            ("room".to_string(), Value::Int(4)),
            ("back".to_string(), Value::from("2")),
            ("far".to_string(), Value::Float(7.9)),
            ("below".to_string(), Value::Int(-1)),
            ("word".to_string(), Value::from("north")),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn single_part_rules() {
        let vars = vars();
        assert_eq!(resolve_part("3", &vars), Some(NodeId(3)));
        assert_eq!(resolve_part("room", &vars), Some(NodeId(4)));
        assert_eq!(resolve_part("back", &vars), Some(NodeId(2)));
        assert_eq!(resolve_part("far", &vars), Some(NodeId(7)));
        assert_eq!(resolve_part("room + 1", &vars), Some(NodeId(5)));
        assert_eq!(resolve_part("below", &vars), None);
        assert_eq!(resolve_part("word", &vars), None);
        assert_eq!(resolve_part("nowhere", &vars), None);
    }

    #[test]
    fn random_set_support() {
        let mut vars = vars();
        vars.set("var_pointing_to_4", Value::Int(4));
        let next = NextRef::from("2/3/var_pointing_to_4");
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..500 {
            let id = resolve_next(&next, &vars, &mut rng).unwrap();
            assert!([2, 3, 4].contains(&id.0));
            seen.insert(id.0);
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn unresolvable_set_is_terminal() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(resolve_next(&NextRef::from("nope/also_nope"), &vars(), &mut rng), None);
        assert_eq!(resolve_target("  ", &vars(), &mut rng), None);
        assert_eq!(resolve_target("room", &vars(), &mut rng), Some(NodeId(4)));
    }

    #[test]
    fn dead_end_scan() {
        let choice = |next: Option<&str>| {
            Leaf::Choice(Choice {
                text: "go".to_string(),
                next: next.and_then(NextRef::parse),
                ..Choice::default()
            })
        };
        let mut graph = StoryGraph::new();
        graph.create(
            NodeId(1),
            Node::new("start").with_leaves(vec![
                choice(Some("2")),
                choice(Some("9")),
                choice(Some("ghost")),
                choice(None),
                choice(Some("2/room")),
            ]),
        );
        graph.create(NodeId(2), Node::new("end"));

        let dead = find_dead_ends(&graph, &vars());
        let summary: Vec<(usize, DeadEndReason)> =
            dead.into_iter().map(|d| (d.leaf_index, d.reason)).collect();
        assert_eq!(
            summary,
            vec![
                (1, DeadEndReason::Missing(NodeId(9))),
                (2, DeadEndReason::Unresolved),
                (4, DeadEndReason::Missing(NodeId(4))),
            ]
        );
    }
}
