/// Guard evaluation for choices and `if(...)` actions.
///
/// A condition is a list of clauses joined by `&` or `;`, all of which
/// must hold. Each clause may carry one leading `!` and is one of
/// `has_item:NAME`, `not_has_item:NAME`, `var:EXPR` or a bare `EXPR`.
/// Conditions never fail: a clause whose expression cannot be parsed or
/// evaluated makes the whole condition false.

use tracing::debug;

use super::expr::{Expr, ExprError};
use super::scan::split_top_level;
use crate::schema::inventory::Inventory;
use crate::schema::value::VarStore;

#[derive(Debug, Clone, PartialEq)]
pub enum ClauseKind {
    HasItem(String),
    NotHasItem(String),
    Expr(Result<Expr, ExprError>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub negated: bool,
    pub kind: ClauseKind,
}

impl Clause {
    pub fn parse(source: &str) -> Clause {
        let source = source.trim();
        let (negated, body) = match source.strip_prefix('!') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, source),
        };

        let kind = if let Some(item) = body.strip_prefix("has_item:") {
            ClauseKind::HasItem(item.trim().to_string())
        } else if let Some(item) = body.strip_prefix("not_has_item:") {
            ClauseKind::NotHasItem(item.trim().to_string())
        } else {
            let expr = body.strip_prefix("var:").unwrap_or(body);
            ClauseKind::Expr(Expr::parse(expr))
        };

        Clause { negated, kind }
    }

    pub fn check(&self, vars: &VarStore, inventory: &Inventory) -> Result<bool, ExprError> {
        let held = match &self.kind {
            ClauseKind::HasItem(item) => inventory.contains(item),
            ClauseKind::NotHasItem(item) => !inventory.contains(item),
            ClauseKind::Expr(Ok(expr)) => expr.eval(vars)?.is_truthy(),
            ClauseKind::Expr(Err(err)) => return Err(err.clone()),
        };
        Ok(held != self.negated)
    }
}

/// A parsed guard. The empty condition always holds.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Condition {
    clauses: Vec<Clause>,
}

impl Condition {
    pub fn parse(source: &str) -> Condition {
        Condition {
            clauses: split_top_level(source, &['&', ';'])
                .into_iter()
                .map(Clause::parse)
                .collect(),
        }
    }

    pub fn always() -> Condition {
        Condition::default()
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Evaluate every clause, surfacing the first evaluation failure.
    pub fn check(&self, vars: &VarStore, inventory: &Inventory) -> Result<bool, ExprError> {
        for clause in &self.clauses {
            if !clause.check(vars, inventory)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Evaluate with failures degraded to "not satisfied".
    pub fn holds(&self, vars: &VarStore, inventory: &Inventory) -> bool {
        match self.check(vars, inventory) {
            Ok(held) => held,
            Err(err) => {
                debug!(error = %err, "condition failed to evaluate");
                false
            }
        }
    }

    /// True if every clause parsed.
    pub fn is_sound(&self) -> bool {
        self.clauses
            .iter()
            .all(|clause| !matches!(clause.kind, ClauseKind::Expr(Err(_))))
    }
}

/// Evaluate an optional guard string. Absent or blank guards hold.
pub fn evaluate_condition(source: Option<&str>, vars: &VarStore, inventory: &Inventory) -> bool {
    match source {
        Some(text) if !text.trim().is_empty() => Condition::parse(text).holds(vars, inventory),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::value::Value;

    fn state() -> (VarStore, Inventory) {
        let vars: VarStore = [
            ("gold".to_string(), Value::Int(10)),
            ("door_open".to_string(), Value::Bool(false)),
            ("name".to_string(), Value::String("Ada".to_string())),
        ]
        .into_iter()
        .collect();
        let inventory: Inventory = ["sword", "lamp"].into_iter().collect();
        (vars, inventory)
    }

    fn holds(src: &str) -> bool {
        let (vars, inventory) = state();
        evaluate_condition(Some(src), &vars, &inventory)
    }

    #[test]
    fn empty_condition_holds() {
        let (vars, inventory) = state();
        assert!(evaluate_condition(None, &vars, &inventory));
        assert!(evaluate_condition(Some("  "), &vars, &inventory));
    }

    #[test]
    fn item_clauses() {
        assert!(holds("has_item:sword"));
        assert!(!holds("has_item:shield"));
        assert!(holds("not_has_item:shield"));
        assert!(holds("has_item:sword & !has_item:shield"));
        assert!(!holds("has_item:sword & !has_item:lamp"));
    }

    #[test]
    fn expression_clauses() {
        assert!(holds("var:gold>=10"));
        assert!(holds("gold > 5; name == 'Ada'"));
        assert!(!holds("gold > 5 & door_open"));
        assert!(holds("!door_open"));
        assert!(holds("var:gold!=5"));
    }

    #[test]
    fn failures_make_the_condition_false() {
        assert!(!holds("missing > 1"));
        assert!(!holds("!missing"));
        assert!(!holds("gold.bits"));
        assert!(!holds("has_item:sword & 1 +"));
    }

    #[test]
    fn check_surfaces_the_error() {
        let (vars, inventory) = state();
        let condition = Condition::parse("missing > 1");
        assert_eq!(
            condition.check(&vars, &inventory),
            Err(ExprError::NameNotFound("missing".to_string()))
        );
        assert!(condition.is_sound());
        assert!(!Condition::parse("x =").is_sound());
    }
}
