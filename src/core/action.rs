/// Action mini-language: parsing into statements and execution.
///
/// A leaf carries a list of raw action entries. Each entry splits into
/// sub-statements on `&`/`;`, except that once a sub-statement starts
/// with `if(` (or `repeat:`) the rest of the entry belongs to it, so
/// separators inside nested blocks survive. Every sub-statement parses
/// on its own: a malformed or failing one is skipped and recorded in the
/// [`ExecReport`], and execution carries on with the next.

use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::debug;

use super::condition::Condition;
use super::expr::{binary, BinOp, Expr, ExprError};
use super::scan::{arrow_positions, find_top_level, split_parenthesized, split_top_level};
use crate::schema::inventory::Inventory;
use crate::schema::value::{Value, VarStore};

/// Upper bound on `repeat:N` iterations.
pub const MAX_REPEAT: i64 = 10_000;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error("cannot parse action: {0}")]
    Parse(String),
    #[error(transparent)]
    Expr(#[from] ExprError),
    #[error("repeat count {0} exceeds the limit of {limit}", limit = MAX_REPEAT)]
    RepeatLimit(i64),
    #[error("invalid weights: {0}")]
    InvalidWeights(String),
    #[error("clamp bounds out of order: {min} > {max}")]
    InvalidBounds { min: f64, max: f64 },
}

fn parse_error(message: impl Into<String>) -> ActionError {
    ActionError::Parse(message.into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

impl AssignOp {
    fn binop(self) -> Option<BinOp> {
        match self {
            Self::Set => None,
            Self::Add => Some(BinOp::Add),
            Self::Sub => Some(BinOp::Sub),
            Self::Mul => Some(BinOp::Mul),
            Self::Div => Some(BinOp::Div),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Assign {
        target: String,
        op: AssignOp,
        expr: Expr,
    },
    /// `set:NAME=VALUE`, the value taken literally.
    SetLiteral {
        target: String,
        value: Value,
    },
    /// `rand_set:NAME:a,b,c`
    RandSet {
        target: String,
        choices: Vec<Value>,
    },
    If {
        condition: Condition,
        then: Vec<Step>,
        always: Vec<Step>,
    },
    Once {
        key: String,
        body: Vec<Step>,
    },
    Chance {
        percent: Expr,
        then: Vec<Step>,
        otherwise: Vec<Step>,
    },
    Repeat {
        count: Expr,
        body: Vec<Step>,
        after: Vec<Step>,
    },
    Weighted {
        target: String,
        items: Vec<(Value, Expr)>,
    },
    Clamp {
        target: String,
        min: Expr,
        max: Expr,
    },
    Consume {
        item: String,
        body: Vec<Step>,
    },
    AddItem(String),
    RemoveItem(String),
    ClearInventory,
    Goto(String),
}

impl Statement {
    fn nested(&self) -> Vec<&Step> {
        match self {
            Self::If { then, always, .. } => then.iter().chain(always).collect(),
            Self::Once { body, .. } | Self::Consume { body, .. } => body.iter().collect(),
            Self::Chance {
                then, otherwise, ..
            } => then.iter().chain(otherwise).collect(),
            Self::Repeat { body, after, .. } => body.iter().chain(after).collect(),
            _ => Vec::new(),
        }
    }

    fn is_sound(&self) -> bool {
        let condition_ok = match self {
            Self::If { condition, .. } => condition.is_sound(),
            _ => true,
        };
        condition_ok && self.nested().into_iter().all(Step::is_sound)
    }
}

/// One sub-statement with its source text, parsed once.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub source: String,
    pub parsed: Result<Statement, ActionError>,
}

impl Step {
    pub fn parse(source: &str) -> Step {
        let source = source.trim();
        Step {
            source: source.to_string(),
            parsed: parse_statement(source),
        }
    }

    /// True if this step and everything nested in it parsed.
    pub fn is_sound(&self) -> bool {
        self.parsed.as_ref().is_ok_and(Statement::is_sound)
    }
}

/// A leaf's action list, parsed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Script {
    steps: Vec<Step>,
}

impl Script {
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Script {
        Script {
            steps: entries
                .iter()
                .flat_map(|entry| parse_block(entry.as_ref()))
                .collect(),
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps (at any depth) that failed to parse.
    pub fn parse_failures(&self) -> Vec<(&str, &ActionError)> {
        let mut failures = Vec::new();
        collect_failures(&self.steps, &mut failures);
        failures
    }

    pub fn run<R: Rng>(&self, vars: &mut VarStore, inventory: &mut Inventory, rng: &mut R) -> ExecReport {
        let mut executor = Executor {
            vars,
            inventory,
            rng,
            report: ExecReport::default(),
        };
        executor.run_steps(&self.steps);
        executor.report
    }
}

fn collect_failures<'a>(steps: &'a [Step], out: &mut Vec<(&'a str, &'a ActionError)>) {
    for step in steps {
        match &step.parsed {
            Ok(statement) => {
                for nested in statement.nested() {
                    collect_failures(std::slice::from_ref(nested), out);
                }
            }
            Err(err) => out.push((&step.source, err)),
        }
    }
}

/// Parse and run in one go.
pub fn execute_actions<S: AsRef<str>, R: Rng>(
    entries: &[S],
    vars: &mut VarStore,
    inventory: &mut Inventory,
    rng: &mut R,
) -> ExecReport {
    Script::parse(entries).run(vars, inventory, rng)
}

/// A sub-statement that was skipped, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct Skipped {
    pub source: String,
    pub error: ActionError,
}

/// What a run did. Skips never stop the run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecReport {
    pub applied: usize,
    pub skipped: Vec<Skipped>,
}

impl ExecReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }

    pub fn merge(&mut self, other: ExecReport) {
        self.applied += other.applied;
        self.skipped.extend(other.skipped);
    }
}

/// Parsed scripts and guards keyed by their source, so a leaf is parsed
/// once however many times it is evaluated.
#[derive(Debug, Clone, Default)]
pub struct ScriptCache {
    scripts: FxHashMap<Vec<String>, Script>,
    conditions: FxHashMap<String, Condition>,
}

impl ScriptCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&mut self, entries: &[String]) -> &Script {
        if !self.scripts.contains_key(entries) {
            self.scripts
                .insert(entries.to_vec(), Script::parse(entries));
        }
        &self.scripts[entries]
    }

    pub fn condition(&mut self, source: &str) -> &Condition {
        if !self.conditions.contains_key(source) {
            self.conditions
                .insert(source.to_string(), Condition::parse(source));
        }
        &self.conditions[source]
    }

    pub fn len(&self) -> usize {
        self.scripts.len() + self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty() && self.conditions.is_empty()
    }

    pub fn clear(&mut self) {
        self.scripts.clear();
        self.conditions.clear();
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Split one entry (or a nested block) into parsed steps.
pub fn parse_block(text: &str) -> Vec<Step> {
    split_actions(text).into_iter().map(Step::parse).collect()
}

/// Split an entry into sub-statement sources.
pub fn split_actions(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = text;
    loop {
        let trimmed = rest.trim();
        if trimmed.is_empty() {
            break;
        }
        if trimmed.starts_with("if(") || trimmed.starts_with("repeat:") {
            pieces.push(trimmed);
            break;
        }
        match find_top_level(trimmed, &['&', ';']) {
            Some(at) => {
                let piece = trimmed[..at].trim();
                if contains_if_head(piece) {
                    // A nested block may hold separators; keep the rest whole.
                    pieces.push(trimmed);
                    break;
                }
                if !piece.is_empty() {
                    pieces.push(piece);
                }
                rest = &trimmed[at + 1..];
            }
            None => {
                pieces.push(trimmed);
                break;
            }
        }
    }
    pieces
}

fn contains_if_head(text: &str) -> bool {
    text.match_indices("if(").any(|(at, _)| {
        text[..at]
            .chars()
            .next_back()
            .map_or(true, |prev| !(prev.is_alphanumeric() || prev == '_'))
    })
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn block_is_sound(text: &str) -> bool {
    parse_block(text).iter().all(Step::is_sound)
}

fn parse_statement(source: &str) -> Result<Statement, ActionError> {
    if source.is_empty() {
        return Err(parse_error("empty action"));
    }
    if let Some(assign) = parse_assignment(source) {
        return assign;
    }
    if let Some(rest) = source.strip_prefix("if(") {
        return parse_if(rest);
    }
    if let Some(body) = source.strip_prefix("once:") {
        let body = body.trim();
        let steps = non_empty_block(body, "once")?;
        return Ok(Statement::Once {
            key: body.to_string(),
            body: steps,
        });
    }
    if let Some(rest) = source.strip_prefix("chance(") {
        return parse_chance(rest);
    }
    if let Some(rest) = source.strip_prefix("repeat:") {
        return parse_repeat(rest);
    }
    if let Some(rest) = source.strip_prefix("weighted(") {
        return parse_weighted(rest);
    }
    if let Some(rest) = source.strip_prefix("clamp(") {
        return parse_clamp(rest);
    }
    if let Some(rest) = source.strip_prefix("consume(") {
        return parse_consume(rest);
    }
    if let Some(item) = source.strip_prefix("add_item:") {
        return Ok(Statement::AddItem(item_name(item)?));
    }
    if let Some(item) = source.strip_prefix("remove_item:") {
        return Ok(Statement::RemoveItem(item_name(item)?));
    }
    if source == "clearinv" {
        return Ok(Statement::ClearInventory);
    }
    if let Some(target) = source.strip_prefix("goto:") {
        let target = target.trim();
        if target.is_empty() {
            return Err(parse_error("goto without a target"));
        }
        return Ok(Statement::Goto(target.to_string()));
    }
    if let Some(payload) = source.strip_prefix("set:") {
        return parse_set_literal(payload);
    }
    if let Some(payload) = source.strip_prefix("rand_set:") {
        return parse_rand_set(payload);
    }
    if let Some(rest) = source.strip_prefix("var:") {
        return parse_assignment(rest.trim())
            .unwrap_or_else(|| Err(parse_error(format!("expected an assignment after var: in '{}'", source))));
    }
    Err(parse_error(format!("unrecognized action '{}'", source)))
}

fn item_name(raw: &str) -> Result<String, ActionError> {
    let item = raw.trim();
    if item.is_empty() {
        return Err(parse_error("missing item name"));
    }
    Ok(item.to_string())
}

fn non_empty_block(text: &str, form: &str) -> Result<Vec<Step>, ActionError> {
    let steps = parse_block(text);
    if steps.is_empty() {
        return Err(parse_error(format!("{} has an empty body", form)));
    }
    Ok(steps)
}

/// `NAME op EXPR`. Returns `None` when the text is not assignment-shaped
/// so the other forms get a chance.
fn parse_assignment(source: &str) -> Option<Result<Statement, ActionError>> {
    let name_end = source
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
        .map_or(source.len(), |(i, _)| i);
    let target = &source[..name_end];
    if !is_identifier(target) {
        return None;
    }

    let rest = source[name_end..].trim_start();
    let (op, expr_src) = [
        ("+=", AssignOp::Add),
        ("-=", AssignOp::Sub),
        ("*=", AssignOp::Mul),
        ("/=", AssignOp::Div),
    ]
    .iter()
    .find_map(|(symbol, op)| rest.strip_prefix(symbol).map(|expr| (*op, expr)))
    .or_else(|| {
        rest.strip_prefix('=')
            .filter(|expr| !expr.starts_with('='))
            .map(|expr| (AssignOp::Set, expr))
    })?;

    Some(
        Expr::parse(expr_src)
            .map(|expr| Statement::Assign {
                target: target.to_string(),
                op,
                expr,
            })
            .map_err(ActionError::from),
    )
}

fn parse_if(rest: &str) -> Result<Statement, ActionError> {
    let (condition_src, tail) =
        split_parenthesized(rest).ok_or_else(|| parse_error("unclosed if("))?;
    let condition = Condition::parse(condition_src);
    let tail = tail.trim_start();

    let block = tail.strip_prefix(':').map(str::trim_start).unwrap_or(tail);
    if let Some(body) = block.strip_prefix('<') {
        let (inner, after) = split_block(body)?;
        return Ok(Statement::If {
            condition,
            then: parse_block(inner),
            always: parse_block(after),
        });
    }
    if let Some(body) = tail.strip_prefix(">>") {
        return Ok(Statement::If {
            condition,
            then: non_empty_block(body, "if")?,
            always: Vec::new(),
        });
    }
    if let Some(body) = tail.strip_prefix('>') {
        let mut then = non_empty_block(body, "if")?;
        let always = then.split_off(1);
        return Ok(Statement::If {
            condition,
            then,
            always,
        });
    }
    Err(parse_error("expected '<', '>' or '>>' after if(...)"))
}

/// Find the `>` closing a `<...>` block. Nested actions may contain `>`
/// themselves, so prefer the first close for which both sides parse.
fn split_block(body: &str) -> Result<(&str, &str), ActionError> {
    let candidates = arrow_positions(body);
    let first = *candidates
        .first()
        .ok_or_else(|| parse_error("unclosed '<' block"))?;
    let split = candidates
        .iter()
        .copied()
        .find(|&at| block_is_sound(&body[..at]) && block_is_sound(&body[at + 1..]))
        .unwrap_or(first);
    Ok((&body[..split], &body[split + 1..]))
}

fn parse_chance(rest: &str) -> Result<Statement, ActionError> {
    let (percent_src, tail) =
        split_parenthesized(rest).ok_or_else(|| parse_error("unclosed chance("))?;
    let percent = Expr::parse(percent_src)?;
    let body = tail
        .trim_start()
        .strip_prefix('>')
        .ok_or_else(|| parse_error("expected '>' after chance(...)"))?;

    let (act, otherwise) = split_alternatives(body);
    Ok(Statement::Chance {
        percent,
        then: non_empty_block(act, "chance")?,
        otherwise: otherwise.map(parse_block).unwrap_or_default(),
    })
}

/// `ACT>ELSE` or just `ACT`.
fn split_alternatives(body: &str) -> (&str, Option<&str>) {
    let candidates = arrow_positions(body);
    let sound = |text: &str| !text.trim().is_empty() && block_is_sound(text);

    if let Some(at) = candidates
        .iter()
        .copied()
        .find(|&at| sound(&body[..at]) && sound(&body[at + 1..]))
    {
        return (&body[..at], Some(&body[at + 1..]));
    }
    if sound(body) {
        return (body, None);
    }
    match candidates.first() {
        Some(&at) => (&body[..at], Some(&body[at + 1..])),
        None => (body, None),
    }
}

fn parse_repeat(rest: &str) -> Result<Statement, ActionError> {
    let at = *arrow_positions(rest)
        .first()
        .ok_or_else(|| parse_error("expected '>' after repeat count"))?;
    let count = Expr::parse(&rest[..at])?;
    let tail = &rest[at + 1..];

    if let Some(all) = tail.strip_prefix('>') {
        return Ok(Statement::Repeat {
            count,
            body: non_empty_block(all, "repeat")?,
            after: Vec::new(),
        });
    }
    let mut body = non_empty_block(tail, "repeat")?;
    let after = body.split_off(1);
    Ok(Statement::Repeat { count, body, after })
}

/// Split `inside` at its first top-level `:` into an identifier and the rest.
fn target_and_rest<'a>(inside: &'a str, form: &str) -> Result<(String, &'a str), ActionError> {
    let at = find_top_level(inside, &[':'])
        .ok_or_else(|| parse_error(format!("{} expects NAME:...", form)))?;
    let target = inside[..at].trim();
    if !is_identifier(target) {
        return Err(parse_error(format!("{}: '{}' is not a variable name", form, target)));
    }
    Ok((target.to_string(), &inside[at + 1..]))
}

fn closed_call<'a>(rest: &'a str, form: &str) -> Result<&'a str, ActionError> {
    let (inside, tail) =
        split_parenthesized(rest).ok_or_else(|| parse_error(format!("unclosed {}(", form)))?;
    if !tail.trim().is_empty() {
        return Err(parse_error(format!(
            "unexpected text after {}(...): '{}'",
            form,
            tail.trim()
        )));
    }
    Ok(inside)
}

fn parse_weighted(rest: &str) -> Result<Statement, ActionError> {
    let inside = closed_call(rest, "weighted")?;
    let (target, list) = target_and_rest(inside, "weighted")?;

    let items = split_top_level(list, &[','])
        .into_iter()
        .map(|entry| {
            let at = entry
                .find('=')
                .ok_or_else(|| parse_error(format!("weighted item '{}' has no weight", entry)))?;
            let weight = Expr::parse(&entry[at + 1..])?;
            Ok((Value::from_literal(&entry[..at]), weight))
        })
        .collect::<Result<Vec<_>, ActionError>>()?;

    if items.is_empty() {
        return Err(parse_error("weighted needs at least one item"));
    }
    Ok(Statement::Weighted { target, items })
}

fn parse_clamp(rest: &str) -> Result<Statement, ActionError> {
    let inside = closed_call(rest, "clamp")?;
    let (target, bounds) = target_and_rest(inside, "clamp")?;
    match split_top_level(bounds, &[',']).as_slice() {
        [min, max] => Ok(Statement::Clamp {
            target,
            min: Expr::parse(min)?,
            max: Expr::parse(max)?,
        }),
        _ => Err(parse_error("clamp expects NAME:MIN,MAX")),
    }
}

fn parse_consume(rest: &str) -> Result<Statement, ActionError> {
    let inside = closed_call(rest, "consume")?;
    let at = inside
        .find(':')
        .ok_or_else(|| parse_error("consume expects ITEM:ACTION"))?;
    Ok(Statement::Consume {
        item: item_name(&inside[..at])?,
        body: non_empty_block(&inside[at + 1..], "consume")?,
    })
}

fn parse_set_literal(payload: &str) -> Result<Statement, ActionError> {
    let at = payload
        .find('=')
        .ok_or_else(|| parse_error("set: expects NAME=VALUE"))?;
    let target = payload[..at].trim();
    if !is_identifier(target) {
        return Err(parse_error(format!("set: '{}' is not a variable name", target)));
    }
    Ok(Statement::SetLiteral {
        target: target.to_string(),
        value: Value::from_literal(&payload[at + 1..]),
    })
}

fn parse_rand_set(payload: &str) -> Result<Statement, ActionError> {
    let (target, list) = target_and_rest(payload, "rand_set")?;
    let choices: Vec<Value> = list
        .split(',')
        .map(str::trim)
        .filter(|choice| !choice.is_empty())
        .map(Value::from_literal)
        .collect();
    if choices.is_empty() {
        return Err(parse_error("rand_set needs at least one choice"));
    }
    Ok(Statement::RandSet { target, choices })
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

struct Executor<'a, R: Rng> {
    vars: &'a mut VarStore,
    inventory: &'a mut Inventory,
    rng: &'a mut R,
    report: ExecReport,
}

impl<R: Rng> Executor<'_, R> {
    fn run_steps(&mut self, steps: &[Step]) {
        for step in steps {
            let outcome = match &step.parsed {
                Ok(statement) => self.apply(statement),
                Err(err) => Err(err.clone()),
            };
            match outcome {
                Ok(()) => self.report.applied += 1,
                Err(error) => {
                    debug!(action = %step.source, %error, "skipped action");
                    self.report.skipped.push(Skipped {
                        source: step.source.clone(),
                        error,
                    });
                }
            }
        }
    }

    fn number(&self, expr: &Expr) -> Result<f64, ActionError> {
        let value = expr.eval(self.vars)?;
        value.as_f64().ok_or_else(|| {
            ExprError::TypeMismatch(format!("expected a number, got {}", value.type_name())).into()
        })
    }

    fn apply(&mut self, statement: &Statement) -> Result<(), ActionError> {
        match statement {
            Statement::Assign { target, op, expr } => {
                let rhs = expr.eval(self.vars)?;
                let value = match op.binop() {
                    None => rhs,
                    Some(bin) => {
                        let current = self.vars.get(target).cloned().unwrap_or(Value::Int(0));
                        binary(bin, &current, &rhs)?
                    }
                };
                self.vars.set(target.clone(), value);
            }
            Statement::SetLiteral { target, value } => {
                self.vars.set(target.clone(), value.clone());
            }
            Statement::RandSet { target, choices } => {
                if let Some(choice) = choices.choose(self.rng) {
                    self.vars.set(target.clone(), choice.clone());
                }
            }
            Statement::If {
                condition,
                then,
                always,
            } => {
                if condition.holds(self.vars, self.inventory) {
                    self.run_steps(then);
                }
                self.run_steps(always);
            }
            Statement::Once { key, body } => {
                if self.vars.mark_once(key) {
                    self.run_steps(body);
                }
            }
            Statement::Chance {
                percent,
                then,
                otherwise,
            } => {
                let percent = self.number(percent)?;
                let draw: f64 = self.rng.gen_range(0.0..100.0);
                if draw < percent {
                    self.run_steps(then);
                } else {
                    self.run_steps(otherwise);
                }
            }
            Statement::Repeat { count, body, after } => {
                let times = match count.eval(self.vars)? {
                    Value::Int(n) => n,
                    Value::Float(f) if f.is_finite() => f.trunc() as i64,
                    other => {
                        return Err(ExprError::TypeMismatch(format!(
                            "repeat count must be a number, got {}",
                            other.type_name()
                        ))
                        .into())
                    }
                };
                if times > MAX_REPEAT {
                    return Err(ActionError::RepeatLimit(times));
                }
                for _ in 0..times.max(0) {
                    self.run_steps(body);
                }
                self.run_steps(after);
            }
            Statement::Weighted { target, items } => {
                let weights = items
                    .iter()
                    .map(|(_, weight)| self.number(weight))
                    .collect::<Result<Vec<f64>, _>>()?;
                let dist = WeightedIndex::new(&weights)
                    .map_err(|err| ActionError::InvalidWeights(err.to_string()))?;
                let picked = items[dist.sample(self.rng)].0.clone();
                self.vars.set(target.clone(), picked);
            }
            Statement::Clamp { target, min, max } => {
                let current = self
                    .vars
                    .get(target)
                    .cloned()
                    .ok_or_else(|| ExprError::NameNotFound(target.clone()))?;
                let (min, max) = (self.number(min)?, self.number(max)?);
                if min > max {
                    return Err(ActionError::InvalidBounds { min, max });
                }
                let clamped = match current {
                    // No integer fits between fractional bounds.
                    Value::Int(n) if min.ceil() > max.floor() => Value::Float((n as f64).clamp(min, max)),
                    Value::Int(n) if (n as f64) < min => Value::Int(min.ceil() as i64),
                    Value::Int(n) if (n as f64) > max => Value::Int(max.floor() as i64),
                    Value::Float(f) => Value::Float(f.clamp(min, max)),
                    // Integers in range and non-numeric values stay as they are.
                    other => other,
                };
                self.vars.set(target.clone(), clamped);
            }
            Statement::Consume { item, body } => {
                if self.inventory.remove(item) {
                    self.run_steps(body);
                }
            }
            Statement::AddItem(item) => {
                self.inventory.add(item.clone());
            }
            Statement::RemoveItem(item) => {
                self.inventory.remove(item);
            }
            Statement::ClearInventory => self.inventory.clear(),
            Statement::Goto(target) => {
                debug!(%target, "jump requested");
                self.vars.request_jump(target.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;

    struct World {
        vars: VarStore,
        inventory: Inventory,
        rng: StdRng,
    }

    impl World {
        fn new() -> Self {
            Self {
                vars: VarStore::new(),
                inventory: Inventory::new(),
                rng: StdRng::seed_from_u64(7),
            }
        }

        fn with_var(mut self, name: &str, value: Value) -> Self {
            self.vars.set(name, value);
            self
        }

        fn run(&mut self, actions: &[&str]) -> ExecReport {
            execute_actions(actions, &mut self.vars, &mut self.inventory, &mut self.rng)
        }

        fn var(&self, name: &str) -> Option<Value> {
            self.vars.get(name).cloned()
        }
    }

    #[test]
    fn assignment_reads_the_pre_update_store() {
        let mut world = World::new().with_var("x", Value::Int(3));
        world.run(&["x+=x", "y=x*2"]);
        assert_eq!(world.var("x"), Some(Value::Int(6)));
        assert_eq!(world.var("y"), Some(Value::Int(12)));
    }

    #[test]
    fn compound_assignment_defaults_to_zero() {
        let mut world = World::new();
        let report = world.run(&["score+=5", "debt-=2", "mult*=3"]);
        assert!(report.is_clean());
        assert_eq!(world.var("score"), Some(Value::Int(5)));
        assert_eq!(world.var("debt"), Some(Value::Int(-2)));
        assert_eq!(world.var("mult"), Some(Value::Int(0)));
    }

    #[test]
    fn plain_assignment_needs_defined_names() {
        let mut world = World::new();
        let report = world.run(&["x=missing+1", "y=1"]);
        assert_eq!(world.var("x"), None);
        assert_eq!(world.var("y"), Some(Value::Int(1)));
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(
            report.skipped[0].error,
            ActionError::Expr(ExprError::NameNotFound("missing".to_string()))
        );
    }

    #[test]
    fn division_assignment_yields_float() {
        let mut world = World::new().with_var("gold", Value::Int(9));
        world.run(&["gold/=2"]);
        assert_eq!(world.var("gold"), Some(Value::Float(4.5)));
    }

    #[test]
    fn malformed_actions_are_skipped_and_the_rest_run() {
        let mut world = World::new();
        let report = world.run(&["a=1; ??? ; b=2", "c=(1", "d=3"]);
        assert_eq!(world.var("a"), Some(Value::Int(1)));
        assert_eq!(world.var("b"), Some(Value::Int(2)));
        assert_eq!(world.var("d"), Some(Value::Int(3)));
        assert_eq!(report.applied, 3);
        assert_eq!(report.skipped.len(), 2);
    }

    #[test]
    fn if_block_runs_unconditional_tail() {
        let mut world = World::new().with_var("hp", Value::Int(5));
        world.run(&["if(hp>3):<hp-=1;tag='hurt'>seen=1"]);
        assert_eq!(world.var("hp"), Some(Value::Int(4)));
        assert_eq!(world.var("tag"), Some(Value::from("hurt")));
        assert_eq!(world.var("seen"), Some(Value::Int(1)));

        let mut world = World::new().with_var("hp", Value::Int(1));
        world.run(&["if(hp>3):<hp-=1>seen=1"]);
        assert_eq!(world.var("hp"), Some(Value::Int(1)));
        assert_eq!(world.var("seen"), Some(Value::Int(1)));
    }

    #[test]
    fn if_block_colon_is_optional() {
        let mut world = World::new();
        world.run(&["if(has_item:key)<door='open'>"]);
        assert_eq!(world.var("door"), None);
        world.inventory.add("key");
        world.run(&["if(has_item:key)<door='open'>"]);
        assert_eq!(world.var("door"), Some(Value::from("open")));
    }

    #[test]
    fn nested_if_keeps_inner_separators() {
        let mut world = World::new()
            .with_var("a", Value::Int(1))
            .with_var("b", Value::Int(0));
        world.run(&["if(a==1):<if(b==1):<x=1;y=1>z=1;w=1>done=1"]);
        assert_eq!(world.var("x"), None);
        assert_eq!(world.var("y"), None);
        assert_eq!(world.var("z"), Some(Value::Int(1)));
        assert_eq!(world.var("w"), Some(Value::Int(1)));
        assert_eq!(world.var("done"), Some(Value::Int(1)));
    }

    #[test]
    fn if_arrow_forms() {
        let mut world = World::new().with_var("go", Value::Bool(true));
        world.run(&["if(go)>>a=1;b=2"]);
        assert_eq!(world.var("a"), Some(Value::Int(1)));
        assert_eq!(world.var("b"), Some(Value::Int(2)));

        let mut world = World::new().with_var("go", Value::Bool(false));
        world.run(&["if(go)>a=1;b=2"]);
        assert_eq!(world.var("a"), None);
        assert_eq!(world.var("b"), Some(Value::Int(2)));

        let mut world = World::new().with_var("go", Value::Bool(false));
        world.run(&["if(go)>>a=1;b=2"]);
        assert_eq!(world.var("a"), None);
        assert_eq!(world.var("b"), None);
    }

    #[test]
    fn failing_condition_is_false_not_an_error() {
        let mut world = World::new();
        let report = world.run(&["if(missing>1)>>a=1"]);
        assert!(report.is_clean());
        assert_eq!(world.var("a"), None);
    }

    #[test]
    fn once_runs_a_body_a_single_time() {
        let mut world = World::new().with_var("x", Value::Int(0));
        world.run(&["once:x+=1"]);
        world.run(&["once:x+=1"]);
        assert_eq!(world.var("x"), Some(Value::Int(1)));
        // Keyed by text, so a different body still runs.
        world.run(&["once: x += 1"]);
        assert_eq!(world.var("x"), Some(Value::Int(2)));
    }

    #[test]
    fn chance_boundaries() {
        let mut world = World::new();
        for _ in 0..200 {
            world.run(&["chance(100)>hits+=1", "chance(0)>never+=1>misses+=1"]);
        }
        assert_eq!(world.var("hits"), Some(Value::Int(200)));
        assert_eq!(world.var("never"), None);
        assert_eq!(world.var("misses"), Some(Value::Int(200)));
    }

    #[test]
    fn chance_else_with_jumps() {
        let mut world = World::new();
        world.run(&["chance(0)>goto:5>goto:6"]);
        assert_eq!(world.vars.take_jump().as_deref(), Some("6"));
    }

    #[test]
    fn chance_act_may_hold_a_comparison() {
        let mut world = World::new()
            .with_var("a", Value::Int(2))
            .with_var("b", Value::Int(1));
        world.run(&["chance(100)>flag=a>b"]);
        assert_eq!(world.var("flag"), Some(Value::Bool(true)));
    }

    #[test]
    fn repeat_forms() {
        let mut world = World::new();
        world.run(&["repeat:3>n+=1"]);
        assert_eq!(world.var("n"), Some(Value::Int(3)));

        world.run(&["repeat:2>>a+=1;b+=2"]);
        assert_eq!(world.var("a"), Some(Value::Int(2)));
        assert_eq!(world.var("b"), Some(Value::Int(4)));

        world.run(&["repeat:-4>neg+=1"]);
        assert_eq!(world.var("neg"), None);

        world.run(&["repeat:2.9>f+=1"]);
        assert_eq!(world.var("f"), Some(Value::Int(2)));
    }

    #[test]
    fn repeat_over_limit_is_skipped() {
        let mut world = World::new();
        let report = world.run(&["repeat:100000>n+=1"]);
        assert_eq!(world.var("n"), None);
        assert_eq!(report.skipped[0].error, ActionError::RepeatLimit(100_000));
        assert_eq!(
            report.skipped[0].error.to_string(),
            "repeat count 100000 exceeds the limit of 10000"
        );
    }

    #[test]
    fn weighted_only_picks_positive_weights() {
        let mut world = World::new();
        for _ in 0..100 {
            world.run(&["weighted(loot: gold=3, 'gem'=1, rock=0)"]);
            let loot = world.var("loot");
            assert!(loot == Some(Value::from("gold")) || loot == Some(Value::from("gem")));
        }
    }

    #[test]
    fn weighted_rejects_all_zero() {
        let mut world = World::new();
        let report = world.run(&["weighted(loot: a=0, b=0)"]);
        assert!(matches!(report.skipped[0].error, ActionError::InvalidWeights(_)));
        assert_eq!(world.var("loot"), None);
    }

    #[test]
    fn clamp_keeps_integer_type() {
        for (start, expected) in [(150, 100), (-10, 0), (50, 50)] {
            let mut world = World::new().with_var("hp", Value::Int(start));
            world.run(&["clamp(hp:0,100)"]);
            assert_eq!(world.var("hp"), Some(Value::Int(expected)));
        }
        let mut world = World::new().with_var("t", Value::Float(1.5));
        world.run(&["clamp(t:0,1)"]);
        assert_eq!(world.var("t"), Some(Value::Float(1.0)));
    }

    #[test]
    fn clamp_between_fractional_bounds_falls_back_to_float() {
        let mut world = World::new().with_var("v", Value::Int(1));
        world.run(&["clamp(v:0.5,0.7)"]);
        assert_eq!(world.var("v"), Some(Value::Float(0.7)));

        let mut world = World::new().with_var("v", Value::Int(0));
        world.run(&["clamp(v:0.5,0.7)"]);
        assert_eq!(world.var("v"), Some(Value::Float(0.5)));

        let mut world = World::new().with_var("v", Value::Int(5));
        world.run(&["clamp(v:0.5,2.5)"]);
        assert_eq!(world.var("v"), Some(Value::Int(2)));
    }

    #[test]
    fn clamp_leaves_strings_alone() {
        let mut world = World::new().with_var("hp", Value::from("full"));
        let report = world.run(&["clamp(hp:0,100)"]);
        assert!(report.is_clean());
        assert_eq!(world.var("hp"), Some(Value::from("full")));

        let report = world.run(&["clamp(hp:10,0)"]);
        assert!(matches!(report.skipped[0].error, ActionError::InvalidBounds { .. }));
    }

    #[test]
    fn consume_requires_the_item() {
        let mut world = World::new();
        world.run(&["consume(key:goto:5)"]);
        assert!(world.inventory.is_empty());
        assert!(world.vars.pending_jump().is_none());

        world.inventory.add("key");
        world.run(&["consume(key:goto:5)"]);
        assert!(!world.inventory.contains("key"));
        assert_eq!(world.vars.pending_jump(), Some("5"));
    }

    #[test]
    fn inventory_actions() {
        let mut world = World::new();
        world.run(&["add_item:sword&add_item:shield;add_item:sword"]);
        assert_eq!(world.inventory.len(), 2);
        world.run(&["remove_item:sword"]);
        assert!(!world.inventory.contains("sword"));
        world.run(&["clearinv"]);
        assert!(world.inventory.is_empty());
    }

    #[test]
    fn legacy_forms() {
        let mut world = World::new();
        world.run(&["set:mood=happy", "set:level=3", "var:level+=1", "rand_set:door:red, blue"]);
        assert_eq!(world.var("mood"), Some(Value::from("happy")));
        assert_eq!(world.var("level"), Some(Value::Int(4)));
        let door = world.var("door");
        assert!(door == Some(Value::from("red")) || door == Some(Value::from("blue")));
    }

    #[test]
    fn goto_stores_raw_target() {
        let mut world = World::new();
        world.run(&["goto: 2/3/room "]);
        assert_eq!(world.vars.pending_jump(), Some("2/3/room"));
    }

    #[test]
    fn split_keeps_if_blocks_whole() {
        assert_eq!(split_actions("a=1; b=2 & c=3"), vec!["a=1", "b=2", "c=3"]);
        assert_eq!(
            split_actions("a=1;if(x):<b=1;c=2>d=3"),
            vec!["a=1", "if(x):<b=1;c=2>d=3"]
        );
        assert_eq!(
            split_actions("once:if(x)>>b=1;c=2"),
            vec!["once:if(x)>>b=1;c=2"]
        );
        assert_eq!(
            split_actions("a=1;if(x)>>b=1;c=2"),
            vec!["a=1", "if(x)>>b=1;c=2"]
        );
    }

    #[test]
    fn mid_entry_if_owns_the_rest_of_the_entry() {
        let mut world = World::new().with_var("x", Value::Bool(false));
        world.run(&["a=1;if(x)>>b=1;c=2"]);
        assert_eq!(world.var("a"), Some(Value::Int(1)));
        assert_eq!(world.var("b"), None);
        assert_eq!(world.var("c"), None);

        // A separate entry runs regardless.
        world.run(&["a=1;if(x)>>b=1", "c=2"]);
        assert_eq!(world.var("c"), Some(Value::Int(2)));
    }

    #[test]
    fn cache_parses_once() {
        let mut cache = ScriptCache::new();
        let entries = vec!["x+=1".to_string()];
        let mut vars = VarStore::new();
        let mut inventory = Inventory::new();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..3 {
            cache.script(&entries).run(&mut vars, &mut inventory, &mut rng);
        }
        assert!(cache.condition("x == 3").holds(&vars, &inventory));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn parse_failures_are_listed() {
        let script = Script::parse(&["x=1", "if(a)>>y=1+;z=2", "bogus"]);
        let failures: Vec<&str> = script.parse_failures().into_iter().map(|(src, _)| src).collect();
        assert_eq!(failures, vec!["y=1+", "bogus"]);
    }
}
