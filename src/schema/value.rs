use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A scalar value held by the variable store.
///
/// Only numeric promotion (`Int` to `Float`) happens implicitly; every
/// other cross-type operation is rejected by the expression evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Value {
    /// Zero, the empty string and `false` are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Float(f) => *f != 0.0,
            Self::String(s) => !s.is_empty(),
        }
    }

    /// Numeric view with integer promotion. `None` for strings and booleans.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    /// Integer coercion used when a value names a node.
    ///
    /// Floats truncate toward zero, strings must hold a decimal integer.
    pub fn to_integer(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
        }
    }

    /// Scalar coercion shared by default declarations and `set:` actions:
    /// `true`/`false` (any case), then integer, then finite float, otherwise
    /// the text with one layer of surrounding quotes removed. `nan` and
    /// `inf` stay text.
    pub fn from_literal(raw: &str) -> Value {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("true") {
            return Value::Bool(true);
        }
        if raw.eq_ignore_ascii_case("false") {
            return Value::Bool(false);
        }
        if let Ok(n) = raw.parse::<i64>() {
            return Value::Int(n);
        }
        match raw.parse::<f64>() {
            Ok(f) if f.is_finite() => return Value::Float(f),
            _ => {}
        }
        Value::String(strip_quotes(raw).to_string())
    }
}

fn strip_quotes(raw: &str) -> &str {
    for quote in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(n) => write!(f, "{}", n),
            // Keep a visible fraction so 2.0 does not read back as an integer.
            Self::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 => {
                write!(f, "{:.1}", x)
            }
            Self::Float(x) => write!(f, "{}", x),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

/// The mutable name → value environment of a session.
///
/// Besides author variables it carries two engine slots that are never
/// visible as ordinary variables: the pending jump requested by `goto:`
/// and the memo of `once:` bodies already executed. The memo survives
/// [`VarStore::reset`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VarStore {
    vars: BTreeMap<String, Value>,
    pending_jump: Option<String>,
    once_memo: FxHashSet<String>,
}

impl VarStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.vars.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Variables in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }

    pub fn to_map(&self) -> BTreeMap<String, Value> {
        self.vars.clone()
    }

    /// Drop every variable and any pending jump, then seed from `defaults`.
    /// The `once:` memo is kept.
    pub fn reset<'a, I>(&mut self, defaults: I)
    where
        I: IntoIterator<Item = (&'a String, &'a Value)>,
    {
        self.vars.clear();
        self.pending_jump = None;
        for (name, value) in defaults {
            self.vars.insert(name.clone(), value.clone());
        }
    }

    pub fn request_jump(&mut self, target: impl Into<String>) {
        self.pending_jump = Some(target.into());
    }

    /// Consume the pending jump, if any.
    pub fn take_jump(&mut self) -> Option<String> {
        self.pending_jump.take()
    }

    pub fn pending_jump(&self) -> Option<&str> {
        self.pending_jump.as_deref()
    }

    pub fn has_run_once(&self, source: &str) -> bool {
        self.once_memo.contains(source)
    }

    /// Record a `once:` body. Returns false if it was already recorded.
    pub fn mark_once(&mut self, source: &str) -> bool {
        self.once_memo.insert(source.to_string())
    }
}

impl FromIterator<(String, Value)> for VarStore {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            vars: iter.into_iter().collect(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Int(-3).is_truthy());
        assert!(Value::String("no".to_string()).is_truthy());
        assert!(Value::Bool(true).is_truthy());
    }

    #[test]
    fn literal_coercion() {
        assert_eq!(Value::from_literal("TRUE"), Value::Bool(true));
        assert_eq!(Value::from_literal(" 42 "), Value::Int(42));
        assert_eq!(Value::from_literal("2.5"), Value::Float(2.5));
        assert_eq!(Value::from_literal("\"hello\""), Value::String("hello".to_string()));
        assert_eq!(Value::from_literal("'x'"), Value::String("x".to_string()));
        assert_eq!(Value::from_literal("plain"), Value::String("plain".to_string()));
    }

    #[test]
    fn non_finite_literals_stay_text() {
        for raw in ["nan", "NaN", "inf", "-inf", "infinity", "1e999"] {
            assert_eq!(Value::from_literal(raw), Value::String(raw.to_string()), "{}", raw);
        }
    }

    #[test]
    fn display_keeps_float_fraction() {
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Int(7).to_string(), "7");
        assert_eq!(Value::Bool(true).to_string(), "true");
    }

    #[test]
    fn integer_coercion() {
        assert_eq!(Value::Float(3.9).to_integer(), Some(3));
        assert_eq!(Value::String(" 12 ".to_string()).to_integer(), Some(12));
        assert_eq!(Value::String("twelve".to_string()).to_integer(), None);
        assert_eq!(Value::Bool(true).to_integer(), None);
    }

    #[test]
    fn json_shape_is_bare_scalars() {
        let values = vec![
            Value::Int(3),
            Value::Float(1.5),
            Value::Bool(false),
            Value::String("hi".to_string()),
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"[3,1.5,false,"hi"]"#);
        let back: Vec<Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, values);
    }

    #[test]
    fn reset_keeps_once_memo() {
        let mut store = VarStore::new();
        store.set("x", Value::Int(1));
        store.request_jump("5");
        assert!(store.mark_once("x+=1"));
        assert!(!store.mark_once("x+=1"));

        let defaults = BTreeMap::from([("hp".to_string(), Value::Int(10))]);
        store.reset(&defaults);
        assert!(store.get("x").is_none());
        assert_eq!(store.get("hp"), Some(&Value::Int(10)));
        assert!(store.pending_jump().is_none());
        assert!(store.has_run_once("x+=1"));
    }
}
