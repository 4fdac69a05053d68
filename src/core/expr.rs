/// Restricted expression language: tokenizer, parser and evaluator.
///
/// Grammar (loosest binding first):
///
/// ```text
/// comparison := sum (("==" | "!=" | "<" | "<=" | ">" | ">=") sum)*
/// sum        := term (("+" | "-") term)*
/// term       := unary (("*" | "/" | "//" | "%") unary)*
/// unary      := ("+" | "-") unary | power
/// power      := primary ("**" unary)?
/// primary    := number | string | true | false | name | call | "(" comparison ")"
/// call       := builtin "(" (comparison ("," comparison)*)? ")"
/// ```
///
/// Comparisons chain: `a < b < c` means `a < b and b < c`, evaluated
/// left to right and stopping at the first false pair.

use thiserror::Error;

use crate::schema::value::{Value, VarStore};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("unsupported construct: {0}")]
    Unsupported(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("name not found: {0}")]
    NameNotFound(String),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
    #[error("{func}() expects {expected} argument(s), got {got}")]
    Arity {
        func: &'static str,
        expected: &'static str,
        got: usize,
    },
    #[error("math domain error in {0}")]
    MathDomain(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// The closed set of callable functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Sin,
    Cos,
    Tan,
    Sqrt,
    Abs,
    Min,
    Max,
    Round,
    Int,
    Float,
}

const BUILTINS: &[(&str, Builtin)] = &[
    ("sin", Builtin::Sin),
    ("cos", Builtin::Cos),
    ("tan", Builtin::Tan),
    ("sqrt", Builtin::Sqrt),
    ("abs", Builtin::Abs),
    ("min", Builtin::Min),
    ("max", Builtin::Max),
    ("round", Builtin::Round),
    ("int", Builtin::Int),
    ("float", Builtin::Float),
];

/// Words that are operators or statements elsewhere and have no meaning here.
const RESERVED_WORDS: &[&str] = &[
    "and", "or", "not", "if", "else", "in", "is", "lambda", "for", "import",
];

impl Builtin {
    pub fn from_name(name: &str) -> Option<Builtin> {
        BUILTINS
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, builtin)| *builtin)
    }

    pub fn name(&self) -> &'static str {
        BUILTINS
            .iter()
            .find(|(_, builtin)| builtin == self)
            .map(|(name, _)| *name)
            .unwrap_or("?")
    }

    fn call(self, args: &[Value]) -> Result<Value, ExprError> {
        match self {
            Self::Sin | Self::Cos | Self::Tan | Self::Sqrt => {
                let x = self.single_number(args)?;
                let result = match self {
                    Self::Sin => x.sin(),
                    Self::Cos => x.cos(),
                    Self::Tan => x.tan(),
                    _ => {
                        if x < 0.0 {
                            return Err(ExprError::MathDomain("sqrt"));
                        }
                        x.sqrt()
                    }
                };
                Ok(Value::Float(result))
            }
            Self::Abs => match self.single(args)? {
                Value::Int(n) => n.checked_abs().map(Value::Int).ok_or(ExprError::Overflow),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => Err(bad_argument(self, other)),
            },
            Self::Min | Self::Max => {
                if args.len() < 2 {
                    return Err(ExprError::Arity {
                        func: self.name(),
                        expected: "at least 2",
                        got: args.len(),
                    });
                }
                let op = if self == Self::Min { CmpOp::Lt } else { CmpOp::Gt };
                let mut best = &args[0];
                for candidate in &args[1..] {
                    if compare(op, candidate, best)? {
                        best = candidate;
                    }
                }
                Ok(best.clone())
            }
            Self::Round => round(args),
            Self::Int => match self.single(args)? {
                Value::Int(n) => Ok(Value::Int(*n)),
                Value::Float(f) => float_to_int(f.trunc()),
                Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
                Value::String(s) => s.trim().parse().map(Value::Int).map_err(|_| {
                    ExprError::TypeMismatch(format!("invalid literal for int(): '{}'", s))
                }),
            },
            Self::Float => match self.single(args)? {
                Value::Int(n) => Ok(Value::Float(*n as f64)),
                Value::Float(f) => Ok(Value::Float(*f)),
                Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
                Value::String(s) => s.trim().parse().map(Value::Float).map_err(|_| {
                    ExprError::TypeMismatch(format!("could not convert string to float: '{}'", s))
                }),
            },
        }
    }

    fn single(self, args: &[Value]) -> Result<&Value, ExprError> {
        match args {
            [only] => Ok(only),
            _ => Err(ExprError::Arity {
                func: self.name(),
                expected: "1",
                got: args.len(),
            }),
        }
    }

    fn single_number(self, args: &[Value]) -> Result<f64, ExprError> {
        let value = self.single(args)?;
        value.as_f64().ok_or_else(|| bad_argument(self, value))
    }
}

fn bad_argument(func: Builtin, value: &Value) -> ExprError {
    ExprError::TypeMismatch(format!(
        "bad argument type for {}(): {}",
        func.name(),
        value.type_name()
    ))
}

fn float_to_int(f: f64) -> Result<Value, ExprError> {
    if !f.is_finite() || f < i64::MIN as f64 || f >= i64::MAX as f64 {
        return Err(ExprError::Overflow);
    }
    Ok(Value::Int(f as i64))
}

/// `round(x)` rounds half to even and yields an integer; `round(x, n)`
/// keeps `n` decimal places.
fn round(args: &[Value]) -> Result<Value, ExprError> {
    match args {
        [Value::Int(n)] => Ok(Value::Int(*n)),
        [Value::Float(f)] => float_to_int(f.round_ties_even()),
        [x, Value::Int(places)] => {
            let places = i32::try_from(*places).map_err(|_| ExprError::Overflow)?;
            let factor = 10f64.powi(places);
            match x {
                Value::Int(n) if places >= 0 => Ok(Value::Int(*n)),
                Value::Int(n) => float_to_int((*n as f64 * factor).round_ties_even() / factor),
                Value::Float(f) => Ok(Value::Float((f * factor).round_ties_even() / factor)),
                other => Err(bad_argument(Builtin::Round, other)),
            }
        }
        [_] | [_, _] => Err(ExprError::TypeMismatch(
            "round() expects a number and an optional integer".to_string(),
        )),
        _ => Err(ExprError::Arity {
            func: "round",
            expected: "1 or 2",
            got: args.len(),
        }),
    }
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Compare {
        first: Box<Expr>,
        rest: Vec<(CmpOp, Expr)>,
    },
    Call {
        func: Builtin,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn parse(source: &str) -> Result<Expr, ExprError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(ExprError::Syntax("empty expression".to_string()));
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.comparison()?;
        if let Some(extra) = parser.peek() {
            return Err(ExprError::Syntax(format!("unexpected {:?}", extra)));
        }
        Ok(expr)
    }

    /// Evaluate against the store. Unknown names are an error, never a default.
    pub fn eval(&self, vars: &VarStore) -> Result<Value, ExprError> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Name(name) => vars
                .get(name)
                .cloned()
                .ok_or_else(|| ExprError::NameNotFound(name.clone())),
            Self::Unary { op, operand } => {
                let value = operand.eval(vars)?;
                match (op, &value) {
                    (UnaryOp::Neg, Value::Int(n)) => {
                        n.checked_neg().map(Value::Int).ok_or(ExprError::Overflow)
                    }
                    (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
                    (UnaryOp::Pos, Value::Int(_) | Value::Float(_)) => Ok(value),
                    _ => Err(ExprError::TypeMismatch(format!(
                        "bad operand type for unary {}: {}",
                        if *op == UnaryOp::Neg { "-" } else { "+" },
                        value.type_name()
                    ))),
                }
            }
            Self::Binary { op, lhs, rhs } => {
                let lhs = lhs.eval(vars)?;
                let rhs = rhs.eval(vars)?;
                binary(*op, &lhs, &rhs)
            }
            Self::Compare { first, rest } => {
                let mut left = first.eval(vars)?;
                for (op, expr) in rest {
                    let right = expr.eval(vars)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Self::Call { func, args } => {
                let values = args
                    .iter()
                    .map(|arg| arg.eval(vars))
                    .collect::<Result<Vec<_>, _>>()?;
                func.call(&values)
            }
        }
    }
}

/// Parse and evaluate in one step.
pub fn evaluate(source: &str, vars: &VarStore) -> Result<Value, ExprError> {
    Expr::parse(source)?.eval(vars)
}

/// Apply an arithmetic operator. Public so compound assignment shares it.
pub fn binary(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, ExprError> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => int_binary(op, *a, *b),
        (Value::String(a), Value::String(b)) if op == BinOp::Add => {
            Ok(Value::String(format!("{}{}", a, b)))
        }
        _ => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => float_binary(op, a, b),
            _ => Err(ExprError::TypeMismatch(format!(
                "unsupported operand types for {}: {} and {}",
                op.symbol(),
                lhs.type_name(),
                rhs.type_name()
            ))),
        },
    }
}

fn int_binary(op: BinOp, a: i64, b: i64) -> Result<Value, ExprError> {
    let checked = |result: Option<i64>| result.map(Value::Int).ok_or(ExprError::Overflow);
    match op {
        BinOp::Add => checked(a.checked_add(b)),
        BinOp::Sub => checked(a.checked_sub(b)),
        BinOp::Mul => checked(a.checked_mul(b)),
        BinOp::Div => {
            if b == 0 {
                return Err(ExprError::DivisionByZero);
            }
            Ok(Value::Float(a as f64 / b as f64))
        }
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(ExprError::DivisionByZero);
            }
            let quotient = a.checked_div(b).ok_or(ExprError::Overflow)?;
            if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) {
                Ok(Value::Int(quotient - 1))
            } else {
                Ok(Value::Int(quotient))
            }
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(ExprError::DivisionByZero);
            }
            let rem = a.wrapping_rem(b);
            if rem != 0 && ((rem < 0) != (b < 0)) {
                Ok(Value::Int(rem + b))
            } else {
                Ok(Value::Int(rem))
            }
        }
        BinOp::Pow => {
            if b >= 0 {
                let exp = u32::try_from(b).map_err(|_| ExprError::Overflow)?;
                checked(a.checked_pow(exp))
            } else if a == 0 {
                Err(ExprError::DivisionByZero)
            } else {
                Ok(Value::Float((a as f64).powf(b as f64)))
            }
        }
    }
}

fn float_binary(op: BinOp, a: f64, b: f64) -> Result<Value, ExprError> {
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div | BinOp::FloorDiv | BinOp::Mod if b == 0.0 => {
            return Err(ExprError::DivisionByZero)
        }
        BinOp::Div => a / b,
        BinOp::FloorDiv => (a / b).floor(),
        BinOp::Mod => a - b * (a / b).floor(),
        BinOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(ExprError::DivisionByZero);
            }
            let result = a.powf(b);
            if result.is_nan() && !a.is_nan() && !b.is_nan() {
                return Err(ExprError::MathDomain("**"));
            }
            result
        }
    };
    Ok(Value::Float(result))
}

/// Compare two values. Equality across unrelated types is simply false;
/// ordering across them is a type mismatch.
pub fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> Result<bool, ExprError> {
    use std::cmp::Ordering;

    let ordering: Option<Ordering> = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => {
                return match op {
                    CmpOp::Eq => Ok(false),
                    CmpOp::NotEq => Ok(true),
                    _ => Err(ExprError::TypeMismatch(format!(
                        "cannot order {} and {}",
                        lhs.type_name(),
                        rhs.type_name()
                    ))),
                };
            }
        },
    };

    // NaN compares unequal to everything.
    let Some(ordering) = ordering else {
        return Ok(op == CmpOp::NotEq);
    };
    Ok(match op {
        CmpOp::Eq => ordering == Ordering::Equal,
        CmpOp::NotEq => ordering != Ordering::Equal,
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::LtEq => ordering != Ordering::Greater,
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::GtEq => ordering != Ordering::Less,
    })
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    Cmp(CmpOp),
    LParen,
    RParen,
    Comma,
}

fn tokenize(source: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = source.chars().collect();
    let len = chars.len();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < len {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && next.is_some_and(|n| n.is_ascii_digit())) {
            let (token, end) = lex_number(&chars, i)?;
            tokens.push(token);
            i = end;
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < len && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            if RESERVED_WORDS.contains(&word.as_str()) {
                return Err(ExprError::Unsupported(format!("keyword '{}'", word)));
            }
            tokens.push(Token::Ident(word));
            continue;
        }

        if c == '"' || c == '\'' {
            let (text, end) = lex_string(&chars, i)?;
            tokens.push(Token::Str(text));
            i = end;
            continue;
        }

        let (token, width) = match (c, next) {
            ('*', Some('*')) => (Token::DoubleStar, 2),
            ('/', Some('/')) => (Token::DoubleSlash, 2),
            ('=', Some('=')) => (Token::Cmp(CmpOp::Eq), 2),
            ('!', Some('=')) => (Token::Cmp(CmpOp::NotEq), 2),
            ('<', Some('=')) => (Token::Cmp(CmpOp::LtEq), 2),
            ('>', Some('=')) => (Token::Cmp(CmpOp::GtEq), 2),
            ('<', _) => (Token::Cmp(CmpOp::Lt), 1),
            ('>', _) => (Token::Cmp(CmpOp::Gt), 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            (',', _) => (Token::Comma, 1),
            ('=', _) => return Err(ExprError::Unsupported("assignment".to_string())),
            ('.', _) => return Err(ExprError::Unsupported("attribute access".to_string())),
            ('[', _) | (']', _) => return Err(ExprError::Unsupported("indexing".to_string())),
            ('{', _) | ('}', _) => {
                return Err(ExprError::Unsupported("collection literal".to_string()))
            }
            _ => {
                return Err(ExprError::Syntax(format!(
                    "unexpected character '{}' at {}",
                    c, i
                )))
            }
        };
        tokens.push(token);
        i += width;
    }

    Ok(tokens)
}

fn lex_number(chars: &[char], start: usize) -> Result<(Token, usize), ExprError> {
    let len = chars.len();
    let mut i = start;
    let mut is_float = false;

    while i < len && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i < len && chars[i] == '.' {
        is_float = true;
        i += 1;
        while i < len && chars[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i < len && (chars[i] == 'e' || chars[i] == 'E') {
        let mut j = i + 1;
        if j < len && (chars[j] == '+' || chars[j] == '-') {
            j += 1;
        }
        if j < len && chars[j].is_ascii_digit() {
            is_float = true;
            i = j;
            while i < len && chars[i].is_ascii_digit() {
                i += 1;
            }
        }
    }

    let text: String = chars[start..i].iter().collect();
    if i < len && (chars[i].is_alphabetic() || chars[i] == '_') {
        return Err(ExprError::Syntax(format!("invalid number '{}{}'", text, chars[i])));
    }
    let token = if is_float {
        Token::Float(
            text.parse()
                .map_err(|_| ExprError::Syntax(format!("invalid number '{}'", text)))?,
        )
    } else {
        Token::Int(text.parse().map_err(|_| ExprError::Overflow)?)
    };
    Ok((token, i))
}

fn lex_string(chars: &[char], start: usize) -> Result<(String, usize), ExprError> {
    let quote = chars[start];
    let mut text = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            c if c == quote => return Ok((text, i + 1)),
            '\\' if i + 1 < chars.len() => {
                text.push(match chars[i + 1] {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                i += 2;
            }
            c => {
                text.push(c);
                i += 1;
            }
        }
    }

    Err(ExprError::Syntax("unterminated string literal".to_string()))
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn comparison(&mut self) -> Result<Expr, ExprError> {
        let first = self.sum()?;
        let mut rest = Vec::new();
        while let Some(Token::Cmp(op)) = self.peek() {
            let op = *op;
            self.pos += 1;
            rest.push((op, self.sum()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn sum(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn term(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::DoubleSlash) => BinOp::FloorDiv,
                Some(Token::Percent) => BinOp::Mod,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        let op = match self.peek() {
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Plus) => UnaryOp::Pos,
            _ => return self.power(),
        };
        self.pos += 1;
        Ok(Expr::Unary {
            op,
            operand: Box::new(self.unary()?),
        })
    }

    fn power(&mut self) -> Result<Expr, ExprError> {
        let base = self.primary()?;
        if self.eat(&Token::DoubleStar) {
            // Right-associative, and the exponent may carry its own sign.
            let exponent = self.unary()?;
            return Ok(Expr::Binary {
                op: BinOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        match self.advance() {
            Some(Token::Int(n)) => Ok(Expr::Literal(Value::Int(n))),
            Some(Token::Float(f)) => Ok(Expr::Literal(Value::Float(f))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Ident(name)) => {
                if self.eat(&Token::LParen) {
                    let func = Builtin::from_name(&name)
                        .ok_or_else(|| ExprError::UnknownFunction(name.clone()))?;
                    let args = self.arguments()?;
                    return Ok(Expr::Call { func, args });
                }
                Ok(match name.as_str() {
                    "true" | "True" => Expr::Literal(Value::Bool(true)),
                    "false" | "False" => Expr::Literal(Value::Bool(false)),
                    _ => Expr::Name(name),
                })
            }
            Some(Token::LParen) => {
                let inner = self.comparison()?;
                if !self.eat(&Token::RParen) {
                    return Err(ExprError::Syntax("expected ')'".to_string()));
                }
                Ok(inner)
            }
            Some(other) => Err(ExprError::Syntax(format!("unexpected {:?}", other))),
            None => Err(ExprError::Syntax("unexpected end of expression".to_string())),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ExprError> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.comparison()?);
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            if !self.eat(&Token::Comma) {
                return Err(ExprError::Syntax("expected ',' or ')' in call".to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> VarStore {
        [
            ("x".to_string(), Value::Int(5)),
            ("gold".to_string(), Value::Int(120)),
            ("ratio".to_string(), Value::Float(0.5)),
            ("name".to_string(), Value::String("Ada".to_string())),
            ("lit".to_string(), Value::Bool(true)),
        ]
        .into_iter()
        .collect()
    }

    fn eval(src: &str) -> Result<Value, ExprError> {
        evaluate(src, &store())
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(eval("2 + 3 * 4"), Ok(Value::Int(14)));
        assert_eq!(eval("(2 + 3) * 4"), Ok(Value::Int(20)));
        assert_eq!(eval("-2 ** 2"), Ok(Value::Int(-4)));
        assert_eq!(eval("2 ** 3 ** 2"), Ok(Value::Int(512)));
        assert_eq!(eval("2 ** -1"), Ok(Value::Float(0.5)));
        assert_eq!(eval("x * ratio"), Ok(Value::Float(2.5)));
    }

    #[test]
    fn division_family_floors() {
        assert_eq!(eval("7 / 2"), Ok(Value::Float(3.5)));
        assert_eq!(eval("7 // 2"), Ok(Value::Int(3)));
        assert_eq!(eval("-7 // 2"), Ok(Value::Int(-4)));
        assert_eq!(eval("-7 % 3"), Ok(Value::Int(2)));
        assert_eq!(eval("7 % -3"), Ok(Value::Int(-2)));
        assert_eq!(eval("7.5 // 2"), Ok(Value::Float(3.0)));
        assert_eq!(eval("1 / 0"), Err(ExprError::DivisionByZero));
        assert_eq!(eval("1 % 0"), Err(ExprError::DivisionByZero));
    }

    #[test]
    fn chained_comparison() {
        assert_eq!(eval("1 < x < 10"), Ok(Value::Bool(true)));
        assert_eq!(eval("1 < x < 4"), Ok(Value::Bool(false)));
        assert_eq!(eval("10 > x >= 5"), Ok(Value::Bool(true)));
        // Stops at the first false pair, so the unknown name is never read.
        assert_eq!(eval("1 > 2 < missing"), Ok(Value::Bool(false)));
    }

    #[test]
    fn equality_across_types() {
        assert_eq!(eval("x == 5.0"), Ok(Value::Bool(true)));
        assert_eq!(eval("name == 'Ada'"), Ok(Value::Bool(true)));
        assert_eq!(eval("name == \"Ada\""), Ok(Value::Bool(true)));
        assert_eq!(eval("name == 5"), Ok(Value::Bool(false)));
        assert_eq!(eval("name != 5"), Ok(Value::Bool(true)));
        assert!(matches!(eval("name < 5"), Err(ExprError::TypeMismatch(_))));
    }

    #[test]
    fn unknown_name_is_an_error() {
        assert_eq!(eval("missing + 1"), Err(ExprError::NameNotFound("missing".to_string())));
    }

    #[test]
    fn rejects_constructs_outside_grammar() {
        assert!(matches!(eval("name.upper"), Err(ExprError::Unsupported(_))));
        assert!(matches!(eval("x[0]"), Err(ExprError::Unsupported(_))));
        assert!(matches!(eval("x = 1"), Err(ExprError::Unsupported(_))));
        assert!(matches!(eval("x and lit"), Err(ExprError::Unsupported(_))));
        assert_eq!(eval("open(1)"), Err(ExprError::UnknownFunction("open".to_string())));
        assert!(matches!(eval("1 +"), Err(ExprError::Syntax(_))));
        assert!(matches!(eval("(1 + 2"), Err(ExprError::Syntax(_))));
        assert!(matches!(eval("1 2"), Err(ExprError::Syntax(_))));
        assert!(matches!(eval(""), Err(ExprError::Syntax(_))));
    }

    #[test]
    fn builtins() {
        assert_eq!(eval("max(1, 2.5, x)"), Ok(Value::Int(5)));
        assert_eq!(eval("min(gold, 100)"), Ok(Value::Int(100)));
        assert_eq!(eval("abs(-3)"), Ok(Value::Int(3)));
        assert_eq!(eval("round(2.5)"), Ok(Value::Int(2)));
        assert_eq!(eval("round(3.5)"), Ok(Value::Int(4)));
        assert_eq!(eval("round(2.345, 2)"), Ok(Value::Float(2.35)));
        assert_eq!(eval("int('12') + 1"), Ok(Value::Int(13)));
        assert_eq!(eval("int(-3.7)"), Ok(Value::Int(-3)));
        assert_eq!(eval("float(x)"), Ok(Value::Float(5.0)));
        assert_eq!(eval("sqrt(16)"), Ok(Value::Float(4.0)));
        assert_eq!(eval("sin(0)"), Ok(Value::Float(0.0)));
        assert_eq!(eval("sqrt(-1)"), Err(ExprError::MathDomain("sqrt")));
        assert!(matches!(eval("min(1)"), Err(ExprError::Arity { .. })));
        assert!(matches!(eval("abs(1, 2)"), Err(ExprError::Arity { .. })));
    }

    #[test]
    fn strings_and_bools() {
        assert_eq!(eval("name + '!'"), Ok(Value::String("Ada!".to_string())));
        assert_eq!(eval("lit == True"), Ok(Value::Bool(true)));
        assert_eq!(eval("'a\\'b'"), Ok(Value::String("a'b".to_string())));
        assert!(matches!(eval("name + 1"), Err(ExprError::TypeMismatch(_))));
        assert!(matches!(eval("lit + 1"), Err(ExprError::TypeMismatch(_))));
        assert!(matches!(eval("-name"), Err(ExprError::TypeMismatch(_))));
    }

    #[test]
    fn overflow_is_reported() {
        assert_eq!(eval("9223372036854775807 + 1"), Err(ExprError::Overflow));
        assert_eq!(eval("2 ** 64"), Err(ExprError::Overflow));
    }

    #[test]
    fn parsed_expression_is_reusable() {
        let expr = Expr::parse("x + 1").unwrap();
        let mut vars = store();
        assert_eq!(expr.eval(&vars), Ok(Value::Int(6)));
        vars.set("x", Value::Int(10));
        assert_eq!(expr.eval(&vars), Ok(Value::Int(11)));
    }
}
