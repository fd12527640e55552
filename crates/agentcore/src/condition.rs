use crate::{RuntimeState, Value};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// Comparison operators accepted in edge conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    // Two-character operators first so `<=` is not read as `<`.
    const ALL: [(&'static str, CompareOp); 6] = [
        ("==", CompareOp::Eq),
        ("!=", CompareOp::Ne),
        ("<=", CompareOp::Le),
        (">=", CompareOp::Ge),
        ("<", CompareOp::Lt),
        (">", CompareOp::Gt),
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    fn apply(&self, lhs: &Value, rhs: &Value) -> bool {
        let ord = lhs.partial_compare(rhs);
        match self {
            CompareOp::Eq => lhs.loosely_equals(rhs),
            CompareOp::Ne => !lhs.loosely_equals(rhs),
            CompareOp::Lt => ord == Some(Ordering::Less),
            CompareOp::Le => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
            CompareOp::Gt => ord == Some(Ordering::Greater),
            CompareOp::Ge => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
        }
    }
}

/// A branch condition compiled from text such as `ok`, `not done`,
/// `score >= 0.8` or `review.verdict == "accept"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    path: Vec<String>,
    negated: bool,
    comparison: Option<(CompareOp, Value)>,
}

impl Condition {
    /// Parse the closed condition grammar. Returns a reason on failure.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut expr = text.trim();
        let mut negated = false;
        if let Some(rest) = expr.strip_prefix("not ") {
            negated = true;
            expr = rest.trim();
        } else if let Some(rest) = expr.strip_prefix('!') {
            if !rest.starts_with('=') {
                negated = true;
                expr = rest.trim();
            }
        }

        let mut comparison = None;
        let mut lhs = expr;
        if let Some((pos, sym, op)) = CompareOp::ALL
            .iter()
            .filter_map(|(sym, op)| expr.find(sym).map(|pos| (pos, *sym, *op)))
            .min_by_key(|(pos, sym, _)| (*pos, std::cmp::Reverse(sym.len())))
        {
            lhs = expr[..pos].trim();
            let literal = parse_literal(expr[pos + sym.len()..].trim())?;
            comparison = Some((op, literal));
        }

        let path: Vec<String> = lhs.split('.').map(|s| s.trim().to_string()).collect();
        if path.iter().any(|segment| !is_path_segment(segment)) {
            return Err(format!("'{}' is not a state field path", lhs));
        }

        Ok(Self {
            path,
            negated,
            comparison,
        })
    }

    /// Condition that reads a single field's truthiness.
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            path: vec![name.into()],
            negated: false,
            comparison: None,
        }
    }

    /// The state field the condition reads.
    pub fn field_name(&self) -> &str {
        &self.path[0]
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Evaluate against state. A missing path evaluates as null.
    pub fn evaluate(&self, state: &RuntimeState) -> bool {
        let value = state.lookup(&self.path).unwrap_or(&Value::Null);
        let result = match &self.comparison {
            Some((op, literal)) => op.apply(value, literal),
            None => value.is_truthy(),
        };
        result != self.negated
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            f.write_str("not ")?;
        }
        f.write_str(&self.path.join("."))?;
        if let Some((op, literal)) = &self.comparison {
            match literal {
                Value::String(s) => write!(f, " {} {:?}", op.symbol(), s)?,
                other => write!(f, " {} {}", op.symbol(), other)?,
            }
        }
        Ok(())
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn is_path_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

fn parse_literal(text: &str) -> Result<Value, String> {
    match text {
        "" => return Err("comparison is missing its right-hand side".to_string()),
        "true" | "True" => return Ok(Value::Bool(true)),
        "false" | "False" => return Ok(Value::Bool(false)),
        "null" | "None" => return Ok(Value::Null),
        _ => {}
    }
    for quote in ['"', '\''] {
        if let Some(inner) = text
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return Ok(Value::String(inner.to_string()));
        }
    }
    if let Ok(n) = text.parse::<i64>() {
        return Ok(Value::Int(n));
    }
    if let Ok(n) = text.parse::<f64>() {
        return Ok(Value::Float(n));
    }
    Err(format!("'{}' is not a literal", text))
}
