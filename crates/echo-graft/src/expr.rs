// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Expression evaluation seam used by attribute criteria and operations.
//!
//! The engine does not own an expression language. It consumes an
//! [`Evaluator`] and ships [`DefaultEvaluator`], which understands literals,
//! `$variable` references and `+`/`-` chains; callers with a richer language
//! plug in their own implementation.
use thiserror::Error;

use crate::value::Value;

/// Errors raised while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// The expression text could not be parsed.
    #[error("cannot parse expression `{expression}`: {reason}")]
    Parse {
        /// Offending expression text.
        expression: String,
        /// Parser diagnostic.
        reason: String,
    },
    /// A `$name` reference had no binding in scope.
    #[error("unbound variable `${0}`")]
    Unbound(String),
    /// Operands of `+`/`-` had incompatible kinds.
    #[error("type mismatch: cannot apply `{op}` to {lhs} and {rhs}")]
    TypeMismatch {
        /// Operator symbol.
        op: char,
        /// Left operand rendering.
        lhs: String,
        /// Right operand rendering.
        rhs: String,
    },
    /// Integer overflow during arithmetic.
    #[error("integer overflow evaluating `{0}`")]
    Overflow(String),
}

/// Variable lookup used during evaluation.
pub trait Scope {
    /// Returns the value bound to `name`, if any.
    fn lookup(&self, name: &str) -> Option<Value>;
}

impl<F> Scope for F
where
    F: Fn(&str) -> Option<Value>,
{
    fn lookup(&self, name: &str) -> Option<Value> {
        self(name)
    }
}

/// Scope with no bindings.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyScope;

impl Scope for EmptyScope {
    fn lookup(&self, _name: &str) -> Option<Value> {
        None
    }
}

/// Evaluates expression strings against a [`Scope`].
pub trait Evaluator {
    /// Evaluates `expression`, resolving variables through `scope`.
    fn evaluate(&self, expression: &str, scope: &dyn Scope) -> Result<Value, EvalError>;

    /// Checks that `expression` is well formed without evaluating it.
    ///
    /// Called once per criterion when a pattern is compiled.
    fn validate(&self, expression: &str) -> Result<(), EvalError> {
        let _ = expression;
        Ok(())
    }
}

/// Minimal evaluator: literals, `$var`, parentheses and `+`/`-`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEvaluator;

impl Evaluator for DefaultEvaluator {
    fn evaluate(&self, expression: &str, scope: &dyn Scope) -> Result<Value, EvalError> {
        parse(expression)?.eval(scope, expression)
    }

    fn validate(&self, expression: &str) -> Result<(), EvalError> {
        parse(expression).map(|_| ())
    }
}

/// Returns the variable name when `expression` is exactly one `$name`.
///
/// Such expressions bind the variable on first use instead of requiring
/// equality.
pub fn free_variable(expression: &str) -> Option<&str> {
    let name = expression.trim().strip_prefix('$')?;
    (!name.is_empty() && name.chars().all(is_ident_char)).then_some(name)
}

/// Names of every `$var` referenced by `expression`, in order of appearance.
pub fn referenced_variables(expression: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = expression.chars().peekable();
    let mut in_string = false;
    while let Some(c) = chars.next() {
        match c {
            '"' => in_string = !in_string,
            '\\' if in_string => {
                chars.next();
            }
            '$' if !in_string => {
                let mut name = String::new();
                while let Some(&n) = chars.peek() {
                    if !is_ident_char(n) {
                        break;
                    }
                    name.push(n);
                    chars.next();
                }
                if !name.is_empty() && !out.contains(&name) {
                    out.push(name);
                }
            }
            _ => {}
        }
    }
    out
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Variable(String),
    Binary(Box<Expr>, char, Box<Expr>),
}

impl Expr {
    fn eval(&self, scope: &dyn Scope, source: &str) -> Result<Value, EvalError> {
        match self {
            Self::Literal(v) => Ok(v.clone()),
            Self::Variable(name) => scope
                .lookup(name)
                .ok_or_else(|| EvalError::Unbound(name.clone())),
            Self::Binary(lhs, op, rhs) => {
                let l = lhs.eval(scope, source)?;
                let r = rhs.eval(scope, source)?;
                combine(&l, *op, &r, source)
            }
        }
    }
}

fn combine(lhs: &Value, op: char, rhs: &Value, source: &str) -> Result<Value, EvalError> {
    match (lhs, op, rhs) {
        (Value::Int(a), '+', Value::Int(b)) => a
            .checked_add(*b)
            .map(Value::Int)
            .ok_or_else(|| EvalError::Overflow(source.to_owned())),
        (Value::Int(a), '-', Value::Int(b)) => a
            .checked_sub(*b)
            .map(Value::Int)
            .ok_or_else(|| EvalError::Overflow(source.to_owned())),
        (Value::Str(a), '+', b) => Ok(Value::Str(format!("{a}{}", plain(b)))),
        (a, '+', Value::Str(b)) => Ok(Value::Str(format!("{}{b}", plain(a)))),
        _ => Err(EvalError::TypeMismatch {
            op,
            lhs: lhs.to_string(),
            rhs: rhs.to_string(),
        }),
    }
}

fn plain(v: &Value) -> String {
    match v {
        Value::Str(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse(source: &str) -> Result<Expr, EvalError> {
    let mut parser = Parser {
        src: source,
        chars: source.char_indices().collect(),
        pos: 0,
    };
    let expr = parser.expr()?;
    parser.skip_ws();
    if parser.pos < parser.chars.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

struct Parser<'a> {
    src: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, reason: &str) -> EvalError {
        let at = self.chars.get(self.pos).map_or(self.src.len(), |(i, _)| *i);
        EvalError::Parse {
            expression: self.src.to_owned(),
            reason: format!("{reason} at offset {at}"),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expr(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.term()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some(op @ ('+' | '-')) => {
                    self.pos += 1;
                    let rhs = self.term()?;
                    lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn term(&mut self) -> Result<Expr, EvalError> {
        self.skip_ws();
        match self.peek() {
            None => Err(self.error("expected a term")),
            Some('(') => {
                self.pos += 1;
                let inner = self.expr()?;
                self.skip_ws();
                if self.peek() != Some(')') {
                    return Err(self.error("expected `)`"));
                }
                self.pos += 1;
                Ok(inner)
            }
            Some('"') => self.string(),
            Some('$') => {
                self.pos += 1;
                let name = self.word();
                if name.is_empty() {
                    return Err(self.error("expected a variable name after `$`"));
                }
                Ok(Expr::Variable(name))
            }
            Some('-') if self.chars.get(self.pos + 1).is_some_and(|(_, c)| c.is_ascii_digit()) => {
                self.pos += 1;
                let word = format!("-{}", self.word());
                Ok(Expr::Literal(literal(&word)))
            }
            Some(c) if is_ident_char(c) || c == '.' => {
                let word = self.word();
                Ok(Expr::Literal(literal(&word)))
            }
            Some(_) => Err(self.error("unexpected character")),
        }
    }

    fn word(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if !(is_ident_char(c) || c == '.') {
                break;
            }
            out.push(c);
            self.pos += 1;
        }
        out
    }

    fn string(&mut self) -> Result<Expr, EvalError> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string literal")),
                Some('"') => {
                    self.pos += 1;
                    return Ok(Expr::Literal(Value::Str(out)));
                }
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(c) => out.push(c),
                        None => return Err(self.error("dangling escape")),
                    }
                    self.pos += 1;
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }
}

fn literal(word: &str) -> Value {
    if let Ok(n) = word.parse::<i64>() {
        return Value::Int(n);
    }
    match word {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::Str(word.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(src: &str) -> Result<Value, EvalError> {
        let scope = |name: &str| (name == "x").then_some(Value::Int(4));
        DefaultEvaluator.evaluate(src, &scope)
    }

    #[test]
    fn literals_and_arithmetic() {
        assert_eq!(eval("5"), Ok(Value::Int(5)));
        assert_eq!(eval("-2 + 7"), Ok(Value::Int(5)));
        assert_eq!(eval("$x - 1"), Ok(Value::Int(3)));
        assert_eq!(eval("\"a\" + $x"), Ok(Value::from("a4")));
        assert_eq!(eval("Ramp"), Ok(Value::from("Ramp")));
        assert_eq!(eval("(1 + 2) - 3"), Ok(Value::Int(0)));
    }

    #[test]
    fn negative_words_read_like_positive_ones() {
        assert_eq!(eval("5.0"), Ok(Value::from("5.0")));
        assert_eq!(eval("-5.0"), Ok(Value::from("-5.0")));
        assert_eq!(eval("-9223372036854775808"), Ok(Value::Int(i64::MIN)));
        assert_eq!(eval("3 -4"), Ok(Value::Int(-1)));
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        assert!(matches!(eval("\"open"), Err(EvalError::Parse { .. })));
        assert!(matches!(eval("1 +"), Err(EvalError::Parse { .. })));
        assert!(matches!(eval("(1"), Err(EvalError::Parse { .. })));
        assert_eq!(eval("$y"), Err(EvalError::Unbound("y".into())));
        assert!(matches!(eval("true - 1"), Err(EvalError::TypeMismatch { .. })));
    }

    #[test]
    fn free_variables_are_detected() {
        assert_eq!(free_variable(" $v "), Some("v"));
        assert_eq!(free_variable("$v + 1"), None);
        assert_eq!(free_variable("v"), None);
        assert_eq!(referenced_variables("$a + \"$b\" + $c"), vec!["a", "c"]);
    }
}
