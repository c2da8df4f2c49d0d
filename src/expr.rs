//! Hosted expression grammar for configuration values
//!
//! Configuration may compute a value from other instances with a small
//! expression language instead of embedding a full evaluator: literals,
//! identifiers, attribute access off the reserved `refs` holder (or any map),
//! unary minus and `+ - * /` with the usual precedence.
//!
//! Dependencies are extracted once, syntactically, at parse time: every free
//! identifier (other than `refs` itself) and every attribute accessed
//! directly on `refs` names an instance the expression needs.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use indexmap::IndexMap;

use crate::error::{DiError, Result};
use crate::value::Value;

/// Identifier the resolved dependencies are bound to inside expressions.
pub const REF_HOLDER: &str = "refs";

/// A parsed configuration expression with its pre-computed dependency set.
#[derive(Clone)]
pub struct Expression {
    code: String,
    root: Node,
    deps: BTreeSet<String>,
}

impl Expression {
    /// Parse expression text; malformed text is a configuration error.
    pub fn parse(code: &str) -> Result<Self> {
        let tokens = lex(code).map_err(|reason| malformed(code, &reason))?;
        let mut parser = Parser { tokens, pos: 0 };
        let root = parser.expression().map_err(|reason| malformed(code, &reason))?;
        if parser.pos != parser.tokens.len() {
            return Err(malformed(code, "unexpected trailing input"));
        }

        let mut deps = BTreeSet::new();
        collect_deps(&root, &mut deps);

        Ok(Self {
            code: code.to_owned(),
            root,
            deps,
        })
    }

    /// Instance names this expression needs resolved before evaluation.
    #[inline]
    pub fn deps(&self) -> &BTreeSet<String> {
        &self.deps
    }

    #[inline]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Evaluate against resolved dependency values.
    ///
    /// The map must cover at least [`Expression::deps`].
    pub fn eval(&self, resolved: &HashMap<String, Value>) -> Result<Value> {
        eval_node(&self.root, resolved).map_err(|reason| DiError::ExpressionFailed {
            code: self.code.clone(),
            reason,
        })
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression")
            .field("code", &self.code)
            .field("deps", &self.deps)
            .finish()
    }
}

fn malformed(code: &str, reason: &str) -> DiError {
    DiError::invalid_config(format!("malformed expression {code:?}: {reason}"))
}

// =============================================================================
// Syntax tree
// =============================================================================

#[derive(Clone, Debug)]
enum Node {
    Literal(Value),
    Name(String),
    Attr(Box<Node>, String),
    Neg(Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

fn collect_deps(node: &Node, deps: &mut BTreeSet<String>) {
    match node {
        Node::Literal(_) => {}
        Node::Name(name) => {
            if name != REF_HOLDER {
                deps.insert(name.clone());
            }
        }
        Node::Attr(base, attr) => {
            if let Node::Name(name) = base.as_ref() {
                if name == REF_HOLDER {
                    deps.insert(attr.clone());
                    return;
                }
            }
            collect_deps(base, deps);
        }
        Node::Neg(inner) => collect_deps(inner, deps),
        Node::Binary(_, lhs, rhs) => {
            collect_deps(lhs, deps);
            collect_deps(rhs, deps);
        }
    }
}

// =============================================================================
// Lexer
// =============================================================================

#[derive(Clone, Debug, PartialEq)]
enum Tok {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Dot,
    LParen,
    RParen,
}

fn lex(code: &str) -> std::result::Result<Vec<Tok>, String> {
    let mut tokens = Vec::new();
    let mut chars = code.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Tok::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Tok::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Tok::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Tok::Slash);
            }
            '.' => {
                chars.next();
                tokens.push(Tok::Dot);
            }
            '(' => {
                chars.next();
                tokens.push(Tok::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Tok::RParen);
            }
            '\'' | '"' => {
                let quote = ch;
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        None => return Err("unterminated string".to_owned()),
                        Some(c) if c == quote => break,
                        Some('\\') => match chars.next() {
                            Some('n') => text.push('\n'),
                            Some('t') => text.push('\t'),
                            Some(escaped) => text.push(escaped),
                            None => return Err("unterminated string".to_owned()),
                        },
                        Some(c) => text.push(c),
                    }
                }
                tokens.push(Tok::Str(text));
            }
            '0'..='9' => {
                let mut digits = String::new();
                let mut is_float = false;
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() {
                        digits.push(c);
                        chars.next();
                    } else if c == '.' && !is_float {
                        // Lookahead: a digit must follow, otherwise this dot
                        // is attribute access on a number, which we reject.
                        let mut ahead = chars.clone();
                        ahead.next();
                        match ahead.peek() {
                            Some(d) if d.is_ascii_digit() => {
                                is_float = true;
                                digits.push(c);
                                chars.next();
                            }
                            _ => break,
                        }
                    } else {
                        break;
                    }
                }
                if is_float {
                    let value: f64 = digits
                        .parse()
                        .map_err(|_| format!("bad number {digits:?}"))?;
                    tokens.push(Tok::Float(value));
                } else {
                    let value: i64 = digits
                        .parse()
                        .map_err(|_| format!("bad number {digits:?}"))?;
                    tokens.push(Tok::Int(value));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Tok::Ident(ident));
            }
            other => return Err(format!("unexpected character {other:?}")),
        }
    }

    Ok(tokens)
}

// =============================================================================
// Parser
// =============================================================================

struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, tok: &Tok) -> std::result::Result<(), String> {
        match self.next() {
            Some(found) if found == *tok => Ok(()),
            Some(found) => Err(format!("expected {tok:?}, found {found:?}")),
            None => Err(format!("expected {tok:?}, found end of input")),
        }
    }

    // expression := term (('+' | '-') term)*
    fn expression(&mut self) -> std::result::Result<Node, String> {
        let mut node = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => BinOp::Add,
                Some(Tok::Minus) => BinOp::Sub,
                _ => break,
            };
            self.next();
            let rhs = self.term()?;
            node = Node::Binary(op, Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    // term := unary (('*' | '/') unary)*
    fn term(&mut self) -> std::result::Result<Node, String> {
        let mut node = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => BinOp::Mul,
                Some(Tok::Slash) => BinOp::Div,
                _ => break,
            };
            self.next();
            let rhs = self.unary()?;
            node = Node::Binary(op, Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    // unary := '-' unary | postfix
    fn unary(&mut self) -> std::result::Result<Node, String> {
        if matches!(self.peek(), Some(Tok::Minus)) {
            self.next();
            let inner = self.unary()?;
            return Ok(Node::Neg(Box::new(inner)));
        }
        self.postfix()
    }

    // postfix := primary ('.' ident)*
    fn postfix(&mut self) -> std::result::Result<Node, String> {
        let mut node = self.primary()?;
        while matches!(self.peek(), Some(Tok::Dot)) {
            self.next();
            match self.next() {
                Some(Tok::Ident(attr)) => {
                    node = Node::Attr(Box::new(node), attr);
                }
                other => return Err(format!("expected attribute name, found {other:?}")),
            }
        }
        Ok(node)
    }

    fn primary(&mut self) -> std::result::Result<Node, String> {
        match self.next() {
            Some(Tok::Int(v)) => Ok(Node::Literal(Value::Int(v))),
            Some(Tok::Float(v)) => Ok(Node::Literal(Value::Float(v))),
            Some(Tok::Str(v)) => Ok(Node::Literal(Value::Str(v))),
            Some(Tok::Ident(ident)) => match ident.as_str() {
                "true" => Ok(Node::Literal(Value::Bool(true))),
                "false" => Ok(Node::Literal(Value::Bool(false))),
                "null" => Ok(Node::Literal(Value::Null)),
                _ => Ok(Node::Name(ident)),
            },
            Some(Tok::LParen) => {
                let node = self.expression()?;
                self.expect(&Tok::RParen)?;
                Ok(node)
            }
            Some(other) => Err(format!("unexpected token {other:?}")),
            None => Err("unexpected end of input".to_owned()),
        }
    }
}

// =============================================================================
// Evaluation
// =============================================================================

fn eval_node(
    node: &Node,
    resolved: &HashMap<String, Value>,
) -> std::result::Result<Value, String> {
    match node {
        Node::Literal(value) => Ok(value.clone()),
        Node::Name(name) if name == REF_HOLDER => {
            let mut entries: IndexMap<String, Value> = IndexMap::new();
            let mut names: Vec<&String> = resolved.keys().collect();
            names.sort();
            for name in names {
                entries.insert(name.clone(), resolved[name].clone());
            }
            Ok(Value::Map(entries))
        }
        Node::Name(name) => resolved
            .get(name)
            .cloned()
            .ok_or_else(|| format!("unknown name {name:?}")),
        Node::Attr(base, attr) => {
            // Attribute access on the holder short-circuits to the resolved
            // instance so `refs.x` works without materializing the map.
            if let Node::Name(name) = base.as_ref() {
                if name == REF_HOLDER {
                    return resolved
                        .get(attr)
                        .cloned()
                        .ok_or_else(|| format!("unknown name {attr:?}"));
                }
            }
            let value = eval_node(base, resolved)?;
            match value {
                Value::Map(entries) => entries
                    .get(attr)
                    .cloned()
                    .ok_or_else(|| format!("no attribute {attr:?} on map")),
                other => Err(format!("no attribute {attr:?} on {other}")),
            }
        }
        Node::Neg(inner) => match eval_node(inner, resolved)? {
            Value::Int(v) => Ok(Value::Int(-v)),
            Value::Float(v) => Ok(Value::Float(-v)),
            other => Err(format!("cannot negate {other}")),
        },
        Node::Binary(op, lhs, rhs) => {
            let lhs = eval_node(lhs, resolved)?;
            let rhs = eval_node(rhs, resolved)?;
            apply_binary(*op, lhs, rhs)
        }
    }
}

fn apply_binary(op: BinOp, lhs: Value, rhs: Value) -> std::result::Result<Value, String> {
    match (op, &lhs, &rhs) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => {
            let mut joined = a.clone();
            joined.push_str(b);
            Ok(Value::Str(joined))
        }
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            let mut joined = a.clone();
            joined.extend(b.iter().cloned());
            Ok(Value::List(joined))
        }
        (BinOp::Add, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
        (BinOp::Sub, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a - b)),
        (BinOp::Mul, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a * b)),
        _ => {
            let a = lhs
                .as_float()
                .ok_or_else(|| format!("cannot apply {op:?} to {lhs}"))?;
            let b = rhs
                .as_float()
                .ok_or_else(|| format!("cannot apply {op:?} to {rhs}"))?;
            match op {
                BinOp::Add => Ok(Value::Float(a + b)),
                BinOp::Sub => Ok(Value::Float(a - b)),
                BinOp::Mul => Ok(Value::Float(a * b)),
                BinOp::Div => {
                    if b == 0.0 {
                        Err("division by zero".to_owned())
                    } else {
                        // Division always yields a float, even for ints.
                        Ok(Value::Float(a / b))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), value.clone()))
            .collect()
    }

    #[test]
    fn free_identifiers_are_deps() {
        let expr = Expression::parse("a + b * 2").unwrap();
        let deps: Vec<&String> = expr.deps().iter().collect();
        assert_eq!(deps, ["a", "b"]);
    }

    #[test]
    fn holder_attributes_are_deps() {
        let expr = Expression::parse("refs.dep1 + refs.dep2").unwrap();
        assert!(expr.deps().contains("dep1"));
        assert!(expr.deps().contains("dep2"));
        assert!(!expr.deps().contains(REF_HOLDER));
    }

    #[test]
    fn literal_expression_has_no_deps() {
        let expr = Expression::parse("123").unwrap();
        assert!(expr.deps().is_empty());
        assert_eq!(expr.eval(&HashMap::new()).unwrap(), Value::Int(123));
    }

    #[test]
    fn arithmetic_precedence() {
        let expr = Expression::parse("1 + 2 * 3").unwrap();
        assert_eq!(expr.eval(&HashMap::new()).unwrap(), Value::Int(7));

        let expr = Expression::parse("(1 + 2) * 3").unwrap();
        assert_eq!(expr.eval(&HashMap::new()).unwrap(), Value::Int(9));
    }

    #[test]
    fn identifiers_evaluate_to_instances() {
        let expr = Expression::parse("a + b").unwrap();
        let result = expr
            .eval(&env(&[("a", Value::Int(7)), ("b", Value::Int(1))]))
            .unwrap();
        assert_eq!(result, Value::Int(8));
    }

    #[test]
    fn holder_attribute_access() {
        let expr = Expression::parse("refs.first - refs.second").unwrap();
        let result = expr
            .eval(&env(&[
                ("first", Value::Int(10)),
                ("second", Value::Int(4)),
            ]))
            .unwrap();
        assert_eq!(result, Value::Int(6));
    }

    #[test]
    fn string_concatenation() {
        let expr = Expression::parse("greeting + ', ' + name").unwrap();
        let result = expr
            .eval(&env(&[
                ("greeting", Value::from("hello")),
                ("name", Value::from("world")),
            ]))
            .unwrap();
        assert_eq!(result, Value::from("hello, world"));
    }

    #[test]
    fn division_yields_float() {
        let expr = Expression::parse("7 / 2").unwrap();
        assert_eq!(expr.eval(&HashMap::new()).unwrap(), Value::Float(3.5));
    }

    #[test]
    fn division_by_zero_fails() {
        let expr = Expression::parse("1 / 0").unwrap();
        let err = expr.eval(&HashMap::new()).unwrap_err();
        assert!(matches!(err, DiError::ExpressionFailed { .. }));
    }

    #[test]
    fn attribute_access_on_map_value() {
        let mut entries = IndexMap::new();
        entries.insert("port".to_owned(), Value::Int(5432));
        let expr = Expression::parse("db.port").unwrap();
        assert!(expr.deps().contains("db"));
        let result = expr.eval(&env(&[("db", Value::Map(entries))])).unwrap();
        assert_eq!(result, Value::Int(5432));
    }

    #[test]
    fn unary_minus() {
        let expr = Expression::parse("-x + 1").unwrap();
        let result = expr.eval(&env(&[("x", Value::Int(5))])).unwrap();
        assert_eq!(result, Value::Int(-4));
    }

    #[test]
    fn malformed_expression_is_config_error() {
        for code in ["1 +", "(1", "a b", "#nope", "'unterminated"] {
            let err = Expression::parse(code).unwrap_err();
            assert!(err.is_config_error(), "{code}");
        }
    }

    #[test]
    fn type_mismatch_is_eval_error() {
        let expr = Expression::parse("a + 1").unwrap();
        let err = expr.eval(&env(&[("a", Value::from("one"))])).unwrap_err();
        assert!(matches!(err, DiError::ExpressionFailed { .. }));
    }
}
