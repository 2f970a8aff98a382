//! Sandboxed numeric expressions for function-mode quantities.
//!
//! An expression is a function of the single argument `t` (seconds). Every
//! other identifier is a dependency resolved through [`Bindings`]: quantity
//! names bind to their constant value, marker names to their instant in
//! seconds, and console variables to their value. Unbound names fall back to
//! the built-in constants `pi`, `e` and `tau`.
//!
//! # Memoization
//!
//! The dependency list is extracted once, when the text is parsed. Each
//! evaluation resolves the dependencies to a value vector and reuses the
//! cached [`Compiled`] form only if that vector is identical to the one it was
//! compiled against, so edits to a marker or quantity are picked up without
//! recompiling on every sample.
//!
//! # Grammar
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '%') unary)*
//! unary   := ('+' | '-') unary | power
//! power   := atom (('^' | '**') unary)?
//! atom    := number | name | name '(' expr (',' expr)* ')' | '(' expr ')'
//! ```

mod builtins;
mod eval;
mod lexer;
mod parser;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::BuildHasher;
use std::rc::Rc;

use indexmap::IndexMap;
use thiserror::Error;

pub use builtins::{Arity, Builtin, constant};
pub use eval::Compiled;
pub use lexer::{Token, tokenize};
pub use parser::{MAX_DEPTH, parse};

/// Name of the time argument, in seconds.
pub const TIME_ARG: &str = "t";

/// Errors from parsing or evaluating an expression.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExprError {
    #[error("unexpected character {found:?} at {position}")]
    UnexpectedCharacter { found: String, position: usize },

    #[error("unexpected {found} at {position}")]
    UnexpectedToken { found: String, position: usize },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("expression is empty")]
    Empty,

    #[error("expression nests deeper than {limit} levels")]
    TooDeep { limit: usize },

    #[error("unknown function {name:?}")]
    UnknownFunction { name: String },

    #[error("function {function} does not take {found} argument(s)")]
    Arity { function: &'static str, found: usize },

    #[error("name {name:?} is not defined")]
    Unbound { name: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not a finite number at t = {t}")]
    NonFinite { t: f64 },
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Name(String),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        func: Builtin,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

impl Expr {
    /// Free names other than [`TIME_ARG`], in order of first appearance.
    pub fn dependencies(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names(&self, names: &mut Vec<String>) {
        match self {
            Self::Number(_) => {}
            Self::Name(name) => {
                if name != TIME_ARG && !names.contains(name) {
                    names.push(name.clone());
                }
            }
            Self::Neg(operand) => operand.collect_names(names),
            Self::Binary { left, right, .. } => {
                left.collect_names(names);
                right.collect_names(names);
            }
            Self::Call { args, .. } => {
                for arg in args {
                    arg.collect_names(names);
                }
            }
        }
    }
}

/// Source of values for an expression's free names.
pub trait Bindings {
    fn lookup(&self, name: &str) -> Option<f64>;
}

impl<S: BuildHasher> Bindings for HashMap<String, f64, S> {
    fn lookup(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

impl Bindings for IndexMap<String, f64> {
    fn lookup(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

/// A parsed expression with its dependency list and compile cache.
#[derive(Clone)]
pub struct Expression {
    text: String,
    ast: Expr,
    dependencies: Vec<String>,
    cache: RefCell<Option<Rc<Compiled>>>,
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression")
            .field("text", &self.text)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

impl Expression {
    /// Parses `text` and extracts its dependencies.
    pub fn parse(text: &str) -> Result<Self, ExprError> {
        let ast = parse(text)?;
        let dependencies = ast.dependencies();
        Ok(Self {
            text: text.to_string(),
            ast,
            dependencies,
            cache: RefCell::new(None),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub const fn ast(&self) -> &Expr {
        &self.ast
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Whether `name` appears as a free name in the expression.
    pub fn depends_on(&self, name: &str) -> bool {
        self.dependencies.iter().any(|dep| dep == name)
    }

    /// Resolves the dependencies and returns the compiled form, reusing the
    /// cached one when every bound value is unchanged.
    pub fn bind<B: Bindings + ?Sized>(&self, bindings: &B) -> Result<Rc<Compiled>, ExprError> {
        let env = self.resolve(bindings)?;
        if let Some(compiled) = self.cache.borrow().as_ref() {
            if compiled.env() == env.as_slice() {
                return Ok(Rc::clone(compiled));
            }
        }

        let compiled = Rc::new(Compiled::new(&self.ast, &self.dependencies, env));
        tracing::debug!(expression = %self.text, "compiled expression");
        *self.cache.borrow_mut() = Some(Rc::clone(&compiled));
        Ok(compiled)
    }

    /// Evaluates at `t` seconds.
    pub fn evaluate<B: Bindings + ?Sized>(&self, t: f64, bindings: &B) -> Result<f64, ExprError> {
        self.bind(bindings)?.eval(t)
    }

    /// Whether a compiled form is currently cached.
    pub fn is_compiled(&self) -> bool {
        self.cache.borrow().is_some()
    }

    fn resolve<B: Bindings + ?Sized>(&self, bindings: &B) -> Result<Vec<f64>, ExprError> {
        self.dependencies
            .iter()
            .map(|name| {
                bindings
                    .lookup(name)
                    .or_else(|| constant(name))
                    .ok_or_else(|| ExprError::Unbound { name: name.clone() })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    #[test]
    fn dependencies_exclude_time_and_dedupe() {
        let expr = Expression::parse("amp * sin(2 * pi * f * t) + amp").unwrap();
        assert_eq!(expr.dependencies(), ["amp", "pi", "f"]);
        assert!(expr.depends_on("f"));
        assert!(!expr.depends_on("t"));
    }

    #[test]
    fn constants_fall_back_to_builtins() {
        let expr = Expression::parse("2 * pi").unwrap();
        let value = expr.evaluate(0.0, &env(&[])).unwrap();
        assert!((value - std::f64::consts::TAU).abs() < 1e-12);
    }

    #[test]
    fn user_names_shadow_builtin_constants() {
        let expr = Expression::parse("e").unwrap();
        let value = expr.evaluate(0.0, &env(&[("e", 4.0)])).unwrap();
        assert!((value - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unbound_name_is_an_error() {
        let expr = Expression::parse("amp * t").unwrap();
        let err = expr.evaluate(1.0, &env(&[])).unwrap_err();
        assert_eq!(
            err,
            ExprError::Unbound {
                name: "amp".to_string()
            }
        );
    }

    #[test]
    fn cache_reused_while_bindings_are_unchanged() {
        let expr = Expression::parse("amp * t").unwrap();
        let bindings = env(&[("amp", 2.0)]);
        assert!(!expr.is_compiled());
        let first = expr.bind(&bindings).unwrap();
        assert!(expr.is_compiled());
        let second = expr.bind(&bindings).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn cache_invalidated_when_a_bound_value_changes() {
        let expr = Expression::parse("amp * t").unwrap();
        let first = expr.bind(&env(&[("amp", 2.0)])).unwrap();
        let second = expr.bind(&env(&[("amp", 3.0)])).unwrap();
        assert!(!Rc::ptr_eq(&first, &second));
        assert!((second.eval(2.0).unwrap() - 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unrelated_bindings_do_not_invalidate() {
        let expr = Expression::parse("amp * t").unwrap();
        let first = expr.bind(&env(&[("amp", 2.0), ("other", 1.0)])).unwrap();
        let second = expr.bind(&env(&[("amp", 2.0), ("other", 9.0)])).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }
}
