//! Bound form of an expression: every free name replaced by its value.

use super::{BinaryOp, Builtin, Expr, ExprError, TIME_ARG};

/// An expression with its dependencies frozen to concrete values.
///
/// Holds no references into the model, so it can be evaluated from worker
/// threads.
#[derive(Debug)]
pub struct Compiled {
    env: Vec<f64>,
    root: Node,
}

#[derive(Debug)]
enum Node {
    Const(f64),
    Time,
    Neg(Box<Node>),
    Binary {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Call {
        func: Builtin,
        args: Vec<Node>,
    },
}

impl Compiled {
    /// Binds `ast` against `env`, where `env[i]` is the value of `names[i]`.
    pub(super) fn new(ast: &Expr, names: &[String], env: Vec<f64>) -> Self {
        let root = Node::lower(ast, names, &env);
        Self { env, root }
    }

    /// Dependency values this form was bound with.
    pub fn env(&self) -> &[f64] {
        &self.env
    }

    /// Evaluates at `t` seconds. Non-finite results are rejected.
    pub fn eval(&self, t: f64) -> Result<f64, ExprError> {
        let value = self.root.eval(t)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ExprError::NonFinite { t })
        }
    }
}

impl Node {
    fn lower(expr: &Expr, names: &[String], env: &[f64]) -> Self {
        match expr {
            Expr::Number(value) => Self::Const(*value),
            Expr::Name(name) if name == TIME_ARG => Self::Time,
            Expr::Name(name) => {
                let value = names
                    .iter()
                    .position(|dep| dep == name)
                    .and_then(|i| env.get(i).copied())
                    .unwrap_or(f64::NAN);
                Self::Const(value)
            }
            Expr::Neg(operand) => match Self::lower(operand, names, env) {
                Self::Const(value) => Self::Const(-value),
                node => Self::Neg(Box::new(node)),
            },
            Expr::Binary { op, left, right } => Self::Binary {
                op: *op,
                left: Box::new(Self::lower(left, names, env)),
                right: Box::new(Self::lower(right, names, env)),
            },
            Expr::Call { func, args } => Self::Call {
                func: *func,
                args: args.iter().map(|arg| Self::lower(arg, names, env)).collect(),
            },
        }
    }

    fn eval(&self, t: f64) -> Result<f64, ExprError> {
        match self {
            Self::Const(value) => Ok(*value),
            Self::Time => Ok(t),
            Self::Neg(operand) => Ok(-operand.eval(t)?),
            Self::Binary { op, left, right } => {
                let l = left.eval(t)?;
                let r = right.eval(t)?;
                apply(*op, l, r)
            }
            Self::Call { func, args } => {
                let values = args
                    .iter()
                    .map(|arg| arg.eval(t))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(func.apply(&values))
            }
        }
    }
}

fn apply(op: BinaryOp, l: f64, r: f64) -> Result<f64, ExprError> {
    match op {
        BinaryOp::Add => Ok(l + r),
        BinaryOp::Sub => Ok(l - r),
        BinaryOp::Mul => Ok(l * r),
        BinaryOp::Div | BinaryOp::Rem if r == 0.0 => Err(ExprError::DivisionByZero),
        BinaryOp::Div => Ok(l / r),
        // result takes the sign of the divisor
        BinaryOp::Rem => Ok(l - r * (l / r).floor()),
        BinaryOp::Pow => Ok(l.powf(r)),
    }
}
