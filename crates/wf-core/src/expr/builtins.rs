//! The fixed math library available to expressions.

use std::f64::consts;

/// A function callable from an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Ln,
    Log,
    Log2,
    Log10,
    Sqrt,
    Abs,
    Floor,
    Ceil,
    Round,
    Min,
    Max,
    Pow,
    Hypot,
    Sign,
    Clamp,
}

/// Accepted argument counts, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: usize,
}

impl Arity {
    const fn exactly(n: usize) -> Self {
        Self { min: n, max: n }
    }

    pub const fn accepts(self, n: usize) -> bool {
        n >= self.min && n <= self.max
    }
}

impl Builtin {
    /// Resolves a function name used in call position.
    pub fn from_name(name: &str) -> Option<Self> {
        let builtin = match name {
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "asin" => Self::Asin,
            "acos" => Self::Acos,
            "atan" => Self::Atan,
            "atan2" => Self::Atan2,
            "sinh" => Self::Sinh,
            "cosh" => Self::Cosh,
            "tanh" => Self::Tanh,
            "exp" => Self::Exp,
            "ln" => Self::Ln,
            "log" => Self::Log,
            "log2" => Self::Log2,
            "log10" => Self::Log10,
            "sqrt" => Self::Sqrt,
            "abs" | "fabs" => Self::Abs,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "round" => Self::Round,
            "min" => Self::Min,
            "max" => Self::Max,
            "pow" => Self::Pow,
            "hypot" => Self::Hypot,
            "sign" => Self::Sign,
            "clamp" => Self::Clamp,
            _ => return None,
        };
        Some(builtin)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Asin => "asin",
            Self::Acos => "acos",
            Self::Atan => "atan",
            Self::Atan2 => "atan2",
            Self::Sinh => "sinh",
            Self::Cosh => "cosh",
            Self::Tanh => "tanh",
            Self::Exp => "exp",
            Self::Ln => "ln",
            Self::Log => "log",
            Self::Log2 => "log2",
            Self::Log10 => "log10",
            Self::Sqrt => "sqrt",
            Self::Abs => "abs",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Round => "round",
            Self::Min => "min",
            Self::Max => "max",
            Self::Pow => "pow",
            Self::Hypot => "hypot",
            Self::Sign => "sign",
            Self::Clamp => "clamp",
        }
    }

    pub const fn arity(self) -> Arity {
        match self {
            // log(x) is natural, log(x, base) takes an explicit base
            Self::Log => Arity { min: 1, max: 2 },
            Self::Min | Self::Max => Arity {
                min: 1,
                max: usize::MAX,
            },
            Self::Atan2 | Self::Pow | Self::Hypot => Arity::exactly(2),
            Self::Clamp => Arity::exactly(3),
            _ => Arity::exactly(1),
        }
    }

    /// Applies the function. `args.len()` has already been checked against
    /// [`Builtin::arity`].
    pub fn apply(self, args: &[f64]) -> f64 {
        let x = args.first().copied().unwrap_or(f64::NAN);
        let y = args.get(1).copied().unwrap_or(f64::NAN);
        match self {
            Self::Sin => x.sin(),
            Self::Cos => x.cos(),
            Self::Tan => x.tan(),
            Self::Asin => x.asin(),
            Self::Acos => x.acos(),
            Self::Atan => x.atan(),
            Self::Atan2 => x.atan2(y),
            Self::Sinh => x.sinh(),
            Self::Cosh => x.cosh(),
            Self::Tanh => x.tanh(),
            Self::Exp => x.exp(),
            Self::Ln => x.ln(),
            Self::Log if args.len() == 2 => x.ln() / y.ln(),
            Self::Log => x.ln(),
            Self::Log2 => x.log2(),
            Self::Log10 => x.log10(),
            Self::Sqrt => x.sqrt(),
            Self::Abs => x.abs(),
            Self::Floor => x.floor(),
            Self::Ceil => x.ceil(),
            Self::Round => x.round(),
            Self::Min => args.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => args.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Pow => x.powf(y),
            Self::Hypot => x.hypot(y),
            Self::Sign => {
                if x == 0.0 {
                    0.0
                } else {
                    x.signum()
                }
            }
            Self::Clamp => {
                let hi = args.get(2).copied().unwrap_or(f64::NAN);
                // f64::clamp panics on inverted or NaN bounds
                if y.is_nan() || hi.is_nan() || y > hi {
                    f64::NAN
                } else {
                    x.clamp(y, hi)
                }
            }
        }
    }
}

/// Value of a named mathematical constant.
pub fn constant(name: &str) -> Option<f64> {
    match name {
        "pi" => Some(consts::PI),
        "e" => Some(consts::E),
        "tau" => Some(consts::TAU),
        _ => None,
    }
}
