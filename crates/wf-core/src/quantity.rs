//! Named scalar or time-dependent values shared between intervals.

use rayon::prelude::*;

use crate::error::ModelError;
use crate::expr::{Bindings, ExprError, Expression};
use crate::registry::Named;
use crate::types::{EntityKind, Mode};

/// Where a quantity's samples come from.
#[derive(Debug, Clone)]
pub enum Source {
    /// The retained constant value.
    Constant,
    /// An expression of `t` in seconds.
    Function(Expression),
}

/// A named value referenced by one or more intervals.
///
/// The constant value is retained in function mode: other expressions bind
/// this quantity's name to it, and switching back to constant mode restores it.
#[derive(Debug, Clone)]
pub struct Quantity {
    name: String,
    locked: bool,
    value: f64,
    source: Source,
}

impl Quantity {
    pub fn constant(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            locked: false,
            value,
            source: Source::Constant,
        }
    }

    /// A function-mode quantity. Fails if `text` does not parse.
    pub fn function(name: impl Into<String>, text: &str) -> Result<Self, ModelError> {
        let expression = parse_expression(text)?;
        Ok(Self {
            name: name.into(),
            locked: false,
            value: 0.0,
            source: Source::Function(expression),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn is_locked(&self) -> bool {
        self.locked
    }

    pub const fn mode(&self) -> Mode {
        match self.source {
            Source::Constant => Mode::Constant,
            Source::Function(_) => Mode::Function,
        }
    }

    pub const fn source(&self) -> &Source {
        &self.source
    }

    /// The retained constant value, whatever the mode.
    pub const fn constant_value(&self) -> f64 {
        self.value
    }

    /// Expression text in function mode.
    pub fn expression_text(&self) -> Option<&str> {
        match &self.source {
            Source::Constant => None,
            Source::Function(expression) => Some(expression.text()),
        }
    }

    /// Whether this quantity can be dragged to a new value.
    pub const fn is_draggable(&self) -> bool {
        matches!(self.source, Source::Constant)
    }

    /// Returns true if the value changed. Non-strict calls turn every
    /// rejection into a no-op.
    pub(crate) fn set_constant_value(&mut self, value: f64, strict: bool) -> Result<bool, ModelError> {
        if self.locked {
            return ModelError::locked(EntityKind::Quantity, &self.name).reject(strict);
        }
        if !value.is_finite() {
            return ModelError::OutOfRange {
                subject: format!("quantity {}", self.name),
                value,
                lower: None,
                upper: None,
            }
            .reject(strict);
        }
        self.value = value;
        Ok(true)
    }

    /// Switches to function mode. The text is parsed before anything changes,
    /// so a malformed expression leaves the quantity as it was.
    pub(crate) fn set_expression(&mut self, text: &str) -> Result<(), ModelError> {
        if self.locked {
            return Err(ModelError::locked(EntityKind::Quantity, &self.name));
        }
        self.source = Source::Function(parse_expression(text)?);
        Ok(())
    }

    /// Switches back to constant mode, keeping the retained value.
    pub(crate) fn set_constant_mode(&mut self) -> Result<(), ModelError> {
        if self.locked {
            return Err(ModelError::locked(EntityKind::Quantity, &self.name));
        }
        self.source = Source::Constant;
        Ok(())
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) const fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    /// A value-copy under a new name: same mode, value, expression and lock.
    pub(crate) fn duplicate(&self, name: String) -> Self {
        Self {
            name,
            locked: self.locked,
            value: self.value,
            source: self.source.clone(),
        }
    }

    /// Value at `t` seconds.
    pub fn sample<B: Bindings + ?Sized>(&self, t: f64, bindings: &B) -> Result<f64, ModelError> {
        match &self.source {
            Source::Constant => Ok(self.value),
            Source::Function(expression) => expression
                .evaluate(t, bindings)
                .map_err(|source| expression_error(expression, source)),
        }
    }

    /// Values at every point of `ts` (seconds). Function mode is compiled
    /// once and evaluated in parallel.
    pub fn sample_many<B: Bindings + ?Sized>(
        &self,
        ts: &[f64],
        bindings: &B,
    ) -> Result<Vec<f64>, ModelError> {
        match &self.source {
            Source::Constant => Ok(vec![self.value; ts.len()]),
            Source::Function(expression) => {
                let compiled = expression
                    .bind(bindings)
                    .map_err(|source| expression_error(expression, source))?;
                let compiled = &*compiled;
                ts.par_iter()
                    .map(|&t| compiled.eval(t))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|source| expression_error(expression, source))
            }
        }
    }

    /// Largest sample over `ts`. Constant mode returns the constant even for
    /// an empty sequence.
    pub fn max_over<B: Bindings + ?Sized>(
        &self,
        ts: &[f64],
        bindings: &B,
    ) -> Result<Option<f64>, ModelError> {
        self.reduce_over(ts, bindings, f64::max)
    }

    /// Smallest sample over `ts`.
    pub fn min_over<B: Bindings + ?Sized>(
        &self,
        ts: &[f64],
        bindings: &B,
    ) -> Result<Option<f64>, ModelError> {
        self.reduce_over(ts, bindings, f64::min)
    }

    fn reduce_over<B: Bindings + ?Sized>(
        &self,
        ts: &[f64],
        bindings: &B,
        pick: fn(f64, f64) -> f64,
    ) -> Result<Option<f64>, ModelError> {
        match &self.source {
            Source::Constant => Ok(Some(self.value)),
            Source::Function(_) => Ok(self
                .sample_many(ts, bindings)?
                .into_iter()
                .reduce(pick)),
        }
    }
}

impl Named for Quantity {
    const KIND: EntityKind = EntityKind::Quantity;

    fn name(&self) -> &str {
        &self.name
    }
}

fn parse_expression(text: &str) -> Result<Expression, ModelError> {
    Expression::parse(text).map_err(|source| ModelError::Expression {
        text: text.to_string(),
        source,
    })
}

fn expression_error(expression: &Expression, source: ExprError) -> ModelError {
    ModelError::Expression {
        text: expression.text().to_string(),
        source,
    }
}
