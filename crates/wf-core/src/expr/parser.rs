//! Pratt parser for expressions.

use std::ops::Range;

use super::builtins::Builtin;
use super::lexer::{Token, tokenize};
use super::{BinaryOp, Expr, ExprError};

/// Maximum height of an expression tree. Parentheses, prefix operators and
/// every folded infix operand each count one level.
pub const MAX_DEPTH: usize = 256;

const PREFIX_PRECEDENCE: u8 = 30;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Assoc {
    Left,
    Right,
}

/// Binding power, associativity and operator for an infix token.
fn infix(token: &Token) -> Option<(u8, Assoc, BinaryOp)> {
    match token {
        Token::Plus => Some((10, Assoc::Left, BinaryOp::Add)),
        Token::Minus => Some((10, Assoc::Left, BinaryOp::Sub)),
        Token::Star => Some((20, Assoc::Left, BinaryOp::Mul)),
        Token::Slash => Some((20, Assoc::Left, BinaryOp::Div)),
        Token::Percent => Some((20, Assoc::Left, BinaryOp::Rem)),
        Token::Caret | Token::StarStar => Some((40, Assoc::Right, BinaryOp::Pow)),
        _ => None,
    }
}

/// Parses `source` into an expression tree.
///
/// Unknown functions and wrong argument counts are rejected here, so a tree
/// that parses can only fail at evaluation on unbound names or arithmetic.
pub fn parse(source: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(ExprError::Empty);
    }

    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expr(0)?;
    match parser.peek() {
        Some((token, span)) => Err(unexpected(token, span)),
        None => Ok(expr),
    }
}

struct Parser<'a> {
    tokens: &'a [(Token, Range<usize>)],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a (Token, Range<usize>)> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'a (Token, Range<usize>)> {
        let next = self.tokens.get(self.pos);
        if next.is_some() {
            self.pos += 1;
        }
        next
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ExprError> {
        match self.advance() {
            Some((token, _)) if token == expected => Ok(()),
            Some((token, span)) => Err(unexpected(token, span)),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn descend(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooDeep { limit: MAX_DEPTH });
        }
        Ok(())
    }

    fn expr(&mut self, min_precedence: u8) -> Result<Expr, ExprError> {
        self.descend()?;
        let mut levels = 1;

        let mut left = self.prefix()?;
        while let Some((token, _)) = self.peek() {
            let Some((precedence, assoc, op)) = infix(token) else {
                break;
            };
            if precedence < min_precedence {
                break;
            }
            self.advance();
            // a left-deep chain grows one level per operand
            self.descend()?;
            levels += 1;
            let next = match assoc {
                Assoc::Left => precedence + 1,
                Assoc::Right => precedence,
            };
            let right = self.expr(next)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        self.depth -= levels;
        Ok(left)
    }

    fn prefix(&mut self) -> Result<Expr, ExprError> {
        match self.peek() {
            Some((Token::Minus, _)) => {
                self.advance();
                let operand = self.expr(PREFIX_PRECEDENCE)?;
                Ok(Expr::Neg(Box::new(operand)))
            }
            Some((Token::Plus, _)) => {
                self.advance();
                self.expr(PREFIX_PRECEDENCE)
            }
            _ => self.atom(),
        }
    }

    fn atom(&mut self) -> Result<Expr, ExprError> {
        match self.advance() {
            Some((Token::Number(value), _)) => Ok(Expr::Number(*value)),
            Some((Token::Ident(name), _)) => {
                if matches!(self.peek(), Some((Token::LParen, _))) {
                    self.call(name)
                } else {
                    Ok(Expr::Name(name.clone()))
                }
            }
            Some((Token::LParen, _)) => {
                let inner = self.expr(0)?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some((token, span)) => Err(unexpected(token, span)),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn call(&mut self, name: &str) -> Result<Expr, ExprError> {
        let func = Builtin::from_name(name).ok_or_else(|| ExprError::UnknownFunction {
            name: name.to_string(),
        })?;
        self.expect(&Token::LParen)?;

        let mut args = Vec::new();
        if matches!(self.peek(), Some((Token::RParen, _))) {
            self.advance();
        } else {
            loop {
                args.push(self.expr(0)?);
                match self.advance() {
                    Some((Token::Comma, _)) => {}
                    Some((Token::RParen, _)) => break,
                    Some((token, span)) => return Err(unexpected(token, span)),
                    None => return Err(ExprError::UnexpectedEnd),
                }
            }
        }

        if !func.arity().accepts(args.len()) {
            return Err(ExprError::Arity {
                function: func.name(),
                found: args.len(),
            });
        }
        Ok(Expr::Call { func, args })
    }
}

fn unexpected(token: &Token, span: &Range<usize>) -> ExprError {
    ExprError::UnexpectedToken {
        found: token.describe(),
        position: span.start,
    }
}
