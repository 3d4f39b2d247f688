//! Restricted arithmetic expression language for dynamic pricing formulas.
//!
//! Supported: decimal literals, identifiers naming declared formula inputs,
//! `+ - * /`, unary minus, and parentheses. Nothing else parses; formulas
//! are data, never code.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExprError {
    #[error("unexpected character `{0}` in expression")]
    UnexpectedChar(char),
    #[error("invalid numeric literal `{0}`")]
    InvalidNumber(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token `{0}`")]
    UnexpectedToken(String),
    #[error("unknown input `{0}` (not declared by the formula)")]
    UnknownIdentifier(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("arithmetic overflow")]
    Overflow,
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(Decimal),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Number(value) => value.to_string(),
            Self::Ident(name) => name.clone(),
            Self::Plus => "+".to_string(),
            Self::Minus => "-".to_string(),
            Self::Star => "*".to_string(),
            Self::Slash => "/".to_string(),
            Self::LParen => "(".to_string(),
            Self::RParen => ")".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Decimal),
    Input(String),
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
}

/// Parse an expression and verify every identifier is a declared input name.
pub fn compile(expression: &str, declared_inputs: &[String]) -> Result<Expr, ExprError> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser { tokens, position: 0 };
    let expr = parser.expression()?;
    if parser.position < parser.tokens.len() {
        return Err(ExprError::UnexpectedToken(parser.tokens[parser.position].describe()));
    }
    check_identifiers(&expr, declared_inputs)?;
    Ok(expr)
}

fn check_identifiers(expr: &Expr, declared: &[String]) -> Result<(), ExprError> {
    match expr {
        Expr::Literal(_) => Ok(()),
        Expr::Input(name) => {
            if declared.iter().any(|input| input == name) {
                Ok(())
            } else {
                Err(ExprError::UnknownIdentifier(name.clone()))
            }
        }
        Expr::Neg(inner) => check_identifiers(inner, declared),
        Expr::Add(lhs, rhs) | Expr::Sub(lhs, rhs) | Expr::Mul(lhs, rhs) | Expr::Div(lhs, rhs) => {
            check_identifiers(lhs, declared)?;
            check_identifiers(rhs, declared)
        }
    }
}

impl Expr {
    pub fn evaluate(&self, inputs: &BTreeMap<String, Decimal>) -> Result<Decimal, ExprError> {
        match self {
            Self::Literal(value) => Ok(*value),
            Self::Input(name) => {
                inputs.get(name).copied().ok_or_else(|| ExprError::UnknownIdentifier(name.clone()))
            }
            Self::Neg(inner) => Ok(-inner.evaluate(inputs)?),
            Self::Add(lhs, rhs) => lhs
                .evaluate(inputs)?
                .checked_add(rhs.evaluate(inputs)?)
                .ok_or(ExprError::Overflow),
            Self::Sub(lhs, rhs) => lhs
                .evaluate(inputs)?
                .checked_sub(rhs.evaluate(inputs)?)
                .ok_or(ExprError::Overflow),
            Self::Mul(lhs, rhs) => lhs
                .evaluate(inputs)?
                .checked_mul(rhs.evaluate(inputs)?)
                .ok_or(ExprError::Overflow),
            Self::Div(lhs, rhs) => {
                let divisor = rhs.evaluate(inputs)?;
                if divisor.is_zero() {
                    return Err(ExprError::DivisionByZero);
                }
                lhs.evaluate(inputs)?.checked_div(divisor).ok_or(ExprError::Overflow)
            }
        }
    }
}

fn tokenize(expression: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_ascii_whitespace() => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            c if c.is_ascii_digit() => {
                let mut literal = String::new();
                let mut seen_dot = false;
                while let Some(&digit) = chars.peek() {
                    if digit.is_ascii_digit() {
                        literal.push(digit);
                        chars.next();
                    } else if digit == '.' && !seen_dot {
                        seen_dot = true;
                        literal.push(digit);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = literal
                    .parse::<Decimal>()
                    .map_err(|_| ExprError::InvalidNumber(literal.clone()))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&part) = chars.peek() {
                    if part.is_ascii_alphanumeric() || part == '_' {
                        ident.push(part);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => return Err(ExprError::UnexpectedChar(other)),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Result<Token, ExprError> {
        let token = self.tokens.get(self.position).cloned().ok_or(ExprError::UnexpectedEnd)?;
        self.position += 1;
        Ok(token)
    }

    fn expression(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.term()?;
        while let Some(token) = self.peek() {
            match token {
                Token::Plus => {
                    self.position += 1;
                    lhs = Expr::Add(Box::new(lhs), Box::new(self.term()?));
                }
                Token::Minus => {
                    self.position += 1;
                    lhs = Expr::Sub(Box::new(lhs), Box::new(self.term()?));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.factor()?;
        while let Some(token) = self.peek() {
            match token {
                Token::Star => {
                    self.position += 1;
                    lhs = Expr::Mul(Box::new(lhs), Box::new(self.factor()?));
                }
                Token::Slash => {
                    self.position += 1;
                    lhs = Expr::Div(Box::new(lhs), Box::new(self.factor()?));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> Result<Expr, ExprError> {
        match self.next()? {
            Token::Minus => Ok(Expr::Neg(Box::new(self.factor()?))),
            Token::Number(value) => Ok(Expr::Literal(value)),
            Token::Ident(name) => Ok(Expr::Input(name)),
            Token::LParen => {
                let inner = self.expression()?;
                match self.next()? {
                    Token::RParen => Ok(inner),
                    other => Err(ExprError::UnexpectedToken(other.describe())),
                }
            }
            other => Err(ExprError::UnexpectedToken(other.describe())),
        }
    }
}
