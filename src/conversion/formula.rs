//! Evaluator for algebraic (MCD-2 MC style) conversion formulas over `X`.
//!
//! Formulas are compiled once into an [`Expr`] tree and evaluated per sample.
//! Supported: `+ - * /`, `^` and `**` (right associative), unary minus,
//! parentheses, numbers in scientific notation and the functions `sin`,
//! `cos`, `tan`, `asin`, `acos`, `atan`, `exp`, `log`/`ln`, `log10`, `sqrt`
//! and `abs`.

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    X,
    Neg(Box<Expr>),
    Binary(Op, Box<Expr>, Box<Expr>),
    Call(Function, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Exp,
    Ln,
    Log10,
    Sqrt,
    Abs,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "asin" | "arcsin" => Self::Asin,
            "acos" | "arccos" => Self::Acos,
            "atan" | "arctan" => Self::Atan,
            "exp" => Self::Exp,
            "log" | "ln" => Self::Ln,
            "log10" => Self::Log10,
            "sqrt" => Self::Sqrt,
            "abs" => Self::Abs,
            _ => return None,
        })
    }

    fn apply(self, v: f64) -> f64 {
        match self {
            Self::Sin => v.sin(),
            Self::Cos => v.cos(),
            Self::Tan => v.tan(),
            Self::Asin => v.asin(),
            Self::Acos => v.acos(),
            Self::Atan => v.atan(),
            Self::Exp => v.exp(),
            Self::Ln => v.ln(),
            Self::Log10 => v.log10(),
            Self::Sqrt => v.sqrt(),
            Self::Abs => v.abs(),
        }
    }
}

impl Expr {
    /// Evaluates the tree with `X = x`. Division by zero and domain errors
    /// yield NaN or infinity, like the underlying float operations.
    pub fn eval(&self, x: f64) -> f64 {
        match self {
            Expr::Number(n) => *n,
            Expr::X => x,
            Expr::Neg(e) => -e.eval(x),
            Expr::Binary(op, l, r) => {
                let (l, r) = (l.eval(x), r.eval(x));
                match op {
                    Op::Add => l + r,
                    Op::Sub => l - r,
                    Op::Mul => l * r,
                    Op::Div => l / r,
                    Op::Pow => pow(l, r),
                }
            }
            Expr::Call(f, e) => f.apply(e.eval(x)),
        }
    }
}

fn pow(base: f64, exp: f64) -> f64 {
    if exp.fract() == 0.0 && exp.abs() <= f64::from(i32::MAX) {
        base.powi(exp as i32)
    } else {
        base.powf(exp)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

/// Compiles `formula` into an expression tree.
pub fn compile(formula: &str) -> Result<Expr> {
    let fail = |reason: &str| Error::Formula {
        formula: formula.to_string(),
        reason: reason.to_string(),
    };
    let tokens = tokenize(formula).map_err(fail)?;
    let mut parser = Parser { tokens: &tokens, pos: 0 };
    let expr = parser.expr().map_err(fail)?;
    if parser.pos != tokens.len() {
        return Err(fail("unexpected trailing input"));
    }
    Ok(expr)
}

/// One-shot evaluation, mostly for tests and MDF3 formula channels.
pub fn evaluate(formula: &str, x: f64) -> Result<f64> {
    Ok(compile(formula)?.eval(x))
}

fn tokenize(expr: &str) -> core::result::Result<Vec<Token>, &'static str> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
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
                if chars.peek() == Some(&'*') {
                    chars.next();
                    tokens.push(Token::Caret);
                } else {
                    tokens.push(Token::Star);
                }
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '^' => {
                chars.next();
                tokens.push(Token::Caret);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '0'..='9' | '.' => {
                let mut text = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_digit() || ch == '.' {
                        text.push(ch);
                        chars.next();
                    } else if ch == 'e' || ch == 'E' {
                        text.push(ch);
                        chars.next();
                        if let Some(&sign) = chars.peek() {
                            if sign == '+' || sign == '-' {
                                text.push(sign);
                                chars.next();
                            }
                        }
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(text.parse().map_err(|_| "invalid number")?));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            _ => return Err("unexpected character"),
        }
    }
    Ok(tokens)
}

// Grammar:
// expr    = term (('+' | '-') term)*
// term    = power (('*' | '/') power)*
// power   = unary ('^' power)?
// unary   = '-' unary | '+' unary | primary
// primary = NUMBER | 'X' | IDENT '(' expr ')' | '(' expr ')'
struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

type ParseResult = core::result::Result<Expr, &'static str>;

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn expr(&mut self) -> ParseResult {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => Op::Add,
                Some(Token::Minus) => Op::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            left = Expr::Binary(op, Box::new(left), Box::new(self.term()?));
        }
    }

    fn term(&mut self) -> ParseResult {
        let mut left = self.power()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => Op::Mul,
                Some(Token::Slash) => Op::Div,
                _ => return Ok(left),
            };
            self.pos += 1;
            left = Expr::Binary(op, Box::new(left), Box::new(self.power()?));
        }
    }

    fn power(&mut self) -> ParseResult {
        let base = self.unary()?;
        if self.peek() == Some(&Token::Caret) {
            self.pos += 1;
            let exp = self.power()?;
            return Ok(Expr::Binary(Op::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn unary(&mut self) -> ParseResult {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> ParseResult {
        let token = self.peek().cloned().ok_or("unexpected end of expression")?;
        self.pos += 1;
        match token {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Ident(name) if name.eq_ignore_ascii_case("x") => Ok(Expr::X),
            Token::Ident(name) => {
                let function = Function::from_name(&name).ok_or("unknown identifier")?;
                if self.peek() != Some(&Token::LParen) {
                    return Err("expected '(' after function name");
                }
                self.pos += 1;
                let arg = self.expr()?;
                self.close()?;
                Ok(Expr::Call(function, Box::new(arg)))
            }
            Token::LParen => {
                let inner = self.expr()?;
                self.close()?;
                Ok(inner)
            }
            _ => Err("unexpected token"),
        }
    }

    fn close(&mut self) -> core::result::Result<(), &'static str> {
        if self.peek() != Some(&Token::RParen) {
            return Err("expected closing parenthesis");
        }
        self.pos += 1;
        Ok(())
    }
}
