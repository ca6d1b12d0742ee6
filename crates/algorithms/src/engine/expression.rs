//! Map-algebra expression language
//!
//! Expressions are parsed once into an AST whose raster references are
//! resolved to slot indices, then evaluated per cell.
//!
//! ```text
//! if(wb == 0, 1, 0)
//! 3.10 + 0.157 * clay - 0.003 * sand
//! 0.01 * 10 ^ (2.17 - 0.0063 * clay - 0.0158 * sand)
//! ```
//!
//! Null (NaN) propagates through arithmetic, comparisons and logic;
//! `isnull(x)` and `if` are the only ways to act on it. Division by zero
//! is null.

use ancil_core::error::{EngineError, EngineErrorKind};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Name(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Exp,
    Log,
    Log10,
    Sqrt,
    Abs,
    Min,
    Max,
    IsNull,
    Null,
    If,
}

impl Func {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "exp" => Func::Exp,
            "log" => Func::Log,
            "log10" => Func::Log10,
            "sqrt" => Func::Sqrt,
            "abs" => Func::Abs,
            "min" => Func::Min,
            "max" => Func::Max,
            "isnull" => Func::IsNull,
            "null" => Func::Null,
            "if" => Func::If,
            _ => return None,
        })
    }

    /// Accepted argument counts (inclusive)
    fn arity(self) -> (usize, usize) {
        match self {
            Func::Null => (0, 0),
            Func::Min | Func::Max => (1, usize::MAX),
            Func::If => (2, 3),
            _ => (1, 1),
        }
    }
}

#[derive(Debug, Clone)]
enum Expr {
    Num(f64),
    Var(usize),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Bin {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        func: Func,
        args: Vec<Expr>,
    },
}

fn syntax(source: &str, message: impl Into<String>) -> EngineError {
    let mut err = EngineError::new(EngineErrorKind::Syntax, message);
    err.expression = source.to_string();
    err
}

fn tokenize(source: &str) -> Result<Vec<Token>, EngineError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '+' | '-' | '*' | '/' | '^' => {
                tokens.push(Token::Op(match c {
                    '+' => "+",
                    '-' => "-",
                    '*' => "*",
                    '/' => "/",
                    _ => "^",
                }));
                i += 1;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Op("=="));
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Op("!="));
                i += 2;
            }
            '!' => {
                tokens.push(Token::Op("!"));
                i += 1;
            }
            '<' | '>' => {
                let op = match (c, next == Some('=')) {
                    ('<', true) => "<=",
                    ('<', false) => "<",
                    ('>', true) => ">=",
                    _ => ">",
                };
                i += op.len();
                tokens.push(Token::Op(op));
            }
            '&' if next == Some('&') => {
                tokens.push(Token::Op("&&"));
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Op("||"));
                i += 2;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // exponent part: 1e-3, 2.5E+4
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        while j < chars.len() && chars[j].is_ascii_digit() {
                            j += 1;
                        }
                        i = j;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| syntax(source, format!("invalid number `{}`", text)))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
            }
            c => {
                return Err(syntax(source, format!("unexpected character `{}`", c)));
            }
        }
    }

    Ok(tokens)
}

/// Recursive descent parser, lowest precedence first:
/// `||`, `&&`, comparisons, `+ -`, `* /`, unary `- + !`, `^`, primary.
struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    names: Vec<String>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn peek_op(&self, ops: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => Some(*op),
            _ => None,
        }
    }

    fn error(&self, message: impl Into<String>) -> EngineError {
        syntax(self.source, message)
    }

    fn binary(
        &mut self,
        ops: &[&'static str],
        next: fn(&mut Self) -> Result<Expr, EngineError>,
    ) -> Result<Expr, EngineError> {
        let mut left = next(self)?;
        while let Some(op) = self.peek_op(ops) {
            self.advance();
            let right = next(self)?;
            let op = match op {
                "||" => BinOp::Or,
                "&&" => BinOp::And,
                "==" => BinOp::Eq,
                "!=" => BinOp::Ne,
                "<" => BinOp::Lt,
                "<=" => BinOp::Le,
                ">" => BinOp::Gt,
                ">=" => BinOp::Ge,
                "+" => BinOp::Add,
                "-" => BinOp::Sub,
                "*" => BinOp::Mul,
                _ => BinOp::Div,
            };
            left = Expr::Bin {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> Result<Expr, EngineError> {
        self.binary(&["||"], Self::parse_and)
    }

    fn parse_and(&mut self) -> Result<Expr, EngineError> {
        self.binary(&["&&"], Self::parse_cmp)
    }

    fn parse_cmp(&mut self) -> Result<Expr, EngineError> {
        self.binary(&["==", "!=", "<", "<=", ">", ">="], Self::parse_add)
    }

    fn parse_add(&mut self) -> Result<Expr, EngineError> {
        self.binary(&["+", "-"], Self::parse_mul)
    }

    fn parse_mul(&mut self) -> Result<Expr, EngineError> {
        self.binary(&["*", "/"], Self::parse_unary)
    }

    fn parse_unary(&mut self) -> Result<Expr, EngineError> {
        match self.peek_op(&["-", "+", "!"]) {
            Some("-") => {
                self.advance();
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            Some("!") => {
                self.advance();
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            Some(_) => {
                self.advance();
                self.parse_unary()
            }
            None => self.parse_power(),
        }
    }

    /// Right-associative; the exponent may carry its own sign (`10 ^ -2`).
    fn parse_power(&mut self) -> Result<Expr, EngineError> {
        let base = self.parse_primary()?;
        if self.peek_op(&["^"]).is_some() {
            self.advance();
            let exponent = self.parse_unary()?;
            return Ok(Expr::Bin {
                op: BinOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, EngineError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Num(n)),
            Some(Token::LParen) => {
                let expr = self.parse_or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err(self.error("expected `)`")),
                }
            }
            Some(Token::Name(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.parse_call(&name)
                } else {
                    Ok(Expr::Var(self.slot(name)))
                }
            }
            Some(other) => Err(self.error(format!("unexpected token {:?}", other))),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn parse_call(&mut self, name: &str) -> Result<Expr, EngineError> {
        let func = Func::lookup(name).ok_or_else(|| self.error(format!("unknown function `{}`", name)))?;
        self.advance(); // (
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.advance();
        } else {
            loop {
                args.push(self.parse_or()?);
                match self.advance() {
                    Some(Token::Comma) => continue,
                    Some(Token::RParen) => break,
                    _ => return Err(self.error(format!("expected `,` or `)` in call to `{}`", name))),
                }
            }
        }
        let (lo, hi) = func.arity();
        if args.len() < lo || args.len() > hi {
            return Err(self.error(format!(
                "`{}` takes {} argument(s), got {}",
                name,
                if lo == hi { lo.to_string() } else { format!("{}+", lo) },
                args.len()
            )));
        }
        Ok(Expr::Call { func, args })
    }

    fn slot(&mut self, name: String) -> usize {
        match self.names.iter().position(|n| *n == name) {
            Some(i) => i,
            None => {
                self.names.push(name);
                self.names.len() - 1
            }
        }
    }
}

/// A parsed expression
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    ast: Expr,
    names: Vec<String>,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, EngineError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(syntax(source, "empty expression"));
        }
        let mut parser = Parser {
            source,
            tokens,
            pos: 0,
            names: Vec::new(),
        };
        let ast = parser.parse_or()?;
        if let Some(t) = parser.peek() {
            return Err(parser.error(format!("trailing input at {:?}", t)));
        }
        Ok(Self {
            source: source.to_string(),
            ast,
            names: parser.names,
        })
    }

    /// Raster names in slot order; `eval` expects values in this order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn eval(&self, values: &[f64]) -> f64 {
        let v = eval(&self.ast, values);
        if v.is_finite() {
            v
        } else {
            f64::NAN
        }
    }
}

fn truth(v: f64) -> f64 {
    if v != 0.0 {
        1.0
    } else {
        0.0
    }
}

fn eval(expr: &Expr, values: &[f64]) -> f64 {
    match expr {
        Expr::Num(n) => *n,
        Expr::Var(i) => values.get(*i).copied().unwrap_or(f64::NAN),
        Expr::Neg(inner) => -eval(inner, values),
        Expr::Not(inner) => {
            let v = eval(inner, values);
            if v.is_nan() {
                f64::NAN
            } else {
                1.0 - truth(v)
            }
        }
        Expr::Bin { op, left, right } => {
            let l = eval(left, values);
            let r = eval(right, values);
            if l.is_nan() || r.is_nan() {
                return f64::NAN;
            }
            let b = |c: bool| if c { 1.0 } else { 0.0 };
            match op {
                BinOp::Add => l + r,
                BinOp::Sub => l - r,
                BinOp::Mul => l * r,
                BinOp::Div => {
                    if r == 0.0 {
                        f64::NAN
                    } else {
                        l / r
                    }
                }
                BinOp::Pow => l.powf(r),
                BinOp::Eq => b(l == r),
                BinOp::Ne => b(l != r),
                BinOp::Lt => b(l < r),
                BinOp::Le => b(l <= r),
                BinOp::Gt => b(l > r),
                BinOp::Ge => b(l >= r),
                BinOp::And => b(l != 0.0 && r != 0.0),
                BinOp::Or => b(l != 0.0 || r != 0.0),
            }
        }
        Expr::Call { func, args } => call(*func, args, values),
    }
}

fn call(func: Func, args: &[Expr], values: &[f64]) -> f64 {
    let arg = |i: usize| args.get(i).map_or(f64::NAN, |e| eval(e, values));
    match func {
        Func::Null => f64::NAN,
        Func::IsNull => {
            if arg(0).is_nan() {
                1.0
            } else {
                0.0
            }
        }
        Func::If => {
            let cond = arg(0);
            if cond.is_nan() {
                f64::NAN
            } else if cond != 0.0 {
                arg(1)
            } else if args.len() > 2 {
                arg(2)
            } else {
                0.0
            }
        }
        Func::Min | Func::Max => {
            let mut acc: Option<f64> = None;
            for e in args {
                let v = eval(e, values);
                if v.is_nan() {
                    return f64::NAN;
                }
                acc = Some(match (acc, func) {
                    (None, _) => v,
                    (Some(a), Func::Min) => a.min(v),
                    (Some(a), _) => a.max(v),
                });
            }
            acc.unwrap_or(f64::NAN)
        }
        Func::Exp => arg(0).exp(),
        Func::Log => {
            let v = arg(0);
            if v > 0.0 {
                v.ln()
            } else {
                f64::NAN
            }
        }
        Func::Log10 => {
            let v = arg(0);
            if v > 0.0 {
                v.log10()
            } else {
                f64::NAN
            }
        }
        Func::Sqrt => arg(0).sqrt(),
        Func::Abs => arg(0).abs(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn eval_with(src: &str, vars: &[(&str, f64)]) -> f64 {
        let e = Expression::parse(src).unwrap();
        let values: Vec<f64> = e
            .names()
            .iter()
            .map(|n| vars.iter().find(|(k, _)| k == n).map(|(_, v)| *v).unwrap())
            .collect();
        e.eval(&values)
    }

    #[test]
    fn test_precedence() {
        assert_relative_eq!(eval_with("1 + 2 * 3", &[]), 7.0);
        assert_relative_eq!(eval_with("(1 + 2) * 3", &[]), 9.0);
        assert_relative_eq!(eval_with("-2 ^ 2", &[]), -4.0);
        assert_relative_eq!(eval_with("2 ^ 3 ^ 2", &[]), 512.0);
        assert_relative_eq!(eval_with("10 ^ -2", &[]), 0.01);
        assert_relative_eq!(eval_with("1 + 2 > 2 && 1", &[]), 1.0);
    }

    #[test]
    fn test_scientific_notation_and_names() {
        let e = Expression::parse("2.5e-1 * clay_0_5cm + clay_0_5cm").unwrap();
        assert_eq!(e.names(), &["clay_0_5cm".to_string()]);
        assert_relative_eq!(e.eval(&[4.0]), 5.0);
    }

    #[test]
    fn test_cosby_b() {
        let b = eval_with("3.10 + 0.157 * clay - 0.003 * sand", &[("clay", 20.0), ("sand", 40.0)]);
        assert_relative_eq!(b, 3.10 + 0.157 * 20.0 - 0.003 * 40.0, epsilon = 1e-12);
    }

    #[test]
    fn test_null_propagation() {
        assert!(eval_with("a + 1", &[("a", f64::NAN)]).is_nan());
        assert!(eval_with("a == 1", &[("a", f64::NAN)]).is_nan());
        assert!(eval_with("1 / 0", &[]).is_nan());
        assert!(eval_with("log(0)", &[]).is_nan());
        assert_eq!(eval_with("isnull(a)", &[("a", f64::NAN)]), 1.0);
        assert_eq!(eval_with("if(isnull(a), 0, a)", &[("a", f64::NAN)]), 0.0);
        assert!(eval_with("null()", &[]).is_nan());
    }

    #[test]
    fn test_if_and_functions() {
        assert_eq!(eval_with("if(wb == 0, 1, 0)", &[("wb", 0.0)]), 1.0);
        assert_eq!(eval_with("if(wb == 0, 1)", &[("wb", 3.0)]), 0.0);
        assert_eq!(eval_with("min(3, x, 2)", &[("x", 1.0)]), 1.0);
        assert_eq!(eval_with("max(3, x, 2)", &[("x", 1.0)]), 3.0);
        assert_eq!(eval_with("!(x > 1)", &[("x", 2.0)]), 0.0);
        assert_relative_eq!(eval_with("sqrt(abs(-16))", &[]), 4.0);
    }

    #[test]
    fn test_syntax_errors() {
        for bad in ["", "1 +", "(1 + 2", "foo(1)", "exp(1, 2)", "1 2", "a $ b"] {
            let err = Expression::parse(bad).unwrap_err();
            assert_eq!(err.kind, EngineErrorKind::Syntax, "{}", bad);
            assert_eq!(err.expression, bad);
        }
    }
}
