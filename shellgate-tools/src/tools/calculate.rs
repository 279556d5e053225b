//! Arithmetic expression evaluator.
//!
//! Nothing is executed: the expression is tokenized and walked by a small
//! recursive-descent parser over `f64`. Only the constants and functions in
//! [`constant`] and [`call`] exist.

use crate::descriptor::{ArgKind, ToolArgument, ToolDescriptor};
use crate::error::ToolError;
use crate::execution_context::ExecutionContext;
use crate::tools::base::{parse_args, ToolHandler, ToolResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::f64::consts;
use thiserror::Error;

const NAME: &str = "calculate";
const MAX_EXPRESSION_CHARS: usize = 1_000;
const MAX_DEPTH: usize = 64;
/// Largest integer an `f64` holds exactly.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

pub fn descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        NAME,
        "Evaluate mathematical expressions safely. Supports basic math, trig, logarithms, etc.",
    )
    .arg(ToolArgument::required(
        "expression",
        ArgKind::String,
        "Mathematical expression to evaluate (e.g., '2 + 2', 'sqrt(16)', 'sin(pi/2)')",
    ))
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalcError {
    #[error("Unexpected character '{0}'")]
    UnexpectedChar(char),
    #[error("Unexpected token {0}")]
    UnexpectedToken(String),
    #[error("Unexpected end of expression")]
    UnexpectedEnd,
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
    #[error("Unknown name: {0}")]
    UnknownName(String),
    #[error("{name}() takes {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: &'static str,
        got: usize,
    },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Math domain error in {0}()")]
    Domain(&'static str),
    #[error("Expression is nested too deeply")]
    TooDeep,
    #[error("Result is not a finite number")]
    NotFinite,
}

impl From<CalcError> for ToolError {
    fn from(err: CalcError) -> Self {
        ToolError::Validation(format!("Evaluation error: {}", err))
    }
}

#[derive(Deserialize)]
struct CalculateInput {
    expression: String,
}

pub struct CalculateTool;

#[async_trait]
impl ToolHandler for CalculateTool {
    async fn run(
        &self,
        _ctx: ExecutionContext,
        args: Map<String, Value>,
    ) -> Result<ToolResult, ToolError> {
        let input: CalculateInput = parse_args(args)?;
        Ok(ToolResult::from_outcome(NAME, calculate(&input.expression)))
    }
}

fn calculate(expression: &str) -> Result<Value, ToolError> {
    if expression.chars().count() > MAX_EXPRESSION_CHARS {
        return Err(ToolError::Validation(format!(
            "Expression longer than {} characters",
            MAX_EXPRESSION_CHARS
        )));
    }
    let result = evaluate(expression)?;

    // Whole results are reported as integers, as a person would write them.
    let (value, kind) = if result.fract() == 0.0 && result.abs() <= MAX_EXACT_INT {
        (json!(result as i64), "int")
    } else {
        (json!(result), "float")
    };
    Ok(json!({
        "expression": expression,
        "result": value,
        "type": kind,
    }))
}

/// Parses and evaluates `expression`.
pub fn evaluate(expression: &str) -> Result<f64, CalcError> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser::new(tokens);
    let value = parser.expr(0)?;
    if let Some(token) = parser.peek() {
        return Err(CalcError::UnexpectedToken(token.to_string()));
    }
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CalcError::NotFinite)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Symbol(char),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "'{}'", n),
            Token::Ident(name) => write!(f, "'{}'", name),
            Token::Symbol(c) => write!(f, "'{}'", c),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, CalcError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.peek().copied() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        if ch.is_ascii_digit() || ch == '.' {
            let mut text = String::new();
            while let Some(c) = chars.peek().copied() {
                let exponent_sign = matches!(c, '+' | '-') && text.ends_with(|c: char| c == 'e' || c == 'E');
                if c.is_ascii_digit() || c == '.' || c == '_' || matches!(c, 'e' | 'E') || exponent_sign {
                    if c != '_' {
                        text.push(c);
                    }
                    chars.next();
                } else {
                    break;
                }
            }
            let number = text.parse().map_err(|_| CalcError::InvalidNumber(text))?;
            tokens.push(Token::Number(number));
            continue;
        }

        if ch.is_ascii_alphabetic() || ch == '_' {
            let mut name = String::new();
            while let Some(c) = chars.peek().copied() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    name.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Ident(name));
            continue;
        }

        chars.next();
        match ch {
            // `**` is an alias for `^`.
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                tokens.push(Token::Symbol('^'));
            }
            '+' | '-' | '*' | '/' | '%' | '^' | '(' | ')' | ',' => tokens.push(Token::Symbol(ch)),
            other => return Err(CalcError::UnexpectedChar(other)),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self, depth: usize) -> Result<f64, CalcError> {
        if depth > MAX_DEPTH {
            return Err(CalcError::TooDeep);
        }
        let mut value = self.term(depth)?;
        while let Some(op) = self.eat_symbol(&['+', '-']) {
            let rhs = self.term(depth)?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    // term := unary (('*' | '/' | '%') unary)*
    fn term(&mut self, depth: usize) -> Result<f64, CalcError> {
        let mut value = self.unary(depth)?;
        while let Some(op) = self.eat_symbol(&['*', '/', '%']) {
            let rhs = self.unary(depth)?;
            value = match op {
                '*' => value * rhs,
                _ if rhs == 0.0 => return Err(CalcError::DivisionByZero),
                '/' => value / rhs,
                // Floored modulo: the sign follows the divisor.
                _ => value - rhs * (value / rhs).floor(),
            };
        }
        Ok(value)
    }

    // unary := ('+' | '-') unary | power
    fn unary(&mut self, depth: usize) -> Result<f64, CalcError> {
        if depth > MAX_DEPTH {
            return Err(CalcError::TooDeep);
        }
        match self.eat_symbol(&['+', '-']) {
            Some('-') => Ok(-self.unary(depth + 1)?),
            Some(_) => self.unary(depth + 1),
            None => self.power(depth),
        }
    }

    // power := primary ('^' unary)?, right-associative and tighter than
    // unary minus on its left: -2^2 is -4.
    fn power(&mut self, depth: usize) -> Result<f64, CalcError> {
        let base = self.primary(depth)?;
        if self.eat_symbol(&['^']).is_some() {
            let exponent = self.unary(depth + 1)?;
            if base == 0.0 && exponent < 0.0 {
                return Err(CalcError::DivisionByZero);
            }
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self, depth: usize) -> Result<f64, CalcError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::Symbol('(')) => {
                let value = self.expr(depth + 1)?;
                self.expect(')')?;
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                if self.eat_symbol(&['(']).is_none() {
                    return constant(&name).ok_or(CalcError::UnknownName(name));
                }
                let mut args = Vec::new();
                if self.eat_symbol(&[')']).is_none() {
                    loop {
                        args.push(self.expr(depth + 1)?);
                        if self.eat_symbol(&[',']).is_none() {
                            break;
                        }
                    }
                    self.expect(')')?;
                }
                call(&name, &args)
            }
            Some(token) => Err(CalcError::UnexpectedToken(token.to_string())),
            None => Err(CalcError::UnexpectedEnd),
        }
    }

    fn expect(&mut self, symbol: char) -> Result<(), CalcError> {
        match self.next() {
            Some(Token::Symbol(c)) if c == symbol => Ok(()),
            Some(token) => Err(CalcError::UnexpectedToken(token.to_string())),
            None => Err(CalcError::UnexpectedEnd),
        }
    }

    fn eat_symbol(&mut self, symbols: &[char]) -> Option<char> {
        match self.peek() {
            Some(Token::Symbol(c)) if symbols.contains(c) => {
                let c = *c;
                self.pos += 1;
                Some(c)
            }
            _ => None,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }
}

fn constant(name: &str) -> Option<f64> {
    match name {
        "pi" => Some(consts::PI),
        "e" => Some(consts::E),
        "tau" => Some(consts::TAU),
        "inf" => Some(f64::INFINITY),
        _ => None,
    }
}

fn arity(name: &str, expected: &'static str, got: usize) -> CalcError {
    CalcError::Arity {
        name: name.to_string(),
        expected,
        got,
    }
}

fn integer(name: &'static str, x: f64) -> Result<u64, CalcError> {
    if x.fract() != 0.0 || x.abs() > MAX_EXACT_INT {
        return Err(CalcError::Domain(name));
    }
    Ok(x.abs() as u64)
}

fn call(name: &str, args: &[f64]) -> Result<f64, CalcError> {
    let one = |f: fn(f64) -> f64| match args {
        [x] => Ok(f(*x)),
        _ => Err(arity(name, "1", args.len())),
    };

    match name {
        "abs" => one(f64::abs),
        "sqrt" => match args {
            [x] if *x < 0.0 => Err(CalcError::Domain("sqrt")),
            _ => one(f64::sqrt),
        },
        "sin" => one(f64::sin),
        "cos" => one(f64::cos),
        "tan" => one(f64::tan),
        "asin" | "acos" => match args {
            [x] if x.abs() > 1.0 => Err(CalcError::Domain(if name == "asin" { "asin" } else { "acos" })),
            _ => one(if name == "asin" { f64::asin } else { f64::acos }),
        },
        "atan" => one(f64::atan),
        "atan2" => match args {
            [y, x] => Ok(y.atan2(*x)),
            _ => Err(arity(name, "2", args.len())),
        },
        "exp" => one(f64::exp),
        "ceil" => one(f64::ceil),
        "floor" => one(f64::floor),
        "int" => one(f64::trunc),
        "float" => one(|x| x),
        "degrees" => one(f64::to_degrees),
        "radians" => one(f64::to_radians),
        "log" => match args {
            [x] if *x <= 0.0 => Err(CalcError::Domain("log")),
            [x] => Ok(x.ln()),
            [x, base] if *x <= 0.0 || *base <= 0.0 || *base == 1.0 => Err(CalcError::Domain("log")),
            [x, base] => Ok(x.ln() / base.ln()),
            _ => Err(arity(name, "1 or 2", args.len())),
        },
        "log10" | "log2" => match args {
            [x] if *x <= 0.0 => Err(CalcError::Domain(if name == "log10" { "log10" } else { "log2" })),
            _ => one(if name == "log10" { f64::log10 } else { f64::log2 }),
        },
        "round" => match args {
            [x] => Ok(round_half_even(*x)),
            [x, digits] => {
                let scale = 10f64.powi(integer("round", *digits)? as i32 * digits.signum() as i32);
                Ok(round_half_even(x * scale) / scale)
            }
            _ => Err(arity(name, "1 or 2", args.len())),
        },
        "pow" => match args {
            [base, exponent] if *base == 0.0 && *exponent < 0.0 => Err(CalcError::DivisionByZero),
            [base, exponent] => Ok(base.powf(*exponent)),
            _ => Err(arity(name, "2", args.len())),
        },
        "min" | "max" | "sum" => {
            if args.is_empty() {
                return Err(arity(name, "at least 1", 0));
            }
            let folded = match name {
                "min" => args.iter().copied().fold(f64::INFINITY, f64::min),
                "max" => args.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                _ => args.iter().sum(),
            };
            Ok(folded)
        }
        "factorial" => match args {
            [x] if *x < 0.0 => Err(CalcError::Domain("factorial")),
            [x] => {
                let n = integer("factorial", *x)?;
                if n > 170 {
                    return Err(CalcError::NotFinite);
                }
                Ok((1..=n).fold(1.0, |acc, k| acc * k as f64))
            }
            _ => Err(arity(name, "1", args.len())),
        },
        "gcd" => match args {
            [a, b] => {
                let (mut a, mut b) = (integer("gcd", *a)?, integer("gcd", *b)?);
                while b != 0 {
                    (a, b) = (b, a % b);
                }
                Ok(a as f64)
            }
            _ => Err(arity(name, "2", args.len())),
        },
        _ => Err(CalcError::UnknownName(name.to_string())),
    }
}

/// Rounds halves to the nearest even integer.
fn round_half_even(x: f64) -> f64 {
    let rounded = x.round();
    if (x - x.trunc()).abs() == 0.5 && rounded % 2.0 != 0.0 {
        rounded - x.signum()
    } else {
        rounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(expr: &str, expected: f64) {
        let got = evaluate(expr).unwrap();
        assert!((got - expected).abs() < 1e-9, "{} = {}, expected {}", expr, got, expected);
    }

    #[test]
    fn precedence_and_associativity() {
        close("2 + 3 * 4", 14.0);
        close("(2 + 3) * 4", 20.0);
        close("2 ^ 3 ^ 2", 512.0);
        close("2 ** 10", 1024.0);
        close("-2 ^ 2", -4.0);
        close("10 - 4 - 3", 3.0);
        close("7 % 3", 1.0);
        close("-7 % 3", 2.0);
    }

    #[test]
    fn functions_and_constants() {
        close("sqrt(16)", 4.0);
        close("sin(pi / 2)", 1.0);
        close("log(8, 2)", 3.0);
        close("max(1, 5, 3) + min(4, 2)", 7.0);
        close("factorial(5)", 120.0);
        close("gcd(12, 18)", 6.0);
        close("round(2.5) + round(3.5)", 6.0);
        close("round(3.14159, 2)", 3.14);
        close("1.5e3 + 1_000", 2500.0);
    }

    #[test]
    fn errors_are_reported_not_panics() {
        assert_eq!(evaluate("1 / 0"), Err(CalcError::DivisionByZero));
        assert_eq!(evaluate("sqrt(-1)"), Err(CalcError::Domain("sqrt")));
        assert_eq!(evaluate("__import__"), Err(CalcError::UnknownName("__import__".into())));
        assert_eq!(evaluate("open(1)"), Err(CalcError::UnknownName("open".into())));
        assert_eq!(evaluate("2 +"), Err(CalcError::UnexpectedEnd));
        assert_eq!(evaluate("(1"), Err(CalcError::UnexpectedEnd));
        assert_eq!(evaluate("1 2"), Err(CalcError::UnexpectedToken("'2'".into())));
        assert_eq!(evaluate("2 & 3"), Err(CalcError::UnexpectedChar('&')));
        assert_eq!(evaluate("inf"), Err(CalcError::NotFinite));
        assert!(matches!(evaluate("atan2(1)"), Err(CalcError::Arity { .. })));
    }

    #[test]
    fn deep_nesting_is_refused() {
        let nested = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert_eq!(evaluate(&nested), Err(CalcError::TooDeep));
        let negated = format!("{}1", "-".repeat(200));
        assert_eq!(evaluate(&negated), Err(CalcError::TooDeep));
    }

    #[test]
    fn whole_results_are_integers() {
        let value = calculate("2 + 2").unwrap();
        assert_eq!(value, json!({"expression": "2 + 2", "result": 4, "type": "int"}));

        let value = calculate("1 / 4").unwrap();
        assert_eq!(value["result"], json!(0.25));
        assert_eq!(value["type"], json!("float"));
    }

    #[test]
    fn errors_carry_the_evaluation_prefix() {
        let err = calculate("1 / 0").unwrap_err();
        assert_eq!(err.to_string(), "Validation error: Evaluation error: Division by zero");
    }
}
