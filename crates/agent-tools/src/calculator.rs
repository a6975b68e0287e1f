//! Calculator Tool
//!
//! Evaluates arithmetic expressions with `+ - * / % ^`, parentheses and
//! unary minus. `^` binds tightest and is right-associative.

use agent_core::{FunctionTool, Schema};
use anyhow::{anyhow, bail};
use serde_json::{Value, json};

pub const NAME: &str = "calculate";

/// Deepest nesting of parentheses, unary minus and `^` accepted
const MAX_DEPTH: usize = 256;

/// `calculate {expression}`
pub fn calculator_tool() -> FunctionTool {
    FunctionTool::from_fn(
        NAME,
        "Evaluate a mathematical expression",
        Schema::object([(
            "expression",
            Schema::string()
                .min(1)
                .description("Mathematical expression to evaluate (e.g., '2 + 2', '(10 - 4) * 5')"),
        )]),
        |args, _ctx| {
            let expression = args.get("expression").and_then(Value::as_str).unwrap_or_default();
            let result = evaluate(expression)?;
            Ok(json!({"expression": expression, "result": result}))
        },
    )
}

/// Evaluate an arithmetic expression
pub fn evaluate(expression: &str) -> anyhow::Result<f64> {
    let mut parser = Parser {
        chars: expression.chars().filter(|c| !c.is_whitespace()).collect(),
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if let Some(c) = parser.peek() {
        bail!("Unexpected '{c}' at position {}", parser.pos);
    }
    if !value.is_finite() {
        bail!("Result is not a finite number");
    }
    Ok(value)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> anyhow::Result<T>) -> anyhow::Result<T> {
        if self.depth >= MAX_DEPTH {
            bail!("Expression nested too deeply");
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> anyhow::Result<f64> {
        let mut value = self.term()?;
        loop {
            if self.eat('+') {
                value += self.term()?;
            } else if self.eat('-') {
                value -= self.term()?;
            } else {
                return Ok(value);
            }
        }
    }

    // term := power (('*' | '/' | '%') power)*
    fn term(&mut self) -> anyhow::Result<f64> {
        let mut value = self.power()?;
        loop {
            if self.eat('*') {
                value *= self.power()?;
            } else if self.eat('/') {
                let divisor = self.power()?;
                if divisor == 0.0 {
                    bail!("Division by zero");
                }
                value /= divisor;
            } else if self.eat('%') {
                let divisor = self.power()?;
                if divisor == 0.0 {
                    bail!("Division by zero");
                }
                value %= divisor;
            } else {
                return Ok(value);
            }
        }
    }

    // power := unary ('^' power)?
    fn power(&mut self) -> anyhow::Result<f64> {
        let base = self.unary()?;
        if self.eat('^') {
            let exponent = self.nested(Self::power)?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    // unary := '-' unary | primary
    fn unary(&mut self) -> anyhow::Result<f64> {
        if self.eat('-') {
            return Ok(-self.nested(Self::unary)?);
        }
        self.primary()
    }

    // primary := number | '(' expr ')'
    fn primary(&mut self) -> anyhow::Result<f64> {
        if self.eat('(') {
            let value = self.nested(Self::expr)?;
            if !self.eat(')') {
                bail!("Missing closing parenthesis");
            }
            return Ok(value);
        }

        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || c == '.')
        {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(match self.peek() {
                Some(c) => anyhow!("Unexpected '{c}' at position {}", self.pos),
                None => anyhow!("Unexpected end of expression"),
            });
        }

        let literal: String = self.chars[start..self.pos].iter().collect();
        literal
            .parse::<f64>()
            .map_err(|e| anyhow!("Invalid number '{literal}': {e}"))
    }
}
