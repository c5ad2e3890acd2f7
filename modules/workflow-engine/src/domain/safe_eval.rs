//! The safe expression evaluator (spec §9 "Dynamic expression evaluation →
//! sandboxed recursive-descent parser", §7, §8 invariant 7).
//!
//! Replaces the `new Function()`-style formula evaluator the source used —
//! a code-injection vulnerability — with a parser that admits only numeric
//! literals, balanced parentheses, and `+ - * /`. Any other token is a
//! `Validation` error, never a server fault, even though the expressions
//! being evaluated originate from workflow metadata (spec §7 "Safe-evaluator
//! failure is a Validation error, never a server fault").
//!
//! This is the *only* mechanism by which metadata expressions — edge
//! conditions (§4.4.2) and `DataAggregatorAgent` formulas (§4.4.1) — are
//! evaluated. It is stateless: the same input always parses to the same
//! value, and it has no access to anything outside the expression string
//! itself (no environment, no variable bindings beyond the ones the caller
//! substitutes in before evaluation).

use std::collections::HashMap;

use modkit_errors::ApiError;
use serde_json::Value;

#[derive(Debug, Clone, Copy)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

const ALLOWED_CHARS: &str = "0123456789.+-*/() \t";

fn lex(input: &str) -> Result<Vec<Token>, ApiError> {
    if let Some(bad) = input.chars().find(|c| !ALLOWED_CHARS.contains(*c)) {
        return Err(ApiError::validation(format!(
            "expression contains a disallowed character: '{bad}'"
        )));
    }

    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                let mut seen_dot = false;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    if chars[i] == '.' {
                        if seen_dot {
                            return Err(ApiError::validation("malformed numeric literal: multiple decimal points"));
                        }
                        seen_dot = true;
                    }
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let value: f64 = literal
                    .parse()
                    .map_err(|_| ApiError::validation(format!("malformed numeric literal: '{literal}'")))?;
                tokens.push(Token::Number(value));
            }
            other => return Err(ApiError::validation(format!("unexpected character: '{other}'"))),
        }
    }
    Ok(tokens)
}

/// Recursive-descent parser over the conventional arithmetic grammar:
/// `expr := term (('+' | '-') term)*`, `term := factor (('*' | '/') factor)*`,
/// `factor := NUMBER | '(' expr ')' | '-' factor`. Left-to-right
/// associativity and standard precedence fall out of the grammar shape
/// (spec §8 invariant 7).
struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.peek();
        self.pos += 1;
        t
    }

    fn parse_expr(&mut self) -> Result<f64, ApiError> {
        let mut value = self.parse_term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.advance();
                    value += self.parse_term()?;
                }
                Some(Token::Minus) => {
                    self.advance();
                    value -= self.parse_term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_term(&mut self) -> Result<f64, ApiError> {
        let mut value = self.parse_factor()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.advance();
                    value *= self.parse_factor()?;
                }
                Some(Token::Slash) => {
                    self.advance();
                    let divisor = self.parse_factor()?;
                    if divisor == 0.0 {
                        return Err(ApiError::validation("division by zero"));
                    }
                    value /= divisor;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_factor(&mut self) -> Result<f64, ApiError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::Minus) => Ok(-self.parse_factor()?),
            Some(Token::Plus) => self.parse_factor(),
            Some(Token::LParen) => {
                let value = self.parse_expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(ApiError::validation("unbalanced parentheses")),
                }
            }
            Some(_) => Err(ApiError::validation("expected a number or '('")),
            None => Err(ApiError::validation("unexpected end of expression")),
        }
    }
}

/// Evaluate a arithmetic expression composed only of numeric literals,
/// `+ - * /`, and balanced parentheses.
///
/// # Errors
/// `ApiError::validation` for any character outside the whitelist, an
/// unbalanced expression, or division by zero. Never panics on malformed
/// input.
pub fn evaluate(expression: &str) -> Result<f64, ApiError> {
    let tokens = lex(expression)?;
    if tokens.is_empty() {
        return Err(ApiError::validation("empty expression"));
    }
    let mut parser = Parser::new(&tokens);
    let value = parser.parse_expr()?;
    if parser.pos != tokens.len() {
        return Err(ApiError::validation("trailing tokens after a complete expression"));
    }
    Ok(value)
}

/// Evaluates `expression` and returns whether the result is non-zero — the
/// shape an edge `condition` (spec §4.4.2) is evaluated in. Conditions in
/// this engine are arithmetic, not boolean, expressions: `0` is falsy,
/// anything else is truthy, matching the router's use of the same
/// evaluator for both aggregation formulas and edge conditions.
///
/// # Errors
/// Same as [`evaluate`].
pub fn evaluate_condition(expression: &str) -> Result<bool, ApiError> {
    Ok(evaluate(expression)? != 0.0)
}

/// Flattens every numeric leaf of `value` into `path.to.leaf -> number`
/// bindings; arrays of numbers additionally contribute `path.sum` and
/// `path.count`. Shared by `DataAggregatorAgent` formulas and edge
/// conditions — both bind against prior node output the same way.
#[allow(clippy::cast_precision_loss)]
pub fn flatten_numeric(prefix: &str, value: &Value, out: &mut HashMap<String, f64>) {
    match value {
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                out.insert(prefix.to_owned(), f);
            }
        }
        Value::Object(map) => {
            for (k, v) in map {
                let next = if prefix.is_empty() { k.clone() } else { format!("{prefix}.{k}") };
                flatten_numeric(&next, v, out);
            }
        }
        Value::Array(items) => {
            let mut sum = 0.0;
            let mut all_numeric = true;
            for item in items {
                if let Value::Number(n) = item {
                    if let Some(f) = n.as_f64() {
                        sum += f;
                        continue;
                    }
                }
                all_numeric = false;
            }
            if all_numeric {
                out.insert(format!("{prefix}.sum"), sum);
                out.insert(format!("{prefix}.count"), items.len() as f64);
            }
            for (i, item) in items.iter().enumerate() {
                flatten_numeric(&format!("{prefix}.{i}"), item, out);
            }
        }
        _ => {}
    }
}

/// Substitutes every `{token}` occurrence of a numeric-valued key from
/// `bindings` into `expression`. Unrecognized tokens are left untouched and
/// fail lexing in [`evaluate`] with a `Validation` error, same as any other
/// disallowed character would.
pub fn substitute_bindings(expression: &str, bindings: &HashMap<String, f64>) -> String {
    let mut out = expression.to_owned();
    for (key, value) in bindings {
        out = out.replace(&format!("{{{key}}}"), &value.to_string());
    }
    out
}

/// Flattens `state`'s numeric leaves and substitutes them into `expression`
/// in one step — the form both `DataAggregatorAgent` and the workflow
/// router's edge conditions use.
#[must_use]
pub fn bind(expression: &str, state: &Value) -> String {
    let mut bindings = HashMap::new();
    flatten_numeric("", state, &mut bindings);
    bindings.remove("");
    substitute_bindings(expression, &bindings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_precedence_and_parens() {
        assert_eq!(evaluate("(2+3)*4").expect("evaluates"), 20.0);
        assert_eq!(evaluate("2+3*4").expect("evaluates"), 14.0);
    }

    #[test]
    fn left_to_right_associativity_for_same_precedence() {
        assert_eq!(evaluate("10-3-2").expect("evaluates"), 5.0);
        assert_eq!(evaluate("20/4/5").expect("evaluates"), 1.0);
    }

    #[test]
    fn rejects_non_arithmetic_tokens() {
        assert!(evaluate("process.exit()").is_err());
        assert!(evaluate("2+foo").is_err());
    }

    #[test]
    fn rejects_unbalanced_parens() {
        assert!(evaluate("(2+3").is_err());
        assert!(evaluate("2+3)").is_err());
    }

    #[test]
    fn rejects_division_by_zero() {
        assert!(evaluate("1/0").is_err());
    }

    #[test]
    fn unary_minus_is_supported() {
        assert_eq!(evaluate("-5+10").expect("evaluates"), 5.0);
    }

    #[test]
    fn condition_truthiness_matches_nonzero() {
        assert!(evaluate_condition("1+1").expect("evaluates"));
        assert!(!evaluate_condition("1-1").expect("evaluates"));
    }
}
