//! `&IF` condition evaluation
//!
//! Only what compile-time conditions use in practice: string, number and
//! logical literals, comparisons, `BEGINS`, `AND`/`OR`/`NOT`, `+`/`-`,
//! parentheses, and the `DEFINED()`, `OPSYS` and `PROVERSION` builtins
//! (plus `INTEGER()` and `DECIMAL()` conversions). Strings compare without
//! regard to case, as ABL does.

use std::cmp::Ordering;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
    #[error("unterminated string")]
    UnterminatedString,
    #[error("unexpected end of condition")]
    UnexpectedEnd,
    #[error("unexpected '{0}'")]
    UnexpectedToken(String),
    #[error("unknown name '{0}'")]
    UnknownName(String),
    #[error("cannot apply '{0}' to these operands")]
    TypeMismatch(String),
    #[error("condition does not evaluate to a logical value")]
    NotLogical,
}

/// Values the builtins read from the preprocessor state
pub trait ConditionEnv {
    /// `0` undefined, `1` include argument, `2` global, `3` scoped
    fn defined(&self, name: &str) -> u8;
    fn opsys(&self) -> &str;
    fn proversion(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Num(f64),
    Bool(bool),
}

impl Value {
    fn truth(&self) -> Result<bool, ConditionError> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Num(n) => Ok(*n != 0.0),
            Value::Str(_) => Err(ConditionError::NotLogical),
        }
    }
}

/// Evaluate `text` as a logical condition
pub fn evaluate(text: &str, env: &dyn ConditionEnv) -> Result<bool, ConditionError> {
    let tokens = tokenize(text)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        env,
    };
    let value = parser.or_expr()?;
    if let Some(extra) = parser.peek() {
        return Err(ConditionError::UnexpectedToken(extra.to_string()));
    }
    value.truth()
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Str(String),
    Num(f64),
    Word(String),
    Op(&'static str),
}

impl std::fmt::Display for Tok {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tok::Str(s) => write!(f, "\"{s}\""),
            Tok::Num(n) => write!(f, "{n}"),
            Tok::Word(w) => f.write_str(w),
            Tok::Op(op) => f.write_str(op),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<Tok>, ConditionError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '"' | '\'' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(ConditionError::UnterminatedString),
                        Some(&q) if q == quote => {
                            if chars.get(i + 1) == Some(&quote) {
                                value.push(quote);
                                i += 2;
                            } else {
                                i += 1;
                                break;
                            }
                        }
                        Some('~') if i + 1 < chars.len() => {
                            value.push(chars[i + 1]);
                            i += 2;
                        }
                        Some(&other) => {
                            value.push(other);
                            i += 1;
                        }
                    }
                }
                // String attributes such as "x":U
                if chars.get(i) == Some(&':')
                    && chars.get(i + 1).is_some_and(|c| c.is_ascii_alphabetic())
                {
                    i += 1;
                    while chars.get(i).is_some_and(|c| c.is_ascii_alphanumeric()) {
                        i += 1;
                    }
                }
                tokens.push(Tok::Str(value));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let number = literal
                    .trim_end_matches('.')
                    .parse()
                    .map_err(|_| ConditionError::UnexpectedToken(literal.clone()))?;
                tokens.push(Tok::Num(number));
            }
            c if c.is_alphabetic() || c == '_' || c == '&' => {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '-' | '#' | '$'))
                {
                    i += 1;
                }
                tokens.push(Tok::Word(chars[start..i].iter().collect()));
            }
            '<' | '>' => {
                let op = match (c, chars.get(i + 1)) {
                    ('<', Some('>')) => "<>",
                    ('<', Some('=')) => "<=",
                    ('>', Some('=')) => ">=",
                    ('<', _) => "<",
                    _ => ">",
                };
                i += op.len();
                tokens.push(Tok::Op(op));
            }
            '=' => {
                i += 1;
                tokens.push(Tok::Op("="));
            }
            '+' => {
                i += 1;
                tokens.push(Tok::Op("+"));
            }
            '-' => {
                i += 1;
                tokens.push(Tok::Op("-"));
            }
            '(' => {
                i += 1;
                tokens.push(Tok::Op("("));
            }
            ')' => {
                i += 1;
                tokens.push(Tok::Op(")"));
            }
            other => return Err(ConditionError::UnexpectedChar(other)),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Tok>,
    pos: usize,
    env: &'a dyn ConditionEnv,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Tok, ConditionError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ConditionError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Tok::Word(w)) if w.eq_ignore_ascii_case(word)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Tok::Op(o)) if *o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), ConditionError> {
        if self.eat_op(op) {
            Ok(())
        } else {
            match self.peek() {
                Some(token) => Err(ConditionError::UnexpectedToken(token.to_string())),
                None => Err(ConditionError::UnexpectedEnd),
            }
        }
    }

    fn or_expr(&mut self) -> Result<Value, ConditionError> {
        let mut left = self.and_expr()?;
        while self.eat_word("OR") {
            let right = self.and_expr()?;
            left = Value::Bool(left.truth()? || right.truth()?);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Value, ConditionError> {
        let mut left = self.not_expr()?;
        while self.eat_word("AND") {
            let right = self.not_expr()?;
            left = Value::Bool(left.truth()? && right.truth()?);
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Value, ConditionError> {
        if self.eat_word("NOT") {
            let operand = self.not_expr()?;
            return Ok(Value::Bool(!operand.truth()?));
        }
        self.comparison()
    }

    fn comparison_op(&mut self) -> Option<&'static str> {
        let op = match self.peek()? {
            Tok::Op(op) if matches!(*op, "=" | "<>" | "<" | ">" | "<=" | ">=") => *op,
            Tok::Word(w) => match w.to_ascii_uppercase().as_str() {
                "EQ" => "=",
                "NE" => "<>",
                "LT" => "<",
                "GT" => ">",
                "LE" => "<=",
                "GE" => ">=",
                "BEGINS" => "BEGINS",
                _ => return None,
            },
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    fn comparison(&mut self) -> Result<Value, ConditionError> {
        let left = self.additive()?;
        let Some(op) = self.comparison_op() else {
            return Ok(left);
        };
        let right = self.additive()?;

        if op == "BEGINS" {
            return match (&left, &right) {
                (Value::Str(a), Value::Str(b)) => Ok(Value::Bool(
                    a.to_lowercase().starts_with(&b.to_lowercase()),
                )),
                _ => Err(ConditionError::TypeMismatch(op.to_string())),
            };
        }

        let ordering = match (&left, &right) {
            (Value::Str(a), Value::Str(b)) => a
                .trim_end()
                .to_lowercase()
                .cmp(&b.trim_end().to_lowercase()),
            (Value::Num(a), Value::Num(b)) => a
                .partial_cmp(b)
                .ok_or_else(|| ConditionError::TypeMismatch(op.to_string()))?,
            (Value::Bool(a), Value::Bool(b)) if matches!(op, "=" | "<>") => a.cmp(b),
            _ => return Err(ConditionError::TypeMismatch(op.to_string())),
        };
        let result = match op {
            "=" => ordering == Ordering::Equal,
            "<>" => ordering != Ordering::Equal,
            "<" => ordering == Ordering::Less,
            ">" => ordering == Ordering::Greater,
            "<=" => ordering != Ordering::Greater,
            _ => ordering != Ordering::Less,
        };
        Ok(Value::Bool(result))
    }

    fn additive(&mut self) -> Result<Value, ConditionError> {
        let mut left = self.unary()?;
        loop {
            if self.eat_op("+") {
                let right = self.unary()?;
                left = match (left, right) {
                    (Value::Num(a), Value::Num(b)) => Value::Num(a + b),
                    (Value::Str(a), Value::Str(b)) => Value::Str(a + &b),
                    _ => return Err(ConditionError::TypeMismatch("+".to_string())),
                };
            } else if self.eat_op("-") {
                let right = self.unary()?;
                left = match (left, right) {
                    (Value::Num(a), Value::Num(b)) => Value::Num(a - b),
                    _ => return Err(ConditionError::TypeMismatch("-".to_string())),
                };
            } else {
                return Ok(left);
            }
        }
    }

    fn unary(&mut self) -> Result<Value, ConditionError> {
        if self.eat_op("-") {
            return match self.unary()? {
                Value::Num(n) => Ok(Value::Num(-n)),
                _ => Err(ConditionError::TypeMismatch("-".to_string())),
            };
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Value, ConditionError> {
        match self.next()? {
            Tok::Str(s) => Ok(Value::Str(s)),
            Tok::Num(n) => Ok(Value::Num(n)),
            Tok::Op("(") => {
                let value = self.or_expr()?;
                self.expect_op(")")?;
                Ok(value)
            }
            Tok::Op(op) => Err(ConditionError::UnexpectedToken(op.to_string())),
            Tok::Word(word) => self.word(word),
        }
    }

    fn word(&mut self, word: String) -> Result<Value, ConditionError> {
        match word.to_ascii_uppercase().as_str() {
            "TRUE" | "YES" => Ok(Value::Bool(true)),
            "FALSE" | "NO" => Ok(Value::Bool(false)),
            "OPSYS" => Ok(Value::Str(self.env.opsys().to_string())),
            "PROVERSION" => Ok(Value::Str(self.env.proversion().to_string())),
            "DEFINED" => {
                self.expect_op("(")?;
                let name = match self.next()? {
                    Tok::Word(name) => name,
                    other => return Err(ConditionError::UnexpectedToken(other.to_string())),
                };
                self.expect_op(")")?;
                let name = name.trim_start_matches('&');
                Ok(Value::Num(f64::from(self.env.defined(name))))
            }
            "INTEGER" | "INT" | "DECIMAL" | "DEC" => {
                self.expect_op("(")?;
                let value = self.or_expr()?;
                self.expect_op(")")?;
                let number = match value {
                    Value::Num(n) => n,
                    Value::Bool(b) => f64::from(u8::from(b)),
                    Value::Str(s) => s
                        .trim()
                        .parse()
                        .map_err(|_| ConditionError::TypeMismatch(word.clone()))?,
                };
                if word.to_ascii_uppercase().starts_with("INT") {
                    Ok(Value::Num(number.round()))
                } else {
                    Ok(Value::Num(number))
                }
            }
            _ => Err(ConditionError::UnknownName(word)),
        }
    }
}
