//! Output parser for the decryption tool's diagnostic text.
//!
//! The ad-hoc `debug` action prints a banner line such as
//! `localhost | SUCCESS => {` followed by a brace-delimited object holding the
//! requested variable. Anything around that block (warnings, deprecation
//! notices) is ignored.
//!
//! # Dialects
//!
//! - `json`: the default output of current tool versions
//! - `python`: Python literal style (`'single quotes'`, `True`, `None`),
//!   emitted by older callbacks
//! - `auto`: JSON first, Python literal as a fallback

use crate::error::{ExtractError, Result};
use crate::model::{Mapping, Node};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Grammar used to read the payload block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Auto,
    Json,
    Python,
}

/// Extracts the variables mapping from raw tool output.
#[derive(Debug, Clone)]
pub struct PayloadParser {
    banner: Regex,
    payload_key: String,
    dialect: Dialect,
}

impl PayloadParser {
    /// Create a parser for output produced for `host`, reading the variables
    /// from the `payload_key` field of the payload object.
    pub fn new(host: &str, payload_key: &str, dialect: Dialect) -> Result<Self> {
        let pattern = format!(r"(?m)^\s*{}\s*\|\s*SUCCESS\s*=>\s*", regex::escape(host));
        let banner = Regex::new(&pattern)
            .map_err(|e| ExtractError::InvalidConfig(format!("bad host pattern: {}", e)))?;

        Ok(Self {
            banner,
            payload_key: payload_key.to_string(),
            dialect,
        })
    }

    /// Parse tool stdout into the ordered variables mapping.
    pub fn parse(&self, stdout: &str) -> Result<Mapping> {
        let block = self.locate(stdout)?;
        debug!(bytes = block.len(), "located payload block");

        let document = parse_document(block, self.dialect)?;
        let Node::Map(entries) = document else {
            return Err(ExtractError::parse(block, "payload is not an object"));
        };

        match entries.into_iter().find(|(key, _)| *key == self.payload_key) {
            Some((_, Node::Map(variables))) => Ok(variables),
            Some((_, other)) => Err(ExtractError::NoPayloadFound {
                reason: format!(
                    "'{}' is a {}, not a mapping{}",
                    self.payload_key,
                    other.kind(),
                    match &other {
                        Node::String(s) => format!(" ({})", s),
                        _ => String::new(),
                    }
                ),
            }),
            None => Err(ExtractError::NoPayloadFound {
                reason: format!("payload has no '{}' field", self.payload_key),
            }),
        }
    }

    /// Find the brace-delimited block following the success banner.
    fn locate<'a>(&self, stdout: &'a str) -> Result<&'a str> {
        let banner = self
            .banner
            .find(stdout)
            .ok_or_else(|| ExtractError::NoPayloadFound {
                reason: "no '<host> | SUCCESS =>' line in tool output".to_string(),
            })?;

        let rest = &stdout[banner.end()..];
        if !rest.starts_with('{') {
            return Err(ExtractError::NoPayloadFound {
                reason: "success line is not followed by a '{' block".to_string(),
            });
        }

        let end = matching_brace(rest)
            .ok_or_else(|| ExtractError::parse(rest, "unbalanced braces in payload"))?;
        Ok(&rest[..=end])
    }
}

/// Byte index of the `}` closing the `{` at the start of `text`.
///
/// Braces inside single- or double-quoted strings are skipped.
fn matching_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (idx, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '"' | '\'' => quote = Some(c),
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse a payload block in the given dialect.
pub fn parse_document(text: &str, dialect: Dialect) -> Result<Node> {
    match dialect {
        Dialect::Json => parse_json(text),
        Dialect::Python => PyLiteral::new(text).parse(),
        Dialect::Auto => parse_json(text).or_else(|json_err| {
            debug!(error = %json_err, "payload is not JSON, trying Python literal");
            PyLiteral::new(text).parse()
        }),
    }
}

fn parse_json(text: &str) -> Result<Node> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(|e| {
        let line = text.lines().nth(e.line().saturating_sub(1)).unwrap_or(text);
        ExtractError::parse(line, e.to_string())
    })?;
    Ok(Node::from(value))
}

/// Recursive-descent reader for Python literal syntax.
struct PyLiteral<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> PyLiteral<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn parse(mut self) -> Result<Node> {
        let node = self.value()?;
        self.skip_ws();
        if self.pos < self.src.len() {
            return Err(self.error("trailing characters after payload"));
        }
        Ok(node)
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn error(&self, message: &str) -> ExtractError {
        ExtractError::parse(self.rest(), message)
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        self.skip_ws();
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            _ => Err(self.error(&format!("expected '{}'", expected))),
        }
    }

    fn value(&mut self) -> Result<Node> {
        self.skip_ws();
        match self.peek() {
            Some('{') => self.dict(),
            Some('[') => self.sequence('[', ']'),
            Some('(') => self.sequence('(', ')'),
            Some('\'') | Some('"') => self.string().map(Node::String),
            Some('u' | 'b') if matches!(self.rest()[1..].chars().next(), Some('\'' | '"')) => {
                self.bump();
                self.string().map(Node::String)
            }
            Some(c) if c == '-' || c == '+' || c.is_ascii_digit() => self.number(),
            Some(_) => self.word(),
            None => Err(self.error("unexpected end of payload")),
        }
    }

    fn dict(&mut self) -> Result<Node> {
        self.expect('{')?;
        let mut entries = Mapping::new();

        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.bump();
                return Ok(Node::Map(entries));
            }

            let key = match self.value()? {
                Node::String(s) => s,
                Node::Integer(i) => i.to_string(),
                Node::BigInt(digits) => digits,
                Node::Float(f) => f.to_string(),
                Node::Bool(true) => "True".to_string(),
                Node::Bool(false) => "False".to_string(),
                Node::Null => "None".to_string(),
                _ => return Err(self.error("mapping keys must be scalars")),
            };
            self.expect(':')?;
            let value = self.value()?;
            entries.push((key, value));

            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(Node::Map(entries)),
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn sequence(&mut self, open: char, close: char) -> Result<Node> {
        self.expect(open)?;
        let mut items = Vec::new();

        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.bump();
                return Ok(Node::List(items));
            }

            items.push(self.value()?);

            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(c) if c == close => return Ok(Node::List(items)),
                _ => return Err(self.error(&format!("expected ',' or '{}'", close))),
            }
        }
    }

    fn string(&mut self) -> Result<String> {
        let start = self.pos;
        let Some(quote) = self.bump() else {
            return Err(self.error("expected string"));
        };
        let mut out = String::new();

        loop {
            match self.bump() {
                None => {
                    self.pos = start;
                    return Err(self.error("unterminated string"));
                }
                Some(c) if c == quote => break,
                Some('\\') => {
                    let escaped = self.bump().ok_or_else(|| self.error("unterminated escape"))?;
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        'x' => out.push(self.hex_char(2)?),
                        'u' => out.push(self.hex_char(4)?),
                        'U' => out.push(self.hex_char(8)?),
                        '\n' => {}
                        other => out.push(other),
                    }
                }
                Some(c) => out.push(c),
            }
        }

        Ok(out)
    }

    fn hex_char(&mut self, digits: usize) -> Result<char> {
        let rest = self.rest();
        let hex = rest
            .get(..digits)
            .ok_or_else(|| self.error("truncated escape sequence"))?;
        let code = u32::from_str_radix(hex, 16).map_err(|_| self.error("invalid escape sequence"))?;
        let c = char::from_u32(code).ok_or_else(|| self.error("invalid code point"))?;
        self.pos += digits;
        Ok(c)
    }

    fn number(&mut self) -> Result<Node> {
        let start = self.pos;
        let mut is_float = false;
        let negative = self.peek() == Some('-');

        if matches!(self.peek(), Some('-' | '+')) {
            self.bump();
        }
        // -Infinity, -inf
        if matches!(self.peek(), Some(c) if c.is_alphabetic()) {
            return match self.word() {
                Ok(Node::Float(f)) => Ok(Node::Float(if negative { -f } else { f })),
                _ => {
                    self.pos = start;
                    Err(self.error("invalid number"))
                }
            };
        }
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => {}
                '.' | 'e' | 'E' => is_float = true,
                '-' | '+' if is_float => {}
                _ => break,
            }
            self.bump();
        }

        let literal: String = self.src[start..self.pos].chars().filter(|c| *c != '_').collect();
        if !is_float {
            if let Ok(i) = literal.parse::<i64>() {
                return Ok(Node::Integer(i));
            }
            let digits = literal.strip_prefix('+').unwrap_or(&literal);
            let magnitude = digits.strip_prefix('-').unwrap_or(digits);
            if !magnitude.is_empty() && magnitude.bytes().all(|b| b.is_ascii_digit()) {
                return Ok(Node::BigInt(digits.to_string()));
            }
        }
        literal
            .parse::<f64>()
            .map(Node::Float)
            .map_err(|_| ExtractError::parse(&self.src[start..], "invalid number"))
    }

    fn word(&mut self) -> Result<Node> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.bump();
        }

        match &self.src[start..self.pos] {
            "True" | "true" => Ok(Node::Bool(true)),
            "False" | "false" => Ok(Node::Bool(false)),
            "None" | "null" => Ok(Node::Null),
            // JSON encoders write Infinity/NaN, Python repr writes inf/nan
            "Infinity" | "inf" => Ok(Node::Float(f64::INFINITY)),
            "NaN" | "nan" => Ok(Node::Float(f64::NAN)),
            _ => {
                self.pos = start;
                Err(self.error("unexpected token"))
            }
        }
    }
}
