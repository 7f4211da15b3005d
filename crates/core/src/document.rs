//! Untyped structured document: the JSON-shaped tree carried inside the
//! transport encoding, plus a recursive-descent reader and a writer for it.
//!
//! Typed projection into snapshots lives in [`crate::codec`].

use std::fmt::Write as _;

use crate::error::CodecError;

/// Nesting beyond this depth is rejected rather than recursed into.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone)]
pub enum DocValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Array(Vec<DocValue>),
    /// Members in document order. Duplicate keys are kept; lookups see the last one.
    Object(Vec<(String, DocValue)>),
}

impl PartialEq for DocValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b).is_eq(),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl DocValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DocValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            DocValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            DocValue::Integer(n) => Some(*n),
            DocValue::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            DocValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[DocValue]> {
        match self {
            DocValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&DocValue> {
        match self {
            DocValue::Object(members) => members
                .iter()
                .rev()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            DocValue::Null => "null",
            DocValue::Bool(_) => "boolean",
            DocValue::Integer(_) | DocValue::Float(_) => "number",
            DocValue::Text(_) => "string",
            DocValue::Array(_) => "array",
            DocValue::Object(_) => "object",
        }
    }
}

// ============================================================================
// Reader
// ============================================================================

pub fn parse(input: &str) -> Result<DocValue, CodecError> {
    let mut reader = Reader {
        bytes: input.as_bytes(),
        pos: 0,
        depth: 0,
    };
    reader.skip_ws();
    let value = reader.value()?;
    reader.skip_ws();
    if reader.pos != reader.bytes.len() {
        return Err(CodecError::malformed(reader.pos, "trailing characters"));
    }
    Ok(value)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
}

impl Reader<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, want: u8) -> Result<(), CodecError> {
        match self.bump() {
            Some(b) if b == want => Ok(()),
            Some(b) => Err(CodecError::malformed(
                self.pos - 1,
                format!("expected '{}', found '{}'", want as char, b as char),
            )),
            None => Err(CodecError::malformed(
                self.pos,
                format!("expected '{}', found end of input", want as char),
            )),
        }
    }

    fn value(&mut self) -> Result<DocValue, CodecError> {
        match self.peek() {
            Some(b'{') => self.nested(Self::object),
            Some(b'[') => self.nested(Self::array),
            Some(b'"') => self.string().map(DocValue::Text),
            Some(b'-' | b'0'..=b'9') => self.number(),
            Some(b't') => self.literal("true", DocValue::Bool(true)),
            Some(b'f') => self.literal("false", DocValue::Bool(false)),
            Some(b'n') => self.literal("null", DocValue::Null),
            Some(b) => Err(CodecError::malformed(
                self.pos,
                format!("unexpected character '{}'", b as char),
            )),
            None => Err(CodecError::malformed(self.pos, "unexpected end of input")),
        }
    }

    fn nested(
        &mut self,
        body: fn(&mut Self) -> Result<DocValue, CodecError>,
    ) -> Result<DocValue, CodecError> {
        if self.depth >= MAX_DEPTH {
            return Err(CodecError::malformed(self.pos, "nesting too deep"));
        }
        self.depth += 1;
        let value = body(self);
        self.depth -= 1;
        value
    }

    fn object(&mut self) -> Result<DocValue, CodecError> {
        self.expect(b'{')?;
        let mut members = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(DocValue::Object(members));
        }
        loop {
            self.skip_ws();
            if self.peek() != Some(b'"') {
                return Err(CodecError::malformed(self.pos, "expected member name"));
            }
            let key = self.string()?;
            self.skip_ws();
            self.expect(b':')?;
            self.skip_ws();
            let value = self.value()?;
            members.push((key, value));
            self.skip_ws();
            match self.bump() {
                Some(b',') => continue,
                Some(b'}') => return Ok(DocValue::Object(members)),
                _ => {
                    return Err(CodecError::malformed(
                        self.pos.saturating_sub(1),
                        "expected ',' or '}'",
                    ));
                }
            }
        }
    }

    fn array(&mut self) -> Result<DocValue, CodecError> {
        self.expect(b'[')?;
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(DocValue::Array(items));
        }
        loop {
            self.skip_ws();
            items.push(self.value()?);
            self.skip_ws();
            match self.bump() {
                Some(b',') => continue,
                Some(b']') => return Ok(DocValue::Array(items)),
                _ => {
                    return Err(CodecError::malformed(
                        self.pos.saturating_sub(1),
                        "expected ',' or ']'",
                    ));
                }
            }
        }
    }

    fn literal(&mut self, word: &str, value: DocValue) -> Result<DocValue, CodecError> {
        let end = self.pos + word.len();
        if self.bytes.get(self.pos..end) == Some(word.as_bytes()) {
            self.pos = end;
            Ok(value)
        } else {
            Err(CodecError::malformed(self.pos, format!("expected '{word}'")))
        }
    }

    fn digits(&mut self) -> usize {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        self.pos - start
    }

    fn number(&mut self) -> Result<DocValue, CodecError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        let int_start = self.pos;
        if self.digits() == 0 {
            return Err(CodecError::malformed(self.pos, "expected digit"));
        }
        if self.bytes[int_start] == b'0' && self.pos - int_start > 1 {
            return Err(CodecError::malformed(int_start, "leading zero"));
        }

        let mut integral = true;
        if self.peek() == Some(b'.') {
            integral = false;
            self.pos += 1;
            if self.digits() == 0 {
                return Err(CodecError::malformed(self.pos, "expected fraction digits"));
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            integral = false;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if self.digits() == 0 {
                return Err(CodecError::malformed(self.pos, "expected exponent digits"));
            }
        }

        // The scanned range is ASCII by construction.
        let text = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|_| CodecError::malformed(start, "invalid number"))?;
        if integral {
            if let Ok(n) = text.parse::<i64>() {
                return Ok(DocValue::Integer(n));
            }
        }
        text.parse::<f64>()
            .map(DocValue::Float)
            .map_err(|_| CodecError::malformed(start, "invalid number"))
    }

    fn hex4(&mut self) -> Result<u32, CodecError> {
        let start = self.pos;
        let mut code = 0u32;
        for _ in 0..4 {
            let digit = match self.bump() {
                Some(b @ b'0'..=b'9') => b - b'0',
                Some(b @ b'a'..=b'f') => b - b'a' + 10,
                Some(b @ b'A'..=b'F') => b - b'A' + 10,
                _ => return Err(CodecError::malformed(start, "invalid \\u escape")),
            };
            code = code * 16 + u32::from(digit);
        }
        Ok(code)
    }

    /// Reads a `\uXXXX` escape (the `\u` already consumed), joining surrogate pairs.
    fn unicode_escape(&mut self) -> Result<char, CodecError> {
        let start = self.pos.saturating_sub(2);
        let first = self.hex4()?;
        let code = match first {
            0xD800..=0xDBFF => {
                if self.bytes.get(self.pos..self.pos + 2) != Some(b"\\u".as_slice()) {
                    return Err(CodecError::malformed(start, "unpaired high surrogate"));
                }
                self.pos += 2;
                let second = self.hex4()?;
                if !(0xDC00..=0xDFFF).contains(&second) {
                    return Err(CodecError::malformed(start, "invalid low surrogate"));
                }
                0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00)
            }
            0xDC00..=0xDFFF => {
                return Err(CodecError::malformed(start, "unpaired low surrogate"));
            }
            other => other,
        };
        char::from_u32(code).ok_or_else(|| CodecError::malformed(start, "invalid code point"))
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let start = self.pos;
        self.expect(b'"')?;
        let mut out: Vec<u8> = Vec::new();
        loop {
            match self.bump() {
                None => return Err(CodecError::malformed(start, "unterminated string")),
                Some(b'"') => break,
                Some(b'\\') => {
                    let escaped = match self.bump() {
                        Some(b'"') => b'"',
                        Some(b'\\') => b'\\',
                        Some(b'/') => b'/',
                        Some(b'b') => 0x08,
                        Some(b'f') => 0x0C,
                        Some(b'n') => b'\n',
                        Some(b'r') => b'\r',
                        Some(b't') => b'\t',
                        Some(b'u') => {
                            let ch = self.unicode_escape()?;
                            let mut buf = [0u8; 4];
                            out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                            continue;
                        }
                        _ => {
                            return Err(CodecError::malformed(
                                self.pos.saturating_sub(1),
                                "invalid escape",
                            ));
                        }
                    };
                    out.push(escaped);
                }
                Some(b) if b < 0x20 => {
                    return Err(CodecError::malformed(
                        self.pos - 1,
                        "control character in string",
                    ));
                }
                Some(b) => out.push(b),
            }
        }
        String::from_utf8(out).map_err(|_| CodecError::malformed(start, "invalid UTF-8 in string"))
    }
}

// ============================================================================
// Writer
// ============================================================================

pub fn render(value: &DocValue) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &DocValue) {
    match value {
        DocValue::Null => out.push_str("null"),
        DocValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        DocValue::Integer(n) => {
            let _ = write!(out, "{n}");
        }
        DocValue::Float(f) if f.is_finite() => {
            let _ = write!(out, "{f:?}");
        }
        DocValue::Float(_) => out.push_str("null"),
        DocValue::Text(s) => write_string(out, s),
        DocValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        DocValue::Object(members) => {
            out.push('{');
            for (i, (key, item)) in members.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, item);
            }
            out.push('}');
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0C}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
