//! Byte-level tokenizer for PDF object syntax

use log::{trace, warn};
use crate::error::{PDFError, PDFResult};
use super::{Dictionary, Object, ObjectId, Stream};

/// Default limit on array/dictionary nesting
pub const DEFAULT_MAX_NESTING: usize = 256;

pub(crate) fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b'\0' | b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

pub(crate) fn is_delimiter(byte: u8) -> bool {
    matches!(byte, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

fn is_regular(byte: u8) -> bool {
    !is_whitespace(byte) && !is_delimiter(byte)
}

/// Cursor over PDF bytes that reads tokens and direct objects
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
    max_nesting: usize,
}

impl<'a> Lexer<'a> {
    /// Create lexer positioned at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self::at(data, 0)
    }

    /// Create lexer positioned at `pos`
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self {
            data,
            pos,
            max_nesting: DEFAULT_MAX_NESTING,
        }
    }

    pub fn with_max_nesting(mut self, max_nesting: usize) -> Self {
        self.max_nesting = max_nesting;
        self
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn error(&self, msg: &str) -> PDFError {
        PDFError::malformed(format!("{} at byte {}", msg, self.pos))
    }

    /// Skip whitespace and comments
    pub fn skip_whitespace(&mut self) {
        while let Some(byte) = self.peek() {
            if is_whitespace(byte) {
                self.pos += 1;
            } else if byte == b'%' {
                while let Some(b) = self.peek() {
                    if b == b'\n' || b == b'\r' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    /// Read a run of regular characters, such as `obj` or `trailer`
    pub fn read_keyword(&mut self) -> &'a [u8] {
        self.skip_whitespace();
        let start = self.pos;
        while self.peek().map_or(false, is_regular) {
            self.pos += 1;
        }
        &self.data[start..self.pos]
    }

    /// Consume `keyword` or fail
    pub fn expect_keyword(&mut self, keyword: &str) -> PDFResult<()> {
        let start = self.pos;
        if self.read_keyword() == keyword.as_bytes() {
            Ok(())
        } else {
            self.pos = start;
            Err(self.error(&format!("Expected '{}'", keyword)))
        }
    }

    /// Check for `keyword` without consuming it
    pub fn peek_keyword(&mut self, keyword: &str) -> bool {
        let start = self.pos;
        let found = self.read_keyword() == keyword.as_bytes();
        self.pos = start;
        found
    }

    /// Read an unsigned decimal integer
    pub fn read_unsigned(&mut self) -> Option<u64> {
        self.skip_whitespace();
        let start = self.pos;
        while self.peek().map_or(false, |b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start || self.peek().map_or(false, is_regular) {
            self.pos = start;
            return None;
        }
        std::str::from_utf8(&self.data[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
    }

    /// Read a direct object; `n g R` sequences become references
    pub fn read_object(&mut self) -> PDFResult<Object> {
        self.read_object_nested(0)
    }

    fn read_object_nested(&mut self, depth: usize) -> PDFResult<Object> {
        if depth > self.max_nesting {
            return Err(self.error("Object nesting too deep"));
        }

        self.skip_whitespace();
        let byte = self.peek().ok_or_else(|| self.error("Unexpected end of data"))?;

        match byte {
            b'/' => self.read_name().map(Object::Name),
            b'(' => self.read_literal_string().map(Object::String),
            b'[' => self.read_array(depth),
            b'<' if self.data.get(self.pos + 1) == Some(&b'<') => {
                self.read_dictionary(depth).map(Object::Dictionary)
            }
            b'<' => self.read_hex_string().map(Object::String),
            b'+' | b'-' | b'.' | b'0'..=b'9' => self.read_number(),
            _ => {
                let start = self.pos;
                match self.read_keyword() {
                    b"true" => Ok(Object::Boolean(true)),
                    b"false" => Ok(Object::Boolean(false)),
                    b"null" => Ok(Object::Null),
                    other => {
                        let token = String::from_utf8_lossy(other).into_owned();
                        self.pos = start;
                        Err(self.error(&format!("Unexpected token '{}'", token)))
                    }
                }
            }
        }
    }

    fn read_number(&mut self) -> PDFResult<Object> {
        let start = self.pos;
        while self
            .peek()
            .map_or(false, |b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.'))
        {
            self.pos += 1;
        }
        let token = std::str::from_utf8(&self.data[start..self.pos])
            .map_err(|_| self.error("Invalid number"))?;

        if token.contains('.') {
            // Tolerate "-.5" and trailing-dot forms such as "5."
            let value: f64 = token
                .parse()
                .or_else(|_| token.trim_end_matches('.').parse())
                .map_err(|_| self.error(&format!("Invalid real '{}'", token)))?;
            return Ok(Object::Real(value));
        }

        let value: i64 = match token.parse() {
            Ok(v) => v,
            Err(_) => {
                // Out-of-range integers degrade to reals
                let real: f64 = token
                    .parse()
                    .map_err(|_| self.error(&format!("Invalid integer '{}'", token)))?;
                return Ok(Object::Real(real));
            }
        };

        let unsigned = token.bytes().all(|b| b.is_ascii_digit());
        if unsigned {
            if let Some(id) = self.try_reference_tail(value) {
                return Ok(Object::Reference(id));
            }
        }
        Ok(Object::Integer(value))
    }

    /// Look ahead for `g R` after an object number
    fn try_reference_tail(&mut self, number: i64) -> Option<ObjectId> {
        let checkpoint = self.pos;
        let result = (|| {
            let generation = self.read_unsigned()?;
            self.skip_whitespace();
            if self.peek() != Some(b'R') || self.data.get(self.pos + 1).map_or(false, |&b| is_regular(b)) {
                return None;
            }
            self.pos += 1;
            Some(ObjectId::new(
                u32::try_from(number).ok()?,
                u16::try_from(generation).ok()?,
            ))
        })();

        if result.is_none() {
            self.pos = checkpoint;
        }
        result
    }

    fn read_name(&mut self) -> PDFResult<String> {
        self.pos += 1;
        let mut bytes = Vec::new();
        while let Some(byte) = self.peek() {
            if !is_regular(byte) {
                break;
            }
            self.pos += 1;
            if byte == b'#' {
                let escaped = self
                    .data
                    .get(self.pos..self.pos + 2)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                match escaped {
                    Some(value) => {
                        bytes.push(value);
                        self.pos += 2;
                    }
                    None => bytes.push(b'#'),
                }
            } else {
                bytes.push(byte);
            }
        }

        match String::from_utf8(bytes) {
            Ok(name) => Ok(name),
            Err(err) => {
                warn!("Name at byte {} is not UTF-8, replacing invalid bytes", self.pos);
                Ok(String::from_utf8_lossy(err.as_bytes()).into_owned())
            }
        }
    }

    fn read_literal_string(&mut self) -> PDFResult<Vec<u8>> {
        self.pos += 1;
        let mut output = Vec::new();
        let mut depth = 1usize;

        loop {
            let byte = self
                .peek()
                .ok_or_else(|| self.error("Unterminated literal string"))?;
            self.pos += 1;

            match byte {
                b'(' => {
                    depth += 1;
                    output.push(byte);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(output);
                    }
                    output.push(byte);
                }
                b'\r' => {
                    // Bare EOL markers read as a single newline
                    if self.peek() == Some(b'\n') {
                        self.pos += 1;
                    }
                    output.push(b'\n');
                }
                b'\\' => self.read_escape(&mut output)?,
                _ => output.push(byte),
            }
        }
    }

    fn read_escape(&mut self, output: &mut Vec<u8>) -> PDFResult<()> {
        let byte = self
            .peek()
            .ok_or_else(|| self.error("Unterminated escape sequence"))?;
        self.pos += 1;

        match byte {
            b'n' => output.push(b'\n'),
            b'r' => output.push(b'\r'),
            b't' => output.push(b'\t'),
            b'b' => output.push(0x08),
            b'f' => output.push(0x0C),
            b'0'..=b'7' => {
                let mut value = u32::from(byte - b'0');
                for _ in 0..2 {
                    match self.peek() {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            self.pos += 1;
                        }
                        _ => break,
                    }
                }
                output.push((value & 0xFF) as u8);
            }
            // Line continuation
            b'\r' => {
                if self.peek() == Some(b'\n') {
                    self.pos += 1;
                }
            }
            b'\n' => {}
            // \( \) \\ and unknown escapes yield the character itself
            other => output.push(other),
        }
        Ok(())
    }

    fn read_hex_string(&mut self) -> PDFResult<Vec<u8>> {
        self.pos += 1;
        let mut digits = Vec::new();

        loop {
            let byte = self
                .peek()
                .ok_or_else(|| self.error("Unterminated hex string"))?;
            self.pos += 1;
            match byte {
                b'>' => break,
                b if b.is_ascii_hexdigit() => digits.push(b),
                b if is_whitespace(b) => continue,
                _ => return Err(self.error("Invalid character in hex string")),
            }
        }

        if digits.len() % 2 == 1 {
            digits.push(b'0');
        }
        hex::decode(&digits).map_err(|_| self.error("Invalid hex string"))
    }

    fn read_array(&mut self, depth: usize) -> PDFResult<Object> {
        self.pos += 1;
        let mut items = Vec::new();

        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(self.error("Unterminated array")),
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Object::Array(items));
                }
                Some(_) => items.push(self.read_object_nested(depth + 1)?),
            }
        }
    }

    fn read_dictionary(&mut self, depth: usize) -> PDFResult<Dictionary> {
        self.pos += 2;
        let mut dict = Dictionary::new();

        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(self.error("Unterminated dictionary")),
                Some(b'>') => {
                    if self.data.get(self.pos + 1) != Some(&b'>') {
                        return Err(self.error("Expected '>>'"));
                    }
                    self.pos += 2;
                    return Ok(dict);
                }
                Some(b'/') => {
                    let key = self.read_name()?;
                    self.skip_whitespace();
                    if self.data.get(self.pos..self.pos + 2) == Some(b">>") {
                        warn!("Dictionary key /{} has no value", key);
                        continue;
                    }
                    let value = self.read_object_nested(depth + 1)?;
                    // A null value is equivalent to an absent entry
                    if !value.is_null() {
                        dict.set(key, value);
                    }
                }
                Some(_) => return Err(self.error("Dictionary key is not a name")),
            }
        }
    }

    /// Read an indirect object `n g obj ... endobj` starting at the cursor
    ///
    /// `resolve_length` supplies the value of an indirect `/Length`.
    pub fn read_indirect_object(
        &mut self,
        resolve_length: &dyn Fn(ObjectId) -> Option<i64>,
    ) -> PDFResult<(ObjectId, Object)> {
        let number = self
            .read_unsigned()
            .ok_or_else(|| self.error("Expected object number"))?;
        let generation = self
            .read_unsigned()
            .ok_or_else(|| self.error("Expected generation number"))?;
        self.expect_keyword("obj")?;

        let id = ObjectId::new(
            u32::try_from(number).map_err(|_| self.error("Object number out of range"))?,
            u16::try_from(generation).map_err(|_| self.error("Generation out of range"))?,
        );
        trace!("Reading object {}", id);

        let object = match self.read_object()? {
            Object::Dictionary(dict) if self.peek_keyword("stream") => {
                Object::Stream(self.read_stream_body(dict, resolve_length)?)
            }
            other => other,
        };

        if self.expect_keyword("endobj").is_err() {
            warn!("Object {} is missing 'endobj'", id);
        }
        Ok((id, object))
    }

    fn read_stream_body(
        &mut self,
        dict: Dictionary,
        resolve_length: &dyn Fn(ObjectId) -> Option<i64>,
    ) -> PDFResult<Stream> {
        self.expect_keyword("stream")?;
        // The keyword is followed by CRLF or LF; a lone CR is tolerated
        match self.peek() {
            Some(b'\r') => {
                self.pos += 1;
                if self.peek() == Some(b'\n') {
                    self.pos += 1;
                }
            }
            Some(b'\n') => self.pos += 1,
            _ => {}
        }
        let start = self.pos;

        let length = match dict.get("Length") {
            Some(Object::Reference(id)) => resolve_length(*id),
            Some(other) => other.as_integer(),
            None => None,
        };

        let end = match length {
            Some(len) if len >= 0 => start
                .checked_add(len as usize)
                .filter(|&end| end <= self.data.len())
                .ok_or_else(|| self.error("Stream length mismatch"))?,
            Some(_) => return Err(self.error("Negative stream length")),
            None => {
                warn!("Stream at byte {} has no usable /Length, scanning for endstream", start);
                self.scan_for_endstream(start)?
            }
        };

        self.pos = end;
        if !self.peek_keyword("endstream") {
            return Err(self.error("Stream length mismatch"));
        }
        self.expect_keyword("endstream")?;

        Ok(Stream::new(dict, self.data[start..end].to_vec()))
    }

    fn scan_for_endstream(&self, start: usize) -> PDFResult<usize> {
        let marker = b"endstream";
        let offset = self.data[start..]
            .windows(marker.len())
            .position(|w| w == marker)
            .ok_or_else(|| self.error("Missing endstream"))?;
        let mut end = start + offset;
        // Drop the EOL that precedes the keyword
        if end > start && self.data[end - 1] == b'\n' {
            end -= 1;
        }
        if end > start && self.data[end - 1] == b'\r' {
            end -= 1;
        }
        Ok(end)
    }
}
