//! Source reader for boot code, the `parse` library, and the REPL.
//!
//! Reads one textual form at a time: parenthesized and bracketed tuples,
//! numbers through the core scanner, strings with escapes, keywords,
//! symbols, the three literal words, quote sugar, and `#` line comments.

use quartz_core::{scan, QuartzError, Result, Value};

pub struct Reader<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(src: &'a str) -> Reader<'a> {
        Reader { src, pos: 0 }
    }

    /// Read the next form, or `None` at end of input.
    pub fn next_form(&mut self) -> Result<Option<Value>> {
        self.skip_blank();
        if self.pos >= self.src.len() {
            return Ok(None);
        }
        self.form().map(Some)
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn skip_blank(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_whitespace() {
                self.pos += 1;
            } else if c == b'#' {
                while let Some(c) = self.peek() {
                    self.pos += 1;
                    if c == b'\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn form(&mut self) -> Result<Value> {
        match self.peek() {
            None => Err(QuartzError::value("unexpected end of input")),
            Some(b'(') => self.sequence(b')'),
            Some(b'[') => self.sequence(b']'),
            Some(b')') | Some(b']') => {
                Err(QuartzError::value("unexpected closing delimiter"))
            }
            Some(b'"') => self.string(),
            Some(b'\'') => {
                self.pos += 1;
                self.skip_blank();
                let quoted = self.form()?;
                Ok(Value::tuple(vec![Value::symbol("quote"), quoted]))
            }
            Some(b':') => {
                self.pos += 1;
                let name = self.token();
                Ok(Value::keyword(name))
            }
            Some(_) => {
                let token = self.token();
                if let Some(n) = scan::scan_number(token) {
                    return Ok(Value::Number(n));
                }
                Ok(match token {
                    "nil" => Value::Nil,
                    "true" => Value::Boolean(true),
                    "false" => Value::Boolean(false),
                    _ => Value::symbol(token),
                })
            }
        }
    }

    fn sequence(&mut self, close: u8) -> Result<Value> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_blank();
            match self.peek() {
                None => return Err(QuartzError::value("unexpected end of input")),
                Some(c) if c == close => {
                    self.pos += 1;
                    // Bracket forms are data constructors to the evaluator.
                    return Ok(if close == b']' {
                        Value::bracket_tuple(items)
                    } else {
                        Value::tuple(items)
                    });
                }
                Some(b')') | Some(b']') => {
                    return Err(QuartzError::value("mismatched closing delimiter"));
                }
                Some(_) => items.push(self.form()?),
            }
        }
    }

    fn string(&mut self) -> Result<Value> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(QuartzError::value("unterminated string"));
            };
            self.pos += 1;
            match c {
                b'"' => return Ok(Value::from(out)),
                b'\\' => {
                    let Some(escape) = self.peek() else {
                        return Err(QuartzError::value("unterminated string"));
                    };
                    self.pos += 1;
                    out.push(match escape {
                        b'n' => '\n',
                        b't' => '\t',
                        b'r' => '\r',
                        b'0' => '\0',
                        b'"' => '"',
                        b'\\' => '\\',
                        other => {
                            return Err(QuartzError::value(format!(
                                "unknown escape \\{}",
                                other as char
                            )));
                        }
                    });
                }
                _ => {
                    // Copy the whole UTF-8 character, not just its first
                    // byte.
                    let start = self.pos - 1;
                    let end = next_boundary(self.src, start);
                    out.push_str(&self.src[start..end]);
                    self.pos = end;
                }
            }
        }
    }

    /// Consume symbol characters, returning the token text.
    fn token(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_whitespace() || matches!(c, b'(' | b')' | b'[' | b']' | b'"' | b'#' | b'\'') {
                break;
            }
            self.pos += 1;
        }
        &self.src[start..self.pos]
    }
}

fn next_boundary(src: &str, start: usize) -> usize {
    let mut end = start + 1;
    while end < src.len() && !src.is_char_boundary(end) {
        end += 1;
    }
    end
}

/// Read exactly one form from `src`.
pub fn parse(src: &str) -> Result<Value> {
    match Reader::new(src).next_form()? {
        Some(form) => Ok(form),
        None => Err(QuartzError::value("no form in input")),
    }
}

/// Read every form in `src`.
pub fn parse_all(src: &str) -> Result<Vec<Value>> {
    let mut reader = Reader::new(src);
    let mut forms = Vec::new();
    while let Some(form) = reader.next_form()? {
        forms.push(form);
    }
    Ok(forms)
}
