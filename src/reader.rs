use crate::error::{IotaError, IotaResult};
use crate::heap::{Heap, ListBuilder};
use crate::symbol::WellKnown;
use crate::value::Value;

/// Read one datum from the stream object `stream`.
/// Returns `eof` once the stream is exhausted before a datum starts.
pub fn read(heap: &mut Heap, syms: &WellKnown, stream: Value, eof: Value) -> IotaResult<Value> {
    let _pin = heap.root(stream);
    let mut reader = Reader { heap, syms, stream };
    Ok(reader.read_datum()?.unwrap_or(eof))
}

fn is_delimiter(c: Option<u8>) -> bool {
    match c {
        None => true,
        Some(c) => c.is_ascii_whitespace() || matches!(c, b'(' | b')' | b'"' | b';' | b'|'),
    }
}

fn is_initial(c: u8) -> bool {
    c.is_ascii_alphabetic() || matches!(c, b'*' | b'/' | b'>' | b'<' | b'=' | b'?' | b'!')
}

fn is_subsequent(c: u8) -> bool {
    is_initial(c) || c.is_ascii_digit() || c == b'+' || c == b'-'
}

fn read_error(msg: impl Into<String>) -> IotaError {
    IotaError::Read(msg.into())
}

/// Byte-at-a-time parser over a stream living in the heap.
struct Reader<'a> {
    heap: &'a mut Heap,
    syms: &'a WellKnown,
    stream: Value,
}

impl<'a> Reader<'a> {
    fn next(&mut self) -> IotaResult<Option<u8>> {
        self.heap.stream_mut(self.stream)?.read_byte()
    }

    fn peek(&mut self) -> IotaResult<Option<u8>> {
        self.heap.stream_mut(self.stream)?.peek_byte()
    }

    fn skip_whitespace_and_comments(&mut self) -> IotaResult<()> {
        loop {
            match self.peek()? {
                Some(c) if c.is_ascii_whitespace() => {
                    self.next()?;
                }
                Some(b';') => {
                    while !matches!(self.next()?, None | Some(b'\n')) {}
                }
                _ => return Ok(()),
            }
        }
    }

    /// One datum, or `None` at a clean end of input.
    fn read_datum(&mut self) -> IotaResult<Option<Value>> {
        self.skip_whitespace_and_comments()?;
        match self.next()? {
            None => Ok(None),
            Some(c) => self.read_starting_with(c).map(Some),
        }
    }

    /// One datum that must be present.
    fn read_expr(&mut self) -> IotaResult<Value> {
        self.read_datum()?
            .ok_or_else(|| read_error("unexpected end of input"))
    }

    fn read_starting_with(&mut self, c: u8) -> IotaResult<Value> {
        match c {
            b'#' => self.read_char(),
            b'0'..=b'9' => self.read_number(c),
            b'-' if matches!(self.peek()?, Some(d) if d.is_ascii_digit()) => self.read_number(c),
            b':' => self.read_name(c, true),
            b'+' | b'-' if is_delimiter(self.peek()?) => self.read_name(c, false),
            c if is_initial(c) => self.read_name(c, false),
            b'"' => self.read_string(),
            b'(' => self.read_list(),
            b')' => Err(read_error("unexpected ')'")),
            b'\'' => self.read_wrapped(self.syms.quote),
            b'`' => self.read_wrapped(self.syms.backquote),
            b',' => {
                if self.peek()? == Some(b'@') {
                    self.next()?;
                    self.read_wrapped(self.syms.comma_at)
                } else {
                    self.read_wrapped(self.syms.comma)
                }
            }
            b'|' => {
                let form = self.read_wrapped(self.syms.pipe)?;
                self.skip_whitespace_and_comments()?;
                match self.next()? {
                    Some(b'|') => Ok(form),
                    _ => Err(read_error("Unclosed pipe")),
                }
            }
            other => Err(read_error(format!(
                "Bad input: unexpected '{}'",
                other.escape_ascii()
            ))),
        }
    }

    /// `'x` and friends: `(tag x)`.
    fn read_wrapped(&mut self, tag: Value) -> IotaResult<Value> {
        let inner = self.read_expr()?;
        self.heap.list(&[tag, inner])
    }

    /// `#c` is the character c; `#\n`, `#\t`, `#\s` and `#\\` are escapes.
    fn read_char(&mut self) -> IotaResult<Value> {
        match self.next()? {
            None => Err(read_error("end of input in character literal")),
            Some(b'\\') => match self.next()? {
                Some(b'n') => Ok(Value::Char(b'\n')),
                Some(b't') => Ok(Value::Char(b'\t')),
                Some(b's') => Ok(Value::Char(b' ')),
                Some(b'\\') => Ok(Value::Char(b'\\')),
                Some(other) => Err(read_error(format!(
                    "Unrecognized special character '\\{}'",
                    other.escape_ascii()
                ))),
                None => Err(read_error("end of input in character literal")),
            },
            Some(c) => Ok(Value::Char(c)),
        }
    }

    fn read_number(&mut self, first: u8) -> IotaResult<Value> {
        let (sign, mut n) = if first == b'-' {
            (-1i64, 0i64)
        } else {
            (1, (first - b'0') as i64)
        };
        loop {
            match self.peek()? {
                Some(d) if d.is_ascii_digit() => {
                    self.next()?;
                    n = n
                        .checked_mul(10)
                        .and_then(|n| n.checked_add(sign * (d - b'0') as i64))
                        .ok_or_else(|| read_error("integer literal out of range"))?;
                }
                next if is_delimiter(next) => return Ok(Value::Fixnum(n)),
                _ => return Err(read_error("Number not followed by delimiter")),
            }
        }
    }

    /// Symbols, and keywords when `keyword` is set (the leading ':' is part
    /// of the name).
    fn read_name(&mut self, first: u8, keyword: bool) -> IotaResult<Value> {
        let mut name = vec![first];
        loop {
            match self.peek()? {
                Some(c) if is_subsequent(c) || (keyword && c == b':') => {
                    self.next()?;
                    name.push(c);
                }
                None => break,
                Some(c) if is_delimiter(Some(c)) => break,
                Some(c) => {
                    return Err(read_error(format!(
                        "{} not followed by delimiter; found '{}'",
                        if keyword { "Keyword" } else { "Symbol" },
                        c.escape_ascii()
                    )))
                }
            }
        }
        // Names are built only from ASCII bytes.
        let name = String::from_utf8_lossy(&name);
        if keyword {
            self.heap.intern_keyword(&name)
        } else {
            self.heap.intern_symbol(&name)
        }
    }

    fn read_string(&mut self) -> IotaResult<Value> {
        let mut bytes = Vec::new();
        loop {
            match self.next()? {
                None => return Err(read_error("Non-terminated string literal")),
                Some(b'"') => break,
                Some(b'\\') => match self.next()? {
                    None => return Err(read_error("Non-terminated string literal")),
                    Some(b'n') => bytes.push(b'\n'),
                    Some(c) => bytes.push(c),
                },
                Some(c) => bytes.push(c),
            }
        }
        self.heap.make_string(bytes)
    }

    /// After '(': elements up to ')', with an optional `. tail`.
    fn read_list(&mut self) -> IotaResult<Value> {
        let mut items = ListBuilder::new(self.heap);
        let mut empty = true;
        loop {
            self.skip_whitespace_and_comments()?;
            match self.next()? {
                None => return Err(read_error("unterminated list")),
                Some(b')') => return Ok(items.finish()),
                Some(b'.') => {
                    if !is_delimiter(self.peek()?) {
                        return Err(read_error("Dot not followed by delimiter"));
                    }
                    if empty {
                        return Err(read_error("nothing before '.' in list"));
                    }
                    let tail = self.read_expr()?;
                    self.skip_whitespace_and_comments()?;
                    return match self.next()? {
                        Some(b')') => items.finish_with(self.heap, tail),
                        _ => Err(read_error("Unclosed list")),
                    };
                }
                Some(c) => {
                    let item = self.read_starting_with(c)?;
                    items.push(self.heap, item)?;
                    empty = false;
                }
            }
        }
    }
}
