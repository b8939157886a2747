//! Text Codec
//!
//! Converts game byte streams to editable text and back using a [`CharTable`].
//!
//! # Decoding
//! Decoding is total. Unmapped bytes become `<HH>` placeholders, control codes become
//! bracketed tokens with their parameter bytes inline (`[SOUND:1A]`), and decoding stops
//! at the terminator. A stream without a terminator still yields its text, flagged as
//! unterminated.
//!
//! # Encoding
//! At each position the encoder tries, in order: a control token, a `<HH>` placeholder,
//! the longest literal or multigraph in the table. Characters that match nothing are
//! unmapped and either skipped or reported, per [`UnmappedPolicy`]. The terminator is
//! appended unless the text already ended with one.

use crate::error::{RomError, RomResult};
use crate::text::table::{is_token_char, CharTable, TableEntry};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// What the encoder does with characters that have no table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnmappedPolicy {
    /// Drop them silently.
    Skip,
    /// Fail, listing every offending character.
    #[default]
    Error,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOptions {
    /// Append the terminator token (normally `[END]`) when the terminator is reached.
    pub emit_terminator: bool,
}

/// Result of decoding one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    /// Bytes consumed, including the terminator when present.
    pub consumed: usize,
    /// False when the stream ran out before a terminator (an unterminated string).
    pub terminated: bool,
}

/// Text measurements used for per-dialog limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TextMetrics {
    pub encoded_bytes: usize,
    pub visible_chars: usize,
    pub lines: usize,
    pub longest_line: usize,
}

/// Per-dialog limits; `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextLimits {
    #[serde(default)]
    pub max_bytes: Option<usize>,
    #[serde(default)]
    pub max_lines: Option<usize>,
    #[serde(default)]
    pub max_line_len: Option<usize>,
}

impl TextMetrics {
    /// Check these metrics against `limits`.
    ///
    /// # Errors
    /// `DialogTooLong` naming the first exceeded limit.
    pub fn check(&self, limits: &TextLimits) -> RomResult<()> {
        let checks: [(&'static str, usize, Option<usize>); 3] = [
            ("length in bytes", self.encoded_bytes, limits.max_bytes),
            ("line count", self.lines, limits.max_lines),
            ("longest line", self.longest_line, limits.max_line_len),
        ];
        for (what, required, limit) in checks {
            if let Some(available) = limit {
                if required > available {
                    return Err(RomError::DialogTooLong {
                        what,
                        required,
                        available,
                    });
                }
            }
        }
        Ok(())
    }
}

/// A bracketed token found in input text.
struct Tag<'a> {
    name: &'a str,
    params: SmallVec<[&'a str; 3]>,
    /// Length in bytes including brackets.
    len: usize,
}

fn parse_tag(text: &str) -> Option<Tag<'_>> {
    let close: char = match text.chars().next()? {
        '[' => ']',
        '{' => '}',
        _ => return None,
    };
    let end: usize = text.find(close)?;
    let body: &str = &text[1..end];
    let mut parts = body.split(':');
    let name: &str = parts.next()?;
    if name.is_empty() || !name.chars().all(is_token_char) {
        return None;
    }
    Some(Tag {
        name,
        params: parts.collect(),
        len: end + 1,
    })
}

/// `<HH>` placeholder at the start of `text`.
fn parse_placeholder(text: &str) -> Option<u8> {
    let bytes: &[u8] = text.as_bytes();
    if bytes.len() >= 4 && bytes[0] == b'<' && bytes[3] == b'>' {
        let hex: &str = text.get(1..3)?;
        if hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return u8::from_str_radix(hex, 16).ok();
        }
    }
    None
}

/// A unit of input text as the encoder sees it.
enum Piece {
    Control { bytes: SmallVec<[u8; 4]>, terminator: bool, line_break: bool },
    Raw(u8),
    Text { byte: u8, chars: usize },
    Newline(Option<u8>),
    Unmapped(char),
}

/// Encoder/decoder bound to one character table.
#[derive(Debug, Clone, Copy)]
pub struct TextCodec<'t> {
    table: &'t CharTable,
}

impl<'t> TextCodec<'t> {
    pub fn new(table: &'t CharTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &'t CharTable {
        self.table
    }

    /// Decode bytes up to (and including) the terminator.
    pub fn decode(&self, bytes: &[u8], options: DecodeOptions) -> DecodedText {
        let terminator: u8 = self.table.terminator();
        let mut text: String = String::with_capacity(bytes.len() * 2);
        let mut i: usize = 0;

        while i < bytes.len() {
            let byte: u8 = bytes[i];
            if byte == terminator {
                if options.emit_terminator {
                    match self.table.entry(byte) {
                        Some(TableEntry::Control(code)) => text.push_str(&code.token(&[])),
                        _ => text.push_str("[END]"),
                    }
                }
                return DecodedText {
                    text,
                    consumed: i + 1,
                    terminated: true,
                };
            }
            match self.table.entry(byte) {
                Some(TableEntry::Literal(c)) => {
                    text.push(*c);
                    i += 1;
                }
                Some(TableEntry::Multigraph(s)) => {
                    text.push_str(s);
                    i += 1;
                }
                Some(TableEntry::Control(code)) => {
                    let arity: usize = code.arity as usize;
                    match bytes.get(i + 1..i + 1 + arity) {
                        Some(params) => {
                            text.push_str(&code.token(params));
                            i += 1 + arity;
                        }
                        None => {
                            // Parameters cut off by the end of the stream.
                            text.push_str(&format!("<{:02X}>", byte));
                            i += 1;
                        }
                    }
                }
                None => {
                    text.push_str(&format!("<{:02X}>", byte));
                    i += 1;
                }
            }
        }

        DecodedText {
            text,
            consumed: bytes.len(),
            terminated: false,
        }
    }

    /// Split `text` at byte position `i` into the next encoder piece.
    fn next_piece(&self, text: &str, i: usize, char_pos: usize) -> RomResult<(Piece, usize)> {
        let rest: &str = &text[i..];

        if let Some(tag) = parse_tag(rest) {
            let is_end: bool = tag.name.eq_ignore_ascii_case("END");
            let code_byte: Option<u8> = self
                .table
                .lookup_control(tag.name)
                .or_else(|| is_end.then(|| self.table.terminator()));
            if let Some(code_byte) = code_byte {
                let arity: usize = match self.table.entry(code_byte) {
                    Some(TableEntry::Control(code)) => code.arity as usize,
                    _ => 0,
                };
                let invalid = |reason: String| RomError::InvalidToken {
                    position: char_pos,
                    token: rest[..tag.len].to_string(),
                    reason,
                };
                if tag.params.len() != arity {
                    return Err(invalid(format!(
                        "expects {} parameter bytes, found {}",
                        arity,
                        tag.params.len()
                    )));
                }
                let mut bytes: SmallVec<[u8; 4]> = SmallVec::new();
                bytes.push(code_byte);
                for p in &tag.params {
                    let value: u8 = u8::from_str_radix(p.trim(), 16)
                        .map_err(|_| invalid(format!("parameter {:?} is not a hex byte", p)))?;
                    bytes.push(value);
                }
                let line_break: bool = matches!(
                    self.table.entry(code_byte),
                    Some(TableEntry::Control(code)) if code.line_break
                );
                return Ok((
                    Piece::Control {
                        bytes,
                        terminator: code_byte == self.table.terminator(),
                        line_break,
                    },
                    tag.len,
                ));
            }
        }

        if let Some(raw) = parse_placeholder(rest) {
            return Ok((Piece::Raw(raw), 4));
        }

        if let Some((byte, len)) = self.table.longest_match(rest) {
            let chars: usize = rest[..len].chars().count();
            return Ok((Piece::Text { byte, chars }, len));
        }

        let c: char = rest.chars().next().unwrap_or('\u{FFFD}');
        if c == '\n' {
            return Ok((Piece::Newline(self.table.line_break()), 1));
        }
        Ok((Piece::Unmapped(c), c.len_utf8().max(1)))
    }

    /// Encode text to bytes, appending the terminator.
    ///
    /// # Errors
    /// `InvalidToken` for a known control with bad parameters; `UnmappedCharacter` when
    /// `policy` is [`UnmappedPolicy::Error`] and some characters have no entry.
    pub fn encode(&self, text: &str, policy: UnmappedPolicy) -> RomResult<Vec<u8>> {
        let mut out: Vec<u8> = Vec::with_capacity(text.len() + 1);
        let mut unmapped: Vec<char> = Vec::new();
        let mut ended: bool = false;
        let mut i: usize = 0;
        let mut char_pos: usize = 0;

        while i < text.len() {
            let (piece, len) = self.next_piece(text, i, char_pos)?;
            ended = false;
            match piece {
                Piece::Control {
                    bytes, terminator, ..
                } => {
                    out.extend_from_slice(&bytes);
                    ended = terminator && bytes.len() == 1;
                }
                Piece::Raw(byte) | Piece::Text { byte, .. } => out.push(byte),
                Piece::Newline(Some(byte)) => out.push(byte),
                Piece::Newline(None) => unmapped.push('\n'),
                Piece::Unmapped(c) => unmapped.push(c),
            }
            char_pos += text[i..i + len].chars().count();
            i += len;
        }

        if policy == UnmappedPolicy::Error && !unmapped.is_empty() {
            let mut seen: Vec<char> = Vec::with_capacity(unmapped.len());
            for c in unmapped {
                if !seen.contains(&c) {
                    seen.push(c);
                }
            }
            return Err(RomError::UnmappedCharacter { characters: seen });
        }
        if !ended {
            out.push(self.table.terminator());
        }
        Ok(out)
    }

    /// Measure text as it would be encoded.
    pub fn metrics(&self, text: &str) -> RomResult<TextMetrics> {
        let mut metrics: TextMetrics = TextMetrics {
            encoded_bytes: self.encode(text, UnmappedPolicy::Skip)?.len(),
            ..TextMetrics::default()
        };
        if text.is_empty() {
            return Ok(metrics);
        }

        let mut current_line: usize = 0;
        let mut lines: usize = 1;
        let mut i: usize = 0;
        let mut char_pos: usize = 0;
        while i < text.len() {
            let (piece, len) = self.next_piece(text, i, char_pos)?;
            match piece {
                Piece::Control { line_break: true, .. } | Piece::Newline(_) => {
                    metrics.longest_line = metrics.longest_line.max(current_line);
                    current_line = 0;
                    lines += 1;
                }
                Piece::Text { chars, .. } => {
                    metrics.visible_chars += chars;
                    current_line += chars;
                }
                Piece::Unmapped(_) => {
                    metrics.visible_chars += 1;
                    current_line += 1;
                }
                Piece::Control { .. } | Piece::Raw(_) => {}
            }
            char_pos += text[i..i + len].chars().count();
            i += len;
        }
        metrics.longest_line = metrics.longest_line.max(current_line);
        metrics.lines = lines;
        Ok(metrics)
    }
}
