//! Character Tables
//!
//! A character table assigns a meaning to each byte value of a game's text encoding.
//!
//! # File Format
//! One entry per line, `HH=sequence`:
//! - a single character is a **literal** (`41=A`, `20= `)
//! - 2 to 20 characters form a **multigraph** (`80=the `), matched greedily when encoding
//! - `[NAME]` or `{name}` is a **control code**; `[NAME:2]` declares two parameter bytes
//!
//! Prefixes on the byte mark special controls: `/HH=` is the terminator and `*HH=` is a
//! line break. Without a `/` entry, a control named `END` is the terminator, and failing
//! that byte `00`. Lines starting with `#` are comments. Trailing spaces are significant.
//!
//! # Lookup Structures
//! Decoding indexes a 256-slot array. Encoding walks a character trie held in an arena
//! for longest-match, and resolves control names by binary search over a sorted list.

use crate::error::{RomError, RomResult};
use log::debug;
use smallvec::SmallVec;
use std::fs;
use std::path::Path;

/// Longest multigraph accepted, in characters.
pub const MAX_MULTIGRAPH_CHARS: usize = 20;
/// Most parameter bytes a control code may declare.
pub const MAX_ARITY: u8 = 3;

/// Bracket style of a control token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bracket {
    Square,
    Curly,
}

impl Bracket {
    fn delimiters(self) -> (char, char) {
        match self {
            Bracket::Square => ('[', ']'),
            Bracket::Curly => ('{', '}'),
        }
    }
}

/// A named in-band control code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControlCode {
    pub name: String,
    pub arity: u8,
    pub bracket: Bracket,
    pub line_break: bool,
}

impl ControlCode {
    /// Render the token with its parameter bytes, e.g. `[SOUND:1A]`.
    pub fn token(&self, params: &[u8]) -> String {
        let (open, close) = self.bracket.delimiters();
        let mut token: String = String::with_capacity(self.name.len() + 2 + params.len() * 3);
        token.push(open);
        token.push_str(&self.name);
        for p in params {
            token.push_str(&format!(":{:02X}", p));
        }
        token.push(close);
        token
    }
}

/// What a byte value stands for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TableEntry {
    Literal(char),
    Multigraph(String),
    Control(ControlCode),
}

impl TableEntry {
    /// Text this entry contributes to the encode trie, if any.
    fn match_text(&self) -> Option<String> {
        match self {
            TableEntry::Literal(c) => Some(c.to_string()),
            TableEntry::Multigraph(s) => Some(s.clone()),
            TableEntry::Control(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct TrieNode {
    children: SmallVec<[(char, u32); 4]>,
    value: Option<u8>,
}

/// Character trie stored as an arena of nodes addressed by index.
#[derive(Debug, Clone)]
struct TextTrie {
    nodes: Vec<TrieNode>,
}

impl TextTrie {
    fn new() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
        }
    }

    fn insert(&mut self, text: &str, byte: u8) {
        let mut node: usize = 0;
        for c in text.chars() {
            let next: Option<u32> = self.nodes[node]
                .children
                .iter()
                .find(|(k, _)| *k == c)
                .map(|(_, idx)| *idx);
            node = match next {
                Some(idx) => idx as usize,
                None => {
                    let idx: u32 = self.nodes.len() as u32;
                    self.nodes.push(TrieNode::default());
                    self.nodes[node].children.push((c, idx));
                    idx as usize
                }
            };
        }
        // The lowest byte wins when two entries spell the same text.
        let slot: &mut Option<u8> = &mut self.nodes[node].value;
        if slot.map_or(true, |existing| byte < existing) {
            *slot = Some(byte);
        }
    }

    /// Longest entry that prefixes `text`: `(byte, matched length in bytes)`.
    fn longest_match(&self, text: &str) -> Option<(u8, usize)> {
        let mut node: usize = 0;
        let mut best: Option<(u8, usize)> = None;
        for (pos, c) in text.char_indices() {
            let Some(&(_, idx)) = self.nodes[node].children.iter().find(|(k, _)| *k == c) else {
                break;
            };
            node = idx as usize;
            if let Some(byte) = self.nodes[node].value {
                best = Some((byte, pos + c.len_utf8()));
            }
        }
        best
    }
}

/// A loaded character table.
#[derive(Debug, Clone)]
pub struct CharTable {
    entries: Vec<Option<TableEntry>>,
    terminator: u8,
    // (upper-cased name, byte), sorted by name
    controls: Vec<(String, u8)>,
    trie: TextTrie,
}

impl Default for CharTable {
    fn default() -> Self {
        Self {
            entries: vec![None; 256],
            terminator: 0x00,
            controls: Vec::new(),
            trie: TextTrie::new(),
        }
    }
}

/// Parse a control token body (`NAME` or `NAME:2`) from a table line.
fn parse_control_decl(body: &str, bracket: Bracket, line: usize) -> RomResult<ControlCode> {
    let (name, arity) = match body.split_once(':') {
        Some((name, arity)) => {
            let arity: u8 = arity.trim().parse().map_err(|_| RomError::TableSyntax {
                line,
                message: format!("invalid parameter count {:?}", arity),
            })?;
            (name, arity)
        }
        None => (body, 0),
    };
    if arity > MAX_ARITY {
        return Err(RomError::TableSyntax {
            line,
            message: format!("control {} declares {} parameters (maximum {})", name, arity, MAX_ARITY),
        });
    }
    if name.is_empty() || !name.chars().all(is_token_char) {
        return Err(RomError::TableSyntax {
            line,
            message: format!("invalid control name {:?}", name),
        });
    }
    Ok(ControlCode {
        name: name.to_string(),
        arity,
        bracket,
        line_break: matches!(name.to_ascii_uppercase().as_str(), "NEWLINE" | "NL" | "LINE"),
    })
}

/// Characters allowed inside a control token name.
#[inline]
pub(crate) fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == ' '
}

/// Interpret the right-hand side of a table line.
fn parse_sequence(sequence: &str, line: usize) -> RomResult<TableEntry> {
    let mut chars = sequence.chars();
    let count: usize = sequence.chars().count();
    match count {
        0 => Err(RomError::TableSyntax {
            line,
            message: "empty sequence".to_string(),
        }),
        1 => Ok(TableEntry::Literal(chars.next().unwrap_or(' '))),
        _ => {
            for bracket in [Bracket::Square, Bracket::Curly] {
                let (open, close) = bracket.delimiters();
                if let Some(body) = sequence.strip_prefix(open).and_then(|s| s.strip_suffix(close)) {
                    if !body.contains(open) && !body.contains(close) && !body.is_empty() {
                        return parse_control_decl(body, bracket, line).map(TableEntry::Control);
                    }
                }
            }
            if count > MAX_MULTIGRAPH_CHARS {
                return Err(RomError::TableSyntax {
                    line,
                    message: format!(
                        "multigraph of {} characters exceeds {}",
                        count, MAX_MULTIGRAPH_CHARS
                    ),
                });
            }
            Ok(TableEntry::Multigraph(sequence.to_string()))
        }
    }
}

impl CharTable {
    /// Load a table file.
    ///
    /// # Errors
    /// `Io` for unreadable files; `TableSyntax` or `DuplicateTableEntry` for bad content.
    pub fn load(path: &Path) -> RomResult<Self> {
        let text: String = fs::read_to_string(path)?;
        let table: CharTable = Self::parse(&text)?;
        debug!(
            "Loaded character table {} ({} entries)",
            path.display(),
            table.len()
        );
        Ok(table)
    }

    /// Parse table text.
    pub fn parse(text: &str) -> RomResult<Self> {
        let mut entries: Vec<Option<TableEntry>> = vec![None; 256];
        let mut defined_on: [usize; 256] = [0usize; 256];
        let mut explicit_terminator: Option<u8> = None;

        for (idx, raw_line) in text.lines().enumerate() {
            let line_no: usize = idx + 1;
            let line: &str = raw_line.strip_suffix('\r').unwrap_or(raw_line);
            let head: &str = line.trim_start();
            if head.is_empty() || head.starts_with('#') {
                continue;
            }

            let (marker, rest) = match head.chars().next() {
                Some(c @ ('/' | '*')) => (Some(c), &head[1..]),
                _ => (None, head),
            };
            let Some((hex, sequence)) = rest.split_once('=') else {
                return Err(RomError::TableSyntax {
                    line: line_no,
                    message: "expected HH=sequence".to_string(),
                });
            };
            let byte: u8 = u8::from_str_radix(hex.trim(), 16)
                .ok()
                .filter(|_| hex.trim().len() == 2)
                .ok_or_else(|| RomError::TableSyntax {
                    line: line_no,
                    message: format!("invalid byte value {:?}", hex),
                })?;
            if entries[byte as usize].is_some() {
                return Err(RomError::DuplicateTableEntry {
                    line: line_no,
                    byte,
                    first_line: defined_on[byte as usize],
                });
            }

            let mut entry: TableEntry = match (marker, sequence.is_empty()) {
                // "/00=" with no text is a bare terminator
                (Some('/'), true) => TableEntry::Control(ControlCode {
                    name: "END".to_string(),
                    arity: 0,
                    bracket: Bracket::Square,
                    line_break: false,
                }),
                _ => parse_sequence(sequence, line_no)?,
            };
            match marker {
                Some('/') => {
                    if let TableEntry::Control(code) = &entry {
                        if code.arity != 0 {
                            return Err(RomError::TableSyntax {
                                line: line_no,
                                message: "the terminator cannot take parameters".to_string(),
                            });
                        }
                    }
                    explicit_terminator = Some(byte);
                }
                Some('*') => match &mut entry {
                    TableEntry::Control(code) => code.line_break = true,
                    _ => {
                        return Err(RomError::TableSyntax {
                            line: line_no,
                            message: "line-break marker on a non-control entry".to_string(),
                        })
                    }
                },
                _ => {}
            }
            entries[byte as usize] = Some(entry);
            defined_on[byte as usize] = line_no;
        }

        let terminator: u8 = explicit_terminator
            .or_else(|| {
                entries.iter().position(|e| {
                    matches!(e, Some(TableEntry::Control(c)) if c.name.eq_ignore_ascii_case("END") && c.arity == 0)
                })
                .map(|p| p as u8)
            })
            .unwrap_or(0x00);

        Self::from_entries(entries, terminator)
    }

    /// Build a table from a full 256-slot entry array.
    pub fn from_entries(entries: Vec<Option<TableEntry>>, terminator: u8) -> RomResult<Self> {
        if entries.len() != 256 {
            return Err(RomError::config(format!(
                "character table needs 256 slots, got {}",
                entries.len()
            )));
        }
        let mut table: CharTable = Self {
            entries,
            terminator,
            controls: Vec::new(),
            trie: TextTrie::new(),
        };
        table.rebuild_index()?;
        Ok(table)
    }

    fn rebuild_index(&mut self) -> RomResult<()> {
        let mut controls: Vec<(String, u8)> = Vec::new();
        let mut trie: TextTrie = TextTrie::new();
        for (byte, entry) in self.entries.iter().enumerate() {
            let Some(entry) = entry else { continue };
            if let TableEntry::Control(code) = entry {
                controls.push((code.name.to_ascii_uppercase(), byte as u8));
            }
            if let Some(text) = entry.match_text() {
                trie.insert(&text, byte as u8);
            }
        }
        controls.sort();
        if let Some(pair) = controls.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(RomError::TableSyntax {
                line: 0,
                message: format!(
                    "control name {} is used by bytes {:02X} and {:02X}",
                    pair[0].0, pair[0].1, pair[1].1
                ),
            });
        }
        self.controls = controls;
        self.trie = trie;
        Ok(())
    }

    /// Replace the entries for the given bytes and rebuild the lookup structures.
    pub fn merge(&mut self, entries: impl IntoIterator<Item = (u8, TableEntry)>) -> RomResult<()> {
        for (byte, entry) in entries {
            self.entries[byte as usize] = Some(entry);
        }
        self.rebuild_index()
    }

    #[inline]
    pub fn entry(&self, byte: u8) -> Option<&TableEntry> {
        self.entries[byte as usize].as_ref()
    }

    #[inline]
    pub fn terminator(&self) -> u8 {
        self.terminator
    }

    /// Byte for a control name, case-insensitive.
    pub fn lookup_control(&self, name: &str) -> Option<u8> {
        let key: String = name.to_ascii_uppercase();
        self.controls
            .binary_search_by(|(n, _)| n.as_str().cmp(key.as_str()))
            .ok()
            .map(|i| self.controls[i].1)
    }

    /// First zero-arity line-break control, used for literal newlines in input text.
    pub fn line_break(&self) -> Option<u8> {
        self.entries.iter().position(|e| {
            matches!(e, Some(TableEntry::Control(c)) if c.line_break && c.arity == 0)
        })
        .map(|p| p as u8)
    }

    /// Longest literal or multigraph at the start of `text`.
    pub fn longest_match(&self, text: &str) -> Option<(u8, usize)> {
        self.trie.longest_match(text)
    }

    /// Number of mapped byte values.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
