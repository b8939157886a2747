//! In-image N-gram dictionaries.
//!
//! Some games keep their multigraph table inside the image rather than in the font: a run
//! of length-prefixed entries, one per dictionary code. Entry bytes are themselves text
//! codes and may name other dictionary codes, so entries are expanded recursively before
//! being merged into a [`CharTable`].

use crate::error::{RomError, RomResult};
use crate::rom::container::Container;
use crate::text::table::{CharTable, TableEntry, MAX_MULTIGRAPH_CHARS};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Nesting depth at which expansion is treated as a cycle.
const MAX_DEPTH: usize = 8;

/// Location of a dictionary inside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionarySpec {
    /// Logical offset of the first length byte.
    pub offset: usize,
    /// Text code of the first entry.
    pub first_code: u8,
    /// Number of entries.
    pub count: usize,
}

/// Raw entries as stored: `(code, bytes, offset)`.
fn read_raw_entries(container: &Container, spec: &DictionarySpec) -> RomResult<Vec<(u8, Vec<u8>, usize)>> {
    let mut entries: Vec<(u8, Vec<u8>, usize)> = Vec::with_capacity(spec.count);
    let mut cursor: usize = spec.offset;
    for i in 0..spec.count {
        let code: u8 = spec
            .first_code
            .checked_add(i as u8)
            .filter(|_| i < 256)
            .ok_or_else(|| RomError::config("dictionary codes run past FF"))?;
        let len: usize = container.read_u8(cursor)? as usize;
        let bytes: Vec<u8> = container.read_bytes(cursor + 1, len)?;
        entries.push((code, bytes, cursor));
        cursor += 1 + len;
    }
    Ok(entries)
}

fn expand(
    code: u8,
    raw: &[(u8, Vec<u8>, usize)],
    spec: &DictionarySpec,
    base: &CharTable,
    depth: usize,
) -> RomResult<String> {
    let index: usize = (code - spec.first_code) as usize;
    let (_, bytes, offset) = &raw[index];
    if depth > MAX_DEPTH {
        return Err(RomError::Decompression {
            offset: *offset,
            message: format!("dictionary entry {:02X} nests deeper than {}", code, MAX_DEPTH),
        });
    }
    let mut text: String = String::new();
    for &b in bytes {
        let in_dictionary: bool =
            b >= spec.first_code && ((b - spec.first_code) as usize) < raw.len();
        if in_dictionary {
            text.push_str(&expand(b, raw, spec, base, depth + 1)?);
            continue;
        }
        match base.entry(b) {
            Some(TableEntry::Literal(c)) => text.push(*c),
            Some(TableEntry::Multigraph(s)) => text.push_str(s),
            Some(TableEntry::Control(c)) if c.arity == 0 => text.push_str(&c.token(&[])),
            _ => {
                return Err(RomError::Decompression {
                    offset: *offset,
                    message: format!("dictionary entry {:02X} uses byte {:02X} with no text", code, b),
                })
            }
        }
    }
    Ok(text)
}

/// Read a dictionary and merge its expansions into a copy of `base`.
///
/// Entries that expand to nothing are left unmapped; entries longer than the multigraph
/// limit are skipped with a warning.
pub fn load_dictionary(container: &Container, spec: &DictionarySpec, base: &CharTable) -> RomResult<CharTable> {
    let raw: Vec<(u8, Vec<u8>, usize)> = read_raw_entries(container, spec)?;
    let mut merged: Vec<(u8, TableEntry)> = Vec::with_capacity(raw.len());
    for (code, _, _) in &raw {
        let text: String = expand(*code, &raw, spec, base, 0)?;
        let mut chars = text.chars();
        let entry: TableEntry = match (chars.next(), chars.next()) {
            (None, _) => continue,
            (Some(c), None) => TableEntry::Literal(c),
            _ if text.chars().count() > MAX_MULTIGRAPH_CHARS => {
                warn!("Dictionary entry {:02X} expands to {} characters; skipped", code, text.chars().count());
                continue;
            }
            _ => TableEntry::Multigraph(text),
        };
        merged.push((*code, entry));
    }
    let mut table: CharTable = base.clone();
    let count: usize = merged.len();
    table.merge(merged)?;
    debug!("Merged {} dictionary entries from offset 0x{:06X}", count, spec.offset);
    Ok(table)
}
