//! Record-format patches.
//!
//! # Layout
//! ```text
//! "PATCH"
//! { offset: u24 BE, length: u16 BE, data[length] }      literal record
//! { offset: u24 BE, 0x0000, run: u16 BE, value: u8 }     run-length record
//! "EOF"
//! [ truncate: u24 BE ]                                  only when the target shrinks
//! ```
//!
//! A record may not begin at offset 0x454F46, whose bytes spell `EOF`; the writer starts
//! such a record one byte early instead.

use crate::error::{RomError, RomResult};
use log::debug;

pub const MAGIC: &[u8; 5] = b"PATCH";
pub const TRAILER: &[u8; 3] = b"EOF";
/// First offset a 24-bit record cannot address.
pub const MAX_OFFSET: usize = 1 << 24;
pub const MAX_RECORD_LEN: usize = 0xFFFF;
const EOF_OFFSET: usize = 0x45_4F46;
/// Shortest run worth a run-length record (8 bytes) over literal bytes.
const MIN_RLE_RUN: usize = 9;

/// Payload of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    Literal(Vec<u8>),
    Run { len: u16, value: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpsRecord {
    pub offset: usize,
    pub data: RecordData,
}

impl IpsRecord {
    /// Bytes this record writes.
    pub fn len(&self) -> usize {
        match &self.data {
            RecordData::Literal(bytes) => bytes.len(),
            RecordData::Run { len, .. } => *len as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn end(&self) -> usize {
        self.offset + self.len()
    }
}

/// Creation options.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordOptions {
    /// Emit run-length records for long runs of one value.
    pub rle: bool,
}

/// A parsed record-format patch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IpsPatch {
    pub records: Vec<IpsRecord>,
    /// Final target length when the target is shorter than the source.
    pub truncate: Option<usize>,
}

impl IpsPatch {
    /// Parse patch bytes.
    ///
    /// # Errors
    /// `InvalidMagic`, `TruncatedRecord` for records cut short or a missing `EOF`, and
    /// `MalformedPatch` for trailing garbage.
    pub fn parse(bytes: &[u8]) -> RomResult<Self> {
        if bytes.len() < MAGIC.len() || &bytes[..MAGIC.len()] != MAGIC {
            return Err(RomError::InvalidMagic {
                expected: "PATCH",
                found: bytes.iter().take(MAGIC.len()).copied().collect(),
            });
        }
        let mut pos: usize = MAGIC.len();
        let mut records: Vec<IpsRecord> = Vec::new();

        loop {
            if bytes.get(pos..pos + 3) == Some(TRAILER.as_slice()) {
                pos += 3;
                break;
            }
            let record_start: usize = pos;
            let head: &[u8] = take(bytes, &mut pos, 5, "record header")?;
            let offset: usize = u32::from_be_bytes([0, head[0], head[1], head[2]]) as usize;
            let len: usize = u16::from_be_bytes([head[3], head[4]]) as usize;
            let data: RecordData = if len == 0 {
                let run: &[u8] = take(bytes, &mut pos, 3, "run-length record")?;
                RecordData::Run {
                    len: u16::from_be_bytes([run[0], run[1]]),
                    value: run[2],
                }
            } else {
                RecordData::Literal(take(bytes, &mut pos, len, "record data")?.to_vec())
            };
            debug!("Record at 0x{:X}: offset 0x{:06X}", record_start, offset);
            records.push(IpsRecord { offset, data });
        }

        let truncate: Option<usize> = match bytes.len() - pos {
            0 => None,
            3 => Some(u32::from_be_bytes([0, bytes[pos], bytes[pos + 1], bytes[pos + 2]]) as usize),
            _ => {
                return Err(RomError::malformed_patch(
                    pos,
                    format!("{} unexpected bytes after EOF", bytes.len() - pos),
                ))
            }
        };
        Ok(Self { records, truncate })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let payload: usize = self
            .records
            .iter()
            .map(|r| match &r.data {
                RecordData::Literal(bytes) => 5 + bytes.len(),
                RecordData::Run { .. } => 8,
            })
            .sum();
        let mut out: Vec<u8> = Vec::with_capacity(MAGIC.len() + payload + TRAILER.len() + 3);
        out.extend_from_slice(MAGIC);
        for record in &self.records {
            out.extend_from_slice(&(record.offset as u32).to_be_bytes()[1..]);
            match &record.data {
                RecordData::Literal(bytes) => {
                    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
                    out.extend_from_slice(bytes);
                }
                RecordData::Run { len, value } => {
                    out.extend_from_slice(&[0, 0]);
                    out.extend_from_slice(&len.to_be_bytes());
                    out.push(*value);
                }
            }
        }
        out.extend_from_slice(TRAILER);
        if let Some(len) = self.truncate {
            out.extend_from_slice(&(len as u32).to_be_bytes()[1..]);
        }
        out
    }

    /// Smallest source length every record can be applied to without extension.
    pub fn max_offset(&self) -> usize {
        self.records.iter().map(IpsRecord::end).max().unwrap_or(0)
    }

    /// Apply to `source`, extending it with zeros when a record writes past its end.
    pub fn apply(&self, source: &[u8]) -> Vec<u8> {
        let mut target: Vec<u8> = source.to_vec();
        for record in &self.records {
            if record.end() > target.len() {
                target.resize(record.end(), 0);
            }
            match &record.data {
                RecordData::Literal(bytes) => {
                    target[record.offset..record.end()].copy_from_slice(bytes)
                }
                RecordData::Run { value, .. } => target[record.offset..record.end()].fill(*value),
            }
        }
        if let Some(len) = self.truncate {
            target.truncate(len);
        }
        target
    }

    /// Build the patch turning `source` into `target`.
    ///
    /// # Errors
    /// `OffsetOverflow` when the target is larger than the 24-bit offset space.
    pub fn create(source: &[u8], target: &[u8], options: RecordOptions) -> RomResult<Self> {
        if target.len() > MAX_OFFSET {
            return Err(RomError::OffsetOverflow {
                offset: target.len(),
                limit: MAX_OFFSET,
            });
        }
        let differs = |i: usize| i >= source.len() || source[i] != target[i];
        let mut records: Vec<IpsRecord> = Vec::new();
        let mut i: usize = 0;

        while i < target.len() {
            if !differs(i) {
                i += 1;
                continue;
            }
            let mut start: usize = i;
            let mut end: usize = i;
            while end < target.len() && differs(end) {
                end += 1;
            }
            if start == EOF_OFFSET {
                start -= 1;
            }
            push_run(&mut records, target, start, end, options);
            i = end;
        }

        let truncate: Option<usize> = (target.len() < source.len()).then_some(target.len());
        Ok(Self { records, truncate })
    }
}

fn take<'a>(bytes: &'a [u8], pos: &mut usize, n: usize, what: &'static str) -> RomResult<&'a [u8]> {
    let slice: &'a [u8] = bytes
        .get(*pos..*pos + n)
        .ok_or_else(|| RomError::truncated(what, *pos))?;
    *pos += n;
    Ok(slice)
}

/// Emit records covering `target[start..end]`, splitting at the record length limit.
fn push_run(records: &mut Vec<IpsRecord>, target: &[u8], start: usize, end: usize, options: RecordOptions) {
    let mut pos: usize = start;
    while pos < end {
        if options.rle {
            let value: u8 = target[pos];
            let mut run: usize = target[pos..end]
                .iter()
                .take(MAX_RECORD_LEN)
                .take_while(|&&b| b == value)
                .count();
            if pos + run == EOF_OFFSET && pos + run < end {
                run -= 1;
            }
            if run >= MIN_RLE_RUN && pos != EOF_OFFSET {
                records.push(IpsRecord {
                    offset: pos,
                    data: RecordData::Run {
                        len: run as u16,
                        value,
                    },
                });
                pos += run;
                continue;
            }
        }

        let mut chunk_end: usize = (pos + MAX_RECORD_LEN).min(end);
        if options.rle {
            // Stop the literal where a worthwhile run begins.
            let mut scan: usize = pos + 1;
            while scan + MIN_RLE_RUN <= chunk_end {
                let value: u8 = target[scan];
                if target[scan..scan + MIN_RLE_RUN].iter().all(|&b| b == value) {
                    chunk_end = scan;
                    break;
                }
                scan += 1;
            }
        }
        // The next record may not start at the EOF marker offset.
        if chunk_end == EOF_OFFSET && chunk_end < end {
            if chunk_end - 1 > pos {
                chunk_end -= 1;
            } else {
                chunk_end += 1;
            }
        }
        records.push(IpsRecord {
            offset: pos,
            data: RecordData::Literal(target[pos..chunk_end].to_vec()),
        });
        pos = chunk_end;
    }
}
