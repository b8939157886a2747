//! Block-format (BPS) patches.
//!
//! # Layout
//! ```text
//! "BPS1"
//! vln source_size, vln target_size, vln metadata_size, metadata
//! actions...
//! u32 LE source crc32, u32 LE target crc32, u32 LE patch crc32
//! ```
//!
//! Each action starts with a number whose low two bits select the operation and whose
//! remaining bits hold `length - 1`:
//! - **SourceRead**: copy from the source at the current output position
//! - **TargetRead**: copy inline bytes from the patch
//! - **SourceCopy**: move the source cursor by a signed delta, then copy from it
//! - **TargetCopy**: move the target cursor by a signed delta, then copy from already
//!   written output (overlap allowed, byte by byte)
//!
//! The patch checksum covers every byte before the final four.

use crate::error::{ChecksumTarget, RomError, RomResult};
use crate::patch::vln;
use log::{debug, info};
use std::collections::HashMap;

pub const MAGIC: &[u8; 4] = b"BPS1";
const TRAILER_LEN: usize = 12;
/// Shortest copy the encoder emits.
const MIN_COPY: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BpsAction {
    SourceRead { len: usize },
    TargetRead { bytes: Vec<u8> },
    SourceCopy { delta: i64, len: usize },
    TargetCopy { delta: i64, len: usize },
}

impl BpsAction {
    pub fn len(&self) -> usize {
        match self {
            BpsAction::SourceRead { len }
            | BpsAction::SourceCopy { len, .. }
            | BpsAction::TargetCopy { len, .. } => *len,
            BpsAction::TargetRead { bytes } => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn code(&self) -> u64 {
        match self {
            BpsAction::SourceRead { .. } => 0,
            BpsAction::TargetRead { .. } => 1,
            BpsAction::SourceCopy { .. } => 2,
            BpsAction::TargetCopy { .. } => 3,
        }
    }
}

/// A parsed block-format patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BpsPatch {
    pub source_size: usize,
    pub target_size: usize,
    pub metadata: Vec<u8>,
    pub actions: Vec<BpsAction>,
    pub source_crc: u32,
    pub target_crc: u32,
    pub patch_crc: u32,
}

#[inline]
fn read_u32_le(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

fn decode_size(bytes: &[u8], pos: &mut usize) -> RomResult<usize> {
    let start: usize = *pos;
    let value: u64 = vln::decode(bytes, pos)?;
    usize::try_from(value).map_err(|_| RomError::malformed_patch(start, "size does not fit in memory"))
}

impl BpsPatch {
    /// Parse and structurally verify a patch.
    ///
    /// Verifies the patch checksum first, then that every action stays inside the
    /// declared source and target sizes.
    pub fn parse(bytes: &[u8]) -> RomResult<Self> {
        if bytes.len() < MAGIC.len() || &bytes[..MAGIC.len()] != MAGIC {
            return Err(RomError::InvalidMagic {
                expected: "BPS1",
                found: bytes.iter().take(MAGIC.len()).copied().collect(),
            });
        }
        if bytes.len() < MAGIC.len() + TRAILER_LEN + 3 {
            return Err(RomError::truncated("block patch", bytes.len()));
        }
        let body_end: usize = bytes.len() - TRAILER_LEN;
        let source_crc: u32 = read_u32_le(bytes, body_end);
        let target_crc: u32 = read_u32_le(bytes, body_end + 4);
        let patch_crc: u32 = read_u32_le(bytes, body_end + 8);
        let actual_patch_crc: u32 = crc32fast::hash(&bytes[..bytes.len() - 4]);
        if actual_patch_crc != patch_crc {
            return Err(RomError::ChecksumMismatch {
                target: ChecksumTarget::Patch,
                expected: patch_crc,
                actual: actual_patch_crc,
            });
        }

        let body: &[u8] = &bytes[..body_end];
        let mut pos: usize = MAGIC.len();
        let source_size: usize = decode_size(body, &mut pos)?;
        let target_size: usize = decode_size(body, &mut pos)?;
        let metadata_size: usize = decode_size(body, &mut pos)?;
        let metadata: Vec<u8> = body
            .get(pos..pos + metadata_size)
            .ok_or_else(|| RomError::truncated("metadata", pos))?
            .to_vec();
        pos += metadata_size;

        let mut actions: Vec<BpsAction> = Vec::new();
        let mut output: usize = 0;
        let mut source_cursor: i64 = 0;
        let mut target_cursor: i64 = 0;
        while pos < body_end {
            let action_start: usize = pos;
            let data: u64 = vln::decode(body, &mut pos)?;
            let len: usize = usize::try_from((data >> 2) + 1)
                .map_err(|_| RomError::malformed_patch(action_start, "action length overflows"))?;
            if output + len > target_size {
                return Err(RomError::malformed_patch(
                    action_start,
                    format!("action writes past target size {}", target_size),
                ));
            }
            let action: BpsAction = match data & 3 {
                0 => {
                    if output + len > source_size {
                        return Err(RomError::malformed_patch(action_start, "source read past source end"));
                    }
                    BpsAction::SourceRead { len }
                }
                1 => {
                    let bytes: Vec<u8> = body
                        .get(pos..pos + len)
                        .ok_or_else(|| RomError::truncated("target read", pos))?
                        .to_vec();
                    pos += len;
                    BpsAction::TargetRead { bytes }
                }
                2 => {
                    let delta: i64 = vln::decode_signed(body, &mut pos)?;
                    source_cursor = source_cursor
                        .checked_add(delta)
                        .ok_or_else(|| RomError::malformed_patch(action_start, "source copy offset overflows"))?;
                    if source_cursor < 0 || source_cursor as usize + len > source_size {
                        return Err(RomError::malformed_patch(action_start, "source copy outside the source"));
                    }
                    source_cursor += len as i64;
                    BpsAction::SourceCopy { delta, len }
                }
                _ => {
                    let delta: i64 = vln::decode_signed(body, &mut pos)?;
                    target_cursor = target_cursor
                        .checked_add(delta)
                        .ok_or_else(|| RomError::malformed_patch(action_start, "target copy offset overflows"))?;
                    if target_cursor < 0 || target_cursor as usize >= output {
                        return Err(RomError::malformed_patch(action_start, "target copy from unwritten output"));
                    }
                    target_cursor += len as i64;
                    BpsAction::TargetCopy { delta, len }
                }
            };
            output += len;
            actions.push(action);
        }
        if output != target_size {
            return Err(RomError::malformed_patch(
                body_end,
                format!("actions produce {} bytes, target size is {}", output, target_size),
            ));
        }

        Ok(Self {
            source_size,
            target_size,
            metadata,
            actions,
            source_crc,
            target_crc,
            patch_crc,
        })
    }

    /// Apply to `source`, verifying the source and target checksums.
    pub fn apply(&self, source: &[u8]) -> RomResult<Vec<u8>> {
        let actual_source_crc: u32 = crc32fast::hash(source);
        if source.len() != self.source_size || actual_source_crc != self.source_crc {
            return Err(RomError::ChecksumMismatch {
                target: ChecksumTarget::Source,
                expected: self.source_crc,
                actual: actual_source_crc,
            });
        }

        let mut target: Vec<u8> = Vec::with_capacity(self.target_size);
        let mut source_cursor: usize = 0;
        let mut target_cursor: usize = 0;
        for action in &self.actions {
            match action {
                BpsAction::SourceRead { len } => {
                    let at: usize = target.len();
                    target.extend_from_slice(&source[at..at + len]);
                }
                BpsAction::TargetRead { bytes } => target.extend_from_slice(bytes),
                BpsAction::SourceCopy { delta, len } => {
                    source_cursor = (source_cursor as i64 + delta) as usize;
                    target.extend_from_slice(&source[source_cursor..source_cursor + len]);
                    source_cursor += len;
                }
                BpsAction::TargetCopy { delta, len } => {
                    target_cursor = (target_cursor as i64 + delta) as usize;
                    for _ in 0..*len {
                        let byte: u8 = target[target_cursor];
                        target.push(byte);
                        target_cursor += 1;
                    }
                }
            }
        }

        let actual_target_crc: u32 = crc32fast::hash(&target);
        if actual_target_crc != self.target_crc {
            return Err(RomError::ChecksumMismatch {
                target: ChecksumTarget::Target,
                expected: self.target_crc,
                actual: actual_target_crc,
            });
        }
        Ok(target)
    }

    /// Serialize, recomputing the patch checksum.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::with_capacity(64 + self.metadata.len() + self.actions.len() * 4);
        out.extend_from_slice(MAGIC);
        vln::encode(self.source_size as u64, &mut out);
        vln::encode(self.target_size as u64, &mut out);
        vln::encode(self.metadata.len() as u64, &mut out);
        out.extend_from_slice(&self.metadata);
        for action in &self.actions {
            vln::encode(((action.len() as u64 - 1) << 2) | action.code(), &mut out);
            match action {
                BpsAction::SourceRead { .. } => {}
                BpsAction::TargetRead { bytes } => out.extend_from_slice(bytes),
                BpsAction::SourceCopy { delta, .. } | BpsAction::TargetCopy { delta, .. } => {
                    vln::encode_signed(*delta, &mut out)
                }
            }
        }
        out.extend_from_slice(&self.source_crc.to_le_bytes());
        out.extend_from_slice(&self.target_crc.to_le_bytes());
        let patch_crc: u32 = crc32fast::hash(&out);
        out.extend_from_slice(&patch_crc.to_le_bytes());
        out
    }

    /// Build the patch turning `source` into `target`.
    pub fn create(source: &[u8], target: &[u8], metadata: &[u8]) -> Self {
        let actions: Vec<BpsAction> = Encoder::new(source, target).run();
        let patch: BpsPatch = Self {
            source_size: source.len(),
            target_size: target.len(),
            metadata: metadata.to_vec(),
            actions,
            source_crc: crc32fast::hash(source),
            target_crc: crc32fast::hash(target),
            patch_crc: 0,
        };
        info!(
            "Created block patch: {} actions for {} -> {} bytes",
            patch.actions.len(),
            source.len(),
            target.len()
        );
        patch
    }
}

#[inline]
fn window_key(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[inline]
fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Greedy delta encoder over 4-byte hash indexes.
struct Encoder<'a> {
    source: &'a [u8],
    target: &'a [u8],
    source_index: HashMap<u32, usize>,
    target_index: HashMap<u32, usize>,
    indexed: usize,
    actions: Vec<BpsAction>,
    literal_start: Option<usize>,
    source_cursor: i64,
    target_cursor: i64,
}

impl<'a> Encoder<'a> {
    fn new(source: &'a [u8], target: &'a [u8]) -> Self {
        let mut source_index: HashMap<u32, usize> = HashMap::with_capacity(source.len() / 2);
        for p in 0..source.len().saturating_sub(MIN_COPY - 1) {
            source_index.entry(window_key(&source[p..])).or_insert(p);
        }
        Self {
            source,
            target,
            source_index,
            target_index: HashMap::new(),
            indexed: 0,
            actions: Vec::new(),
            literal_start: None,
            source_cursor: 0,
            target_cursor: 0,
        }
    }

    fn flush_literal(&mut self, pos: usize) {
        if let Some(start) = self.literal_start.take() {
            self.actions.push(BpsAction::TargetRead {
                bytes: self.target[start..pos].to_vec(),
            });
        }
    }

    fn index_up_to(&mut self, pos: usize) {
        let limit: usize = pos.min(self.target.len().saturating_sub(MIN_COPY - 1));
        for q in self.indexed..limit {
            self.target_index.insert(window_key(&self.target[q..]), q);
        }
        self.indexed = self.indexed.max(limit);
    }

    fn run(mut self) -> Vec<BpsAction> {
        let target: &[u8] = self.target;
        let source: &[u8] = self.source;
        let mut pos: usize = 0;

        while pos < target.len() {
            let source_read: usize = if pos < source.len() {
                common_prefix(&source[pos..], &target[pos..])
            } else {
                0
            };

            let mut best: Option<BpsAction> = None;
            let mut best_len: usize = 0;
            if pos + MIN_COPY <= target.len() {
                let key: u32 = window_key(&target[pos..]);
                if let Some(&from) = self.source_index.get(&key) {
                    let len: usize = common_prefix(&source[from..], &target[pos..]);
                    if len > best_len {
                        best_len = len;
                        best = Some(BpsAction::SourceCopy {
                            delta: from as i64 - self.source_cursor,
                            len,
                        });
                    }
                }
                if let Some(&from) = self.target_index.get(&key) {
                    // Overlapping copies replay output written by the copy itself.
                    let len: usize = (0..target.len() - pos)
                        .take_while(|&k| target[from + k] == target[pos + k])
                        .count();
                    if len > best_len {
                        best_len = len;
                        best = Some(BpsAction::TargetCopy {
                            delta: from as i64 - self.target_cursor,
                            len,
                        });
                    }
                }
            }

            let chosen: Option<BpsAction> = if source_read >= MIN_COPY && source_read >= best_len {
                Some(BpsAction::SourceRead { len: source_read })
            } else if best_len >= MIN_COPY {
                best
            } else if source_read > 0 && self.literal_start.is_none() {
                Some(BpsAction::SourceRead { len: source_read })
            } else {
                None
            };

            match chosen {
                Some(action) => {
                    self.flush_literal(pos);
                    match &action {
                        BpsAction::SourceCopy { delta, len } => {
                            self.source_cursor += delta + *len as i64;
                        }
                        BpsAction::TargetCopy { delta, len } => {
                            self.target_cursor += delta + *len as i64;
                        }
                        _ => {}
                    }
                    pos += action.len();
                    self.actions.push(action);
                }
                None => {
                    self.literal_start.get_or_insert(pos);
                    pos += 1;
                }
            }
            self.index_up_to(pos);
        }
        self.flush_literal(pos);
        debug!("Encoder produced {} actions", self.actions.len());
        self.actions
    }
}
