//! Binary deltas between two cartridge images.

pub mod bps;
pub mod ips;
pub mod vln;

pub use bps::{BpsAction, BpsPatch};
pub use ips::{IpsPatch, IpsRecord, RecordData, RecordOptions};

use crate::error::{RomError, RomResult};
use log::info;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchFormat {
    Record,
    Block,
}

impl PatchFormat {
    pub fn extension(self) -> &'static str {
        match self {
            PatchFormat::Record => "ips",
            PatchFormat::Block => "bps",
        }
    }
}

/// What `validate` learned about a patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchInfo {
    pub format: PatchFormat,
    /// Records or actions.
    pub operations: usize,
    pub source_size: Option<usize>,
    /// For record patches: the highest byte written, or the truncation length.
    pub target_size: usize,
    pub metadata: Option<String>,
    pub source_crc: Option<u32>,
    pub target_crc: Option<u32>,
}

/// Entry points over both patch formats.
pub struct Patch;

impl Patch {
    /// Record-format patch with plain literal records.
    pub fn create_record(source: &[u8], target: &[u8]) -> RomResult<Vec<u8>> {
        Self::create_record_with(source, target, RecordOptions::default())
    }

    pub fn create_record_with(source: &[u8], target: &[u8], options: RecordOptions) -> RomResult<Vec<u8>> {
        let patch: IpsPatch = IpsPatch::create(source, target, options)?;
        let bytes: Vec<u8> = patch.to_bytes();
        info!(
            "Created record patch: {} records, {} bytes",
            patch.records.len(),
            bytes.len()
        );
        Ok(bytes)
    }

    /// Apply a record-format patch.
    ///
    /// The format carries no source checksum, so a source shorter than the first record
    /// offset is the only mismatch that can be detected.
    pub fn apply_record(patch: &[u8], source: &[u8]) -> RomResult<Vec<u8>> {
        let parsed: IpsPatch = IpsPatch::parse(patch)?;
        if let Some(first) = parsed.records.iter().map(|r| r.offset).min() {
            if first > source.len() {
                return Err(RomError::malformed_patch(
                    0,
                    format!(
                        "first record writes at 0x{:06X}, past the {}-byte source",
                        first,
                        source.len()
                    ),
                ));
            }
        }
        Ok(parsed.apply(source))
    }

    pub fn create_block(source: &[u8], target: &[u8], metadata: &[u8]) -> Vec<u8> {
        BpsPatch::create(source, target, metadata).to_bytes()
    }

    pub fn apply_block(patch: &[u8], source: &[u8]) -> RomResult<Vec<u8>> {
        BpsPatch::parse(patch)?.apply(source)
    }

    pub fn detect(patch: &[u8]) -> Option<PatchFormat> {
        if patch.starts_with(ips::MAGIC) {
            Some(PatchFormat::Record)
        } else if patch.starts_with(bps::MAGIC) {
            Some(PatchFormat::Block)
        } else {
            None
        }
    }

    /// Check a patch without a source image.
    ///
    /// Block patches verify their own checksum and action bounds. Record patches carry no
    /// checksum and are checked structurally.
    pub fn validate(patch: &[u8]) -> RomResult<PatchInfo> {
        match Self::detect(patch) {
            Some(PatchFormat::Record) => {
                let parsed: IpsPatch = IpsPatch::parse(patch)?;
                Ok(PatchInfo {
                    format: PatchFormat::Record,
                    operations: parsed.records.len(),
                    source_size: None,
                    target_size: parsed.truncate.unwrap_or_else(|| parsed.max_offset()),
                    metadata: None,
                    source_crc: None,
                    target_crc: None,
                })
            }
            Some(PatchFormat::Block) => {
                let parsed: BpsPatch = BpsPatch::parse(patch)?;
                Ok(PatchInfo {
                    format: PatchFormat::Block,
                    operations: parsed.actions.len(),
                    source_size: Some(parsed.source_size),
                    target_size: parsed.target_size,
                    metadata: (!parsed.metadata.is_empty())
                        .then(|| String::from_utf8_lossy(&parsed.metadata).into_owned()),
                    source_crc: Some(parsed.source_crc),
                    target_crc: Some(parsed.target_crc),
                })
            }
            None => Err(RomError::InvalidMagic {
                expected: "PATCH or BPS1",
                found: patch.iter().take(5).copied().collect(),
            }),
        }
    }

    /// Apply a patch of either format.
    pub fn apply(patch: &[u8], source: &[u8]) -> RomResult<Vec<u8>> {
        match Self::detect(patch) {
            Some(PatchFormat::Record) => Self::apply_record(patch, source),
            Some(PatchFormat::Block) => Self::apply_block(patch, source),
            None => Err(RomError::InvalidMagic {
                expected: "PATCH or BPS1",
                found: patch.iter().take(5).copied().collect(),
            }),
        }
    }
}
