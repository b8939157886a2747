//! Error Handling
//!
//! This module provides the error type shared by every romkit operation, built on `thiserror`.
//! Variants carry the structured facts a caller needs to react (offsets, expected/actual
//! pairs, required/available sizes) and, where a remedy is known, a suggestion line.
//!
//! # Error Categories
//! Every variant belongs to exactly one [`ErrorKind`]:
//! - **Io**: file operations failed
//! - **Format**: a structural violation (bad magic, truncated record, malformed table line)
//! - **Integrity**: a checksum or signature mismatch
//! - **Capacity**: an edit does not fit (no free space, offset overflow, dialog too long)
//! - **Unmapped**: an encoder was handed a value with no defined mapping
//! - **OutOfBounds**: a read or write extends past the buffer

use std::fmt;
use thiserror::Error;

/// Result alias used across the crate.
pub type RomResult<T> = Result<T, RomError>;

/// Coarse error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Io,
    Format,
    Integrity,
    Capacity,
    Unmapped,
    OutOfBounds,
}

impl ErrorKind {
    /// Process exit code a command-line wrapper should use for this kind.
    ///
    /// Usage errors (code 2) never originate in the library.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Io => 3,
            ErrorKind::Format | ErrorKind::Unmapped | ErrorKind::OutOfBounds => 4,
            ErrorKind::Integrity => 5,
            ErrorKind::Capacity => 6,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &str = match self {
            ErrorKind::Io => "I/O",
            ErrorKind::Format => "format",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Capacity => "capacity",
            ErrorKind::Unmapped => "unmapped",
            ErrorKind::OutOfBounds => "out-of-bounds",
        };
        f.write_str(name)
    }
}

/// Which checksum failed to verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumTarget {
    /// Checksum of the image a patch is applied to
    Source,
    /// Checksum of the image a patch produces
    Target,
    /// Checksum of the patch file itself
    Patch,
    /// Additive checksum of a save slot
    SaveSlot(usize),
    /// Internal cartridge header checksum
    Cartridge,
}

impl fmt::Display for ChecksumTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumTarget::Source => f.write_str("source"),
            ChecksumTarget::Target => f.write_str("target"),
            ChecksumTarget::Patch => f.write_str("patch"),
            ChecksumTarget::SaveSlot(slot) => write!(f, "save slot {}", slot),
            ChecksumTarget::Cartridge => f.write_str("cartridge header"),
        }
    }
}

/// Errors produced by romkit operations.
#[derive(Error, Debug)]
pub enum RomError {
    /// Underlying file operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cartridge image length is not an accepted size.
    #[error("invalid cartridge size: {size} bytes (header {header} bytes)\nSuggestion: {suggestion}")]
    InvalidCartridgeSize {
        size: usize,
        header: usize,
        suggestion: String,
    },

    /// A cartridge address does not map into ROM.
    #[error("address ${address:06X} is not mapped to ROM: {reason}")]
    AddressOutOfRange { address: u32, reason: &'static str },

    /// A read or write extends past the buffer.
    #[error("access of {len} bytes at offset 0x{offset:06X} exceeds buffer of {size} bytes")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },

    /// File magic does not match the expected format.
    #[error("invalid magic: expected {expected:?}, found {found:02X?}")]
    InvalidMagic {
        expected: &'static str,
        found: Vec<u8>,
    },

    /// A record ends before its declared length.
    #[error("truncated {what} at offset 0x{offset:X}")]
    TruncatedRecord { what: &'static str, offset: usize },

    /// Structurally invalid patch content.
    #[error("malformed patch at offset 0x{offset:X}: {message}")]
    MalformedPatch { offset: usize, message: String },

    /// An audio block runs past the end of the buffer.
    #[error("truncated sample block at offset 0x{offset:X} after {blocks_decoded} blocks")]
    TruncatedSample {
        offset: usize,
        blocks_decoded: usize,
    },

    /// Character table line could not be parsed.
    #[error("character table line {line}: {message}")]
    TableSyntax { line: usize, message: String },

    /// Two character table lines claim the same byte.
    #[error("character table line {line}: byte {byte:02X} is already defined on line {first_line}")]
    DuplicateTableEntry {
        line: usize,
        byte: u8,
        first_line: usize,
    },

    /// A bracketed token in text is malformed or has the wrong parameter count.
    #[error("invalid token {token:?} at character {position}: {reason}")]
    InvalidToken {
        position: usize,
        token: String,
        reason: String,
    },

    /// A payload has no terminator before the end of its region.
    #[error("payload at offset 0x{offset:06X} has no terminator {terminator:02X} before 0x{limit:06X}")]
    UnterminatedPayload {
        offset: usize,
        terminator: u8,
        limit: usize,
    },

    /// A checksum did not verify.
    #[error("{target} checksum mismatch: expected 0x{expected:08X}, actual 0x{actual:08X}")]
    ChecksumMismatch {
        target: ChecksumTarget,
        expected: u32,
        actual: u32,
    },

    /// A save slot does not carry the expected signature.
    #[error("save slot {slot} signature mismatch: expected {expected:02X?}, found {found:02X?}")]
    SignatureMismatch {
        slot: usize,
        expected: Vec<u8>,
        found: Vec<u8>,
    },

    /// A save-RAM image has an unsupported size.
    #[error("invalid save-RAM size: {size} bytes (need a power-of-two multiple of 2 KiB holding at least {required} bytes)")]
    InvalidSaveSize { size: usize, required: usize },

    /// No free region can hold a relocated payload.
    #[error("edit is {required} bytes; original slot is {original} bytes; no {required}-byte gap found (largest gap {largest_gap} bytes)\nSuggestion: {suggestion}")]
    NoFreeSpace {
        required: usize,
        original: usize,
        largest_gap: usize,
        suggestion: String,
    },

    /// A record-format patch cannot address the target.
    #[error("offset 0x{offset:X} exceeds the record-format limit of 0x{limit:X}")]
    OffsetOverflow { offset: usize, limit: usize },

    /// Encoded text exceeds a per-dialog limit.
    #[error("dialog {what} is {required}, limit is {available}")]
    DialogTooLong {
        what: &'static str,
        required: usize,
        available: usize,
    },

    /// A value exceeds a fixed field or container capacity.
    #[error("{what}: {required} exceeds capacity {available}")]
    CapacityExceeded {
        what: String,
        required: u64,
        available: u64,
    },

    /// The encoder met characters with no table entry.
    #[error("unmapped characters: {}", format_characters(.characters))]
    UnmappedCharacter { characters: Vec<char> },

    /// A pixel index does not fit the requested bit depth.
    #[error("pixel index {index} at ({x}, {y}) exceeds {colors} colors")]
    PixelOutOfRange {
        x: usize,
        y: usize,
        index: u8,
        colors: usize,
    },

    /// An RGB colour has no palette entry or 15-bit equivalent.
    #[error("color #{r:02X}{g:02X}{b:02X} has no mapping: {reason}")]
    UnmappedColor {
        r: u8,
        g: u8,
        b: u8,
        reason: &'static str,
    },

    /// Compressed stream is inconsistent.
    #[error("decompression failed at offset 0x{offset:X}: {message}")]
    Decompression { offset: usize, message: String },

    /// Configuration document is invalid.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// An image or audio file could not be decoded or encoded.
    #[error("media error: {message}")]
    Media { message: String },
}

fn format_characters(characters: &[char]) -> String {
    characters
        .iter()
        .map(|c| format!("{:?} (U+{:04X})", c, *c as u32))
        .collect::<Vec<_>>()
        .join(", ")
}

impl RomError {
    /// Classify this error into one of the six kinds.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RomError::Io(_) => ErrorKind::Io,
            RomError::InvalidCartridgeSize { .. }
            | RomError::AddressOutOfRange { .. }
            | RomError::InvalidMagic { .. }
            | RomError::TruncatedRecord { .. }
            | RomError::MalformedPatch { .. }
            | RomError::TruncatedSample { .. }
            | RomError::TableSyntax { .. }
            | RomError::DuplicateTableEntry { .. }
            | RomError::InvalidToken { .. }
            | RomError::UnterminatedPayload { .. }
            | RomError::InvalidSaveSize { .. }
            | RomError::Decompression { .. }
            | RomError::Config { .. }
            | RomError::Media { .. } => ErrorKind::Format,
            RomError::ChecksumMismatch { .. } | RomError::SignatureMismatch { .. } => {
                ErrorKind::Integrity
            }
            RomError::NoFreeSpace { .. }
            | RomError::OffsetOverflow { .. }
            | RomError::DialogTooLong { .. }
            | RomError::CapacityExceeded { .. } => ErrorKind::Capacity,
            RomError::UnmappedCharacter { .. }
            | RomError::PixelOutOfRange { .. }
            | RomError::UnmappedColor { .. } => ErrorKind::Unmapped,
            RomError::OutOfBounds { .. } => ErrorKind::OutOfBounds,
        }
    }

    /// Create an invalid cartridge size error with a suggestion.
    #[cold]
    pub fn cartridge_size(size: usize, header: usize) -> Self {
        let suggestion = if size % 1024 != 0 {
            "The file length is not a multiple of 1 KiB; it may be truncated or carry an unusual header."
        } else {
            "Logical size must be a multiple of 32 KiB between 128 KiB and 6 MiB."
        };
        Self::InvalidCartridgeSize {
            size,
            header,
            suggestion: suggestion.to_string(),
        }
    }

    /// Create an out-of-bounds error.
    #[cold]
    pub fn out_of_bounds(offset: usize, len: usize, size: usize) -> Self {
        Self::OutOfBounds { offset, len, size }
    }

    /// Create a no-free-space error with a remedy matched to the shortfall.
    #[cold]
    pub fn no_free_space(required: usize, original: usize, largest_gap: usize) -> Self {
        let suggestion = if largest_gap == 0 {
            "No free regions are registered; declare free space in the game profile or allow image expansion.".to_string()
        } else {
            format!(
                "Consider shortening the text by {} bytes or expanding the image.",
                required.saturating_sub(original.max(largest_gap))
            )
        };
        Self::NoFreeSpace {
            required,
            original,
            largest_gap,
            suggestion,
        }
    }

    /// Create a truncated-record error.
    #[cold]
    pub fn truncated(what: &'static str, offset: usize) -> Self {
        Self::TruncatedRecord { what, offset }
    }

    /// Create a malformed-patch error.
    #[cold]
    pub fn malformed_patch(offset: usize, message: impl Into<String>) -> Self {
        Self::MalformedPatch {
            offset,
            message: message.into(),
        }
    }

    /// Create a configuration error.
    #[cold]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for RomError {
    #[cold]
    fn from(err: serde_json::Error) -> Self {
        RomError::Config {
            message: err.to_string(),
        }
    }
}

impl From<image::ImageError> for RomError {
    #[cold]
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(io) => RomError::Io(io),
            other => RomError::Media {
                message: other.to_string(),
            },
        }
    }
}

/// Checks that `[offset, offset + len)` lies within a buffer of `size` bytes.
#[inline]
pub(crate) fn check_span(offset: usize, len: usize, size: usize) -> RomResult<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(RomError::out_of_bounds(offset, len, size)),
    }
}
