//! ROM Container
//!
//! The container exclusively owns a cartridge image for the lifetime of an edit session.
//! It keeps the image exactly as opened next to a working copy; every read and write goes
//! through bounds-checked primitives, and every write is journaled so that a failed
//! operation can be rolled back without discarding unrelated edits.
//!
//! # Offsets
//! All offsets accepted by the container are logical: the optional copier header is
//! stripped at open and reattached on save. Use [`Container::read_at`] or the
//! [`Mapper`] to work with cartridge addresses.
//!
//! # Lifecycle
//! File handles are only held inside [`Container::open`] and [`Container::save`].

use crate::error::{check_span, RomError, RomResult};
use crate::rom::dirty::DirtySet;
use crate::rom::header::InternalHeader;
use crate::rom::mapper::{CartAddress, Mapper, BANK_SIZE, MAX_ROM_SIZE};
use log::{debug, info};
use sha2::{Digest, Sha256};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Options for [`Container::save`].
#[derive(Debug, Clone, Copy)]
pub struct SaveOptions {
    /// Reattach the copier header if the image was opened with one.
    pub keep_header: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self { keep_header: true }
    }
}

/// One byte that differs between the original and working images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteChange {
    pub offset: usize,
    pub original: u8,
    pub current: u8,
}

/// Marker returned by [`Container::checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

#[derive(Debug, Clone)]
enum JournalEntry {
    Write { offset: usize, previous: Vec<u8> },
    Resize { previous_len: usize },
}

/// Owned cartridge image with dirty tracking and rollback.
#[derive(Debug, Clone)]
pub struct Container {
    mapper: Mapper,
    copier_header: Vec<u8>,
    original: Vec<u8>,
    working: Vec<u8>,
    dirty: DirtySet,
    journal: Vec<JournalEntry>,
    path: Option<PathBuf>,
}

impl Container {
    /// Read an image from disk.
    ///
    /// # Errors
    /// `Io` if the file cannot be read, `InvalidCartridgeSize` if its length is not an
    /// accepted cartridge size.
    pub fn open(path: &Path) -> RomResult<Self> {
        let bytes: Vec<u8> = fs::read(path)?;
        let mut container: Container = Self::from_bytes(bytes)?;
        container.path = Some(path.to_path_buf());
        info!(
            "Opened {} ({} KiB{})",
            path.display(),
            container.len() / 1024,
            if container.mapper.has_header() {
                ", copier header"
            } else {
                ""
            }
        );
        Ok(container)
    }

    /// Build a container from file bytes (header detection included).
    pub fn from_bytes(mut bytes: Vec<u8>) -> RomResult<Self> {
        let mapper: Mapper = Mapper::open(bytes.len())?;
        let logical: Vec<u8> = bytes.split_off(mapper.header_len());
        Ok(Self {
            mapper,
            copier_header: bytes,
            original: logical.clone(),
            working: logical,
            dirty: DirtySet::new(),
            journal: Vec::new(),
            path: None,
        })
    }

    /// Write the working image to disk.
    pub fn save(&self, path: &Path, options: SaveOptions) -> RomResult<()> {
        fs::write(path, self.to_bytes(options.keep_header))?;
        info!(
            "Saved {} ({} dirty extents, {} bytes touched)",
            path.display(),
            self.dirty.len(),
            self.dirty.byte_count()
        );
        Ok(())
    }

    /// The working image as file bytes.
    pub fn to_bytes(&self, keep_header: bool) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::with_capacity(self.copier_header.len() + self.working.len());
        if keep_header {
            out.extend_from_slice(&self.copier_header);
        }
        out.extend_from_slice(&self.working);
        out
    }

    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Logical length of the working image.
    #[inline]
    pub fn len(&self) -> usize {
        self.working.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.working.is_empty()
    }

    /// The image as opened.
    pub fn original(&self) -> &[u8] {
        &self.original
    }

    /// The image with all edits applied.
    pub fn working(&self) -> &[u8] {
        &self.working
    }

    pub fn copier_header(&self) -> &[u8] {
        &self.copier_header
    }

    #[inline]
    pub fn read_u8(&self, offset: usize) -> RomResult<u8> {
        check_span(offset, 1, self.working.len())?;
        Ok(self.working[offset])
    }

    #[inline]
    pub fn read_u16_le(&self, offset: usize) -> RomResult<u16> {
        let bytes: &[u8] = self.slice(offset, 2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    #[inline]
    pub fn read_u24_le(&self, offset: usize) -> RomResult<u32> {
        let bytes: &[u8] = self.slice(offset, 3)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]))
    }

    /// Copy `len` bytes out of the working image.
    pub fn read_bytes(&self, offset: usize, len: usize) -> RomResult<Vec<u8>> {
        Ok(self.slice(offset, len)?.to_vec())
    }

    /// Borrow `len` bytes of the working image.
    pub fn slice(&self, offset: usize, len: usize) -> RomResult<&[u8]> {
        check_span(offset, len, self.working.len())?;
        Ok(&self.working[offset..offset + len])
    }

    /// Copy `len` bytes starting at a cartridge address.
    pub fn read_at(&self, address: CartAddress, len: usize) -> RomResult<Vec<u8>> {
        let offset: usize = self.mapper.to_logical(address)?;
        self.read_bytes(offset, len)
    }

    #[inline]
    pub fn write_u8(&mut self, offset: usize, value: u8) -> RomResult<()> {
        self.write_bytes(offset, &[value])
    }

    #[inline]
    pub fn write_u16_le(&mut self, offset: usize, value: u16) -> RomResult<()> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    #[inline]
    pub fn write_u24_le(&mut self, offset: usize, value: u32) -> RomResult<()> {
        if value > 0x00FF_FFFF {
            return Err(RomError::CapacityExceeded {
                what: "24-bit value".to_string(),
                required: value as u64,
                available: 0x00FF_FFFF,
            });
        }
        let bytes: [u8; 4] = value.to_le_bytes();
        self.write_bytes(offset, &bytes[..3])
    }

    /// Write bytes into the working image and mark the extent dirty.
    pub fn write_bytes(&mut self, offset: usize, data: &[u8]) -> RomResult<()> {
        check_span(offset, data.len(), self.working.len())?;
        if data.is_empty() {
            return Ok(());
        }
        let range: Range<usize> = offset..offset + data.len();
        self.journal.push(JournalEntry::Write {
            offset,
            previous: self.working[range.clone()].to_vec(),
        });
        self.working[range.clone()].copy_from_slice(data);
        self.dirty.insert(range);
        Ok(())
    }

    /// Write bytes starting at a cartridge address.
    pub fn write_at(&mut self, address: CartAddress, data: &[u8]) -> RomResult<()> {
        let offset: usize = self.mapper.to_logical(address)?;
        self.write_bytes(offset, data)
    }

    /// Overwrite `len` bytes with `value`.
    pub fn fill(&mut self, offset: usize, len: usize, value: u8) -> RomResult<()> {
        self.write_bytes(offset, &vec![value; len])
    }

    /// Grow the image to `new_len` bytes, padding with `fill`.
    ///
    /// `new_len` must be a whole number of banks and no larger than 6 MiB. Growth is
    /// journaled like any write.
    pub fn expand(&mut self, new_len: usize, fill: u8) -> RomResult<()> {
        if new_len <= self.working.len() {
            return Ok(());
        }
        if new_len % BANK_SIZE != 0 || new_len > MAX_ROM_SIZE {
            return Err(RomError::CapacityExceeded {
                what: "expanded image size".to_string(),
                required: new_len as u64,
                available: MAX_ROM_SIZE as u64,
            });
        }
        let previous_len: usize = self.working.len();
        self.journal.push(JournalEntry::Resize { previous_len });
        self.working.resize(new_len, fill);
        self.mapper.set_logical_len(new_len);
        self.dirty.insert(previous_len..new_len);
        info!("Expanded image from {} to {} KiB", previous_len / 1024, new_len / 1024);
        Ok(())
    }

    /// Extents written since open (or since the last rollback, recomputed).
    pub fn dirty_extents(&self) -> &DirtySet {
        &self.dirty
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Mark the current journal position.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.journal.len())
    }

    /// Undo every write made after `checkpoint`.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        let mut undone: usize = 0;
        while self.journal.len() > checkpoint.0 {
            let Some(entry) = self.journal.pop() else {
                break;
            };
            match entry {
                JournalEntry::Write { offset, previous } => {
                    self.working[offset..offset + previous.len()].copy_from_slice(&previous);
                }
                JournalEntry::Resize { previous_len } => {
                    self.working.truncate(previous_len);
                    self.mapper.set_logical_len(previous_len);
                }
            }
            undone += 1;
        }
        self.rebuild_dirty();
        debug!("Rolled back {} journal entries", undone);
    }

    /// Discard every edit.
    pub fn revert_all(&mut self) {
        self.working.clone_from(&self.original);
        self.mapper.set_logical_len(self.original.len());
        self.journal.clear();
        self.dirty.clear();
    }

    fn rebuild_dirty(&mut self) {
        let mut dirty: DirtySet = DirtySet::new();
        for entry in &self.journal {
            match entry {
                JournalEntry::Write { offset, previous } => {
                    dirty.insert(*offset..*offset + previous.len())
                }
                JournalEntry::Resize { previous_len } => {
                    dirty.insert(*previous_len..self.working.len())
                }
            }
        }
        self.dirty = dirty;
    }

    /// Bytes where the working image differs from the original, in ascending order.
    ///
    /// Bytes appended by [`Container::expand`] have no original and are reported by
    /// [`Container::appended`] instead.
    pub fn diff(&self) -> impl Iterator<Item = ByteChange> + '_ {
        let common: usize = self.original.len().min(self.working.len());
        self.dirty
            .iter()
            .filter_map(move |range| {
                let end: usize = range.end.min(common);
                (range.start < end).then_some(range.start..end)
            })
            .flat_map(move |range| range.map(move |offset| (offset, self.original[offset], self.working[offset])))
            .filter(|(_, original, current)| original != current)
            .map(|(offset, original, current)| ByteChange {
                offset,
                original,
                current,
            })
    }

    /// Bytes past the end of the original image.
    pub fn appended(&self) -> &[u8] {
        let start: usize = self.original.len().min(self.working.len());
        &self.working[start..]
    }

    /// Parse the internal cartridge header of the working image.
    pub fn header(&self) -> RomResult<InternalHeader> {
        InternalHeader::parse(&self.working)
    }

    /// SHA-256 of the logical working image, lowercase hex.
    pub fn sha256(&self) -> String {
        let digest = Sha256::digest(&self.working);
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// CRC32 of the logical working image.
    pub fn crc32(&self) -> u32 {
        crc32fast::hash(&self.working)
    }
}
