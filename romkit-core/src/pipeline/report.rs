//! Difference reports between two images.

use crate::rom::container::{ByteChange, Container};
use crate::rom::mapper::{CartAddress, Mapper, BANK_SIZE};
use serde::Serialize;
use std::collections::BTreeMap;

/// One maximal run of differing bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffRegion {
    pub start: usize,
    pub end: usize,
    pub address: Option<CartAddress>,
}

impl DiffRegion {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffReport {
    pub original_len: usize,
    pub modified_len: usize,
    /// Differing bytes over the common length.
    pub bytes_changed: usize,
    pub regions: Vec<DiffRegion>,
    /// Changed bytes per bank, including appended ones.
    pub banks: BTreeMap<usize, usize>,
    pub appended: usize,
    pub truncated: usize,
}

#[derive(Default)]
struct Builder {
    regions: Vec<DiffRegion>,
    banks: BTreeMap<usize, usize>,
    bytes_changed: usize,
}

impl Builder {
    fn push(&mut self, offset: usize, mapper: &Mapper) {
        self.bytes_changed += 1;
        *self.banks.entry(offset / BANK_SIZE).or_insert(0) += 1;
        match self.regions.last_mut() {
            Some(region) if region.end == offset => region.end += 1,
            _ => self.regions.push(DiffRegion {
                start: offset,
                end: offset + 1,
                address: mapper.from_logical(offset).ok(),
            }),
        }
    }

    fn finish(mut self, original_len: usize, modified_len: usize, mapper: &Mapper) -> DiffReport {
        let common: usize = original_len.min(modified_len);
        let changed: usize = self.bytes_changed;
        for offset in common..modified_len {
            self.push(offset, mapper);
        }
        DiffReport {
            original_len,
            modified_len,
            bytes_changed: changed,
            regions: self.regions,
            banks: self.banks,
            appended: modified_len.saturating_sub(original_len),
            truncated: original_len.saturating_sub(modified_len),
        }
    }
}

impl DiffReport {
    /// Compare two logical images byte by byte.
    pub fn between(original: &[u8], modified: &[u8]) -> Self {
        let mapper: Mapper = Mapper::unchecked(original.len().max(modified.len()));
        let mut builder: Builder = Builder::default();
        for (offset, (a, b)) in original.iter().zip(modified).enumerate() {
            if a != b {
                builder.push(offset, &mapper);
            }
        }
        builder.finish(original.len(), modified.len(), &mapper)
    }

    /// Report a container's edits without rescanning unchanged bytes.
    pub fn from_container(container: &Container) -> Self {
        let mapper: Mapper = Mapper::unchecked(container.len().max(container.original().len()));
        let mut builder: Builder = Builder::default();
        for ByteChange { offset, .. } in container.diff() {
            builder.push(offset, &mapper);
        }
        builder.finish(container.original().len(), container.len(), &mapper)
    }

    pub fn is_identical(&self) -> bool {
        self.bytes_changed == 0 && self.original_len == self.modified_len
    }
}
