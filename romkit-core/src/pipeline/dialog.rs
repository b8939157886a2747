//! Dialog extraction and re-insertion.
//!
//! # Relocation
//! An edited payload that still fits its slot is written in place. One that no longer
//! fits is moved to the smallest free gap that holds it, its pointer is rewritten, and
//! the old slot is handed back to the free-space map. Relocations run largest first to
//! keep the map from fragmenting. A slot that any other pointer reads from, whether at
//! its start or somewhere inside it, is never overwritten or freed.
//!
//! Each item commits inside its own container checkpoint, so a failed item leaves the
//! image exactly as it was before that item.

use crate::error::{RomError, RomResult};
use crate::pipeline::freespace::FreeSpaceMap;
use crate::rom::container::Container;
use crate::rom::mapper::{CartAddress, BANK_SIZE};
use crate::table::pointer::{PayloadEnd, PointerEntry, PointerSize, PointerTable};
use crate::text::codec::{DecodeOptions, DecodedText, TextCodec, TextLimits, UnmappedPolicy};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Range;

/// A named run of pointer-addressed strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBank {
    pub name: String,
    pub table: PointerTable,
    pub end: PayloadEnd,
    pub limits: TextLimits,
}

impl TextBank {
    /// Logical range a relocated payload must stay inside, if any.
    pub fn relocation_bounds(&self) -> Option<Range<usize>> {
        match self.table.pointer_size {
            PointerSize::Two => {
                let start: usize = (self.table.bank & 0x7F) as usize * BANK_SIZE;
                Some(start..start + BANK_SIZE)
            }
            PointerSize::Three => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedText {
    pub index: usize,
    pub address: CartAddress,
    pub offset: usize,
    /// Payload bytes as read from the slot.
    pub size: usize,
    pub text: String,
    pub terminated: bool,
}

#[derive(Debug, Default)]
pub struct ExtractReport {
    pub entries: Vec<ExtractedText>,
    /// Entries that could not be read, by index.
    pub errors: BTreeMap<usize, RomError>,
}

/// Decode every string of `bank`.
pub fn extract_texts(container: &Container, bank: &TextBank, codec: &TextCodec<'_>) -> ExtractReport {
    let mut report: ExtractReport = ExtractReport::default();
    for (index, entry) in bank.table.iter(container, bank.end).enumerate() {
        match entry {
            Ok(entry) => {
                let decoded: DecodedText = codec.decode(&entry.payload, DecodeOptions::default());
                if !decoded.terminated && !matches!(bank.end, PayloadEnd::FixedLength(_)) {
                    warn!("{} #{}: unterminated string at {}", bank.name, index, entry.address);
                }
                report.entries.push(ExtractedText {
                    index,
                    address: entry.address,
                    offset: entry.offset,
                    size: entry.payload.len(),
                    text: decoded.text,
                    terminated: decoded.terminated,
                });
            }
            Err(err) => {
                warn!("{} #{}: {}", bank.name, index, err);
                report.errors.insert(index, err);
            }
        }
    }
    info!(
        "Extracted {} strings from {} ({} failed)",
        report.entries.len(),
        bank.name,
        report.errors.len()
    );
    report
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CommitOptions {
    /// Overwrite freed bytes with this value.
    pub fill_freed: Option<u8>,
    /// Grow the image by whole banks when no gap is large enough.
    pub allow_expansion: bool,
    pub unmapped: UnmappedPolicy,
    /// Overrides the bank's own limits.
    pub limits: Option<TextLimits>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relocation {
    pub index: usize,
    pub from: usize,
    pub to: usize,
    pub old_len: usize,
    pub new_len: usize,
}

#[derive(Debug, Default)]
pub struct CommitReport {
    pub in_place: Vec<usize>,
    pub relocated: Vec<Relocation>,
    pub unchanged: Vec<usize>,
    pub errors: BTreeMap<usize, RomError>,
    /// New image length when the image had to grow.
    pub expanded_to: Option<usize>,
}

impl CommitReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// The report, or the error of the lowest failed index.
    pub fn check(mut self) -> RomResult<Self> {
        match self.errors.pop_first() {
            Some((_, err)) => Err(err),
            None => Ok(self),
        }
    }
}

/// An edit waiting for commit.
struct Pending {
    index: usize,
    entry: PointerEntry,
    bytes: Vec<u8>,
    shared: bool,
}

/// Whether any other live entry reads a byte of `entry`'s slot, including pointers
/// into the middle of it.
fn overlaps_other(live: &[(usize, Range<usize>)], index: usize, entry: &PointerEntry) -> bool {
    let slot: Range<usize> = entry.offset..entry.offset + entry.payload.len();
    live.iter()
        .any(|(other, range)| *other != index && range.start < slot.end && slot.start < range.end)
}

/// Stages text edits against one bank and writes them back in a single pass.
pub struct DialogEditor {
    bank: TextBank,
    staged: BTreeMap<usize, String>,
}

impl DialogEditor {
    pub fn new(bank: TextBank) -> Self {
        Self {
            bank,
            staged: BTreeMap::new(),
        }
    }

    pub fn bank(&self) -> &TextBank {
        &self.bank
    }

    /// Queue `text` as the new content of string `index`; a later stage replaces it.
    pub fn stage(&mut self, index: usize, text: impl Into<String>) -> RomResult<()> {
        if index >= self.bank.table.count {
            return Err(RomError::out_of_bounds(index, 1, self.bank.table.count));
        }
        self.staged.insert(index, text.into());
        Ok(())
    }

    pub fn staged(&self) -> usize {
        self.staged.len()
    }

    /// Encode and write every staged edit.
    ///
    /// Per-item failures land in [`CommitReport::errors`] and leave that item's slot
    /// untouched; use [`CommitReport::check`] to turn them into an error.
    pub fn commit(
        &mut self,
        container: &mut Container,
        codec: &TextCodec<'_>,
        free: &mut FreeSpaceMap,
        options: CommitOptions,
    ) -> RomResult<CommitReport> {
        let mut report: CommitReport = CommitReport::default();
        let limits: TextLimits = options.limits.unwrap_or(self.bank.limits);

        let mut entries: BTreeMap<usize, PointerEntry> = BTreeMap::new();
        let mut live: Vec<(usize, Range<usize>)> = Vec::new();
        for (index, entry) in self.bank.table.iter(container, self.bank.end).enumerate() {
            match entry {
                Ok(entry) => {
                    live.push((index, entry.offset..entry.offset + entry.payload.len()));
                    entries.insert(index, entry);
                }
                Err(err) => {
                    if self.staged.contains_key(&index) {
                        report.errors.insert(index, err);
                    }
                }
            }
        }

        let mut pending: Vec<Pending> = Vec::with_capacity(self.staged.len());
        for (&index, text) in &self.staged {
            let Some(entry) = entries.remove(&index) else {
                continue;
            };
            let encoded = codec
                .metrics(text)
                .and_then(|metrics| metrics.check(&limits))
                .and_then(|()| codec.encode(text, options.unmapped));
            match encoded {
                Ok(bytes) => {
                    let shared: bool = overlaps_other(&live, index, &entry);
                    pending.push(Pending {
                        index,
                        entry,
                        bytes,
                        shared,
                    });
                }
                Err(err) => {
                    debug!("{} #{}: {}", self.bank.name, index, err);
                    report.errors.insert(index, err);
                }
            }
        }

        let (in_place, mut moving): (Vec<Pending>, Vec<Pending>) = pending
            .into_iter()
            .partition(|p| !p.shared && p.bytes.len() <= p.entry.payload.len());

        for item in in_place {
            if item.bytes == item.entry.payload {
                report.unchanged.push(item.index);
                continue;
            }
            let checkpoint = container.checkpoint();
            match self.write_in_place(container, free, &item, options) {
                Ok(()) => report.in_place.push(item.index),
                Err(err) => {
                    container.rollback(checkpoint);
                    report.errors.insert(item.index, err);
                }
            }
        }

        moving.sort_by(|a, b| b.bytes.len().cmp(&a.bytes.len()).then(a.index.cmp(&b.index)));
        for item in moving {
            if item.bytes == item.entry.payload {
                report.unchanged.push(item.index);
                continue;
            }
            let checkpoint = container.checkpoint();
            let free_before: FreeSpaceMap = free.clone();
            let len_before: usize = container.len();
            match self.relocate(container, free, &item, options) {
                Ok(relocation) => {
                    if container.len() > len_before {
                        report.expanded_to = Some(container.len());
                    }
                    report.relocated.push(relocation);
                }
                Err(err) => {
                    container.rollback(checkpoint);
                    *free = free_before;
                    report.errors.insert(item.index, err);
                }
            }
        }

        for index in report.in_place.iter().chain(report.relocated.iter().map(|r| &r.index)) {
            self.staged.remove(index);
        }
        info!(
            "Committed {}: {} in place, {} relocated, {} unchanged, {} failed",
            self.bank.name,
            report.in_place.len(),
            report.relocated.len(),
            report.unchanged.len(),
            report.errors.len()
        );
        Ok(report)
    }

    fn write_in_place(
        &self,
        container: &mut Container,
        free: &mut FreeSpaceMap,
        item: &Pending,
        options: CommitOptions,
    ) -> RomResult<()> {
        container.write_bytes(item.entry.offset, &item.bytes)?;
        let tail: Range<usize> = item.entry.offset + item.bytes.len()..item.entry.offset + item.entry.payload.len();
        if !tail.is_empty() {
            if let Some(value) = options.fill_freed {
                container.fill(tail.start, tail.len(), value)?;
            }
            // Fixed-length records keep their full width.
            if !matches!(self.bank.end, PayloadEnd::FixedLength(_)) {
                free.release(tail);
            }
        }
        debug!(
            "{} #{}: {} bytes written in place at 0x{:06X}",
            self.bank.name,
            item.index,
            item.bytes.len(),
            item.entry.offset
        );
        Ok(())
    }

    fn relocate(
        &self,
        container: &mut Container,
        free: &mut FreeSpaceMap,
        item: &Pending,
        options: CommitOptions,
    ) -> RomResult<Relocation> {
        let old: Range<usize> = item.entry.offset..item.entry.offset + item.entry.payload.len();
        if !item.shared {
            free.release(old.clone());
        }
        let bounds: Option<Range<usize>> = self.bank.relocation_bounds();
        let required: usize = item.bytes.len();

        let mut target: Option<usize> = free.allocate(required, bounds.clone());
        if target.is_none() && options.allow_expansion {
            let start: usize = container.len();
            let banks: usize = required.div_ceil(BANK_SIZE);
            container.expand(start + banks * BANK_SIZE, options.fill_freed.unwrap_or(0xFF))?;
            free.release(start..container.len());
            target = free.allocate(required, bounds.clone());
        }
        let Some(to) = target else {
            let largest: usize = match &bounds {
                Some(range) => free.largest_gap_within(range),
                None => free.largest_gap(),
            };
            return Err(RomError::no_free_space(required, old.len(), largest));
        };

        container.write_bytes(to, &item.bytes)?;
        let mut address: CartAddress = container.mapper().from_logical(to)?;
        if item.entry.address.bank() & 0x80 != 0 {
            address = CartAddress::new(address.bank() | 0x80, address.offset());
        }
        self.bank.table.write_pointer(container, item.index, address)?;

        if !item.shared {
            if let Some(value) = options.fill_freed {
                // Part of the old slot may now hold the relocated payload itself.
                let stale: Vec<Range<usize>> = [old.start..old.end.min(to), old.start.max(to + required)..old.end]
                    .into_iter()
                    .filter(|r| !r.is_empty())
                    .collect();
                for range in stale {
                    container.fill(range.start, range.len(), value)?;
                }
            }
        }
        debug!(
            "{} #{}: relocated {} -> {} bytes from 0x{:06X} to 0x{:06X}",
            self.bank.name,
            item.index,
            old.len(),
            required,
            old.start,
            to
        );
        Ok(Relocation {
            index: item.index,
            from: old.start,
            to,
            old_len: old.len(),
            new_len: required,
        })
    }
}
