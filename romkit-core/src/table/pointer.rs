//! Pointer tables: arrays of 16- or 24-bit cartridge addresses naming variable-length
//! payloads elsewhere in the image.

use crate::error::{RomError, RomResult};
use crate::rom::container::Container;
use crate::rom::mapper::{CartAddress, BANK_SIZE};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Width of each pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PointerSize {
    /// Bank-relative offset; the table supplies the bank.
    Two,
    /// Full `bank:offset` address.
    Three,
}

impl PointerSize {
    pub fn bytes(self) -> usize {
        match self {
            PointerSize::Two => 2,
            PointerSize::Three => 3,
        }
    }
}

impl TryFrom<u8> for PointerSize {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(PointerSize::Two),
            3 => Ok(PointerSize::Three),
            other => Err(format!("pointer size must be 2 or 3, got {}", other)),
        }
    }
}

impl From<PointerSize> for u8 {
    fn from(size: PointerSize) -> u8 {
        size.bytes() as u8
    }
}

/// Where a payload stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadEnd {
    /// Exactly `n` bytes.
    FixedLength(usize),
    /// Up to and including the first occurrence of this byte.
    Terminator(u8),
    /// Up to the nearest higher pointer target; the highest one runs to its bank boundary.
    NextPointer,
}

/// One resolved table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerEntry {
    pub index: usize,
    pub address: CartAddress,
    /// Logical offset of the payload.
    pub offset: usize,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerTable {
    /// Logical offset of the first pointer.
    pub table_offset: usize,
    pub count: usize,
    pub pointer_size: PointerSize,
    /// Bank completing 2-byte pointers.
    pub bank: u8,
}

impl PointerTable {
    pub fn new(table_offset: usize, count: usize, pointer_size: PointerSize, bank: u8) -> Self {
        Self {
            table_offset,
            count,
            pointer_size,
            bank,
        }
    }

    /// Logical offset of pointer `index`.
    pub fn slot_offset(&self, index: usize) -> usize {
        self.table_offset + index * self.pointer_size.bytes()
    }

    /// Bytes occupied by the table itself.
    pub fn byte_len(&self) -> usize {
        self.count * self.pointer_size.bytes()
    }

    fn check_index(&self, index: usize) -> RomResult<()> {
        if index >= self.count {
            return Err(RomError::out_of_bounds(index, 1, self.count));
        }
        Ok(())
    }

    /// Read pointer `index`.
    pub fn pointer(&self, container: &Container, index: usize) -> RomResult<CartAddress> {
        self.check_index(index)?;
        let at: usize = self.slot_offset(index);
        Ok(match self.pointer_size {
            PointerSize::Two => CartAddress::new(self.bank, container.read_u16_le(at)?),
            PointerSize::Three => CartAddress::from_u24(container.read_u24_le(at)?),
        })
    }

    /// Read every pointer in table order.
    pub fn pointers(&self, container: &Container) -> RomResult<Vec<CartAddress>> {
        (0..self.count).map(|i| self.pointer(container, i)).collect()
    }

    /// Walk the table, reading each payload.
    ///
    /// Entries that fail to resolve yield an error and the walk continues with the next
    /// index.
    pub fn iter<'c>(&self, container: &'c Container, end: PayloadEnd) -> PointerIter<'c> {
        PointerIter {
            container,
            table: *self,
            end,
            next: 0,
            boundaries: None,
        }
    }

    /// Point entry `index` at `address`.
    ///
    /// # Errors
    /// `AddressOutOfRange` when a 2-byte table cannot reach `address`'s bank.
    pub fn write_pointer(&self, container: &mut Container, index: usize, address: CartAddress) -> RomResult<()> {
        self.check_index(index)?;
        container.mapper().to_logical(address)?;
        let at: usize = self.slot_offset(index);
        match self.pointer_size {
            PointerSize::Two => {
                let own_bank: u8 = CartAddress::new(self.bank, 0x8000).canonical().bank();
                if address.canonical().bank() != own_bank {
                    return Err(RomError::AddressOutOfRange {
                        address: address.raw(),
                        reason: "2-byte pointer table cannot reach another bank",
                    });
                }
                container.write_u16_le(at, address.offset())
            }
            PointerSize::Three => container.write_u24_le(at, address.raw()),
        }
    }
}

/// Iterator returned by [`PointerTable::iter`].
pub struct PointerIter<'c> {
    container: &'c Container,
    table: PointerTable,
    end: PayloadEnd,
    next: usize,
    /// Sorted distinct payload offsets, built on first use by `NextPointer`.
    boundaries: Option<Vec<usize>>,
}

impl PointerIter<'_> {
    fn resolve(&mut self, index: usize) -> RomResult<PointerEntry> {
        let address: CartAddress = self.table.pointer(self.container, index)?;
        let offset: usize = self.container.mapper().to_logical(address)?;
        let payload: Vec<u8> = self.payload(offset)?;
        debug!("Pointer {} -> {} ({} bytes)", index, address, payload.len());
        Ok(PointerEntry {
            index,
            address,
            offset,
            payload,
        })
    }

    fn boundaries(&mut self) -> &[usize] {
        let (container, table) = (self.container, self.table);
        self.boundaries.get_or_insert_with(|| {
            let mut offsets: Vec<usize> = (0..table.count)
                .filter_map(|i| table.pointer(container, i).ok())
                .filter_map(|address| container.mapper().to_logical(address).ok())
                .collect();
            offsets.sort_unstable();
            offsets.dedup();
            offsets
        })
    }

    fn payload(&mut self, offset: usize) -> RomResult<Vec<u8>> {
        let image_len: usize = self.container.len();
        match self.end {
            PayloadEnd::FixedLength(n) => self.container.read_bytes(offset, n),
            PayloadEnd::Terminator(byte) => {
                let rest: &[u8] = self.container.slice(offset, image_len - offset)?;
                match rest.iter().position(|&b| b == byte) {
                    Some(at) => Ok(rest[..=at].to_vec()),
                    None => {
                        warn!("Payload at 0x{:06X} has no terminator {:02X}", offset, byte);
                        Err(RomError::UnterminatedPayload {
                            offset,
                            terminator: byte,
                            limit: image_len,
                        })
                    }
                }
            }
            PayloadEnd::NextPointer => {
                let bank_end: usize = ((offset / BANK_SIZE + 1) * BANK_SIZE).min(image_len);
                let boundaries: &[usize] = self.boundaries();
                let after: usize = boundaries.partition_point(|&b| b <= offset);
                let end: usize = boundaries.get(after).copied().unwrap_or(bank_end).min(bank_end);
                self.container.read_bytes(offset, end - offset)
            }
        }
    }
}

impl Iterator for PointerIter<'_> {
    type Item = RomResult<PointerEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.table.count {
            return None;
        }
        let index: usize = self.next;
        self.next += 1;
        Some(self.resolve(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining: usize = self.table.count - self.next;
        (remaining, Some(remaining))
    }
}
