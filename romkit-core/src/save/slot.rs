//! Save slots: raw records with typed field access.
//!
//! A slot keeps its exact bytes; typed getters decode fields on demand and setters write
//! them back in place, so bytes the layout does not describe are never disturbed.

use crate::error::{ChecksumTarget, RomError, RomResult};
use crate::save::layout::{BitField, CharacterFields, SaveLayout};
use bitvec::prelude::*;
use serde::{Deserialize, Serialize};

/// Validation state of a slot as parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SlotStatus {
    Valid,
    /// Signature area is blank (all 0x00 or all 0xFF).
    Empty,
    BadSignature,
    BadChecksum { expected: u16, actual: u16 },
}

impl SlotStatus {
    pub fn is_valid(self) -> bool {
        self == SlotStatus::Valid
    }

    /// Whether the slot carries the layout signature (checksum aside).
    pub fn has_signature(self) -> bool {
        matches!(self, SlotStatus::Valid | SlotStatus::BadChecksum { .. })
    }
}

/// Party position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Location {
    pub map: u8,
    pub x: u8,
    pub y: u8,
}

/// One character record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Character {
    pub id: u8,
    pub level: u8,
    pub hp: u16,
    pub max_hp: u16,
    pub mp: u16,
    pub max_mp: u16,
    pub experience: u32,
    pub attack: u8,
    pub defense: u8,
    pub speed: u8,
    pub magic: u8,
    pub status: u8,
    /// Weapon, helmet, armor, shield, accessory.
    pub equipment: [u8; 5],
    /// Learned-spell bitfield.
    pub spells: u32,
    /// Name bytes in the game's text encoding.
    pub name: Vec<u8>,
}

/// Sum of every slot byte outside the checksum field, modulo 2^16.
pub fn compute_checksum(data: &[u8], checksum_offset: usize) -> u16 {
    data.iter()
        .enumerate()
        .filter(|(i, _)| *i != checksum_offset && *i != checksum_offset + 1)
        .fold(0u16, |acc, (_, &b)| acc.wrapping_add(b as u16))
}

/// One fixed-size save record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveSlot {
    pub(crate) index: usize,
    pub(crate) data: Vec<u8>,
    pub(crate) status: SlotStatus,
}

impl SaveSlot {
    /// Wrap raw bytes and classify them.
    pub fn from_bytes(index: usize, data: Vec<u8>, layout: &SaveLayout) -> Self {
        let status: SlotStatus = Self::classify(&data, layout);
        Self {
            index,
            data,
            status,
        }
    }

    fn classify(data: &[u8], layout: &SaveLayout) -> SlotStatus {
        let sig_range = layout.signature_offset..layout.signature_offset + layout.signature.len();
        let signature: &[u8] = &data[sig_range];
        if signature == layout.signature.as_slice() {
            let stored: u16 = u16::from_le_bytes([
                data[layout.checksum_offset],
                data[layout.checksum_offset + 1],
            ]);
            let computed: u16 = compute_checksum(data, layout.checksum_offset);
            if stored == computed {
                SlotStatus::Valid
            } else {
                SlotStatus::BadChecksum {
                    expected: stored,
                    actual: computed,
                }
            }
        } else if signature.iter().all(|&b| b == 0x00) || signature.iter().all(|&b| b == 0xFF) {
            SlotStatus::Empty
        } else {
            SlotStatus::BadSignature
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn status(&self) -> SlotStatus {
        self.status
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn stored_checksum(&self, layout: &SaveLayout) -> u16 {
        self.read_u16(layout.checksum_offset)
    }

    /// Integrity check as an error value.
    pub fn verify(&self, layout: &SaveLayout) -> RomResult<()> {
        match self.status {
            SlotStatus::Valid => Ok(()),
            SlotStatus::BadChecksum { expected, actual } => Err(RomError::ChecksumMismatch {
                target: ChecksumTarget::SaveSlot(self.index),
                expected: expected as u32,
                actual: actual as u32,
            }),
            SlotStatus::Empty | SlotStatus::BadSignature => {
                let sig_range = layout.signature_offset..layout.signature_offset + layout.signature.len();
                Err(RomError::SignatureMismatch {
                    slot: self.index,
                    expected: layout.signature.clone(),
                    found: self.data[sig_range].to_vec(),
                })
            }
        }
    }

    /// Recompute and store the checksum; the slot becomes valid if its signature is.
    pub fn refresh_checksum(&mut self, layout: &SaveLayout) {
        let checksum: u16 = compute_checksum(&self.data, layout.checksum_offset);
        self.write_u16(layout.checksum_offset, checksum);
        self.status = Self::classify(&self.data, layout);
    }

    /// Fail unless the slot carries the layout signature.
    pub(crate) fn require_signature(&self, layout: &SaveLayout) -> RomResult<()> {
        if self.status.has_signature() {
            Ok(())
        } else {
            self.verify(layout)
        }
    }

    /// Zero the record and stamp the signature and checksum.
    pub fn initialize(&mut self, layout: &SaveLayout) {
        self.data.fill(0);
        let start: usize = layout.signature_offset;
        self.data[start..start + layout.signature.len()].copy_from_slice(&layout.signature);
        let chars = &layout.characters;
        for i in 0..chars.count {
            self.data[chars.offset + i * chars.stride + chars.fields.id] = chars.empty_id;
        }
        let inv = &layout.inventory;
        for i in 0..inv.slots {
            self.data[inv.offset + i * 2] = inv.empty_id;
        }
        self.refresh_checksum(layout);
    }

    #[inline]
    fn read_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.data[offset], self.data[offset + 1]])
    }

    #[inline]
    fn read_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ])
    }

    #[inline]
    fn write_u16(&mut self, offset: usize, value: u16) {
        self.data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    #[inline]
    fn write_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn currency(&self, layout: &SaveLayout) -> u32 {
        self.read_u32(layout.currency_offset)
    }

    pub(crate) fn set_currency(&mut self, layout: &SaveLayout, amount: u32) {
        self.write_u32(layout.currency_offset, amount);
    }

    /// Play time in seconds.
    pub fn play_time(&self, layout: &SaveLayout) -> u32 {
        self.read_u32(layout.play_time_offset)
    }

    pub(crate) fn set_play_time(&mut self, layout: &SaveLayout, seconds: u32) {
        self.write_u32(layout.play_time_offset, seconds);
    }

    pub fn location(&self, layout: &SaveLayout) -> Location {
        let o: usize = layout.location_offset;
        Location {
            map: self.data[o],
            x: self.data[o + 1],
            y: self.data[o + 2],
        }
    }

    pub(crate) fn set_location(&mut self, layout: &SaveLayout, location: Location) {
        let o: usize = layout.location_offset;
        self.data[o..o + 3].copy_from_slice(&[location.map, location.x, location.y]);
    }

    pub fn party_leader(&self, layout: &SaveLayout) -> u8 {
        self.data[layout.party_leader_offset]
    }

    pub(crate) fn set_party_leader(&mut self, layout: &SaveLayout, id: u8) {
        self.data[layout.party_leader_offset] = id;
    }

    fn record_base(&self, layout: &SaveLayout, index: usize) -> RomResult<usize> {
        let chars = &layout.characters;
        if index >= chars.count {
            return Err(RomError::out_of_bounds(index, 1, chars.count));
        }
        Ok(chars.offset + index * chars.stride)
    }

    /// Character record `index`, or `None` when the record is unused.
    pub fn character(&self, layout: &SaveLayout, index: usize) -> RomResult<Option<Character>> {
        let base: usize = self.record_base(layout, index)?;
        let f: &CharacterFields = &layout.characters.fields;
        if self.data[base + f.id] == layout.characters.empty_id {
            return Ok(None);
        }
        let byte = |off: usize| self.data[base + off];
        let mut equipment: [u8; 5] = [0u8; 5];
        equipment.copy_from_slice(&self.data[base + f.equipment..base + f.equipment + 5]);
        let spells_bits = &self.data[base + f.spells.offset..base + f.spells.end()].view_bits::<Lsb0>()[..f.spells.bits];
        Ok(Some(Character {
            id: byte(f.id),
            level: byte(f.level),
            hp: self.read_u16(base + f.hp),
            max_hp: self.read_u16(base + f.max_hp),
            mp: self.read_u16(base + f.mp),
            max_mp: self.read_u16(base + f.max_mp),
            experience: self.read_u32(base + f.experience),
            attack: byte(f.attack),
            defense: byte(f.defense),
            speed: byte(f.speed),
            magic: byte(f.magic),
            status: byte(f.status),
            equipment,
            spells: spells_bits
                .iter_ones()
                .filter(|&bit| bit < 32)
                .fold(0u32, |acc, bit| acc | (1 << bit)),
            name: self.data[base + f.name..base + f.name + f.name_len].to_vec(),
        }))
    }

    pub(crate) fn set_character(&mut self, layout: &SaveLayout, index: usize, character: &Character) -> RomResult<()> {
        let base: usize = self.record_base(layout, index)?;
        let f: CharacterFields = layout.characters.fields;
        if f.spells.bits < 32 && character.spells >> f.spells.bits != 0 {
            return Err(RomError::CapacityExceeded {
                what: "spell bitfield".to_string(),
                required: (32 - character.spells.leading_zeros()) as u64,
                available: f.spells.bits as u64,
            });
        }
        if character.name.len() > f.name_len {
            return Err(RomError::CapacityExceeded {
                what: "character name bytes".to_string(),
                required: character.name.len() as u64,
                available: f.name_len as u64,
            });
        }
        self.data[base + f.id] = character.id;
        self.data[base + f.level] = character.level;
        self.write_u16(base + f.hp, character.hp);
        self.write_u16(base + f.max_hp, character.max_hp);
        self.write_u16(base + f.mp, character.mp);
        self.write_u16(base + f.max_mp, character.max_mp);
        self.write_u32(base + f.experience, character.experience);
        self.data[base + f.attack] = character.attack;
        self.data[base + f.defense] = character.defense;
        self.data[base + f.speed] = character.speed;
        self.data[base + f.magic] = character.magic;
        self.data[base + f.status] = character.status;
        self.data[base + f.equipment..base + f.equipment + 5].copy_from_slice(&character.equipment);
        let spells = &mut self.data[base + f.spells.offset..base + f.spells.end()].view_bits_mut::<Lsb0>()[..f.spells.bits];
        for bit in 0..f.spells.bits.min(32) {
            spells.set(bit, character.spells & (1 << bit) != 0);
        }
        let name = &mut self.data[base + f.name..base + f.name + f.name_len];
        name.fill(0);
        name[..character.name.len()].copy_from_slice(&character.name);
        Ok(())
    }

    /// Occupied consumable entries as `(id, quantity)`.
    pub fn inventory(&self, layout: &SaveLayout) -> Vec<(u8, u8)> {
        let inv = &layout.inventory;
        self.data[inv.offset..inv.offset + inv.slots * 2]
            .chunks_exact(2)
            .filter(|pair| pair[0] != inv.empty_id)
            .map(|pair| (pair[0], pair[1]))
            .collect()
    }

    pub fn item_quantity(&self, layout: &SaveLayout, id: u8) -> u8 {
        self.inventory(layout)
            .into_iter()
            .find(|(item, _)| *item == id)
            .map_or(0, |(_, qty)| qty)
    }

    pub(crate) fn give_item(&mut self, layout: &SaveLayout, id: u8, quantity: u8) -> RomResult<u8> {
        let inv = layout.inventory;
        if id == inv.empty_id {
            return Err(RomError::CapacityExceeded {
                what: format!("item id {:02X} is the empty marker", id),
                required: id as u64,
                available: inv.empty_id.saturating_sub(1) as u64,
            });
        }
        let region = &mut self.data[inv.offset..inv.offset + inv.slots * 2];
        let existing: Option<usize> = region.chunks_exact(2).position(|p| p[0] == id);
        let slot: usize = match existing {
            Some(slot) => slot,
            None => region
                .chunks_exact(2)
                .position(|p| p[0] == inv.empty_id)
                .ok_or_else(|| RomError::CapacityExceeded {
                    what: "inventory slots".to_string(),
                    required: inv.slots as u64 + 1,
                    available: inv.slots as u64,
                })?,
        };
        let current: u8 = if existing.is_some() { region[slot * 2 + 1] } else { 0 };
        let total: u16 = current as u16 + quantity as u16;
        if total > inv.max_quantity as u16 {
            return Err(RomError::CapacityExceeded {
                what: format!("quantity of item {:02X}", id),
                required: total as u64,
                available: inv.max_quantity as u64,
            });
        }
        region[slot * 2] = id;
        region[slot * 2 + 1] = total as u8;
        Ok(total as u8)
    }

    pub(crate) fn remove_item(&mut self, layout: &SaveLayout, id: u8, quantity: u8) -> u8 {
        let inv = layout.inventory;
        let region = &mut self.data[inv.offset..inv.offset + inv.slots * 2];
        let Some(slot) = region.chunks_exact(2).position(|p| p[0] == id) else {
            return 0;
        };
        let remaining: u8 = region[slot * 2 + 1].saturating_sub(quantity);
        if remaining == 0 {
            region[slot * 2] = inv.empty_id;
        }
        region[slot * 2 + 1] = remaining;
        remaining
    }

    pub fn bit(&self, field: BitField, index: usize) -> RomResult<bool> {
        if index >= field.bits {
            return Err(RomError::out_of_bounds(index, 1, field.bits));
        }
        Ok(self.data[field.offset..field.end()].view_bits::<Lsb0>()[index])
    }

    pub(crate) fn set_bit(&mut self, field: BitField, index: usize, value: bool) -> RomResult<()> {
        if index >= field.bits {
            return Err(RomError::out_of_bounds(index, 1, field.bits));
        }
        self.data[field.offset..field.end()]
            .view_bits_mut::<Lsb0>()
            .set(index, value);
        Ok(())
    }

    /// Indices of every set bit in a field.
    pub fn set_bits(&self, field: BitField) -> Vec<usize> {
        self.data[field.offset..field.end()].view_bits::<Lsb0>()[..field.bits]
            .iter_ones()
            .collect()
    }

    pub(crate) fn copy_from(&mut self, other: &SaveSlot) {
        self.data.copy_from_slice(&other.data);
        self.status = other.status;
    }
}
