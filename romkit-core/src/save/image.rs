//! Save-RAM images.
//!
//! An image is `slot_count` records, an optional backup record, and whatever trailing
//! bytes the file carries past them. Parsing never rejects a slot: slots with a bad
//! signature or checksum are kept byte-for-byte and reported through [`SlotStatus`].
//!
//! # Checksums
//! Each slot ends in a 16-bit little-endian sum of its other bytes. Mutators refresh it
//! immediately, and [`SaveImage::serialize`] recomputes it for every slot that carries the
//! signature, so every emitted signed slot verifies.

use crate::error::{RomError, RomResult};
use crate::save::layout::{EquipmentKind, FlagKind, SaveLayout};
use crate::save::slot::{Character, Location, SaveSlot, SlotStatus};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Smallest save-RAM size unit.
pub const SAVE_SIZE_UNIT: usize = 2048;

/// Parsed save-RAM image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveImage {
    layout: SaveLayout,
    slots: Vec<SaveSlot>,
    backup: Option<SaveSlot>,
    trailer: Vec<u8>,
}

/// Typed snapshot of one slot, for display and JSON export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSummary {
    pub slot: usize,
    pub status: String,
    pub currency: u32,
    pub play_time: u32,
    pub location: Location,
    pub party_leader: u8,
    pub characters: Vec<Option<Character>>,
    pub inventory: Vec<(u8, u8)>,
    pub key_items: Vec<usize>,
    pub weapons: Vec<usize>,
    pub armor: Vec<usize>,
    pub accessories: Vec<usize>,
    pub story_flags: Vec<usize>,
    pub chest_flags: Vec<usize>,
    pub npc_flags: Vec<usize>,
}

/// Format a play time as `H:MM:SS`.
pub fn format_play_time(seconds: u32) -> String {
    format!("{}:{:02}:{:02}", seconds / 3600, (seconds / 60) % 60, seconds % 60)
}

impl SaveImage {
    /// Parse a save-RAM image.
    ///
    /// # Errors
    /// `Config` if the layout is inconsistent; `InvalidSaveSize` if the image is not a
    /// power-of-two multiple of 2 KiB or cannot hold every slot.
    pub fn parse(bytes: &[u8], layout: &SaveLayout) -> RomResult<Self> {
        layout.validate().map_err(RomError::config)?;
        let required: usize = layout.required_len();
        let size: usize = bytes.len();
        let units_ok: bool = size >= SAVE_SIZE_UNIT
            && size % SAVE_SIZE_UNIT == 0
            && (size / SAVE_SIZE_UNIT).is_power_of_two();
        if !units_ok || size < required {
            return Err(RomError::InvalidSaveSize { size, required });
        }

        let mut records = bytes[..required]
            .chunks_exact(layout.slot_size)
            .enumerate()
            .map(|(i, chunk)| SaveSlot::from_bytes(i, chunk.to_vec(), layout));
        let slots: Vec<SaveSlot> = records.by_ref().take(layout.slot_count).collect();
        let backup: Option<SaveSlot> = records.next();

        for slot in &slots {
            match slot.status() {
                SlotStatus::BadChecksum { expected, actual } => warn!(
                    "Slot {} checksum mismatch (stored 0x{:04X}, computed 0x{:04X}); preserved as invalid",
                    slot.index(),
                    expected,
                    actual
                ),
                SlotStatus::BadSignature => {
                    warn!("Slot {} has an unknown signature; preserved as invalid", slot.index())
                }
                _ => {}
            }
        }
        debug!(
            "Parsed {}-byte save image: {} of {} slots valid",
            size,
            slots.iter().filter(|s| s.status().is_valid()).count(),
            slots.len()
        );

        Ok(Self {
            layout: layout.clone(),
            slots,
            backup,
            trailer: bytes[required..].to_vec(),
        })
    }

    /// Emit the image, recomputing the checksum of every signed slot.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::with_capacity(self.layout.required_len() + self.trailer.len());
        for slot in self.slots.iter().chain(self.backup.iter()) {
            let mut record: SaveSlot = slot.clone();
            if record.status().has_signature() {
                record.refresh_checksum(&self.layout);
            }
            out.extend_from_slice(record.bytes());
        }
        out.extend_from_slice(&self.trailer);
        out
    }

    pub fn layout(&self) -> &SaveLayout {
        &self.layout
    }

    pub fn slots(&self) -> &[SaveSlot] {
        &self.slots
    }

    pub fn backup(&self) -> Option<&SaveSlot> {
        self.backup.as_ref()
    }

    pub fn slot(&self, index: usize) -> RomResult<&SaveSlot> {
        self.slots
            .get(index)
            .ok_or_else(|| RomError::out_of_bounds(index, 1, self.slots.len()))
    }

    /// Apply `edit` to a signed slot, then refresh its checksum. A failed edit leaves the
    /// slot as it was.
    fn edit<T>(
        &mut self,
        index: usize,
        edit: impl FnOnce(&mut SaveSlot, &SaveLayout) -> RomResult<T>,
    ) -> RomResult<T> {
        let layout: &SaveLayout = &self.layout;
        let count: usize = self.slots.len();
        let slot: &mut SaveSlot = self
            .slots
            .get_mut(index)
            .ok_or_else(|| RomError::out_of_bounds(index, 1, count))?;
        slot.require_signature(layout)?;
        let before: SaveSlot = slot.clone();
        match edit(slot, layout) {
            Ok(value) => {
                slot.refresh_checksum(layout);
                Ok(value)
            }
            Err(err) => {
                *slot = before;
                Err(err)
            }
        }
    }

    /// Set the currency amount.
    ///
    /// # Errors
    /// `CapacityExceeded` above the layout's maximum.
    pub fn set_currency(&mut self, slot: usize, amount: u32) -> RomResult<()> {
        self.edit(slot, |s, l| write_currency(s, l, amount))
    }

    pub fn set_play_time(&mut self, slot: usize, seconds: u32) -> RomResult<()> {
        self.edit(slot, |s, l| {
            s.set_play_time(l, seconds);
            Ok(())
        })
    }

    pub fn set_location(&mut self, slot: usize, location: Location) -> RomResult<()> {
        self.edit(slot, |s, l| {
            s.set_location(l, location);
            Ok(())
        })
    }

    pub fn set_party_leader(&mut self, slot: usize, id: u8) -> RomResult<()> {
        self.edit(slot, |s, l| {
            s.set_party_leader(l, id);
            Ok(())
        })
    }

    /// Add `quantity` of an item, stacking onto an existing entry. Returns the new count.
    pub fn give_item(&mut self, slot: usize, id: u8, quantity: u8) -> RomResult<u8> {
        self.edit(slot, |s, l| s.give_item(l, id, quantity))
    }

    /// Remove up to `quantity` of an item. Returns what remains.
    pub fn remove_item(&mut self, slot: usize, id: u8, quantity: u8) -> RomResult<u8> {
        self.edit(slot, |s, l| Ok(s.remove_item(l, id, quantity)))
    }

    pub fn set_character(&mut self, slot: usize, index: usize, character: &Character) -> RomResult<()> {
        self.edit(slot, |s, l| s.set_character(l, index, character))
    }

    fn edit_character(
        &mut self,
        slot: usize,
        index: usize,
        change: impl FnOnce(&mut Character, &SaveLayout) -> RomResult<()>,
    ) -> RomResult<()> {
        self.edit(slot, |s, l| {
            let mut character: Character = s.character(l, index)?.ok_or_else(|| RomError::CapacityExceeded {
                what: format!("character record {} is unused", index),
                required: index as u64 + 1,
                available: index as u64,
            })?;
            change(&mut character, l)?;
            s.set_character(l, index, &character)
        })
    }

    /// Mark a spell as learned by one character.
    pub fn learn_spell(&mut self, slot: usize, character: usize, spell: usize) -> RomResult<()> {
        self.set_spell(slot, character, spell, true)
    }

    pub fn forget_spell(&mut self, slot: usize, character: usize, spell: usize) -> RomResult<()> {
        self.set_spell(slot, character, spell, false)
    }

    fn set_spell(&mut self, slot: usize, character: usize, spell: usize, learned: bool) -> RomResult<()> {
        self.edit_character(slot, character, |c, l| {
            let bits: usize = l.characters.fields.spells.bits.min(32);
            if spell >= bits {
                return Err(RomError::out_of_bounds(spell, 1, bits));
            }
            if learned {
                c.spells |= 1 << spell;
            } else {
                c.spells &= !(1 << spell);
            }
            Ok(())
        })
    }

    /// Set a character's level (1 up to the layout maximum).
    pub fn set_level(&mut self, slot: usize, character: usize, level: u8) -> RomResult<()> {
        self.edit_character(slot, character, |c, l| {
            let max: u8 = l.characters.max_level;
            if level == 0 || level > max {
                return Err(RomError::CapacityExceeded {
                    what: "character level".to_string(),
                    required: level as u64,
                    available: max as u64,
                });
            }
            c.level = level;
            Ok(())
        })
    }

    /// Restore HP and MP of every present character to their maxima.
    pub fn heal_party(&mut self, slot: usize) -> RomResult<usize> {
        self.edit(slot, |s, l| {
            let mut healed: usize = 0;
            for i in 0..l.characters.count {
                if let Some(mut c) = s.character(l, i)? {
                    c.hp = c.max_hp;
                    c.mp = c.max_mp;
                    s.set_character(l, i, &c)?;
                    healed += 1;
                }
            }
            Ok(healed)
        })
    }

    /// Set or clear a story, chest or NPC flag.
    pub fn set_flag(&mut self, slot: usize, kind: FlagKind, index: usize, value: bool) -> RomResult<()> {
        let field = self.layout.flags(kind);
        self.edit(slot, |s, _| s.set_bit(field, index, value))
    }

    pub fn flag(&self, slot: usize, kind: FlagKind, index: usize) -> RomResult<bool> {
        self.slot(slot)?.bit(self.layout.flags(kind), index)
    }

    /// Grant or revoke a key item, weapon, armor piece or accessory.
    pub fn grant_equipment(&mut self, slot: usize, kind: EquipmentKind, index: usize, owned: bool) -> RomResult<()> {
        let field = self.layout.equipment(kind);
        self.edit(slot, |s, _| s.set_bit(field, index, owned))
    }

    pub fn owns_equipment(&self, slot: usize, kind: EquipmentKind, index: usize) -> RomResult<bool> {
        self.slot(slot)?.bit(self.layout.equipment(kind), index)
    }

    pub fn has_key_item(&self, slot: usize, index: usize) -> RomResult<bool> {
        self.owns_equipment(slot, EquipmentKind::KeyItem, index)
    }

    /// Reset a slot to a blank signed record.
    pub fn initialize_slot(&mut self, index: usize) -> RomResult<()> {
        let count: usize = self.slots.len();
        let slot: &mut SaveSlot = self
            .slots
            .get_mut(index)
            .ok_or_else(|| RomError::out_of_bounds(index, 1, count))?;
        slot.initialize(&self.layout);
        Ok(())
    }

    /// Copy slot `from` over slot `to`.
    pub fn copy_slot(&mut self, from: usize, to: usize) -> RomResult<()> {
        let source: SaveSlot = self.slot(from)?.clone();
        let count: usize = self.slots.len();
        let target: &mut SaveSlot = self
            .slots
            .get_mut(to)
            .ok_or_else(|| RomError::out_of_bounds(to, 1, count))?;
        target.copy_from(&source);
        Ok(())
    }

    /// Copy a slot into the backup record.
    pub fn backup_slot(&mut self, index: usize) -> RomResult<()> {
        let source: SaveSlot = self.slot(index)?.clone();
        let backup: &mut SaveSlot = self.backup.as_mut().ok_or_else(|| {
            RomError::config("this layout has no backup slot")
        })?;
        backup.copy_from(&source);
        Ok(())
    }

    /// Overwrite a slot with the backup record.
    pub fn restore_backup(&mut self, index: usize) -> RomResult<()> {
        let backup: SaveSlot = self
            .backup
            .clone()
            .ok_or_else(|| RomError::config("this layout has no backup slot"))?;
        backup.verify(&self.layout)?;
        let count: usize = self.slots.len();
        let target: &mut SaveSlot = self
            .slots
            .get_mut(index)
            .ok_or_else(|| RomError::out_of_bounds(index, 1, count))?;
        target.copy_from(&backup);
        Ok(())
    }

    /// Typed snapshot of a slot.
    pub fn summary(&self, index: usize) -> RomResult<SlotSummary> {
        let slot: &SaveSlot = self.slot(index)?;
        let l: &SaveLayout = &self.layout;
        let characters: Vec<Option<Character>> = (0..l.characters.count)
            .map(|i| slot.character(l, i))
            .collect::<RomResult<_>>()?;
        Ok(SlotSummary {
            slot: index,
            status: format!("{:?}", slot.status()),
            currency: slot.currency(l),
            play_time: slot.play_time(l),
            location: slot.location(l),
            party_leader: slot.party_leader(l),
            characters,
            inventory: slot.inventory(l),
            key_items: slot.set_bits(l.key_items),
            weapons: slot.set_bits(l.weapons),
            armor: slot.set_bits(l.armor),
            accessories: slot.set_bits(l.accessories),
            story_flags: slot.set_bits(l.story_flags),
            chest_flags: slot.set_bits(l.chest_flags),
            npc_flags: slot.set_bits(l.npc_flags),
        })
    }

    /// Write a summary's fields back into a signed slot. Nothing is written unless every
    /// field is accepted.
    pub fn apply_summary(&mut self, index: usize, summary: &SlotSummary) -> RomResult<()> {
        self.edit(index, |s, l| {
            write_currency(s, l, summary.currency)?;
            s.set_play_time(l, summary.play_time);
            s.set_location(l, summary.location);
            s.set_party_leader(l, summary.party_leader);
            for (i, character) in summary.characters.iter().enumerate().take(l.characters.count) {
                if let Some(character) = character {
                    s.set_character(l, i, character)?;
                }
            }
            let inv = l.inventory;
            if summary.inventory.len() > inv.slots {
                return Err(RomError::CapacityExceeded {
                    what: "inventory slots".to_string(),
                    required: summary.inventory.len() as u64,
                    available: inv.slots as u64,
                });
            }
            for slot_index in 0..inv.slots {
                let (id, qty) = summary
                    .inventory
                    .get(slot_index)
                    .copied()
                    .unwrap_or((inv.empty_id, 0));
                s.data[inv.offset + slot_index * 2] = id;
                s.data[inv.offset + slot_index * 2 + 1] = qty;
            }
            for (field, set) in [
                (l.key_items, &summary.key_items),
                (l.weapons, &summary.weapons),
                (l.armor, &summary.armor),
                (l.accessories, &summary.accessories),
                (l.story_flags, &summary.story_flags),
                (l.chest_flags, &summary.chest_flags),
                (l.npc_flags, &summary.npc_flags),
            ] {
                if let Some(&bit) = set.iter().find(|&&bit| bit >= field.bits) {
                    return Err(RomError::out_of_bounds(bit, 1, field.bits));
                }
                for bit in 0..field.bits {
                    s.set_bit(field, bit, set.contains(&bit))?;
                }
            }
            Ok(())
        })
    }
}

fn write_currency(slot: &mut SaveSlot, layout: &SaveLayout, amount: u32) -> RomResult<()> {
    if amount > layout.currency_max {
        return Err(RomError::CapacityExceeded {
            what: "currency".to_string(),
            required: amount as u64,
            available: layout.currency_max as u64,
        });
    }
    slot.set_currency(layout, amount);
    Ok(())
}
