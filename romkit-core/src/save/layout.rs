//! Save-RAM layout description.
//!
//! Every offset is data so that one codec serves any game whose slots are fixed-size
//! records. The defaults describe a 1 KiB-slot layout with three slots and a backup.

use serde::{Deserialize, Serialize};

/// A run of flag bits, least-significant bit first within each byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitField {
    pub offset: usize,
    pub bits: usize,
}

impl BitField {
    pub const fn new(offset: usize, bits: usize) -> Self {
        Self { offset, bits }
    }

    /// Bytes spanned by the field.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.bits.div_ceil(8)
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.offset + self.byte_len()
    }
}

/// Offsets inside one character record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterFields {
    pub id: usize,
    pub level: usize,
    pub hp: usize,
    pub max_hp: usize,
    pub mp: usize,
    pub max_mp: usize,
    pub experience: usize,
    pub attack: usize,
    pub defense: usize,
    pub speed: usize,
    pub magic: usize,
    pub status: usize,
    /// Five consecutive item ids: weapon, helmet, armor, shield, accessory.
    pub equipment: usize,
    pub spells: BitField,
    pub name: usize,
    pub name_len: usize,
}

impl Default for CharacterFields {
    fn default() -> Self {
        Self {
            id: 0x00,
            level: 0x01,
            hp: 0x02,
            max_hp: 0x04,
            mp: 0x06,
            max_mp: 0x08,
            experience: 0x0A,
            attack: 0x0E,
            defense: 0x0F,
            speed: 0x10,
            magic: 0x11,
            status: 0x12,
            equipment: 0x14,
            spells: BitField::new(0x1A, 16),
            name: 0x20,
            name_len: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterLayout {
    pub offset: usize,
    pub stride: usize,
    pub count: usize,
    /// Id byte marking an unused record.
    pub empty_id: u8,
    pub max_level: u8,
    pub fields: CharacterFields,
}

impl Default for CharacterLayout {
    fn default() -> Self {
        Self {
            offset: 0x20,
            stride: 0x40,
            count: 5,
            empty_id: 0xFF,
            max_level: 41,
            fields: CharacterFields::default(),
        }
    }
}

/// Consumable inventory: `(id, quantity)` byte pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryLayout {
    pub offset: usize,
    pub slots: usize,
    pub empty_id: u8,
    pub max_quantity: u8,
}

impl Default for InventoryLayout {
    fn default() -> Self {
        Self {
            offset: 0x200,
            slots: 16,
            empty_id: 0xFF,
            max_quantity: 99,
        }
    }
}

/// Which flag array a flag index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagKind {
    Story,
    Chest,
    Npc,
}

/// Which owned-equipment bitfield an index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentKind {
    KeyItem,
    Weapon,
    Armor,
    Accessory,
}

/// Complete description of a save-RAM image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveLayout {
    pub slot_size: usize,
    pub slot_count: usize,
    /// A backup slot follows the regular slots.
    pub has_backup: bool,
    pub signature_offset: usize,
    pub signature: Vec<u8>,
    pub currency_offset: usize,
    pub currency_max: u32,
    pub play_time_offset: usize,
    /// Map id, then x and y bytes.
    pub location_offset: usize,
    pub party_leader_offset: usize,
    pub characters: CharacterLayout,
    pub inventory: InventoryLayout,
    pub key_items: BitField,
    pub weapons: BitField,
    pub armor: BitField,
    pub accessories: BitField,
    pub story_flags: BitField,
    pub chest_flags: BitField,
    pub npc_flags: BitField,
    /// Offset of the 16-bit little-endian checksum; normally the last two bytes.
    pub checksum_offset: usize,
}

impl Default for SaveLayout {
    fn default() -> Self {
        Self {
            slot_size: 0x400,
            slot_count: 3,
            has_backup: true,
            signature_offset: 0x00,
            signature: b"FF0!".to_vec(),
            currency_offset: 0x04,
            currency_max: 9_999_999,
            play_time_offset: 0x08,
            location_offset: 0x0C,
            party_leader_offset: 0x10,
            characters: CharacterLayout::default(),
            inventory: InventoryLayout::default(),
            key_items: BitField::new(0x280, 32),
            weapons: BitField::new(0x284, 16),
            armor: BitField::new(0x286, 8),
            accessories: BitField::new(0x287, 8),
            story_flags: BitField::new(0x300, 128),
            chest_flags: BitField::new(0x310, 256),
            npc_flags: BitField::new(0x330, 128),
            checksum_offset: 0x3FE,
        }
    }
}

impl SaveLayout {
    /// Records in the image, backup included.
    pub fn record_count(&self) -> usize {
        self.slot_count + self.has_backup as usize
    }

    /// Bytes the slot area occupies.
    pub fn required_len(&self) -> usize {
        self.record_count() * self.slot_size
    }

    pub fn flags(&self, kind: FlagKind) -> BitField {
        match kind {
            FlagKind::Story => self.story_flags,
            FlagKind::Chest => self.chest_flags,
            FlagKind::Npc => self.npc_flags,
        }
    }

    pub fn equipment(&self, kind: EquipmentKind) -> BitField {
        match kind {
            EquipmentKind::KeyItem => self.key_items,
            EquipmentKind::Weapon => self.weapons,
            EquipmentKind::Armor => self.armor,
            EquipmentKind::Accessory => self.accessories,
        }
    }

    /// Check that every field fits inside a slot and clear of the checksum.
    pub fn validate(&self) -> Result<(), String> {
        let size: usize = self.slot_size;
        let fits = |name: &str, start: usize, len: usize| -> Result<(), String> {
            match start.checked_add(len) {
                Some(end) if end <= size => {}
                _ => return Err(format!("{} (0x{:X}+{}) overruns the {}-byte slot", name, start, len, size)),
            }
            if start < self.checksum_offset + 2 && self.checksum_offset < start + len {
                return Err(format!("{} overlaps the checksum at 0x{:X}", name, self.checksum_offset));
            }
            Ok(())
        };
        if self.checksum_offset.checked_add(2).map_or(true, |end| end > size) {
            return Err("checksum lies outside the slot".to_string());
        }
        if self.signature.is_empty() {
            return Err("signature is empty".to_string());
        }
        fits("signature", self.signature_offset, self.signature.len())?;
        fits("currency", self.currency_offset, 4)?;
        fits("play time", self.play_time_offset, 4)?;
        fits("location", self.location_offset, 3)?;
        fits("party leader", self.party_leader_offset, 1)?;
        let records: usize = self
            .characters
            .stride
            .checked_mul(self.characters.count)
            .ok_or_else(|| "character records overflow".to_string())?;
        fits("characters", self.characters.offset, records)?;
        let inventory: usize = self
            .inventory
            .slots
            .checked_mul(2)
            .ok_or_else(|| "inventory overflows".to_string())?;
        fits("inventory", self.inventory.offset, inventory)?;
        for (name, field) in [
            ("key items", self.key_items),
            ("weapons", self.weapons),
            ("armor", self.armor),
            ("accessories", self.accessories),
            ("story flags", self.story_flags),
            ("chest flags", self.chest_flags),
            ("npc flags", self.npc_flags),
        ] {
            fits(name, field.offset, field.byte_len())?;
        }
        let f: &CharacterFields = &self.characters.fields;
        let record_fields: [(&str, usize, usize); 15] = [
            ("id", f.id, 1),
            ("level", f.level, 1),
            ("hp", f.hp, 2),
            ("max hp", f.max_hp, 2),
            ("mp", f.mp, 2),
            ("max mp", f.max_mp, 2),
            ("experience", f.experience, 4),
            ("attack", f.attack, 1),
            ("defense", f.defense, 1),
            ("speed", f.speed, 1),
            ("magic", f.magic, 1),
            ("status", f.status, 1),
            ("equipment", f.equipment, 5),
            ("spells", f.spells.offset, f.spells.byte_len()),
            ("name", f.name, f.name_len),
        ];
        for (name, offset, len) in record_fields {
            if offset.checked_add(len).map_or(true, |end| end > self.characters.stride) {
                return Err(format!("character {} overruns the {}-byte record", name, self.characters.stride));
            }
        }
        Ok(())
    }
}
