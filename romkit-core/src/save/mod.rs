//! Save-RAM codec: configurable slot layout, raw-backed slots, and the image container.

pub mod image;
pub mod layout;
pub mod slot;

pub use image::{format_play_time, SaveImage, SlotSummary, SAVE_SIZE_UNIT};
pub use layout::{BitField, CharacterFields, CharacterLayout, EquipmentKind, FlagKind, InventoryLayout, SaveLayout};
pub use slot::{compute_checksum, Character, Location, SaveSlot, SlotStatus};
