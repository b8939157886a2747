//! Game profiles: every cartridge-specific offset, as a JSON document.
//!
//! ```json
//! {
//!   "name": "Example Quest",
//!   "table": "example.tbl",
//!   "text_banks": [
//!     { "name": "dialog", "pointer_table": "$03:8000", "count": 256,
//!       "pointer_size": 2, "end": { "terminator": 0 } }
//!   ],
//!   "free_space": [ { "start": "$03:F000", "end": "$04:8000" } ]
//! }
//! ```
//!
//! Offsets accept either a linear integer (logical, header excluded) or a cartridge
//! address string.

use crate::error::{RomError, RomResult};
use crate::gfx::tile::BitDepth;
use crate::pipeline::dialog::TextBank;
use crate::pipeline::freespace::FreeSpaceMap;
use crate::pipeline::graphics::GraphicsSet;
use crate::pipeline::shuffle::ShuffleTable;
use crate::rom::container::Container;
use crate::rom::mapper::{CartAddress, Mapper, BANK_SIZE};
use crate::save::layout::SaveLayout;
use crate::table::pointer::{PayloadEnd, PointerSize, PointerTable};
use crate::text::codec::TextLimits;
use crate::text::dictionary::DictionarySpec;
use crate::text::table::CharTable;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A location in the image, written either way in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RomOffset {
    Linear(usize),
    Address(CartAddress),
}

impl RomOffset {
    /// Logical offset of this location.
    pub fn resolve(&self, mapper: &Mapper) -> RomResult<usize> {
        match *self {
            RomOffset::Linear(offset) => Ok(offset),
            RomOffset::Address(address) => mapper.to_logical(address),
        }
    }

    /// Like [`resolve`](Self::resolve), but an address may name the first byte past the
    /// image (an exclusive region end).
    fn resolve_end(&self, mapper: &Mapper) -> RomResult<usize> {
        match *self {
            RomOffset::Address(address) if address.is_rom_window() => {
                let canonical: CartAddress = address.canonical();
                let logical: usize = canonical.bank() as usize * BANK_SIZE + (canonical.offset() as usize - 0x8000);
                if logical == mapper.logical_len() {
                    return Ok(logical);
                }
                mapper.to_logical(address)
            }
            _ => self.resolve(mapper),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBankConfig {
    pub name: String,
    pub pointer_table: RomOffset,
    pub count: usize,
    pub pointer_size: PointerSize,
    /// Bank of 2-byte pointers; defaults to the bank holding the table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank: Option<u8>,
    pub end: PayloadEnd,
    #[serde(default)]
    pub limits: TextLimits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeRegion {
    pub start: RomOffset,
    /// Exclusive.
    pub end: RomOffset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphicsConfig {
    pub name: String,
    pub offset: RomOffset,
    pub tiles: usize,
    pub bpp: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette_offset: Option<RomOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette_colors: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShuffleConfig {
    pub name: String,
    pub offset: RomOffset,
    pub record_size: usize,
    pub count: usize,
    pub field_offset: usize,
    pub field_len: usize,
    #[serde(default)]
    pub preserve: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryConfig {
    pub offset: RomOffset,
    pub first_code: u8,
    pub count: usize,
}

const DEFAULT_COLUMNS: usize = 16;

/// Everything romkit needs to know about one game.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GameProfile {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_sha256: Option<String>,
    /// Character table file, relative to the profile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<PathBuf>,
    pub text_banks: Vec<TextBankConfig>,
    pub free_space: Vec<FreeRegion>,
    pub graphics: Vec<GraphicsConfig>,
    pub shuffles: Vec<ShuffleConfig>,
    pub save_layout: SaveLayout,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dictionary: Option<DictionaryConfig>,
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl GameProfile {
    pub fn load(path: &Path) -> RomResult<Self> {
        let json: String = std::fs::read_to_string(path)?;
        let mut profile: GameProfile = Self::from_json(&json)?;
        profile.base_dir = path.parent().map(Path::to_path_buf);
        info!("Loaded profile {:?} from {}", profile.name, path.display());
        Ok(profile)
    }

    pub fn from_json(json: &str) -> RomResult<Self> {
        let profile: GameProfile = serde_json::from_str(json)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn save(&self, path: &Path) -> RomResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json: String = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn validate(&self) -> RomResult<()> {
        self.save_layout
            .validate()
            .map_err(|message| RomError::config(format!("save_layout: {}", message)))?;
        for (i, bank) in self.text_banks.iter().enumerate() {
            if self.text_banks[..i].iter().any(|other| other.name == bank.name) {
                return Err(RomError::config(format!("duplicate text bank {:?}", bank.name)));
            }
        }
        for gfx in &self.graphics {
            if BitDepth::from_bpp(gfx.bpp).is_none() {
                return Err(RomError::config(format!(
                    "graphics {:?}: unsupported depth {} bpp",
                    gfx.name, gfx.bpp
                )));
            }
        }
        Ok(())
    }

    /// Character table path resolved against the profile's directory.
    pub fn table_path(&self) -> Option<PathBuf> {
        self.table.as_ref().map(|table| match &self.base_dir {
            Some(dir) if table.is_relative() => dir.join(table),
            _ => table.clone(),
        })
    }

    /// Load the character table, merging in the in-image dictionary when one is declared.
    pub fn load_table(&self, container: Option<&Container>) -> RomResult<Option<CharTable>> {
        let Some(path) = self.table_path() else {
            return Ok(None);
        };
        let table: CharTable = CharTable::load(&path)?;
        match (container, self.dictionary) {
            (Some(container), Some(dictionary)) => {
                let spec: DictionarySpec = DictionarySpec {
                    offset: dictionary.offset.resolve(container.mapper())?,
                    first_code: dictionary.first_code,
                    count: dictionary.count,
                };
                crate::text::dictionary::load_dictionary(container, &spec, &table).map(Some)
            }
            _ => Ok(Some(table)),
        }
    }

    /// Whether `container` is the image this profile was written for; true when the
    /// profile names no hash.
    pub fn matches(&self, container: &Container) -> bool {
        match &self.expected_sha256 {
            Some(expected) => {
                let actual: String = container.sha256();
                let ok: bool = expected.eq_ignore_ascii_case(&actual);
                if !ok {
                    warn!("Image SHA-256 {} does not match profile {:?}", actual, self.name);
                }
                ok
            }
            None => true,
        }
    }

    pub fn text_bank(&self, name: &str, mapper: &Mapper) -> RomResult<TextBank> {
        let config: &TextBankConfig = self
            .text_banks
            .iter()
            .find(|bank| bank.name == name)
            .ok_or_else(|| RomError::config(format!("profile has no text bank {:?}", name)))?;
        let table_offset: usize = config.pointer_table.resolve(mapper)?;
        let bank: u8 = match config.bank {
            Some(bank) => bank,
            None => match config.pointer_table {
                RomOffset::Address(address) => address.bank(),
                RomOffset::Linear(offset) => mapper.from_logical(offset)?.bank(),
            },
        };
        Ok(TextBank {
            name: config.name.clone(),
            table: PointerTable::new(table_offset, config.count, config.pointer_size, bank),
            end: config.end,
            limits: config.limits,
        })
    }

    pub fn free_space(&self, mapper: &Mapper) -> RomResult<FreeSpaceMap> {
        let mut map: FreeSpaceMap = FreeSpaceMap::new();
        for region in &self.free_space {
            let start: usize = region.start.resolve(mapper)?;
            let end: usize = region.end.resolve_end(mapper)?;
            if end <= start {
                return Err(RomError::config(format!(
                    "free region 0x{:06X}..0x{:06X} is empty",
                    start, end
                )));
            }
            map.release(start..end);
        }
        Ok(map)
    }

    pub fn graphics_set(&self, name: &str, mapper: &Mapper) -> RomResult<GraphicsSet> {
        let config: &GraphicsConfig = self
            .graphics
            .iter()
            .find(|gfx| gfx.name == name)
            .ok_or_else(|| RomError::config(format!("profile has no graphics set {:?}", name)))?;
        let depth: BitDepth = BitDepth::from_bpp(config.bpp)
            .ok_or_else(|| RomError::config(format!("unsupported depth {} bpp", config.bpp)))?;
        Ok(GraphicsSet {
            name: config.name.clone(),
            offset: config.offset.resolve(mapper)?,
            tiles: config.tiles,
            depth,
            palette_offset: config.palette_offset.map(|p| p.resolve(mapper)).transpose()?,
            palette_colors: config.palette_colors,
            columns: config.columns.unwrap_or(DEFAULT_COLUMNS),
        })
    }

    pub fn shuffle_tables(&self, mapper: &Mapper) -> RomResult<Vec<ShuffleTable>> {
        self.shuffles
            .iter()
            .map(|config| {
                Ok(ShuffleTable {
                    name: config.name.clone(),
                    offset: config.offset.resolve(mapper)?,
                    record_size: config.record_size,
                    count: config.count,
                    field_offset: config.field_offset,
                    field_len: config.field_len,
                    preserve: config.preserve.clone(),
                })
            })
            .collect()
    }
}
