//! Tile graphics export to PNG and import back into the image.

use crate::error::{RomError, RomResult};
use crate::gfx::palette::{Bgr555, Palette};
use crate::gfx::sheet::{import_tile_sheet_over, load_png, render_tile_sheet, save_png};
use crate::gfx::tile::{BitDepth, Tile, TileCodec};
use crate::rom::container::Container;
use image::RgbaImage;
use log::info;
use std::path::Path;

/// A block of tiles and, optionally, the palette it is drawn with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphicsSet {
    pub name: String,
    /// Logical offset of the first tile.
    pub offset: usize,
    pub tiles: usize,
    pub depth: BitDepth,
    /// Logical offset of the palette; a grey ramp is used without one.
    pub palette_offset: Option<usize>,
    pub palette_colors: Option<usize>,
    pub columns: usize,
}

impl GraphicsSet {
    pub fn byte_len(&self) -> usize {
        self.tiles * self.depth.bytes_per_tile()
    }
}

/// Evenly spaced greys, darkest first.
pub fn grey_ramp(colors: usize) -> Palette {
    let steps: usize = colors.saturating_sub(1).max(1);
    Palette::new(
        (0..colors)
            .map(|i| {
                let level: u8 = (i * 31 / steps) as u8;
                Bgr555::from_channels(level, level, level)
            })
            .collect(),
    )
}

pub fn load_tiles(container: &Container, set: &GraphicsSet) -> RomResult<Vec<Tile>> {
    TileCodec::decode_many(set.depth, container.slice(set.offset, set.byte_len())?)
}

pub fn load_palette(container: &Container, set: &GraphicsSet) -> RomResult<Palette> {
    let colors: usize = set.palette_colors.unwrap_or_else(|| set.depth.colors());
    match set.palette_offset {
        Some(offset) => Palette::decode(container.slice(offset, colors * 2)?, colors),
        None => Ok(grey_ramp(colors)),
    }
}

/// Render a graphics set to a PNG tile sheet at `path`.
pub fn export_graphics(container: &Container, set: &GraphicsSet, path: &Path) -> RomResult<RgbaImage> {
    let tiles: Vec<Tile> = load_tiles(container, set)?;
    let palette: Palette = load_palette(container, set)?;
    let sheet: RgbaImage = render_tile_sheet(&tiles, &palette, set.columns, false);
    save_png(&sheet, path)?;
    info!("Exported {} tiles of {} to {}", tiles.len(), set.name, path.display());
    Ok(sheet)
}

/// Read a PNG tile sheet and write its tiles over the set.
///
/// # Errors
/// `CapacityExceeded` if the sheet holds more tiles than the set; `UnmappedColor` or
/// `PixelOutOfRange` for pixels the palette or depth cannot express.
pub fn import_graphics(container: &mut Container, set: &GraphicsSet, path: &Path) -> RomResult<usize> {
    let sheet: RgbaImage = load_png(path)?;
    let palette: Palette = load_palette(container, set)?;
    // Duplicate palette colours resolve to the index each pixel already has.
    let current: Vec<Tile> = load_tiles(container, set)?;
    let mut tiles: Vec<Tile> = import_tile_sheet_over(&sheet, &palette, &current)?;
    // Sheets are padded to whole rows; the padding tiles are blank.
    if tiles.len() > set.tiles {
        if tiles[set.tiles..].iter().any(|t| t.max_index() != 0) {
            return Err(RomError::CapacityExceeded {
                what: format!("tiles in graphics set {}", set.name),
                required: tiles.len() as u64,
                available: set.tiles as u64,
            });
        }
        tiles.truncate(set.tiles);
    }
    let bytes: Vec<u8> = TileCodec::encode_many(set.depth, &tiles)?;
    container.write_bytes(set.offset, &bytes)?;
    info!("Imported {} tiles into {}", tiles.len(), set.name);
    Ok(tiles.len())
}
