//! Tilemaps and flat rendering.
//!
//! A tilemap entry is a 16-bit little-endian attribute word:
//!
//! ```text
//! bit 15     vertical flip
//! bit 14     horizontal flip
//! bit 13     priority
//! bits 10-12 palette selector
//! bits 0-9   tile number
//! ```

use crate::error::{RomError, RomResult};
use crate::gfx::palette::{Palette, Rgb, SENTINEL};
use crate::gfx::tile::Tile;
use image::{Rgba, RgbaImage};

/// One tilemap cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TileAttribute(pub u16);

impl TileAttribute {
    pub fn from_parts(tile: u16, palette: u8, priority: bool, h_flip: bool, v_flip: bool) -> Self {
        let mut word: u16 = tile & 0x03FF;
        word |= ((palette & 0x07) as u16) << 10;
        word |= (priority as u16) << 13;
        word |= (h_flip as u16) << 14;
        word |= (v_flip as u16) << 15;
        Self(word)
    }

    #[inline]
    pub fn tile(self) -> u16 {
        self.0 & 0x03FF
    }

    #[inline]
    pub fn palette(self) -> u8 {
        ((self.0 >> 10) & 0x07) as u8
    }

    #[inline]
    pub fn priority(self) -> bool {
        self.0 & 0x2000 != 0
    }

    #[inline]
    pub fn h_flip(self) -> bool {
        self.0 & 0x4000 != 0
    }

    #[inline]
    pub fn v_flip(self) -> bool {
        self.0 & 0x8000 != 0
    }
}

/// A grid of attribute words. `cells` always holds `width * height` entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tilemap {
    width: usize,
    height: usize,
    cells: Vec<TileAttribute>,
}

impl Tilemap {
    /// # Errors
    /// `OutOfBounds` when `cells` does not hold exactly `width * height` entries.
    pub fn new(width: usize, height: usize, cells: Vec<TileAttribute>) -> RomResult<Self> {
        let needed: usize = width
            .checked_mul(height)
            .ok_or_else(|| RomError::out_of_bounds(width, height, usize::MAX))?;
        if cells.len() != needed {
            return Err(RomError::out_of_bounds(0, needed, cells.len()));
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Decode `width * height` attribute words.
    pub fn decode(bytes: &[u8], width: usize, height: usize) -> RomResult<Self> {
        let needed: usize = width
            .checked_mul(height)
            .and_then(|cells| cells.checked_mul(2))
            .ok_or_else(|| RomError::out_of_bounds(0, usize::MAX, bytes.len()))?;
        if bytes.len() < needed {
            return Err(RomError::out_of_bounds(0, needed, bytes.len()));
        }
        let cells: Vec<TileAttribute> = bytes[..needed]
            .chunks_exact(2)
            .map(|w| TileAttribute(u16::from_le_bytes([w[0], w[1]])))
            .collect();
        Self::new(width, height, cells)
    }

    pub fn encode(&self) -> Vec<u8> {
        self.cells.iter().flat_map(|c| c.0.to_le_bytes()).collect()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cells(&self) -> &[TileAttribute] {
        &self.cells
    }

    pub fn get(&self, x: usize, y: usize) -> Option<TileAttribute> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells.get(y * self.width + x).copied()
    }
}

/// What to draw when a cell names a tile that does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingTilePolicy {
    /// Draw a black/magenta checkerboard.
    #[default]
    Checkerboard,
    /// Leave the cell fully transparent and report it.
    MarkInvalid,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    pub missing_tile: MissingTilePolicy,
    /// Draw index 0 as transparent (sprite convention).
    pub transparent_zero: bool,
}

/// Rendered image plus the cells that could not be resolved.
#[derive(Debug, Clone)]
pub struct RenderedMap {
    pub image: RgbaImage,
    pub invalid_cells: Vec<(usize, usize)>,
}

#[inline]
fn opaque(rgb: Rgb) -> Rgba<u8> {
    Rgba([rgb.r, rgb.g, rgb.b, 0xFF])
}

/// Draw one tile at pixel position `(px, py)` using `palette`.
pub(crate) fn blit_tile(
    image: &mut RgbaImage,
    tile: &Tile,
    palette: &Palette,
    px: u32,
    py: u32,
    transparent_zero: bool,
) {
    for y in 0..8 {
        for x in 0..8 {
            let index: u8 = tile.pixel(x, y);
            let pixel: Rgba<u8> = if transparent_zero && index == 0 {
                Rgba([0, 0, 0, 0])
            } else {
                opaque(palette.rgb_or_sentinel(index as usize))
            };
            image.put_pixel(px + x as u32, py + y as u32, pixel);
        }
    }
}

/// Render a tilemap flat (priority is ignored).
///
/// `palettes[n]` is the palette selected by attribute palette `n`; a missing palette
/// renders every pixel in the sentinel colour.
pub fn render_tilemap(
    map: &Tilemap,
    tiles: &[Tile],
    palettes: &[Palette],
    options: RenderOptions,
) -> RenderedMap {
    let mut image: RgbaImage = RgbaImage::new(map.width as u32 * 8, map.height as u32 * 8);
    let mut invalid_cells: Vec<(usize, usize)> = Vec::new();
    let empty: Palette = Palette::default();

    for cy in 0..map.height {
        for cx in 0..map.width {
            let Some(attr) = map.get(cx, cy) else {
                continue;
            };
            let (px, py) = (cx as u32 * 8, cy as u32 * 8);
            let Some(source) = tiles.get(attr.tile() as usize) else {
                invalid_cells.push((cx, cy));
                if options.missing_tile == MissingTilePolicy::Checkerboard {
                    for y in 0..8u32 {
                        for x in 0..8u32 {
                            let color: Rgb = if (x / 2 + y / 2) % 2 == 0 {
                                Rgb::new(0, 0, 0)
                            } else {
                                SENTINEL
                            };
                            image.put_pixel(px + x, py + y, opaque(color));
                        }
                    }
                }
                continue;
            };
            let mut tile: Tile = *source;
            if attr.h_flip() {
                tile = tile.flip_horizontal();
            }
            if attr.v_flip() {
                tile = tile.flip_vertical();
            }
            let palette: &Palette = palettes.get(attr.palette() as usize).unwrap_or(&empty);
            blit_tile(&mut image, &tile, palette, px, py, options.transparent_zero);
        }
    }

    RenderedMap {
        image,
        invalid_cells,
    }
}
