//! Tile sheets: grids of tiles exported to and imported from PNG.

use crate::error::{RomError, RomResult};
use crate::gfx::palette::{Palette, Rgb};
use crate::gfx::tile::Tile;
use crate::gfx::tilemap::blit_tile;
use image::RgbaImage;
use std::path::Path;

/// Lay tiles out left-to-right, top-to-bottom, `columns` per row.
pub fn render_tile_sheet(
    tiles: &[Tile],
    palette: &Palette,
    columns: usize,
    transparent_zero: bool,
) -> RgbaImage {
    let columns: usize = columns.max(1);
    let rows: usize = tiles.len().div_ceil(columns).max(1);
    let mut image: RgbaImage = RgbaImage::new(columns as u32 * 8, rows as u32 * 8);
    for (i, tile) in tiles.iter().enumerate() {
        let px: u32 = (i % columns) as u32 * 8;
        let py: u32 = (i / columns) as u32 * 8;
        blit_tile(&mut image, tile, palette, px, py, transparent_zero);
    }
    image
}

/// Cut an image into tiles, mapping each pixel back to its palette index.
///
/// Fully transparent pixels become index 0. Every other pixel must match a palette
/// colour exactly.
///
/// # Errors
/// `Media` if the dimensions are not multiples of 8, `UnmappedColor` for a pixel with no
/// palette entry.
pub fn import_tile_sheet(image: &RgbaImage, palette: &Palette) -> RomResult<Vec<Tile>> {
    import_tile_sheet_over(image, palette, &[])
}

/// Like [`import_tile_sheet`], but where a colour appears at several palette indices the
/// index already stored in `current` at that pixel wins, so an unedited sheet reproduces
/// its tiles exactly.
pub fn import_tile_sheet_over(image: &RgbaImage, palette: &Palette, current: &[Tile]) -> RomResult<Vec<Tile>> {
    let (width, height) = image.dimensions();
    if width % 8 != 0 || height % 8 != 0 {
        return Err(RomError::Media {
            message: format!("sheet is {}x{}, not a multiple of 8", width, height),
        });
    }
    let columns: u32 = width / 8;
    let rows: u32 = height / 8;
    let mut tiles: Vec<Tile> = Vec::with_capacity((columns * rows) as usize);
    for ty in 0..rows {
        for tx in 0..columns {
            let previous: Option<&Tile> = current.get(tiles.len());
            let mut tile: Tile = Tile::default();
            for y in 0..8u32 {
                for x in 0..8u32 {
                    let [r, g, b, a] = image.get_pixel(tx * 8 + x, ty * 8 + y).0;
                    let index: u8 = if a == 0 {
                        0
                    } else {
                        let rgb: Rgb = Rgb::new(r, g, b);
                        let kept: Option<u8> = previous
                            .map(|t| t.pixel(x as usize, y as usize))
                            .filter(|&i| palette.get(i as usize).map(|c| c.to_rgb()) == Some(rgb));
                        match kept {
                            Some(index) => index,
                            None => palette.position(rgb).ok_or(RomError::UnmappedColor {
                                r,
                                g,
                                b,
                                reason: "colour is not in the palette",
                            })? as u8,
                        }
                    };
                    tile.put(x as usize, y as usize, index);
                }
            }
            tiles.push(tile);
        }
    }
    Ok(tiles)
}

pub fn save_png(image: &RgbaImage, path: &Path) -> RomResult<()> {
    image.save_with_format(path, image::ImageFormat::Png)?;
    Ok(())
}

pub fn load_png(path: &Path) -> RomResult<RgbaImage> {
    Ok(image::open(path)?.to_rgba8())
}
