//! Graphics codecs: planar tiles, BGR555 palettes, tilemaps and tile sheets.

pub mod palette;
pub mod sheet;
pub mod tile;
pub mod tilemap;

pub use palette::{decode_color, encode_color, Bgr555, Palette, Rgb, SENTINEL};
pub use sheet::{import_tile_sheet, import_tile_sheet_over, render_tile_sheet};
pub use tile::{BitDepth, Tile, TileCodec};
pub use tilemap::{render_tilemap, MissingTilePolicy, RenderOptions, RenderedMap, TileAttribute, Tilemap};
