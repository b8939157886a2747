//! romkit: read, edit and patch LoROM cartridge images.
//!
//! A [`Container`] owns the image and tracks every write. Codecs turn its bytes into
//! editable values and back: text through a [`CharTable`], tiles and palettes, audio
//! samples, and battery saves. The [`Patch`] codecs express the finished edit as a
//! distributable delta against the original image.

pub mod audio;
pub mod compress;
pub mod config;
pub mod error;
pub mod gfx;
pub mod patch;
pub mod pipeline;
pub mod rom;
pub mod save;
pub mod table;
pub mod text;

pub use audio::{AudioCodec, BrrSample};
pub use config::{GameProfile, RomOffset};
pub use error::{ChecksumTarget, ErrorKind, RomError, RomResult};
pub use gfx::{BitDepth, Palette, Tile, TileCodec, Tilemap};
pub use patch::{Patch, PatchFormat, PatchInfo};
pub use pipeline::{DialogEditor, DiffReport, FreeSpaceMap, Randomizer, TextBank};
pub use rom::{CartAddress, Container, Mapper, SaveOptions};
pub use save::{SaveImage, SaveLayout};
pub use table::{PayloadEnd, PointerSize, PointerTable};
pub use text::{CharTable, TextCodec, UnmappedPolicy};
