//! Cartridge image access: address mapping, the owning container, and the internal header.

pub mod container;
pub mod dirty;
pub mod header;
pub mod mapper;

pub use container::{ByteChange, Checkpoint, Container, SaveOptions};
pub use dirty::DirtySet;
pub use header::{compute_checksum, fix_checksum, InternalHeader};
pub use mapper::{CartAddress, Mapper, BANK_SIZE};
