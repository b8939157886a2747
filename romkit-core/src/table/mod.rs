//! Pointer-table walking.

pub mod pointer;

pub use pointer::{PayloadEnd, PointerEntry, PointerIter, PointerSize, PointerTable};
