//! Text encoding: character tables, the dictionary-aware codec, and in-image dictionaries.

pub mod codec;
pub mod dictionary;
pub mod table;

pub use codec::{DecodeOptions, DecodedText, TextCodec, TextLimits, TextMetrics, UnmappedPolicy};
pub use dictionary::{load_dictionary, DictionarySpec};
pub use table::{Bracket, CharTable, ControlCode, TableEntry};
