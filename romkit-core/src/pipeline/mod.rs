//! High-level operations composed from the codecs: dialog round trips, seeded shuffles,
//! difference reports and graphics import/export.

pub mod dialog;
pub mod freespace;
pub mod graphics;
pub mod report;
pub mod shuffle;

pub use dialog::{
    extract_texts, CommitOptions, CommitReport, DialogEditor, ExtractReport, ExtractedText, Relocation, TextBank,
};
pub use freespace::FreeSpaceMap;
pub use graphics::{export_graphics, import_graphics, GraphicsSet};
pub use report::{DiffRegion, DiffReport};
pub use shuffle::{shuffle_records, Randomizer, ShuffleLog, ShuffleMove, ShuffleTable, SplitRng};
