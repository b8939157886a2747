//! Seeded record shuffling.
//!
//! Every table draws from its own generator stream, derived from the run seed and the
//! table's name, so adding or reordering tables never changes the outcome of the others.

use crate::error::{RomError, RomResult};
use crate::rom::container::Container;
use log::{debug, info};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

/// Splits one seed into independent, reproducible generator streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitRng {
    seed: u64,
}

impl SplitRng {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generator for `label`; the same seed and label always yield the same sequence.
    pub fn stream(&self, label: &str) -> Pcg64 {
        let state: u128 = ((self.seed as u128) << 64) | self.seed.rotate_left(32) as u128;
        Pcg64::new(state, crc32fast::hash(label.as_bytes()) as u128)
    }
}

/// A run of fixed-size records with one field to shuffle across them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShuffleTable {
    pub name: String,
    /// Logical offset of the first record.
    pub offset: usize,
    pub record_size: usize,
    pub count: usize,
    pub field_offset: usize,
    /// Field width in bytes, 1 to 8, little-endian.
    pub field_len: usize,
    /// Field values that never move.
    #[serde(default)]
    pub preserve: Vec<u64>,
}

impl ShuffleTable {
    pub fn validate(&self) -> RomResult<()> {
        if self.field_len == 0 || self.field_len > 8 {
            return Err(RomError::config(format!(
                "shuffle table {}: field length {} is not between 1 and 8",
                self.name, self.field_len
            )));
        }
        if self.field_offset + self.field_len > self.record_size {
            return Err(RomError::config(format!(
                "shuffle table {}: field ends past the {}-byte record",
                self.name, self.record_size
            )));
        }
        Ok(())
    }

    fn field_at(&self, record: usize) -> usize {
        self.offset + record * self.record_size + self.field_offset
    }

    fn read_field(&self, container: &Container, record: usize) -> RomResult<u64> {
        let bytes: &[u8] = container.slice(self.field_at(record), self.field_len)?;
        Ok(bytes
            .iter()
            .rev()
            .fold(0u64, |value, &b| (value << 8) | b as u64))
    }

    fn write_field(&self, container: &mut Container, record: usize, value: u64) -> RomResult<()> {
        let bytes: [u8; 8] = value.to_le_bytes();
        container.write_bytes(self.field_at(record), &bytes[..self.field_len])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShuffleMove {
    pub record: usize,
    pub before: u64,
    pub after: u64,
}

/// What one table's shuffle changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShuffleLog {
    pub table: String,
    pub shuffled: usize,
    pub preserved: usize,
    pub moves: Vec<ShuffleMove>,
}

/// Permute the field values of every non-preserved record.
pub fn shuffle_records<R: Rng + ?Sized>(
    container: &mut Container,
    table: &ShuffleTable,
    rng: &mut R,
) -> RomResult<ShuffleLog> {
    table.validate()?;
    let values: Vec<u64> = (0..table.count)
        .map(|record| table.read_field(container, record))
        .collect::<RomResult<_>>()?;
    let movable: Vec<usize> = (0..table.count)
        .filter(|&record| !table.preserve.contains(&values[record]))
        .collect();

    let mut pool: Vec<u64> = movable.iter().map(|&record| values[record]).collect();
    pool.shuffle(rng);

    let mut moves: Vec<ShuffleMove> = Vec::new();
    for (&record, &after) in movable.iter().zip(&pool) {
        let before: u64 = values[record];
        if before != after {
            table.write_field(container, record, after)?;
            moves.push(ShuffleMove { record, before, after });
        }
    }
    debug!(
        "Shuffled {}: {} movable, {} changed",
        table.name,
        movable.len(),
        moves.len()
    );
    Ok(ShuffleLog {
        table: table.name.clone(),
        shuffled: movable.len(),
        preserved: table.count - movable.len(),
        moves,
    })
}

/// Runs a set of shuffles from one seed.
pub struct Randomizer;

impl Randomizer {
    /// Shuffle every table; on failure the container is left as it was.
    pub fn run(seed: u64, container: &mut Container, tables: &[ShuffleTable]) -> RomResult<Vec<ShuffleLog>> {
        let split: SplitRng = SplitRng::new(seed);
        let checkpoint = container.checkpoint();
        let mut logs: Vec<ShuffleLog> = Vec::with_capacity(tables.len());
        for table in tables {
            let mut rng: Pcg64 = split.stream(&table.name);
            match shuffle_records(container, table, &mut rng) {
                Ok(log) => logs.push(log),
                Err(err) => {
                    container.rollback(checkpoint);
                    return Err(err);
                }
            }
        }
        info!("Randomized {} tables with seed {}", logs.len(), seed);
        Ok(logs)
    }
}
