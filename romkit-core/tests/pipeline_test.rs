//! Integration tests for dialog commits, seeded shuffles, diff reports and graphics import/export

mod common;

use common::{blank_image, container, sample_bytes, sample_table, write_long_pointers, write_short_pointers, ROM_SIZE};
use rand::RngCore;
use romkit_core::gfx::render_tile_sheet;
use romkit_core::gfx::sheet::save_png;
use romkit_core::pipeline::graphics::grey_ramp;
use romkit_core::pipeline::{
    export_graphics, extract_texts, import_graphics, shuffle_records, CommitOptions, GraphicsSet, ShuffleTable,
    SplitRng,
};
use romkit_core::rom::{CartAddress, Container, BANK_SIZE};
use romkit_core::text::TextLimits;
use romkit_core::{
    BitDepth, DialogEditor, DiffReport, ErrorKind, FreeSpaceMap, PayloadEnd, PointerSize, PointerTable, Randomizer,
    RomError, TextBank, TextCodec, Tile, TileCodec,
};
use tempfile::TempDir;

const TABLE: usize = 0x100;
const FREE: std::ops::Range<usize> = 0x1000..0x2000;

/// Three strings in bank 0 behind a 2-byte pointer table at 0x100.
fn dialog_image(targets: &[usize]) -> Container {
    let mut image = blank_image(ROM_SIZE);
    write_short_pointers(&mut image, TABLE, targets);
    image[0x200..0x203].copy_from_slice(&sample_bytes("Hi"));
    image[0x210..0x213].copy_from_slice(&sample_bytes("Yo"));
    image[0x220..0x223].copy_from_slice(&sample_bytes("Ok"));
    container(image)
}

fn short_bank(count: usize) -> TextBank {
    TextBank {
        name: "dialog".into(),
        table: PointerTable::new(TABLE, count, PointerSize::Two, 0),
        end: PayloadEnd::Terminator(0),
        limits: TextLimits::default(),
    }
}

fn texts(c: &Container, bank: &TextBank, codec: &TextCodec<'_>) -> Vec<String> {
    extract_texts(c, bank, codec).entries.into_iter().map(|e| e.text).collect()
}

#[test]
fn test_extract_texts() {
    let table = sample_table();
    let codec = TextCodec::new(&table);
    let c = dialog_image(&[0x200, 0x210, 0x220]);

    let report = extract_texts(&c, &short_bank(3), &codec);
    assert!(report.errors.is_empty());
    assert_eq!(report.entries.len(), 3);
    let first = &report.entries[0];
    assert_eq!(first.text, "Hi");
    assert_eq!(first.address, CartAddress::new(0x00, 0x8200));
    assert_eq!(first.offset, 0x200);
    assert_eq!(first.size, 3);
    assert!(first.terminated);
    assert_eq!(report.entries[2].text, "Ok");
}

#[test]
fn test_commit_in_place_releases_tail() {
    let table = sample_table();
    let codec = TextCodec::new(&table);
    let mut c = dialog_image(&[0x200, 0x210, 0x220]);
    let mut free = FreeSpaceMap::from_regions([FREE]);
    let mut editor = DialogEditor::new(short_bank(3));
    editor.stage(0, "A").unwrap();
    editor.stage(2, "Ok").unwrap();

    let options = CommitOptions {
        fill_freed: Some(0xFF),
        ..CommitOptions::default()
    };
    let report = editor.commit(&mut c, &codec, &mut free, options).unwrap();
    assert_eq!(report.in_place, vec![0]);
    assert_eq!(report.unchanged, vec![2]);
    assert!(report.relocated.is_empty());
    assert!(report.is_clean());

    assert_eq!(c.read_bytes(0x200, 3).unwrap(), vec![b'A', 0x00, 0xFF]);
    assert!(free.contains(0x202));
    assert_eq!(free.total_free(), FREE.len() + 1);
    assert_eq!(editor.staged(), 1, "unchanged edits stay staged");
}

#[test]
fn test_commit_relocates_and_rewrites_pointer() {
    let table = sample_table();
    let codec = TextCodec::new(&table);
    let mut c = dialog_image(&[0x200, 0x210, 0x220]);
    let mut free = FreeSpaceMap::from_regions([FREE]);
    let bank = short_bank(3);
    let mut editor = DialogEditor::new(bank.clone());
    editor.stage(1, "Hello there").unwrap();

    let report = editor
        .commit(&mut c, &codec, &mut free, CommitOptions::default())
        .unwrap()
        .check()
        .unwrap();
    assert_eq!(report.relocated.len(), 1);
    let moved = &report.relocated[0];
    assert_eq!((moved.index, moved.from, moved.to), (1, 0x210, 0x1000));
    assert_eq!((moved.old_len, moved.new_len), (3, 12));
    assert_eq!(c.read_u16_le(TABLE + 2).unwrap(), 0x9000);

    assert!(free.contains(0x210), "old slot is free again");
    assert!(!free.contains(0x1000));
    assert_eq!(texts(&c, &bank, &codec), vec!["Hi", "Hello there", "Ok"]);
    assert_eq!(editor.staged(), 0);
}

#[test]
fn test_shared_slot_is_never_freed() {
    let table = sample_table();
    let codec = TextCodec::new(&table);
    let mut c = dialog_image(&[0x200, 0x210, 0x200]);
    let mut free = FreeSpaceMap::from_regions([FREE]);
    let bank = short_bank(3);
    let mut editor = DialogEditor::new(bank.clone());
    // Short enough to fit, but the slot is shared with entry 2.
    editor.stage(0, "A").unwrap();

    let report = editor.commit(&mut c, &codec, &mut free, CommitOptions::default()).unwrap();
    assert!(report.in_place.is_empty());
    assert_eq!(report.relocated[0].to, 0x1000);
    assert!(!free.contains(0x200));
    assert_eq!(texts(&c, &bank, &codec), vec!["A", "Yo", "Hi"]);
}

#[test]
fn test_suffix_shared_slot_is_relocated() {
    let table = sample_table();
    let codec = TextCodec::new(&table);
    // Entry 1 points at the tail of entry 0's payload.
    let mut c = dialog_image(&[0x200, 0x201, 0x220]);
    let mut free = FreeSpaceMap::from_regions([FREE]);
    let bank = short_bank(3);
    assert_eq!(texts(&c, &bank, &codec), vec!["Hi", "i", "Ok"]);

    let mut editor = DialogEditor::new(bank.clone());
    editor.stage(0, "A").unwrap();
    let report = editor.commit(&mut c, &codec, &mut free, CommitOptions::default()).unwrap();
    assert!(report.in_place.is_empty());
    assert_eq!(report.relocated[0].to, 0x1000);
    assert!(!free.contains(0x200));
    assert!(!free.contains(0x202));
    assert_eq!(texts(&c, &bank, &codec), vec!["A", "i", "Ok"]);

    // Editing the suffix must not free the bytes entry 0 still reads.
    let mut editor = DialogEditor::new(bank.clone());
    let mut c = dialog_image(&[0x200, 0x201, 0x220]);
    let mut free = FreeSpaceMap::from_regions([FREE]);
    editor.stage(1, "").unwrap();
    let report = editor.commit(&mut c, &codec, &mut free, CommitOptions::default()).unwrap();
    assert!(report.in_place.is_empty());
    assert_eq!(report.relocated.len(), 1);
    assert!(!free.contains(0x201));
    assert_eq!(texts(&c, &bank, &codec), vec!["Hi", "", "Ok"]);
}

fn long_bank_image() -> (Container, TextBank) {
    let mut image = blank_image(ROM_SIZE);
    write_long_pointers(&mut image, TABLE, &[0x200]);
    image[0x200..0x203].copy_from_slice(&sample_bytes("Hi"));
    let bank = TextBank {
        name: "items".into(),
        table: PointerTable::new(TABLE, 1, PointerSize::Three, 0),
        end: PayloadEnd::Terminator(0),
        limits: TextLimits::default(),
    };
    (container(image), bank)
}

#[test]
fn test_no_free_space_leaves_image_untouched() {
    let table = sample_table();
    let codec = TextCodec::new(&table);
    let (mut c, bank) = long_bank_image();
    let mut free = FreeSpaceMap::new();
    let mut editor = DialogEditor::new(bank);
    editor.stage(0, "Hello").unwrap();

    let report = editor.commit(&mut c, &codec, &mut free, CommitOptions::default()).unwrap();
    assert!(!report.is_clean());
    let err = &report.errors[&0];
    assert!(matches!(
        err,
        RomError::NoFreeSpace {
            required: 6,
            original: 3,
            largest_gap: 3,
            ..
        }
    ));
    assert_eq!(err.kind().exit_code(), 6);
    assert!(free.is_empty(), "free map restored after the failed item");
    assert!(!c.is_dirty());
    assert_eq!(c.len(), ROM_SIZE);
}

#[test]
fn test_expansion_grows_by_whole_banks() {
    let table = sample_table();
    let codec = TextCodec::new(&table);
    let (mut c, bank) = long_bank_image();
    let mut free = FreeSpaceMap::new();
    let mut editor = DialogEditor::new(bank.clone());
    editor.stage(0, "Hello").unwrap();

    let options = CommitOptions {
        allow_expansion: true,
        ..CommitOptions::default()
    };
    let report = editor.commit(&mut c, &codec, &mut free, options).unwrap();
    assert!(report.is_clean());
    assert_eq!(report.expanded_to, Some(ROM_SIZE + BANK_SIZE));
    assert_eq!(report.relocated[0].to, ROM_SIZE);
    assert_eq!(c.len(), ROM_SIZE + BANK_SIZE);
    assert_eq!(c.read_u24_le(TABLE).unwrap(), 0x04_8000);
    assert_eq!(c.read_u8(ROM_SIZE + 6).unwrap(), 0xFF);
    assert_eq!(texts(&c, &bank, &codec), vec!["Hello"]);
}

#[test]
fn test_failed_items_do_not_block_others() {
    let table = sample_table();
    let codec = TextCodec::new(&table);
    let mut c = dialog_image(&[0x200, 0x210, 0x220]);
    let mut free = FreeSpaceMap::from_regions([FREE]);
    let mut editor = DialogEditor::new(short_bank(3));
    editor.stage(0, "A").unwrap();
    editor.stage(1, "Hello").unwrap();
    editor.stage(2, "~").unwrap();

    let options = CommitOptions {
        limits: Some(TextLimits {
            max_bytes: Some(4),
            ..TextLimits::default()
        }),
        ..CommitOptions::default()
    };
    let report = editor.commit(&mut c, &codec, &mut free, options).unwrap();
    assert_eq!(report.in_place, vec![0]);
    assert_eq!(report.errors.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
    assert!(matches!(report.errors[&1], RomError::DialogTooLong { required: 6, available: 4, .. }));
    assert_eq!(report.errors[&2].kind(), ErrorKind::Unmapped);
    assert_eq!(c.read_bytes(0x210, 3).unwrap(), sample_bytes("Yo"));
    assert_eq!(c.read_bytes(0x220, 3).unwrap(), sample_bytes("Ok"));
    assert_eq!(editor.staged(), 2);

    let err = report.check().unwrap_err();
    assert!(matches!(err, RomError::DialogTooLong { .. }));
}

#[test]
fn test_stage_past_table_end() {
    let mut editor = DialogEditor::new(short_bank(3));
    let err = editor.stage(3, "x").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfBounds);
    assert_eq!(editor.staged(), 0);
}

#[test]
fn test_free_space_allocation() {
    let mut free = FreeSpaceMap::from_regions([0x100..0x110, 0x110..0x120, 0x400..0x408]);
    assert_eq!(free.iter().collect::<Vec<_>>(), vec![0x100..0x120, 0x400..0x408]);
    // Smallest gap that holds the request wins.
    assert_eq!(free.allocate(4, None), Some(0x400));
    assert_eq!(free.allocate(8, Some(0x108..0x200)), Some(0x108));
    assert_eq!(free.allocate(64, None), None);
    assert_eq!(free.iter().collect::<Vec<_>>(), vec![0x100..0x108, 0x110..0x120, 0x404..0x408]);
    assert_eq!(free.largest_gap(), 0x10);
    assert_eq!(free.largest_gap_within(&(0x100..0x104)), 4);
    free.reserve(0x100..0x102);
    assert!(!free.contains(0x101));
    assert_eq!(free.total_free(), 6 + 0x10 + 4);
}

/// Sixteen 4-byte records at 0x1000 with a 2-byte field at +1.
fn records(c: &mut Container, offset: usize, name: &str) -> ShuffleTable {
    for i in 0..16usize {
        let base = offset + i * 4;
        c.write_u8(base, 0xAB).unwrap();
        c.write_u16_le(base + 1, (i * 100 + 1) as u16).unwrap();
        c.write_u8(base + 3, 0xCD).unwrap();
    }
    ShuffleTable {
        name: name.into(),
        offset,
        record_size: 4,
        count: 16,
        field_offset: 1,
        field_len: 2,
        preserve: Vec::new(),
    }
}

fn field_values(c: &Container, table: &ShuffleTable) -> Vec<u16> {
    (0..table.count)
        .map(|i| c.read_u16_le(table.offset + i * table.record_size + 1).unwrap())
        .collect()
}

#[test]
fn test_same_seed_same_shuffle() {
    let mut a = container(blank_image(ROM_SIZE));
    let mut b = container(blank_image(ROM_SIZE));
    let table_a = records(&mut a, 0x1000, "enemies");
    let table_b = records(&mut b, 0x1000, "enemies");
    let before = field_values(&a, &table_a);

    let logs = Randomizer::run(42, &mut a, &[table_a.clone()]).unwrap();
    Randomizer::run(42, &mut b, &[table_b]).unwrap();
    assert_eq!(a.working(), b.working());

    let mut after = field_values(&a, &table_a);
    assert_ne!(after, before);
    for m in &logs[0].moves {
        assert_ne!(m.before, m.after);
        assert_eq!(after[m.record] as u64, m.after);
    }
    after.sort_unstable();
    assert_eq!(after, before, "values are permuted, not replaced");
    for i in 0..16 {
        assert_eq!(a.read_u8(0x1000 + i * 4).unwrap(), 0xAB);
        assert_eq!(a.read_u8(0x1000 + i * 4 + 3).unwrap(), 0xCD);
    }
}

#[test]
fn test_tables_draw_independent_streams() {
    let mut alone = container(blank_image(ROM_SIZE));
    let mut both = container(blank_image(ROM_SIZE));
    let items = records(&mut alone, 0x1000, "items");
    let items_too = records(&mut both, 0x1000, "items");
    let shops = records(&mut both, 0x2000, "shops");

    Randomizer::run(7, &mut alone, &[items.clone()]).unwrap();
    Randomizer::run(7, &mut both, &[shops, items_too]).unwrap();
    assert_eq!(field_values(&alone, &items), field_values(&both, &items));

    let split = SplitRng::new(7);
    assert_eq!(split.stream("items").next_u64(), split.stream("items").next_u64());
    assert_ne!(split.stream("items").next_u64(), split.stream("shops").next_u64());
    assert_ne!(SplitRng::new(8).stream("items").next_u64(), split.stream("items").next_u64());
}

#[test]
fn test_preserved_values_stay_put() {
    let mut c = container(blank_image(ROM_SIZE));
    let mut table = records(&mut c, 0x1000, "chests");
    table.preserve = vec![301];
    let mut rng = SplitRng::new(1).stream("chests");

    let log = shuffle_records(&mut c, &table, &mut rng).unwrap();
    assert_eq!(log.preserved, 1);
    assert_eq!(log.shuffled, 15);
    assert_eq!(field_values(&c, &table)[3], 301);
    assert!(log.moves.iter().all(|m| m.record != 3));
}

#[test]
fn test_failed_run_rolls_back() {
    let mut c = container(blank_image(ROM_SIZE));
    let good = records(&mut c, 0x1000, "good");
    let before = c.working().to_vec();
    let bad = ShuffleTable {
        name: "bad".into(),
        field_offset: 3,
        ..good.clone()
    };

    let err = Randomizer::run(3, &mut c, &[good, bad]).unwrap_err();
    assert!(matches!(err, RomError::Config { .. }));
    assert_eq!(c.working(), &before[..]);
}

#[test]
fn test_diff_between_images() {
    let original = vec![0u8; 64];
    let mut modified = original.clone();
    modified[10] = 1;
    modified[11] = 2;
    modified[20] = 3;
    modified.extend_from_slice(&[9, 9, 9, 9]);

    let report = DiffReport::between(&original, &modified);
    assert_eq!(report.bytes_changed, 3, "appended bytes are counted separately");
    assert_eq!(report.appended, 4);
    assert_eq!(report.truncated, 0);
    let spans: Vec<(usize, usize)> = report.regions.iter().map(|r| (r.start, r.end)).collect();
    assert_eq!(spans, vec![(10, 12), (20, 21), (64, 68)]);
    assert_eq!(report.regions[0].address, Some(CartAddress::new(0x00, 0x800A)));
    assert_eq!(report.banks.get(&0), Some(&7));
    assert!(!report.is_identical());
    assert!(DiffReport::between(&original, &original).is_identical());
}

#[test]
fn test_diff_from_container() {
    let mut c = container(blank_image(ROM_SIZE));
    c.write_bytes(BANK_SIZE + 5, &[1, 2]).unwrap();
    c.write_u8(BANK_SIZE + 7, 0x00).unwrap();
    c.expand(ROM_SIZE + BANK_SIZE, 0xFF).unwrap();

    let report = DiffReport::from_container(&c);
    assert_eq!(report.bytes_changed, 2, "rewriting a byte with its old value is no change");
    assert_eq!(report.appended, BANK_SIZE);
    assert_eq!(report.regions[0].start, BANK_SIZE + 5);
    assert_eq!(report.regions[0].address, Some(CartAddress::new(0x01, 0x8005)));
    assert_eq!(report.banks[&1], 2);
    assert_eq!(report.banks[&4], BANK_SIZE);
}

fn sample_tiles() -> Vec<Tile> {
    (0..4u8)
        .map(|t| {
            let mut pixels = [0u8; 64];
            for (i, p) in pixels.iter_mut().enumerate() {
                *p = (i as u8 / 4 + t) % 16;
            }
            Tile::new(pixels)
        })
        .collect()
}

fn graphics_set(tiles: usize) -> GraphicsSet {
    GraphicsSet {
        name: "font".into(),
        offset: 0x2000,
        tiles,
        depth: BitDepth::Four,
        palette_offset: None,
        palette_colors: None,
        columns: 2,
    }
}

#[test]
fn test_graphics_export_import() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("font.png");
    let bytes = TileCodec::encode_many(BitDepth::Four, &sample_tiles()).unwrap();
    let mut c = container(blank_image(ROM_SIZE));
    c.write_bytes(0x2000, &bytes).unwrap();
    let set = graphics_set(4);
    assert_eq!(set.byte_len(), 128);

    let sheet = export_graphics(&c, &set, &path).unwrap();
    assert_eq!(sheet.dimensions(), (16, 16));
    assert_eq!(sheet.get_pixel(0, 0).0, [0, 0, 0, 255]);
    assert!(path.exists());

    c.fill(0x2000, bytes.len(), 0).unwrap();
    assert_eq!(import_graphics(&mut c, &set, &path).unwrap(), 4);
    assert_eq!(c.read_bytes(0x2000, bytes.len()).unwrap(), bytes);
}

#[test]
fn test_graphics_round_trip_with_repeated_palette_colours() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shaded.png");
    let bytes = TileCodec::encode_many(BitDepth::Four, &sample_tiles()).unwrap();
    let mut c = container(blank_image(ROM_SIZE));
    c.write_bytes(0x2000, &bytes).unwrap();
    // Sixteen entries alternating black and white.
    let palette: Vec<u8> = (0..16u16).flat_map(|i| if i % 2 == 0 { [0x00, 0x00] } else { [0xFF, 0x7F] }).collect();
    c.write_bytes(0x3000, &palette).unwrap();
    let set = GraphicsSet {
        palette_offset: Some(0x3000),
        ..graphics_set(4)
    };

    export_graphics(&c, &set, &path).unwrap();
    assert_eq!(import_graphics(&mut c, &set, &path).unwrap(), 4);
    assert_eq!(c.read_bytes(0x2000, bytes.len()).unwrap(), bytes);
}

#[test]
fn test_graphics_import_rejects_extra_tiles() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("big.png");
    let mut tiles = sample_tiles();
    tiles.push(Tile::filled(5));
    save_png(&render_tile_sheet(&tiles, &grey_ramp(16), 2, false), &path).unwrap();

    let mut c = container(blank_image(ROM_SIZE));
    let err = import_graphics(&mut c, &graphics_set(4), &path).unwrap_err();
    assert!(matches!(err, RomError::CapacityExceeded { required: 6, available: 4, .. }));
    assert!(!c.is_dirty());

    // A blank padding tile past the end is dropped.
    tiles.pop();
    tiles.push(Tile::filled(0));
    save_png(&render_tile_sheet(&tiles, &grey_ramp(16), 2, false), &path).unwrap();
    assert_eq!(import_graphics(&mut c, &graphics_set(4), &path).unwrap(), 4);
}
