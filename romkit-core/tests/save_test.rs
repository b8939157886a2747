//! Integration tests for save-RAM images

use proptest::prelude::*;
use romkit_core::save::{
    compute_checksum, format_play_time, Character, EquipmentKind, FlagKind, Location, SaveImage, SaveLayout,
    SlotStatus, SlotSummary,
};
use romkit_core::{ErrorKind, RomError};

const IMAGE_SIZE: usize = 8 * 1024;

/// A record holding only the signature, with a correct checksum.
fn signed_record(layout: &SaveLayout) -> Vec<u8> {
    let mut record = vec![0u8; layout.slot_size];
    record[..4].copy_from_slice(&layout.signature);
    let checksum = compute_checksum(&record, layout.checksum_offset);
    record[layout.checksum_offset..layout.checksum_offset + 2].copy_from_slice(&checksum.to_le_bytes());
    record
}

/// Slot 0 initialized, slots 1-2 and the backup blank, trailing bytes patterned.
fn fresh_image() -> SaveImage {
    let layout = SaveLayout::default();
    let mut bytes = vec![0u8; IMAGE_SIZE];
    for (i, b) in bytes[layout.required_len()..].iter_mut().enumerate() {
        *b = i as u8;
    }
    let mut image = SaveImage::parse(&bytes, &layout).unwrap();
    image.initialize_slot(0).unwrap();
    image
}

fn hero() -> Character {
    Character {
        id: 0,
        level: 5,
        hp: 30,
        max_hp: 50,
        mp: 3,
        max_mp: 10,
        experience: 1234,
        attack: 12,
        defense: 9,
        speed: 7,
        magic: 4,
        status: 0,
        equipment: [1, 2, 3, 4, 5],
        spells: 0,
        name: b"HERO".to_vec(),
    }
}

#[test]
fn test_signature_only_checksum() {
    let layout = SaveLayout::default();
    let record = signed_record(&layout);
    let expected: u16 = b"FF0!".iter().map(|&b| b as u16).sum();
    assert_eq!(compute_checksum(&record, layout.checksum_offset), expected);
    assert_eq!(u16::from_le_bytes([record[0x3FE], record[0x3FF]]), expected);

    let mut bytes = record.clone();
    bytes.resize(IMAGE_SIZE, 0);
    let image = SaveImage::parse(&bytes, &layout).unwrap();
    assert_eq!(image.slot(0).unwrap().status(), SlotStatus::Valid);
    assert!(image.slot(0).unwrap().verify(&layout).is_ok());
}

#[test]
fn test_slot_classification() {
    let layout = SaveLayout::default();
    let mut bytes = vec![0u8; IMAGE_SIZE];
    let good = signed_record(&layout);
    bytes[..0x400].copy_from_slice(&good);
    bytes[0x400..0x800].fill(0xFF);
    bytes[0x800..0xC00].copy_from_slice(&good);
    bytes[0x800 + 0x100] = 7; // checksum now stale
    bytes[0xC00..0xC04].copy_from_slice(b"XXXX");

    let image = SaveImage::parse(&bytes, &layout).unwrap();
    assert_eq!(image.slots().len(), 3);
    assert_eq!(image.slot(0).unwrap().status(), SlotStatus::Valid);
    assert_eq!(image.slot(1).unwrap().status(), SlotStatus::Empty);
    assert!(matches!(image.slot(2).unwrap().status(), SlotStatus::BadChecksum { .. }));
    assert_eq!(image.backup().unwrap().status(), SlotStatus::BadSignature);
}

#[test]
fn test_bad_checksum_is_an_integrity_error() {
    let layout = SaveLayout::default();
    let mut bytes = vec![0u8; IMAGE_SIZE];
    bytes[..0x400].copy_from_slice(&signed_record(&layout));
    bytes[0x10] = 1;

    let image = SaveImage::parse(&bytes, &layout).unwrap();
    let err = image.slot(0).unwrap().verify(&layout).unwrap_err();
    assert!(matches!(err, RomError::ChecksumMismatch { expected: 0xDD, actual: 0xDE, .. }));
    assert_eq!(err.kind(), ErrorKind::Integrity);
    assert_eq!(err.kind().exit_code(), 5);

    let err = image.slot(1).unwrap().verify(&layout).unwrap_err();
    assert!(matches!(err, RomError::SignatureMismatch { slot: 1, .. }));
}

#[test]
fn test_serialize_round_trip_keeps_unknown_bytes() {
    let layout = SaveLayout::default();
    let mut bytes: Vec<u8> = (0..IMAGE_SIZE).map(|i| (i * 31) as u8).collect();
    let good = signed_record(&layout);
    bytes[..4].copy_from_slice(&good[..4]);
    let checksum = compute_checksum(&bytes[..0x400], layout.checksum_offset);
    bytes[0x3FE..0x400].copy_from_slice(&checksum.to_le_bytes());

    let image = SaveImage::parse(&bytes, &layout).unwrap();
    assert_eq!(image.slot(0).unwrap().status(), SlotStatus::Valid);
    assert_eq!(image.serialize(), bytes);
}

#[test]
fn test_serialize_repairs_signed_slots_only() {
    let layout = SaveLayout::default();
    let mut bytes = vec![0u8; IMAGE_SIZE];
    bytes[..0x400].copy_from_slice(&signed_record(&layout));
    bytes[0x10] = 1;
    bytes[0x400..0x404].copy_from_slice(b"JUNK");

    let out = SaveImage::parse(&bytes, &layout).unwrap().serialize();
    assert_eq!(out[0x400..0x800], bytes[0x400..0x800]);
    let reparsed = SaveImage::parse(&out, &layout).unwrap();
    assert_eq!(reparsed.slot(0).unwrap().status(), SlotStatus::Valid);
    assert_eq!(reparsed.slot(1).unwrap().status(), SlotStatus::BadSignature);
}

#[test]
fn test_invalid_sizes() {
    let layout = SaveLayout::default();
    let err = SaveImage::parse(&vec![0u8; 3000], &layout).unwrap_err();
    assert!(matches!(err, RomError::InvalidSaveSize { size: 3000, required: 4096 }));
    assert_eq!(err.kind(), ErrorKind::Format);
    assert!(SaveImage::parse(&vec![0u8; 2048], &layout).is_err(), "too small for four records");
    assert!(SaveImage::parse(&vec![0u8; 6144], &layout).is_err(), "not a power of two");
    assert!(SaveImage::parse(&vec![0u8; 4096], &layout).is_ok());
}

#[test]
fn test_inconsistent_layout_is_rejected() {
    let layout = SaveLayout {
        checksum_offset: 0x300,
        ..SaveLayout::default()
    };
    let err = SaveImage::parse(&vec![0u8; IMAGE_SIZE], &layout).unwrap_err();
    assert!(matches!(err, RomError::Config { .. }));
}

#[test]
fn test_initialized_slot() {
    let image = fresh_image();
    let layout = image.layout().clone();
    let slot = image.slot(0).unwrap();
    assert!(slot.status().is_valid());
    assert_eq!(slot.currency(&layout), 0);
    assert!(slot.inventory(&layout).is_empty());
    assert_eq!(slot.character(&layout, 0).unwrap(), None);
    assert!(image.slot(1).unwrap().status() == SlotStatus::Empty);
}

#[test]
fn test_scalar_mutators_keep_checksum_valid() {
    let mut image = fresh_image();
    image.set_currency(0, 50_000).unwrap();
    image.set_play_time(0, 3725).unwrap();
    image
        .set_location(0, Location { map: 3, x: 10, y: 20 })
        .unwrap();
    image.set_party_leader(0, 2).unwrap();

    let layout = image.layout().clone();
    let bytes = image.serialize();
    let reparsed = SaveImage::parse(&bytes, &layout).unwrap();
    let slot = reparsed.slot(0).unwrap();
    assert!(slot.status().is_valid());
    assert_eq!(slot.currency(&layout), 50_000);
    assert_eq!(format_play_time(slot.play_time(&layout)), "1:02:05");
    assert_eq!(slot.location(&layout), Location { map: 3, x: 10, y: 20 });
    assert_eq!(slot.party_leader(&layout), 2);
}

#[test]
fn test_currency_limit() {
    let mut image = fresh_image();
    let err = image.set_currency(0, 10_000_000).unwrap_err();
    assert!(matches!(err, RomError::CapacityExceeded { .. }));
    assert_eq!(err.kind().exit_code(), 6);
}

#[test]
fn test_inventory_stacks_and_removes() {
    let mut image = fresh_image();
    assert_eq!(image.give_item(0, 0x10, 5).unwrap(), 5);
    assert_eq!(image.give_item(0, 0x20, 1).unwrap(), 1);
    assert_eq!(image.give_item(0, 0x10, 3).unwrap(), 8);
    let layout = image.layout().clone();
    assert_eq!(image.slot(0).unwrap().inventory(&layout), vec![(0x10, 8), (0x20, 1)]);

    assert!(image.give_item(0, 0x10, 95).is_err(), "stack limit is 99");
    assert!(image.give_item(0, 0xFF, 1).is_err(), "FF marks an empty entry");

    assert_eq!(image.remove_item(0, 0x10, 10).unwrap(), 0);
    assert_eq!(image.slot(0).unwrap().item_quantity(&layout, 0x10), 0);
    assert_eq!(image.slot(0).unwrap().inventory(&layout), vec![(0x20, 1)]);
    assert_eq!(image.remove_item(0, 0x33, 1).unwrap(), 0);
    assert!(image.slot(0).unwrap().status().is_valid());
}

#[test]
fn test_full_inventory() {
    let mut image = fresh_image();
    for id in 0..16u8 {
        image.give_item(0, id, 1).unwrap();
    }
    let err = image.give_item(0, 0x40, 1).unwrap_err();
    assert!(matches!(err, RomError::CapacityExceeded { required: 17, available: 16, .. }));
}

#[test]
fn test_character_edits() {
    let mut image = fresh_image();
    image.set_character(0, 1, &hero()).unwrap();
    image.learn_spell(0, 1, 3).unwrap();
    image.learn_spell(0, 1, 15).unwrap();
    image.forget_spell(0, 1, 3).unwrap();
    image.set_level(0, 1, 41).unwrap();
    assert_eq!(image.heal_party(0).unwrap(), 1);

    let layout = image.layout().clone();
    let c = image.slot(0).unwrap().character(&layout, 1).unwrap().unwrap();
    assert_eq!(c.level, 41);
    assert_eq!(c.hp, 50);
    assert_eq!(c.mp, 10);
    assert_eq!(c.spells, 1 << 15);
    assert_eq!(&c.name[..4], b"HERO");
    assert_eq!(c.name.len(), 8);
    assert!(image.slot(0).unwrap().status().is_valid());

    assert!(image.set_level(0, 1, 42).is_err());
    assert!(image.set_level(0, 1, 0).is_err());
    assert!(image.learn_spell(0, 1, 16).is_err());
    assert!(image.learn_spell(0, 2, 0).is_err(), "record 2 is unused");
    assert!(image.set_character(0, 5, &hero()).is_err());

    let mut long_name = hero();
    long_name.name = b"NINECHARS".to_vec();
    assert!(image.set_character(0, 0, &long_name).is_err());
}

#[test]
fn test_flags_and_equipment() {
    let mut image = fresh_image();
    image.set_flag(0, FlagKind::Story, 9, true).unwrap();
    image.set_flag(0, FlagKind::Chest, 255, true).unwrap();
    assert!(image.flag(0, FlagKind::Story, 9).unwrap());
    assert!(!image.flag(0, FlagKind::Story, 8).unwrap());
    assert!(image.flag(0, FlagKind::Chest, 255).unwrap());
    assert!(image.set_flag(0, FlagKind::Npc, 128, true).is_err());

    image.grant_equipment(0, EquipmentKind::Weapon, 4, true).unwrap();
    assert!(image.owns_equipment(0, EquipmentKind::Weapon, 4).unwrap());
    image.grant_equipment(0, EquipmentKind::Weapon, 4, false).unwrap();
    assert!(!image.owns_equipment(0, EquipmentKind::Weapon, 4).unwrap());
    image.grant_equipment(0, EquipmentKind::KeyItem, 31, true).unwrap();
    assert!(image.has_key_item(0, 31).unwrap());
    assert!(!image.has_key_item(0, 30).unwrap());

    // Flag bits are least-significant first.
    let layout = image.layout().clone();
    let bytes = image.serialize();
    assert_eq!(bytes[layout.story_flags.offset + 1], 0b0000_0010);
}

#[test]
fn test_unsigned_slot_cannot_be_edited() {
    let mut image = fresh_image();
    let err = image.set_currency(1, 10).unwrap_err();
    assert!(matches!(err, RomError::SignatureMismatch { slot: 1, .. }));
    assert!(image.set_currency(7, 10).is_err());
}

#[test]
fn test_backup_and_restore() {
    let mut image = fresh_image();
    image.set_currency(0, 777).unwrap();
    image.backup_slot(0).unwrap();
    image.set_currency(0, 1).unwrap();

    image.restore_backup(0).unwrap();
    let layout = image.layout().clone();
    assert_eq!(image.slot(0).unwrap().currency(&layout), 777);
    image.restore_backup(2).unwrap();
    assert_eq!(image.slot(2).unwrap().currency(&layout), 777);
    assert!(image.slot(2).unwrap().status().is_valid());
}

#[test]
fn test_restore_from_blank_backup_fails() {
    let mut image = fresh_image();
    let err = image.restore_backup(0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity);
}

#[test]
fn test_copy_slot() {
    let mut image = fresh_image();
    image.give_item(0, 0x05, 2).unwrap();
    image.copy_slot(0, 1).unwrap();
    let layout = image.layout().clone();
    assert_eq!(image.slot(1).unwrap().inventory(&layout), vec![(0x05, 2)]);
}

#[test]
fn test_summary_json_applies_to_another_slot() {
    let mut image = fresh_image();
    image.set_character(0, 0, &hero()).unwrap();
    image.give_item(0, 0x07, 9).unwrap();
    image.set_flag(0, FlagKind::Npc, 2, true).unwrap();
    image.set_currency(0, 42).unwrap();

    let json = serde_json::to_string(&image.summary(0).unwrap()).unwrap();
    let summary: SlotSummary = serde_json::from_str(&json).unwrap();

    image.initialize_slot(1).unwrap();
    image.apply_summary(1, &summary).unwrap();
    let copied = image.summary(1).unwrap();
    assert_eq!(copied.currency, 42);
    assert_eq!(copied.inventory, vec![(0x07, 9)]);
    assert_eq!(copied.npc_flags, vec![2]);
    assert_eq!(copied.characters[0].as_ref().map(|c| c.level), Some(5));
    assert!(image.slot(1).unwrap().status().is_valid());
}

#[test]
fn test_failed_summary_leaves_slot_untouched() {
    let mut image = fresh_image();
    image.set_currency(0, 10).unwrap();
    let before = image.slot(0).unwrap().clone();

    let mut summary = image.summary(0).unwrap();
    summary.play_time = 9999;
    summary.currency = 777;
    summary.inventory = (0..40).map(|i| (i as u8, 1)).collect();
    let err = image.apply_summary(0, &summary).unwrap_err();
    assert!(matches!(err, RomError::CapacityExceeded { .. }));
    assert_eq!(image.slot(0).unwrap(), &before);

    let layout = image.layout().clone();
    let reparsed = SaveImage::parse(&image.serialize(), &layout).unwrap();
    assert_eq!(reparsed.slot(0).unwrap().currency(&layout), 10);
    assert_eq!(reparsed.slot(0).unwrap().play_time(&layout), 0);
}

#[test]
fn test_summary_flag_outside_field_is_rejected() {
    let mut image = fresh_image();
    let before = image.slot(0).unwrap().clone();
    let mut summary = image.summary(0).unwrap();
    summary.story_flags = vec![3, 128];
    let err = image.apply_summary(0, &summary).unwrap_err();
    assert!(matches!(err, RomError::OutOfBounds { offset: 128, size: 128, .. }));
    assert_eq!(image.slot(0).unwrap(), &before);

    summary.story_flags = vec![3];
    summary.weapons = vec![16];
    assert!(image.apply_summary(0, &summary).is_err());
    assert!(!image.flag(0, FlagKind::Story, 3).unwrap());
}

#[test]
fn test_every_character_field_must_fit_the_record() {
    let defaults = SaveLayout::default();
    let (stride, slot_size) = (defaults.characters.stride, defaults.slot_size);
    let cases: [fn(&mut SaveLayout, usize); 4] = [
        |l, at| l.characters.fields.hp = at,
        |l, at| l.characters.fields.id = at,
        |l, at| l.characters.fields.magic = at,
        |l, at| l.characters.fields.level = at,
    ];
    for set in cases {
        let mut layout = SaveLayout::default();
        set(&mut layout, slot_size + 10);
        assert!(layout.validate().is_err());
        let err = SaveImage::parse(&vec![0u8; IMAGE_SIZE], &layout).unwrap_err();
        assert!(matches!(err, RomError::Config { .. }));

        let mut layout = SaveLayout::default();
        set(&mut layout, stride);
        assert!(layout.validate().is_err());
    }

    let mut layout = SaveLayout::default();
    layout.characters.fields.hp = stride - 1;
    assert!(layout.validate().is_err(), "a 16-bit field needs two bytes");
}

#[test]
fn test_layout_offsets_cannot_overflow() {
    let mut layout = SaveLayout::default();
    layout.currency_offset = usize::MAX - 1;
    assert!(layout.validate().is_err());

    let mut layout = SaveLayout::default();
    layout.characters.count = usize::MAX;
    assert!(layout.validate().is_err());

    let mut layout = SaveLayout::default();
    layout.checksum_offset = usize::MAX;
    assert!(layout.validate().is_err());

    let mut layout = SaveLayout::default();
    layout.signature.clear();
    assert!(layout.validate().is_err());
}

/// Four records with random contents; signed ones carry a correct checksum.
fn random_image() -> impl Strategy<Value = Vec<u8>> {
    let layout = SaveLayout::default();
    let records = proptest::collection::vec(
        (proptest::collection::vec(any::<u8>(), layout.slot_size), any::<bool>()),
        layout.record_count(),
    );
    let trailer = proptest::collection::vec(any::<u8>(), IMAGE_SIZE - layout.required_len());
    (records, trailer).prop_map(move |(records, trailer)| {
        let mut bytes = Vec::with_capacity(IMAGE_SIZE);
        for (mut record, signed) in records {
            if signed {
                record[..4].copy_from_slice(&layout.signature);
                let checksum = compute_checksum(&record, layout.checksum_offset);
                record[layout.checksum_offset..layout.checksum_offset + 2].copy_from_slice(&checksum.to_le_bytes());
            } else {
                record[0] = 0;
            }
            bytes.extend_from_slice(&record);
        }
        bytes.extend_from_slice(&trailer);
        bytes
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_parse_serialize_identity(bytes in random_image()) {
        let layout = SaveLayout::default();
        let image = SaveImage::parse(&bytes, &layout).unwrap();
        let out = image.serialize();
        prop_assert_eq!(&out, &bytes);
        prop_assert_eq!(SaveImage::parse(&out, &layout).unwrap(), image);
    }

    #[test]
    fn test_edited_image_reparses_identically(
        currency in 0u32..=9_999_999,
        play_time in any::<u32>(),
        flag in 0usize..128,
        item in 0u8..0xFF,
        quantity in 1u8..=99,
    ) {
        let mut image = fresh_image();
        image.set_currency(0, currency).unwrap();
        image.set_play_time(0, play_time).unwrap();
        image.set_flag(0, FlagKind::Story, flag, true).unwrap();
        image.give_item(0, item, quantity).unwrap();

        let layout = image.layout().clone();
        let reparsed = SaveImage::parse(&image.serialize(), &layout).unwrap();
        prop_assert!(reparsed.slot(0).unwrap().status().is_valid());
        prop_assert_eq!(reparsed, image);
    }
}
