//! Integration tests for game profiles

mod common;

use common::{blank_container, sample_table_text};
use romkit_core::rom::{CartAddress, BANK_SIZE};
use romkit_core::{ErrorKind, GameProfile, PayloadEnd, PointerSize, RomError, RomOffset, TextCodec, UnmappedPolicy};
use tempfile::TempDir;

const PROFILE: &str = r#"{
    "name": "Example Quest",
    "table": "example.tbl",
    "text_banks": [
        { "name": "dialog", "pointer_table": "$03:8000", "count": 256,
          "pointer_size": 2, "end": { "terminator": 0 } },
        { "name": "items", "pointer_table": 33024, "count": 64,
          "pointer_size": 3, "end": "next_pointer", "limits": { "max_bytes": 12 } }
    ],
    "free_space": [ { "start": "$03:F000", "end": "$04:8000" } ],
    "graphics": [ { "name": "font", "offset": "$02:8000", "tiles": 128, "bpp": 2 } ],
    "shuffles": [
        { "name": "chests", "offset": 4096, "record_size": 4, "count": 32,
          "field_offset": 1, "field_len": 2, "preserve": [255] }
    ]
}"#;

fn assert_config_error(json: &str) {
    let err = GameProfile::from_json(json).unwrap_err();
    assert!(matches!(err, RomError::Config { .. }), "{:?}", err);
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn test_offsets_accept_numbers_and_addresses() {
    assert_eq!(serde_json::from_str::<RomOffset>("4096").unwrap(), RomOffset::Linear(4096));
    assert_eq!(
        serde_json::from_str::<RomOffset>("\"$03:8000\"").unwrap(),
        RomOffset::Address(CartAddress::new(0x03, 0x8000))
    );
    assert!(serde_json::from_str::<RomOffset>("\"$03:ZZZZ\"").is_err());

    let c = blank_container();
    assert_eq!(RomOffset::Address(CartAddress::new(0x83, 0x8010)).resolve(c.mapper()).unwrap(), 3 * BANK_SIZE + 0x10);
    let err = RomOffset::Address(CartAddress::new(0x00, 0x1000)).resolve(c.mapper()).unwrap_err();
    assert!(matches!(err, RomError::AddressOutOfRange { .. }));
}

#[test]
fn test_text_banks_from_profile() {
    let profile = GameProfile::from_json(PROFILE).unwrap();
    let c = blank_container();

    let dialog = profile.text_bank("dialog", c.mapper()).unwrap();
    assert_eq!(dialog.table.table_offset, 3 * BANK_SIZE);
    assert_eq!(dialog.table.count, 256);
    assert_eq!(dialog.table.pointer_size, PointerSize::Two);
    assert_eq!(dialog.table.bank, 0x03);
    assert_eq!(dialog.end, PayloadEnd::Terminator(0));
    assert_eq!(dialog.relocation_bounds(), Some(3 * BANK_SIZE..4 * BANK_SIZE));

    // A linear table offset takes its bank from the mapped address.
    let items = profile.text_bank("items", c.mapper()).unwrap();
    assert_eq!(items.table.table_offset, 0x8100);
    assert_eq!(items.table.bank, 0x01);
    assert_eq!(items.end, PayloadEnd::NextPointer);
    assert_eq!(items.limits.max_bytes, Some(12));
    assert_eq!(items.relocation_bounds(), None);

    let err = profile.text_bank("credits", c.mapper()).unwrap_err();
    assert!(matches!(err, RomError::Config { .. }));
}

#[test]
fn test_free_space_may_end_at_image_end() {
    let profile = GameProfile::from_json(PROFILE).unwrap();
    let c = blank_container();
    let free = profile.free_space(c.mapper()).unwrap();
    assert_eq!(free.iter().collect::<Vec<_>>(), vec![3 * BANK_SIZE + 0x7000..4 * BANK_SIZE]);

    let backwards = r#"{ "free_space": [ { "start": 4096, "end": 4096 } ] }"#;
    let profile = GameProfile::from_json(backwards).unwrap();
    assert!(matches!(profile.free_space(c.mapper()), Err(RomError::Config { .. })));
}

#[test]
fn test_graphics_and_shuffles_from_profile() {
    let profile = GameProfile::from_json(PROFILE).unwrap();
    let c = blank_container();

    let font = profile.graphics_set("font", c.mapper()).unwrap();
    assert_eq!(font.offset, 2 * BANK_SIZE);
    assert_eq!(font.byte_len(), 128 * 16);
    assert_eq!(font.palette_offset, None);
    assert_eq!(font.columns, 16);
    assert!(profile.graphics_set("portraits", c.mapper()).is_err());

    let tables = profile.shuffle_tables(c.mapper()).unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].offset, 4096);
    assert_eq!(tables[0].preserve, vec![255]);
    assert!(tables[0].validate().is_ok());
}

#[test]
fn test_invalid_profiles() {
    assert_config_error("{ \"name\": ");
    assert_config_error(r#"{ "graphics": [ { "name": "x", "offset": 0, "tiles": 1, "bpp": 5 } ] }"#);
    assert_config_error(
        r#"{ "text_banks": [
            { "name": "a", "pointer_table": 0, "count": 1, "pointer_size": 2, "end": "next_pointer" },
            { "name": "a", "pointer_table": 8, "count": 1, "pointer_size": 2, "end": "next_pointer" }
        ] }"#,
    );
    assert_config_error(r#"{ "text_banks": [ { "name": "a", "pointer_table": 0, "count": 1, "pointer_size": 4, "end": "next_pointer" } ] }"#);
    assert_config_error(r#"{ "save_layout": { "slot_size": 16 } }"#);
}

#[test]
fn test_empty_profile_uses_defaults() {
    let profile = GameProfile::from_json("{}").unwrap();
    assert!(profile.text_banks.is_empty());
    assert_eq!(profile.table_path(), None);
    assert!(profile.load_table(None).unwrap().is_none());
    assert!(profile.matches(&blank_container()));
}

#[test]
fn test_profile_on_disk() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("example.tbl"), sample_table_text()).unwrap();
    let path = dir.path().join("profile.json");
    std::fs::write(&path, PROFILE).unwrap();

    let profile = GameProfile::load(&path).unwrap();
    assert_eq!(profile.name, "Example Quest");
    assert_eq!(profile.table_path(), Some(dir.path().join("example.tbl")));
    let table = profile.load_table(None).unwrap().unwrap();
    let codec = TextCodec::new(&table);
    assert_eq!(codec.encode("Hi", UnmappedPolicy::Error).unwrap(), vec![b'H', b'i', 0x00]);

    let copy = dir.path().join("out").join("copy.json");
    profile.save(&copy).unwrap();
    let reloaded = GameProfile::load(&copy).unwrap();
    assert_eq!(reloaded.text_banks, profile.text_banks);
    assert_eq!(reloaded.free_space, profile.free_space);
    assert_eq!(reloaded.shuffles, profile.shuffles);

    let err = GameProfile::load(&dir.path().join("missing.json")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn test_profile_matches_image_hash() {
    let c = blank_container();
    let hash = c.sha256();
    let json = format!(r#"{{ "name": "x", "expected_sha256": "{}" }}"#, hash.to_uppercase());
    assert!(GameProfile::from_json(&json).unwrap().matches(&c));

    let json = format!(r#"{{ "name": "x", "expected_sha256": "{}" }}"#, "00".repeat(32));
    assert!(!GameProfile::from_json(&json).unwrap().matches(&c));
}
