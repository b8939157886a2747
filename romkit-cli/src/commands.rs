// CLI command handlers
use crate::{AudioCommand, GfxCommand, PatchCommand, SaveCommand, TextCommand};
use anyhow::{anyhow, bail, Context, Result};
use log::debug;
use romkit_core::audio::{write_wav, BrrSample};
use romkit_core::compress;
use romkit_core::config::{GameProfile, RomOffset};
use romkit_core::patch::{Patch, PatchFormat, PatchInfo, RecordOptions};
use romkit_core::pipeline::{
    export_graphics, extract_texts, import_graphics, CommitOptions, CommitReport, DialogEditor, DiffReport,
    ExtractReport, FreeSpaceMap, GraphicsSet, Randomizer, ShuffleLog, TextBank,
};
use romkit_core::rom::{CartAddress, Container, InternalHeader, SaveOptions};
use romkit_core::save::{format_play_time, EquipmentKind, FlagKind, SaveImage, SaveLayout, SlotStatus, SlotSummary};
use romkit_core::text::{CharTable, DecodeOptions, TextCodec, UnmappedPolicy};
use romkit_core::AudioCodec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn open_rom(path: &Path) -> Result<Container> {
    debug!("Opening {}", path.display());
    Container::open(path).with_context(|| format!("Failed to open cartridge image: {}", path.display()))
}

fn load_profile(path: &Path) -> Result<GameProfile> {
    GameProfile::load(path).with_context(|| format!("Failed to load profile: {}", path.display()))
}

fn load_table(path: &Path) -> Result<CharTable> {
    CharTable::load(path).with_context(|| format!("Failed to load character table: {}", path.display()))
}

fn profile_table(profile: &GameProfile, container: &Container) -> Result<CharTable> {
    profile
        .load_table(Some(container))?
        .ok_or_else(|| anyhow!("profile {:?} names no character table", profile.name))
}

fn save_rom(container: &Container, output: &Path) -> Result<()> {
    container
        .save(output, SaveOptions::default())
        .with_context(|| format!("Failed to write image: {}", output.display()))
}

/// `$BB:OOOO` / `BB:OOOO` are cartridge addresses; `0x` hex and plain decimal are
/// logical offsets.
pub fn parse_location(text: &str) -> Result<RomOffset> {
    let text: &str = text.trim();
    if text.starts_with('$') || text.contains(':') {
        return Ok(RomOffset::Address(text.parse::<CartAddress>()?));
    }
    let value: usize = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => text.parse::<usize>(),
    }
    .with_context(|| format!("Invalid offset: {}", text))?;
    Ok(RomOffset::Linear(value))
}

/// Split `A:B` into two numbers.
fn parse_pair(text: &str) -> Result<(usize, usize)> {
    let (a, b) = text
        .split_once(':')
        .ok_or_else(|| anyhow!("expected A:B, got {:?}", text))?;
    Ok((a.trim().parse()?, b.trim().parse()?))
}

fn parse_hex_bytes(text: &str) -> Result<Vec<u8>> {
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        bail!("hex string has an odd number of digits");
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).with_context(|| format!("Invalid hex byte {:?}", &digits[i..i + 2])))
        .collect()
}

#[derive(Serialize)]
struct InfoReport {
    path: String,
    file_size: usize,
    copier_header: bool,
    logical_size: usize,
    banks: usize,
    sha256: String,
    crc32: String,
    header: Option<InternalHeader>,
    header_checksum_valid: Option<bool>,
    computed_checksum: u16,
    profile_match: Option<bool>,
}

pub fn info(rom: &Path, profile: Option<&Path>, json: bool) -> Result<()> {
    let container: Container = open_rom(rom)?;
    let header: Option<InternalHeader> = container.header().ok();
    let computed: u16 = romkit_core::rom::compute_checksum(container.working());
    let profile_match: Option<bool> = match profile {
        Some(path) => Some(load_profile(path)?.matches(&container)),
        None => None,
    };
    let report = InfoReport {
        path: rom.display().to_string(),
        file_size: container.len() + container.copier_header().len(),
        copier_header: container.mapper().has_header(),
        logical_size: container.len(),
        banks: container.len() / romkit_core::rom::BANK_SIZE,
        sha256: container.sha256(),
        crc32: format!("{:08x}", container.crc32()),
        header_checksum_valid: header.as_ref().map(|h| h.checksum == computed && h.is_consistent()),
        header,
        computed_checksum: computed,
        profile_match,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("Image: {}", report.path);
    println!("  File size: {} bytes", report.file_size);
    println!("  Copier header: {}", if report.copier_header { "yes (512 bytes)" } else { "no" });
    println!("  Logical size: {} KiB ({} banks)", report.logical_size / 1024, report.banks);
    println!("  SHA-256: {}", report.sha256);
    println!("  CRC32: {}", report.crc32);
    if let Some(header) = &report.header {
        println!("  Title: {}", header.title);
        println!("  Map mode: 0x{:02X} ({})", header.map_mode, if header.is_lorom() { "LoROM" } else { "not LoROM" });
        println!("  Region: {}", header.region_name());
        println!("  Version: 1.{}", header.version);
        println!(
            "  Checksum: 0x{:04X} (complement 0x{:04X}, computed 0x{:04X}) {}",
            header.checksum,
            header.complement,
            report.computed_checksum,
            if report.header_checksum_valid == Some(true) { "OK" } else { "MISMATCH" }
        );
    }
    if let Some(matched) = report.profile_match {
        println!("  Profile match: {}", if matched { "yes" } else { "NO" });
    }
    Ok(())
}

pub fn fix_checksum(rom: &Path, output: &Path) -> Result<()> {
    let mut container: Container = open_rom(rom)?;
    let checksum: u16 = romkit_core::rom::fix_checksum(&mut container)?;
    save_rom(&container, output)?;
    println!("Checksum set to 0x{:04X}; wrote {}", checksum, output.display());
    Ok(())
}

pub fn addr(rom: &Path, value: &str, linear: bool) -> Result<()> {
    let container: Container = open_rom(rom)?;
    let mapper = container.mapper();
    if linear {
        let hex: &str = value.trim_start_matches("0x").trim_start_matches("0X");
        let offset: usize = usize::from_str_radix(hex, 16).with_context(|| format!("Invalid offset: {}", value))?;
        let address: CartAddress = mapper.from_linear(offset)?;
        println!("0x{:06X} -> {}", offset, address);
    } else {
        let address: CartAddress = value.parse()?;
        println!(
            "{} -> linear 0x{:06X}, logical 0x{:06X}",
            address,
            mapper.to_linear(address)?,
            mapper.to_logical(address)?
        );
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
struct TextEdit {
    index: usize,
    text: String,
}

fn bank_and_space(profile: &GameProfile, container: &Container, bank: &str) -> Result<(TextBank, FreeSpaceMap)> {
    Ok((
        profile.text_bank(bank, container.mapper())?,
        profile.free_space(container.mapper())?,
    ))
}

pub fn text(action: TextCommand) -> Result<()> {
    match action {
        TextCommand::Extract {
            rom,
            profile,
            bank,
            output,
        } => {
            let container: Container = open_rom(&rom)?;
            let profile: GameProfile = load_profile(&profile)?;
            let table: CharTable = profile_table(&profile, &container)?;
            let codec: TextCodec<'_> = TextCodec::new(&table);
            let bank: TextBank = profile.text_bank(&bank, container.mapper())?;
            let report: ExtractReport = extract_texts(&container, &bank, &codec);
            for (index, err) in &report.errors {
                eprintln!("  #{}: {}", index, err);
            }
            let json: String = serde_json::to_string_pretty(&report.entries)?;
            match output {
                Some(path) => {
                    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Extracted {} strings to {}", report.entries.len(), path.display());
                }
                None => println!("{}", json),
            }
            Ok(())
        }
        TextCommand::Insert {
            rom,
            profile,
            bank,
            input,
            output,
            expand,
            fill,
            skip_unmapped,
        } => {
            let mut container: Container = open_rom(&rom)?;
            let profile: GameProfile = load_profile(&profile)?;
            let table: CharTable = profile_table(&profile, &container)?;
            let codec: TextCodec<'_> = TextCodec::new(&table);
            let (bank, mut free) = bank_and_space(&profile, &container, &bank)?;

            let json: String =
                fs::read_to_string(&input).with_context(|| format!("Failed to read edits: {}", input.display()))?;
            let edits: Vec<TextEdit> = serde_json::from_str(&json).context("Failed to parse edits")?;
            let mut editor: DialogEditor = DialogEditor::new(bank);
            for edit in edits {
                editor.stage(edit.index, edit.text)?;
            }

            let options = CommitOptions {
                fill_freed: fill.as_deref().map(|f| u8::from_str_radix(f, 16)).transpose()?,
                allow_expansion: expand,
                unmapped: if skip_unmapped { UnmappedPolicy::Skip } else { UnmappedPolicy::Error },
                limits: None,
            };
            let report: CommitReport = editor.commit(&mut container, &codec, &mut free, options)?;
            for (index, err) in &report.errors {
                eprintln!("  #{}: {}", index, err);
            }
            println!(
                "{} in place, {} relocated, {} unchanged, {} failed",
                report.in_place.len(),
                report.relocated.len(),
                report.unchanged.len(),
                report.errors.len()
            );
            for relocation in &report.relocated {
                println!(
                    "  #{}: 0x{:06X} ({} bytes) -> 0x{:06X} ({} bytes)",
                    relocation.index, relocation.from, relocation.old_len, relocation.to, relocation.new_len
                );
            }
            let report: CommitReport = report.check()?;
            if let Some(len) = report.expanded_to {
                println!("Image expanded to {} KiB", len / 1024);
            }
            save_rom(&container, &output)
        }
        TextCommand::Encode { table, text } => {
            let table: CharTable = load_table(&table)?;
            let bytes: Vec<u8> = TextCodec::new(&table).encode(&text, UnmappedPolicy::Error)?;
            let hex: Vec<String> = bytes.iter().map(|b| format!("{:02X}", b)).collect();
            println!("{}", hex.join(" "));
            Ok(())
        }
        TextCommand::Decode { table, hex } => {
            let table: CharTable = load_table(&table)?;
            let bytes: Vec<u8> = parse_hex_bytes(&hex)?;
            let decoded = TextCodec::new(&table).decode(&bytes, DecodeOptions { emit_terminator: true });
            println!("{}", decoded.text);
            if !decoded.terminated {
                eprintln!("warning: no terminator in {} bytes", bytes.len());
            }
            Ok(())
        }
    }
}

pub fn gfx(action: GfxCommand) -> Result<()> {
    match action {
        GfxCommand::Export {
            rom,
            profile,
            set,
            output,
        } => {
            let container: Container = open_rom(&rom)?;
            let profile: GameProfile = load_profile(&profile)?;
            let set: GraphicsSet = profile.graphics_set(&set, container.mapper())?;
            let sheet = export_graphics(&container, &set, &output)?;
            println!(
                "Exported {} tiles ({}x{}) to {}",
                set.tiles,
                sheet.width(),
                sheet.height(),
                output.display()
            );
            Ok(())
        }
        GfxCommand::Import {
            rom,
            profile,
            set,
            input,
            output,
        } => {
            let mut container: Container = open_rom(&rom)?;
            let profile: GameProfile = load_profile(&profile)?;
            let set: GraphicsSet = profile.graphics_set(&set, container.mapper())?;
            let written: usize = import_graphics(&mut container, &set, &input)?;
            save_rom(&container, &output)?;
            println!("Imported {} tiles into {}", written, set.name);
            Ok(())
        }
    }
}

pub fn audio(action: AudioCommand) -> Result<()> {
    match action {
        AudioCommand::Export {
            rom,
            offset,
            output,
            rate,
            loop_offset,
        } => {
            let container: Container = open_rom(&rom)?;
            let start: usize = parse_location(&offset)?.resolve(container.mapper())?;
            let bytes: &[u8] = container.slice(start, container.len() - start.min(container.len()))?;
            let sample: BrrSample = AudioCodec::decode_block_stream_with_loop(bytes, loop_offset)?;
            write_wav(&output, &sample, rate)?;
            println!(
                "Decoded {} blocks ({} samples{}) to {}",
                sample.blocks,
                sample.samples.len(),
                if sample.loops { ", looping" } else { "" },
                output.display()
            );
            Ok(())
        }
    }
}

fn save_layout(profile: Option<&Path>) -> Result<SaveLayout> {
    Ok(match profile {
        Some(path) => load_profile(path)?.save_layout,
        None => SaveLayout::default(),
    })
}

fn read_save(path: &Path, layout: &SaveLayout) -> Result<SaveImage> {
    let bytes: Vec<u8> = fs::read(path).with_context(|| format!("Failed to read save file: {}", path.display()))?;
    Ok(SaveImage::parse(&bytes, layout)?)
}

fn write_save(image: &SaveImage, input: &Path, output: Option<&Path>) -> Result<()> {
    let path: &Path = output.unwrap_or(input);
    fs::write(path, image.serialize()).with_context(|| format!("Failed to write save file: {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn parse_flag(text: &str) -> Result<(FlagKind, usize)> {
    let (kind, index) = text
        .split_once(':')
        .ok_or_else(|| anyhow!("expected KIND:INDEX, got {:?}", text))?;
    let kind: FlagKind = match kind {
        "story" => FlagKind::Story,
        "chest" => FlagKind::Chest,
        "npc" => FlagKind::Npc,
        other => bail!("unknown flag kind {:?}", other),
    };
    Ok((kind, index.parse()?))
}

fn parse_equipment(text: &str) -> Result<(EquipmentKind, usize)> {
    let (kind, index) = text
        .split_once(':')
        .ok_or_else(|| anyhow!("expected KIND:INDEX, got {:?}", text))?;
    let kind: EquipmentKind = match kind {
        "key_item" => EquipmentKind::KeyItem,
        "weapon" => EquipmentKind::Weapon,
        "armor" => EquipmentKind::Armor,
        "accessory" => EquipmentKind::Accessory,
        other => bail!("unknown equipment kind {:?}", other),
    };
    Ok((kind, index.parse()?))
}

fn print_summary(summary: &SlotSummary) {
    println!("Slot {}: {}", summary.slot, summary.status);
    println!("  Currency: {}", summary.currency);
    println!("  Play time: {}", format_play_time(summary.play_time));
    println!(
        "  Location: map {} ({}, {})",
        summary.location.map, summary.location.x, summary.location.y
    );
    for (i, character) in summary.characters.iter().enumerate() {
        if let Some(c) = character {
            println!(
                "  Character {}: id {} level {} HP {}/{} MP {}/{} EXP {}",
                i, c.id, c.level, c.hp, c.max_hp, c.mp, c.max_mp, c.experience
            );
        }
    }
    if !summary.inventory.is_empty() {
        let items: Vec<String> = summary
            .inventory
            .iter()
            .map(|(id, qty)| format!("{:02X}x{}", id, qty))
            .collect();
        println!("  Inventory: {}", items.join(" "));
    }
    println!(
        "  Flags: {} story, {} chest, {} npc",
        summary.story_flags.len(),
        summary.chest_flags.len(),
        summary.npc_flags.len()
    );
}

pub fn save(action: SaveCommand) -> Result<()> {
    match action {
        SaveCommand::Show {
            save,
            profile,
            slot,
            json,
        } => {
            let layout: SaveLayout = save_layout(profile.as_deref())?;
            let image: SaveImage = read_save(&save, &layout)?;
            let indices: Vec<usize> = match slot {
                Some(i) => vec![i],
                None => (0..image.slots().len()).collect(),
            };
            let mut summaries: Vec<SlotSummary> = Vec::with_capacity(indices.len());
            for i in indices {
                let slot = image.slot(i)?;
                if slot.status().has_signature() {
                    summaries.push(image.summary(i)?);
                } else if !json {
                    println!("Slot {}: {:?}", i, slot.status());
                }
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                summaries.iter().for_each(print_summary);
            }
            Ok(())
        }
        SaveCommand::Edit {
            save,
            slot,
            profile,
            output,
            currency,
            play_time,
            give,
            remove,
            level,
            learn,
            set_flag,
            clear_flag,
            grant,
            heal,
            from_json,
        } => {
            let layout: SaveLayout = save_layout(profile.as_deref())?;
            let mut image: SaveImage = read_save(&save, &layout)?;
            if let Some(path) = from_json {
                let json: String = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read summary: {}", path.display()))?;
                let summary: SlotSummary = serde_json::from_str(&json).context("Failed to parse summary")?;
                image.apply_summary(slot, &summary)?;
            }
            if let Some(amount) = currency {
                image.set_currency(slot, amount)?;
            }
            if let Some(seconds) = play_time {
                image.set_play_time(slot, seconds)?;
            }
            for item in &give {
                let (id, qty) = parse_pair(item)?;
                let total: u8 = image.give_item(slot, u8::try_from(id)?, u8::try_from(qty)?)?;
                println!("  Item {:02X}: now {}", id, total);
            }
            for item in &remove {
                let (id, qty) = parse_pair(item)?;
                image.remove_item(slot, u8::try_from(id)?, u8::try_from(qty)?)?;
            }
            for entry in &level {
                let (character, lvl) = parse_pair(entry)?;
                image.set_level(slot, character, u8::try_from(lvl)?)?;
            }
            for entry in &learn {
                let (character, spell) = parse_pair(entry)?;
                image.learn_spell(slot, character, spell)?;
            }
            for flag in &set_flag {
                let (kind, index) = parse_flag(flag)?;
                image.set_flag(slot, kind, index, true)?;
            }
            for flag in &clear_flag {
                let (kind, index) = parse_flag(flag)?;
                image.set_flag(slot, kind, index, false)?;
            }
            for entry in &grant {
                let (kind, index) = parse_equipment(entry)?;
                image.grant_equipment(slot, kind, index, true)?;
            }
            if heal {
                let healed: usize = image.heal_party(slot)?;
                println!("  Healed {} characters", healed);
            }
            write_save(&image, &save, output.as_deref())
        }
        SaveCommand::Verify { save, profile } => {
            let layout: SaveLayout = save_layout(profile.as_deref())?;
            let image: SaveImage = read_save(&save, &layout)?;
            let mut first_failure: Option<romkit_core::RomError> = None;
            for slot in image.slots() {
                match slot.verify(&layout) {
                    Ok(()) => println!("Slot {}: OK", slot.index()),
                    Err(err) => {
                        if slot.status() == SlotStatus::Empty {
                            println!("Slot {}: empty", slot.index());
                            continue;
                        }
                        println!("Slot {}: {}", slot.index(), err);
                        first_failure.get_or_insert(err);
                    }
                }
            }
            match first_failure {
                Some(err) => Err(err.into()),
                None => Ok(()),
            }
        }
        SaveCommand::Fix {
            save,
            profile,
            output,
        } => {
            let layout: SaveLayout = save_layout(profile.as_deref())?;
            let image: SaveImage = read_save(&save, &layout)?;
            let repaired: usize = image
                .slots()
                .iter()
                .filter(|s| matches!(s.status(), SlotStatus::BadChecksum { .. }))
                .count();
            println!("Repairing {} slot checksums", repaired);
            write_save(&image, &save, output.as_deref())
        }
        SaveCommand::Backup {
            save,
            slot,
            profile,
            output,
        } => {
            let layout: SaveLayout = save_layout(profile.as_deref())?;
            let mut image: SaveImage = read_save(&save, &layout)?;
            image.backup_slot(slot)?;
            write_save(&image, &save, output.as_deref())
        }
        SaveCommand::Restore {
            save,
            slot,
            profile,
            output,
        } => {
            let layout: SaveLayout = save_layout(profile.as_deref())?;
            let mut image: SaveImage = read_save(&save, &layout)?;
            image.restore_backup(slot)?;
            write_save(&image, &save, output.as_deref())
        }
    }
}

fn print_patch_info(info: &PatchInfo) {
    println!("Format: {:?}", info.format);
    println!("  Operations: {}", info.operations);
    if let Some(size) = info.source_size {
        println!("  Source size: {} bytes", size);
    }
    println!("  Target size: {} bytes", info.target_size);
    if let (Some(source), Some(target)) = (info.source_crc, info.target_crc) {
        println!("  Source CRC32: {:08x}", source);
        println!("  Target CRC32: {:08x}", target);
    }
    if let Some(metadata) = &info.metadata {
        println!("  Metadata: {}", metadata);
    }
}

pub fn patch(action: PatchCommand) -> Result<()> {
    match action {
        PatchCommand::Create {
            original,
            modified,
            output,
            format,
            rle,
            metadata,
        } => {
            let source: Vec<u8> =
                fs::read(&original).with_context(|| format!("Failed to read {}", original.display()))?;
            let target: Vec<u8> =
                fs::read(&modified).with_context(|| format!("Failed to read {}", modified.display()))?;
            let format: String = format
                .or_else(|| output.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase))
                .unwrap_or_else(|| PatchFormat::Block.extension().to_string());
            let bytes: Vec<u8> = match format.as_str() {
                "ips" => Patch::create_record_with(&source, &target, RecordOptions { rle })?,
                "bps" => Patch::create_block(&source, &target, metadata.as_deref().unwrap_or("").as_bytes()),
                other => bail!("unknown patch format {:?} (expected ips or bps)", other),
            };
            fs::write(&output, &bytes).with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Wrote {} patch ({} bytes) to {}", format, bytes.len(), output.display());
            Ok(())
        }
        PatchCommand::Apply { patch, rom, output } => {
            let patch_bytes: Vec<u8> =
                fs::read(&patch).with_context(|| format!("Failed to read patch: {}", patch.display()))?;
            let source: Vec<u8> = fs::read(&rom).with_context(|| format!("Failed to read {}", rom.display()))?;
            let target: Vec<u8> = Patch::apply(&patch_bytes, &source)?;
            fs::write(&output, &target).with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Patched {} bytes into {}", target.len(), output.display());
            Ok(())
        }
        PatchCommand::Validate { patch } => {
            let bytes: Vec<u8> =
                fs::read(&patch).with_context(|| format!("Failed to read patch: {}", patch.display()))?;
            let info: PatchInfo = Patch::validate(&bytes)?;
            print_patch_info(&info);
            Ok(())
        }
    }
}

pub fn diff(original: &Path, modified: &Path, json: bool) -> Result<()> {
    let a: Container = open_rom(original)?;
    let b: Container = open_rom(modified)?;
    let report: DiffReport = DiffReport::between(a.working(), b.working());
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!(
        "{} bytes changed in {} regions ({} appended, {} truncated)",
        report.bytes_changed,
        report.regions.len(),
        report.appended,
        report.truncated
    );
    for region in &report.regions {
        let address: String = region.address.map(|a| a.to_string()).unwrap_or_default();
        println!("  0x{:06X}..0x{:06X} {} ({} bytes)", region.start, region.end, address, region.len());
    }
    Ok(())
}

pub fn shuffle(rom: &Path, profile: &Path, seed: u64, output: &Path, log: Option<&Path>) -> Result<()> {
    let mut container: Container = open_rom(rom)?;
    let profile: GameProfile = load_profile(profile)?;
    let tables = profile.shuffle_tables(container.mapper())?;
    if tables.is_empty() {
        bail!("profile {:?} declares no shuffle tables", profile.name);
    }
    let logs: Vec<ShuffleLog> = Randomizer::run(seed, &mut container, &tables)?;
    for entry in &logs {
        println!(
            "  {}: {} shuffled, {} preserved, {} changed",
            entry.table,
            entry.shuffled,
            entry.preserved,
            entry.moves.len()
        );
    }
    if let Some(path) = log {
        fs::write(path, serde_json::to_string_pretty(&logs)?)
            .with_context(|| format!("Failed to write log: {}", path.display()))?;
    }
    save_rom(&container, output)
}

pub fn decompress(rom: &Path, offset: &str, output: &Path, expand_3bpp: bool) -> Result<()> {
    let container: Container = open_rom(rom)?;
    let start: usize = parse_location(offset)?.resolve(container.mapper())?;
    let stream: &[u8] = container.slice(start, container.len() - start.min(container.len()))?;
    let mut data: Vec<u8> = compress::decompress(stream)?;
    if expand_3bpp {
        data = compress::expand_3bpp_to_4bpp(&data)?;
    }
    fs::write(output, &data).with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Decompressed {} bytes to {}", data.len(), output.display());
    Ok(())
}
