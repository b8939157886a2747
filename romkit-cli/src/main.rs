// CLI application
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use romkit_core::RomError;
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "romkit")]
#[command(about = "LoROM cartridge modification toolkit")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the image layout, internal header and identity hashes
    Info {
        /// Path to the cartridge image
        rom: PathBuf,

        /// Game profile to check the image against
        #[arg(short, long)]
        profile: Option<PathBuf>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Recompute the internal header checksum
    FixChecksum {
        rom: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },
    /// Translate between cartridge addresses and file offsets
    Addr {
        rom: PathBuf,

        /// `$BB:OOOO` address, or a hex file offset with --linear
        value: String,

        /// Treat the value as a linear file offset (copier header included)
        #[arg(long)]
        linear: bool,
    },
    /// Dialog text operations
    Text {
        #[command(subcommand)]
        action: TextCommand,
    },
    /// Tile graphics operations
    Gfx {
        #[command(subcommand)]
        action: GfxCommand,
    },
    /// Audio sample operations
    Audio {
        #[command(subcommand)]
        action: AudioCommand,
    },
    /// Battery save operations
    Save {
        #[command(subcommand)]
        action: SaveCommand,
    },
    /// Create, apply and validate patches
    Patch {
        #[command(subcommand)]
        action: PatchCommand,
    },
    /// Report the differences between two images
    Diff {
        original: PathBuf,
        modified: PathBuf,

        #[arg(long)]
        json: bool,
    },
    /// Shuffle the profile's record tables from a seed
    Shuffle {
        rom: PathBuf,

        #[arg(short, long)]
        profile: PathBuf,

        #[arg(short, long)]
        seed: u64,

        #[arg(short, long)]
        output: PathBuf,

        /// Write the shuffle log as JSON
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Decompress a tail-window LZ stream from the image
    Decompress {
        rom: PathBuf,

        /// Offset of the stream (`$BB:OOOO`, `0x` hex or decimal)
        #[arg(long)]
        offset: String,

        #[arg(short, long)]
        output: PathBuf,

        /// Expand packed 3bpp tiles to 4bpp after decompressing
        #[arg(long)]
        expand_3bpp: bool,
    },
}

#[derive(Subcommand)]
pub enum TextCommand {
    /// Decode every string of a text bank to JSON
    Extract {
        rom: PathBuf,

        #[arg(short, long)]
        profile: PathBuf,

        #[arg(short, long)]
        bank: String,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Encode edited strings back into the image
    Insert {
        rom: PathBuf,

        #[arg(short, long)]
        profile: PathBuf,

        #[arg(short, long)]
        bank: String,

        /// JSON list of `{ "index": N, "text": "..." }`
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Grow the image when free space runs out
        #[arg(long)]
        expand: bool,

        /// Overwrite freed bytes with this hex value
        #[arg(long)]
        fill: Option<String>,

        /// Drop characters the table cannot encode instead of failing
        #[arg(long)]
        skip_unmapped: bool,
    },
    /// Encode one string and print its bytes
    Encode {
        #[arg(short, long)]
        table: PathBuf,

        text: String,
    },
    /// Decode hex bytes and print the text
    Decode {
        #[arg(short, long)]
        table: PathBuf,

        hex: String,
    },
}

#[derive(Subcommand)]
pub enum GfxCommand {
    /// Render a profile graphics set to PNG
    Export {
        rom: PathBuf,

        #[arg(short, long)]
        profile: PathBuf,

        #[arg(short, long)]
        set: String,

        #[arg(short, long)]
        output: PathBuf,
    },
    /// Write a PNG tile sheet back over a graphics set
    Import {
        rom: PathBuf,

        #[arg(short, long)]
        profile: PathBuf,

        #[arg(short, long)]
        set: String,

        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum AudioCommand {
    /// Decode a BRR sample to WAV
    Export {
        rom: PathBuf,

        #[arg(long)]
        offset: String,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value_t = 32000)]
        rate: u32,

        /// Loop point in bytes from the sample start
        #[arg(long)]
        loop_offset: Option<usize>,
    },
}

#[derive(Subcommand)]
pub enum SaveCommand {
    /// Print slot contents
    Show {
        save: PathBuf,

        #[arg(short, long)]
        profile: Option<PathBuf>,

        /// Only this slot
        #[arg(long)]
        slot: Option<usize>,

        #[arg(long)]
        json: bool,
    },
    /// Change fields of one slot
    Edit {
        save: PathBuf,

        #[arg(long)]
        slot: usize,

        #[arg(short, long)]
        profile: Option<PathBuf>,

        /// Output file (edits in place when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        currency: Option<u32>,

        /// Play time in seconds
        #[arg(long)]
        play_time: Option<u32>,

        /// `ID:QUANTITY`, repeatable
        #[arg(long)]
        give: Vec<String>,

        /// `ID:QUANTITY`, repeatable
        #[arg(long)]
        remove: Vec<String>,

        /// `CHARACTER:LEVEL`, repeatable
        #[arg(long)]
        level: Vec<String>,

        /// `CHARACTER:SPELL`, repeatable
        #[arg(long)]
        learn: Vec<String>,

        /// `story|chest|npc:INDEX`, repeatable
        #[arg(long)]
        set_flag: Vec<String>,

        /// `story|chest|npc:INDEX`, repeatable
        #[arg(long)]
        clear_flag: Vec<String>,

        /// `key_item|weapon|armor|accessory:INDEX`, repeatable
        #[arg(long)]
        grant: Vec<String>,

        /// Restore every party member's HP and MP
        #[arg(long)]
        heal: bool,

        /// Apply a JSON slot summary (as printed by `save show --json`)
        #[arg(long)]
        from_json: Option<PathBuf>,
    },
    /// Check every slot's signature and checksum
    Verify {
        save: PathBuf,

        #[arg(short, long)]
        profile: Option<PathBuf>,
    },
    /// Rewrite the image with recomputed checksums
    Fix {
        save: PathBuf,

        #[arg(short, long)]
        profile: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Copy a slot into the backup record
    Backup {
        save: PathBuf,

        #[arg(long)]
        slot: usize,

        #[arg(short, long)]
        profile: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Overwrite a slot with the backup record
    Restore {
        save: PathBuf,

        #[arg(long)]
        slot: usize,

        #[arg(short, long)]
        profile: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum PatchCommand {
    /// Create a patch turning ORIGINAL into MODIFIED
    Create {
        original: PathBuf,
        modified: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// `ips` or `bps`; taken from the output extension when omitted
        #[arg(long)]
        format: Option<String>,

        /// Use run-length records (record format only)
        #[arg(long)]
        rle: bool,

        /// Metadata string (block format only)
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Apply a patch of either format
    Apply {
        patch: PathBuf,
        rom: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },
    /// Check a patch without a source image
    Validate { patch: PathBuf },
}

/// Exit code for a failed command.
fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(rom) = cause.downcast_ref::<RomError>() {
            return rom.kind().exit_code();
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return 3;
        }
    }
    2
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Info { rom, profile, json } => commands::info(&rom, profile.as_deref(), json),
        Commands::FixChecksum { rom, output } => commands::fix_checksum(&rom, &output),
        Commands::Addr { rom, value, linear } => commands::addr(&rom, &value, linear),
        Commands::Text { action } => commands::text(action),
        Commands::Gfx { action } => commands::gfx(action),
        Commands::Audio { action } => commands::audio(action),
        Commands::Save { action } => commands::save(action),
        Commands::Patch { action } => {
            let pb = create_progress_bar("Processing patch...");
            let result = commands::patch(action);
            pb.finish_and_clear();
            result
        }
        Commands::Diff {
            original,
            modified,
            json,
        } => {
            let pb = create_progress_bar("Comparing images...");
            let result = commands::diff(&original, &modified, json);
            pb.finish_and_clear();
            result
        }
        Commands::Shuffle {
            rom,
            profile,
            seed,
            output,
            log,
        } => {
            let pb = create_progress_bar("Shuffling tables...");
            commands::shuffle(&rom, &profile, seed, &output, log.as_deref())?;
            pb.finish_with_message("Shuffle complete");
            Ok(())
        }
        Commands::Decompress {
            rom,
            offset,
            output,
            expand_3bpp,
        } => commands::decompress(&rom, &offset, &output, expand_3bpp),
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        eprintln!("Error: {:#}", err);
        std::process::exit(exit_code(&err));
    }
}

fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}
