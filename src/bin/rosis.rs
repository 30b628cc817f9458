//! rosis CLI — import OSIS documents into verse-keyed text modules.

#[cfg(feature = "fast-alloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::io::BufReader;
use std::path::PathBuf;
use std::process;

use clap::{CommandFactory, FromArgMatches, Parser};

use rosis::{
    create_module, import, open_module, BlockLevel, CompressType, DebugFlags, EntryWidth, Error,
    ImportOptions, ModuleShape, OutputEncoding, Reporter, VersificationMgr,
};

#[derive(Parser)]
#[command(
    name = "rosis",
    about = "OSIS Bible/commentary module creation tool",
    disable_version_flag = true
)]
struct Cli {
    /// Existing folder the module will be written to
    output: PathBuf,

    /// Path to the OSIS document, or '-' to read from standard input
    osis_doc: String,

    /// Augment module if it exists (default is to create new)
    #[arg(short = 'a')]
    append: bool,

    /// Compression type: l - LZSS; z - ZIP; b - bzip2; x - xz
    #[arg(short = 'z', value_name = "l|z|b|x", num_args = 0..=1, default_missing_value = "z")]
    compression: Option<char>,

    /// Shorthand for LZSS compression; cannot be combined with -z
    #[arg(short = 'Z', conflicts_with = "compression")]
    lzss: bool,

    /// Compression block size: 2 - verse; 3 - chapter; 4 - book
    #[arg(short = 'b', value_name = "2|3|4", default_value_t = 4)]
    block_size: u32,

    /// Compression level (1-9)
    #[arg(short = 'l', value_name = "1-9")]
    level: Option<u32>,

    /// Encipher a compressed module using the supplied key
    #[arg(short = 'c', value_name = "cipher_key")]
    cipher_key: Option<String>,

    /// Output encoding: 1 - UTF-8; 2 - UTF-16; s - SCSU
    #[arg(short = 'e', value_name = "1|2|s", default_value_t = '1')]
    encoding: char,

    /// Do not normalize to NFC
    #[arg(short = 'N')]
    no_normalize: bool,

    /// Bytes used to store entry size (2 or 4)
    #[arg(short = 's', value_name = "2|4", default_value_t = 2)]
    entry_size: u32,

    /// Versification scheme (case insensitive, unique prefixes allowed)
    #[arg(short = 'v', value_name = "v11n", default_value = "KJV")]
    v11n: String,

    /// Commentary mode
    #[arg(short = 'C')]
    commentary: bool,

    /// Debug flag bitmask; repeatable, values OR together
    #[arg(short = 'd', value_name = "flags", action = clap::ArgAction::Append)]
    debug: Vec<u32>,
}

fn debug_help() -> &'static str {
    "Debug flags (-d, add together or repeat):\n\
     \t1    - writes to module, very verbose\n\
     \t2    - verse start and end\n\
     \t4    - quotes, esp. Words of Christ\n\
     \t8    - titles\n\
     \t16   - inter-verse material\n\
     \t32   - BSP to BCV transformations\n\
     \t64   - v11n exceptions\n\
     \t128  - parsing of osisID and osisRef\n\
     \t256  - internal stack\n\
     \t512  - miscellaneous\n\
     \t1024 - parsing of entities and comments"
}

fn parse_cli(mgr: &VersificationMgr) -> Cli {
    let after_help = format!(
        "{}\n\nValid v11n values:\n\t{}",
        debug_help(),
        mgr.names().join("\t")
    );
    let cmd = Cli::command().after_help(after_help);
    let matches = cmd.try_get_matches().unwrap_or_else(|e| {
        // Usage-Fehler sind Exit-Code 1, nicht claps Default
        let is_help = matches!(
            e.kind(),
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
        );
        let _ = e.print();
        process::exit(if is_help { 0 } else { 1 });
    });
    Cli::from_arg_matches(&matches).unwrap_or_else(|e| {
        let _ = e.print();
        process::exit(1);
    })
}

fn run() -> Result<(), Error> {
    let mgr = VersificationMgr::new();
    let cli = parse_cli(&mgr);

    eprintln!("You are running rosis: {}", env!("CARGO_PKG_VERSION"));

    // -v: exakt, dann case-insensitiv, dann Präfix
    let system = mgr.resolve(&cli.v11n)?;

    let compress = if cli.lzss {
        Some(CompressType::Lzss)
    } else {
        match cli.compression {
            None => None,
            Some('l') => Some(CompressType::Lzss),
            Some('z') => Some(CompressType::Zip),
            Some('b') => Some(CompressType::Bzip2),
            Some('x') => Some(CompressType::Xz),
            Some(other) => {
                return Err(Error::usage(format!("-z: unknown compression type {other}")))
            }
        }
    };

    let block_level = BlockLevel::from_flag(cli.block_size)
        .ok_or_else(|| Error::usage("-b requires one of <2|3|4>"))?;
    let entry_width = EntryWidth::from_flag(cli.entry_size)
        .ok_or_else(|| Error::usage("-s requires one of <2|4>"))?;
    if let Some(level) = cli.level {
        if !(1..=9).contains(&level) {
            return Err(Error::usage("-l requires a value from 1-9"));
        }
    }
    let encoding = match cli.encoding {
        '1' => OutputEncoding::Utf8,
        '2' => OutputEncoding::Utf16,
        's' => OutputEncoding::Scsu,
        other => return Err(Error::usage(format!("-e: unknown encoding {other}"))),
    };

    let mut debug = DebugFlags::none();
    for d in &cli.debug {
        debug |= *d;
    }

    let shape = ModuleShape {
        compress,
        block_level,
        entry_width,
        level: cli.level,
    };

    let mut module = if cli.append {
        open_module(&cli.output, &mgr)?
    } else {
        create_module(&cli.output, &shape, system.clone())?
    };

    if let Some(key) = &cli.cipher_key {
        if compress.is_some() {
            eprintln!("Adding cipher filter with phrase: {key}");
            module.add_raw_filter(Box::new(rosis::filter::CipherFilter::new(key)));
        } else {
            eprintln!("Cipher key ignored. Only compressed modules can be enciphered.");
        }
    }

    if !module.is_writable() {
        return Err(Error::NotWritable(format!(
            "{}: writing text to it will not work",
            cli.output.display()
        )));
    }

    let opts = ImportOptions {
        v11n: system.name().to_string(),
        normalize: !cli.no_normalize,
        encoding,
        commentary: cli.commentary,
        ..ImportOptions::default()
    }
    .with_debug(debug);

    let reporter = Reporter::new(debug);

    let stats = if cli.osis_doc == "-" {
        let stdin = std::io::stdin();
        let (_module, stats) = import(opts, module, reporter, stdin.lock())?;
        stats
    } else {
        let file = std::fs::File::open(&cli.osis_doc)
            .map_err(|e| Error::InputOpen(format!("{}: {e}", cli.osis_doc)))?;
        let (_module, stats) = import(opts, module, reporter, BufReader::new(file))?;
        stats
    };

    if stats.converted > 0 {
        eprintln!("rosis converted {} entries to UTF-8", stats.converted);
    }
    if stats.normalized > 0 {
        eprintln!("rosis normalized {} entries to NFC", stats.normalized);
    }

    eprintln!("SUCCESS: rosis has finished its work and will now rest");
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("ERROR: {e}");
        process::exit(e.exit_code());
    }
}
