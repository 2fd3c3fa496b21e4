//! oc-ppu-recompiler - translate PPU code images into IR
//!
//! Loads a raw big-endian code image, splits the requested range into
//! functions at the given entry points, translates them in parallel and
//! prints the resulting module.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use oc_core::config::{Config, IndirectMissPolicy};
use oc_core::error::PpuError;
use oc_ppu::{translate_parallel, FunctionTable, LogDiagnostics, PpuDecoder, TranslationUnit};

#[derive(Parser, Debug)]
#[command(
    name = "oc-ppu-recompiler",
    about = "Translate PPU code from a raw big-endian image into portable IR."
)]
struct Args {
    /// Raw code image
    image: PathBuf,

    /// Guest address of the first image byte
    #[arg(long, value_parser = parse_addr, default_value = "0x10000")]
    load: u64,

    /// First address to translate (defaults to the load address)
    #[arg(long, value_parser = parse_addr)]
    start: Option<u64>,

    /// Last address to translate, inclusive (defaults to the image end)
    #[arg(long, value_parser = parse_addr)]
    end: Option<u64>,

    /// Function entry points; the range is one function when none are given
    #[arg(long = "entry", value_parser = parse_addr)]
    entries: Vec<u64>,

    /// Translator worker threads
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Configuration file (defaults to the user configuration)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Trap instead of returning when an indirect branch leaves its function
    #[arg(long, action = clap::ArgAction::SetTrue)]
    trap_on_miss: bool,
}

fn parse_addr(text: &str) -> Result<u64, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", text, e))
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Ok(Config::from_toml(&text)?)
        }
        None => Ok(Config::load().unwrap_or_default()),
    }
}

/// Check that `start..=end` lies inside the image spanning `load..=image_end`
fn check_range(load: u64, image_end: u64, start: u64, end: u64) -> Result<(), PpuError> {
    match [start, end].into_iter().find(|a| !(load..=image_end).contains(a)) {
        Some(addr) => Err(PpuError::ImageOutOfRange { addr }),
        None => Ok(()),
    }
}

/// Split `start..=end` into units at every entry point
fn split_units(code: &[u8], load: u64, start: u64, end: u64, entries: &[u64]) -> Vec<TranslationUnit> {
    let mut bounds: Vec<u64> = entries
        .iter()
        .copied()
        .filter(|e| (start..=end).contains(e) && e % 4 == 0)
        .collect();
    if bounds.first() != Some(&start) {
        bounds.insert(0, start);
    }
    bounds.sort_unstable();
    bounds.dedup();

    bounds
        .iter()
        .enumerate()
        .map(|(i, &first)| {
            let last = bounds.get(i + 1).map_or(end, |next| next - 4);
            let from = (first - load) as usize;
            let to = (last - load) as usize + 4;
            TranslationUnit::new(first, PpuDecoder::decode_range(&code[from..to], first))
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = load_config(args.config.as_ref())?;
    if args.trap_on_miss {
        config.translator.indirect_miss = IndirectMissPolicy::Trap;
    }
    oc_core::logging::init(&config);

    let code = std::fs::read(&args.image)
        .with_context(|| format!("reading {}", args.image.display()))?;
    if code.len() < 4 {
        bail!("{} holds no instructions", args.image.display());
    }

    let image_end = args.load + (code.len() as u64 & !3) - 4;
    let start = args.start.unwrap_or(args.load);
    let end = args.end.unwrap_or(image_end);
    check_range(args.load, image_end, start, end)?;
    if start > end || start % 4 != 0 || end % 4 != 0 {
        bail!("0x{:08x}..=0x{:08x} is not a word-aligned range", start, end);
    }

    let units = split_units(&code, args.load, start, end, &args.entries);
    tracing::info!(
        "translating {} functions in 0x{:08x}..=0x{:08x}",
        units.len(),
        start,
        end
    );

    let table = FunctionTable::new();
    let diag = LogDiagnostics::new();
    let name = args
        .image
        .file_stem()
        .map_or_else(|| "image".to_string(), |s| s.to_string_lossy().into_owned());
    let (module, failures) =
        translate_parallel(&name, &units, &table, &config.translator, &diag, args.workers);

    print!("{}", module);

    for (addr, err) in &failures {
        tracing::warn!("0x{:08x} left untranslated: {}", addr, err);
    }
    tracing::info!(
        "{} translated, {} failed",
        units.len() - failures.len(),
        failures.len()
    );
    if !units.is_empty() && failures.len() == units.len() {
        bail!("no function could be translated");
    }
    Ok(())
}
