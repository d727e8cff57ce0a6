// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

mod render;

use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use tracing::info;
use utf8_tables::trie::{self, CompiledTable, TrieConfig, UNICODE_CODEPOINTS};
use utf8_tables::ucd::{GRAPHEME_VAL_BITS, Ucd, WIDTH_VAL_BITS};

use crate::render::Language;

const HELP: &str = "\
Usage: utf8-table-gen [options...] <ucd-dir>
  -h, --help            Prints help information
  --lang=<c|rust>       Output language (default: c)
  --ranges              Emit a flat list of property ranges instead of lookup tables
  --search              Pick the smallest block sizes instead of using --block*-bits
  --block1-bits=<n>     log2 of the leaf indices per mid block (default: 5)
  --block2-bits=<n>     log2 of the bytes per leaf block (default: 4)

<ucd-dir> must contain UnicodeData.txt, EastAsianWidth.txt and GraphemeBreakProperty.txt
(the latter may also live in <ucd-dir>/auxiliary). Download them at:
  https://www.unicode.org/Public/UCD/latest/ucd/
";

/// Range of block sizes tried by --search.
const SEARCH_BITS: std::ops::RangeInclusive<u32> = 2..=8;

#[derive(Debug)]
struct Args {
    lang: Language,
    ranges: bool,
    search: bool,
    block1_bits: u32,
    block2_bits: u32,
    input: PathBuf,
}

impl Args {
    /// Returns `None` if help was requested.
    fn parse(mut args: pico_args::Arguments) -> anyhow::Result<Option<Self>> {
        if args.contains(["-h", "--help"]) {
            return Ok(None);
        }

        let defaults = TrieConfig::default();
        let parsed = Args {
            lang: args
                .opt_value_from_fn("--lang", |arg| match arg {
                    "c" => Ok(Language::C),
                    "rust" => Ok(Language::Rust),
                    l => bail!("invalid language: \"{}\"", l),
                })?
                .unwrap_or_default(),
            ranges: args.contains("--ranges"),
            search: args.contains("--search"),
            block1_bits: args.opt_value_from_str("--block1-bits")?.unwrap_or(defaults.block1_bits),
            block2_bits: args.opt_value_from_str("--block2-bits")?.unwrap_or(defaults.block2_bits),
            input: args.free_from_os_str(|s| -> Result<PathBuf, &'static str> { Ok(s.into()) })?,
        };

        let remaining = args.finish();
        if !remaining.is_empty() {
            bail!("unrecognized arguments: {:?}", remaining);
        }
        Ok(Some(parsed))
    }

    /// The options that influence the output, for the header comment.
    fn describe(&self) -> String {
        let mut buf = String::new();
        match self.lang {
            Language::C => buf.push_str("--lang=c"),
            Language::Rust => buf.push_str("--lang=rust"),
        }
        if self.ranges {
            buf.push_str(" --ranges");
        } else if self.search {
            buf.push_str(" --search");
        } else {
            buf.push_str(&format!(
                " --block1-bits={} --block2-bits={}",
                self.block1_bits, self.block2_bits
            ));
        }
        buf
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let Some(args) = Args::parse(pico_args::Arguments::from_env())? else {
        eprint!("{HELP}");
        return Ok(());
    };

    let (description, ucd) = load_ucd(&args.input)?;
    let buf = if args.ranges {
        generate_ranges(&args, &description, &ucd)
    } else {
        generate_tries(&args, &description, &ucd)?
    };

    std::io::stdout().write_all(buf.as_bytes())?;
    Ok(())
}

fn read_file(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Reads and parses the three UCD files. Also returns a description of the UCD version.
fn load_ucd(dir: &Path) -> anyhow::Result<(String, Ucd)> {
    let unicode_data = read_file(&dir.join("UnicodeData.txt"))?;
    let east_asian_width = read_file(&dir.join("EastAsianWidth.txt"))?;

    let mut grapheme_path = dir.join("GraphemeBreakProperty.txt");
    if !grapheme_path.exists() {
        grapheme_path = dir.join("auxiliary").join("GraphemeBreakProperty.txt");
    }
    let grapheme_break = read_file(&grapheme_path)?;

    let description = describe_ucd(&east_asian_width).unwrap_or_else(|| dir.display().to_string());
    info!(%description, "parsing UCD");

    let ucd = Ucd::parse(&unicode_data, &east_asian_width, &grapheme_break)
        .with_context(|| format!("failed to parse the UCD in {}", dir.display()))?;
    Ok((description, ucd))
}

/// UCD property files start with a `# FileName-X.Y.Z.txt` comment.
fn describe_ucd(text: &str) -> Option<String> {
    let first = text.lines().next()?.strip_prefix('#')?.trim();
    let version = first.strip_prefix("EastAsianWidth-")?.strip_suffix(".txt")?;
    Some(format!("Unicode {version}"))
}

fn build_table<F>(args: &Args, val_bits: u32, f: F) -> utf8_tables::apperr::Result<CompiledTable>
where
    F: Fn(u32) -> u32 + Copy,
{
    if args.search {
        trie::build_best(UNICODE_CODEPOINTS, val_bits, SEARCH_BITS, f)
    } else {
        let config = TrieConfig::new(args.block1_bits, args.block2_bits, val_bits);
        trie::compile(UNICODE_CODEPOINTS, config, f)
    }
}

fn generate_tries(args: &Args, description: &str, ucd: &Ucd) -> anyhow::Result<String> {
    let width = |cp| ucd.width(cp);
    let grapheme = |cp| ucd.grapheme_break(cp).value();

    let (width_table, grapheme_table) = rayon::join(
        || build_table(args, WIDTH_VAL_BITS, width),
        || build_table(args, GRAPHEME_VAL_BITS, grapheme),
    );
    let width_table = width_table.context("failed to compile the width table")?;
    let grapheme_table = grapheme_table.context("failed to compile the grapheme break table")?;

    // Run a quick sanity check to ensure that the tries work as expected.
    width_table.verify(width).context("width trie sanity check failed")?;
    grapheme_table.verify(grapheme).context("grapheme break trie sanity check failed")?;

    for (name, table) in [("width", &width_table), ("grapheme_break", &grapheme_table)] {
        info!(
            name,
            config = ?table.config(),
            mid_blocks = table.mid().len(),
            leaf_blocks = table.leaves().len(),
            size = table.total_size(),
            flat_size = table.flat_size(),
            "compiled table"
        );
    }

    let total_size = width_table.total_size() + grapheme_table.total_size();
    let mut buf = String::new();
    render::render_header(&mut buf, description, &args.describe(), total_size);
    render::render_grapheme_classes(&mut buf, args.lang);
    render::render_trie(&mut buf, args.lang, "width", &width_table);
    render::render_trie(&mut buf, args.lang, "grapheme_break", &grapheme_table);
    render::render_footer(&mut buf);
    Ok(buf)
}

fn generate_ranges(args: &Args, description: &str, ucd: &Ucd) -> String {
    let ranges = ucd.ranges();
    // Two u32 bounds plus two u8 properties, padded to 12 bytes in C.
    let total_size = ranges.len() * 12;
    info!(ranges = ranges.len(), size = total_size, "collapsed ranges");

    let mut buf = String::new();
    render::render_header(&mut buf, description, &args.describe(), total_size);
    render::render_grapheme_classes(&mut buf, args.lang);
    render::render_ranges(&mut buf, args.lang, &ranges);
    render::render_footer(&mut buf);
    buf
}
