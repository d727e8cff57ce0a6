// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Write as FmtWrite;

use indoc::writedoc;
use utf8_tables::trie::{CompiledTable, UNICODE_CODEPOINTS};
use utf8_tables::ucd::{GraphemeBreak, PropertyRange};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Language {
    #[default]
    C,
    Rust,
}

pub fn render_header(buf: &mut String, description: &str, args: &str, total_size: usize) {
    _ = writeln!(
        buf,
        "// BEGIN: Generated by utf8-table-gen on {}, from {}, with {}, {} bytes",
        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        description,
        args,
        total_size,
    );
}

pub fn render_footer(buf: &mut String) {
    buf.push_str("// END: Generated by utf8-table-gen\n");
}

/// Writes the grapheme break classes as named integer constants.
pub fn render_grapheme_classes(buf: &mut String, lang: Language) {
    match lang {
        Language::C => {
            buf.push_str("enum {\n");
            for gb in GraphemeBreak::ALL {
                _ = writeln!(buf, "    UTF8_GRAPHEME_BREAK_{} = {},", gb.name(), gb.value());
            }
            buf.push_str("};\n");
        }
        Language::Rust => {
            for gb in GraphemeBreak::ALL {
                _ = writeln!(buf, "pub const UTF8_GRAPHEME_BREAK_{}: u8 = {};", gb.name(), gb.value());
            }
        }
    }
}

/// Writes the flat range list: one entry per run of equal width and grapheme break class.
pub fn render_ranges(buf: &mut String, lang: Language, ranges: &[PropertyRange]) {
    match lang {
        Language::C => {
            _ = writedoc!(
                buf,
                "
                struct utf8data {{
                    uint32_t lower;
                    uint32_t upper;
                    uint8_t width;
                    uint8_t grapheme_break;
                }};
                static const struct utf8data s_utf8data[{}] = {{
                ",
                ranges.len(),
            );
            for r in ranges {
                _ = writeln!(
                    buf,
                    "    {{ 0x{:04X}, 0x{:04X}, {}, UTF8_GRAPHEME_BREAK_{} }},",
                    r.first,
                    r.last,
                    r.width,
                    r.grapheme_break.name(),
                );
            }
            buf.push_str("};\n");
        }
        Language::Rust => {
            _ = writeln!(
                buf,
                "#[rustfmt::skip]\npub const UTF8DATA: [(u32, u32, u8, u8); {}] = [",
                ranges.len(),
            );
            for r in ranges {
                _ = writeln!(
                    buf,
                    "    (0x{:04X}, 0x{:04X}, {}, UTF8_GRAPHEME_BREAK_{}),",
                    r.first,
                    r.last,
                    r.width,
                    r.grapheme_break.name(),
                );
            }
            buf.push_str("];\n");
        }
    }
}

/// Writes the three arrays of `table` and a lookup function called `ucd_{name}`.
pub fn render_trie(buf: &mut String, lang: Language, name: &str, table: &CompiledTable) {
    match lang {
        Language::C => render_trie_c(buf, name, table),
        Language::Rust => render_trie_rust(buf, name, table),
    }
}

fn write_values(buf: &mut String, indent: &str, values: impl IntoIterator<Item = u32>, bits: usize) {
    for (j, value) in values.into_iter().enumerate() {
        if j % 16 == 0 {
            buf.push('\n');
            buf.push_str(indent);
        }
        _ = write!(buf, " 0x{:01$x},", value, bits / 4);
    }
}

fn render_trie_c(buf: &mut String, name: &str, table: &CompiledTable) {
    let s = table.shifts();
    let top_bits = table.top_width().bits();
    let mid_bits = table.mid_width().bits();

    _ = write!(buf, "static const uint{}_t s_{}_top[{}] = {{", top_bits, name, table.top().len());
    write_values(buf, "   ", table.top().iter().copied(), top_bits);
    buf.push_str("\n};\n");

    _ = write!(
        buf,
        "static const uint{}_t s_{}_mid[{}][{}] = {{",
        mid_bits,
        name,
        table.mid().len(),
        s.leaves_per_mid(),
    );
    for block in table.mid() {
        buf.push_str("\n    {");
        write_values(buf, "       ", block.iter().copied(), mid_bits);
        buf.push_str("\n    },");
    }
    buf.push_str("\n};\n");

    _ = write!(
        buf,
        "static const uint8_t s_{}_leaf[{}][{}] = {{",
        name,
        table.leaves().len(),
        s.bytes_per_leaf(),
    );
    for block in table.leaves() {
        buf.push_str("\n    {");
        write_values(buf, "       ", block.iter().map(|&b| b as u32), 8);
        buf.push_str("\n    },");
    }
    buf.push_str("\n};\n");

    _ = writedoc!(
        buf,
        "
        inline int ucd_{name}(const uint32_t cp)
        {{
            if (cp >= {count:#x}) {{
                return 0;
            }}
            const int mid = s_{name}_top[cp >> {shift0}];
            const int leaf = s_{name}_mid[mid][(cp >> {shift1}) & {mask1}];
            const int byte = s_{name}_leaf[leaf][(cp >> {shift2}) & {mask2}];
        ",
        name = name,
        count = table.count(),
        shift0 = s.shift0,
        shift1 = s.shift1,
        mask1 = s.mask1,
        shift2 = s.shift2,
        mask2 = s.mask2,
    );
    if s.mask3 == 0 {
        buf.push_str("    return byte;\n}\n");
    } else {
        _ = writedoc!(
            buf,
            "
                return (byte >> ((cp & {}) * {})) & {};
            }}
            ",
            s.mask3,
            s.val_pack_shift,
            s.val_pack_mask,
        );
    }
}

fn render_trie_rust(buf: &mut String, name: &str, table: &CompiledTable) {
    let s = table.shifts();
    let upper = name.to_ascii_uppercase();
    let top_bits = table.top_width().bits();
    let mid_bits = table.mid_width().bits();

    _ = write!(
        buf,
        "#[rustfmt::skip]\nconst {}_TOP: [u{}; {}] = [",
        upper,
        top_bits,
        table.top().len(),
    );
    write_values(buf, "   ", table.top().iter().copied(), top_bits);
    buf.push_str("\n];\n");

    _ = write!(
        buf,
        "#[rustfmt::skip]\nconst {}_MID: [[u{}; {}]; {}] = [",
        upper,
        mid_bits,
        s.leaves_per_mid(),
        table.mid().len(),
    );
    for block in table.mid() {
        buf.push_str("\n    [");
        write_values(buf, "       ", block.iter().copied(), mid_bits);
        buf.push_str("\n    ],");
    }
    buf.push_str("\n];\n");

    _ = write!(
        buf,
        "#[rustfmt::skip]\nconst {}_LEAF: [[u8; {}]; {}] = [",
        upper,
        s.bytes_per_leaf(),
        table.leaves().len(),
    );
    for block in table.leaves() {
        buf.push_str("\n    [");
        write_values(buf, "       ", block.iter().map(|&b| b as u32), 8);
        buf.push_str("\n    ],");
    }
    buf.push_str("\n];\n");

    _ = writedoc!(
        buf,
        "
        #[inline]
        pub fn ucd_{name}(cp: char) -> u8 {{
            let cp = cp as usize;
        ",
    );
    // A `char` can't exceed U+10FFFF, so the bounds check is only needed for smaller domains.
    if table.count() < UNICODE_CODEPOINTS {
        _ = writeln!(buf, "    if cp >= {:#x} {{\n        return 0;\n    }}", table.count());
    }
    _ = writeln!(buf, "    let mid = {upper}_TOP[cp >> {}] as usize;", s.shift0);
    _ = writeln!(buf, "    let leaf = {upper}_MID[mid][(cp >> {}) & {}] as usize;", s.shift1, s.mask1);
    _ = writeln!(buf, "    let byte = {upper}_LEAF[leaf][(cp >> {}) & {}];", s.shift2, s.mask2);
    if s.mask3 == 0 {
        buf.push_str("    byte\n}\n");
    } else {
        _ = writedoc!(
            buf,
            "
                (byte >> ((cp & {}) * {})) & {}
            }}
            ",
            s.mask3,
            s.val_pack_shift,
            s.val_pack_mask,
        );
    }
}

#[cfg(test)]
mod tests {
    use utf8_tables::trie::{TrieConfig, compile};

    use super::*;

    fn parity() -> CompiledTable {
        compile(16, TrieConfig::new(1, 1, 1), |cp| cp % 2).unwrap()
    }

    /// The text between the first `start` in `buf` and the next `end`.
    fn between<'a>(buf: &'a str, start: &str, end: &str) -> &'a str {
        let (_, rest) = buf.split_once(start).unwrap();
        rest.split_once(end).unwrap().0
    }

    fn number(text: &str) -> usize {
        let text = text.trim();
        match text.strip_prefix("0x") {
            Some(hex) => usize::from_str_radix(hex, 16).unwrap(),
            None => text.parse().unwrap(),
        }
    }

    /// A trie read back from generated Rust source, evaluated the way `ucd_{name}` would.
    struct RenderedTrie {
        top: Vec<usize>,
        mid: Vec<usize>,
        leaves_per_mid: usize,
        leaf: Vec<usize>,
        bytes_per_leaf: usize,
        shift0: usize,
        shift1: usize,
        mask1: usize,
        shift2: usize,
        mask2: usize,
        unpack: Option<(usize, usize, usize)>,
    }

    impl RenderedTrie {
        fn parse(buf: &str, upper: &str) -> Self {
            let (top, _) = Self::array(buf, &format!("{upper}_TOP"));
            let (mid, leaves_per_mid) = Self::array(buf, &format!("{upper}_MID"));
            let (leaf, bytes_per_leaf) = Self::array(buf, &format!("{upper}_LEAF"));

            let (shift1, mask1) = between(buf, "_MID[mid][(cp >> ", "]").split_once(") & ").unwrap();
            let (shift2, mask2) = between(buf, "_LEAF[leaf][(cp >> ", "]").split_once(") & ").unwrap();
            let unpack = buf.contains("(byte >> ((cp & ").then(|| {
                let tail = between(buf, "(byte >> ((cp & ", "\n");
                let (mask3, rest) = tail.split_once(") * ").unwrap();
                let (width, mask) = rest.split_once(")) & ").unwrap();
                (number(mask3), number(width), number(mask))
            });

            Self {
                top,
                mid,
                leaves_per_mid,
                leaf,
                bytes_per_leaf,
                shift0: number(between(buf, "_TOP[cp >> ", "]")),
                shift1: number(shift1),
                mask1: number(mask1),
                shift2: number(shift2),
                mask2: number(mask2),
                unpack,
            }
        }

        /// Returns the flattened values of `const {name}` and the length of its rows.
        fn array(buf: &str, name: &str) -> (Vec<usize>, usize) {
            let ty = between(buf, &format!("const {name}: "), " = [");
            let body = between(buf, &format!("const {name}: {ty} = ["), "\n];");
            let values = body
                .split([',', '[', ']'])
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(number)
                .collect();
            // `[[uN; row]; n]` for blocks, `[uN; n]` for the top array.
            let row = ty.strip_prefix("[[").map_or(1, |inner| number(between(inner, "; ", "]")));
            (values, row)
        }

        fn lookup(&self, cp: usize) -> usize {
            let mid = self.top[cp >> self.shift0];
            let leaf = self.mid[mid * self.leaves_per_mid + ((cp >> self.shift1) & self.mask1)];
            let byte = self.leaf[leaf * self.bytes_per_leaf + ((cp >> self.shift2) & self.mask2)];
            match self.unpack {
                Some((mask3, width, mask)) => (byte >> ((cp & mask3) * width)) & mask,
                None => byte,
            }
        }
    }

    #[test]
    fn test_rust_trie() {
        let mut buf = String::new();
        render_trie(&mut buf, Language::Rust, "parity", &parity());

        assert!(buf.contains("const PARITY_TOP: [u8; 2] = [\n    0x00, 0x00,\n];"));
        assert!(buf.contains("const PARITY_MID: [[u8; 2]; 1] = [\n    [\n        0x00, 0x00,\n    ],\n];"));
        assert!(buf.contains("const PARITY_LEAF: [[u8; 2]; 1] = [\n    [\n        0x10, 0x10,\n    ],\n];"));
        assert!(buf.contains("pub fn ucd_parity(cp: char) -> u8 {"));
        assert!(buf.contains("    if cp >= 0x10 {\n        return 0;\n    }\n"));
        assert!(buf.contains("    let mid = PARITY_TOP[cp >> 3] as usize;\n"));
        assert!(buf.contains("    let leaf = PARITY_MID[mid][(cp >> 2) & 1] as usize;\n"));
        assert!(buf.contains("    let byte = PARITY_LEAF[leaf][(cp >> 1) & 1];\n"));
        assert!(buf.contains("    (byte >> ((cp & 1) * 4)) & 15\n}\n"));
    }

    #[test]
    fn test_rendered_rust_decodes() {
        for config in [
            TrieConfig::new(1, 2, 0),
            TrieConfig::new(2, 1, 2),
            TrieConfig::new(0, 3, 1),
            TrieConfig::new(3, 0, 3),
        ] {
            let max = config.shifts().val_pack_mask;
            // Distinct values up front, long runs after, so some blocks dedup and some don't.
            let f = |cp: u32| (if cp < 0x100 { (cp * 37) ^ (cp >> 3) } else { cp / 96 }) % (max + 1);
            let table = compile(0x400, config, f).unwrap();

            let mut buf = String::new();
            render_trie(&mut buf, Language::Rust, "mixed", &table);
            let rendered = RenderedTrie::parse(&buf, "MIXED");
            assert_eq!(rendered.top.len(), table.top().len());

            for cp in 0..0x400 {
                assert_eq!(rendered.lookup(cp as usize), f(cp) as usize, "{config:?} at {cp:#x}");
            }
        }
    }

    #[test]
    fn test_c_trie() {
        let mut buf = String::new();
        render_trie(&mut buf, Language::C, "parity", &parity());

        assert!(buf.starts_with("static const uint8_t s_parity_top[2] = {"));
        assert!(buf.contains("static const uint8_t s_parity_mid[1][2] = {"));
        assert!(buf.contains("static const uint8_t s_parity_leaf[1][2] = {"));
        assert!(buf.contains("inline int ucd_parity(const uint32_t cp)\n{\n    if (cp >= 0x10) {"));
        assert!(buf.contains("    const int leaf = s_parity_mid[mid][(cp >> 2) & 1];\n"));
        assert!(buf.contains("    return (byte >> ((cp & 1) * 4)) & 15;\n}\n"));
    }

    #[test]
    fn test_unpacked_trie() {
        let table = compile(UNICODE_CODEPOINTS, TrieConfig::new(5, 4, 0), |_| 7).unwrap();
        let mut buf = String::new();
        render_trie(&mut buf, Language::Rust, "seven", &table);

        assert!(!buf.contains("if cp >="));
        assert!(buf.contains("    let byte = SEVEN_LEAF[leaf][(cp >> 0) & 15];\n    byte\n}\n"));
    }

    #[test]
    fn test_wide_indices() {
        // Leaf k holds [k & 0xff, k >> 8], so all 0x400 leaves are distinct
        // and the indices pointing at them need 16 bits.
        let f = |cp: u32| if cp % 2 == 0 { (cp >> 1) & 0xff } else { cp >> 9 };
        let table = compile(0x800, TrieConfig::new(1, 1, 0), f).unwrap();
        assert_eq!(table.leaves().len(), 0x400);

        let mut buf = String::new();
        render_trie(&mut buf, Language::Rust, "wide", &table);
        assert!(buf.contains("const WIDE_TOP: [u16; 512] = ["));
        assert!(buf.contains("const WIDE_MID: [[u16; 2]; 512] = ["));
        assert!(buf.contains(" 0x03ff,"));
    }

    #[test]
    fn test_ranges() {
        let ranges = [
            PropertyRange { first: 0x0, last: 0x9, width: 0, grapheme_break: GraphemeBreak::Control },
            PropertyRange { first: 0x4E00, last: 0x9FFF, width: 2, grapheme_break: GraphemeBreak::Other },
        ];

        let mut buf = String::new();
        render_ranges(&mut buf, Language::C, &ranges);
        assert!(buf.contains("static const struct utf8data s_utf8data[2] = {\n"));
        assert!(buf.contains("    { 0x0000, 0x0009, 0, UTF8_GRAPHEME_BREAK_CONTROL },\n"));
        assert!(buf.contains("    { 0x4E00, 0x9FFF, 2, UTF8_GRAPHEME_BREAK_OTHER },\n};\n"));

        let mut buf = String::new();
        render_ranges(&mut buf, Language::Rust, &ranges);
        assert!(buf.contains("pub const UTF8DATA: [(u32, u32, u8, u8); 2] = [\n"));
        assert!(buf.contains("    (0x4E00, 0x9FFF, 2, UTF8_GRAPHEME_BREAK_OTHER),\n];\n"));
    }

    #[test]
    fn test_grapheme_classes() {
        let mut buf = String::new();
        render_grapheme_classes(&mut buf, Language::C);
        assert!(buf.contains("    UTF8_GRAPHEME_BREAK_REGIONAL_INDICATOR = 5,\n"));

        let mut buf = String::new();
        render_grapheme_classes(&mut buf, Language::Rust);
        assert!(buf.contains("pub const UTF8_GRAPHEME_BREAK_ZWJ: u8 = 13;\n"));
    }

    #[test]
    fn test_header() {
        let mut buf = String::new();
        render_header(&mut buf, "Unicode 15.1.0", "--lang=rust", 1234);
        render_footer(&mut buf);
        assert!(buf.starts_with("// BEGIN: Generated by utf8-table-gen on "));
        assert!(buf.contains(", from Unicode 15.1.0, with --lang=rust, 1234 bytes\n"));
        assert!(buf.ends_with("// END: Generated by utf8-table-gen\n"));
    }
}
