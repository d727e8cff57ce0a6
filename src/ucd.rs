// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-codepoint properties parsed from the Unicode Character Database text files.
//!
//! Everything is parsed once into dense vectors. [`Ucd::width`] and
//! [`Ucd::grapheme_break`] are then pure functions over the whole codepoint range,
//! which is what the trie compiler wants as its input.

use std::ops::RangeInclusive;

use tracing::debug;

use crate::apperr::{Error, Result};
use crate::trie::UNICODE_CODEPOINTS;

/// 2-bit packing: widths are 0, 1 or 2.
pub const WIDTH_VAL_BITS: u32 = 2;
/// 4-bit packing: there are 14 grapheme break classes.
pub const GRAPHEME_VAL_BITS: u32 = 1;

const UNICODE_DATA: &str = "UnicodeData.txt";
const EAST_ASIAN_WIDTH: &str = "EastAsianWidth.txt";
const GRAPHEME_BREAK_PROPERTY: &str = "GraphemeBreakProperty.txt";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneralCategory {
    Lu,
    Ll,
    Lt,
    Lm,
    Lo,
    Mn,
    Mc,
    Me,
    Nd,
    Nl,
    No,
    Pc,
    Pd,
    Ps,
    Pe,
    Pi,
    Pf,
    Po,
    Sm,
    Sc,
    Sk,
    So,
    Zs,
    Zl,
    Zp,
    Cc,
    Cf,
    Cs,
    Co,
    #[default]
    Cn,
}

impl GeneralCategory {
    pub fn from_abbr(s: &str) -> Option<Self> {
        use GeneralCategory::*;
        Some(match s {
            "Lu" => Lu,
            "Ll" => Ll,
            "Lt" => Lt,
            "Lm" => Lm,
            "Lo" => Lo,
            "Mn" => Mn,
            "Mc" => Mc,
            "Me" => Me,
            "Nd" => Nd,
            "Nl" => Nl,
            "No" => No,
            "Pc" => Pc,
            "Pd" => Pd,
            "Ps" => Ps,
            "Pe" => Pe,
            "Pi" => Pi,
            "Pf" => Pf,
            "Po" => Po,
            "Sm" => Sm,
            "Sc" => Sc,
            "Sk" => Sk,
            "So" => So,
            "Zs" => Zs,
            "Zl" => Zl,
            "Zp" => Zp,
            "Cc" => Cc,
            "Cf" => Cf,
            "Cs" => Cs,
            "Co" => Co,
            "Cn" => Cn,
            _ => return None,
        })
    }

    /// Nonspacing and enclosing marks, controls and format characters take up no columns.
    pub fn is_zero_width(self) -> bool {
        matches!(self, GeneralCategory::Mn | GeneralCategory::Me | GeneralCategory::Cc | GeneralCategory::Cf)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EastAsianWidth {
    Ambiguous,
    Fullwidth,
    Halfwidth,
    #[default]
    Neutral,
    Narrow,
    Wide,
}

impl EastAsianWidth {
    pub fn from_abbr(s: &str) -> Option<Self> {
        Some(match s {
            "A" => EastAsianWidth::Ambiguous,
            "F" => EastAsianWidth::Fullwidth,
            "H" => EastAsianWidth::Halfwidth,
            "N" => EastAsianWidth::Neutral,
            "Na" => EastAsianWidth::Narrow,
            "W" => EastAsianWidth::Wide,
            _ => return None,
        })
    }
}

// NOTE: The discriminants are the values stored in the grapheme trie.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum GraphemeBreak {
    #[default]
    Other,
    CR,
    LF,
    Control,
    Extend,
    RegionalIndicator,
    Prepend,
    SpacingMark,
    L,
    V,
    T,
    LV,
    LVT,
    ZWJ,
}

impl GraphemeBreak {
    pub const ALL: [GraphemeBreak; 14] = [
        GraphemeBreak::Other,
        GraphemeBreak::CR,
        GraphemeBreak::LF,
        GraphemeBreak::Control,
        GraphemeBreak::Extend,
        GraphemeBreak::RegionalIndicator,
        GraphemeBreak::Prepend,
        GraphemeBreak::SpacingMark,
        GraphemeBreak::L,
        GraphemeBreak::V,
        GraphemeBreak::T,
        GraphemeBreak::LV,
        GraphemeBreak::LVT,
        GraphemeBreak::ZWJ,
    ];

    pub fn from_abbr(s: &str) -> Option<Self> {
        Some(match s {
            "Other" => GraphemeBreak::Other,
            "CR" => GraphemeBreak::CR,
            "LF" => GraphemeBreak::LF,
            "Control" => GraphemeBreak::Control,
            "Extend" => GraphemeBreak::Extend,
            "Regional_Indicator" => GraphemeBreak::RegionalIndicator,
            "Prepend" => GraphemeBreak::Prepend,
            "SpacingMark" => GraphemeBreak::SpacingMark,
            "L" => GraphemeBreak::L,
            "V" => GraphemeBreak::V,
            "T" => GraphemeBreak::T,
            "LV" => GraphemeBreak::LV,
            "LVT" => GraphemeBreak::LVT,
            "ZWJ" => GraphemeBreak::ZWJ,
            // Unicode 9 and 10 only. Later versions fold them the same way.
            "E_Modifier" => GraphemeBreak::Extend,
            "E_Base" | "E_Base_GAZ" | "Glue_After_Zwj" => GraphemeBreak::Other,
            _ => return None,
        })
    }

    pub fn from_value(value: u32) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    pub fn value(self) -> u32 {
        self as u32
    }

    /// Upper snake case name, as used for enumerators in generated code.
    pub fn name(self) -> &'static str {
        match self {
            GraphemeBreak::Other => "OTHER",
            GraphemeBreak::CR => "CR",
            GraphemeBreak::LF => "LF",
            GraphemeBreak::Control => "CONTROL",
            GraphemeBreak::Extend => "EXTEND",
            GraphemeBreak::RegionalIndicator => "REGIONAL_INDICATOR",
            GraphemeBreak::Prepend => "PREPEND",
            GraphemeBreak::SpacingMark => "SPACINGMARK",
            GraphemeBreak::L => "L",
            GraphemeBreak::V => "V",
            GraphemeBreak::T => "T",
            GraphemeBreak::LV => "LV",
            GraphemeBreak::LVT => "LVT",
            GraphemeBreak::ZWJ => "ZWJ",
        }
    }
}

/// A run of codepoints that share both width and grapheme break class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyRange {
    pub first: u32,
    pub last: u32,
    pub width: u32,
    pub grapheme_break: GraphemeBreak,
}

/// The three UCD properties needed for display width and grapheme segmentation.
pub struct Ucd {
    categories: Vec<GeneralCategory>,
    east_asian: Vec<EastAsianWidth>,
    grapheme: Vec<GraphemeBreak>,
}

impl Ucd {
    /// Parses the contents of `UnicodeData.txt`, `EastAsianWidth.txt` and `GraphemeBreakProperty.txt`.
    pub fn parse(unicode_data: &str, east_asian_width: &str, grapheme_break: &str) -> Result<Self> {
        let categories = parse_unicode_data(unicode_data)?;
        let east_asian = parse_property_file(
            EAST_ASIAN_WIDTH,
            east_asian_width,
            EastAsianWidth::default(),
            EastAsianWidth::from_abbr,
        )?;
        let grapheme = parse_property_file(
            GRAPHEME_BREAK_PROPERTY,
            grapheme_break,
            GraphemeBreak::default(),
            GraphemeBreak::from_abbr,
        )?;
        Ok(Self { categories, east_asian, grapheme })
    }

    pub fn general_category(&self, cp: u32) -> GeneralCategory {
        self.categories.get(cp as usize).copied().unwrap_or_default()
    }

    pub fn east_asian_width(&self, cp: u32) -> EastAsianWidth {
        self.east_asian.get(cp as usize).copied().unwrap_or_default()
    }

    pub fn grapheme_break(&self, cp: u32) -> GraphemeBreak {
        self.grapheme.get(cp as usize).copied().unwrap_or_default()
    }

    /// Display width in terminal columns: 0, 1 or 2.
    pub fn width(&self, cp: u32) -> u32 {
        // U+00AD SOFT HYPHEN is gc=Cf, but wcwidth() and most terminals give it a column.
        if cp == 0x00AD {
            return 1;
        }
        if self.general_category(cp).is_zero_width() {
            return 0;
        }
        match self.east_asian_width(cp) {
            EastAsianWidth::Wide | EastAsianWidth::Fullwidth => 2,
            _ => 1,
        }
    }

    /// Collapses the domain into runs of equal (width, grapheme break) pairs,
    /// skipping runs that are zero width and `Other`.
    pub fn ranges(&self) -> Vec<PropertyRange> {
        let mut ranges = Vec::new();
        let mut current = PropertyRange {
            first: 0,
            last: 0,
            width: self.width(0),
            grapheme_break: self.grapheme_break(0),
        };

        for cp in 1..UNICODE_CODEPOINTS {
            let width = self.width(cp);
            let grapheme_break = self.grapheme_break(cp);
            if width != current.width || grapheme_break != current.grapheme_break {
                push_range(&mut ranges, current);
                current = PropertyRange { first: cp, last: cp, width, grapheme_break };
            } else {
                current.last = cp;
            }
        }
        push_range(&mut ranges, current);

        debug!(ranges = ranges.len(), "collapsed property ranges");
        ranges
    }
}

fn push_range(ranges: &mut Vec<PropertyRange>, range: PropertyRange) {
    if range.width != 0 || range.grapheme_break != GraphemeBreak::Other {
        ranges.push(range);
    }
}

fn parse_codepoint(s: &str) -> Option<u32> {
    u32::from_str_radix(s.trim(), 16).ok().filter(|&cp| cp < UNICODE_CODEPOINTS)
}

/// Parses `XXXX` or `XXXX..YYYY`.
fn parse_range(s: &str) -> Option<RangeInclusive<u32>> {
    let (first, last) = match s.split_once("..") {
        Some((first, last)) => (parse_codepoint(first)?, parse_codepoint(last)?),
        None => {
            let cp = parse_codepoint(s)?;
            (cp, cp)
        }
    };
    (first <= last).then_some(first..=last)
}

fn to_indices(range: RangeInclusive<u32>) -> RangeInclusive<usize> {
    *range.start() as usize..=*range.end() as usize
}

fn parse_unicode_data(text: &str) -> Result<Vec<GeneralCategory>> {
    let mut categories = vec![GeneralCategory::Cn; UNICODE_CODEPOINTS as usize];
    let mut range_first = None;

    for (i, line) in text.lines().enumerate() {
        let lineno = i + 1;
        let mut fields = line.split(';');
        let (Some(cp), Some(name), Some(gc)) = (fields.next(), fields.next(), fields.next()) else {
            continue;
        };

        let cp = parse_codepoint(cp)
            .ok_or_else(|| Error::parse(UNICODE_DATA, lineno, format!("invalid codepoint {cp:?}")))?;
        let gc = GeneralCategory::from_abbr(gc)
            .ok_or_else(|| Error::parse(UNICODE_DATA, lineno, format!("unknown category {gc:?}")))?;

        // Large blocks like CJK ideographs are given as a <..., First> / <..., Last> pair.
        if name.starts_with('<') && name.ends_with(", First>") {
            range_first = Some(cp);
        } else if name.starts_with('<') && name.ends_with(", Last>") {
            let first = range_first.take().ok_or_else(|| {
                Error::parse(UNICODE_DATA, lineno, format!("{name} without a matching First"))
            })?;
            if first > cp {
                return Err(Error::parse(UNICODE_DATA, lineno, "range ends before it starts"));
            }
            categories[to_indices(first..=cp)].fill(gc);
        } else {
            categories[cp as usize] = gc;
        }
    }

    if range_first.is_some() {
        return Err(Error::parse(UNICODE_DATA, text.lines().count(), "unterminated First range"));
    }

    Ok(categories)
}

/// Parses the `range ; value # comment` format shared by most UCD property files.
fn parse_property_file<T: Copy>(
    file: &'static str,
    text: &str,
    default: T,
    from_abbr: impl Fn(&str) -> Option<T>,
) -> Result<Vec<T>> {
    let mut values = vec![default; UNICODE_CODEPOINTS as usize];

    for (i, line) in text.lines().enumerate() {
        let lineno = i + 1;
        let line = line.split('#').next().unwrap_or_default();
        let Some((range, value)) = line.split_once(';') else {
            continue;
        };

        let range = parse_range(range.trim())
            .ok_or_else(|| Error::parse(file, lineno, format!("invalid range {:?}", range.trim())))?;
        let value = value.trim();
        let value = from_abbr(value)
            .ok_or_else(|| Error::parse(file, lineno, format!("unknown value {value:?}")))?;

        values[to_indices(range)].fill(value);
    }

    Ok(values)
}
