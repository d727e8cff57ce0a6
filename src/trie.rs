// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Three-stage lookup tables for per-codepoint properties.
//!
//! A property function `f: codepoint -> value` is compiled into
//! * a top index with one entry per `1 << shift0` codepoints,
//! * a deduplicated table of mid blocks, each holding `1 << block1_bits` leaf indices,
//! * a deduplicated table of leaf blocks, each holding `1 << block2_bits` bytes.
//!
//! Leaf bytes carry `1 << val_bits` values each, lowest sub-slot in the lowest bits.
//! A lookup is three array reads plus a shift and a mask, see [`CompiledTable::lookup`].

use std::collections::HashMap;
use std::hash::Hash;
use std::ops::RangeInclusive;

use rayon::prelude::*;
use tracing::debug;

use crate::apperr::{Error, Result};

/// Number of Unicode codepoints, U+0000 to U+10FFFF.
pub const UNICODE_CODEPOINTS: u32 = 0x110000;

/// Block and value widths of a trie, all as powers of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrieConfig {
    /// log2 of the number of leaf indices in a mid block.
    pub block1_bits: u32,
    /// log2 of the number of bytes in a leaf block.
    pub block2_bits: u32,
    /// log2 of the number of values packed into one byte (0..=3).
    pub val_bits: u32,
}

impl Default for TrieConfig {
    fn default() -> Self {
        Self { block1_bits: 5, block2_bits: 4, val_bits: 0 }
    }
}

impl TrieConfig {
    pub const fn new(block1_bits: u32, block2_bits: u32, val_bits: u32) -> Self {
        Self { block1_bits, block2_bits, val_bits }
    }

    /// Checks that `count` codepoints can be split into whole blocks and
    /// that values pack evenly into bytes.
    pub fn validate(&self, count: u32) -> Result<()> {
        if count == 0 {
            return Err(Error::config("the domain must contain at least one codepoint"));
        }
        if self.val_bits > 3 {
            return Err(Error::config(format!(
                "val_bits={} would pack {} values into a byte",
                self.val_bits,
                1u64 << self.val_bits.min(63)
            )));
        }

        let shift0 = self.block1_bits as u64 + self.block2_bits as u64 + self.val_bits as u64;
        if shift0 >= 32 {
            return Err(Error::config(format!(
                "top-level blocks of 2^{shift0} codepoints exceed the 32-bit domain"
            )));
        }

        let top_block = 1u32 << shift0;
        if count % top_block != 0 {
            return Err(Error::config(format!(
                "{count:#x} codepoints don't divide into top-level blocks of {top_block:#x}"
            )));
        }

        Ok(())
    }

    /// Derives the shift and mask constants a lookup needs.
    /// Only meaningful for a configuration that passed [`TrieConfig::validate`],
    /// but saturates instead of overflowing for one that didn't.
    pub fn shifts(&self) -> TrieShifts {
        let val_pack_shift = 8u32.checked_shr(self.val_bits).unwrap_or(0);
        TrieShifts {
            shift0: self.block1_bits.saturating_add(self.block2_bits).saturating_add(self.val_bits),
            shift1: self.block2_bits.saturating_add(self.val_bits),
            shift2: self.val_bits,
            mask1: low_mask(self.block1_bits),
            mask2: low_mask(self.block2_bits),
            mask3: low_mask(self.val_bits),
            val_pack_shift,
            val_pack_mask: low_mask(val_pack_shift),
        }
    }
}

/// A mask of the lowest `bits` bits, all ones from 32 on.
fn low_mask(bits: u32) -> u32 {
    1u32.checked_shl(bits).map_or(u32::MAX, |bit| bit - 1)
}

/// The constants used to split a codepoint into its array indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrieShifts {
    /// `cp >> shift0` indexes the top array.
    pub shift0: u32,
    /// `(cp >> shift1) & mask1` indexes a mid block.
    pub shift1: u32,
    /// `(cp >> shift2) & mask2` indexes a leaf block.
    pub shift2: u32,
    pub mask1: u32,
    pub mask2: u32,
    /// `cp & mask3` is the sub-slot within a leaf byte.
    pub mask3: u32,
    /// Bit width of a single packed value.
    pub val_pack_shift: u32,
    /// Largest value that fits into a packed slot.
    pub val_pack_mask: u32,
}

impl TrieShifts {
    pub fn codepoints_per_leaf(&self) -> usize {
        1 << self.shift1
    }

    pub fn leaves_per_mid(&self) -> usize {
        self.mask1 as usize + 1
    }

    pub fn bytes_per_leaf(&self) -> usize {
        self.mask2 as usize + 1
    }

    pub fn values_per_byte(&self) -> usize {
        self.mask3 as usize + 1
    }
}

/// The narrowest unsigned integer type that can hold every entry of an index array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IndexWidth {
    U8,
    U16,
    U32,
}

impl IndexWidth {
    pub fn for_max(max: usize) -> Self {
        match max {
            0..0x100 => IndexWidth::U8,
            0x100..0x10000 => IndexWidth::U16,
            _ => IndexWidth::U32,
        }
    }

    pub fn bits(self) -> usize {
        match self {
            IndexWidth::U8 => 8,
            IndexWidth::U16 => 16,
            IndexWidth::U32 => 32,
        }
    }

    pub fn bytes(self) -> usize {
        self.bits() / 8
    }
}

/// Assigns each distinct block an index in first-seen order.
struct Interner<K, V> {
    cache: HashMap<Vec<K>, u32>,
    blocks: Vec<V>,
}

impl<K: Hash + Eq + Clone, V> Interner<K, V> {
    fn new() -> Self {
        Self { cache: HashMap::new(), blocks: Vec::new() }
    }

    /// `store` turns the block into its stored form and is only called for unseen blocks.
    /// Equality is decided on `key`, never on the stored form.
    fn intern(&mut self, key: &[K], store: impl FnOnce(&[K]) -> V) -> u32 {
        if let Some(&index) = self.cache.get(key) {
            return index;
        }
        let index = self.blocks.len() as u32;
        self.blocks.push(store(key));
        self.cache.insert(key.to_vec(), index);
        index
    }

    fn into_blocks(self) -> Vec<V> {
        self.blocks
    }
}

/// Packs `values_per_byte` raw values into each byte, sub-slot 0 in the low bits.
fn pack(raw: &[u8], shifts: &TrieShifts) -> Vec<u8> {
    raw.chunks_exact(shifts.values_per_byte())
        .map(|chunk| {
            chunk.iter().enumerate().fold(0u8, |acc, (slot, &value)| {
                acc | (value << (slot as u32 * shifts.val_pack_shift))
            })
        })
        .collect()
}

/// Compiles `f` over `[0, count)` into a three-stage table.
///
/// The configuration is validated before `f` is called even once.
/// Compilation stops at the first value that doesn't fit into a packed slot.
pub fn compile<F>(count: u32, config: TrieConfig, mut f: F) -> Result<CompiledTable>
where
    F: FnMut(u32) -> u32,
{
    config.validate(count)?;

    let shifts = config.shifts();
    let top_len = (count >> shifts.shift0) as usize;
    let per_leaf = shifts.codepoints_per_leaf();
    let leaves_per_mid = shifts.leaves_per_mid();

    let mut leaves: Interner<u8, Vec<u8>> = Interner::new();
    let mut mids: Interner<u32, Vec<u32>> = Interner::new();
    let mut top = Vec::with_capacity(top_len);
    let mut raw = Vec::with_capacity(per_leaf);
    let mut mid = Vec::with_capacity(leaves_per_mid);
    let mut cp = 0u32;

    for _ in 0..top_len {
        mid.clear();
        for _ in 0..leaves_per_mid {
            raw.clear();
            for _ in 0..per_leaf {
                let value = f(cp);
                if value > shifts.val_pack_mask {
                    return Err(Error::ValueOutOfRange { cp, value, max: shifts.val_pack_mask });
                }
                raw.push(value as u8);
                cp += 1;
            }
            mid.push(leaves.intern(&raw, |raw| pack(raw, &shifts)));
        }
        top.push(mids.intern(&mid, <[u32]>::to_vec));
    }

    let table = CompiledTable {
        config,
        shifts,
        count,
        top,
        mid: mids.into_blocks(),
        leaves: leaves.into_blocks(),
    };

    debug!(
        ?config,
        top = table.top.len(),
        mid_blocks = table.mid.len(),
        leaf_blocks = table.leaves.len(),
        total_size = table.total_size(),
        flat_size = table.flat_size(),
        "compiled trie"
    );

    Ok(table)
}

/// Compiles `f` with every combination of `block1_bits` and `block2_bits` in `block_bits`
/// and returns the smallest table. Ties go to the combination enumerated first.
///
/// Combinations that don't divide `count` evenly are skipped.
pub fn build_best<F>(
    count: u32,
    val_bits: u32,
    block_bits: RangeInclusive<u32>,
    f: F,
) -> Result<CompiledTable>
where
    F: Fn(u32) -> u32,
{
    let candidates: Vec<TrieConfig> = block_bits
        .clone()
        .flat_map(|b1| block_bits.clone().map(move |b2| TrieConfig::new(b1, b2, val_bits)))
        .filter(|config| config.validate(count).is_ok())
        .collect();
    if candidates.is_empty() {
        return Err(Error::config(format!(
            "no block sizes in {block_bits:?} fit {count:#x} codepoints with val_bits={val_bits}"
        )));
    }

    // Evaluate `f` once. The candidates then only differ in how they slice it up.
    let values: Vec<u32> = (0..count).map(f).collect();

    // `try_reduce_with` combines neighbours in order, so keeping `a` on ties keeps the
    // earliest candidate. At most one table per worker is alive at a time.
    let best = candidates
        .par_iter()
        .map(|&config| compile(count, config, |cp| values[cp as usize]))
        .try_reduce_with(|a, b| Ok(if b.total_size() < a.total_size() { b } else { a }))
        .ok_or_else(|| Error::config("no trie candidates"))??;

    debug!(config = ?best.config, total_size = best.total_size(), "picked trie configuration");
    Ok(best)
}

/// The output of [`compile`]. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledTable {
    config: TrieConfig,
    shifts: TrieShifts,
    count: u32,
    top: Vec<u32>,
    mid: Vec<Vec<u32>>,
    leaves: Vec<Vec<u8>>,
}

impl CompiledTable {
    pub fn config(&self) -> TrieConfig {
        self.config
    }

    pub fn shifts(&self) -> &TrieShifts {
        &self.shifts
    }

    /// Size of the domain the table was compiled over.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Mid-table index per top-level block.
    pub fn top(&self) -> &[u32] {
        &self.top
    }

    /// Distinct mid blocks, each a list of leaf-table indices.
    pub fn mid(&self) -> &[Vec<u32>] {
        &self.mid
    }

    /// Distinct leaf blocks in packed form.
    pub fn leaves(&self) -> &[Vec<u8>] {
        &self.leaves
    }

    pub fn top_width(&self) -> IndexWidth {
        IndexWidth::for_max(self.mid.len().saturating_sub(1))
    }

    pub fn mid_width(&self) -> IndexWidth {
        IndexWidth::for_max(self.leaves.len().saturating_sub(1))
    }

    /// Returns the value stored for `cp` or `None` if it's outside the domain.
    #[inline]
    pub fn lookup(&self, cp: u32) -> Option<u8> {
        if cp >= self.count {
            return None;
        }
        let s = &self.shifts;
        let mid = self.top[(cp >> s.shift0) as usize] as usize;
        let leaf = self.mid[mid][((cp >> s.shift1) & s.mask1) as usize] as usize;
        let byte = self.leaves[leaf][((cp >> s.shift2) & s.mask2) as usize];
        Some((byte >> ((cp & s.mask3) * s.val_pack_shift)) & s.val_pack_mask as u8)
    }

    /// Checks every codepoint of the domain against `f`.
    pub fn verify<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(u32) -> u32,
    {
        for cp in 0..self.count {
            let expected = f(cp);
            let actual = self.lookup(cp).map_or(u32::MAX, u32::from);
            if expected != actual {
                return Err(Error::Mismatch { cp, expected, actual });
            }
        }
        Ok(())
    }

    /// Bytes taken up by the three arrays, each stored with its narrowest element type.
    pub fn total_size(&self) -> usize {
        let top = self.top.len() * self.top_width().bytes();
        let mid = self.mid.len() * self.shifts.leaves_per_mid() * self.mid_width().bytes();
        let leaves = self.leaves.len() * self.shifts.bytes_per_leaf();
        top + mid + leaves
    }

    /// Bytes a flat, packed array over the whole domain would take.
    pub fn flat_size(&self) -> usize {
        self.count as usize / self.shifts.values_per_byte()
    }
}
