// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Compiles per-codepoint Unicode properties into compact three-stage lookup tables.
//!
//! [`trie::compile`] turns any total function over a codepoint domain into a
//! [`trie::CompiledTable`], deduplicating blocks at two levels and bit-packing values.
//! [`ucd::Ucd`] supplies the two properties this is used for: display width and
//! grapheme cluster break class.

pub mod apperr;
pub mod trie;
pub mod ucd;
