// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types shared by the table compiler and the UCD parser.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The block/value widths don't fit the domain. Detected before compilation starts.
    #[error("invalid trie configuration: {0}")]
    Config(String),

    /// The property function produced a value that doesn't fit into `val_bits`.
    #[error("value {value} for U+{cp:04X} exceeds the maximum of {max}")]
    ValueOutOfRange { cp: u32, value: u32, max: u32 },

    /// A compiled table disagrees with the function it was compiled from.
    #[error("lookup mismatch for U+{cp:04X}: expected {expected}, got {actual}")]
    Mismatch { cp: u32, expected: u32, actual: u32 },

    /// A malformed line in one of the UCD text files.
    #[error("{file}:{line}: {message}")]
    Parse { file: &'static str, line: usize, message: String },
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn parse(file: &'static str, line: usize, msg: impl Into<String>) -> Self {
        Error::Parse { file, line, message: msg.into() }
    }

    /// Configuration errors are the ones that can be caught before running a pass.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_) | Error::ValueOutOfRange { .. })
    }
}
