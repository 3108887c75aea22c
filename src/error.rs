// Copyright 2023 - 2024 Wenmeng See the COPYRIGHT
// file at the top-level directory of this distribution.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//
// Author: tickbh
// -----
// Created Date: 2024/03/11 09:21:47

use std::{fmt, result};

/// Represents the error variants that the `HuffmanDecoder` can return.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum HuffmanDecoderError {
    /// Any padding strictly larger than 7 bits MUST be interpreted as an error
    PaddingTooLarge,
    /// Any padding that does not correspond to the most significant bits of
    /// EOS MUST be interpreted as an error.
    InvalidPadding,
    /// If EOS is ever found in the string, it causes an error.
    EOSInString,
}

impl HuffmanDecoderError {
    #[inline]
    pub fn description_str(&self) -> &'static str {
        match *self {
            HuffmanDecoderError::PaddingTooLarge => "huffman padding longer than 7 bits",
            HuffmanDecoderError::InvalidPadding => "huffman padding is not an EOS prefix",
            HuffmanDecoderError::EOSInString => "huffman EOS symbol inside a string",
        }
    }
}

/// Represents all errors that can be returned by the codec.
///
/// Every variant other than `BlockContinues`, `InvalidArgument` and `Busy`
/// leaves the instance defunct, after which only dropping it is useful.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum HpackError {
    /// The block was cut and decoding suspended, resume with more input.
    BlockContinues,
    /// Misuse of the API, or any call on a defunct instance.
    InvalidArgument,
    /// The input ended in the middle of an element.
    BufferExhausted,
    /// A prefixed integer does not fit in 16 bits.
    IntegerOverflow,
    /// A table size update exceeds the advertised maximum.
    SizeExceeded,
    /// The Huffman-coded string was malformed.
    Huffman(HuffmanDecoderError),
    /// A header name or value contains an illegal octet.
    InvalidCharacter,
    /// A table index is out of range.
    IndexOutOfBounds,
    /// A table size update appeared after the block head.
    UpdateNotAllowed,
    /// A required table size update is missing or does not match.
    MissingSizeUpdate,
    /// The allocation backing the table could not grow.
    OutOfMemory,
    /// The block ended mid-representation without cut being set.
    Truncated,
    /// The instance is suspended mid-block, only decode may be called.
    Busy,
    /// A string is longer than the 16-bit wire limit.
    FieldTooBig,
    /// Growth or trim on a fixed-capacity table.
    ReallocForbidden,
    /// An oversized field was skipped by degraded decoding.
    FieldSkipped,
}

impl HpackError {
    #[inline]
    pub fn description_str(&self) -> &'static str {
        match *self {
            HpackError::BlockContinues => "block continues, resume with more input",
            HpackError::InvalidArgument => "invalid argument or defunct instance",
            HpackError::BufferExhausted => "not enough input octets",
            HpackError::IntegerOverflow => "integer does not fit in 16 bits",
            HpackError::SizeExceeded => "table size update beyond the maximum",
            HpackError::Huffman(ref e) => e.description_str(),
            HpackError::InvalidCharacter => "illegal header character",
            HpackError::IndexOutOfBounds => "header index out of bounds",
            HpackError::UpdateNotAllowed => "size update after the block head",
            HpackError::MissingSizeUpdate => "expected table size update is missing",
            HpackError::OutOfMemory => "table allocation failed",
            HpackError::Truncated => "truncated header block",
            HpackError::Busy => "operation while a block is suspended",
            HpackError::FieldTooBig => "string longer than the wire limit",
            HpackError::ReallocForbidden => "fixed table cannot change capacity",
            HpackError::FieldSkipped => "oversized field skipped",
        }
    }

    /// True for the resumable cut-decode suspension, false for everything
    /// fatal.
    pub fn is_partial(&self) -> bool {
        match self {
            HpackError::BlockContinues => true,
            _ => false,
        }
    }

    /// True when the error must mark the instance defunct.
    pub(crate) fn is_fatal(&self) -> bool {
        match self {
            HpackError::BlockContinues | HpackError::InvalidArgument | HpackError::Busy => false,
            _ => true,
        }
    }
}

impl fmt::Display for HpackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description_str())
    }
}

impl From<HuffmanDecoderError> for HpackError {
    fn from(e: HuffmanDecoderError) -> Self {
        HpackError::Huffman(e)
    }
}

pub type HpackResult<T> = result::Result<T, HpackError>;
