// Copyright 2026 the Tame Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Byte-level primitives shared by the module and save-state formats.
//!
//! Both formats are written into an in-memory [`Writer`] and read back through a bounds-checked
//! [`Reader`]; moving the bytes to a file or socket is left to the embedder.

mod leb128;

use core::fmt;

use crate::module::ModuleError;

/// Length of a module digest in bytes.
pub const DIGEST_LEN: usize = 20;

/// A content digest of a module payload.
pub type Digest = [u8; DIGEST_LEN];

/// Deepest nesting of sub-blocks or lists either decoder accepts.
pub const MAX_NESTING: usize = 256;

/// A decode error for module and save-state artifacts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Input ended unexpectedly.
    UnexpectedEof,
    /// An integer encoding was invalid or overflowed.
    InvalidVarint,
    /// A length or count did not fit the target type.
    OutOfBounds,
    /// A UTF-8 string was invalid.
    InvalidUtf8,
    /// The magic bytes did not match.
    BadMagic,
    /// The format version byte is not supported by this decoder.
    UnsupportedVersion {
        /// The version byte that was read.
        version: u8,
    },
    /// An unknown tag byte was encountered.
    UnknownTag {
        /// What the tag was supposed to describe.
        what: &'static str,
        /// The raw tag byte.
        tag: u8,
    },
    /// The stored module digest does not match the digest of the payload that was read.
    DigestMismatch,
    /// A save state was written for a different module.
    ModuleMismatch,
    /// A save state referenced a shared value id that was never defined.
    BadReference {
        /// The unknown reference id.
        id: u64,
    },
    /// A save state or module named an element that does not exist.
    UnknownElement {
        /// The unknown identity.
        identity: String,
    },
    /// Bytes remained after a length-delimited section was fully read.
    TrailingBytes,
    /// Sub-blocks or lists nested deeper than [`MAX_NESTING`].
    NestingTooDeep,
    /// The payload decoded, but did not describe a well-formed module.
    Module(ModuleError),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of input"),
            Self::InvalidVarint => write!(f, "invalid varint encoding"),
            Self::OutOfBounds => write!(f, "length out of bounds"),
            Self::InvalidUtf8 => write!(f, "invalid UTF-8"),
            Self::BadMagic => write!(f, "bad magic header"),
            Self::UnsupportedVersion { version } => write!(f, "unsupported version {version}"),
            Self::UnknownTag { what, tag } => write!(f, "unknown {what} tag {tag:#04x}"),
            Self::DigestMismatch => write!(f, "module digest does not match its payload"),
            Self::ModuleMismatch => write!(f, "save state was written for a different module"),
            Self::BadReference { id } => write!(f, "undefined value reference {id}"),
            Self::UnknownElement { identity } => write!(f, "unknown element `{identity}`"),
            Self::TrailingBytes => write!(f, "trailing bytes after section"),
            Self::NestingTooDeep => write!(f, "nesting deeper than {MAX_NESTING} levels"),
            Self::Module(e) => write!(f, "malformed module: {e}"),
        }
    }
}

impl core::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Module(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ModuleError> for DecodeError {
    fn from(e: ModuleError) -> Self {
        Self::Module(e)
    }
}

/// A byte reader with bounds checks.
#[derive(Clone, Debug)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    /// Creates a reader over `bytes`.
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    /// Returns the current cursor offset.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns `true` once every byte has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offset >= self.bytes.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .offset
            .checked_add(len)
            .ok_or(DecodeError::OutOfBounds)?;
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or(DecodeError::UnexpectedEof)?;
        self.offset = end;
        Ok(slice)
    }

    /// Reads a `u8`.
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    /// Reads a `bool` stored as one byte.
    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64_le(&mut self) -> Result<u64, DecodeError> {
        let b = self.take(8)?;
        let mut raw = [0_u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_le_bytes(raw))
    }

    /// Reads an `f64` stored as its little-endian bit pattern.
    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_bits(self.read_u64_le()?))
    }

    /// Reads an unsigned LEB128 integer.
    pub fn read_uleb(&mut self) -> Result<u64, DecodeError> {
        leb128::read_uleb(self.bytes, &mut self.offset)
    }

    /// Reads an unsigned LEB128 count or length as `usize`.
    pub fn read_len(&mut self) -> Result<usize, DecodeError> {
        usize::try_from(self.read_uleb()?).map_err(|_| DecodeError::OutOfBounds)
    }

    /// Reads a signed LEB128 integer.
    pub fn read_sleb(&mut self) -> Result<i64, DecodeError> {
        leb128::read_sleb(self.bytes, &mut self.offset)
    }

    /// Reads exactly `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        self.take(len)
    }

    /// Reads a fixed-size module digest.
    pub fn read_digest(&mut self) -> Result<Digest, DecodeError> {
        let mut digest = [0_u8; DIGEST_LEN];
        digest.copy_from_slice(self.take(DIGEST_LEN)?);
        Ok(digest)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_str(&mut self) -> Result<&'a str, DecodeError> {
        let len = self.read_len()?;
        let b = self.take(len)?;
        core::str::from_utf8(b).map_err(|_| DecodeError::InvalidUtf8)
    }

    /// Reads a length-prefixed UTF-8 string into an owned `String`.
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        self.read_str().map(String::from)
    }

    /// Reads and checks a magic header.
    pub fn expect_magic(&mut self, magic: &[u8]) -> Result<(), DecodeError> {
        match self.take(magic.len()) {
            Ok(b) if b == magic => Ok(()),
            Ok(_) | Err(DecodeError::UnexpectedEof) => Err(DecodeError::BadMagic),
            Err(e) => Err(e),
        }
    }
}

/// A growable byte writer.
#[derive(Clone, Debug, Default)]
pub struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Returns the written bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the writer and returns the underlying buffer.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    /// Appends a `u8`.
    pub fn write_u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    /// Appends a `bool` as one byte.
    pub fn write_bool(&mut self, v: bool) {
        self.bytes.push(u8::from(v));
    }

    /// Appends a little-endian `u64`.
    pub fn write_u64_le(&mut self, v: u64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends an `f64` as its little-endian bit pattern.
    pub fn write_f64(&mut self, v: f64) {
        self.write_u64_le(v.to_bits());
    }

    /// Appends an unsigned LEB128 integer.
    pub fn write_uleb(&mut self, v: u64) {
        leb128::write_uleb(&mut self.bytes, v);
    }

    /// Appends a count or length as an unsigned LEB128 integer.
    pub fn write_len(&mut self, len: usize) {
        // usize is at most 64 bits on every supported target.
        self.write_uleb(len as u64);
    }

    /// Appends a signed LEB128 integer.
    pub fn write_sleb(&mut self, v: i64) {
        leb128::write_sleb(&mut self.bytes, v);
    }

    /// Appends raw bytes.
    pub fn write_bytes(&mut self, b: &[u8]) {
        self.bytes.extend_from_slice(b);
    }

    /// Appends a length-prefixed UTF-8 string.
    pub fn write_str(&mut self, s: &str) {
        self.write_len(s.len());
        self.write_bytes(s.as_bytes());
    }
}
