//! Core data types for iio-core
//!
//! This module contains the fundamental value types shared by the converter,
//! the entity graph and the buffer layer.
//!
//! # Main Types
//!
//! - [`Direction`] - Whether a channel produces (input) or consumes (output) samples
//! - [`DataFormat`] - Bit-level description of a channel's raw sample encoding
//! - [`SampleKind`] - Host-side representation chosen for a format
//! - [`Sample`] - A single converted host value
//!
//! # Textual Format
//!
//! A [`DataFormat`] can be written and parsed in the kernel's scan-element
//! notation, e.g. `le:s12/16>>4`: little endian, signed, 12 valid bits in a
//! 16-bit container, shifted right by 4. An upper-case sign letter (`S`/`U`)
//! marks the field as fully defined.

use crate::error::{IioError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Container sizes accepted for a sample, in bits
pub const CONTAINER_LENGTHS: [u32; 4] = [8, 16, 32, 64];

/// Direction of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Produces samples (ADC side)
    #[default]
    Input,
    /// Consumes samples (DAC side)
    Output,
}

impl Direction {
    /// Returns true for output channels
    pub fn is_output(&self) -> bool {
        matches!(self, Direction::Output)
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// Identity of a channel within a context
///
/// Channel ids are only unique per direction, so the direction is part of
/// the key (`voltage0` may exist both as input and output).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelKey {
    /// Id of the owning device
    pub device: String,
    /// Id of the channel
    pub channel: String,
    /// Direction of the channel
    pub direction: Direction,
}

impl ChannelKey {
    /// Create a new channel key
    pub fn new(device: impl Into<String>, channel: impl Into<String>, direction: Direction) -> Self {
        Self {
            device: device.into(),
            channel: channel.into(),
            direction,
        }
    }
}

impl AsRef<ChannelKey> for ChannelKey {
    fn as_ref(&self) -> &ChannelKey {
        self
    }
}

impl std::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} ({})", self.device, self.channel, self.direction)
    }
}

/// Bit-level layout of one hardware sample
///
/// `bits` bits of payload live at bit offset `shift` inside a `length`-bit
/// container stored with the given endianness.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataFormat {
    /// Total length of the container, in bits
    pub length: u32,
    /// Number of valid payload bits
    pub bits: u32,
    /// Offset of the payload within the container
    pub shift: u32,
    /// Payload is two's complement
    pub is_signed: bool,
    /// Payload is already sign extended / zero padded by the hardware
    pub is_fully_defined: bool,
    /// Container is big endian
    pub is_be: bool,
    /// Apply `scale` when converting
    pub with_scale: bool,
    /// Linear scale factor, meaningful only if `with_scale` is set
    pub scale: f64,
}

impl DataFormat {
    /// Create an unsigned little-endian format with no shift and no scale
    pub fn new(length: u32, bits: u32) -> Self {
        Self {
            length,
            bits,
            shift: 0,
            is_signed: false,
            is_fully_defined: false,
            is_be: false,
            with_scale: false,
            scale: 1.0,
        }
    }

    /// Set the payload offset
    pub fn with_shift(mut self, shift: u32) -> Self {
        self.shift = shift;
        self
    }

    /// Mark the payload as two's complement
    pub fn signed(mut self) -> Self {
        self.is_signed = true;
        self
    }

    /// Mark the payload as already sign extended by the hardware
    pub fn fully_defined(mut self) -> Self {
        self.is_fully_defined = true;
        self
    }

    /// Mark the container as big endian
    pub fn big_endian(mut self) -> Self {
        self.is_be = true;
        self
    }

    /// Attach a linear scale factor
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.with_scale = true;
        self.scale = scale;
        self
    }

    /// Check the structural constraints of the format
    ///
    /// Returns the format itself so it can be used at the end of a builder chain.
    pub fn validate(self) -> Result<Self> {
        if !CONTAINER_LENGTHS.contains(&self.length) {
            return Err(IioError::InvalidArgument(format!(
                "container length {} is not one of {:?}",
                self.length, CONTAINER_LENGTHS
            )));
        }
        if self.bits == 0 || self.bits > self.length {
            return Err(IioError::InvalidArgument(format!(
                "{} valid bits do not fit a {}-bit container",
                self.bits, self.length
            )));
        }
        if self.shift + self.bits > self.length {
            return Err(IioError::InvalidArgument(format!(
                "field [{}, {}) exceeds a {}-bit container",
                self.shift,
                self.shift + self.bits,
                self.length
            )));
        }
        if self.with_scale && (!self.scale.is_finite() || self.scale == 0.0) {
            return Err(IioError::InvalidArgument(format!(
                "scale {} is not a usable factor",
                self.scale
            )));
        }
        Ok(self)
    }

    /// Size of the container in bytes
    pub fn storage_bytes(&self) -> usize {
        self.length.div_ceil(8) as usize
    }

    /// Host representation produced by conversion
    pub fn host_kind(&self) -> SampleKind {
        if self.with_scale {
            return SampleKind::F64;
        }
        match (self.bits, self.is_signed) {
            (0..=8, false) => SampleKind::U8,
            (0..=8, true) => SampleKind::I8,
            (9..=16, false) => SampleKind::U16,
            (9..=16, true) => SampleKind::I16,
            (17..=32, false) => SampleKind::U32,
            (17..=32, true) => SampleKind::I32,
            (_, false) => SampleKind::U64,
            (_, true) => SampleKind::I64,
        }
    }
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = match (self.is_signed, self.is_fully_defined) {
            (true, false) => 's',
            (true, true) => 'S',
            (false, false) => 'u',
            (false, true) => 'U',
        };
        write!(
            f,
            "{}:{}{}/{}>>{}",
            if self.is_be { "be" } else { "le" },
            sign,
            self.bits,
            self.length,
            self.shift
        )
    }
}

impl FromStr for DataFormat {
    type Err = IioError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || IioError::InvalidArgument(format!("malformed data format '{}'", s));

        let (endian, rest) = s.trim().split_once(':').ok_or_else(invalid)?;
        let is_be = match endian {
            "le" => false,
            "be" => true,
            _ => return Err(invalid()),
        };

        let mut chars = rest.chars();
        let (is_signed, is_fully_defined) = match chars.next() {
            Some('s') => (true, false),
            Some('S') => (true, true),
            Some('u') => (false, false),
            Some('U') => (false, true),
            _ => return Err(invalid()),
        };

        let (bits, rest) = chars.as_str().split_once('/').ok_or_else(invalid)?;
        let (length, shift) = match rest.split_once(">>") {
            Some((length, shift)) => (length, shift),
            None => (rest, "0"),
        };

        let parse = |v: &str| v.parse::<u32>().map_err(|_| invalid());
        Ok(DataFormat {
            length: parse(length)?,
            bits: parse(bits)?,
            shift: parse(shift)?,
            is_signed,
            is_fully_defined,
            is_be,
            with_scale: false,
            scale: 1.0,
        })
    }
}

/// Host-side representation of a converted sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleKind {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    /// Scaled value
    F64,
}

impl SampleKind {
    /// Returns the size in bytes of this representation
    pub fn size_bytes(&self) -> usize {
        match self {
            SampleKind::U8 | SampleKind::I8 => 1,
            SampleKind::U16 | SampleKind::I16 => 2,
            SampleKind::U32 | SampleKind::I32 => 4,
            SampleKind::U64 | SampleKind::I64 | SampleKind::F64 => 8,
        }
    }
}

impl std::fmt::Display for SampleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleKind::U8 => write!(f, "u8"),
            SampleKind::U16 => write!(f, "u16"),
            SampleKind::U32 => write!(f, "u32"),
            SampleKind::U64 => write!(f, "u64"),
            SampleKind::I8 => write!(f, "i8"),
            SampleKind::I16 => write!(f, "i16"),
            SampleKind::I32 => write!(f, "i32"),
            SampleKind::I64 => write!(f, "i64"),
            SampleKind::F64 => write!(f, "f64"),
        }
    }
}

/// A converted sample in host representation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F64(f64),
}

impl Sample {
    /// Build a sample of the given kind from two's complement bits, truncating
    /// to the kind's width. `F64` interprets the bits as a signed integer.
    pub fn from_bits(kind: SampleKind, bits: u64) -> Self {
        match kind {
            SampleKind::U8 => Sample::U8(bits as u8),
            SampleKind::U16 => Sample::U16(bits as u16),
            SampleKind::U32 => Sample::U32(bits as u32),
            SampleKind::U64 => Sample::U64(bits),
            SampleKind::I8 => Sample::I8(bits as i8),
            SampleKind::I16 => Sample::I16(bits as i16),
            SampleKind::I32 => Sample::I32(bits as i32),
            SampleKind::I64 => Sample::I64(bits as i64),
            SampleKind::F64 => Sample::F64(bits as i64 as f64),
        }
    }

    /// Representation of this sample
    pub fn kind(&self) -> SampleKind {
        match self {
            Sample::U8(_) => SampleKind::U8,
            Sample::U16(_) => SampleKind::U16,
            Sample::U32(_) => SampleKind::U32,
            Sample::U64(_) => SampleKind::U64,
            Sample::I8(_) => SampleKind::I8,
            Sample::I16(_) => SampleKind::I16,
            Sample::I32(_) => SampleKind::I32,
            Sample::I64(_) => SampleKind::I64,
            Sample::F64(_) => SampleKind::F64,
        }
    }

    /// Numeric value as a float
    pub fn as_f64(&self) -> f64 {
        match *self {
            Sample::U8(v) => v as f64,
            Sample::U16(v) => v as f64,
            Sample::U32(v) => v as f64,
            Sample::U64(v) => v as f64,
            Sample::I8(v) => v as f64,
            Sample::I16(v) => v as f64,
            Sample::I32(v) => v as f64,
            Sample::I64(v) => v as f64,
            Sample::F64(v) => v,
        }
    }

    /// Two's complement bits of the integer value, sign extended to 64 bits.
    /// Floats are truncated toward zero first.
    pub fn to_bits(&self) -> u64 {
        match *self {
            Sample::U8(v) => v as u64,
            Sample::U16(v) => v as u64,
            Sample::U32(v) => v as u64,
            Sample::U64(v) => v,
            Sample::I8(v) => v as i64 as u64,
            Sample::I16(v) => v as i64 as u64,
            Sample::I32(v) => v as i64 as u64,
            Sample::I64(v) => v as u64,
            Sample::F64(v) => v.trunc() as i64 as u64,
        }
    }

    /// Write the value as host-native bytes
    ///
    /// Returns the number of bytes written, or 0 if `dst` is too short.
    pub fn write_ne(&self, dst: &mut [u8]) -> usize {
        let size = self.kind().size_bytes();
        if dst.len() < size {
            return 0;
        }
        match *self {
            Sample::U8(v) => dst[0] = v,
            Sample::I8(v) => dst[0] = v as u8,
            Sample::U16(v) => dst[..2].copy_from_slice(&v.to_ne_bytes()),
            Sample::I16(v) => dst[..2].copy_from_slice(&v.to_ne_bytes()),
            Sample::U32(v) => dst[..4].copy_from_slice(&v.to_ne_bytes()),
            Sample::I32(v) => dst[..4].copy_from_slice(&v.to_ne_bytes()),
            Sample::U64(v) => dst[..8].copy_from_slice(&v.to_ne_bytes()),
            Sample::I64(v) => dst[..8].copy_from_slice(&v.to_ne_bytes()),
            Sample::F64(v) => dst[..8].copy_from_slice(&v.to_ne_bytes()),
        }
        size
    }

    /// Read a value of the given kind from host-native bytes
    pub fn read_ne(kind: SampleKind, src: &[u8]) -> Option<Self> {
        let size = kind.size_bytes();
        if src.len() < size {
            return None;
        }
        let mut buf = [0u8; 8];
        buf[..size].copy_from_slice(&src[..size]);
        Some(match kind {
            SampleKind::U8 => Sample::U8(buf[0]),
            SampleKind::I8 => Sample::I8(buf[0] as i8),
            SampleKind::U16 => Sample::U16(u16::from_ne_bytes([buf[0], buf[1]])),
            SampleKind::I16 => Sample::I16(i16::from_ne_bytes([buf[0], buf[1]])),
            SampleKind::U32 => Sample::U32(u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]])),
            SampleKind::I32 => Sample::I32(i32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]])),
            SampleKind::U64 => Sample::U64(u64::from_ne_bytes(buf)),
            SampleKind::I64 => Sample::I64(i64::from_ne_bytes(buf)),
            SampleKind::F64 => Sample::F64(f64::from_ne_bytes(buf)),
        })
    }
}

impl std::fmt::Display for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sample::U8(v) => write!(f, "{}", v),
            Sample::U16(v) => write!(f, "{}", v),
            Sample::U32(v) => write!(f, "{}", v),
            Sample::U64(v) => write!(f, "{}", v),
            Sample::I8(v) => write!(f, "{}", v),
            Sample::I16(v) => write!(f, "{}", v),
            Sample::I32(v) => write!(f, "{}", v),
            Sample::I64(v) => write!(f, "{}", v),
            Sample::F64(v) => write!(f, "{}", v),
        }
    }
}
