//! Attribute addressing and typed values
//!
//! Attributes carry no value storage in the entity graph; every read and
//! write goes through the backend. This module provides:
//!
//! - [`AttrTarget`] - Which scope an attribute lives in (device, debug or channel)
//! - [`AttrValue`] - Textual parse/format for typed reads and writes
//! - [`codec`] - The batch wire format used by the `*_all` operations
//!
//! # Typed values
//!
//! Typed reads perform a plain string read and parse it; typed writes format
//! the value before a plain string write. Booleans are written as `1`/`0`
//! and read as integers where any non-zero value is true. Integers accept
//! decimal and `0x` hexadecimal. Trailing whitespace, newlines and NUL bytes
//! are ignored when parsing.

pub mod codec;

use crate::error::{IioError, Result};
use crate::types::ChannelKey;
use serde::{Deserialize, Serialize};

/// The scope an attribute belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrTarget {
    /// Device-level attribute of the given device id
    Device(String),
    /// Debug attribute of the given device id
    Debug(String),
    /// Channel attribute
    Channel(ChannelKey),
}

impl AttrTarget {
    /// Id of the device owning the attribute
    pub fn device(&self) -> &str {
        match self {
            AttrTarget::Device(id) | AttrTarget::Debug(id) => id,
            AttrTarget::Channel(key) => &key.device,
        }
    }
}

impl std::fmt::Display for AttrTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrTarget::Device(id) => write!(f, "device {}", id),
            AttrTarget::Debug(id) => write!(f, "debug {}", id),
            AttrTarget::Channel(key) => write!(f, "channel {}", key),
        }
    }
}

/// Strip the terminators a backend may leave after a textual value
pub fn trim_value(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

/// A value that can be stored in an attribute's textual form
pub trait AttrValue: Sized {
    /// Human-readable type name used in mismatch errors
    const TYPE_NAME: &'static str;

    /// Parse the textual form read from attribute `attr`
    fn parse_attr(attr: &str, raw: &str) -> Result<Self>;

    /// Canonical textual form
    fn format_attr(&self) -> String;
}

fn mismatch(attr: &str, raw: &str, expected: &'static str) -> IioError {
    IioError::TypeMismatch {
        attr: attr.to_string(),
        value: raw.to_string(),
        expected,
    }
}

impl AttrValue for i64 {
    const TYPE_NAME: &'static str = "integer";

    fn parse_attr(attr: &str, raw: &str) -> Result<Self> {
        let text = raw.trim_matches(|c: char| c == '\0' || c.is_whitespace());
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        // Reject a second sign hidden behind the one we stripped
        if digits.starts_with(['+', '-']) {
            return Err(mismatch(attr, raw, Self::TYPE_NAME));
        }
        // The magnitude of i64::MIN only fits unsigned
        let magnitude = match digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
        {
            Some(hex) if hex.starts_with(['+', '-']) => {
                return Err(mismatch(attr, raw, Self::TYPE_NAME));
            }
            Some(hex) => u64::from_str_radix(hex, 16),
            None => digits.parse::<u64>(),
        }
        .map_err(|_| mismatch(attr, raw, Self::TYPE_NAME))?;
        let value = if negative {
            -i128::from(magnitude)
        } else {
            i128::from(magnitude)
        };
        i64::try_from(value).map_err(|_| mismatch(attr, raw, Self::TYPE_NAME))
    }

    fn format_attr(&self) -> String {
        self.to_string()
    }
}

impl AttrValue for bool {
    const TYPE_NAME: &'static str = "boolean";

    fn parse_attr(attr: &str, raw: &str) -> Result<Self> {
        i64::parse_attr(attr, raw)
            .map(|v| v != 0)
            .map_err(|_| mismatch(attr, raw, Self::TYPE_NAME))
    }

    fn format_attr(&self) -> String {
        if *self { "1" } else { "0" }.to_string()
    }
}

impl AttrValue for f64 {
    const TYPE_NAME: &'static str = "floating-point number";

    fn parse_attr(attr: &str, raw: &str) -> Result<Self> {
        raw.trim_matches(|c: char| c == '\0' || c.is_whitespace())
            .parse::<f64>()
            .map_err(|_| mismatch(attr, raw, Self::TYPE_NAME))
    }

    fn format_attr(&self) -> String {
        self.to_string()
    }
}

impl AttrValue for String {
    const TYPE_NAME: &'static str = "string";

    fn parse_attr(_attr: &str, raw: &str) -> Result<Self> {
        Ok(raw.to_string())
    }

    fn format_attr(&self) -> String {
        self.clone()
    }
}
