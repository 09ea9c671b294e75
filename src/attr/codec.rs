//! Attribute batch wire blocks
//!
//! Every attribute of a scope is transferred in one exchange. The exchange is
//! a plain concatenation of blocks, one per attribute, in the scope's
//! declaration order:
//!
//! ```text
//! i32 header, network byte order
//!   header <  0 : -errno, no payload follows
//!   header >= 0 : payload length, followed by exactly that many bytes
//! ```
//!
//! There is no separator and no terminator. A failed item only affects its
//! own block; the decoder keeps going with the next header.
//!
//! # Example
//!
//! ```
//! use iio_core::attr::codec::{decode_named, BlockEncoder};
//!
//! let mut enc = BlockEncoder::new();
//! enc.push_data(b"1").unwrap();
//! enc.push_error(2);
//! let wire = enc.finish();
//!
//! let names = ["a", "b"];
//! let items: Vec<_> = decode_named(names.iter().copied(), &wire).collect();
//! assert_eq!(*items[0].1.as_ref().unwrap(), b"1");
//! assert_eq!(items[1].1.as_ref().unwrap_err().errno(), 2);
//! ```

use crate::error::{IioError, Result, EINVAL};

/// Size of a block header in bytes
pub const HEADER_LEN: usize = 4;

/// Header announcing a payload of `len` bytes
fn data_header(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| {
        IioError::InvalidArgument(format!(
            "attribute payload of {} bytes exceeds the block limit of {} bytes",
            len,
            i32::MAX
        ))
    })
}

/// One decoded block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrBlock<'a> {
    /// Payload bytes of a successful item
    Data(&'a [u8]),
    /// Positive errno of a failed item
    Error(i32),
}

impl<'a> AttrBlock<'a> {
    /// Encoded size of this block
    pub fn encoded_len(&self) -> usize {
        match self {
            AttrBlock::Data(d) => HEADER_LEN + d.len(),
            AttrBlock::Error(_) => HEADER_LEN,
        }
    }
}

/// Builds a batch exchange block by block
#[derive(Debug, Default, Clone)]
pub struct BlockEncoder {
    buf: Vec<u8>,
    count: usize,
}

impl BlockEncoder {
    /// Create an empty encoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an encoder with room for `bytes` of output
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            buf: Vec::with_capacity(bytes),
            count: 0,
        }
    }

    /// Append a successful item
    ///
    /// Payloads longer than `i32::MAX` bytes cannot be framed; nothing is
    /// appended and `InvalidArgument` is returned.
    pub fn push_data(&mut self, data: &[u8]) -> Result<()> {
        let header = data_header(data.len())?;
        self.buf.extend_from_slice(&header.to_be_bytes());
        self.buf.extend_from_slice(data);
        self.count += 1;
        Ok(())
    }

    /// Append a failed item; the sign of `errno` is ignored
    pub fn push_error(&mut self, errno: i32) {
        let header = -errno.saturating_abs();
        self.buf.extend_from_slice(&header.to_be_bytes());
        self.count += 1;
    }

    /// Append a decoded block as-is
    pub fn push_block(&mut self, block: AttrBlock<'_>) -> Result<()> {
        match block {
            AttrBlock::Data(d) => self.push_data(d),
            AttrBlock::Error(code) => {
                self.push_error(code);
                Ok(())
            }
        }
    }

    /// Append the outcome of an attribute operation
    ///
    /// A value too large to frame becomes an `EINVAL` block for that item.
    pub fn push_result<B: AsRef<[u8]>>(&mut self, result: &Result<B>) {
        let pushed = match result {
            Ok(data) => self.push_data(data.as_ref()),
            Err(e) => {
                self.push_error(e.errno());
                Ok(())
            }
        };
        if let Err(e) = pushed {
            tracing::warn!("{}", e);
            self.push_error(EINVAL);
        }
    }

    /// Number of blocks written so far
    pub fn count(&self) -> usize {
        self.count
    }

    /// Number of bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing has been encoded
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish and return the encoded exchange
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Encode a sequence of blocks into one exchange
pub fn encode_blocks<'a, I>(blocks: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = AttrBlock<'a>>,
{
    let mut enc = BlockEncoder::new();
    for block in blocks {
        enc.push_block(block)?;
    }
    Ok(enc.finish())
}

/// Lazily walks the blocks of an exchange
///
/// Yields one item per block. A framing error (truncated header or payload)
/// is yielded once, after which iteration stops since the following block
/// boundaries are unknown.
#[derive(Debug, Clone)]
pub struct BlockDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    broken: bool,
}

impl<'a> BlockDecoder<'a> {
    /// Start decoding an exchange
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            broken: false,
        }
    }

    /// Bytes not consumed yet
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }
}

impl<'a> Iterator for BlockDecoder<'a> {
    type Item = Result<AttrBlock<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.broken || self.pos >= self.data.len() {
            return None;
        }

        let rest = &self.data[self.pos..];
        if rest.len() < HEADER_LEN {
            self.broken = true;
            return Some(Err(IioError::Io(format!(
                "truncated block header at offset {}",
                self.pos
            ))));
        }

        let header = i32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
        if header < 0 {
            self.pos += HEADER_LEN;
            return Some(Ok(AttrBlock::Error(header.saturating_abs())));
        }

        let len = header as usize;
        if rest.len() - HEADER_LEN < len {
            self.broken = true;
            return Some(Err(IioError::Io(format!(
                "block at offset {} announces {} bytes, only {} available",
                self.pos,
                len,
                rest.len() - HEADER_LEN
            ))));
        }

        let payload = &rest[HEADER_LEN..HEADER_LEN + len];
        self.pos += HEADER_LEN + len;
        Some(Ok(AttrBlock::Data(payload)))
    }
}

/// Pairs each attribute name with its block
///
/// Produced by [`decode_named`]. Yields exactly one item per name; names left
/// without a block (short or broken exchange) report an I/O failure.
#[derive(Debug, Clone)]
pub struct NamedBlocks<'a, N> {
    names: N,
    decoder: BlockDecoder<'a>,
    framing_failed: bool,
}

impl<'a, N> NamedBlocks<'a, N> {
    /// Bytes left after the last decoded block
    pub fn remaining(&self) -> &'a [u8] {
        self.decoder.remaining()
    }
}

impl<'a, 'n, N> Iterator for NamedBlocks<'a, N>
where
    N: Iterator<Item = &'n str>,
{
    type Item = (&'n str, Result<&'a [u8]>);

    fn next(&mut self) -> Option<Self::Item> {
        let name = self.names.next()?;
        let value = match self.decoder.next() {
            Some(Ok(AttrBlock::Data(d))) => Ok(d),
            Some(Ok(AttrBlock::Error(code))) => Err(IioError::from_errno(code)),
            Some(Err(e)) => {
                self.framing_failed = true;
                Err(e)
            }
            None if self.framing_failed => Err(IioError::Io(format!(
                "no block for attribute '{}' after framing error",
                name
            ))),
            None => Err(IioError::Io(format!("no block for attribute '{}'", name))),
        };
        tracing::trace!(attr = name, ok = value.is_ok(), "decoded attribute block");
        Some((name, value))
    }
}

/// Decode an exchange against the ordered attribute names of its scope
pub fn decode_named<'a, 'n, N>(names: N, data: &'a [u8]) -> NamedBlocks<'a, N::IntoIter>
where
    N: IntoIterator<Item = &'n str>,
{
    NamedBlocks {
        names: names.into_iter(),
        decoder: BlockDecoder::new(data),
        framing_failed: false,
    }
}
