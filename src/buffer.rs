//! Sample buffers
//!
//! A [`Buffer`] is one contiguous region of `step() * capacity()` bytes
//! holding interleaved records. Each record packs the payload of every
//! channel enabled at creation time, in ascending scan-index order, with no
//! padding beyond each channel's own byte-rounded container. The layout is
//! frozen for the buffer's lifetime.
//!
//! # Access
//!
//! - Raw: [`Buffer::read_raw`] / [`Buffer::write_raw`] copy container bytes
//! - Converted: [`Buffer::read`] / [`Buffer::write`] exchange host-native
//!   bytes through the sample converter
//! - Typed: [`Buffer::samples`] / [`Buffer::write_samples`]
//! - Whole records: [`Buffer::iter_samples`] visits records in order and,
//!   within a record, channels in layout order
//!
//! Input buffers expose the extent filled by the last refill; output
//! buffers always expose their full extent.

use crate::backend::{Backend, BufferRequest};
use crate::convert::{convert, convert_inverse_into};
use crate::error::{IioError, Result, ResultExt};
use crate::graph::Channel;
use crate::types::{ChannelKey, DataFormat, Direction, Sample};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Global counter for buffer ids
static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Placement of one channel inside a record
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSlot {
    key: ChannelKey,
    index: u32,
    offset: usize,
    format: DataFormat,
}

impl ChannelSlot {
    /// Channel occupying the slot
    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    /// Scan index of the channel
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Byte offset within a record
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Container width in bytes
    pub fn width(&self) -> usize {
        self.format.storage_bytes()
    }

    /// Sample format of the channel
    pub fn format(&self) -> &DataFormat {
        &self.format
    }
}

/// Record layout of a buffer
#[derive(Debug, Clone, PartialEq)]
pub struct BufferLayout {
    device: String,
    direction: Direction,
    slots: Vec<ChannelSlot>,
    stride: usize,
}

impl BufferLayout {
    /// Lay out the scan elements among `channels`
    ///
    /// Channels without a scan index are ignored. Fails if no scan element
    /// is left or if directions are mixed.
    pub fn from_channels<'a>(
        device: &str,
        channels: impl IntoIterator<Item = &'a Channel>,
    ) -> Result<Self> {
        Self::from_parts(
            device,
            channels.into_iter().filter_map(|c| {
                let index = c.index()?;
                let format = *c.data_format()?;
                Some((c.key().clone(), index, format))
            }),
        )
    }

    pub(crate) fn from_parts(
        device: &str,
        parts: impl IntoIterator<Item = (ChannelKey, u32, DataFormat)>,
    ) -> Result<Self> {
        let mut parts: Vec<_> = parts.into_iter().collect();
        let direction = match parts.first() {
            Some((key, _, _)) => key.direction,
            None => {
                return Err(IioError::InvalidArgument(format!(
                    "no scan element enabled on device '{}'",
                    device
                )))
            }
        };
        if parts.iter().any(|(key, _, _)| key.direction != direction) {
            return Err(IioError::InvalidArgument(format!(
                "enabled channels of device '{}' mix input and output",
                device
            )));
        }

        parts.sort_by_key(|(_, index, _)| *index);

        let mut offset = 0;
        let slots = parts
            .into_iter()
            .map(|(key, index, format)| {
                let slot = ChannelSlot {
                    key,
                    index,
                    offset,
                    format,
                };
                offset += slot.width();
                slot
            })
            .collect();

        Ok(Self {
            device: device.to_string(),
            direction,
            slots,
            stride: offset,
        })
    }

    /// Device the layout belongs to
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Direction shared by every slot
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Slots in record order
    pub fn slots(&self) -> &[ChannelSlot] {
        &self.slots
    }

    /// Bytes per record
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Slot of a channel, if it is part of the layout
    pub fn slot(&self, key: &ChannelKey) -> Option<&ChannelSlot> {
        self.slots.iter().find(|s| &s.key == key)
    }
}

/// Streaming buffer of one device
///
/// Created by [`crate::graph::Context::create_buffer`]. Dropping the buffer
/// releases it on the backend.
pub struct Buffer {
    id: u64,
    backend: Arc<dyn Backend>,
    layout: BufferLayout,
    samples: usize,
    cyclic: bool,
    data: Vec<u8>,
    staging: Vec<u8>,
    filled: usize,
    timeout: Duration,
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("layout", &self.layout)
            .field("samples", &self.samples)
            .field("cyclic", &self.cyclic)
            .field("filled", &self.filled)
            .finish_non_exhaustive()
    }
}

impl Buffer {
    pub(crate) fn open(
        backend: Arc<dyn Backend>,
        layout: BufferLayout,
        samples: usize,
        cyclic: bool,
        timeout: Duration,
    ) -> Result<Self> {
        if samples == 0 {
            return Err(IioError::InvalidArgument(
                "buffer capacity must be at least one sample".to_string(),
            ));
        }
        if cyclic && !layout.direction.is_output() {
            return Err(IioError::InvalidArgument(format!(
                "cyclic buffer on device '{}' requires output channels",
                layout.device
            )));
        }

        let request = BufferRequest {
            device: layout.device.clone(),
            samples,
            cyclic,
            direction: layout.direction,
            channels: layout.slots.iter().map(|s| s.key.clone()).collect(),
            sample_size: layout.stride,
        };
        // Allocations are capped at isize::MAX bytes
        let len = request
            .byte_len()
            .filter(|&len| len <= isize::MAX as usize)
            .ok_or_else(|| {
                IioError::InvalidArgument(format!(
                    "{} samples of {} bytes on '{}' exceed the addressable size",
                    samples, layout.stride, layout.device
                ))
            })?;
        backend
            .open_buffer(&request)
            .with_context(|| format!("Failed to open buffer on '{}'", layout.device))?;

        let id = NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            "Buffer {} created on '{}': {} samples, stride {}, {} channels",
            id,
            layout.device,
            samples,
            layout.stride,
            layout.slots.len()
        );

        Ok(Self {
            id,
            backend,
            layout,
            samples,
            cyclic,
            data: vec![0; len],
            staging: Vec::new(),
            filled: 0,
            timeout,
        })
    }

    /// Unique id of this buffer within the process
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Id of the device the buffer streams from or to
    pub fn device_id(&self) -> &str {
        &self.layout.device
    }

    /// Direction of the enabled channels
    pub fn direction(&self) -> Direction {
        self.layout.direction
    }

    /// Whether an output buffer repeats its content
    pub fn is_cyclic(&self) -> bool {
        self.cyclic
    }

    /// Capacity in samples (records)
    pub fn capacity(&self) -> usize {
        self.samples
    }

    /// Frozen record layout
    pub fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    /// Record stride in bytes
    pub fn step(&self) -> usize {
        self.layout.stride
    }

    /// The whole region
    pub fn start(&self) -> &[u8] {
        &self.data
    }

    /// The whole region, for filling output buffers in place
    pub fn start_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// End of the valid extent, in bytes
    pub fn end(&self) -> usize {
        if self.layout.direction.is_output() {
            self.data.len()
        } else {
            self.filled
        }
    }

    /// Bytes moved by the last successful refill or push
    pub fn filled_bytes(&self) -> usize {
        self.filled
    }

    /// Records within the valid extent
    pub fn records(&self) -> usize {
        self.end() / self.layout.stride
    }

    /// Whether the channel is part of this buffer
    pub fn has_channel(&self, chn: impl AsRef<ChannelKey>) -> bool {
        self.layout.slot(chn.as_ref()).is_some()
    }

    /// Offset of the channel's payload in the first record; `end()` if absent
    pub fn first(&self, chn: impl AsRef<ChannelKey>) -> usize {
        match self.layout.slot(chn.as_ref()) {
            Some(slot) => slot.offset,
            None => self.end(),
        }
    }

    fn offsets(&self, slot: &ChannelSlot) -> impl Iterator<Item = usize> {
        let stride = self.layout.stride;
        let offset = slot.offset;
        (0..self.records()).map(move |r| r * stride + offset)
    }

    // ==================== Transfers ====================

    /// Fetch a new block of samples from the device
    ///
    /// Returns the bytes now valid. On failure the previous content and
    /// fill cursor are left untouched.
    pub fn refill(&mut self) -> Result<usize> {
        if self.layout.direction.is_output() {
            return Err(IioError::InvalidArgument(format!(
                "refill on output buffer of '{}'",
                self.layout.device
            )));
        }

        self.staging.resize(self.data.len(), 0);
        let n = self
            .backend
            .refill(&self.layout.device, &mut self.staging, self.timeout)
            .with_context(|| format!("Failed to refill buffer of '{}'", self.layout.device))?;

        let n = n.min(self.data.len());
        let whole = n - n % self.layout.stride;
        if whole != n {
            tracing::warn!(
                "Refill of '{}' returned {} bytes, not a multiple of the {} byte stride",
                self.layout.device,
                n,
                self.layout.stride
            );
        }

        std::mem::swap(&mut self.data, &mut self.staging);
        self.filled = whole;
        Ok(whole)
    }

    /// Send the buffer content to the device
    ///
    /// On a cyclic buffer this replaces the repeating content.
    pub fn push(&mut self) -> Result<usize> {
        if !self.layout.direction.is_output() {
            return Err(IioError::InvalidArgument(format!(
                "push on input buffer of '{}'",
                self.layout.device
            )));
        }

        let n = self
            .backend
            .push(&self.layout.device, &self.data, self.timeout)
            .with_context(|| format!("Failed to push buffer of '{}'", self.layout.device))?;
        self.filled = n.min(self.data.len());
        Ok(n)
    }

    // ==================== Demux / Mux ====================

    /// Copy the channel's raw containers into `dst`
    ///
    /// Stops when `dst` cannot hold another container. Returns bytes copied.
    pub fn read_raw(&self, chn: impl AsRef<ChannelKey>, dst: &mut [u8]) -> usize {
        let Some(slot) = self.layout.slot(chn.as_ref()) else {
            return 0;
        };
        let width = slot.width();
        let mut copied = 0;
        for offset in self.offsets(slot) {
            let Some(out) = dst.get_mut(copied..copied + width) else {
                break;
            };
            out.copy_from_slice(&self.data[offset..offset + width]);
            copied += width;
        }
        copied
    }

    /// Copy the channel's converted samples into `dst`, host-native
    ///
    /// Returns bytes written, which differs from the raw count when the
    /// host width differs from the container width.
    pub fn read(&self, chn: impl AsRef<ChannelKey>, dst: &mut [u8]) -> usize {
        let Some(slot) = self.layout.slot(chn.as_ref()) else {
            return 0;
        };
        let width = slot.width();
        let mut written = 0;
        for offset in self.offsets(slot) {
            let sample = convert(&slot.format, &self.data[offset..offset + width]);
            let n = sample.write_ne(&mut dst[written..]);
            if n == 0 {
                break;
            }
            written += n;
        }
        written
    }

    /// Copy raw containers from `src` into the channel's slots
    ///
    /// Returns bytes consumed from `src`.
    pub fn write_raw(&mut self, chn: impl AsRef<ChannelKey>, src: &[u8]) -> usize {
        let Some(slot) = self.layout.slot(chn.as_ref()).cloned() else {
            return 0;
        };
        let width = slot.width();
        let offsets: Vec<usize> = self.offsets(&slot).collect();
        let mut consumed = 0;
        for offset in offsets {
            let Some(chunk) = src.get(consumed..consumed + width) else {
                break;
            };
            self.data[offset..offset + width].copy_from_slice(chunk);
            consumed += width;
        }
        consumed
    }

    /// Convert host-native samples from `src` into the channel's slots
    ///
    /// Returns bytes consumed from `src`.
    pub fn write(&mut self, chn: impl AsRef<ChannelKey>, src: &[u8]) -> usize {
        let Some(slot) = self.layout.slot(chn.as_ref()).cloned() else {
            return 0;
        };
        let kind = slot.format.host_kind();
        let host_width = kind.size_bytes();
        let width = slot.width();
        let offsets: Vec<usize> = self.offsets(&slot).collect();
        let mut consumed = 0;
        for offset in offsets {
            let Some(sample) = src
                .get(consumed..)
                .and_then(|rest| Sample::read_ne(kind, rest))
            else {
                break;
            };
            convert_inverse_into(&slot.format, sample, &mut self.data[offset..offset + width]);
            consumed += host_width;
        }
        consumed
    }

    /// Converted samples of one channel, in record order
    pub fn samples(&self, chn: impl AsRef<ChannelKey>) -> impl Iterator<Item = Sample> + '_ {
        self.channel_samples(chn.as_ref())
    }

    fn channel_samples(&self, key: &ChannelKey) -> impl Iterator<Item = Sample> + '_ {
        let slot = self.layout.slot(key);
        let records = if slot.is_some() { self.records() } else { 0 };
        let stride = self.layout.stride;
        (0..records).filter_map(move |r| {
            let slot = slot?;
            let offset = r * stride + slot.offset;
            Some(convert(&slot.format, &self.data[offset..offset + slot.width()]))
        })
    }

    /// Encode samples into one channel's slots, in record order
    ///
    /// Returns the number of samples written.
    pub fn write_samples<I>(&mut self, chn: impl AsRef<ChannelKey>, values: I) -> usize
    where
        I: IntoIterator<Item = Sample>,
    {
        let Some(slot) = self.layout.slot(chn.as_ref()).cloned() else {
            return 0;
        };
        let width = slot.width();
        let offsets: Vec<usize> = self.offsets(&slot).collect();
        let mut count = 0;
        for (offset, value) in offsets.into_iter().zip(values) {
            convert_inverse_into(&slot.format, value, &mut self.data[offset..offset + width]);
            count += 1;
        }
        count
    }

    /// Every `(slot, payload)` pair; records outer, channels inner
    pub fn iter_samples(&self) -> impl Iterator<Item = (&ChannelSlot, &[u8])> + '_ {
        let stride = self.layout.stride;
        self.data[..self.end()]
            .chunks_exact(stride)
            .flat_map(move |record| {
                self.layout
                    .slots
                    .iter()
                    .map(move |slot| (slot, &record[slot.offset..slot.offset + slot.width()]))
            })
    }

    /// Visit every payload mutably, in the same order as [`Buffer::iter_samples`]
    pub fn for_each_sample_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(&ChannelSlot, &mut [u8]),
    {
        let end = self.end();
        let stride = self.layout.stride;
        for record in self.data[..end].chunks_exact_mut(stride) {
            for slot in &self.layout.slots {
                f(slot, &mut record[slot.offset..slot.offset + slot.width()]);
            }
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        match self.backend.close_buffer(&self.layout.device) {
            Ok(()) => tracing::debug!("Buffer {} on '{}' released", self.id, self.layout.device),
            Err(e) => tracing::warn!(
                "Failed to release buffer {} on '{}': {}",
                self.id,
                self.layout.device,
                e
            ),
        }
    }
}
