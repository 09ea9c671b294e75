//! Channels of a device

use crate::attr::{AttrTarget, AttrValue};
use crate::backend::description::ChannelDescription;
use crate::backend::Backend;
use crate::convert::{convert, convert_inverse};
use crate::error::{IioError, Result, ResultExt};
use crate::graph::attrs::{AttrBatch, AttrScope};
use crate::types::{ChannelKey, DataFormat, Direction, Sample};
use std::sync::Arc;

/// A single signal path of a device
///
/// Metadata is fixed at context build; only the enabled flag changes, and it
/// is purely local. Enabling or disabling affects buffers created afterwards.
#[derive(Debug, Clone)]
pub struct Channel {
    key: ChannelKey,
    name: Option<String>,
    index: Option<u32>,
    format: Option<DataFormat>,
    enabled: bool,
    attrs: AttrScope,
}

impl Channel {
    pub(crate) fn from_description(
        device: &str,
        desc: &ChannelDescription,
        backend: &Arc<dyn Backend>,
        max_batch_bytes: usize,
    ) -> Result<Self> {
        let key = desc.key(device);
        let format = desc
            .data_format()
            .with_context(|| format!("Invalid sample format on channel {}", key))?;
        if desc.index.is_some() && format.is_none() {
            return Err(IioError::InvalidArgument(format!(
                "scan element {} has no sample format",
                key
            )));
        }
        let attrs = AttrScope::new(
            AttrTarget::Channel(key.clone()),
            &desc.attrs,
            backend.clone(),
            max_batch_bytes,
        )?;

        Ok(Self {
            key,
            name: desc.name.clone(),
            index: desc.index,
            format,
            enabled: false,
            attrs,
        })
    }

    /// Context-wide identity of this channel
    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    /// Channel id
    pub fn id(&self) -> &str {
        &self.key.channel
    }

    /// Id of the owning device
    pub fn device_id(&self) -> &str {
        &self.key.device
    }

    /// Optional display name
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Input or output
    pub fn direction(&self) -> Direction {
        self.key.direction
    }

    /// Whether the channel consumes samples
    pub fn is_output(&self) -> bool {
        self.key.direction.is_output()
    }

    /// Whether the channel can take part in buffered streaming
    pub fn is_scan_element(&self) -> bool {
        self.index.is_some()
    }

    /// Scan index; `None` for channels that are not scan elements
    pub fn index(&self) -> Option<u32> {
        self.index
    }

    /// Sample format; present for every scan element
    pub fn data_format(&self) -> Option<&DataFormat> {
        self.format.as_ref()
    }

    /// Whether the channel will be part of the next buffer
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Include the channel in buffers created from now on
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Exclude the channel from buffers created from now on
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub(crate) fn matches(&self, name_or_id: &str) -> bool {
        self.key.channel == name_or_id || self.name.as_deref() == Some(name_or_id)
    }

    /// Channel attributes
    pub fn attrs(&self) -> &AttrScope {
        &self.attrs
    }

    /// Number of attributes
    pub fn attrs_count(&self) -> usize {
        self.attrs.len()
    }

    /// Attribute name at `index`
    pub fn attr(&self, index: usize) -> Option<&str> {
        self.attrs.get(index)
    }

    /// Exact attribute lookup
    pub fn find_attr(&self, name: &str) -> Option<&str> {
        self.attrs.find(name)
    }

    /// On-wire filename of an attribute
    pub fn attr_filename(&self, name: &str) -> Option<&str> {
        self.attrs.filename(name)
    }

    /// Read and parse one attribute
    pub fn read_attr<T: AttrValue>(&self, name: &str) -> Result<T> {
        self.attrs.read(name)
    }

    /// Format and write one attribute
    pub fn write_attr<T: AttrValue>(&self, name: &str, value: &T) -> Result<usize> {
        self.attrs.write(name, value)
    }

    /// Read every channel attribute in one exchange
    pub fn read_all_attrs(&self) -> Result<AttrBatch> {
        self.attrs.read_all()
    }

    /// Write every channel attribute in one exchange
    pub fn write_all_attrs<F>(&self, producer: F) -> Result<usize>
    where
        F: FnMut(&str) -> Result<Vec<u8>>,
    {
        self.attrs.write_all(producer)
    }

    /// Convert one raw container of this channel
    pub fn convert(&self, raw: &[u8]) -> Option<Sample> {
        self.format.as_ref().map(|f| convert(f, raw))
    }

    /// Encode one host value into this channel's container
    pub fn convert_inverse(&self, value: Sample) -> Option<Vec<u8>> {
        self.format.as_ref().map(|f| convert_inverse(f, value))
    }
}

impl AsRef<ChannelKey> for Channel {
    fn as_ref(&self) -> &ChannelKey {
        &self.key
    }
}
