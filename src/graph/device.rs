//! Devices of a context

use crate::attr::{AttrTarget, AttrValue};
use crate::backend::description::DeviceDescription;
use crate::backend::Backend;
use crate::buffer::BufferLayout;
use crate::error::{IioError, Result};
use crate::graph::attrs::{AttrBatch, AttrScope};
use crate::graph::channel::Channel;
use crate::types::{ChannelKey, Direction};
use std::collections::HashSet;
use std::sync::Arc;

/// An addressable hardware or software component
pub struct Device {
    index: usize,
    id: String,
    name: Option<String>,
    is_trigger: bool,
    trigger: Option<usize>,
    channels: Vec<Channel>,
    attrs: AttrScope,
    debug_attrs: AttrScope,
    backend: Arc<dyn Backend>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("index", &self.index)
            .field("id", &self.id)
            .field("name", &self.name)
            .field("is_trigger", &self.is_trigger)
            .field("trigger", &self.trigger)
            .field("channels", &self.channels)
            .field("attrs", &self.attrs)
            .field("debug_attrs", &self.debug_attrs)
            .finish_non_exhaustive()
    }
}

impl Device {
    pub(crate) fn from_description(
        index: usize,
        desc: &DeviceDescription,
        backend: &Arc<dyn Backend>,
        max_batch_bytes: usize,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut channels = Vec::with_capacity(desc.channels.len());
        for chn in &desc.channels {
            if !seen.insert((chn.id.as_str(), chn.direction)) {
                return Err(IioError::InvalidArgument(format!(
                    "duplicate {} channel '{}' on device '{}'",
                    chn.direction, chn.id, desc.id
                )));
            }
            channels.push(Channel::from_description(
                &desc.id,
                chn,
                backend,
                max_batch_bytes,
            )?);
        }

        Ok(Self {
            index,
            id: desc.id.clone(),
            name: desc.name.clone(),
            is_trigger: desc.reports_trigger(),
            trigger: None,
            channels,
            attrs: AttrScope::new(
                AttrTarget::Device(desc.id.clone()),
                &desc.attrs,
                backend.clone(),
                max_batch_bytes,
            )?,
            debug_attrs: AttrScope::new(
                AttrTarget::Debug(desc.id.clone()),
                &desc.debug_attrs,
                backend.clone(),
                max_batch_bytes,
            )?,
            backend: backend.clone(),
        })
    }

    /// Position in the context's device list
    pub fn index(&self) -> usize {
        self.index
    }

    /// Device id, unique within the context
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Optional display name
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Display name, falling back to the id
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Whether other devices may use this one as their trigger
    pub fn is_trigger(&self) -> bool {
        self.is_trigger
    }

    /// Index of the associated trigger device
    pub fn trigger_index(&self) -> Option<usize> {
        self.trigger
    }

    pub(crate) fn set_trigger_index(&mut self, trigger: Option<usize>) {
        self.trigger = trigger;
    }

    pub(crate) fn matches(&self, name_or_id: &str) -> bool {
        self.id == name_or_id || self.name.as_deref() == Some(name_or_id)
    }

    // ==================== Channels ====================

    /// Channels in enumeration order
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Number of channels
    pub fn channels_count(&self) -> usize {
        self.channels.len()
    }

    /// Channel at `index`
    pub fn channel(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }

    /// Mutable channel at `index`
    pub fn channel_mut(&mut self, index: usize) -> Option<&mut Channel> {
        self.channels.get_mut(index)
    }

    fn position(&self, name_or_id: &str, direction: Direction) -> Option<usize> {
        let candidates = || {
            self.channels
                .iter()
                .enumerate()
                .filter(move |(_, c)| c.direction() == direction)
        };
        candidates()
            .find(|(_, c)| c.id() == name_or_id)
            .or_else(|| candidates().find(|(_, c)| c.matches(name_or_id)))
            .map(|(i, _)| i)
    }

    /// Exact lookup by id, then by display name
    pub fn find_channel(&self, name_or_id: &str, direction: Direction) -> Option<&Channel> {
        self.position(name_or_id, direction)
            .and_then(|i| self.channels.get(i))
    }

    /// Mutable variant of [`Device::find_channel`]
    pub fn find_channel_mut(
        &mut self,
        name_or_id: &str,
        direction: Direction,
    ) -> Option<&mut Channel> {
        let index = self.position(name_or_id, direction)?;
        self.channels.get_mut(index)
    }

    /// Channel with the given key
    pub fn channel_by_key(&self, key: &ChannelKey) -> Option<&Channel> {
        if key.device != self.id {
            return None;
        }
        self.channels
            .iter()
            .find(|c| c.id() == key.channel && c.direction() == key.direction)
    }

    /// Enabled scan elements, in enumeration order
    pub fn enabled_channels(&self) -> impl Iterator<Item = &Channel> + '_ {
        self.channels
            .iter()
            .filter(|c| c.is_enabled() && c.is_scan_element())
    }

    /// Record size of a buffer created with the currently enabled channels
    pub fn sample_size(&self) -> Result<usize> {
        BufferLayout::from_channels(&self.id, self.enabled_channels()).map(|l| l.stride())
    }

    // ==================== Attributes ====================

    /// Device attributes
    pub fn attrs(&self) -> &AttrScope {
        &self.attrs
    }

    /// Debug attributes
    pub fn debug_attrs(&self) -> &AttrScope {
        &self.debug_attrs
    }

    /// Number of device attributes
    pub fn attrs_count(&self) -> usize {
        self.attrs.len()
    }

    /// Device attribute name at `index`
    pub fn attr(&self, index: usize) -> Option<&str> {
        self.attrs.get(index)
    }

    /// Exact device attribute lookup
    pub fn find_attr(&self, name: &str) -> Option<&str> {
        self.attrs.find(name)
    }

    /// Number of debug attributes
    pub fn debug_attrs_count(&self) -> usize {
        self.debug_attrs.len()
    }

    /// Debug attribute name at `index`
    pub fn debug_attr(&self, index: usize) -> Option<&str> {
        self.debug_attrs.get(index)
    }

    /// Exact debug attribute lookup
    pub fn find_debug_attr(&self, name: &str) -> Option<&str> {
        self.debug_attrs.find(name)
    }

    /// Read and parse one device attribute
    pub fn read_attr<T: AttrValue>(&self, name: &str) -> Result<T> {
        self.attrs.read(name)
    }

    /// Format and write one device attribute
    pub fn write_attr<T: AttrValue>(&self, name: &str, value: &T) -> Result<usize> {
        self.attrs.write(name, value)
    }

    /// Read every device attribute in one exchange
    pub fn read_all_attrs(&self) -> Result<AttrBatch> {
        self.attrs.read_all()
    }

    /// Write every device attribute in one exchange
    pub fn write_all_attrs<F>(&self, producer: F) -> Result<usize>
    where
        F: FnMut(&str) -> Result<Vec<u8>>,
    {
        self.attrs.write_all(producer)
    }

    /// Read every debug attribute in one exchange
    pub fn read_all_debug_attrs(&self) -> Result<AttrBatch> {
        self.debug_attrs.read_all()
    }

    /// Write every debug attribute in one exchange
    pub fn write_all_debug_attrs<F>(&self, producer: F) -> Result<usize>
    where
        F: FnMut(&str) -> Result<Vec<u8>>,
    {
        self.debug_attrs.write_all(producer)
    }

    /// Map a backend filename to its channel (if any) and canonical name
    ///
    /// Device attributes are checked first, then debug attributes, then the
    /// attributes of each channel in order.
    pub fn identify_filename(&self, filename: &str) -> Result<(Option<&Channel>, &str)> {
        if let Some(name) = self.attrs.name_for_filename(filename) {
            return Ok((None, name));
        }
        if let Some(name) = self.debug_attrs.name_for_filename(filename) {
            return Ok((None, name));
        }
        self.channels
            .iter()
            .find_map(|c| c.attrs().name_for_filename(filename).map(|n| (Some(c), n)))
            .ok_or_else(|| {
                IioError::NotFound(format!("file '{}' on device '{}'", filename, self.id))
            })
    }

    // ==================== Registers ====================

    /// Read a raw 32-bit register
    pub fn reg_read(&self, address: u32) -> Result<u32> {
        self.backend.reg_read(&self.id, address)
    }

    /// Write a raw 32-bit register
    pub fn reg_write(&self, address: u32, value: u32) -> Result<()> {
        self.backend.reg_write(&self.id, address, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::description::{AttrDescription, ChannelDescription};
    use crate::backend::{ContextDescription, SimulatedBackend};

    fn backend() -> Arc<dyn Backend> {
        Arc::new(SimulatedBackend::new(ContextDescription::new("sim")))
    }

    fn adc() -> DeviceDescription {
        DeviceDescription::new("iio:device0")
            .with_name("adc")
            .with_attr(AttrDescription::new("sampling_frequency"))
            .with_debug_attr(AttrDescription::new("direct_reg_access"))
            .with_channel(
                ChannelDescription::input("voltage0")
                    .with_name("temp")
                    .scan_element(0, "le:s12/16>>4")
                    .with_attr(AttrDescription::new("raw").with_filename("in_voltage0_raw")),
            )
            .with_channel(
                ChannelDescription::input("temp")
                    .scan_element(1, "le:u8/8>>0")
                    .with_attr(AttrDescription::new("raw").with_filename("in_temp_raw")),
            )
            .with_channel(ChannelDescription::output("voltage0"))
    }

    #[test]
    fn test_find_channel_prefers_ids_and_respects_direction() {
        let dev = Device::from_description(0, &adc(), &backend(), 1024).unwrap();
        // "temp" is both a display name (voltage0) and an id; the id wins
        assert_eq!(dev.find_channel("temp", Direction::Input).unwrap().index(), Some(1));
        assert!(dev.find_channel("voltage0", Direction::Output).unwrap().is_output());
        assert!(dev.find_channel("Temp", Direction::Input).is_none());
        assert!(dev.find_channel("temp", Direction::Output).is_none());
    }

    #[test]
    fn test_identify_filename() {
        let dev = Device::from_description(0, &adc(), &backend(), 1024).unwrap();

        let (chn, name) = dev.identify_filename("in_temp_raw").unwrap();
        assert_eq!(chn.unwrap().id(), "temp");
        assert_eq!(name, "raw");

        let (chn, name) = dev.identify_filename("sampling_frequency").unwrap();
        assert!(chn.is_none());
        assert_eq!(name, "sampling_frequency");

        let (chn, _) = dev.identify_filename("direct_reg_access").unwrap();
        assert!(chn.is_none());

        assert!(dev.identify_filename("raw").unwrap_err().is_not_found());
    }

    #[test]
    fn test_sample_size_follows_enabled_set() {
        let mut dev = Device::from_description(0, &adc(), &backend(), 1024).unwrap();
        assert!(dev.sample_size().is_err());

        dev.channel_mut(0).unwrap().enable();
        assert_eq!(dev.sample_size().unwrap(), 2);
        dev.find_channel_mut("temp", Direction::Input).unwrap().enable();
        assert_eq!(dev.sample_size().unwrap(), 3);
        // Non scan elements never count
        dev.channel_mut(2).unwrap().enable();
        assert_eq!(dev.sample_size().unwrap(), 3);
    }

    #[test]
    fn test_duplicate_channels_are_rejected() {
        let desc = DeviceDescription::new("dev")
            .with_channel(ChannelDescription::input("x"))
            .with_channel(ChannelDescription::input("x"));
        assert!(Device::from_description(0, &desc, &backend(), 1024).is_err());

        let desc = DeviceDescription::new("dev")
            .with_channel(ChannelDescription::input("x"))
            .with_channel(ChannelDescription::output("x"));
        assert!(Device::from_description(0, &desc, &backend(), 1024).is_ok());
    }

    #[test]
    fn test_indexed_attribute_access() {
        let dev = Device::from_description(0, &adc(), &backend(), 1024).unwrap();
        assert_eq!(dev.attrs_count(), 1);
        assert_eq!(dev.attr(0), Some("sampling_frequency"));
        assert_eq!(dev.attr(1), None);
        assert_eq!(dev.debug_attrs_count(), 1);
        assert_eq!(dev.find_debug_attr("direct_reg_access"), Some("direct_reg_access"));
        assert_eq!(dev.label(), "adc");
    }
}
