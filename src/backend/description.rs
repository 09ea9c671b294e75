//! Enumeration data produced by a backend
//!
//! A backend describes its whole device tree once, when a context is built.
//! The description is plain serde data so it doubles as the on-disk snapshot
//! format (JSON or TOML) used by the simulated backend and the `iio-info`
//! tool. Attribute values are only consumed by backends that serve them from
//! memory; the entity graph ignores them.

use crate::error::{IioError, Result};
use crate::types::{ChannelKey, DataFormat, Direction};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Protocol/version tuple reported by a backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextVersion {
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
    /// Source revision tag
    #[serde(default)]
    pub git_tag: String,
}

impl std::fmt::Display for ContextVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.git_tag.is_empty() {
            write!(f, "{}.{}", self.major, self.minor)
        } else {
            write!(f, "{}.{} (git tag: {})", self.major, self.minor, self.git_tag)
        }
    }
}

/// Description of an attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttrDescription {
    /// Canonical attribute name
    pub name: String,
    /// On-wire filename, channel attributes only; defaults to the name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Current value, for backends serving attributes from memory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl AttrDescription {
    /// Create an attribute without a value
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filename: None,
            value: None,
        }
    }

    /// Set the on-wire filename
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Set the current value
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Filename used on the wire
    pub fn wire_name(&self) -> &str {
        self.filename.as_deref().unwrap_or(&self.name)
    }
}

/// Description of a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDescription {
    /// Channel id, unique per direction within the device
    pub id: String,
    /// Optional display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Input or output
    #[serde(default)]
    pub direction: Direction,
    /// Scan index; present only for scan elements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    /// Sample format in `le:s12/16>>4` notation, required for scan elements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Scale factor applied when converting samples
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    /// Channel attributes in declaration order
    #[serde(default)]
    pub attrs: Vec<AttrDescription>,
}

impl ChannelDescription {
    /// Create a channel that is not a scan element
    pub fn new(id: impl Into<String>, direction: Direction) -> Self {
        Self {
            id: id.into(),
            name: None,
            direction,
            index: None,
            format: None,
            scale: None,
            attrs: Vec::new(),
        }
    }

    /// Create an input channel
    pub fn input(id: impl Into<String>) -> Self {
        Self::new(id, Direction::Input)
    }

    /// Create an output channel
    pub fn output(id: impl Into<String>) -> Self {
        Self::new(id, Direction::Output)
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Make the channel a scan element
    pub fn scan_element(mut self, index: u32, format: impl Into<String>) -> Self {
        self.index = Some(index);
        self.format = Some(format.into());
        self
    }

    /// Set the conversion scale
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Add an attribute
    pub fn with_attr(mut self, attr: AttrDescription) -> Self {
        self.attrs.push(attr);
        self
    }

    /// Key of this channel within the given device
    pub fn key(&self, device: &str) -> ChannelKey {
        ChannelKey::new(device, self.id.clone(), self.direction)
    }

    /// Parsed and validated sample format, `None` if the channel has none
    pub fn data_format(&self) -> Result<Option<DataFormat>> {
        let Some(text) = &self.format else {
            return Ok(None);
        };
        let mut format: DataFormat = text.parse()?;
        if let Some(scale) = self.scale {
            format = format.with_scale(scale);
        }
        format.validate().map(Some)
    }
}

/// Description of a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescription {
    /// Device id, unique within the context
    pub id: String,
    /// Optional display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Whether the device is a trigger; derived from the id when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_trigger: Option<bool>,
    /// Id of the trigger currently associated with this device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    /// Channels in enumeration order
    #[serde(default)]
    pub channels: Vec<ChannelDescription>,
    /// Device attributes in declaration order
    #[serde(default)]
    pub attrs: Vec<AttrDescription>,
    /// Debug attributes in declaration order
    #[serde(default)]
    pub debug_attrs: Vec<AttrDescription>,
}

impl DeviceDescription {
    /// Create an empty device
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            is_trigger: None,
            trigger: None,
            channels: Vec::new(),
            attrs: Vec::new(),
            debug_attrs: Vec::new(),
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Declare the device trigger-capable (or not)
    pub fn with_trigger_capability(mut self, is_trigger: bool) -> Self {
        self.is_trigger = Some(is_trigger);
        self
    }

    /// Associate a trigger device by id
    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }

    /// Add a channel
    pub fn with_channel(mut self, channel: ChannelDescription) -> Self {
        self.channels.push(channel);
        self
    }

    /// Add a device attribute
    pub fn with_attr(mut self, attr: AttrDescription) -> Self {
        self.attrs.push(attr);
        self
    }

    /// Add a debug attribute
    pub fn with_debug_attr(mut self, attr: AttrDescription) -> Self {
        self.debug_attrs.push(attr);
        self
    }

    /// Whether the device reports itself as a trigger
    pub fn reports_trigger(&self) -> bool {
        self.is_trigger.unwrap_or_else(|| self.id.starts_with("trigger"))
    }
}

/// Description of a whole context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextDescription {
    /// Backend name (e.g. "local", "network", "simulated")
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// XML representation supplied by the backend, if it has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xml: Option<String>,
    /// Protocol/version tuple
    #[serde(default)]
    pub version: ContextVersion,
    /// Devices in enumeration order
    #[serde(default)]
    pub devices: Vec<DeviceDescription>,
}

impl ContextDescription {
    /// Create an empty context description
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the description text
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a device
    pub fn with_device(mut self, device: DeviceDescription) -> Self {
        self.devices.push(device);
        self
    }

    /// Look up a device by id
    pub fn device(&self, id: &str) -> Option<&DeviceDescription> {
        self.devices.iter().find(|d| d.id == id)
    }

    /// Parse a snapshot; TOML for `.toml` files, JSON otherwise
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            IioError::Config(format!("Failed to read snapshot {:?}: {}", path, e))
        })?;

        if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&content).map_err(|e| {
                IioError::Config(format!("Failed to parse snapshot {:?}: {}", path, e))
            })
        } else {
            serde_json::from_str(&content).map_err(|e| {
                IioError::Config(format!("Failed to parse snapshot {:?}: {}", path, e))
            })
        }
    }

    /// Write the snapshot; TOML for `.toml` files, JSON otherwise
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if path.extension().is_some_and(|ext| ext == "toml") {
            toml::to_string_pretty(self)
                .map_err(|e| IioError::Config(format!("Failed to serialize snapshot: {}", e)))?
        } else {
            serde_json::to_string_pretty(self)
                .map_err(|e| IioError::Config(format!("Failed to serialize snapshot: {}", e)))?
        };

        std::fs::write(path, content).map_err(|e| {
            IioError::Config(format!("Failed to write snapshot {:?}: {}", path, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_description() -> ContextDescription {
        ContextDescription::new("simulated")
            .with_description("bench rig")
            .with_device(
                DeviceDescription::new("iio:device0")
                    .with_name("ad7476")
                    .with_attr(AttrDescription::new("sampling_frequency").with_value("1000"))
                    .with_channel(
                        ChannelDescription::input("voltage0")
                            .scan_element(0, "le:s12/16>>4")
                            .with_scale(0.5)
                            .with_attr(
                                AttrDescription::new("raw").with_filename("in_voltage0_raw"),
                            ),
                    ),
            )
            .with_device(DeviceDescription::new("trigger0"))
    }

    #[test]
    fn test_trigger_capability_defaults_to_id_prefix() {
        let desc = sample_description();
        assert!(!desc.devices[0].reports_trigger());
        assert!(desc.devices[1].reports_trigger());
        assert!(DeviceDescription::new("hrtimer")
            .with_trigger_capability(true)
            .reports_trigger());
    }

    #[test]
    fn test_wire_name_falls_back_to_name() {
        let attr = AttrDescription::new("raw");
        assert_eq!(attr.wire_name(), "raw");
        let attr = attr.with_filename("in_voltage0_raw");
        assert_eq!(attr.wire_name(), "in_voltage0_raw");
    }

    #[test]
    fn test_json_and_toml_snapshots_round_trip() {
        let desc = sample_description();
        let dir = tempfile::tempdir().unwrap();

        let json = dir.path().join("ctx.json");
        desc.save(&json).unwrap();
        assert_eq!(ContextDescription::load(&json).unwrap(), desc);

        let toml_path = dir.path().join("ctx.toml");
        desc.save(&toml_path).unwrap();
        assert_eq!(ContextDescription::load(&toml_path).unwrap(), desc);
    }

    #[test]
    fn test_data_format_applies_scale() {
        let chn = ChannelDescription::input("voltage0")
            .scan_element(0, "le:s12/16>>4")
            .with_scale(0.5);
        let fmt = chn.data_format().unwrap().unwrap();
        assert_eq!(fmt.bits, 12);
        assert!(fmt.with_scale);
        assert_eq!(fmt.scale, 0.5);

        assert!(ChannelDescription::input("x").data_format().unwrap().is_none());
        let bad = ChannelDescription::input("x").scan_element(0, "le:s20/16>>0");
        assert!(bad.data_format().is_err());
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = ContextDescription::load("/nonexistent/ctx.json").unwrap_err();
        assert!(matches!(err, IioError::Config(_)));
    }
}
