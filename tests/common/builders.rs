//! Test data builders for creating test contexts

use iio_core::backend::{
    AttrDescription, ChannelDescription, ContextDescription, DeviceDescription, SimulatedBackend,
};
use iio_core::{Context, ContextConfig};
use std::sync::Arc;

/// Builder for a simulated ADC device
pub struct AdcBuilder {
    id: String,
    name: String,
    channels: Vec<(String, String)>,
    trigger: Option<String>,
}

impl AdcBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: "ad7606".to_string(),
            channels: Vec::new(),
            trigger: None,
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Add an input scan element; its index is its position
    pub fn channel(mut self, id: &str, format: &str) -> Self {
        self.channels.push((id.to_string(), format.to_string()));
        self
    }

    pub fn trigger(mut self, trigger: &str) -> Self {
        self.trigger = Some(trigger.to_string());
        self
    }

    pub fn build(self) -> DeviceDescription {
        let mut dev = DeviceDescription::new(self.id)
            .with_name(self.name)
            .with_attr(AttrDescription::new("sampling_frequency").with_value("1000"))
            .with_attr(AttrDescription::new("oversampling_ratio").with_value("1"))
            .with_debug_attr(AttrDescription::new("direct_reg_access").with_value("0x0"));
        for (i, (id, format)) in self.channels.into_iter().enumerate() {
            let raw = format!("in_{}_raw", id);
            let scale = format!("in_{}_scale", id);
            dev = dev.with_channel(
                ChannelDescription::input(id)
                    .scan_element(i as u32, format)
                    .with_attr(AttrDescription::new("raw").with_filename(raw).with_value("0"))
                    .with_attr(AttrDescription::new("scale").with_filename(scale).with_value("0.5")),
            );
        }
        if let Some(trigger) = self.trigger {
            dev = dev.with_trigger(trigger);
        }
        dev
    }
}

/// A two-ADC, one-DAC, one-trigger rig
pub fn rig_description() -> ContextDescription {
    ContextDescription::new("test-rig")
        .with_description("Simulated acquisition rig")
        .with_device(
            AdcBuilder::new("iio:device0")
                .channel("voltage0", "le:s12/16>>4")
                .channel("voltage1", "le:u8/8>>0")
                .channel("voltage2", "be:s32/32>>0")
                .build(),
        )
        .with_device(
            DeviceDescription::new("iio:device1")
                .with_name("ad9122")
                .with_channel(ChannelDescription::output("voltage0").scan_element(0, "le:s16/16>>0"))
                .with_channel(ChannelDescription::output("voltage1").scan_element(1, "le:s16/16>>0"))
                .with_channel(
                    ChannelDescription::output("altvoltage0")
                        .with_attr(AttrDescription::new("frequency").with_value("1000000")),
                ),
        )
        .with_device(DeviceDescription::new("trigger0").with_name("sysfstrig0"))
        .with_device(
            DeviceDescription::new("iio:device2")
                .with_name("hrtimer-lookalike")
                .with_trigger_capability(false),
        )
}

/// Context over the test rig, sharing the backend with the caller
pub fn rig() -> (Context, Arc<SimulatedBackend>) {
    let sim = Arc::new(SimulatedBackend::new(rig_description()));
    let config = ContextConfig::default().with_timeout(super::test_timeout());
    let ctx = Context::from_shared(sim.clone(), &config).expect("rig context");
    (ctx, sim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adc_builder() {
        let dev = AdcBuilder::new("iio:device5")
            .name("ad7124")
            .channel("voltage0", "le:u24/32>>8")
            .trigger("trigger0")
            .build();

        assert_eq!(dev.id, "iio:device5");
        assert_eq!(dev.name.as_deref(), Some("ad7124"));
        assert_eq!(dev.channels.len(), 1);
        assert_eq!(dev.channels[0].index, Some(0));
        assert_eq!(dev.trigger.as_deref(), Some("trigger0"));
    }
}
