//! Context: root of the entity graph

use crate::backend::description::ContextVersion;
use crate::backend::{Backend, BackendStats};
use crate::buffer::{Buffer, BufferLayout};
use crate::config::ContextConfig;
use crate::error::{IioError, Result, ResultExt};
use crate::graph::device::Device;
use crate::graph::xml;
use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Root handle over the devices of one backend
///
/// The device tree is enumerated once, at construction, and is immutable
/// afterwards except for channel enable flags and trigger links.
///
/// # Example
///
/// ```ignore
/// let mut ctx = Context::new(SimulatedBackend::new(description))?;
/// let adc = ctx.find_device("adc").map(|d| d.index()).unwrap();
/// ctx.device_mut(adc).unwrap().channel_mut(0).unwrap().enable();
/// let mut buf = ctx.create_buffer(ctx.device(adc).unwrap(), 256, false)?;
/// buf.refill()?;
/// ```
pub struct Context {
    name: String,
    description: String,
    xml: Option<String>,
    version: ContextVersion,
    devices: Vec<Device>,
    timeout: Duration,
    backend: Arc<dyn Backend>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("devices", &self.devices)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Build a context with the default configuration
    pub fn new<B: Backend + 'static>(backend: B) -> Result<Self> {
        Self::with_config(backend, &ContextConfig::default())
    }

    /// Build a context with the given configuration
    pub fn with_config<B: Backend + 'static>(backend: B, config: &ContextConfig) -> Result<Self> {
        Self::from_shared(Arc::new(backend), config)
    }

    /// Build a context over a backend the caller keeps a handle to
    pub fn from_shared(backend: Arc<dyn Backend>, config: &ContextConfig) -> Result<Self> {
        let desc = backend
            .describe()
            .context("Failed to enumerate devices")?;
        let timeout = config.timeout();
        backend.set_timeout(timeout)?;

        let mut ids = HashSet::new();
        let mut devices = Vec::with_capacity(desc.devices.len());
        for (index, dev) in desc.devices.iter().enumerate() {
            if !ids.insert(dev.id.as_str()) {
                return Err(IioError::InvalidArgument(format!(
                    "duplicate device id '{}'",
                    dev.id
                )));
            }
            let device =
                Device::from_description(index, dev, &backend, config.max_batch_bytes)
                    .with_context(|| format!("Invalid description of device '{}'", dev.id))?;
            devices.push(device);
        }

        for (index, dev) in desc.devices.iter().enumerate() {
            let Some(trigger) = &dev.trigger else {
                continue;
            };
            let target = devices
                .iter()
                .find(|d| d.id() == trigger)
                .ok_or_else(|| {
                    IioError::NotFound(format!("trigger '{}' of device '{}'", trigger, dev.id))
                })?;
            if !target.is_trigger() {
                return Err(IioError::InvalidArgument(format!(
                    "'{}' is not a trigger (referenced by '{}')",
                    trigger, dev.id
                )));
            }
            let target = target.index();
            if let Some(device) = devices.get_mut(index) {
                device.set_trigger_index(Some(target));
            }
        }

        tracing::debug!(
            "Context '{}' built: {} devices, timeout {:?}",
            desc.name,
            devices.len(),
            timeout
        );

        Ok(Self {
            name: desc.name,
            description: desc.description,
            xml: desc.xml,
            version: desc.version,
            devices,
            timeout,
            backend,
        })
    }

    /// Backend name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Free-form backend description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Protocol/version tuple reported by the backend
    pub fn version(&self) -> &ContextVersion {
        &self.version
    }

    /// XML representation; rendered from the graph if the backend has none
    pub fn xml(&self) -> Cow<'_, str> {
        match &self.xml {
            Some(xml) => Cow::Borrowed(xml),
            None => Cow::Owned(xml::render(self)),
        }
    }

    /// Deadline for blocking transfers
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Change the transfer deadline, forwarding it to the backend
    ///
    /// Buffers pick up the deadline in effect when they are created.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.backend
            .set_timeout(timeout)
            .context("Failed to set timeout")?;
        self.timeout = timeout;
        Ok(())
    }

    /// Snapshot of the backend's operation statistics
    pub fn stats(&self) -> BackendStats {
        self.backend.stats()
    }

    /// Shared handle to the backend
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    // ==================== Devices ====================

    /// Devices in enumeration order
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Number of devices
    pub fn devices_count(&self) -> usize {
        self.devices.len()
    }

    /// Device at `index`
    pub fn device(&self, index: usize) -> Option<&Device> {
        self.devices.get(index)
    }

    /// Mutable device at `index`, for enabling channels
    pub fn device_mut(&mut self, index: usize) -> Option<&mut Device> {
        self.devices.get_mut(index)
    }

    fn position(&self, name_or_id: &str) -> Option<usize> {
        self.devices
            .iter()
            .position(|d| d.id() == name_or_id)
            .or_else(|| self.devices.iter().position(|d| d.matches(name_or_id)))
    }

    /// Exact lookup by id, then by display name
    pub fn find_device(&self, name_or_id: &str) -> Option<&Device> {
        self.position(name_or_id).and_then(|i| self.devices.get(i))
    }

    /// Mutable variant of [`Context::find_device`]
    pub fn find_device_mut(&mut self, name_or_id: &str) -> Option<&mut Device> {
        let index = self.position(name_or_id)?;
        self.devices.get_mut(index)
    }

    fn device_or_err(&self, index: usize) -> Result<&Device> {
        self.devices
            .get(index)
            .ok_or_else(|| IioError::NotFound(format!("device #{}", index)))
    }

    // ==================== Triggers ====================

    /// Trigger associated with the device at `device`
    pub fn trigger(&self, device: usize) -> Result<Option<&Device>> {
        let dev = self.device_or_err(device)?;
        Ok(dev.trigger_index().and_then(|t| self.devices.get(t)))
    }

    /// Associate a trigger with a device; `None` clears the association
    ///
    /// The target must be trigger-capable. On failure the previous
    /// association is kept.
    pub fn set_trigger(&mut self, device: usize, trigger: Option<usize>) -> Result<()> {
        let dev_id = self.device_or_err(device)?.id().to_string();
        let trigger_id = match trigger {
            Some(t) => {
                let target = self.device_or_err(t)?;
                if !target.is_trigger() {
                    return Err(IioError::InvalidArgument(format!(
                        "'{}' is not a trigger",
                        target.id()
                    )));
                }
                Some(target.id().to_string())
            }
            None => None,
        };

        self.backend
            .set_trigger(&dev_id, trigger_id.clone())
            .with_context(|| format!("Failed to set trigger of '{}'", dev_id))?;

        if let Some(dev) = self.devices.get_mut(device) {
            dev.set_trigger_index(trigger);
        }
        tracing::debug!("Trigger of '{}' is now {:?}", dev_id, trigger_id);
        Ok(())
    }

    // ==================== Buffers ====================

    /// Create a buffer over the device's currently enabled scan elements
    ///
    /// The enabled set is frozen into the buffer; later enable/disable calls
    /// do not affect it.
    pub fn create_buffer(&self, device: &Device, samples: usize, cyclic: bool) -> Result<Buffer> {
        let owned = self
            .devices
            .get(device.index())
            .is_some_and(|d| std::ptr::eq(d, device));
        if !owned {
            return Err(IioError::InvalidArgument(format!(
                "device '{}' does not belong to context '{}'",
                device.id(),
                self.name
            )));
        }

        let layout = BufferLayout::from_channels(device.id(), device.enabled_channels())?;
        Buffer::open(self.backend.clone(), layout, samples, cyclic, self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::description::{
        AttrDescription, ChannelDescription, ContextDescription, DeviceDescription,
    };
    use crate::backend::{MockBackend, SimulatedBackend};
    use crate::types::Direction;

    fn description() -> ContextDescription {
        ContextDescription::new("sim")
            .with_device(
                DeviceDescription::new("iio:device0")
                    .with_name("adc")
                    .with_attr(AttrDescription::new("sampling_frequency").with_value("100"))
                    .with_channel(ChannelDescription::input("voltage0").scan_element(0, "le:s16/16>>0")),
            )
            .with_device(DeviceDescription::new("trigger0").with_name("sysfstrig0"))
            .with_device(DeviceDescription::new("iio:device1").with_name("trigger-lookalike"))
    }

    #[test]
    fn test_lookup_by_id_then_name() {
        let ctx = Context::new(SimulatedBackend::new(description())).unwrap();
        assert_eq!(ctx.devices_count(), 3);
        assert_eq!(ctx.find_device("adc").unwrap().id(), "iio:device0");
        assert_eq!(ctx.find_device("iio:device0").unwrap().index(), 0);
        assert!(ctx.find_device("ADC").is_none());
        assert!(ctx.find_device("iio:dev").is_none());
    }

    #[test]
    fn test_set_trigger_validates_capability() {
        let mut ctx = Context::new(SimulatedBackend::new(description())).unwrap();
        assert!(ctx.trigger(0).unwrap().is_none());

        ctx.set_trigger(0, Some(1)).unwrap();
        assert_eq!(ctx.trigger(0).unwrap().unwrap().id(), "trigger0");

        let err = ctx.set_trigger(0, Some(2)).unwrap_err();
        assert!(matches!(err, IioError::InvalidArgument(_)));
        assert_eq!(ctx.trigger(0).unwrap().unwrap().id(), "trigger0");

        ctx.set_trigger(0, None).unwrap();
        assert!(ctx.trigger(0).unwrap().is_none());
        assert!(ctx.set_trigger(9, None).unwrap_err().is_not_found());
    }

    #[test]
    fn test_backend_trigger_failure_keeps_association() {
        let mut mock = MockBackend::new();
        mock.expect_describe().returning(|| Ok(description()));
        mock.expect_set_timeout().returning(|_| Ok(()));
        mock.expect_set_trigger()
            .returning(|_, _| Err(IioError::Io("link down".into())));

        let mut ctx = Context::new(mock).unwrap();
        assert!(ctx.set_trigger(0, Some(1)).is_err());
        assert!(ctx.trigger(0).unwrap().is_none());
    }

    #[test]
    fn test_initial_trigger_from_description() {
        let mut desc = description();
        desc.devices[0].trigger = Some("trigger0".into());
        let ctx = Context::new(SimulatedBackend::new(desc)).unwrap();
        assert_eq!(ctx.trigger(0).unwrap().unwrap().index(), 1);

        let mut desc = description();
        desc.devices[0].trigger = Some("iio:device1".into());
        assert!(Context::new(SimulatedBackend::new(desc)).is_err());
    }

    #[test]
    fn test_duplicate_device_ids_are_rejected() {
        let desc = ContextDescription::new("sim")
            .with_device(DeviceDescription::new("a"))
            .with_device(DeviceDescription::new("a"));
        assert!(matches!(
            Context::new(SimulatedBackend::new(desc)),
            Err(IioError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_enumeration_failure_is_reported() {
        let mut mock = MockBackend::new();
        mock.expect_describe()
            .returning(|| Err(IioError::Io("connection refused".into())));
        let err = Context::new(mock).unwrap_err();
        assert!(err.to_string().contains("Failed to enumerate devices"));
    }

    #[test]
    fn test_timeout_is_configured_and_forwarded() {
        let sim = Arc::new(SimulatedBackend::new(description()));
        let config = ContextConfig::default().with_timeout(Duration::from_millis(20));
        let mut ctx = Context::from_shared(sim.clone(), &config).unwrap();
        assert_eq!(ctx.timeout(), Duration::from_millis(20));
        assert_eq!(sim.timeout(), Duration::from_millis(20));

        ctx.set_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(sim.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_buffer_uses_enabled_set_at_creation() {
        let mut ctx = Context::new(SimulatedBackend::new(description())).unwrap();
        let dev = ctx.device(0).unwrap();
        assert!(matches!(
            ctx.create_buffer(dev, 8, false),
            Err(IioError::InvalidArgument(_))
        ));

        ctx.device_mut(0)
            .unwrap()
            .find_channel_mut("voltage0", Direction::Input)
            .unwrap()
            .enable();
        let buf = ctx.create_buffer(ctx.device(0).unwrap(), 8, false).unwrap();
        assert_eq!(buf.step(), 2);
        assert_eq!(buf.capacity(), 8);
    }

    #[test]
    fn test_foreign_device_is_rejected() {
        let ctx_a = Context::new(SimulatedBackend::new(description())).unwrap();
        let ctx_b = Context::new(SimulatedBackend::new(description())).unwrap();
        let err = ctx_a
            .create_buffer(ctx_b.device(0).unwrap(), 8, false)
            .unwrap_err();
        assert!(matches!(err, IioError::InvalidArgument(_)));
    }

    #[test]
    fn test_rendered_xml_when_backend_has_none() {
        let ctx = Context::new(SimulatedBackend::new(description())).unwrap();
        let xml = ctx.xml();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<device id=\"iio:device0\" name=\"adc\""));

        let mut desc = description();
        desc.xml = Some("<context/>".into());
        let ctx = Context::new(SimulatedBackend::new(desc)).unwrap();
        assert_eq!(ctx.xml(), "<context/>");
    }
}
