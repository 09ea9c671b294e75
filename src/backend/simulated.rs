//! Simulated backend
//!
//! An in-memory backend built from a [`ContextDescription`]. It lets the
//! whole stack run without hardware: the `iio-info` tool uses it to browse
//! snapshots and the tests use it as the device on the other side of the
//! wire.
//!
//! # Modes
//!
//! - [`SimulationMode::Live`] - Attributes are readable and writable,
//!   registers hold values, buffers stream generated or fed data
//! - [`SimulationMode::Snapshot`] - Attribute reads only; every other
//!   operation reports [`IioError::Unsupported`]
//!
//! # Sample sources
//!
//! A refill is served from, in order:
//!
//! 1. A block queued with [`SimulatedBackend::feed`]
//! 2. Samples generated from the [`SignalPattern`]s set on the enabled channels
//! 3. A block fed while the refill waits, up to the transfer timeout
//!
//! # Example
//!
//! ```ignore
//! let backend = SimulatedBackend::new(description)
//!     .with_pattern(key, SignalPattern::Counter { step: 1.0, min: 0.0, max: 100.0 });
//! let ctx = Context::new(backend)?;
//! ```

use crate::attr::AttrTarget;
use crate::backend::backend_trait::{Backend, BackendStats, BufferRequest, OpKind};
use crate::backend::description::ContextDescription;
use crate::convert::convert_inverse_into;
use crate::error::{IioError, Result, EBUSY};
use crate::types::{ChannelKey, DataFormat, Direction, Sample};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Default transfer timeout until the context propagates its own
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Pattern for generating samples, evaluated per record index
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SignalPattern {
    /// Constant value
    Constant(f64),
    /// Sine wave; `frequency` is in cycles per sample
    Sine {
        frequency: f64,
        amplitude: f64,
        offset: f64,
    },
    /// Counter that wraps from `max` back to `min`
    Counter { step: f64, min: f64, max: f64 },
    /// Sawtooth wave; `period` in samples
    Sawtooth { period: f64, amplitude: f64 },
    /// Square wave; `period` in samples
    Square { period: f64, amplitude: f64 },
    /// Triangle wave; `period` in samples
    Triangle { period: f64, amplitude: f64 },
}

impl SignalPattern {
    /// Value of the pattern at record `n`
    pub fn value_at(&self, n: u64) -> f64 {
        let n = n as f64;
        match *self {
            SignalPattern::Constant(v) => v,
            SignalPattern::Sine {
                frequency,
                amplitude,
                offset,
            } => offset + amplitude * (2.0 * std::f64::consts::PI * frequency * n).sin(),
            SignalPattern::Counter { step, min, max } => {
                let range = max - min;
                if range <= 0.0 {
                    min
                } else {
                    min + (n * step).rem_euclid(range)
                }
            }
            SignalPattern::Sawtooth { period, amplitude } => {
                if period <= 0.0 {
                    return 0.0;
                }
                (n % period) / period * amplitude
            }
            SignalPattern::Square { period, amplitude } => {
                if period <= 0.0 {
                    return 0.0;
                }
                if n % period < period / 2.0 {
                    amplitude
                } else {
                    -amplitude
                }
            }
            SignalPattern::Triangle { period, amplitude } => {
                if period <= 0.0 {
                    return 0.0;
                }
                let phase = (n % period) / period;
                if phase < 0.5 {
                    amplitude * (4.0 * phase - 1.0)
                } else {
                    amplitude * (3.0 - 4.0 * phase)
                }
            }
        }
    }

    /// Host sample carrying this pattern's value at record `n`
    fn sample_at(&self, format: &DataFormat, n: u64) -> Sample {
        let value = self.value_at(n);
        if format.with_scale {
            Sample::F64(value)
        } else {
            Sample::from_bits(format.host_kind(), value.round() as i64 as u64)
        }
    }
}

/// Which operations the simulated backend serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimulationMode {
    /// Full read/write device simulation
    #[default]
    Live,
    /// Read-only view of a captured description
    Snapshot,
}

#[derive(Debug)]
struct SimBuffer {
    request: BufferRequest,
    next_record: u64,
    pushed: Vec<Vec<u8>>,
    cyclic_content: Option<Vec<u8>>,
}

#[derive(Debug)]
struct SimState {
    /// Declared attributes; `None` until a value is known
    attrs: HashMap<(AttrTarget, String), Option<Vec<u8>>>,
    /// Injected failures, checked before any access
    failures: HashMap<(AttrTarget, String), i32>,
    registers: HashMap<(String, u32), u32>,
    triggers: HashMap<String, Option<String>>,
    buffers: HashMap<String, SimBuffer>,
    patterns: HashMap<ChannelKey, SignalPattern>,
    transfer_delay: Duration,
    timeout: Duration,
    stats: BackendStats,
}

/// In-memory backend
pub struct SimulatedBackend {
    description: ContextDescription,
    mode: SimulationMode,
    formats: HashMap<ChannelKey, DataFormat>,
    feeds: HashMap<String, (Sender<Vec<u8>>, Receiver<Vec<u8>>)>,
    state: Mutex<SimState>,
}

impl SimulatedBackend {
    /// Create a live simulation of the described context
    pub fn new(description: ContextDescription) -> Self {
        Self::with_mode(description, SimulationMode::Live)
    }

    /// Create a read-only view of the described context
    pub fn snapshot(description: ContextDescription) -> Self {
        Self::with_mode(description, SimulationMode::Snapshot)
    }

    /// Load a description from a JSON or TOML file
    pub fn from_file(path: impl AsRef<Path>, mode: SimulationMode) -> Result<Self> {
        Ok(Self::with_mode(ContextDescription::load(path)?, mode))
    }

    /// Create a simulation in the given mode
    pub fn with_mode(description: ContextDescription, mode: SimulationMode) -> Self {
        let mut attrs = HashMap::new();
        let mut triggers = HashMap::new();
        let mut formats = HashMap::new();
        let mut feeds = HashMap::new();

        for dev in &description.devices {
            let device_target = AttrTarget::Device(dev.id.clone());
            for attr in &dev.attrs {
                attrs.insert(
                    (device_target.clone(), attr.name.clone()),
                    attr.value.clone().map(String::into_bytes),
                );
            }
            let debug_target = AttrTarget::Debug(dev.id.clone());
            for attr in &dev.debug_attrs {
                attrs.insert(
                    (debug_target.clone(), attr.name.clone()),
                    attr.value.clone().map(String::into_bytes),
                );
            }
            for chn in &dev.channels {
                let key = chn.key(&dev.id);
                for attr in &chn.attrs {
                    attrs.insert(
                        (AttrTarget::Channel(key.clone()), attr.wire_name().to_string()),
                        attr.value.clone().map(String::into_bytes),
                    );
                }
                match chn.data_format() {
                    Ok(Some(format)) => {
                        formats.insert(key, format);
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!("Channel {} has an unusable format: {}", key, e),
                }
            }
            triggers.insert(dev.id.clone(), dev.trigger.clone());
            feeds.insert(dev.id.clone(), crossbeam_channel::unbounded());
        }

        tracing::info!(
            "Simulated backend '{}' ready ({} devices, {:?} mode)",
            description.name,
            description.devices.len(),
            mode
        );

        Self {
            description,
            mode,
            formats,
            feeds,
            state: Mutex::new(SimState {
                attrs,
                failures: HashMap::new(),
                registers: HashMap::new(),
                triggers,
                buffers: HashMap::new(),
                patterns: HashMap::new(),
                transfer_delay: Duration::ZERO,
                timeout: DEFAULT_TIMEOUT,
                stats: BackendStats::default(),
            }),
        }
    }

    /// Generate samples for a channel from a pattern
    pub fn with_pattern(self, key: ChannelKey, pattern: SignalPattern) -> Self {
        self.set_pattern(key, pattern);
        self
    }

    /// Delay every buffer transfer by `delay`
    pub fn with_transfer_delay(self, delay: Duration) -> Self {
        self.lock().transfer_delay = delay;
        self
    }

    /// Operating mode
    pub fn mode(&self) -> SimulationMode {
        self.mode
    }

    /// Description this backend serves
    pub fn description(&self) -> &ContextDescription {
        &self.description
    }

    /// Replace the pattern generating samples for a channel
    pub fn set_pattern(&self, key: ChannelKey, pattern: SignalPattern) {
        self.lock().patterns.insert(key, pattern);
    }

    /// Queue a block for the next refill of `device`
    pub fn feed(&self, device: &str, block: impl Into<Vec<u8>>) -> Result<()> {
        let (tx, _) = self
            .feeds
            .get(device)
            .ok_or_else(|| IioError::NotFound(format!("device '{}'", device)))?;
        tx.send(block.into())
            .map_err(|e| IioError::Io(format!("feed for '{}' closed: {}", device, e)))
    }

    /// Make every access to an attribute fail with `errno`
    pub fn fail_attr(&self, target: AttrTarget, attr: &str, errno: i32) {
        self.lock()
            .failures
            .insert((target, attr.to_string()), errno.saturating_abs());
    }

    /// Remove an injected attribute failure
    pub fn clear_failure(&self, target: AttrTarget, attr: &str) {
        self.lock().failures.remove(&(target, attr.to_string()));
    }

    /// Current raw value of an attribute
    pub fn attr_value(&self, target: &AttrTarget, attr: &str) -> Option<Vec<u8>> {
        self.lock()
            .attrs
            .get(&(target.clone(), attr.to_string()))
            .cloned()
            .flatten()
    }

    /// Current register value
    pub fn register(&self, device: &str, address: u32) -> Option<u32> {
        self.lock()
            .registers
            .get(&(device.to_string(), address))
            .copied()
    }

    /// Trigger currently associated with a device
    pub fn trigger_of(&self, device: &str) -> Option<String> {
        self.lock().triggers.get(device).cloned().flatten()
    }

    /// Whether a buffer is open on a device
    pub fn is_buffer_open(&self, device: &str) -> bool {
        self.lock().buffers.contains_key(device)
    }

    /// Request used to open the device's buffer
    pub fn buffer_request(&self, device: &str) -> Option<BufferRequest> {
        self.lock().buffers.get(device).map(|b| b.request.clone())
    }

    /// Blocks pushed to a non-cyclic output buffer
    pub fn pushed(&self, device: &str) -> Vec<Vec<u8>> {
        self.lock()
            .buffers
            .get(device)
            .map(|b| b.pushed.clone())
            .unwrap_or_default()
    }

    /// Content repeated by a cyclic output buffer
    pub fn cyclic_content(&self, device: &str) -> Option<Vec<u8>> {
        self.lock()
            .buffers
            .get(device)
            .and_then(|b| b.cyclic_content.clone())
    }

    /// Transfer timeout currently in effect
    pub fn timeout(&self) -> Duration {
        self.lock().timeout
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn require_live(&self, what: &str) -> Result<()> {
        match self.mode {
            SimulationMode::Live => Ok(()),
            SimulationMode::Snapshot => Err(IioError::Unsupported(format!(
                "{} on a snapshot context",
                what
            ))),
        }
    }

    fn require_device(&self, device: &str) -> Result<()> {
        match self.description.device(device) {
            Some(_) => Ok(()),
            None => Err(IioError::NotFound(format!("device '{}'", device))),
        }
    }

    /// Sleep for the configured transfer delay, failing if it exceeds `timeout`
    fn simulate_transfer(&self, timeout: Duration) -> Result<()> {
        let delay = self.lock().transfer_delay;
        if delay.is_zero() {
            return Ok(());
        }
        if delay > timeout {
            std::thread::sleep(timeout);
            return Err(IioError::Timeout(format!(
                "transfer did not complete within {:?}",
                timeout
            )));
        }
        std::thread::sleep(delay);
        Ok(())
    }

    /// Fill `dst` with pattern samples; `None` if no enabled channel has a pattern
    fn generate(
        &self,
        buffer: &mut SimBuffer,
        patterns: &HashMap<ChannelKey, SignalPattern>,
        dst: &mut [u8],
    ) -> Option<usize> {
        let channels = &buffer.request.channels;
        if !channels.iter().any(|k| patterns.contains_key(k)) {
            return None;
        }

        let stride = buffer.request.sample_size;
        if stride == 0 {
            return Some(0);
        }
        let records = (dst.len() / stride).min(buffer.request.samples);

        for record in dst.chunks_exact_mut(stride).take(records) {
            let mut offset = 0;
            for key in channels {
                let Some(format) = self.formats.get(key) else {
                    continue;
                };
                let width = format.storage_bytes();
                let sample = patterns
                    .get(key)
                    .map(|p| p.sample_at(format, buffer.next_record))
                    .unwrap_or_else(|| Sample::from_bits(format.host_kind(), 0));
                if let Some(slot) = record.get_mut(offset..offset + width) {
                    convert_inverse_into(format, sample, slot);
                }
                offset += width;
            }
            buffer.next_record += 1;
        }
        Some(records * stride)
    }

    fn record<T>(&self, kind: OpKind, start: Instant, result: &Result<T>, bytes: u64) {
        let mut state = self.lock();
        match result {
            Ok(_) => state
                .stats
                .record_success(kind, start.elapsed().as_micros() as u64, bytes),
            Err(_) => state.stats.record_failure(),
        }
    }

    fn read_attr_inner(&self, target: &AttrTarget, attr: &str) -> Result<Vec<u8>> {
        let state = self.lock();
        let key = (target.clone(), attr.to_string());
        if let Some(&errno) = state.failures.get(&key) {
            return Err(IioError::from_errno(errno));
        }
        match state.attrs.get(&key) {
            Some(Some(value)) => Ok(value.clone()),
            Some(None) => Err(IioError::NotFound(format!(
                "attribute '{}' of {} has no value",
                attr, target
            ))),
            None => Err(IioError::NotFound(format!(
                "attribute '{}' of {}",
                attr, target
            ))),
        }
    }

    fn write_attr_inner(&self, target: &AttrTarget, attr: &str, value: &[u8]) -> Result<usize> {
        self.require_live("attribute write")?;
        let mut state = self.lock();
        let key = (target.clone(), attr.to_string());
        if let Some(&errno) = state.failures.get(&key) {
            return Err(IioError::from_errno(errno));
        }
        match state.attrs.get_mut(&key) {
            Some(slot) => {
                *slot = Some(value.to_vec());
                Ok(value.len())
            }
            None => Err(IioError::NotFound(format!(
                "attribute '{}' of {}",
                attr, target
            ))),
        }
    }

    fn refill_inner(&self, device: &str, dst: &mut [u8], timeout: Duration) -> Result<usize> {
        self.require_live("refill")?;
        let (_, rx) = self
            .feeds
            .get(device)
            .ok_or_else(|| IioError::NotFound(format!("device '{}'", device)))?;

        {
            let mut state = self.lock();
            let SimState {
                buffers, patterns, ..
            } = &mut *state;
            let buffer = buffers.get_mut(device).ok_or_else(|| {
                IioError::InvalidArgument(format!("no buffer open on '{}'", device))
            })?;
            if buffer.request.direction != Direction::Input {
                return Err(IioError::InvalidArgument(format!(
                    "buffer on '{}' is not an input buffer",
                    device
                )));
            }

            if let Ok(block) = rx.try_recv() {
                drop(state);
                self.simulate_transfer(timeout)?;
                return Ok(copy_block(&block, dst));
            }
            if let Some(n) = self.generate(buffer, patterns, dst) {
                drop(state);
                self.simulate_transfer(timeout)?;
                tracing::trace!("Generated {} bytes for '{}'", n, device);
                return Ok(n);
            }
        }

        // Nothing queued or generated; wait for a feeder
        match rx.recv_timeout(timeout) {
            Ok(block) => Ok(copy_block(&block, dst)),
            Err(RecvTimeoutError::Timeout) => Err(IioError::Timeout(format!(
                "no samples from '{}' within {:?}",
                device, timeout
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                Err(IioError::Io(format!("sample source of '{}' closed", device)))
            }
        }
    }

    fn push_inner(&self, device: &str, src: &[u8], timeout: Duration) -> Result<usize> {
        self.require_live("push")?;
        {
            let state = self.lock();
            let buffer = state.buffers.get(device).ok_or_else(|| {
                IioError::InvalidArgument(format!("no buffer open on '{}'", device))
            })?;
            if buffer.request.direction != Direction::Output {
                return Err(IioError::InvalidArgument(format!(
                    "buffer on '{}' is not an output buffer",
                    device
                )));
            }
        }

        self.simulate_transfer(timeout)?;

        let mut state = self.lock();
        let buffer = state.buffers.get_mut(device).ok_or_else(|| {
            IioError::Io(format!("buffer on '{}' closed during push", device))
        })?;
        if buffer.request.cyclic {
            buffer.cyclic_content = Some(src.to_vec());
        } else {
            buffer.pushed.push(src.to_vec());
        }
        Ok(src.len())
    }
}

fn copy_block(block: &[u8], dst: &mut [u8]) -> usize {
    let n = block.len().min(dst.len());
    dst[..n].copy_from_slice(&block[..n]);
    n
}

impl Backend for SimulatedBackend {
    fn describe(&self) -> Result<ContextDescription> {
        Ok(self.description.clone())
    }

    fn read_attr(&self, target: &AttrTarget, attr: &str) -> Result<Vec<u8>> {
        let start = Instant::now();
        let result = self.read_attr_inner(target, attr);
        let bytes = result.as_ref().map(|v| v.len() as u64).unwrap_or(0);
        self.record(OpKind::AttrRead, start, &result, bytes);
        result
    }

    fn write_attr(&self, target: &AttrTarget, attr: &str, value: &[u8]) -> Result<usize> {
        let start = Instant::now();
        let result = self.write_attr_inner(target, attr, value);
        self.record(OpKind::AttrWrite, start, &result, value.len() as u64);
        result
    }

    fn read_attrs(&self, target: &AttrTarget, attrs: &[String]) -> Result<Vec<u8>> {
        let start = Instant::now();
        let mut encoder = crate::attr::codec::BlockEncoder::new();
        for attr in attrs {
            encoder.push_result(&self.read_attr_inner(target, attr));
        }
        let result = Ok(encoder.finish());
        self.record(OpKind::Batch, start, &result, 0);
        result
    }

    fn set_timeout(&self, timeout: Duration) -> Result<()> {
        self.lock().timeout = timeout;
        Ok(())
    }

    fn set_trigger(&self, device: &str, trigger: Option<String>) -> Result<()> {
        self.require_live("trigger association")?;
        self.require_device(device)?;
        if let Some(trigger) = &trigger {
            match self.description.device(trigger) {
                Some(dev) if dev.reports_trigger() => {}
                Some(_) => {
                    return Err(IioError::InvalidArgument(format!(
                        "'{}' is not a trigger",
                        trigger
                    )))
                }
                None => return Err(IioError::NotFound(format!("trigger '{}'", trigger))),
            }
        }
        tracing::debug!("Trigger of '{}' set to {:?}", device, trigger);
        self.lock().triggers.insert(device.to_string(), trigger);
        Ok(())
    }

    fn open_buffer(&self, request: &BufferRequest) -> Result<()> {
        self.require_live("buffer streaming")?;
        self.require_device(&request.device)?;
        let mut state = self.lock();
        if state.buffers.contains_key(&request.device) {
            return Err(IioError::Backend {
                code: EBUSY,
                message: format!("device '{}' already has a buffer", request.device),
            });
        }
        tracing::debug!(
            "Opened {} buffer on '{}': {} samples x {} bytes",
            request.direction,
            request.device,
            request.samples,
            request.sample_size
        );
        state.buffers.insert(
            request.device.clone(),
            SimBuffer {
                request: request.clone(),
                next_record: 0,
                pushed: Vec::new(),
                cyclic_content: None,
            },
        );
        Ok(())
    }

    fn close_buffer(&self, device: &str) -> Result<()> {
        if self.lock().buffers.remove(device).is_some() {
            tracing::debug!("Closed buffer on '{}'", device);
        }
        Ok(())
    }

    fn refill(&self, device: &str, dst: &mut [u8], timeout: Duration) -> Result<usize> {
        let start = Instant::now();
        let result = self.refill_inner(device, dst, timeout);
        let bytes = *result.as_ref().unwrap_or(&0) as u64;
        self.record(OpKind::Refill, start, &result, bytes);
        result
    }

    fn push(&self, device: &str, src: &[u8], timeout: Duration) -> Result<usize> {
        let start = Instant::now();
        let result = self.push_inner(device, src, timeout);
        let bytes = *result.as_ref().unwrap_or(&0) as u64;
        self.record(OpKind::Push, start, &result, bytes);
        result
    }

    fn reg_read(&self, device: &str, address: u32) -> Result<u32> {
        self.require_live("register access")?;
        self.require_device(device)?;
        let start = Instant::now();
        let result = Ok(self
            .lock()
            .registers
            .get(&(device.to_string(), address))
            .copied()
            .unwrap_or(0));
        self.record(OpKind::Register, start, &result, 4);
        result
    }

    fn reg_write(&self, device: &str, address: u32, value: u32) -> Result<()> {
        self.require_live("register access")?;
        self.require_device(device)?;
        let start = Instant::now();
        self.lock()
            .registers
            .insert((device.to_string(), address), value);
        self.record(OpKind::Register, start, &Ok(()), 4);
        Ok(())
    }

    fn stats(&self) -> BackendStats {
        self.lock().stats.clone()
    }
}
