//! Backend trait for the transport behind a context
//!
//! A backend performs every I/O on behalf of the entity graph: enumeration,
//! attribute reads/writes, buffer transfers, trigger association and
//! register access. Only the first three are required; everything else
//! defaults to [`IioError::Unsupported`] so minimal backends stay small.

use crate::attr::codec::{AttrBlock, BlockDecoder, BlockEncoder};
use crate::attr::AttrTarget;
use crate::backend::description::ContextDescription;
use crate::error::{IioError, Result};
use crate::types::{ChannelKey, Direction};
use std::time::Duration;

/// Kind of backend operation, for statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// Single attribute read
    AttrRead,
    /// Single attribute write
    AttrWrite,
    /// Whole-scope attribute exchange
    Batch,
    /// Buffer refill
    Refill,
    /// Buffer push
    Push,
    /// Register access
    Register,
}

/// Statistics for backend operations
///
/// Tracks success rates, throughput and time spent in the transport.
#[derive(Debug, Clone, Default)]
pub struct BackendStats {
    /// Total number of successful operations
    pub successful_ops: u64,
    /// Total number of failed operations
    pub failed_ops: u64,
    /// Successful single attribute reads
    pub attr_reads: u64,
    /// Successful single attribute writes
    pub attr_writes: u64,
    /// Successful batch exchanges
    pub batch_exchanges: u64,
    /// Successful refills
    pub refills: u64,
    /// Successful pushes
    pub pushes: u64,
    /// Bytes moved from the device
    pub bytes_in: u64,
    /// Bytes moved to the device
    pub bytes_out: u64,
    /// Total operation time in microseconds
    pub total_time_us: u64,
}

impl BackendStats {
    /// Average operation time in microseconds
    pub fn avg_time_us(&self) -> f64 {
        if self.successful_ops == 0 {
            0.0
        } else {
            self.total_time_us as f64 / self.successful_ops as f64
        }
    }

    /// Success rate as percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.successful_ops + self.failed_ops;
        if total == 0 {
            100.0
        } else {
            (self.successful_ops as f64 / total as f64) * 100.0
        }
    }

    /// Record a successful operation
    pub fn record_success(&mut self, kind: OpKind, time_us: u64, bytes: u64) {
        self.successful_ops += 1;
        self.total_time_us += time_us;

        match kind {
            OpKind::AttrRead => {
                self.attr_reads += 1;
                self.bytes_in += bytes;
            }
            OpKind::AttrWrite => {
                self.attr_writes += 1;
                self.bytes_out += bytes;
            }
            OpKind::Batch => self.batch_exchanges += 1,
            OpKind::Refill => {
                self.refills += 1;
                self.bytes_in += bytes;
            }
            OpKind::Push => {
                self.pushes += 1;
                self.bytes_out += bytes;
            }
            OpKind::Register => {}
        }
    }

    /// Record a failed operation
    pub fn record_failure(&mut self) {
        self.failed_ops += 1;
    }

}

/// Everything a backend needs to open a device buffer
#[derive(Debug, Clone, PartialEq)]
pub struct BufferRequest {
    /// Device id
    pub device: String,
    /// Capacity in samples (records)
    pub samples: usize,
    /// Whether an output buffer repeats its content
    pub cyclic: bool,
    /// Direction shared by all enabled channels
    pub direction: Direction,
    /// Enabled scan elements in ascending scan-index order
    pub channels: Vec<ChannelKey>,
    /// Bytes per record
    pub sample_size: usize,
}

impl BufferRequest {
    /// Total buffer size in bytes, `None` if it does not fit in `usize`
    pub fn byte_len(&self) -> Option<usize> {
        self.samples.checked_mul(self.sample_size)
    }
}

/// Transport contract behind a context
///
/// Implementations must be `Send + Sync`; the context shares one backend
/// between all devices, channels and buffers. Channel attributes are
/// addressed by their on-wire filename.
///
/// # Example
///
/// ```ignore
/// fn dump(backend: &dyn Backend, dev: &str, attrs: &[String]) -> Result<Vec<u8>> {
///     backend.read_attrs(&AttrTarget::Device(dev.to_string()), attrs)
/// }
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait Backend: Send + Sync {
    /// Enumerate the device tree
    fn describe(&self) -> Result<ContextDescription>;

    /// Read one attribute's raw value
    fn read_attr(&self, target: &AttrTarget, attr: &str) -> Result<Vec<u8>>;

    /// Write one attribute's raw value, returning the bytes consumed
    fn write_attr(&self, target: &AttrTarget, attr: &str, value: &[u8]) -> Result<usize>;

    /// Read every listed attribute in one exchange
    ///
    /// The result is a block stream in the order of `attrs`. Default
    /// implementation reads one by one and encodes per-item failures as
    /// error blocks; backends with a native batch transfer override it.
    fn read_attrs(&self, target: &AttrTarget, attrs: &[String]) -> Result<Vec<u8>> {
        let mut encoder = BlockEncoder::new();
        for attr in attrs {
            encoder.push_result(&self.read_attr(target, attr));
        }
        Ok(encoder.finish())
    }

    /// Apply a block stream to the listed attributes
    ///
    /// Error blocks are skipped. Remaining attributes are still written
    /// after a failed one; the first failure is reported.
    fn write_attrs(&self, target: &AttrTarget, attrs: &[String], blocks: &[u8]) -> Result<()> {
        let mut decoder = BlockDecoder::new(blocks);
        let mut first_error = None;
        for attr in attrs {
            match decoder.next() {
                Some(Ok(AttrBlock::Data(value))) => {
                    if let Err(e) = self.write_attr(target, attr, value) {
                        first_error.get_or_insert(e);
                    }
                }
                Some(Ok(AttrBlock::Error(_))) => {}
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(IioError::Io(format!("no block for attribute '{}'", attr)));
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Propagate the context deadline to the transport
    fn set_timeout(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    /// Associate a trigger with a device; `None` clears the association
    fn set_trigger(&self, device: &str, _trigger: Option<String>) -> Result<()> {
        Err(IioError::Unsupported(format!("triggers on device '{}'", device)))
    }

    /// Prepare the device for streaming
    fn open_buffer(&self, request: &BufferRequest) -> Result<()> {
        Err(IioError::Unsupported(format!(
            "buffers on device '{}'",
            request.device
        )))
    }

    /// Release the device's streaming resources
    fn close_buffer(&self, _device: &str) -> Result<()> {
        Ok(())
    }

    /// Fill `dst` with device samples, returning the bytes written
    fn refill(&self, device: &str, _dst: &mut [u8], _timeout: Duration) -> Result<usize> {
        Err(IioError::Unsupported(format!("refill on device '{}'", device)))
    }

    /// Send `src` to the device, returning the bytes consumed
    fn push(&self, device: &str, _src: &[u8], _timeout: Duration) -> Result<usize> {
        Err(IioError::Unsupported(format!("push on device '{}'", device)))
    }

    /// Read a device register
    fn reg_read(&self, device: &str, _address: u32) -> Result<u32> {
        Err(IioError::Unsupported(format!(
            "register access on device '{}'",
            device
        )))
    }

    /// Write a device register
    fn reg_write(&self, device: &str, _address: u32, _value: u32) -> Result<()> {
        Err(IioError::Unsupported(format!(
            "register access on device '{}'",
            device
        )))
    }

    /// Snapshot of the operation statistics
    fn stats(&self) -> BackendStats {
        BackendStats::default()
    }
}
