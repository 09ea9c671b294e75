//! # iio-core: Industrial I/O device access
//!
//! A library for talking to Linux Industrial I/O style devices (ADCs, DACs,
//! IMUs, transceivers) through a pluggable backend. The device tree is
//! enumerated once into an entity graph; attributes are read and written
//! through the backend, individually or in one batched exchange; sample data
//! moves through buffers whose interleaved records are demultiplexed per
//! channel and converted between the hardware container format and host
//! integers or scaled floats.
//!
//! ## Architecture
//!
//! - **Graph**: [`Context`] → [`Device`] → [`Channel`], plus trigger links
//! - **Attributes**: typed access and the length-prefixed batch codec
//! - **Buffers**: interleaved sample blocks, demux/mux per channel
//! - **Backend**: the [`Backend`](backend::Backend) trait every transport
//!   implements; [`SimulatedBackend`] ships in-tree
//!
//! ## Configuration
//!
//! Defaults for transfer timeouts, batch limits and logging live in a TOML
//! file under the platform config directory, in `iio-core/config.toml`:
//!
//! - **Linux**: `~/.config/iio-core/`
//! - **macOS**: `~/Library/Application Support/iio-core/`
//! - **Windows**: `%APPDATA%\iio-core\`
//!
//! ## Example
//!
//! ```ignore
//! use iio_core::{Context, ContextConfig, Direction, SimulatedBackend, SimulationMode};
//!
//! let config = ContextConfig::load_or_default(ContextConfig::default_path().unwrap());
//! let backend = SimulatedBackend::from_file("rig.toml", SimulationMode::Live)?;
//! let mut ctx = Context::with_config(backend, &config)?;
//!
//! let adc = ctx.find_device_mut("ad7476").unwrap();
//! adc.find_channel_mut("voltage0", Direction::Input).unwrap().enable();
//!
//! let adc = ctx.find_device("ad7476").unwrap();
//! let chn = adc.find_channel("voltage0", Direction::Input).unwrap();
//! let mut buf = ctx.create_buffer(adc, 1024, false)?;
//! buf.refill()?;
//! for sample in buf.samples(chn) {
//!     println!("{}", sample.as_f64());
//! }
//! ```

pub mod attr;
pub mod backend;
pub mod buffer;
pub mod config;
pub mod convert;
pub mod error;
pub mod graph;
pub mod types;
pub mod user_data;

// Re-export commonly used types
pub use attr::{AttrTarget, AttrValue};
pub use backend::{Backend, SimulatedBackend, SimulationMode};
pub use buffer::{Buffer, BufferLayout};
pub use config::ContextConfig;
pub use convert::{convert, convert_inverse};
pub use error::{IioError, Result};
pub use graph::{AttrBatch, Channel, Context, Device};
pub use types::{ChannelKey, DataFormat, Direction, Sample, SampleKind};
pub use user_data::{EntityKey, UserData};
