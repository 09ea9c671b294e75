//! Backend adapters
//!
//! A backend is whatever actually reaches the hardware: a local sysfs tree, a
//! network daemon, a USB link. The graph and buffer layers only ever talk to
//! it through the [`Backend`] trait, so every transport is interchangeable.
//!
//! # Components
//!
//! - [`Backend`] - The contract: enumeration, attribute I/O, batch exchanges,
//!   buffer transfers, registers and trigger links
//! - [`ContextDescription`] - Serializable snapshot of a device tree, as
//!   returned by [`Backend::describe`]
//! - [`SimulatedBackend`] - In-memory backend built from a description, used
//!   for tests and for replaying snapshot files
//! - [`BackendStats`] - Per-backend operation counters
//!
//! # Example
//!
//! ```ignore
//! use iio_core::backend::{SimulatedBackend, SimulationMode};
//! use iio_core::Context;
//!
//! let backend = SimulatedBackend::from_file("rig.toml", SimulationMode::Live)?;
//! let ctx = Context::new(backend)?;
//! for dev in ctx.devices() {
//!     println!("{}: {}", dev.id(), dev.label());
//! }
//! ```

pub mod backend_trait;
pub mod description;
pub mod simulated;

pub use backend_trait::{Backend, BackendStats, BufferRequest, OpKind};
pub use description::{
    AttrDescription, ChannelDescription, ContextDescription, ContextVersion, DeviceDescription,
};
pub use simulated::{SignalPattern, SimulatedBackend, SimulationMode};

#[cfg(test)]
pub use backend_trait::MockBackend;
