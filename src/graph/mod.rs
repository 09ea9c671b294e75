//! Entity graph: context, devices, channels and their attributes
//!
//! The graph is built once from [`Backend::describe`](crate::backend::Backend::describe)
//! and never re-enumerated. Devices and channels are owned by the
//! [`Context`]; channel enable flags and trigger links are the only state
//! that changes afterwards.

pub mod attrs;
pub mod channel;
pub mod context;
pub mod device;
pub mod xml;

pub use attrs::{AttrBatch, AttrEntry, AttrScope};
pub use channel::Channel;
pub use context::Context;
pub use device::Device;
