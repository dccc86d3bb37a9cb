//! Domain types for FleetHQ
//!
//! - [`DeviceKey`] - `host/device` identity of a managed server
//! - [`RawUpdate`] / [`AggregatedSnapshot`] - per-attribute observations and
//!   their per-window reduction
//! - [`ServerRegistry`] - read-only lookup from device key to display name

mod device;
mod server;
mod update;

pub use device::{DeviceKey, DeviceKeyError};
pub use server::{ManagedServerRecord, ServerRegistry};
pub use update::{AggregatedSnapshot, RawUpdate, STATE_ATTRIBUTE, STATUS_ATTRIBUTE};
pub use update::{UNKNOWN_VALUE, value_to_text};
