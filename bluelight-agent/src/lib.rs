/*!
 * Bluelight Agent
 * Bluetooth proximity and pairing agent on top of BlueZ over D-Bus
 */

pub mod bus;
pub mod config;
pub mod controller;
pub mod device;
pub mod enumerate;
pub mod error;
pub mod keys;
pub mod watch;

#[cfg(test)]
mod testing;

pub use bus::{BusError, SystemBus, Transport, Value};
pub use config::{AgentConfig, BluetoothConfig, DEFAULT_CONFIG_PATH};
pub use controller::{Controller, DevicesChanged};
pub use device::{Device, Proximity};
pub use error::{AgentError, Result};
pub use keys::TrustedKeys;
