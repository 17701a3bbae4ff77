/*!
 * Bluetooth Device
 * Cached BlueZ Device1 properties, pairing and proximity checks
 */

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::bus::{BusError, MethodCall, Transport, Value, PROPERTIES_INTERFACE};

pub const DEVICE_INTERFACE: &str = "org.bluez.Device1";
pub const ADAPTER_INTERFACE: &str = "org.bluez.Adapter1";

pub const ERROR_ALREADY_CONNECTED: &str = "org.bluez.Error.AlreadyConnected";
pub const ERROR_ALREADY_EXISTS: &str = "org.bluez.Error.AlreadyExists";

/// Alias shown for devices that do not expose one.
pub const UNKNOWN_ALIAS: &str = "NO_NAME";

/// Result of a proximity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proximity {
    Present,
    Absent,
}

impl Proximity {
    pub fn is_present(self) -> bool {
        self == Proximity::Present
    }
}

impl fmt::Display for Proximity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Proximity::Present => write!(f, "present"),
            Proximity::Absent => write!(f, "absent"),
        }
    }
}

/// Raw property values as reported by the daemon. `None` means the
/// property was not exposed or had an unexpected type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceProperties {
    pub alias: Option<String>,
    pub address: Option<String>,
    pub bonded: Option<bool>,
    pub connected: Option<bool>,
    pub rssi: Option<i16>,
}

impl DeviceProperties {
    /// One independent `Properties.Get` per field; a failure only affects
    /// its own field.
    pub fn fetch(bus: &dyn Transport, service: &str, path: &str) -> Self {
        let get = |name: &str| get_property(bus, service, path, name);
        Self {
            alias: get("Alias").as_ref().and_then(Value::as_str).map(str::to_string),
            address: get("Address").as_ref().and_then(Value::as_str).map(str::to_string),
            bonded: get("Bonded").as_ref().and_then(Value::as_bool),
            connected: get("Connected").as_ref().and_then(Value::as_bool),
            rssi: get("RSSI").as_ref().and_then(Value::as_i16),
        }
    }
}

fn get_property(bus: &dyn Transport, service: &str, path: &str, name: &str) -> Option<Value> {
    let call = MethodCall::new(service, path, PROPERTIES_INTERFACE, "Get")
        .arg(DEVICE_INTERFACE)
        .arg(name);

    match bus.call(&call) {
        Ok(reply) => reply.into_iter().next(),
        Err(e) => {
            debug!("{} has no {}: {}", path, name, e);
            None
        }
    }
}

/// A device snapshot plus the handle needed to act on it.
#[derive(Clone)]
pub struct Device {
    bus: Rc<dyn Transport>,
    service: String,
    path: String,
    alias: String,
    address: String,
    bonded: bool,
    connected: bool,
    rssi: Option<i16>,
    pair_timeout: Option<Duration>,
}

impl Device {
    /// Fetch the current properties of the device at `path`.
    pub fn fetch(bus: Rc<dyn Transport>, service: &str, path: &str) -> Self {
        let props = DeviceProperties::fetch(bus.as_ref(), service, path);
        Self::from_properties(bus, service, path, props)
    }

    pub fn from_properties(
        bus: Rc<dyn Transport>,
        service: &str,
        path: &str,
        props: DeviceProperties,
    ) -> Self {
        Self {
            bus,
            service: service.to_string(),
            path: path.to_string(),
            alias: props.alias.unwrap_or_else(|| UNKNOWN_ALIAS.to_string()),
            address: props.address.unwrap_or_default(),
            bonded: props.bonded.unwrap_or(false),
            connected: props.connected.unwrap_or(false),
            rssi: props.rssi,
            pair_timeout: None,
        }
    }

    pub fn with_pair_timeout(mut self, timeout: Duration) -> Self {
        self.pair_timeout = Some(timeout);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_bonded(&self) -> bool {
        self.bonded
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Signal strength in dBm, `None` when unknown.
    pub fn rssi(&self) -> Option<i16> {
        self.rssi
    }

    /// Devices that never reported a name get their address as alias.
    pub fn is_unnamed(&self) -> bool {
        self.alias == UNKNOWN_ALIAS
            || (!self.address.is_empty() && self.alias.replace('-', ":") == self.address)
    }

    /// The adapter this device belongs to.
    pub fn adapter_path(&self) -> &str {
        match self.path.rsplit_once('/') {
            Some((parent, _)) if !parent.is_empty() => parent,
            _ => "/",
        }
    }

    /// Re-read only the live link state.
    pub fn refresh_connection_state(&mut self) -> bool {
        self.connected = get_property(self.bus.as_ref(), &self.service, &self.path, "Connected")
            .as_ref()
            .and_then(Value::as_bool)
            .unwrap_or(false);
        self.connected
    }

    /// Pair with the device. Already paired or connected counts as success.
    pub fn pair(&self) -> bool {
        let mut call = self.device_call("Pair");
        if let Some(timeout) = self.pair_timeout {
            call = call.timeout(timeout);
        }

        match self.bus.call(&call) {
            Ok(_) => {
                info!("Paired with {} ({})", self.alias, self.address);
                true
            }
            Err(e) if e.is(ERROR_ALREADY_CONNECTED) || e.is(ERROR_ALREADY_EXISTS) => {
                debug!("{} already paired: {}", self.alias, e.name);
                true
            }
            Err(e) => {
                warn!("Pairing with {} failed: {}", self.alias, e);
                false
            }
        }
    }

    /// Forget the device: drop the bond on the owning adapter.
    pub fn unpair(&self) -> bool {
        let call = MethodCall::new(&self.service, self.adapter_path(), ADAPTER_INTERFACE, "RemoveDevice")
            .arg(Value::object_path(self.path.as_str()));

        match self.bus.call(&call) {
            Ok(_) => {
                info!("Removed {} ({})", self.alias, self.address);
                true
            }
            Err(e) => {
                warn!("Removing {} failed: {}", self.alias, e);
                false
            }
        }
    }

    /// Check whether the device is in range.
    ///
    /// A live link is re-confirmed first. Otherwise only bonded devices can
    /// be checked: a successful connect proves range and is immediately torn
    /// down again so the check does not leave a link behind.
    pub fn verify_proximity(&mut self) -> Proximity {
        if self.connected && self.refresh_connection_state() {
            return Proximity::Present;
        }

        if !self.bonded {
            return Proximity::Absent;
        }

        match self.connect() {
            Ok(()) => {
                if let Err(e) = self.disconnect() {
                    warn!("Disconnect after proximity check of {} failed: {}", self.alias, e);
                }
                Proximity::Present
            }
            Err(e) if e.is(ERROR_ALREADY_CONNECTED) => Proximity::Present,
            Err(e) => {
                debug!("{} not in range: {}", self.alias, e);
                Proximity::Absent
            }
        }
    }

    fn connect(&self) -> Result<(), BusError> {
        self.bus.call(&self.device_call("Connect")).map(drop)
    }

    fn disconnect(&self) -> Result<(), BusError> {
        self.bus.call(&self.device_call("Disconnect")).map(drop)
    }

    fn device_call(&self, method: &str) -> MethodCall {
        MethodCall::new(&self.service, &self.path, DEVICE_INTERFACE, method)
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("path", &self.path)
            .field("alias", &self.alias)
            .field("address", &self.address)
            .field("bonded", &self.bonded)
            .field("connected", &self.connected)
            .field("rssi", &self.rssi)
            .finish_non_exhaustive()
    }
}
