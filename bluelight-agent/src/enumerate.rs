/*!
 * Object Enumeration
 * GetManagedObjects reply walked into the device list
 */

use std::rc::Rc;

use tracing::{debug, warn};

use crate::bus::{BusError, MethodCall, Transport, Value, OBJECT_MANAGER_INTERFACE};
use crate::device::Device;

/// Where and how to look for devices.
#[derive(Debug, Clone)]
pub struct Enumerator {
    pub service: String,
    /// Object paths strictly below this prefix are devices
    pub device_prefix: String,
}

impl Enumerator {
    pub fn new(service: &str, device_prefix: &str) -> Self {
        Self {
            service: service.to_string(),
            device_prefix: device_prefix.to_string(),
        }
    }

    /// List every device currently managed by the daemon, in reply order.
    ///
    /// The whole reply is decoded before any device is fetched. On error the
    /// caller keeps whatever list it had.
    pub fn enumerate(&self, bus: &Rc<dyn Transport>) -> Result<Vec<Device>, BusError> {
        let call = MethodCall::new(&self.service, "/", OBJECT_MANAGER_INTERFACE, "GetManagedObjects");
        let reply = bus.call(&call)?;

        let paths = managed_object_paths(&reply)?;
        let devices: Vec<Device> = paths
            .iter()
            .filter(|path| self.is_device_path(path))
            .map(|path| Device::fetch(bus.clone(), &self.service, path))
            .collect();

        debug!(
            "Enumerated {} managed objects, {} devices",
            paths.len(),
            devices.len()
        );
        Ok(devices)
    }

    pub fn is_device_path(&self, path: &str) -> bool {
        path.len() > self.device_prefix.len() && path.starts_with(self.device_prefix.as_str())
    }
}

/// Object paths of an `a{oa{sa{sv}}}` reply. The per-object interface map
/// is not looked at here.
pub fn managed_object_paths(reply: &[Value]) -> Result<Vec<String>, BusError> {
    let objects = reply
        .first()
        .filter(|v| v.as_array().is_some())
        .ok_or_else(|| BusError::invalid_args("GetManagedObjects reply is not a dictionary"))?;

    let mut paths = Vec::new();
    for (key, _interfaces) in objects.entries() {
        match key.as_object_path() {
            Some(path) if !paths.iter().any(|p| p == path) => paths.push(path.to_string()),
            Some(path) => warn!("Duplicate managed object {}", path),
            None => warn!("Skipping managed object keyed by {}", key.kind()),
        }
    }
    Ok(paths)
}
