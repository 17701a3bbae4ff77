/*!
 * Bluetooth Controller
 * Owns the bus, the watch set and the device list
 */

use std::rc::Rc;

use crossbeam::channel::{unbounded, Receiver, Sender};
use tracing::{debug, info, trace, warn};

use crate::bus::{Envelope, MethodCall, SystemBus, Transport};
use crate::config::BluetoothConfig;
use crate::device::{Device, ADAPTER_INTERFACE};
use crate::enumerate::Enumerator;
use crate::error::{AgentError, Result};
use crate::watch::{self, WatchSet};

/// Published after every successful device list update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevicesChanged {
    pub generation: u64,
    pub count: usize,
}

/// Whether the root-path handler consumed an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Yes,
    NotYetHandled,
}

pub struct Controller {
    bus: Rc<dyn Transport>,
    config: BluetoothConfig,
    enumerator: Enumerator,
    watches: WatchSet,
    devices: Vec<Device>,
    generation: u64,
    changes: Sender<DevicesChanged>,
    subscriber: Option<Receiver<DevicesChanged>>,
}

impl Controller {
    /// Connect to the system bus. Failing to connect is fatal.
    pub fn connect(config: &BluetoothConfig) -> Result<Self> {
        let bus = SystemBus::connect(config.call_timeout()).map_err(AgentError::Connect)?;
        Ok(Self::with_transport(Rc::new(bus), config))
    }

    pub fn with_transport(bus: Rc<dyn Transport>, config: &BluetoothConfig) -> Self {
        let (changes, subscriber) = unbounded();
        let mut controller = Self {
            enumerator: Enumerator::new(&config.service, &config.device_prefix()),
            config: config.clone(),
            bus,
            watches: WatchSet::new(),
            devices: Vec::new(),
            generation: 0,
            changes,
            subscriber: Some(subscriber),
        };

        let rule = controller.config.signal_match_rule();
        if let Err(e) = controller.bus.add_match(&rule) {
            warn!("Could not subscribe to device signals: {}", e);
        }
        controller.bus.sync_watches(&mut controller.watches);

        controller
    }

    /// Take the change notification receiver. There is exactly one; later
    /// calls get `None`.
    pub fn subscribe(&mut self) -> Option<Receiver<DevicesChanged>> {
        let receiver = self.subscriber.take();
        if receiver.is_none() {
            warn!("Device list already has a subscriber");
        }
        receiver
    }

    /// Snapshot of the current device list, bonded devices first.
    pub fn devices(&self) -> Vec<Device> {
        self.devices.clone()
    }

    pub fn watches(&self) -> &WatchSet {
        &self.watches
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Re-enumerate and swap in the new list. Returns `false` and keeps the
    /// previous list if enumeration failed.
    pub fn update_devices(&mut self) -> bool {
        let mut devices = match self.enumerator.enumerate(&self.bus) {
            Ok(devices) => devices,
            Err(e) => {
                debug!("Keeping previous device list: {}", e);
                return false;
            }
        };

        let pair_timeout = self.config.pair_timeout();
        devices = devices
            .into_iter()
            .map(|d| d.with_pair_timeout(pair_timeout))
            .collect();
        // Stable: enumeration order is kept within each group
        devices.sort_by_key(|d| !d.is_bonded());

        self.devices = devices;
        self.generation += 1;

        let event = DevicesChanged {
            generation: self.generation,
            count: self.devices.len(),
        };
        // Until someone subscribes there is nobody to drain the queue
        if self.subscriber.is_some() || self.changes.send(event).is_err() {
            trace!("No subscriber for device list changes");
        }
        true
    }

    /// One non-blocking I/O tick, routing everything that came in.
    pub fn poll(&mut self) {
        let inbound = self.watches.poll_once(self.bus.as_ref());
        self.route_all(inbound);
    }

    /// Block until the bus has done some I/O, then route what arrived.
    pub fn dispatch(&mut self) {
        self.bus.wait_for_io();
        let inbound = watch::drain(self.bus.as_ref());
        self.bus.sync_watches(&mut self.watches);
        self.route_all(inbound);
    }

    pub fn start_discovery(&self) -> Result<()> {
        let call = self.adapter_call("StartDiscovery");
        self.bus.call(&call).map_err(AgentError::Discovery)?;
        info!("Discovery started on {}", self.config.adapter_path);
        Ok(())
    }

    /// Best effort; a failure is only logged.
    pub fn stop_discovery(&self) {
        match self.bus.send(&self.adapter_call("StopDiscovery")) {
            Ok(()) => info!("Discovery stopped on {}", self.config.adapter_path),
            Err(e) => debug!("StopDiscovery failed: {}", e),
        }
    }

    /// Root-path message handler.
    pub fn route(&mut self, envelope: &Envelope) -> Handled {
        if envelope.is_signal("InterfacesAdded") || envelope.is_signal("InterfacesRemoved") {
            debug!(
                "{} from {}",
                envelope.member.as_deref().unwrap_or_default(),
                envelope.sender.as_deref().unwrap_or("?")
            );
            self.update_devices();
            return Handled::Yes;
        }

        trace!("Unhandled {:?} {:?}", envelope.kind, envelope.member);
        Handled::NotYetHandled
    }

    fn route_all(&mut self, inbound: Vec<Envelope>) {
        for envelope in &inbound {
            self.route(envelope);
        }
    }

    fn adapter_call(&self, method: &str) -> MethodCall {
        MethodCall::new(
            &self.config.service,
            &self.config.adapter_path,
            ADAPTER_INTERFACE,
            method,
        )
    }
}
