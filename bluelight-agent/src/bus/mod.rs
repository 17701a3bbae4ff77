/*!
 * IPC Transport
 * Blocking request/reply and signal delivery over the system bus
 */

pub mod system;
pub mod value;

use std::os::unix::io::RawFd;
use std::time::Duration;

use thiserror::Error;

use crate::watch::{WatchEvent, WatchHooks};

pub use system::SystemBus;
pub use value::Value;

pub const DBUS_SERVICE: &str = "org.freedesktop.DBus";
pub const DBUS_PATH: &str = "/org/freedesktop/DBus";
pub const DBUS_INTERFACE: &str = "org.freedesktop.DBus";
pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";
pub const OBJECT_MANAGER_INTERFACE: &str = "org.freedesktop.DBus.ObjectManager";

pub const ERROR_INVALID_ARGS: &str = "org.freedesktop.DBus.Error.InvalidArgs";
pub const ERROR_FAILED: &str = "org.freedesktop.DBus.Error.Failed";

/// Error reply (or local failure) of a bus call.
///
/// `name` is the D-Bus error identifier, which is what callers classify on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name}: {message}")]
pub struct BusError {
    pub name: String,
    pub message: String,
}

impl BusError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn invalid_args(message: impl Into<String>) -> Self {
        Self::new(ERROR_INVALID_ARGS, message)
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }
}

impl From<dbus::Error> for BusError {
    fn from(err: dbus::Error) -> Self {
        Self::new(
            err.name().unwrap_or(ERROR_FAILED),
            err.message().unwrap_or_default(),
        )
    }
}

/// A method call addressed to a remote object.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub service: String,
    pub path: String,
    pub interface: String,
    pub method: String,
    pub args: Vec<Value>,
    /// Overrides the transport's default timeout
    pub timeout: Option<Duration>,
}

impl MethodCall {
    pub fn new(service: &str, path: &str, interface: &str, method: &str) -> Self {
        Self {
            service: service.to_string(),
            path: path.to_string(),
            interface: interface.to_string(),
            method: method.to_string(),
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    MethodCall,
    MethodReturn,
    Error,
    Signal,
}

/// An inbound message as delivered to the root-path handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub kind: MessageKind,
    pub sender: Option<String>,
    pub path: Option<String>,
    pub interface: Option<String>,
    pub member: Option<String>,
    pub args: Vec<Value>,
}

impl Envelope {
    pub fn signal(sender: &str, path: &str, interface: &str, member: &str) -> Self {
        Self {
            kind: MessageKind::Signal,
            sender: Some(sender.to_string()),
            path: Some(path.to_string()),
            interface: Some(interface.to_string()),
            member: Some(member.to_string()),
            args: Vec::new(),
        }
    }

    pub fn is_signal(&self, member: &str) -> bool {
        self.kind == MessageKind::Signal && self.member.as_deref() == Some(member)
    }
}

/// Connection to a message bus.
///
/// Every call blocks until reply or timeout. The fd side is exposed through
/// watches: the host owns the poll loop and feeds readiness back in with
/// [`Transport::handle_watch`], then drains [`Transport::dispatch_one`].
///
/// All methods take `&self` so one connection can be shared between the
/// controller and the device snapshots it hands out.
pub trait Transport {
    /// Blocking method call. Returns the reply arguments.
    fn call(&self, call: &MethodCall) -> Result<Vec<Value>, BusError>;

    /// Send without waiting for a reply.
    fn send(&self, call: &MethodCall) -> Result<(), BusError>;

    /// Register interest in signals matching `rule`.
    fn add_match(&self, rule: &str) -> Result<(), BusError> {
        let call = MethodCall::new(DBUS_SERVICE, DBUS_PATH, DBUS_INTERFACE, "AddMatch").arg(rule);
        self.call(&call).map(drop)
    }

    /// Report watch registration changes since the last sync.
    fn sync_watches(&self, hooks: &mut dyn WatchHooks);

    /// Deliver fd readiness for a watch.
    fn handle_watch(&self, fd: RawFd, event: WatchEvent);

    /// Pop one buffered inbound message, if any.
    fn dispatch_one(&self) -> Option<Envelope>;

    /// Block until one round of I/O has happened.
    fn wait_for_io(&self);
}
