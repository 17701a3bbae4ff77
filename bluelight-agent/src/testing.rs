//! Scripted in-memory transport for unit tests.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::os::unix::io::RawFd;
use std::rc::Rc;

use crate::bus::{
    BusError, Envelope, MethodCall, Transport, Value, ERROR_INVALID_ARGS, PROPERTIES_INTERFACE,
};
use crate::device::DEVICE_INTERFACE;
use crate::watch::{Watch, WatchEvent, WatchHooks};

enum WatchChange {
    Added(Watch),
    Removed(RawFd),
}

#[derive(Default)]
pub struct FakeBus {
    properties: RefCell<HashMap<(String, String), Value>>,
    failures: RefCell<HashMap<(String, String), String>>,
    managed: RefCell<Option<Result<Vec<Value>, String>>>,
    calls: RefCell<Vec<MethodCall>>,
    sent: RefCell<Vec<MethodCall>>,
    inbound: RefCell<VecDeque<Envelope>>,
    watch_changes: RefCell<VecDeque<WatchChange>>,
    handled: RefCell<Vec<(RawFd, WatchEvent)>>,
    waits: Cell<usize>,
}

impl FakeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Rc<Self> {
        Rc::new(Self::new())
    }

    pub fn set_property(&self, path: &str, name: &str, value: Value) {
        self.properties
            .borrow_mut()
            .insert((path.to_string(), name.to_string()), value);
    }

    /// Make every later call of `method` on `path` fail with `error`.
    pub fn fail_method(&self, path: &str, method: &str, error: &str) {
        self.failures
            .borrow_mut()
            .insert((path.to_string(), method.to_string()), error.to_string());
    }

    pub fn set_managed_objects(&self, reply: Vec<Value>) {
        *self.managed.borrow_mut() = Some(Ok(reply));
    }

    pub fn fail_managed_objects(&self, error: &str) {
        *self.managed.borrow_mut() = Some(Err(error.to_string()));
    }

    pub fn push_inbound(&self, envelope: Envelope) {
        self.inbound.borrow_mut().push_back(envelope);
    }

    pub fn push_watch_added(&self, watch: Watch) {
        self.watch_changes
            .borrow_mut()
            .push_back(WatchChange::Added(watch));
    }

    pub fn push_watch_removed(&self, fd: RawFd) {
        self.watch_changes
            .borrow_mut()
            .push_back(WatchChange::Removed(fd));
    }

    pub fn handled(&self) -> Vec<(RawFd, WatchEvent)> {
        self.handled.borrow().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| c.method.clone()).collect()
    }

    pub fn calls_to(&self, method: &str) -> usize {
        self.calls.borrow().iter().filter(|c| c.method == method).count()
    }

    pub fn last_call(&self, method: &str) -> Option<MethodCall> {
        self.calls
            .borrow()
            .iter()
            .rev()
            .find(|c| c.method == method)
            .cloned()
    }

    pub fn sent_methods(&self) -> Vec<String> {
        self.sent.borrow().iter().map(|c| c.method.clone()).collect()
    }

    pub fn waits(&self) -> usize {
        self.waits.get()
    }

    fn failure(&self, call: &MethodCall) -> Option<BusError> {
        self.failures
            .borrow()
            .get(&(call.path.clone(), call.method.clone()))
            .map(|name| BusError::new(name.as_str(), "scripted failure"))
    }

    fn get_property(&self, call: &MethodCall) -> Result<Vec<Value>, BusError> {
        let name = call.args.get(1).and_then(Value::as_str).unwrap_or_default();
        self.properties
            .borrow()
            .get(&(call.path.clone(), name.to_string()))
            .map(|v| vec![Value::variant(v.clone())])
            .ok_or_else(|| BusError::invalid_args(format!("No such property '{}'", name)))
    }
}

impl Transport for FakeBus {
    fn call(&self, call: &MethodCall) -> Result<Vec<Value>, BusError> {
        self.calls.borrow_mut().push(call.clone());

        if let Some(err) = self.failure(call) {
            return Err(err);
        }

        match (call.interface.as_str(), call.method.as_str()) {
            (PROPERTIES_INTERFACE, "Get") => self.get_property(call),
            (_, "GetManagedObjects") => match self.managed.borrow().clone() {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(name)) => Err(BusError::new(name, "scripted failure")),
                None => Ok(managed_objects(&[])),
            },
            _ => Ok(Vec::new()),
        }
    }

    fn send(&self, call: &MethodCall) -> Result<(), BusError> {
        self.sent.borrow_mut().push(call.clone());
        match self.failure(call) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn sync_watches(&self, hooks: &mut dyn WatchHooks) {
        while let Some(change) = self.watch_changes.borrow_mut().pop_front() {
            match change {
                WatchChange::Added(watch) => hooks.watch_added(watch),
                WatchChange::Removed(fd) => hooks.watch_removed(fd),
            }
        }
    }

    fn handle_watch(&self, fd: RawFd, event: WatchEvent) {
        self.handled.borrow_mut().push((fd, event));
    }

    fn dispatch_one(&self) -> Option<Envelope> {
        self.inbound.borrow_mut().pop_front()
    }

    fn wait_for_io(&self) {
        self.waits.set(self.waits.get() + 1);
    }
}

/// A `GetManagedObjects` reply listing `paths`, each exposing Device1.
pub fn managed_objects(paths: &[&str]) -> Vec<Value> {
    let objects = paths
        .iter()
        .map(|path| {
            let interfaces = Value::Array(vec![Value::entry(
                Value::str(DEVICE_INTERFACE),
                Value::Array(Vec::new()),
            )]);
            Value::entry(Value::object_path(*path), interfaces)
        })
        .collect();
    vec![Value::Array(objects)]
}

#[test]
fn test_unscripted_property_is_an_error() {
    let bus = FakeBus::new();
    let call = MethodCall::new("org.bluez", "/x", PROPERTIES_INTERFACE, "Get")
        .arg(DEVICE_INTERFACE)
        .arg("Alias");
    let err = bus.call(&call).unwrap_err();
    assert!(err.is(ERROR_INVALID_ARGS));
}
