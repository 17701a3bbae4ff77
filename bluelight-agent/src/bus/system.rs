/*!
 * System Bus Transport
 * libdbus channel with watch tracking handed to the host poll loop
 */

use std::cell::Cell;
use std::os::unix::io::RawFd;
use std::time::Duration;

use dbus::arg::{ArgType, IterAppend};
use dbus::channel::{BusType, Channel};
use dbus::message::MessageType;
use dbus::strings::{BusName, Interface, Member, Path, Signature};
use dbus::Message;
use tracing::{debug, info, trace, warn};

use super::{BusError, Envelope, MessageKind, MethodCall, Transport, Value};
use crate::watch::{Interest, Watch, WatchEvent, WatchHooks};

/// Private connection to the system bus.
pub struct SystemBus {
    channel: Channel,
    default_timeout: Duration,
    // What the watch set was last told about
    reported: Cell<Option<Watch>>,
}

impl SystemBus {
    pub fn connect(default_timeout: Duration) -> Result<Self, BusError> {
        let mut channel = Channel::get_private(BusType::System)?;
        channel.set_watch_enabled(true);

        info!(
            "Connected to system bus as {}",
            channel.unique_name().unwrap_or("<unnamed>")
        );

        Ok(Self {
            channel,
            default_timeout,
            reported: Cell::new(None),
        })
    }

    fn current_watch(&self) -> Option<Watch> {
        if !self.channel.is_connected() {
            return None;
        }
        let w = self.channel.watch();
        Some(Watch {
            fd: w.fd,
            interest: Interest {
                readable: w.read,
                writable: w.write,
            },
            enabled: w.read || w.write,
        })
    }
}

impl Transport for SystemBus {
    fn call(&self, call: &MethodCall) -> Result<Vec<Value>, BusError> {
        let timeout = call.timeout.unwrap_or(self.default_timeout);
        debug!("-> {} {}.{}", call.path, call.interface, call.method);

        let reply = self
            .channel
            .send_with_reply_and_block(build_message(call)?, timeout)?;
        Ok(decode_args(&reply))
    }

    fn send(&self, call: &MethodCall) -> Result<(), BusError> {
        let mut msg = build_message(call)?;
        msg.set_no_reply(true);
        self.channel
            .send(msg)
            .map_err(|()| BusError::new(super::ERROR_FAILED, "send failed: connection closed"))?;
        self.channel.flush();
        Ok(())
    }

    fn sync_watches(&self, hooks: &mut dyn WatchHooks) {
        let current = self.current_watch();
        diff_watch(self.reported.get(), current, hooks);
        self.reported.set(current);
    }

    fn handle_watch(&self, fd: RawFd, event: WatchEvent) {
        trace!("handling {:?} on fd {}", event, fd);
        if self.channel.read_write(Some(Duration::ZERO)).is_err() {
            warn!("System bus connection lost");
        }
    }

    fn dispatch_one(&self) -> Option<Envelope> {
        self.channel.pop_message().map(|msg| envelope(&msg))
    }

    fn wait_for_io(&self) {
        if self.channel.read_write(None).is_err() {
            warn!("System bus connection lost");
        }
    }
}

impl Drop for SystemBus {
    fn drop(&mut self) {
        if let Some(watch) = self.reported.take() {
            debug!("releasing watch fd {}", watch.fd);
        }
    }
}

/// Report the change between the last reported watch and the current one.
/// A watch that vanishes with its connection is destroyed, not removed.
fn diff_watch(previous: Option<Watch>, current: Option<Watch>, hooks: &mut dyn WatchHooks) {
    match (previous, current) {
        (None, Some(now)) => hooks.watch_added(now),
        (Some(was), None) => hooks.watch_destroyed(was.fd),
        (Some(was), Some(now)) if was.fd != now.fd => {
            hooks.watch_removed(was.fd);
            hooks.watch_added(now);
        }
        (Some(was), Some(now)) if was != now => hooks.watch_toggled(now),
        _ => {}
    }
}

fn build_message(call: &MethodCall) -> Result<Message, BusError> {
    let service = BusName::new(call.service.as_str()).map_err(BusError::invalid_args)?;
    let path = Path::new(call.path.as_str()).map_err(BusError::invalid_args)?;
    let interface = Interface::new(call.interface.as_str()).map_err(BusError::invalid_args)?;
    let method = Member::new(call.method.as_str()).map_err(BusError::invalid_args)?;

    let mut msg = Message::new_method_call(service, path, interface, method)
        .map_err(BusError::invalid_args)?;
    {
        let mut args = IterAppend::new(&mut msg);
        for arg in &call.args {
            append_value(&mut args, arg)?;
        }
    }
    Ok(msg)
}

fn append_value(args: &mut IterAppend<'_>, value: &Value) -> Result<(), BusError> {
    match value {
        Value::Bool(b) => args.append(*b),
        Value::Byte(n) => args.append(*n),
        Value::Int16(n) => args.append(*n),
        Value::UInt16(n) => args.append(*n),
        Value::Int32(n) => args.append(*n),
        Value::UInt32(n) => args.append(*n),
        Value::Int64(n) => args.append(*n),
        Value::UInt64(n) => args.append(*n),
        Value::Double(n) => args.append(*n),
        Value::Str(s) => args.append(s.as_str()),
        Value::ObjectPath(s) => {
            args.append(Path::new(s.as_str()).map_err(BusError::invalid_args)?)
        }
        Value::Signature(s) => {
            args.append(Signature::new(s.as_str()).map_err(BusError::invalid_args)?)
        }
        other => {
            return Err(BusError::invalid_args(format!(
                "cannot send {} arguments",
                other.kind()
            )))
        }
    }
    Ok(())
}

fn envelope(msg: &Message) -> Envelope {
    let kind = match msg.msg_type() {
        MessageType::MethodCall => MessageKind::MethodCall,
        MessageType::MethodReturn => MessageKind::MethodReturn,
        MessageType::Error => MessageKind::Error,
        MessageType::Signal => MessageKind::Signal,
    };

    Envelope {
        kind,
        sender: msg.sender().map(|s| s.to_string()),
        path: msg.path().map(|p| p.to_string()),
        interface: msg.interface().map(|i| i.to_string()),
        member: msg.member().map(|m| m.to_string()),
        args: decode_args(msg),
    }
}

fn decode_args(msg: &Message) -> Vec<Value> {
    decode_all(msg.iter_init())
}

fn decode_all(mut iter: dbus::arg::Iter<'_>) -> Vec<Value> {
    let mut values = Vec::new();
    while iter.arg_type() != ArgType::Invalid {
        values.push(decode_one(&mut iter));
        if !iter.next() {
            break;
        }
    }
    values
}

fn decode_one(iter: &mut dbus::arg::Iter<'_>) -> Value {
    let decoded = match iter.arg_type() {
        ArgType::Boolean => iter.get::<bool>().map(Value::Bool),
        ArgType::Byte => iter.get::<u8>().map(Value::Byte),
        ArgType::Int16 => iter.get::<i16>().map(Value::Int16),
        ArgType::UInt16 => iter.get::<u16>().map(Value::UInt16),
        ArgType::Int32 => iter.get::<i32>().map(Value::Int32),
        ArgType::UInt32 => iter.get::<u32>().map(Value::UInt32),
        ArgType::Int64 => iter.get::<i64>().map(Value::Int64),
        ArgType::UInt64 => iter.get::<u64>().map(Value::UInt64),
        ArgType::Double => iter.get::<f64>().map(Value::Double),
        ArgType::String => iter.get::<&str>().map(Value::str),
        ArgType::ObjectPath => iter.get::<Path>().map(|p| Value::ObjectPath(p.to_string())),
        ArgType::Signature => iter
            .get::<Signature>()
            .map(|s| Value::Signature(s.to_string())),
        ArgType::Array => iter
            .recurse(ArgType::Array)
            .map(|sub| Value::Array(decode_all(sub))),
        ArgType::Struct => iter
            .recurse(ArgType::Struct)
            .map(|sub| Value::Struct(decode_all(sub))),
        ArgType::DictEntry => iter.recurse(ArgType::DictEntry).and_then(|sub| {
            let mut parts = decode_all(sub).into_iter();
            Some(Value::entry(parts.next()?, parts.next()?))
        }),
        ArgType::Variant => iter
            .recurse(ArgType::Variant)
            .and_then(|sub| decode_all(sub).into_iter().next())
            .map(Value::variant),
        ArgType::UnixFd | ArgType::Invalid => None,
    };
    decoded.unwrap_or(Value::Opaque)
}
