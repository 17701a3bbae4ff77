/*!
 * Watch Multiplexer
 * Host-owned poll tick over the fds the bus transport asks us to watch
 */

use std::collections::BTreeMap;
use std::os::unix::io::{BorrowedFd, RawFd};

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::{debug, trace};

use crate::bus::{Envelope, Transport};

/// Read/write interest of a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interest {
    pub readable: bool,
    pub writable: bool,
}

impl Interest {
    pub const READ: Interest = Interest {
        readable: true,
        writable: false,
    };

    pub const READ_WRITE: Interest = Interest {
        readable: true,
        writable: true,
    };

    fn poll_flags(self) -> PollFlags {
        let mut flags = PollFlags::empty();
        if self.readable {
            flags |= PollFlags::POLLIN;
        }
        if self.writable {
            flags |= PollFlags::POLLOUT;
        }
        flags
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watch {
    pub fd: RawFd,
    pub interest: Interest,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    Readable,
    Writable,
}

/// Lifecycle callbacks the transport drives whenever its fd set changes.
pub trait WatchHooks {
    fn watch_added(&mut self, watch: Watch);
    fn watch_toggled(&mut self, watch: Watch);
    /// The transport swapped or dropped the watch while still connected.
    fn watch_removed(&mut self, fd: RawFd);
    /// The watch went away together with its connection.
    fn watch_destroyed(&mut self, fd: RawFd);
}

/// The set of watches currently registered by the transport.
#[derive(Debug, Default)]
pub struct WatchSet {
    watches: BTreeMap<RawFd, Watch>,
}

impl WatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    pub fn get(&self, fd: RawFd) -> Option<&Watch> {
        self.watches.get(&fd)
    }

    /// One non-blocking tick: pick up registration changes, poll every enabled
    /// watch with a zero timeout, hand readiness to the transport, then drain
    /// everything it has buffered.
    pub fn poll_once(&mut self, bus: &dyn Transport) -> Vec<Envelope> {
        bus.sync_watches(self);

        let mut events = Vec::new();
        for watch in self.watches.values().filter(|w| w.enabled) {
            let Some(ready) = readiness(watch) else {
                continue;
            };
            if watch.interest.readable && ready.intersects(PollFlags::POLLIN | PollFlags::POLLHUP) {
                events.push((watch.fd, WatchEvent::Readable));
            }
            if watch.interest.writable && ready.contains(PollFlags::POLLOUT) {
                events.push((watch.fd, WatchEvent::Writable));
            }
        }

        for (fd, event) in events {
            trace!("watch fd {} {:?}", fd, event);
            bus.handle_watch(fd, event);
        }

        let inbound = drain(bus);
        bus.sync_watches(self);
        inbound
    }
}

/// Pull every buffered message out of the transport.
pub fn drain(bus: &dyn Transport) -> Vec<Envelope> {
    std::iter::from_fn(|| bus.dispatch_one()).collect()
}

/// Zero-timeout poll of a single watch. `None` for invalid fds or poll
/// failures; those are skipped without retry.
fn readiness(watch: &Watch) -> Option<PollFlags> {
    if watch.fd < 0 {
        return None;
    }

    // SAFETY: the fd is owned by the transport, which keeps it open for as
    // long as the watch is registered; it is only borrowed for this call.
    let fd = unsafe { BorrowedFd::borrow_raw(watch.fd) };
    let mut fds = [PollFd::new(fd, watch.interest.poll_flags())];

    match poll(&mut fds, PollTimeout::ZERO) {
        Ok(0) => Some(PollFlags::empty()),
        Ok(_) => {
            let revents = fds[0].revents()?;
            if revents.contains(PollFlags::POLLNVAL) {
                debug!("skipping invalid watch fd {}", watch.fd);
                return None;
            }
            Some(revents)
        }
        Err(e) => {
            debug!("poll on fd {} failed: {}", watch.fd, e);
            None
        }
    }
}

impl WatchHooks for WatchSet {
    fn watch_added(&mut self, watch: Watch) {
        debug!("watch added: fd {} {:?} enabled={}", watch.fd, watch.interest, watch.enabled);
        self.watches.insert(watch.fd, watch);
    }

    fn watch_toggled(&mut self, watch: Watch) {
        debug!("watch toggled: fd {} {:?} enabled={}", watch.fd, watch.interest, watch.enabled);
        self.watches.insert(watch.fd, watch);
    }

    fn watch_removed(&mut self, fd: RawFd) {
        if self.watches.remove(&fd).is_some() {
            debug!("watch removed: fd {}", fd);
        }
    }

    fn watch_destroyed(&mut self, fd: RawFd) {
        if self.watches.remove(&fd).is_some() {
            debug!("watch destroyed: fd {}", fd);
        }
    }
}
