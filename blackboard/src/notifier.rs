//! Listener and observer registries and synchronous dispatch
//!
//! One registry exists per region and process: every `BlackBoard` handle
//! attached to the same named region (or to the same anonymous arena)
//! shares it, so an event raised through one handle reaches targets
//! registered through another.
//!
//! Dispatch snapshots the matching targets under the registry lock and
//! invokes them after releasing it, so callbacks may register or
//! unregister targets without deadlocking.

use crate::events::{InterfaceListener, InterfaceObserver, ListenerFlags, ObserverFlags};
use crate::glob::glob_match;
use crate::message::Message;
use crate::uid::InterfaceUid;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, LazyLock, Weak};
use tracing::{debug, error};

struct ListenerEntry {
    target: Arc<dyn InterfaceListener>,
    uid: InterfaceUid,
    flags: ListenerFlags,
}

struct ObserverEntry {
    target: Arc<dyn InterfaceObserver>,
    type_pattern: String,
    id_pattern: String,
    flags: ObserverFlags,
}

fn same_target<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

fn panic_text(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic>"
    }
}

/// Run one callback, logging and swallowing a panic
fn contain<R>(
    event: &'static str,
    subject: &dyn std::fmt::Display,
    fallback: R,
    f: impl FnOnce() -> R,
) -> R {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            error!(
                event,
                interface = %subject,
                panic = panic_text(payload.as_ref()),
                "Event callback panicked, continuing with remaining targets"
            );
            fallback
        }
    }
}

/// Registry identity within the process
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NotifierKey {
    /// Named region; survives the region being recreated
    Named(String),
    /// Process-local arena, by epoch
    Anonymous(u64),
}

static NOTIFIERS: LazyLock<Mutex<HashMap<NotifierKey, Weak<Notifier>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Registry of `key`, created when no live handle holds it
pub fn attach_notifier(key: NotifierKey) -> Arc<Notifier> {
    let mut notifiers = NOTIFIERS.lock();
    notifiers.retain(|_, notifier| notifier.strong_count() > 0);
    if let Some(notifier) = notifiers.get(&key).and_then(Weak::upgrade) {
        return notifier;
    }
    let notifier = Arc::new(Notifier::new());
    notifiers.insert(key, Arc::downgrade(&notifier));
    notifier
}

/// Listener and observer tables of one region
#[derive(Default)]
pub struct Notifier {
    listeners: RwLock<Vec<ListenerEntry>>,
    observers: RwLock<Vec<ObserverEntry>>,
}

impl Notifier {
    /// Empty tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch one interface; registering the same target for the same
    /// interface again adds the new flags
    pub fn register_listener(
        &self,
        target: Arc<dyn InterfaceListener>,
        uid: InterfaceUid,
        flags: ListenerFlags,
    ) {
        let mut listeners = self.listeners.write();
        if let Some(entry) = listeners
            .iter_mut()
            .find(|e| e.uid == uid && same_target(&e.target, &target))
        {
            entry.flags |= flags;
            return;
        }
        debug!(interface = %uid, ?flags, "Listener registered");
        listeners.push(ListenerEntry { target, uid, flags });
    }

    /// Remove a listener from every interface; returns the number of
    /// registrations dropped
    pub fn unregister_listener(&self, target: &Arc<dyn InterfaceListener>) -> usize {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|e| !same_target(&e.target, target));
        before - listeners.len()
    }

    /// Watch interfaces whose type and id match the glob patterns; an
    /// observer may be registered for several pattern pairs
    pub fn register_observer(
        &self,
        target: Arc<dyn InterfaceObserver>,
        type_pattern: &str,
        id_pattern: &str,
        flags: ObserverFlags,
    ) {
        debug!(type_pattern, id_pattern, ?flags, "Observer registered");
        self.observers.write().push(ObserverEntry {
            target,
            type_pattern: type_pattern.to_string(),
            id_pattern: id_pattern.to_string(),
            flags,
        });
    }

    /// Remove an observer from every pattern pair
    pub fn unregister_observer(&self, target: &Arc<dyn InterfaceObserver>) -> usize {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|e| !same_target(&e.target, target));
        before - observers.len()
    }

    /// Registered listener entries
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Registered observer entries
    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    fn listeners_for(&self, uid: &InterfaceUid, flag: ListenerFlags) -> Vec<Arc<dyn InterfaceListener>> {
        self.listeners
            .read()
            .iter()
            .filter(|e| e.flags.contains(flag) && e.uid == *uid)
            .map(|e| Arc::clone(&e.target))
            .collect()
    }

    fn observers_for(&self, type_name: &str, id: &str, flag: ObserverFlags) -> Vec<Arc<dyn InterfaceObserver>> {
        let observers = self.observers.read();
        let mut targets: Vec<Arc<dyn InterfaceObserver>> = Vec::new();
        for entry in observers.iter().filter(|e| e.flags.contains(flag)) {
            if glob_match(&entry.type_pattern, type_name)
                && glob_match(&entry.id_pattern, id)
                && !targets.iter().any(|t| same_target(t, &entry.target))
            {
                targets.push(Arc::clone(&entry.target));
            }
        }
        targets
    }

    /// Writer published data
    pub fn data_changed(&self, uid: &InterfaceUid) {
        for target in self.listeners_for(uid, ListenerFlags::DATA) {
            contain("data_changed", uid, (), || target.data_changed(uid));
        }
    }

    /// Message about to be queued; false if any listener vetoed it.
    ///
    /// Every listener sees the message even after a veto.
    pub fn message_received(&self, uid: &InterfaceUid, message: &Message) -> bool {
        let mut accepted = true;
        for target in self.listeners_for(uid, ListenerFlags::MESSAGES) {
            accepted &= contain("message_received", uid, true, || {
                target.message_received(uid, message)
            });
        }
        accepted
    }

    /// Reader opened
    pub fn reader_added(&self, uid: &InterfaceUid, serial: u32) {
        for target in self.listeners_for(uid, ListenerFlags::READER) {
            contain("reader_added", uid, (), || target.reader_added(uid, serial));
        }
    }

    /// Reader closed
    pub fn reader_removed(&self, uid: &InterfaceUid, serial: u32) {
        for target in self.listeners_for(uid, ListenerFlags::READER) {
            contain("reader_removed", uid, (), || target.reader_removed(uid, serial));
        }
    }

    /// Writer opened
    pub fn writer_added(&self, uid: &InterfaceUid, serial: u32) {
        for target in self.listeners_for(uid, ListenerFlags::WRITER) {
            contain("writer_added", uid, (), || target.writer_added(uid, serial));
        }
    }

    /// Writer closed
    pub fn writer_removed(&self, uid: &InterfaceUid, serial: u32) {
        for target in self.listeners_for(uid, ListenerFlags::WRITER) {
            contain("writer_removed", uid, (), || target.writer_removed(uid, serial));
        }
    }

    /// Interface block allocated
    pub fn interface_created(&self, uid: &InterfaceUid) {
        for target in self.observers_for(uid.type_name(), uid.id(), ObserverFlags::CREATED) {
            contain("interface_created", uid, (), || {
                target.interface_created(uid.type_name(), uid.id())
            });
        }
    }

    /// Interface block reclaimed
    pub fn interface_destroyed(&self, uid: &InterfaceUid) {
        for target in self.observers_for(uid.type_name(), uid.id(), ObserverFlags::DESTROYED) {
            contain("interface_destroyed", uid, (), || {
                target.interface_destroyed(uid.type_name(), uid.id())
            });
        }
    }
}
