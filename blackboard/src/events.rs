//! Listener and observer callback contracts
//!
//! Callbacks run synchronously on the thread performing the triggering
//! operation. They must return quickly; a panicking callback is contained
//! and logged and does not stop delivery to the others.

use crate::message::Message;
use crate::uid::InterfaceUid;
use bitflags::bitflags;

bitflags! {
    /// Events a listener subscribes to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ListenerFlags: u32 {
        /// Data written
        const DATA = 1;
        /// Message enqueued
        const MESSAGES = 2;
        /// Reader opened or closed
        const READER = 4;
        /// Writer opened or closed
        const WRITER = 8;
        /// Everything
        const ALL = Self::DATA.bits() | Self::MESSAGES.bits() | Self::READER.bits() | Self::WRITER.bits();
    }
}

bitflags! {
    /// Events an observer subscribes to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ObserverFlags: u32 {
        /// Interface block allocated
        const CREATED = 1;
        /// Interface block reclaimed
        const DESTROYED = 2;
        /// Both
        const ALL = Self::CREATED.bits() | Self::DESTROYED.bits();
    }
}

/// Per-interface event target
#[allow(unused_variables)]
pub trait InterfaceListener: Send + Sync {
    /// A writer published new data
    fn data_changed(&self, uid: &InterfaceUid) {}

    /// A message is about to be queued; returning `false` drops it
    fn message_received(&self, uid: &InterfaceUid, message: &Message) -> bool {
        true
    }

    /// A reading accessor was opened
    fn reader_added(&self, uid: &InterfaceUid, serial: u32) {}

    /// A reading accessor was closed
    fn reader_removed(&self, uid: &InterfaceUid, serial: u32) {}

    /// The writing accessor was opened
    fn writer_added(&self, uid: &InterfaceUid, serial: u32) {}

    /// The writing accessor was closed
    fn writer_removed(&self, uid: &InterfaceUid, serial: u32) {}
}

/// Type/id pattern event target
#[allow(unused_variables)]
pub trait InterfaceObserver: Send + Sync {
    /// An interface block was allocated
    fn interface_created(&self, type_name: &str, id: &str) {}

    /// An interface block was reclaimed
    fn interface_destroyed(&self, type_name: &str, id: &str) {}
}
