//! Interface accessors: the typed, directional view onto one block
//!
//! An accessor owns a local copy of the payload. `read()` copies the shared
//! block into it under the block's sequence counter; `write()` (writers
//! only) publishes it. Messages travel through the process-local queue of
//! the block and are drained by the writer.

use crate::blackboard::Shared;
use crate::directory::{self, BlockHandle};
use crate::error::{BbError, BbResult};
use crate::field::FieldAccess;
use crate::message::Message;
use crate::msgq::{MessageQueue, QueueKey, attach_queue, detach_queue};
use crate::platform::{current_thread_name, get_current_pid, now_nanos};
use crate::region::{BLOCK_HEADER_SIZE, BlockHeader, Region, SLOT_LIVE};
use crate::schema::{
    FieldInfo, InterfaceData, MessageData, Schema, bytes_of, bytes_of_mut, zeroed,
};
use crate::uid::InterfaceUid;
use crate::version::SeqCounter;
use serde::Serialize;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, error, trace, warn};

/// Direction of an accessor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// May read and enqueue messages
    Reader,
    /// May additionally write and drain the queue
    Writer,
}

/// State shared by typed and dynamic accessors
pub struct AccessorCore {
    shared: Arc<Shared>,
    region: Arc<Region>,
    uid: InterfaceUid,
    schema: &'static Schema,
    handle: BlockHandle,
    mode: AccessMode,
    serial: u32,
    block_offset: u64,
    queue: Arc<MessageQueue>,
    queue_key: QueueKey,
    revision: u64,
    timestamp_ns: u64,
    closed: bool,
}

fn backoff(attempt: u32) {
    if attempt % 64 == 63 {
        std::thread::yield_now();
    } else {
        std::hint::spin_loop();
    }
}

impl AccessorCore {
    /// Find the block for `(schema.type_name, id)`, creating it when
    /// `allow_create` is set, and register an accessor of `mode` on it
    pub(crate) fn open(
        shared: &Arc<Shared>,
        schema: &'static Schema,
        id: &str,
        mode: AccessMode,
        allow_create: bool,
    ) -> BbResult<Self> {
        let uid = InterfaceUid::new(schema.type_name, id)?;
        let region = shared.current_region()?;
        let serial = region.next_serial();

        let (handle, block_offset, created) = {
            let mut guard = region.lock()?;
            let (slot, created) = match directory::find(&guard, &uid) {
                Some(slot) => {
                    check_compatible(&region, slot, &uid, schema)?;
                    (slot, false)
                }
                None if allow_create => (directory::create(&mut guard, &uid, schema)?, true),
                None => {
                    return Err(BbError::NotFound {
                        uid: uid.to_string(),
                    });
                }
            };

            let entry = region.entry(slot);
            match mode {
                AccessMode::Writer => {
                    if entry.has_writer.load(Ordering::Acquire) != 0 {
                        return Err(BbError::WriterAlreadyActive {
                            uid: uid.to_string(),
                        });
                    }
                    entry.writer_pid.store(get_current_pid(), Ordering::Relaxed);
                    entry.writer_serial.store(serial, Ordering::Relaxed);
                    entry.has_writer.store(1, Ordering::Release);
                }
                AccessMode::Reader => {
                    entry.reader_count.fetch_add(1, Ordering::AcqRel);
                }
            }

            let handle = BlockHandle {
                slot,
                generation: entry.generation.load(Ordering::Acquire),
            };
            (handle, entry.block_offset.load(Ordering::Relaxed), created)
        };

        let header = region.header();
        let queue_key = QueueKey {
            epoch: header.epoch,
            master_pid: header.master_pid,
            slot: handle.slot,
            generation: handle.generation,
        };
        let core = Self {
            shared: Arc::clone(shared),
            queue: attach_queue(queue_key),
            region,
            uid,
            schema,
            handle,
            mode,
            serial,
            block_offset,
            queue_key,
            revision: 0,
            timestamp_ns: 0,
            closed: false,
        };

        if mode == AccessMode::Writer {
            core.queue.open_writer(serial);
        }
        debug!(interface = %core.uid, serial, ?mode, created, "Interface opened");
        let notifier = &core.shared.notifier;
        if created {
            notifier.interface_created(&core.uid);
        }
        match mode {
            AccessMode::Writer => notifier.writer_added(&core.uid, serial),
            AccessMode::Reader => notifier.reader_added(&core.uid, serial),
        }
        Ok(core)
    }

    /// Identity of the interface
    pub fn uid(&self) -> &InterfaceUid {
        &self.uid
    }

    /// Interface type name
    pub fn type_name(&self) -> &str {
        self.uid.type_name()
    }

    /// Instance identifier
    pub fn id(&self) -> &str {
        self.uid.id()
    }

    /// Serial of this accessor, unique within the region
    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// Reader or writer
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// True for the writing accessor
    pub fn is_writer(&self) -> bool {
        self.mode == AccessMode::Writer
    }

    /// Generation-checked directory handle
    pub fn handle(&self) -> BlockHandle {
        self.handle
    }

    /// Interface schema
    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    /// Field table of the payload
    pub fn fieldinfo(&self) -> &'static [FieldInfo] {
        self.schema.fields
    }

    /// Schema hash
    pub fn hash(&self) -> u64 {
        self.schema.hash()
    }

    /// Revision of the local copy
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Write time of the local copy, ns since the epoch; 0 if never written
    pub fn timestamp(&self) -> u64 {
        self.timestamp_ns
    }

    /// True if the block has been written since the local copy was taken
    pub fn changed(&self) -> bool {
        match self.block() {
            Ok(block) => block.revision.load(Ordering::Acquire) != self.revision,
            Err(_) => false,
        }
    }

    /// True while a writing accessor is open on the block
    pub fn has_writer(&self) -> bool {
        self.check_usable()
            .map(|_| self.region.entry(self.handle.slot).has_writer.load(Ordering::Acquire) != 0)
            .unwrap_or(false)
    }

    /// Open reading accessors on the block, all processes
    pub fn num_readers(&self) -> u32 {
        self.check_usable()
            .map(|_| {
                self.region
                    .entry(self.handle.slot)
                    .reader_count
                    .load(Ordering::Acquire)
            })
            .unwrap_or(0)
    }

    /// True while the handle still refers to a live block of a live region
    pub fn is_valid(&self) -> bool {
        self.check_usable().is_ok()
    }

    fn check_usable(&self) -> BbResult<()> {
        if !self.region.is_published() {
            return Err(BbError::AlivenessLost {
                reason: format!("region {} no longer published", self.region.display_name()),
            });
        }
        let entry = self.region.entry(self.handle.slot);
        if entry.generation.load(Ordering::Acquire) != self.handle.generation
            || entry.state.load(Ordering::Acquire) != SLOT_LIVE
        {
            return Err(BbError::StaleHandle {
                uid: self.uid.to_string(),
                slot: self.handle.slot,
                generation: self.handle.generation,
            });
        }
        Ok(())
    }

    fn block(&self) -> BbResult<&BlockHeader> {
        self.check_usable()?;
        // SAFETY: bounds validated when the accessor was opened
        Ok(unsafe { self.region.block_header(self.block_offset) })
    }

    fn denied(&self, operation: &'static str) -> BbError {
        BbError::PermissionDenied {
            uid: self.uid.to_string(),
            operation,
        }
    }

    /// Copy a consistent snapshot of the block into `out`
    pub(crate) fn read_into(&mut self, out: &mut [u8]) -> BbResult<()> {
        debug_assert_eq!(out.len(), self.schema.data_size);
        let block = self.block()?;
        let seq = SeqCounter::from_atomic(&block.seq);
        // SAFETY: bounds validated when the accessor was opened
        let src = unsafe { self.region.payload_ptr(self.block_offset) };
        let limit = self.shared.config().read_retry_limit;

        for attempt in 0..limit {
            let Some(start) = seq.read_begin() else {
                backoff(attempt);
                continue;
            };
            // SAFETY: `out` has the payload size; a racing write is detected
            // by the sequence check and the copy discarded
            unsafe { std::ptr::copy_nonoverlapping(src, out.as_mut_ptr(), out.len()) };
            let revision = block.revision.load(Ordering::Relaxed);
            let timestamp_ns = block.timestamp_ns.load(Ordering::Relaxed);
            if seq.read_validate(start) {
                self.revision = revision;
                self.timestamp_ns = timestamp_ns;
                trace!(interface = %self.uid, revision, "Interface read");
                return Ok(());
            }
            backoff(attempt);
        }

        warn!(interface = %self.uid, attempts = limit, "Read gave up, writer stalled");
        Err(BbError::VersionConflict {
            uid: self.uid.to_string(),
            attempts: limit,
        })
    }

    /// Publish `src` to the block and notify data listeners
    pub(crate) fn write_from(&mut self, src: &[u8]) -> BbResult<()> {
        if self.mode != AccessMode::Writer {
            return Err(self.denied("write"));
        }
        debug_assert_eq!(src.len(), self.schema.data_size);
        let block = self.block()?;
        let seq = SeqCounter::from_atomic(&block.seq);
        // SAFETY: bounds validated when the accessor was opened
        let dst = unsafe { self.region.payload_ptr(self.block_offset) };

        seq.begin_write();
        // SAFETY: single writer per block; readers retry on the odd sequence
        unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len()) };
        let revision = block.revision.load(Ordering::Relaxed) + 1;
        let timestamp_ns = now_nanos();
        block.revision.store(revision, Ordering::Relaxed);
        block.timestamp_ns.store(timestamp_ns, Ordering::Relaxed);
        seq.end_write();

        self.revision = revision;
        self.timestamp_ns = timestamp_ns;
        trace!(interface = %self.uid, revision, "Interface written");
        self.shared.notifier.data_changed(&self.uid);
        Ok(())
    }

    /// Enqueue a typed message
    pub fn msgq_enqueue<M: MessageData>(&self, payload: &M) -> BbResult<u32> {
        self.msgq_enqueue_message(Message::new(payload))
    }

    /// Enqueue a message; returns its id.
    ///
    /// A message vetoed by a listener is dropped but still gets an id.
    pub fn msgq_enqueue_message(&self, mut message: Message) -> BbResult<u32> {
        if !self.schema.accepts_schema(message.schema()) {
            warn!(
                interface = %self.uid,
                message = message.type_name(),
                "Message type not accepted"
            );
            return Err(BbError::InvalidMessageType {
                interface_type: self.schema.type_name.to_string(),
                message_type: message.type_name().to_string(),
            });
        }
        self.check_usable()?;

        if self.mode == AccessMode::Reader {
            let entry = self.region.entry(self.handle.slot);
            if entry.has_writer.load(Ordering::Acquire) == 0 {
                return Err(BbError::NoWriter {
                    uid: self.uid.to_string(),
                });
            }
            if entry.writer_pid.load(Ordering::Relaxed) != get_current_pid() {
                return Err(BbError::NotSupported {
                    operation: format!("message to {} writer in another process", self.uid),
                });
            }
        }

        message.sender_serial = self.serial;
        message.sender_thread = current_thread_name();
        message.enqueued_at = now_nanos();

        let notifier = &self.shared.notifier;
        let Some((id, queued)) = self
            .queue
            .append_with(message, |m| notifier.message_received(&self.uid, m))
        else {
            // Writer closed between the check above and the append
            return Err(BbError::NoWriter {
                uid: self.uid.to_string(),
            });
        };
        if queued {
            trace!(interface = %self.uid, id, "Message enqueued");
        } else {
            debug!(interface = %self.uid, id, "Message vetoed by listener");
        }
        Ok(id)
    }

    /// Oldest queued message (writer only)
    pub fn msgq_first(&self) -> BbResult<Option<Arc<Message>>> {
        if self.mode != AccessMode::Writer {
            return Err(self.denied("msgq_first"));
        }
        Ok(self.queue.first())
    }

    /// Remove and return the oldest message (writer only)
    pub fn msgq_pop(&self) -> BbResult<Option<Arc<Message>>> {
        if self.mode != AccessMode::Writer {
            return Err(self.denied("msgq_pop"));
        }
        Ok(self.queue.pop())
    }

    /// Remove the message with `id` (writer only); true if it was queued
    pub fn msgq_remove(&self, id: u32) -> BbResult<bool> {
        if self.mode != AccessMode::Writer {
            return Err(self.denied("msgq_remove"));
        }
        Ok(self.queue.remove(id))
    }

    /// Drop every queued message (writer only)
    pub fn msgq_flush(&self) -> BbResult<usize> {
        if self.mode != AccessMode::Writer {
            return Err(self.denied("msgq_flush"));
        }
        Ok(self.queue.flush())
    }

    /// Queued messages
    pub fn msgq_len(&self) -> usize {
        self.queue.len()
    }

    /// True if nothing is queued
    pub fn msgq_is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Unregister from the block, reclaiming it if this was the last
    /// accessor. Idempotent.
    pub(crate) fn release(&mut self) -> BbResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if self.mode == AccessMode::Writer {
            let dropped = self.queue.close_writer();
            if dropped > 0 {
                debug!(interface = %self.uid, dropped, "Writer closed, pending messages dropped");
            }
        }
        detach_queue(&self.queue_key);

        if !self.region.is_published() {
            return Err(BbError::AlivenessLost {
                reason: format!("region {} gone before close", self.region.display_name()),
            });
        }

        let destroyed = {
            let mut guard = self.region.lock()?;
            self.check_usable()?;
            let entry = self.region.entry(self.handle.slot);
            match self.mode {
                AccessMode::Writer => {
                    entry.writer_pid.store(0, Ordering::Relaxed);
                    entry.writer_serial.store(0, Ordering::Relaxed);
                    entry.has_writer.store(0, Ordering::Release);
                }
                AccessMode::Reader => {
                    let _ = entry.reader_count.fetch_update(
                        Ordering::AcqRel,
                        Ordering::Acquire,
                        |n| Some(n.saturating_sub(1)),
                    );
                }
            }
            let unused = entry.reader_count.load(Ordering::Acquire) == 0
                && entry.has_writer.load(Ordering::Acquire) == 0;
            if unused {
                directory::release(&mut guard, self.handle.slot)?;
            }
            unused
        };

        debug!(interface = %self.uid, serial = self.serial, destroyed, "Interface closed");
        let notifier = &self.shared.notifier;
        match self.mode {
            AccessMode::Writer => notifier.writer_removed(&self.uid, self.serial),
            AccessMode::Reader => notifier.reader_removed(&self.uid, self.serial),
        }
        if destroyed {
            notifier.interface_destroyed(&self.uid);
        }
        Ok(())
    }
}

impl Drop for AccessorCore {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.release() {
            debug!(interface = %self.uid, error = %e, "Release on drop failed");
        }
    }
}

fn check_compatible(
    region: &Region,
    slot: u32,
    uid: &InterfaceUid,
    schema: &Schema,
) -> BbResult<()> {
    let entry = region.entry(slot);
    let hash = entry.hash.load(Ordering::Relaxed);
    let data_size = entry.data_size.load(Ordering::Relaxed);
    if hash != schema.hash() || data_size != schema.data_size as u64 {
        error!(
            interface = %uid,
            shared_hash = %format!("{hash:016x}"),
            local_hash = %schema.hash_hex(),
            shared_size = data_size,
            local_size = schema.data_size,
            "Interface type mismatch, consumer built against a different schema"
        );
        return Err(BbError::TypeMismatch {
            uid: uid.to_string(),
            reason: format!(
                "shared hash {hash:016x} size {data_size}, local hash {} size {}",
                schema.hash_hex(),
                schema.data_size
            ),
        });
    }

    let offset = entry.block_offset.load(Ordering::Relaxed);
    let block_size = entry.block_size.load(Ordering::Relaxed);
    if !region.block_in_bounds(offset, block_size)
        || data_size + BLOCK_HEADER_SIZE as u64 > block_size
    {
        return Err(BbError::InvalidRegion {
            name: region.display_name().to_string(),
            reason: format!("block of {uid} outside the heap"),
        });
    }
    Ok(())
}

/// Typed accessor
pub struct Interface<T: InterfaceData> {
    core: AccessorCore,
    data: T,
}

impl<T: InterfaceData> Interface<T> {
    pub(crate) fn new(core: AccessorCore) -> BbResult<Self> {
        let mut interface = Self {
            core,
            data: zeroed(),
        };
        interface.read()?;
        Ok(interface)
    }

    /// Local copy of the payload
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Local copy of the payload, mutable; published by `write()`
    pub fn data_mut(&mut self) -> &mut T {
        &mut self.data
    }

    /// Refresh the local copy from the block
    pub fn read(&mut self) -> BbResult<()> {
        self.core.read_into(bytes_of_mut(&mut self.data))
    }

    /// Publish the local copy (writer only)
    pub fn write(&mut self) -> BbResult<()> {
        self.core.write_from(bytes_of(&self.data))
    }

    /// Unregister from the block
    pub fn close(self) -> BbResult<()> {
        let Self { mut core, .. } = self;
        core.release()
    }
}

impl<T: InterfaceData> Deref for Interface<T> {
    type Target = AccessorCore;

    fn deref(&self) -> &AccessorCore {
        &self.core
    }
}

impl<T: InterfaceData> FieldAccess for Interface<T> {
    fn schema_name(&self) -> &'static str {
        T::TYPE_NAME
    }

    fn schema_fields(&self) -> &'static [FieldInfo] {
        T::schema().fields
    }

    fn payload(&self) -> &[u8] {
        bytes_of(&self.data)
    }

    fn payload_mut(&mut self) -> &mut [u8] {
        bytes_of_mut(&mut self.data)
    }
}

/// Accessor for an interface type known only by name at run time
pub struct DynInterface {
    core: AccessorCore,
    data: Vec<u8>,
}

impl DynInterface {
    pub(crate) fn new(core: AccessorCore) -> BbResult<Self> {
        let mut interface = Self {
            data: vec![0; core.schema.data_size],
            core,
        };
        interface.read()?;
        Ok(interface)
    }

    /// Refresh the local copy from the block
    pub fn read(&mut self) -> BbResult<()> {
        self.core.read_into(&mut self.data)
    }

    /// Publish the local copy (writer only)
    pub fn write(&mut self) -> BbResult<()> {
        self.core.write_from(&self.data)
    }

    /// Unregister from the block
    pub fn close(self) -> BbResult<()> {
        let Self { mut core, .. } = self;
        core.release()
    }
}

impl Deref for DynInterface {
    type Target = AccessorCore;

    fn deref(&self) -> &AccessorCore {
        &self.core
    }
}

impl FieldAccess for DynInterface {
    fn schema_name(&self) -> &'static str {
        self.core.schema.type_name
    }

    fn schema_fields(&self) -> &'static [FieldInfo] {
        self.core.schema.fields
    }

    fn payload(&self) -> &[u8] {
        &self.data
    }

    fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}
