//! The BlackBoard facade: arena attachment, interface registry, events

use crate::arena::ArenaStats;
use crate::config::{ArenaMode, BlackBoardConfig};
use crate::directory::{self, InterfaceInfo};
use crate::error::{BbError, BbResult};
use crate::events::{InterfaceListener, InterfaceObserver, ListenerFlags, ObserverFlags};
use crate::interface::{AccessMode, AccessorCore, DynInterface, Interface};
use crate::notifier::{Notifier, NotifierKey, attach_notifier};
use crate::region::Region;
use crate::schema::{InterfaceData, Schema};
use crate::type_registry::TypeRegistry;
use crate::uid::InterfaceUid;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Attachment state of a BlackBoard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArenaState {
    /// No region mapped yet
    Detached,
    /// Region mapped and published by a live master
    Attached,
    /// Region lost; only `try_restore_aliveness` leaves this state
    Degraded,
}

/// Snapshot of arena usage
#[derive(Debug, Clone, Serialize)]
pub struct BlackBoardStats {
    /// Region name, `<local>` for anonymous arenas
    pub region: String,
    /// Attachment state
    pub state: ArenaState,
    /// Heap usage
    pub arena: ArenaStats,
    /// Live interfaces
    pub interfaces: usize,
    /// Directory slots
    pub max_interfaces: u32,
    /// Listener registrations on this region in this process
    pub listeners: usize,
    /// Observer registrations on this region in this process
    pub observers: usize,
}

pub(crate) struct Shared {
    config: BlackBoardConfig,
    region: RwLock<Arc<Region>>,
    state: Mutex<ArenaState>,
    pub(crate) notifier: Arc<Notifier>,
    types: TypeRegistry,
}

impl Shared {
    pub(crate) fn config(&self) -> &BlackBoardConfig {
        &self.config
    }

    /// The mapped region, provided it is still the one its master published
    pub(crate) fn current_region(&self) -> BbResult<Arc<Region>> {
        let region = Arc::clone(&self.region.read());
        if !region.is_published() {
            self.set_state(ArenaState::Degraded);
            return Err(BbError::AlivenessLost {
                reason: format!("region {} no longer published", region.display_name()),
            });
        }
        Ok(region)
    }

    fn set_state(&self, next: ArenaState) {
        let mut state = self.state.lock();
        if *state != next {
            match next {
                ArenaState::Degraded => {
                    warn!(region = ?self.config.region_name, from = ?*state, "BlackBoard degraded")
                }
                _ => debug!(region = ?self.config.region_name, from = ?*state, to = ?next, "BlackBoard state"),
            }
            *state = next;
        }
    }
}

/// Handle to a BlackBoard arena. Cheap to clone; clones share the region,
/// the event registries and the type registry. Separate handles on the
/// same region in one process share the event registries too.
///
/// # Example
///
/// ```no_run
/// use blackboard::prelude::*;
///
/// let bb = BlackBoard::new(BlackBoardConfig::local(1 << 20))?;
/// let mut writer = bb.open_for_writing::<MotorInterface>("Robotino")?;
/// writer.data_mut().vx = 0.5;
/// writer.write()?;
///
/// let mut reader = bb.open_for_reading::<MotorInterface>("Robotino")?;
/// reader.read()?;
/// assert_eq!(reader.data().vx, 0.5);
/// # Ok::<(), BbError>(())
/// ```
#[derive(Clone)]
pub struct BlackBoard {
    shared: Arc<Shared>,
}

impl BlackBoard {
    /// Create (master) or attach to (slave) the configured arena
    pub fn new(config: BlackBoardConfig) -> BbResult<Self> {
        config.validate()?;
        let region = match (config.mode, &config.region_name) {
            (ArenaMode::Master, _) => Region::create(&config)?,
            (ArenaMode::Slave, Some(name)) => Region::attach(name)?,
            (ArenaMode::Slave, None) => {
                return Err(BbError::InvalidRegion {
                    name: String::new(),
                    reason: "slave needs a region name".to_string(),
                });
            }
        };
        if !region.is_alive() {
            return Err(BbError::AlivenessLost {
                reason: format!("master of {} is gone", region.display_name()),
            });
        }

        let notifier = attach_notifier(match &config.region_name {
            Some(name) => NotifierKey::Named(name.clone()),
            None => NotifierKey::Anonymous(region.header().epoch),
        });
        let shared = Arc::new(Shared {
            config,
            region: RwLock::new(Arc::new(region)),
            state: Mutex::new(ArenaState::Detached),
            notifier,
            types: TypeRegistry::with_builtin(),
        });
        shared.set_state(ArenaState::Attached);
        Ok(Self { shared })
    }

    /// Configuration this instance was built from
    pub fn config(&self) -> &BlackBoardConfig {
        &self.shared.config
    }

    /// Master or slave
    pub fn mode(&self) -> ArenaMode {
        self.shared.config.mode
    }

    /// Current attachment state
    pub fn state(&self) -> ArenaState {
        *self.shared.state.lock()
    }

    /// Interface types known to this instance
    pub fn types(&self) -> &TypeRegistry {
        &self.shared.types
    }

    /// Make `T` available to dynamic opens
    pub fn register_type<T: InterfaceData>(&self) {
        self.shared.types.register::<T>();
    }

    fn open<T: InterfaceData>(
        &self,
        id: &str,
        mode: AccessMode,
        allow_create: bool,
    ) -> BbResult<Interface<T>> {
        let schema = T::schema();
        if size_of::<T>() != schema.data_size {
            return Err(BbError::TypeMismatch {
                uid: format!("{}::{id}", T::TYPE_NAME),
                reason: format!(
                    "type is {} bytes, schema says {}",
                    size_of::<T>(),
                    schema.data_size
                ),
            });
        }
        Interface::new(AccessorCore::open(&self.shared, schema, id, mode, allow_create)?)
    }

    fn open_dynamic(
        &self,
        type_name: &str,
        id: &str,
        mode: AccessMode,
        allow_create: bool,
    ) -> BbResult<DynInterface> {
        let schema: &'static Schema = self.shared.types.get(type_name)?;
        DynInterface::new(AccessorCore::open(&self.shared, schema, id, mode, allow_create)?)
    }

    /// Open `T::id` for reading, allocating it if absent
    pub fn open_for_reading<T: InterfaceData>(&self, id: &str) -> BbResult<Interface<T>> {
        self.open(id, AccessMode::Reader, true)
    }

    /// Open `T::id` for writing, allocating it if absent.
    ///
    /// Fails with `WriterAlreadyActive` while another writer holds it.
    pub fn open_for_writing<T: InterfaceData>(&self, id: &str) -> BbResult<Interface<T>> {
        self.open(id, AccessMode::Writer, true)
    }

    /// Open every existing `T` whose id matches the glob for reading
    pub fn open_multiple_for_reading<T: InterfaceData>(
        &self,
        id_pattern: &str,
    ) -> BbResult<Vec<Interface<T>>> {
        let mut opened = Vec::new();
        for info in self.list(T::TYPE_NAME, id_pattern)? {
            match self.open::<T>(&info.id, AccessMode::Reader, false) {
                Ok(interface) => opened.push(interface),
                Err(BbError::NotFound { uid }) => debug!(%uid, "Interface gone before open"),
                Err(e) => return Err(e),
            }
        }
        Ok(opened)
    }

    /// Open an interface by type name for reading
    pub fn open_dynamic_for_reading(&self, type_name: &str, id: &str) -> BbResult<DynInterface> {
        self.open_dynamic(type_name, id, AccessMode::Reader, true)
    }

    /// Open an existing interface by type name for reading. The id is
    /// matched exactly and nothing is created.
    ///
    /// # Errors
    ///
    /// `NotFound` if no such interface exists.
    pub fn open_existing_dynamic_for_reading(
        &self,
        type_name: &str,
        id: &str,
    ) -> BbResult<DynInterface> {
        self.open_dynamic(type_name, id, AccessMode::Reader, false)
    }

    /// Open an interface by type name for writing
    pub fn open_dynamic_for_writing(&self, type_name: &str, id: &str) -> BbResult<DynInterface> {
        self.open_dynamic(type_name, id, AccessMode::Writer, true)
    }

    /// Open every existing interface matching both globs whose type is
    /// registered. Unregistered types are skipped.
    pub fn open_multiple_dynamic_for_reading(
        &self,
        type_pattern: &str,
        id_pattern: &str,
    ) -> BbResult<Vec<DynInterface>> {
        let mut opened = Vec::new();
        for info in self.list(type_pattern, id_pattern)? {
            match self.open_existing_dynamic_for_reading(&info.type_name, &info.id) {
                Ok(interface) => opened.push(interface),
                Err(BbError::NotFound { uid }) => debug!(%uid, "Interface gone before open"),
                Err(BbError::UnknownType { type_name }) => {
                    debug!(%type_name, id = %info.id, "Skipping interface of unregistered type");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(opened)
    }

    /// Close a typed accessor
    pub fn close<T: InterfaceData>(&self, interface: Interface<T>) -> BbResult<()> {
        interface.close()
    }

    /// Close a dynamic accessor
    pub fn close_dynamic(&self, interface: DynInterface) -> BbResult<()> {
        interface.close()
    }

    /// Live interfaces whose type and id match the globs, sorted by type
    /// then id
    pub fn list(&self, type_pattern: &str, id_pattern: &str) -> BbResult<Vec<InterfaceInfo>> {
        let region = self.shared.current_region()?;
        let guard = region.lock()?;
        Ok(directory::list(&guard, type_pattern, id_pattern))
    }

    /// Every live interface
    pub fn list_all(&self) -> BbResult<Vec<InterfaceInfo>> {
        self.list("*", "*")
    }

    /// Watch one interface
    pub fn register_listener(
        &self,
        target: Arc<dyn InterfaceListener>,
        uid: &InterfaceUid,
        flags: ListenerFlags,
    ) {
        self.shared
            .notifier
            .register_listener(target, uid.clone(), flags);
    }

    /// Stop delivering to `target`
    pub fn unregister_listener(&self, target: &Arc<dyn InterfaceListener>) {
        let removed = self.shared.notifier.unregister_listener(target);
        debug!(removed, "Listener unregistered");
    }

    /// Watch interface creation/destruction for matching types and ids
    pub fn register_observer(
        &self,
        target: Arc<dyn InterfaceObserver>,
        type_pattern: &str,
        id_pattern: &str,
        flags: ObserverFlags,
    ) {
        self.shared
            .notifier
            .register_observer(target, type_pattern, id_pattern, flags);
    }

    /// Stop delivering to `target`
    pub fn unregister_observer(&self, target: &Arc<dyn InterfaceObserver>) {
        let removed = self.shared.notifier.unregister_observer(target);
        debug!(removed, "Observer unregistered");
    }

    /// True while the arena is reachable; a slave whose master went away
    /// moves to `Degraded`
    pub fn is_alive(&self) -> bool {
        let alive = self.shared.region.read().is_alive();
        if !alive {
            self.shared.set_state(ArenaState::Degraded);
        }
        alive
    }

    /// Re-attach a slave to its region after the master recreated it.
    ///
    /// Accessors opened before the restore stay bound to the old mapping
    /// and report `AlivenessLost`; they must be reopened.
    pub fn try_restore_aliveness(&self) -> bool {
        if self.shared.region.read().is_alive() {
            self.shared.set_state(ArenaState::Attached);
            return true;
        }
        let Some(name) = self.shared.config.region_name.as_deref() else {
            return false;
        };
        if self.shared.config.mode == ArenaMode::Master {
            warn!(region = name, "Master region lost, cannot restore");
            self.shared.set_state(ArenaState::Degraded);
            return false;
        }

        match Region::attach(name) {
            Ok(region) if region.is_alive() => {
                *self.shared.region.write() = Arc::new(region);
                self.shared.set_state(ArenaState::Attached);
                info!(region = name, "BlackBoard aliveness restored");
                true
            }
            Ok(_) => {
                debug!(region = name, "Region found but master not alive");
                self.shared.set_state(ArenaState::Degraded);
                false
            }
            Err(e) => {
                debug!(region = name, error = %e, "Restore attempt failed");
                self.shared.set_state(ArenaState::Degraded);
                false
            }
        }
    }

    /// Arena usage snapshot
    pub fn stats(&self) -> BbResult<BlackBoardStats> {
        let region = self.shared.current_region()?;
        let mut guard = region.lock()?;
        let arena = guard.chunks().stats();
        let interfaces = directory::live_count(&guard);
        drop(guard);
        Ok(BlackBoardStats {
            region: region.display_name().to_string(),
            state: self.state(),
            arena,
            interfaces,
            max_interfaces: region.layout().max_interfaces,
            listeners: self.shared.notifier.listener_count(),
            observers: self.shared.notifier.observer_count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::{MotorInterface, SkillerInterface};

    fn local() -> BlackBoard {
        BlackBoard::new(BlackBoardConfig::local(1 << 20)).unwrap()
    }

    #[test]
    fn test_new_local_is_attached() {
        let bb = local();
        assert_eq!(bb.state(), ArenaState::Attached);
        assert!(bb.is_alive());
        assert!(bb.try_restore_aliveness());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = BlackBoard::new(BlackBoardConfig::local(16)).err().unwrap();
        assert!(matches!(err, BbError::Config { .. }));
    }

    #[test]
    fn test_open_multiple_only_existing() {
        let bb = local();
        let _a = bb.open_for_writing::<MotorInterface>("Left").unwrap();
        let _b = bb.open_for_writing::<MotorInterface>("Right").unwrap();
        let _c = bb.open_for_writing::<SkillerInterface>("Skiller").unwrap();

        let readers = bb.open_multiple_for_reading::<MotorInterface>("*").unwrap();
        let ids: Vec<&str> = readers.iter().map(|r| r.id()).collect();
        assert_eq!(ids, ["Left", "Right"]);
        assert!(bb.open_multiple_for_reading::<MotorInterface>("Arm*").unwrap().is_empty());
    }

    #[test]
    fn test_dynamic_open_unknown_type() {
        let bb = local();
        let err = bb.open_dynamic_for_reading("LaserInterface", "front").err().unwrap();
        assert!(matches!(err, BbError::UnknownType { .. }));
    }

    #[test]
    fn test_stats_track_interfaces() {
        let bb = local();
        let before = bb.stats().unwrap();
        assert_eq!(before.interfaces, 0);
        assert_eq!(before.arena.used_bytes, 0);

        let writer = bb.open_for_writing::<SkillerInterface>("Skiller").unwrap();
        let during = bb.stats().unwrap();
        assert_eq!(during.interfaces, 1);
        assert!(during.arena.used_bytes >= 1164);

        bb.close(writer).unwrap();
        let after = bb.stats().unwrap();
        assert_eq!(after.interfaces, 0);
        assert_eq!(after.arena.free_bytes, before.arena.free_bytes);
    }
}
