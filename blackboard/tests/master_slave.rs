//! Named regions shared between a master and slaves

use blackboard::discovery::find_region;
use blackboard::interfaces::motor::{MotorInterface, SetVelocityMessage};
use blackboard::platform::{create_region_mmap, get_current_pid, region_path};
use blackboard::{
    ArenaState, BbError, BbResult, BlackBoard, BlackBoardConfig, InterfaceListener,
    InterfaceObserver, InterfaceUid, ListenerFlags, ObserverFlags,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn region_name(test: &str) -> String {
    format!("it_{test}_{}", get_current_pid())
}

fn master(name: &str) -> BlackBoard {
    BlackBoard::new(BlackBoardConfig {
        memory_size: 1 << 20,
        ..BlackBoardConfig::master(name)
    })
    .unwrap()
}

fn slave(name: &str) -> BlackBoard {
    BlackBoard::new(BlackBoardConfig::slave(name)).unwrap()
}

#[test]
fn test_slave_sees_master_data_and_counts() -> BbResult<()> {
    let name = region_name("data");
    let bb = master(&name);
    let remote = slave(&name);

    let mut writer = bb.open_for_writing::<MotorInterface>("Robotino")?;
    writer.data_mut().vx = 0.2;
    writer.data_mut().left_rpm = 450;
    writer.write()?;

    let reader = remote.open_for_reading::<MotorInterface>("Robotino")?;
    assert_eq!(reader.data().vx, 0.2);
    assert_eq!(reader.data().left_rpm, 450);
    assert!(reader.has_writer());
    assert_eq!(writer.num_readers(), 1);

    // Single writer holds across attachments
    let err = remote.open_for_writing::<MotorInterface>("Robotino").err().unwrap();
    assert!(matches!(err, BbError::WriterAlreadyActive { .. }));

    let infos = bb.list_all()?;
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].writer_pid, get_current_pid());
    Ok(())
}

#[test]
fn test_slave_message_reaches_master_writer() -> BbResult<()> {
    let name = region_name("msg");
    let bb = master(&name);
    let remote = slave(&name);

    let writer = bb.open_for_writing::<MotorInterface>("Robotino")?;
    let reader = remote.open_for_reading::<MotorInterface>("Robotino")?;
    let id = reader.msgq_enqueue(&SetVelocityMessage {
        vx: 0.0,
        vy: 0.0,
        omega: 1.0,
    })?;

    let message = writer.msgq_pop()?.unwrap();
    assert_eq!(message.id(), id);
    assert_eq!(message.decode::<SetVelocityMessage>().unwrap().omega, 1.0);
    Ok(())
}

#[derive(Default)]
struct Tally {
    writes: AtomicUsize,
    created: AtomicUsize,
}

impl InterfaceListener for Tally {
    fn data_changed(&self, _uid: &InterfaceUid) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

impl InterfaceObserver for Tally {
    fn interface_created(&self, _type_name: &str, _id: &str) {
        self.created.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_events_shared_by_handles_in_one_process() -> BbResult<()> {
    let name = region_name("events");
    let bb = master(&name);
    let remote = slave(&name);
    let tally = Arc::new(Tally::default());

    // Observer on the master handle, interface created through the slave
    bb.register_observer(tally.clone(), "*", "*", ObserverFlags::CREATED);
    let mut writer = remote.open_for_writing::<MotorInterface>("Robotino")?;
    assert_eq!(tally.created.load(Ordering::SeqCst), 1);

    // Listener on the slave handle, writes through the master
    let mut master_writer = bb.open_for_writing::<MotorInterface>("Base")?;
    remote.register_listener(tally.clone(), master_writer.uid(), ListenerFlags::DATA);
    master_writer.write()?;
    master_writer.write()?;
    assert_eq!(tally.writes.load(Ordering::SeqCst), 2);

    // And the other way round
    bb.register_listener(tally.clone(), writer.uid(), ListenerFlags::DATA);
    writer.write()?;
    assert_eq!(tally.writes.load(Ordering::SeqCst), 3);

    assert_eq!(bb.stats()?.listeners, remote.stats()?.listeners);
    Ok(())
}

#[test]
fn test_second_master_rejected() {
    let name = region_name("twice");
    let _bb = master(&name);
    let err = BlackBoard::new(BlackBoardConfig {
        memory_size: 1 << 20,
        ..BlackBoardConfig::master(&name)
    })
    .err()
    .unwrap();
    assert!(matches!(err, BbError::AlreadyExists { .. }));
}

#[test]
fn test_slave_without_master() {
    let err = BlackBoard::new(BlackBoardConfig::slave(&region_name("absent")))
        .err()
        .unwrap();
    assert!(matches!(err, BbError::AlivenessLost { .. }));
}

#[test]
fn test_stale_region_file_replaced() {
    let name = region_name("stale");
    drop(create_region_mmap(&name, 8192).unwrap());
    assert!(region_path(&name).exists());

    let bb = master(&name);
    assert!(bb.is_alive());
    assert!(find_region(&name).unwrap().unwrap().valid);
    drop(bb);
    assert!(!region_path(&name).exists());
}

#[test]
fn test_degrade_and_restore() -> BbResult<()> {
    let name = region_name("restore");
    let bb = master(&name);
    let remote = slave(&name);
    assert_eq!(remote.state(), ArenaState::Attached);

    let mut old_reader = remote.open_for_reading::<MotorInterface>("Robotino")?;
    drop(bb);

    assert!(!remote.is_alive());
    assert_eq!(remote.state(), ArenaState::Degraded);
    assert!(!remote.try_restore_aliveness());
    assert!(matches!(old_reader.read(), Err(BbError::AlivenessLost { .. })));
    assert!(matches!(
        remote.open_for_reading::<MotorInterface>("Robotino"),
        Err(BbError::AlivenessLost { .. })
    ));

    let bb = master(&name);
    assert!(remote.try_restore_aliveness());
    assert_eq!(remote.state(), ArenaState::Attached);

    // Accessors from before the restore stay unusable
    assert!(!old_reader.is_valid());
    assert!(matches!(old_reader.read(), Err(BbError::AlivenessLost { .. })));

    let mut writer = bb.open_for_writing::<MotorInterface>("Robotino")?;
    writer.data_mut().omega = 0.5;
    writer.write()?;
    let reader = remote.open_for_reading::<MotorInterface>("Robotino")?;
    assert_eq!(reader.data().omega, 0.5);
    Ok(())
}
