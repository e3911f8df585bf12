//! Interface open/close lifecycle

use blackboard::interfaces::motor::MotorInterface;
use blackboard::interfaces::skiller::{SkillStatus, SkillerInterface};
use blackboard::{BbError, BbResult, BlackBoard, BlackBoardConfig, FieldAccess, FieldValue};

fn local() -> BlackBoard {
    BlackBoard::new(BlackBoardConfig::local(1 << 20)).unwrap()
}

#[test]
fn test_write_then_read_round_trip() -> BbResult<()> {
    let bb = local();
    let mut writer = bb.open_for_writing::<SkillerInterface>("Skiller")?;
    writer.data_mut().set_skill_string("relgoto{x=1.0, y=0.5}");
    writer.data_mut().set_status(SkillStatus::Running);
    writer.write()?;

    let mut reader = bb.open_for_reading::<SkillerInterface>("Skiller")?;
    assert_eq!(reader.data().skill_string(), "relgoto{x=1.0, y=0.5}");
    assert_eq!(reader.data().status(), Some(SkillStatus::Running));

    // Idempotent without intervening writes
    let before = *reader.data();
    reader.read()?;
    reader.read()?;
    assert_eq!(reader.data().skill_string(), before.skill_string());
    assert_eq!(reader.revision(), 1);
    Ok(())
}

#[test]
fn test_second_writer_rejected() -> BbResult<()> {
    let bb = local();
    let mut first = bb.open_for_writing::<MotorInterface>("Robotino")?;

    let err = bb.open_for_writing::<MotorInterface>("Robotino").err().unwrap();
    assert!(matches!(err, BbError::WriterAlreadyActive { .. }));

    // First writer unaffected
    first.data_mut().vx = 1.0;
    first.write()?;
    assert!(first.is_valid());

    // Another id is independent
    let _other = bb.open_for_writing::<MotorInterface>("Arm")?;
    Ok(())
}

#[test]
fn test_writer_slot_free_after_close() -> BbResult<()> {
    let bb = local();
    let _reader = bb.open_for_reading::<MotorInterface>("Robotino")?;
    let writer = bb.open_for_writing::<MotorInterface>("Robotino")?;
    bb.close(writer)?;

    let again = bb.open_for_writing::<MotorInterface>("Robotino")?;
    assert!(again.has_writer());
    Ok(())
}

#[test]
fn test_write_from_reader_denied() -> BbResult<()> {
    let bb = local();
    let mut reader = bb.open_for_reading::<MotorInterface>("Robotino")?;
    let err = reader.write().unwrap_err();
    assert!(matches!(err, BbError::PermissionDenied { operation: "write", .. }));
    Ok(())
}

#[test]
fn test_counts_and_listing() -> BbResult<()> {
    let bb = local();
    let writer = bb.open_for_writing::<MotorInterface>("Robotino")?;
    let r1 = bb.open_for_reading::<MotorInterface>("Robotino")?;
    let r2 = bb.open_for_reading::<MotorInterface>("Robotino")?;

    assert_eq!(writer.num_readers(), 2);
    assert!(r1.has_writer());
    assert_ne!(r1.serial(), r2.serial());

    let infos = bb.list("Motor*", "Robo*")?;
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].reader_count, 2);
    assert!(infos[0].has_writer);
    assert_eq!(infos[0].writer_serial, writer.serial());

    bb.close(r1)?;
    assert_eq!(writer.num_readers(), 1);
    bb.close(writer)?;
    assert!(!r2.has_writer());
    assert_eq!(bb.list_all()?.len(), 1);

    bb.close(r2)?;
    assert!(bb.list_all()?.is_empty());
    Ok(())
}

#[test]
fn test_reopen_after_destroy_is_zeroed() -> BbResult<()> {
    let bb = local();
    let mut writer = bb.open_for_writing::<MotorInterface>("Robotino")?;
    writer.data_mut().left_rpm = 900;
    writer.write()?;
    let stale = writer.handle();
    bb.close(writer)?;

    let fresh = bb.open_for_reading::<MotorInterface>("Robotino")?;
    assert_eq!(fresh.data().left_rpm, 0);
    assert_eq!(fresh.revision(), 0);
    assert_eq!(fresh.timestamp(), 0);
    assert_ne!(fresh.handle().generation, stale.generation);
    Ok(())
}

#[test]
fn test_drop_releases_counts() -> BbResult<()> {
    let bb = local();
    {
        let _writer = bb.open_for_writing::<MotorInterface>("Robotino")?;
        let _reader = bb.open_for_reading::<MotorInterface>("Robotino")?;
        assert_eq!(bb.list_all()?.len(), 1);
    }
    assert!(bb.list_all()?.is_empty());
    assert_eq!(bb.stats()?.arena.used_bytes, 0);
    Ok(())
}

#[test]
fn test_changed_tracks_foreign_writes() -> BbResult<()> {
    let bb = local();
    let mut writer = bb.open_for_writing::<MotorInterface>("Robotino")?;
    let mut reader = bb.open_for_reading::<MotorInterface>("Robotino")?;
    assert!(!reader.changed());

    writer.data_mut().omega = 0.25;
    writer.write()?;
    assert!(reader.changed());
    assert!(!writer.changed());

    reader.read()?;
    assert!(!reader.changed());
    assert!(reader.timestamp() > 0);
    assert_eq!(reader.timestamp(), writer.timestamp());
    Ok(())
}

#[test]
fn test_dynamic_accessor_sees_typed_writes() -> BbResult<()> {
    let bb = local();
    let mut writer = bb.open_for_writing::<SkillerInterface>("Skiller")?;
    writer.data_mut().set_status(SkillStatus::Failed);
    writer.data_mut().set_error("no such skill");
    writer.write()?;

    let mut dynamic = bb.open_dynamic_for_reading("SkillerInterface", "Skiller")?;
    dynamic.read()?;
    assert_eq!(
        dynamic.field_value("status")?,
        FieldValue::Enum {
            value: 3,
            name: Some("S_FAILED".to_string())
        }
    );
    assert_eq!(
        dynamic.field_value("error")?,
        FieldValue::String("no such skill".to_string())
    );
    assert_eq!(dynamic.fieldinfo().len(), writer.fieldinfo().len());
    Ok(())
}

#[test]
fn test_dynamic_writer_publishes_fields() -> BbResult<()> {
    let bb = local();
    let mut dynamic = bb.open_dynamic_for_writing("MotorInterface", "Robotino")?;
    dynamic.set_field_value("vx", &FieldValue::Float(0.5))?;
    dynamic.set_field_value("right_rpm", &FieldValue::Int(-300))?;
    dynamic.write()?;

    let reader = bb.open_for_reading::<MotorInterface>("Robotino")?;
    assert_eq!(reader.data().vx, 0.5);
    assert_eq!(reader.data().right_rpm, -300);

    let err = dynamic
        .set_field_value("right_rpm", &FieldValue::String("fast".into()))
        .unwrap_err();
    assert!(matches!(err, BbError::InvalidField { .. }));
    bb.close_dynamic(dynamic)?;
    Ok(())
}

#[test]
fn test_out_of_memory() {
    let config = BlackBoardConfig {
        max_interfaces: 64,
        max_chunks: 128,
        ..BlackBoardConfig::local(64 * 1024)
    };
    let bb = BlackBoard::new(config).unwrap();

    let mut held = Vec::new();
    let err = loop {
        match bb.open_for_writing::<SkillerInterface>(&format!("s{}", held.len())) {
            Ok(interface) => held.push(interface),
            Err(e) => break e,
        }
        assert!(held.len() <= 64, "arena never filled");
    };
    assert!(matches!(err, BbError::OutOfMemory { .. }), "{err}");
    assert!(!held.is_empty());

    // Space comes back after a close
    let last = held.pop().unwrap();
    bb.close(last).unwrap();
    assert!(bb.open_for_writing::<SkillerInterface>("again").is_ok());
}

#[test]
fn test_name_bounds() {
    let bb = local();
    let long_id = "x".repeat(64);
    let err = bb.open_for_reading::<MotorInterface>(&long_id).err().unwrap();
    assert!(matches!(err, BbError::InvalidName { .. }));
    assert!(bb.open_for_reading::<MotorInterface>(&"x".repeat(63)).is_ok());
}
