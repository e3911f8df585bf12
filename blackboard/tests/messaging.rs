//! Message queue behaviour through accessors

use blackboard::interfaces::motor::{
    MotorInterface, MotorMessage, ResetOdometryMessage, SetMotorStateMessage, SetVelocityMessage,
};
use blackboard::interfaces::skiller::{
    ExecSkillMessage, SkillerInterface, SkillerMessage, StopExecMessage,
};
use blackboard::{
    BbError, BbResult, BlackBoard, BlackBoardConfig, Interface, InterfaceListener, InterfaceUid,
    ListenerFlags, Message, MessageSet,
};
use parking_lot::Mutex;
use std::sync::Arc;

fn local() -> BlackBoard {
    BlackBoard::new(BlackBoardConfig::local(1 << 20)).unwrap()
}

#[test]
fn test_robotino_velocity_scenario() -> BbResult<()> {
    let bb = local();
    let mut writer = bb.open_for_writing::<MotorInterface>("Robotino")?;
    let mut reader = bb.open_for_reading::<MotorInterface>("Robotino")?;

    writer.data_mut().vx = 0.4;
    writer.data_mut().vy = -0.1;
    writer.data_mut().omega = 0.8;
    writer.write()?;

    reader.read()?;
    assert_eq!(reader.data().vx, 0.4);
    assert_eq!(reader.data().vy, -0.1);
    assert_eq!(reader.data().omega, 0.8);

    let id = reader.msgq_enqueue(&SetVelocityMessage {
        vx: 1.5,
        vy: 0.0,
        omega: -0.5,
    })?;
    assert!(id > 0);
    assert_eq!(writer.msgq_len(), 1);

    let message = writer.msgq_pop()?.unwrap();
    assert_eq!(message.id(), id);
    assert_eq!(message.sender_serial(), reader.serial());
    assert!(message.enqueued_at() > 0);
    let velocity: SetVelocityMessage = message.decode().unwrap();
    assert_eq!(velocity.vx, 1.5);
    assert_eq!(velocity.omega, -0.5);
    assert!(writer.msgq_is_empty());
    Ok(())
}

#[test]
fn test_fifo_order_single_sender() -> BbResult<()> {
    let bb = local();
    let writer = bb.open_for_writing::<MotorInterface>("Robotino")?;
    let reader = bb.open_for_reading::<MotorInterface>("Robotino")?;

    let m1 = reader.msgq_enqueue(&SetMotorStateMessage { motor_state: 0 })?;
    let m2 = reader.msgq_enqueue(&ResetOdometryMessage {})?;
    let m3 = reader.msgq_enqueue(&SetVelocityMessage {
        vx: 0.1,
        vy: 0.2,
        omega: 0.3,
    })?;
    assert!(m1 < m2 && m2 < m3);

    assert_eq!(writer.msgq_first()?.unwrap().id(), m1);
    let drained: Vec<MotorMessage> = std::iter::from_fn(|| writer.msgq_pop().ok().flatten())
        .filter_map(|m| MotorMessage::decode(&m))
        .collect();
    assert!(matches!(
        drained.as_slice(),
        [
            MotorMessage::SetMotorState(SetMotorStateMessage { motor_state: 0 }),
            MotorMessage::ResetOdometry(_),
            MotorMessage::SetVelocity(_)
        ]
    ));
    Ok(())
}

#[test]
fn test_foreign_message_type_rejected() -> BbResult<()> {
    let bb = local();
    let _writer = bb.open_for_writing::<MotorInterface>("Robotino")?;
    let reader = bb.open_for_reading::<MotorInterface>("Robotino")?;

    let err = reader
        .msgq_enqueue(&ExecSkillMessage::new("relgoto{x=1}"))
        .unwrap_err();
    assert!(matches!(err, BbError::InvalidMessageType { .. }));
    assert!(reader.msgq_is_empty());
    Ok(())
}

#[test]
fn test_reader_cannot_drain() -> BbResult<()> {
    let bb = local();
    let _writer = bb.open_for_writing::<SkillerInterface>("Skiller")?;
    let reader = bb.open_for_reading::<SkillerInterface>("Skiller")?;
    reader.msgq_enqueue(&StopExecMessage {})?;

    assert!(matches!(reader.msgq_pop(), Err(BbError::PermissionDenied { .. })));
    assert!(matches!(reader.msgq_first(), Err(BbError::PermissionDenied { .. })));
    assert!(matches!(reader.msgq_flush(), Err(BbError::PermissionDenied { .. })));
    assert!(matches!(reader.msgq_remove(1), Err(BbError::PermissionDenied { .. })));
    assert_eq!(reader.msgq_len(), 1);
    Ok(())
}

#[test]
fn test_enqueue_without_writer() -> BbResult<()> {
    let bb = local();
    let reader = bb.open_for_reading::<SkillerInterface>("Skiller")?;
    let err = reader.msgq_enqueue(&StopExecMessage {}).unwrap_err();
    assert!(matches!(err, BbError::NoWriter { .. }));
    Ok(())
}

#[test]
fn test_writer_may_enqueue_to_itself() -> BbResult<()> {
    let bb = local();
    let writer = bb.open_for_writing::<SkillerInterface>("Skiller")?;
    let id = writer.msgq_enqueue(&ExecSkillMessage::new("say{text='hello'}"))?;

    let message = writer.msgq_pop()?.unwrap();
    assert_eq!(message.id(), id);
    match SkillerMessage::decode(&message) {
        Some(SkillerMessage::ExecSkill(exec)) => assert_eq!(exec.skill_string(), "say{text='hello'}"),
        other => panic!("unexpected {other:?}"),
    }
    Ok(())
}

#[test]
fn test_remove_and_flush() -> BbResult<()> {
    let bb = local();
    let writer = bb.open_for_writing::<MotorInterface>("Robotino")?;
    let reader = bb.open_for_reading::<MotorInterface>("Robotino")?;

    let ids: Vec<u32> = (0..4)
        .map(|i| reader.msgq_enqueue(&SetMotorStateMessage { motor_state: i }))
        .collect::<BbResult<_>>()?;

    assert!(writer.msgq_remove(ids[1])?);
    assert!(!writer.msgq_remove(ids[1])?);
    assert_eq!(writer.msgq_len(), 3);
    assert_eq!(writer.msgq_flush()?, 3);
    assert!(writer.msgq_pop()?.is_none());
    Ok(())
}

#[test]
fn test_closing_writer_drops_pending_messages() -> BbResult<()> {
    let bb = local();
    let writer = bb.open_for_writing::<MotorInterface>("Robotino")?;
    let reader = bb.open_for_reading::<MotorInterface>("Robotino")?;
    reader.msgq_enqueue(&ResetOdometryMessage {})?;
    bb.close(writer)?;

    let writer = bb.open_for_writing::<MotorInterface>("Robotino")?;
    assert!(writer.msgq_is_empty());
    Ok(())
}

/// Closes the held writer while a message to it is being delivered
struct CloseOnMessage(Mutex<Option<Interface<MotorInterface>>>);

impl InterfaceListener for CloseOnMessage {
    fn message_received(&self, _uid: &InterfaceUid, _message: &Message) -> bool {
        if let Some(writer) = self.0.lock().take() {
            writer.close().unwrap();
        }
        true
    }
}

#[test]
fn test_writer_closing_mid_enqueue_leaves_successor_clean() -> BbResult<()> {
    let bb = local();
    let writer = bb.open_for_writing::<MotorInterface>("Robotino")?;
    let reader = bb.open_for_reading::<MotorInterface>("Robotino")?;
    let closer = Arc::new(CloseOnMessage(Mutex::new(Some(writer))));
    bb.register_listener(closer.clone(), reader.uid(), ListenerFlags::MESSAGES);

    // Passes the writer check, then the writer goes away before the append
    let err = reader.msgq_enqueue(&ResetOdometryMessage {}).unwrap_err();
    assert!(matches!(err, BbError::NoWriter { .. }), "{err}");
    assert!(closer.0.lock().is_none());

    let successor = bb.open_for_writing::<MotorInterface>("Robotino")?;
    assert!(successor.msgq_is_empty());
    assert!(successor.msgq_pop()?.is_none());
    Ok(())
}

#[test]
fn test_concurrent_senders_lose_nothing() -> BbResult<()> {
    let bb = local();
    let writer = bb.open_for_writing::<MotorInterface>("Robotino")?;

    std::thread::scope(|s| {
        for sender in 0..4u32 {
            let bb = bb.clone();
            s.spawn(move || {
                let reader = bb.open_for_reading::<MotorInterface>("Robotino").unwrap();
                for seq in 0..100 {
                    reader
                        .msgq_enqueue(&SetMotorStateMessage {
                            motor_state: sender * 1000 + seq,
                        })
                        .unwrap();
                }
            });
        }
    });

    let mut last_seen = [None::<u32>; 4];
    let mut total = 0;
    while let Some(message) = writer.msgq_pop()? {
        let state: SetMotorStateMessage = message.decode().unwrap();
        let sender = (state.motor_state / 1000) as usize;
        let seq = state.motor_state % 1000;
        // Per-sender order is preserved
        if let Some(previous) = last_seen[sender] {
            assert!(seq > previous);
        }
        last_seen[sender] = Some(seq);
        total += 1;
    }
    assert_eq!(total, 400);
    Ok(())
}
