//! Observers and listeners around a skill executor
//!
//! Run with `RUST_LOG=debug` to see the BlackBoard's own logging.

use blackboard::interfaces::skiller::{ExecSkillMessage, SkillStatus, StopExecMessage};
use blackboard::prelude::*;
use std::sync::Arc;

struct Announcer;

impl InterfaceObserver for Announcer {
    fn interface_created(&self, type_name: &str, id: &str) {
        println!("[observer] created {type_name}::{id}");
    }

    fn interface_destroyed(&self, type_name: &str, id: &str) {
        println!("[observer] destroyed {type_name}::{id}");
    }
}

/// Refuses to queue skills while one is running
struct Gate;

impl InterfaceListener for Gate {
    fn data_changed(&self, uid: &InterfaceUid) {
        println!("[listener] {uid} written");
    }

    fn message_received(&self, uid: &InterfaceUid, message: &Message) -> bool {
        let accept = !message.is::<ExecSkillMessage>()
            || message
                .decode::<ExecSkillMessage>()
                .is_some_and(|m| !m.skill_string().is_empty());
        println!("[listener] {uid} <- {} accepted={accept}", message.type_name());
        accept
    }

    fn reader_added(&self, uid: &InterfaceUid, serial: u32) {
        println!("[listener] {uid} reader {serial} joined");
    }
}

fn main() -> BbResult<()> {
    blackboard::init_tracing();
    let bb = BlackBoard::new(BlackBoardConfig::local(1 << 20))?;
    bb.register_observer(Arc::new(Announcer), "Skiller*", "*", ObserverFlags::ALL);

    let mut skiller = bb.open_for_writing::<SkillerInterface>("Skiller")?;
    bb.register_listener(Arc::new(Gate), skiller.uid(), ListenerFlags::ALL);

    let agent = bb.open_for_reading::<SkillerInterface>("Skiller")?;
    agent.msgq_enqueue(&ExecSkillMessage::new("relgoto{x=1.0, y=0.0}"))?;
    agent.msgq_enqueue(&ExecSkillMessage::new(""))?;
    agent.msgq_enqueue(&StopExecMessage {})?;

    while let Some(message) = skiller.msgq_pop()? {
        match SkillerMessage::decode(&message) {
            Some(SkillerMessage::ExecSkill(exec)) => {
                skiller.data_mut().set_skill_string(&exec.skill_string());
                skiller.data_mut().set_status(SkillStatus::Running);
            }
            Some(SkillerMessage::StopExec) => skiller.data_mut().set_status(SkillStatus::Final),
            _ => {}
        }
        skiller.write()?;
    }

    for (name, value) in skiller.field_values() {
        println!("{name} = {value:?}");
    }

    bb.close(agent)?;
    bb.close(skiller)
}
