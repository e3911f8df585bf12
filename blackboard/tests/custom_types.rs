//! Interface types declared outside the crate

use blackboard::interfaces::motor::{MotorInterface, SetVelocityMessage};
use blackboard::schema::{MessageSchema, PlainData};
use blackboard::{
    BbError, BbResult, BlackBoard, BlackBoardConfig, FieldInfo, FieldType, InterfaceData,
    Message, MessageData, Schema,
};
use std::mem::offset_of;

fn local() -> BlackBoard {
    BlackBoard::new(BlackBoardConfig::local(1 << 20)).unwrap()
}

/// Shares its name and size with the motor velocity command, not its fields
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct StepCommand {
    count: u32,
    limit: u32,
    step: u32,
}

static STEP_FIELDS: [FieldInfo; 3] = [
    FieldInfo::new("count", FieldType::Uint32, offset_of!(StepCommand, count), 1),
    FieldInfo::new("limit", FieldType::Uint32, offset_of!(StepCommand, limit), 1),
    FieldInfo::new("step", FieldType::Uint32, offset_of!(StepCommand, step), 1),
];
static STEP_SCHEMA: MessageSchema =
    MessageSchema::new("SetVelocityMessage", size_of::<StepCommand>(), &STEP_FIELDS);

unsafe impl PlainData for StepCommand {}

unsafe impl MessageData for StepCommand {
    const TYPE_NAME: &'static str = "SetVelocityMessage";
    fn schema() -> &'static MessageSchema {
        &STEP_SCHEMA
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct StepperInterface {
    position: u32,
}

static STEPPER_FIELDS: [FieldInfo; 1] = [FieldInfo::new(
    "position",
    FieldType::Uint32,
    offset_of!(StepperInterface, position),
    1,
)];
static STEPPER_SCHEMA: Schema = Schema::new(
    "StepperInterface",
    size_of::<StepperInterface>(),
    &STEPPER_FIELDS,
    &[&STEP_SCHEMA],
);

unsafe impl PlainData for StepperInterface {}

unsafe impl InterfaceData for StepperInterface {
    const TYPE_NAME: &'static str = "StepperInterface";
    type Messages = ();
    fn schema() -> &'static Schema {
        &STEPPER_SCHEMA
    }
}

/// Claims the motor type name with an unrelated layout of the same size
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct RawMotor {
    words: [u32; 29],
}

static RAW_MOTOR_FIELDS: [FieldInfo; 1] = [FieldInfo::new(
    "words",
    FieldType::Uint32,
    offset_of!(RawMotor, words),
    29,
)];
static RAW_MOTOR_SCHEMA: Schema =
    Schema::new("MotorInterface", size_of::<RawMotor>(), &RAW_MOTOR_FIELDS, &[]);

unsafe impl PlainData for RawMotor {}

unsafe impl InterfaceData for RawMotor {
    const TYPE_NAME: &'static str = "MotorInterface";
    type Messages = ();
    fn schema() -> &'static Schema {
        &RAW_MOTOR_SCHEMA
    }
}

#[test]
fn test_same_named_message_of_other_layout_rejected() -> BbResult<()> {
    let bb = local();
    let stepper = bb.open_for_writing::<StepperInterface>("x")?;

    let velocity = SetVelocityMessage {
        vx: 1.5,
        vy: 0.0,
        omega: 0.0,
    };
    let err = stepper.msgq_enqueue(&velocity).err().unwrap();
    assert!(matches!(err, BbError::InvalidMessageType { .. }), "{err}");
    assert!(stepper.msgq_is_empty());

    stepper.msgq_enqueue(&StepCommand {
        count: 3,
        limit: 10,
        step: 1,
    })?;
    assert_eq!(stepper.msgq_len(), 1);
    Ok(())
}

#[test]
fn test_decode_refuses_same_named_message() {
    let message = Message::new(&SetVelocityMessage {
        vx: 1.5,
        vy: 0.0,
        omega: 0.0,
    });
    assert!(!message.is::<StepCommand>());
    assert!(message.decode::<StepCommand>().is_none());
    assert_eq!(message.decode::<SetVelocityMessage>().unwrap().vx, 1.5);
}

#[test]
fn test_open_with_other_layout_is_type_mismatch() -> BbResult<()> {
    assert_eq!(size_of::<RawMotor>(), size_of::<MotorInterface>());
    let bb = local();
    let _writer = bb.open_for_writing::<MotorInterface>("Robotino")?;

    let err = bb.open_for_reading::<RawMotor>("Robotino").err().unwrap();
    assert!(matches!(err, BbError::TypeMismatch { .. }), "{err}");
    let err = bb.open_for_writing::<RawMotor>("Robotino").err().unwrap();
    assert!(matches!(err, BbError::TypeMismatch { .. }), "{err}");

    // The failed opens left no counts behind
    let infos = bb.list_all()?;
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].reader_count, 0);
    assert!(infos[0].has_writer);
    Ok(())
}
