//! Skill execution: the behaviour engine's command and status interface

use crate::message::Message;
use crate::schema::{
    FieldInfo, FieldType, InterfaceData, MessageData, MessageSchema, MessageSet, PlainData,
    Schema, read_fixed_str, write_fixed_str,
};
use std::mem::{offset_of, size_of};

/// Execution status of the skill engine
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillStatus {
    /// Nothing running
    Inactive = 0,
    /// Last skill finished successfully
    Final = 1,
    /// Skill running
    Running = 2,
    /// Last skill failed
    Failed = 3,
}

impl SkillStatus {
    /// Decode the raw field value
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Inactive),
            1 => Some(Self::Final),
            2 => Some(Self::Running),
            3 => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Enum table of the `status` field
pub static SKILLER_STATUS_VALUES: [(&str, i32); 4] = [
    ("S_INACTIVE", SkillStatus::Inactive as i32),
    ("S_FINAL", SkillStatus::Final as i32),
    ("S_RUNNING", SkillStatus::Running as i32),
    ("S_FAILED", SkillStatus::Failed as i32),
];

/// Skiller interface payload
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SkillerInterface {
    /// Currently executed skill string
    pub skill_string: [u8; 1024],
    /// Error of the last failed skill
    pub error: [u8; 128],
    /// Serial of the instance holding exclusive control, 0 if none
    pub exclusive_controller: u32,
    /// Raw [`SkillStatus`]
    pub status: i32,
    /// Non-zero while executing continuously
    pub continuous: u8,
    _pad: [u8; 3],
}

static_assertions::const_assert_eq!(size_of::<SkillerInterface>(), 1164);

impl SkillerInterface {
    /// Currently executed skill string
    pub fn skill_string(&self) -> String {
        read_fixed_str(&self.skill_string)
    }

    /// Set the skill string, truncating to capacity
    pub fn set_skill_string(&mut self, skill: &str) {
        write_fixed_str(&mut self.skill_string, skill);
    }

    /// Error of the last failed skill
    pub fn error(&self) -> String {
        read_fixed_str(&self.error)
    }

    /// Set the error string, truncating to capacity
    pub fn set_error(&mut self, error: &str) {
        write_fixed_str(&mut self.error, error);
    }

    /// Decoded status, `None` for values outside the enum
    pub fn status(&self) -> Option<SkillStatus> {
        SkillStatus::from_raw(self.status)
    }

    /// Set the status
    pub fn set_status(&mut self, status: SkillStatus) {
        self.status = status as i32;
    }

    /// True while executing continuously
    pub fn is_continuous(&self) -> bool {
        self.continuous != 0
    }

    /// Set the continuous flag
    pub fn set_continuous(&mut self, continuous: bool) {
        self.continuous = u8::from(continuous);
    }
}

static SKILLER_FIELDS: [FieldInfo; 5] = [
    FieldInfo::new(
        "skill_string",
        FieldType::String,
        offset_of!(SkillerInterface, skill_string),
        1024,
    ),
    FieldInfo::new("error", FieldType::String, offset_of!(SkillerInterface, error), 128),
    FieldInfo::new(
        "exclusive_controller",
        FieldType::Uint32,
        offset_of!(SkillerInterface, exclusive_controller),
        1,
    ),
    FieldInfo::enumeration(
        "status",
        offset_of!(SkillerInterface, status),
        &SKILLER_STATUS_VALUES,
    ),
    FieldInfo::new("continuous", FieldType::Bool, offset_of!(SkillerInterface, continuous), 1),
];

static SKILLER_SCHEMA: Schema = Schema::new(
    "SkillerInterface",
    size_of::<SkillerInterface>(),
    &SKILLER_FIELDS,
    &[
        &EXEC_SKILL_SCHEMA,
        &EXEC_SKILL_CONTINUOUS_SCHEMA,
        &RESTART_INTERPRETER_SCHEMA,
        &STOP_EXEC_SCHEMA,
        &ACQUIRE_CONTROL_SCHEMA,
        &RELEASE_CONTROL_SCHEMA,
    ],
);

unsafe impl PlainData for SkillerInterface {}

// SAFETY: repr(C); byte arrays, two 4-byte scalars, one byte and explicit
// padding up to the 4-byte alignment
unsafe impl InterfaceData for SkillerInterface {
    const TYPE_NAME: &'static str = "SkillerInterface";
    type Messages = SkillerMessage;

    fn schema() -> &'static Schema {
        &SKILLER_SCHEMA
    }
}

/// Execute a skill once
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ExecSkillMessage {
    /// Skill string to execute
    pub skill_string: [u8; 1024],
}

/// Execute a skill until stopped
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ExecSkillContinuousMessage {
    /// Skill string to execute
    pub skill_string: [u8; 1024],
}

impl ExecSkillMessage {
    /// Message for `skill`
    pub fn new(skill: &str) -> Self {
        let mut message = Self {
            skill_string: [0; 1024],
        };
        write_fixed_str(&mut message.skill_string, skill);
        message
    }

    /// Skill string
    pub fn skill_string(&self) -> String {
        read_fixed_str(&self.skill_string)
    }
}

impl ExecSkillContinuousMessage {
    /// Message for `skill`
    pub fn new(skill: &str) -> Self {
        let mut message = Self {
            skill_string: [0; 1024],
        };
        write_fixed_str(&mut message.skill_string, skill);
        message
    }

    /// Skill string
    pub fn skill_string(&self) -> String {
        read_fixed_str(&self.skill_string)
    }
}

static EXEC_SKILL_FIELDS: [FieldInfo; 1] = [FieldInfo::new(
    "skill_string",
    FieldType::String,
    offset_of!(ExecSkillMessage, skill_string),
    1024,
)];
static EXEC_SKILL_SCHEMA: MessageSchema = MessageSchema::new(
    "ExecSkillMessage",
    size_of::<ExecSkillMessage>(),
    &EXEC_SKILL_FIELDS,
);
static EXEC_SKILL_CONTINUOUS_SCHEMA: MessageSchema = MessageSchema::new(
    "ExecSkillContinuousMessage",
    size_of::<ExecSkillContinuousMessage>(),
    &EXEC_SKILL_FIELDS,
);

/// Restart the skill interpreter
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RestartInterpreterMessage {}

/// Stop the running skill
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct StopExecMessage {}

/// Claim exclusive control of the skiller
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct AcquireControlMessage {}

/// Give up exclusive control
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct ReleaseControlMessage {}

static RESTART_INTERPRETER_SCHEMA: MessageSchema =
    MessageSchema::new("RestartInterpreterMessage", 0, &[]);
static STOP_EXEC_SCHEMA: MessageSchema = MessageSchema::new("StopExecMessage", 0, &[]);
static ACQUIRE_CONTROL_SCHEMA: MessageSchema = MessageSchema::new("AcquireControlMessage", 0, &[]);
static RELEASE_CONTROL_SCHEMA: MessageSchema = MessageSchema::new("ReleaseControlMessage", 0, &[]);

unsafe impl PlainData for ExecSkillMessage {}
unsafe impl PlainData for ExecSkillContinuousMessage {}
unsafe impl PlainData for RestartInterpreterMessage {}
unsafe impl PlainData for StopExecMessage {}
unsafe impl PlainData for AcquireControlMessage {}
unsafe impl PlainData for ReleaseControlMessage {}

unsafe impl MessageData for ExecSkillMessage {
    const TYPE_NAME: &'static str = "ExecSkillMessage";
    fn schema() -> &'static MessageSchema {
        &EXEC_SKILL_SCHEMA
    }
}

unsafe impl MessageData for ExecSkillContinuousMessage {
    const TYPE_NAME: &'static str = "ExecSkillContinuousMessage";
    fn schema() -> &'static MessageSchema {
        &EXEC_SKILL_CONTINUOUS_SCHEMA
    }
}

unsafe impl MessageData for RestartInterpreterMessage {
    const TYPE_NAME: &'static str = "RestartInterpreterMessage";
    fn schema() -> &'static MessageSchema {
        &RESTART_INTERPRETER_SCHEMA
    }
}

unsafe impl MessageData for StopExecMessage {
    const TYPE_NAME: &'static str = "StopExecMessage";
    fn schema() -> &'static MessageSchema {
        &STOP_EXEC_SCHEMA
    }
}

unsafe impl MessageData for AcquireControlMessage {
    const TYPE_NAME: &'static str = "AcquireControlMessage";
    fn schema() -> &'static MessageSchema {
        &ACQUIRE_CONTROL_SCHEMA
    }
}

unsafe impl MessageData for ReleaseControlMessage {
    const TYPE_NAME: &'static str = "ReleaseControlMessage";
    fn schema() -> &'static MessageSchema {
        &RELEASE_CONTROL_SCHEMA
    }
}

/// Messages accepted by [`SkillerInterface`]
#[derive(Debug, Clone, Copy)]
pub enum SkillerMessage {
    /// Execute a skill once
    ExecSkill(ExecSkillMessage),
    /// Execute a skill until stopped
    ExecSkillContinuous(ExecSkillContinuousMessage),
    /// Restart the interpreter
    RestartInterpreter,
    /// Stop the running skill
    StopExec,
    /// Claim exclusive control
    AcquireControl,
    /// Give up exclusive control
    ReleaseControl,
}

impl MessageSet for SkillerMessage {
    fn decode(message: &Message) -> Option<Self> {
        match message.type_name() {
            ExecSkillMessage::TYPE_NAME => message.decode().map(Self::ExecSkill),
            ExecSkillContinuousMessage::TYPE_NAME => {
                message.decode().map(Self::ExecSkillContinuous)
            }
            RestartInterpreterMessage::TYPE_NAME => Some(Self::RestartInterpreter),
            StopExecMessage::TYPE_NAME => Some(Self::StopExec),
            AcquireControlMessage::TYPE_NAME => Some(Self::AcquireControl),
            ReleaseControlMessage::TYPE_NAME => Some(Self::ReleaseControl),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_matches_struct() {
        let schema = SkillerInterface::schema();
        assert_eq!(schema.data_size, 1164);
        assert_eq!(schema.validate_layout(), Ok(()));
        assert_eq!(schema.messages.len(), 6);
        assert_ne!(schema.hash(), crate::interfaces::MotorInterface::schema().hash());
    }

    #[test]
    fn test_status_helpers() {
        let mut data: SkillerInterface = crate::schema::zeroed();
        assert_eq!(data.status(), Some(SkillStatus::Inactive));
        data.set_status(SkillStatus::Running);
        assert_eq!(data.status, 2);
        data.status = 42;
        assert_eq!(data.status(), None);
    }

    #[test]
    fn test_exec_skill_decodes() {
        let message = Message::new(&ExecSkillMessage::new("say{text='hi'}"));
        match SkillerMessage::decode(&message) {
            Some(SkillerMessage::ExecSkill(m)) => assert_eq!(m.skill_string(), "say{text='hi'}"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            SkillerMessage::decode(&Message::new(&StopExecMessage {})),
            Some(SkillerMessage::StopExec)
        ));
    }
}
