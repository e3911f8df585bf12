//! Motor control: drive state, odometry and velocity commands

use crate::message::Message;
use crate::schema::{
    FieldInfo, FieldType, InterfaceData, MessageData, MessageSchema, MessageSet, PlainData,
    Schema, read_fixed_str, write_fixed_str,
};
use std::mem::{offset_of, size_of};

/// Motors powered
pub const MOTOR_ENABLED: u32 = 0;
/// Motors unpowered
pub const MOTOR_DISABLED: u32 = 1;

/// Motor interface payload
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorInterface {
    /// `MOTOR_ENABLED` or `MOTOR_DISABLED`
    pub motor_state: u32,
    /// Active drive mode
    pub drive_mode: u32,
    /// Right wheel RPM
    pub right_rpm: i32,
    /// Rear wheel RPM
    pub rear_rpm: i32,
    /// Left wheel RPM
    pub left_rpm: i32,
    /// Instance serial of the controlling accessor
    pub controller: u32,
    /// Distance driven since the last reset, m
    pub odometry_path_length: f32,
    /// X since the last reset, m
    pub odometry_position_x: f32,
    /// Y since the last reset, m
    pub odometry_position_y: f32,
    /// Heading since the last reset, rad
    pub odometry_orientation: f32,
    /// Forward velocity, m/s
    pub vx: f32,
    /// Sideward velocity, m/s
    pub vy: f32,
    /// Rotational velocity, rad/s
    pub omega: f32,
    /// Thread name of the controller
    pub controller_thread_name: [u8; 64],
}

static_assertions::const_assert_eq!(size_of::<MotorInterface>(), 116);

impl MotorInterface {
    /// Controller thread name
    pub fn controller_thread_name(&self) -> String {
        read_fixed_str(&self.controller_thread_name)
    }

    /// Set the controller thread name, truncating to capacity
    pub fn set_controller_thread_name(&mut self, name: &str) {
        write_fixed_str(&mut self.controller_thread_name, name);
    }
}

static MOTOR_FIELDS: [FieldInfo; 14] = [
    FieldInfo::new("motor_state", FieldType::Uint32, offset_of!(MotorInterface, motor_state), 1),
    FieldInfo::new("drive_mode", FieldType::Uint32, offset_of!(MotorInterface, drive_mode), 1),
    FieldInfo::new("right_rpm", FieldType::Int32, offset_of!(MotorInterface, right_rpm), 1),
    FieldInfo::new("rear_rpm", FieldType::Int32, offset_of!(MotorInterface, rear_rpm), 1),
    FieldInfo::new("left_rpm", FieldType::Int32, offset_of!(MotorInterface, left_rpm), 1),
    FieldInfo::new("controller", FieldType::Uint32, offset_of!(MotorInterface, controller), 1),
    FieldInfo::new(
        "odometry_path_length",
        FieldType::Float,
        offset_of!(MotorInterface, odometry_path_length),
        1,
    ),
    FieldInfo::new(
        "odometry_position_x",
        FieldType::Float,
        offset_of!(MotorInterface, odometry_position_x),
        1,
    ),
    FieldInfo::new(
        "odometry_position_y",
        FieldType::Float,
        offset_of!(MotorInterface, odometry_position_y),
        1,
    ),
    FieldInfo::new(
        "odometry_orientation",
        FieldType::Float,
        offset_of!(MotorInterface, odometry_orientation),
        1,
    ),
    FieldInfo::new("vx", FieldType::Float, offset_of!(MotorInterface, vx), 1),
    FieldInfo::new("vy", FieldType::Float, offset_of!(MotorInterface, vy), 1),
    FieldInfo::new("omega", FieldType::Float, offset_of!(MotorInterface, omega), 1),
    FieldInfo::new(
        "controller_thread_name",
        FieldType::String,
        offset_of!(MotorInterface, controller_thread_name),
        64,
    ),
];

static MOTOR_SCHEMA: Schema = Schema::new(
    "MotorInterface",
    size_of::<MotorInterface>(),
    &MOTOR_FIELDS,
    &[
        &SET_MOTOR_STATE_SCHEMA,
        &ACQUIRE_CONTROL_SCHEMA,
        &RESET_ODOMETRY_SCHEMA,
        &SET_VELOCITY_SCHEMA,
    ],
);

unsafe impl PlainData for MotorInterface {}

// SAFETY: repr(C), 13 four-byte scalars then a byte array, no padding
unsafe impl InterfaceData for MotorInterface {
    const TYPE_NAME: &'static str = "MotorInterface";
    type Messages = MotorMessage;

    fn schema() -> &'static Schema {
        &MOTOR_SCHEMA
    }
}

/// Switch motors on or off
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetMotorStateMessage {
    /// `MOTOR_ENABLED` or `MOTOR_DISABLED`
    pub motor_state: u32,
}

static SET_MOTOR_STATE_FIELDS: [FieldInfo; 1] = [FieldInfo::new(
    "motor_state",
    FieldType::Uint32,
    offset_of!(SetMotorStateMessage, motor_state),
    1,
)];
static SET_MOTOR_STATE_SCHEMA: MessageSchema = MessageSchema::new(
    "SetMotorStateMessage",
    size_of::<SetMotorStateMessage>(),
    &SET_MOTOR_STATE_FIELDS,
);

/// Claim exclusive control of the motors
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcquireControlMessage {
    /// Serial of the claiming instance
    pub controller: u32,
    /// Thread name of the claiming instance
    pub controller_thread_name: [u8; 64],
}

static ACQUIRE_CONTROL_FIELDS: [FieldInfo; 2] = [
    FieldInfo::new(
        "controller",
        FieldType::Uint32,
        offset_of!(AcquireControlMessage, controller),
        1,
    ),
    FieldInfo::new(
        "controller_thread_name",
        FieldType::String,
        offset_of!(AcquireControlMessage, controller_thread_name),
        64,
    ),
];
static ACQUIRE_CONTROL_SCHEMA: MessageSchema = MessageSchema::new(
    "AcquireControlMessage",
    size_of::<AcquireControlMessage>(),
    &ACQUIRE_CONTROL_FIELDS,
);

/// Zero the odometry
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ResetOdometryMessage {}

static RESET_ODOMETRY_SCHEMA: MessageSchema = MessageSchema::new(
    "ResetOdometryMessage",
    size_of::<ResetOdometryMessage>(),
    &[],
);

/// Command a velocity
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SetVelocityMessage {
    /// Forward velocity, m/s
    pub vx: f32,
    /// Sideward velocity, m/s
    pub vy: f32,
    /// Rotational velocity, rad/s
    pub omega: f32,
}

static SET_VELOCITY_FIELDS: [FieldInfo; 3] = [
    FieldInfo::new("vx", FieldType::Float, offset_of!(SetVelocityMessage, vx), 1),
    FieldInfo::new("vy", FieldType::Float, offset_of!(SetVelocityMessage, vy), 1),
    FieldInfo::new("omega", FieldType::Float, offset_of!(SetVelocityMessage, omega), 1),
];
static SET_VELOCITY_SCHEMA: MessageSchema = MessageSchema::new(
    "SetVelocityMessage",
    size_of::<SetVelocityMessage>(),
    &SET_VELOCITY_FIELDS,
);

unsafe impl PlainData for SetMotorStateMessage {}
unsafe impl PlainData for AcquireControlMessage {}
unsafe impl PlainData for ResetOdometryMessage {}
unsafe impl PlainData for SetVelocityMessage {}

unsafe impl MessageData for SetMotorStateMessage {
    const TYPE_NAME: &'static str = "SetMotorStateMessage";
    fn schema() -> &'static MessageSchema {
        &SET_MOTOR_STATE_SCHEMA
    }
}

unsafe impl MessageData for AcquireControlMessage {
    const TYPE_NAME: &'static str = "AcquireControlMessage";
    fn schema() -> &'static MessageSchema {
        &ACQUIRE_CONTROL_SCHEMA
    }
}

unsafe impl MessageData for ResetOdometryMessage {
    const TYPE_NAME: &'static str = "ResetOdometryMessage";
    fn schema() -> &'static MessageSchema {
        &RESET_ODOMETRY_SCHEMA
    }
}

unsafe impl MessageData for SetVelocityMessage {
    const TYPE_NAME: &'static str = "SetVelocityMessage";
    fn schema() -> &'static MessageSchema {
        &SET_VELOCITY_SCHEMA
    }
}

/// Messages accepted by [`MotorInterface`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotorMessage {
    /// Switch motors on or off
    SetMotorState(SetMotorStateMessage),
    /// Claim exclusive control
    AcquireControl(AcquireControlMessage),
    /// Zero the odometry
    ResetOdometry(ResetOdometryMessage),
    /// Command a velocity
    SetVelocity(SetVelocityMessage),
}

impl MessageSet for MotorMessage {
    fn decode(message: &Message) -> Option<Self> {
        match message.type_name() {
            SetMotorStateMessage::TYPE_NAME => message.decode().map(Self::SetMotorState),
            AcquireControlMessage::TYPE_NAME => message.decode().map(Self::AcquireControl),
            ResetOdometryMessage::TYPE_NAME => message.decode().map(Self::ResetOdometry),
            SetVelocityMessage::TYPE_NAME => message.decode().map(Self::SetVelocity),
            _ => None,
        }
    }
}
