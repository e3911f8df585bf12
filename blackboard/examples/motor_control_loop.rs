//! Fixed-period motor controller driven by BlackBoard messages
//!
//! A "navigator" thread reads the motor interface and enqueues velocity
//! commands; the controller loop drains its queue every cycle, integrates
//! odometry and publishes the new state.

use blackboard::prelude::*;
use blackboard::interfaces::motor::{MOTOR_ENABLED, SetMotorStateMessage};
use std::thread;
use std::time::{Duration, Instant};

const PERIOD: Duration = Duration::from_millis(10);
const CYCLES: u32 = 200;

fn controller(bb: BlackBoard) -> BbResult<()> {
    let mut motor = bb.open_for_writing::<MotorInterface>("Robotino")?;
    motor.data_mut().set_controller_thread_name("controller");
    motor.write()?;

    let dt = PERIOD.as_secs_f32();
    let mut deadline_misses = 0;
    for _ in 0..CYCLES {
        let start = Instant::now();

        while let Some(message) = motor.msgq_pop()? {
            match MotorMessage::decode(&message) {
                Some(MotorMessage::SetMotorState(s)) => motor.data_mut().motor_state = s.motor_state,
                Some(MotorMessage::SetVelocity(v)) => {
                    let data = motor.data_mut();
                    data.vx = v.vx;
                    data.vy = v.vy;
                    data.omega = v.omega;
                }
                Some(MotorMessage::ResetOdometry(_)) => {
                    let data = motor.data_mut();
                    data.odometry_position_x = 0.0;
                    data.odometry_position_y = 0.0;
                    data.odometry_orientation = 0.0;
                    data.odometry_path_length = 0.0;
                }
                Some(MotorMessage::AcquireControl(a)) => motor.data_mut().controller = a.controller,
                None => tracing::warn!(message = message.type_name(), "Unhandled message"),
            }
        }

        let data = motor.data_mut();
        if data.motor_state == MOTOR_ENABLED {
            let (sin, cos) = data.odometry_orientation.sin_cos();
            let dx = (data.vx * cos - data.vy * sin) * dt;
            let dy = (data.vx * sin + data.vy * cos) * dt;
            data.odometry_position_x += dx;
            data.odometry_position_y += dy;
            data.odometry_orientation += data.omega * dt;
            data.odometry_path_length += (dx * dx + dy * dy).sqrt();
        }
        motor.write()?;

        let elapsed = start.elapsed();
        if elapsed > PERIOD {
            deadline_misses += 1;
        } else {
            thread::sleep(PERIOD - elapsed);
        }
    }

    let data = motor.data();
    println!(
        "controller: x={:.3} y={:.3} phi={:.3} path={:.3} misses={}",
        data.odometry_position_x,
        data.odometry_position_y,
        data.odometry_orientation,
        data.odometry_path_length,
        deadline_misses
    );
    bb.close(motor)
}

fn navigator(bb: BlackBoard) -> BbResult<()> {
    // Wait for the controller to claim the interface
    let mut motor = bb.open_for_reading::<MotorInterface>("Robotino")?;
    while !motor.has_writer() {
        thread::sleep(PERIOD);
    }

    motor.msgq_enqueue(&SetMotorStateMessage {
        motor_state: MOTOR_ENABLED,
    })?;
    motor.msgq_enqueue(&SetVelocityMessage {
        vx: 0.5,
        vy: 0.0,
        omega: 0.3,
    })?;

    for _ in 0..10 {
        thread::sleep(PERIOD * 10);
        motor.read()?;
        println!(
            "navigator: revision={} x={:.3} y={:.3}",
            motor.revision(),
            motor.data().odometry_position_x,
            motor.data().odometry_position_y
        );
        if !motor.has_writer() {
            break;
        }
    }
    bb.close(motor)
}

fn main() -> BbResult<()> {
    blackboard::init_tracing();
    let bb = BlackBoard::new(BlackBoardConfig::local(1 << 20))?;

    let ctl = {
        let bb = bb.clone();
        thread::spawn(move || controller(bb))
    };
    let nav = {
        let bb = bb.clone();
        thread::spawn(move || navigator(bb))
    };

    for handle in [ctl, nav] {
        match handle.join() {
            Ok(result) => result?,
            Err(_) => eprintln!("worker panicked"),
        }
    }
    Ok(())
}
