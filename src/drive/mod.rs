//! Drive channel: wire encoding, publishing, and timed actuation
//!
//! Commands flow `ActuationScheduler` → `DrivePublisher` → `MessageSink`.
//! The production sink is [`MqttLink`]; tests substitute a recording sink.

mod encoding;
mod mqtt;
mod publisher;
mod scheduler;

pub use encoding::{ANGULAR_SPEED, DriveEncoding, DriveMessage, LINEAR_SPEED, Velocity};
pub use mqtt::{MqttLink, MqttSettings};
pub use publisher::{DrivePublisher, MessageSink, PublishOutcome};
pub use scheduler::{ActuationScheduler, DEFAULT_STOP_DELAY, SchedulerState};

/// Topic carrying drive commands to the robot
pub const DRIVE_TOPIC: &str = "robot/drive";
