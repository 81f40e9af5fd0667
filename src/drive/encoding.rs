//! Wire encodings for drive commands

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Command, Error, Result};

/// Default linear speed in m/s
pub const LINEAR_SPEED: f64 = 0.2;

/// Default angular speed in rad/s
pub const ANGULAR_SPEED: f64 = 1.2;

/// Payload format published on the drive topic
///
/// A robot-side consumer understands exactly one of these, so a deployment
/// picks one and keeps it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveEncoding {
    /// Bare lowercase token (`forward`, `stop`, ...)
    #[default]
    Token,
    /// JSON `{"linear_velocity": f, "angular_velocity": f}`
    Velocity,
}

impl FromStr for DriveEncoding {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "token" => Ok(Self::Token),
            "velocity" => Ok(Self::Velocity),
            other => Err(Error::Config(format!("unknown drive encoding: {other}"))),
        }
    }
}

/// Velocity pair sent in the JSON encoding
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub linear_velocity: f64,
    pub angular_velocity: f64,
}

impl Velocity {
    /// Velocity for a command at the given speeds
    #[must_use]
    pub fn for_command(command: Command, linear: f64, angular: f64) -> Self {
        let (linear_velocity, angular_velocity) = match command {
            Command::Forward => (linear, 0.0),
            Command::Back => (-linear, 0.0),
            Command::Left => (0.0, angular),
            Command::Right => (0.0, -angular),
            Command::Stop => (0.0, 0.0),
        };
        Self {
            linear_velocity,
            angular_velocity,
        }
    }
}

/// A command rendered for the wire
#[derive(Debug, Clone, PartialEq)]
pub enum DriveMessage {
    Token(Command),
    Velocity(Velocity),
}

impl DriveMessage {
    /// Render `command` in the given encoding
    #[must_use]
    pub fn encode(
        command: Command,
        encoding: DriveEncoding,
        linear: f64,
        angular: f64,
    ) -> Self {
        match encoding {
            DriveEncoding::Token => Self::Token(command),
            DriveEncoding::Velocity => {
                Self::Velocity(Velocity::for_command(command, linear, angular))
            }
        }
    }

    /// UTF-8 payload bytes
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a non-finite velocity, which JSON would
    /// otherwise carry as `null`
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        match self {
            Self::Token(command) => Ok(command.as_str().as_bytes().to_vec()),
            Self::Velocity(v) => {
                if !v.linear_velocity.is_finite() || !v.angular_velocity.is_finite() {
                    return Err(Error::InvalidInput(format!("non-finite velocity {v:?}")));
                }
                Ok(serde_json::to_vec(v)?)
            }
        }
    }
}
