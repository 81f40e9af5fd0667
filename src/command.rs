//! Drive commands and the phrase interpreter
//!
//! Maps free-form transcribed speech to one of five discrete commands.
//! Matching is substring-based against a fixed, ordered table so that text
//! naming several directions always resolves the same way.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// A discrete drive command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Forward,
    Back,
    Left,
    Right,
    Stop,
}

impl Command {
    /// Every command, in interpreter precedence order
    pub const ALL: [Self; 5] = [
        Self::Forward,
        Self::Back,
        Self::Left,
        Self::Right,
        Self::Stop,
    ];

    /// Wire token for this command
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Back => "back",
            Self::Left => "left",
            Self::Right => "right",
            Self::Stop => "stop",
        }
    }

    /// Whether this command halts the robot
    #[must_use]
    pub const fn is_stop(self) -> bool {
        matches!(self, Self::Stop)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward" => Ok(Self::Forward),
            "back" | "backward" => Ok(Self::Back),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "stop" | "halt" => Ok(Self::Stop),
            other => Err(Error::InvalidDirection(other.to_string())),
        }
    }
}

/// Trigger phrases per command family, checked top to bottom
const TRIGGERS: &[(Command, &[&str])] = &[
    (Command::Forward, &["forward"]),
    (Command::Back, &["back", "backward"]),
    (Command::Left, &["left"]),
    (Command::Right, &["right"]),
    (Command::Stop, &["stop", "halt"]),
];

/// Characters trimmed from both ends before matching
const TRIM_CHARS: &[char] = &['-', '.', ',', '!', '?'];

/// Lowercase and strip surrounding whitespace and `-.,!?`
#[must_use]
pub fn normalize(text: &str) -> String {
    text.trim()
        .trim_matches(|c: char| c.is_whitespace() || TRIM_CHARS.contains(&c))
        .to_lowercase()
}

/// Interpret transcribed text as a drive command
///
/// Returns `None` when no trigger phrase occurs; such text is
/// conversational and never dispatched.
#[must_use]
pub fn interpret(text: &str) -> Option<Command> {
    let text = normalize(text);
    if text.is_empty() {
        return None;
    }

    TRIGGERS
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|p| text.contains(p)))
        .map(|(command, _)| *command)
}
