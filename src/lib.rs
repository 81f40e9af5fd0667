//! voicedrive - voice-controlled teleoperation bridge
//!
//! Listens on a microphone, transcribes speech, interprets it as one of five
//! drive commands and publishes the command to a robot over MQTT. Every
//! movement stops on its own after a short delay.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   chunks   ┌──────────────┐  text  ┌─────────────┐
//! │ AudioCapture ├───────────►│ StreamWindow ├───────►│ Transcriber │
//! └──────────────┘            └──────────────┘        └──────┬──────┘
//!                                                             │
//!        ┌────────────────────────────────────────────────────┘
//!        ▼
//! ┌─────────────┐ Command ┌──────────────────────┐ payload ┌───────────┐
//! │ interpret() ├────────►│ ActuationScheduler   ├────────►│ MqttLink  │
//! └─────────────┘         │ (auto-stop timer)    │         └───────────┘
//!                         └──────────▲───────────┘
//!                                    │ manual move/stop
//!                              ┌─────┴─────┐
//!                              │  HTTP API │ designs, replies, speech
//!                              └───────────┘
//! ```

pub mod api;
pub mod command;
pub mod config;
pub mod db;
pub mod drive;
pub mod error;
pub mod llm;
pub mod session;
pub mod stt;
pub mod voice;

pub use command::{Command, interpret, normalize};
pub use config::Config;
pub use db::{DbConn, DbPool};
pub use error::{Error, Result};
pub use session::{AudioSource, ControlLoop, LoopOptions, SessionState, SessionStatus, Teardown};
