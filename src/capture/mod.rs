//! Audio capture subsystem
//!
//! Owns the OS-level capture subprocess: platform command selection,
//! device probing, and the supervisor that restarts a crashed capture
//! process with exponential backoff.

pub mod command;
pub mod device;
pub mod supervisor;

pub use command::{capture_command, CaptureCommand, Platform};
pub use device::{check_capture_utilities, MacAudioDevice};
pub use supervisor::{CaptureSupervisor, SupervisorState};
