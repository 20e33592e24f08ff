//! Call-session orchestration.
//!
//! One `CallController` per active call turns queue-matching notifications
//! into a managed media session with correct cleanup on every exit path.

pub mod controller;
pub mod session;

pub use controller::{CallController, CallError, CallHandlers};
pub use session::{
    CallState, Role, Session, AGENT_IDENTITY_PREFIX, PROFANITY_AUTO_TERMINATION_THRESHOLD,
};
