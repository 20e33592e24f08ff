use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::matching::MatchEvent;

/// Incidents of abusive speech after which the call is terminated
pub const PROFANITY_AUTO_TERMINATION_THRESHOLD: u32 = 3;

/// Identity prefix agents join media rooms with
pub const AGENT_IDENTITY_PREFIX: &str = "counselor_";

/// Controller lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Idle,
    Waiting,
    Matched,
    Connecting,
    Connected,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Agent,
}

/// One call session, owned exclusively by its controller
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub session_id: String,
    pub role: Role,
    pub state: CallState,
    /// Match payload stored when the queue pairs this party
    pub matched: Option<MatchEvent>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub profanity_count: u32,
}

impl Session {
    pub fn new(role: Role) -> Self {
        Self {
            session_id: format!("call-{}", uuid::Uuid::new_v4()),
            role,
            state: CallState::Idle,
            matched: None,
            started_at: None,
            ended_at: None,
            error: None,
            profanity_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_idle() {
        let session = Session::new(Role::Customer);
        assert_eq!(session.state, CallState::Idle);
        assert!(session.matched.is_none());
        assert_eq!(session.profanity_count, 0);
    }

    #[test]
    fn call_state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&CallState::Waiting).unwrap(),
            "\"waiting\""
        );
        assert_eq!(serde_json::to_string(&Role::Agent).unwrap(), "\"agent\"");
    }
}
