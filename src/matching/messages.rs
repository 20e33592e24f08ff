use serde::Deserialize;

/// Raw queue-notification payload.
///
/// Customer topics carry `status` (`WAITING`, `MATCHED`, ...) plus the
/// matched `customerId`; agent topics carry `type` (`MATCH_ASSIGNED`).
/// Both shapes arrive on the same channel, so every field is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueMessage {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(rename = "customerId")]
    pub customer_id: Option<String>,
    #[serde(rename = "roomName")]
    pub room_name: Option<String>,
    /// Identity this party should join the media room with
    pub identity: Option<String>,
    pub rank: Option<u32>,
}

impl QueueMessage {
    /// Whether this message is a terminal match for the subscribing party
    pub fn is_terminal_match(&self) -> bool {
        self.status.as_deref() == Some("MATCHED")
            || self.kind.as_deref() == Some("MATCH_ASSIGNED")
    }

    /// Whether this is a queue-position update
    pub fn is_rank_update(&self) -> bool {
        self.status.as_deref() == Some("WAITING") && self.rank.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn customer_matched_payload_parses() {
        let json = r#"{
            "status": "MATCHED",
            "customerId": "cust-1",
            "roomName": "r1",
            "identity": "cust-1"
        }"#;

        let msg: QueueMessage = serde_json::from_str(json).unwrap();
        assert!(msg.is_terminal_match());
        assert_eq!(msg.customer_id.as_deref(), Some("cust-1"));
        assert_eq!(msg.room_name.as_deref(), Some("r1"));
    }

    #[test]
    fn agent_assignment_payload_parses() {
        let json = r#"{"type": "MATCH_ASSIGNED", "roomName": "r2"}"#;

        let msg: QueueMessage = serde_json::from_str(json).unwrap();
        assert!(msg.is_terminal_match());
        assert!(msg.customer_id.is_none());
    }

    #[test]
    fn waiting_rank_payload_parses() {
        let json = r#"{"status": "WAITING", "rank": 4}"#;

        let msg: QueueMessage = serde_json::from_str(json).unwrap();
        assert!(!msg.is_terminal_match());
        assert!(msg.is_rank_update());
        assert_eq!(msg.rank, Some(4));
    }
}
