use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::stream::StreamExt;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::messages::QueueMessage;

/// The one party a channel is subscribed for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Party {
    Customer(String),
    Agent(String),
}

impl Party {
    pub fn id(&self) -> &str {
        match self {
            Party::Customer(id) | Party::Agent(id) => id,
        }
    }

    /// Per-party subject on the matching bus
    pub fn topic(&self) -> String {
        match self {
            Party::Customer(id) => format!("queue-rank.{}", id),
            Party::Agent(id) => format!("counselor.{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Matched,
    Assigned,
}

/// A terminal match notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchEvent {
    pub kind: MatchKind,
    /// Subject id carried by the payload (customer topics only)
    pub subject_id: Option<String>,
    pub room_name: String,
    /// Identity this party joins the media room with
    pub identity: Option<String>,
}

/// Notices delivered to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchNotice {
    Matched(MatchEvent),
    RankUpdate(u32),
}

/// Accept/reject logic for one subscription epoch.
///
/// Kept free of the transport so the dedup and party-filter rules are
/// testable without a broker. The `consumed` flag is shared with the
/// owning channel, which resets it when an epoch ends.
pub struct MatchGate {
    party_id: String,
    consumed: Arc<AtomicBool>,
}

impl MatchGate {
    pub fn new(party_id: impl Into<String>, consumed: Arc<AtomicBool>) -> Self {
        Self {
            party_id: party_id.into(),
            consumed,
        }
    }

    /// Classify a raw payload. Returns the notice to deliver, or None when
    /// the message is a duplicate, addressed to another party, malformed,
    /// or simply uninteresting.
    pub fn accept(&self, payload: &[u8]) -> Option<MatchNotice> {
        let msg: QueueMessage = match serde_json::from_slice(payload) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Failed to parse matching message: {}", e);
                return None;
            }
        };

        if msg.is_terminal_match() {
            if self.consumed.load(Ordering::SeqCst) {
                warn!("Duplicate match message ignored (already matched this epoch)");
                return None;
            }

            // Cross-party delivery guard: a payload that names a customer
            // must name us.
            if let Some(subject) = &msg.customer_id {
                if subject != &self.party_id {
                    warn!(
                        "Match message for another party ignored (mine: {}, theirs: {})",
                        self.party_id, subject
                    );
                    return None;
                }
            }

            let Some(room_name) = msg.room_name.clone() else {
                warn!("Match message without room name ignored");
                return None;
            };

            let kind = if msg.status.as_deref() == Some("MATCHED") {
                MatchKind::Matched
            } else {
                MatchKind::Assigned
            };

            self.consumed.store(true, Ordering::SeqCst);

            return Some(MatchNotice::Matched(MatchEvent {
                kind,
                subject_id: msg.customer_id,
                room_name,
                identity: msg.identity,
            }));
        }

        if msg.is_rank_update() {
            return Some(MatchNotice::RankUpdate(msg.rank.unwrap_or(0)));
        }

        debug!("Ignoring matching message with status {:?}", msg.status);
        None
    }
}

/// Reconnecting pub/sub client delivering match events for exactly one
/// party. Duplicate terminal matches within one subscription epoch are
/// discarded; the underlying client's reconnect-with-backoff governs
/// transport recovery.
pub struct MatchChannel {
    nats_url: String,
    party: Party,
    notices: mpsc::Sender<MatchNotice>,
    consumed: Arc<AtomicBool>,
    subscriber_task: Mutex<Option<JoinHandle<()>>>,
}

impl MatchChannel {
    pub fn new(
        nats_url: impl Into<String>,
        party: Party,
        notices: mpsc::Sender<MatchNotice>,
    ) -> Self {
        Self {
            nats_url: nats_url.into(),
            party,
            notices,
            consumed: Arc::new(AtomicBool::new(false)),
            subscriber_task: Mutex::new(None),
        }
    }

    pub fn party(&self) -> &Party {
        &self.party
    }

    /// Open a fresh subscription epoch.
    ///
    /// Any previous subscription is cleared first and the duplicate-match
    /// guard is reset, so calling `connect` repeatedly is safe.
    pub async fn connect(&self) -> Result<()> {
        self.teardown().await;
        self.consumed.store(false, Ordering::SeqCst);

        info!("Connecting to matching bus at {}", self.nats_url);

        let client = async_nats::connect(&self.nats_url)
            .await
            .context("Failed to connect to matching bus")?;

        let topic = self.party.topic();
        let mut subscriber = client
            .subscribe(topic.clone())
            .await
            .context("Failed to subscribe to matching topic")?;

        info!("Subscribed to {}", topic);

        let gate = MatchGate::new(self.party.id(), Arc::clone(&self.consumed));
        let notices = self.notices.clone();

        let task = tokio::spawn(async move {
            // Keep the client alive for the duration of the subscription
            let _client = client;

            while let Some(message) = subscriber.next().await {
                if let Some(notice) = gate.accept(&message.payload) {
                    if notices.send(notice).await.is_err() {
                        debug!("Notice receiver dropped; ending subscription");
                        break;
                    }
                }
            }

            info!("Matching subscription ended");
        });

        *self.subscriber_task.lock().await = Some(task);
        Ok(())
    }

    /// Close the current epoch. Safe to call when already disconnected.
    pub async fn disconnect(&self) {
        self.teardown().await;
        self.consumed.store(false, Ordering::SeqCst);
        info!("Matching channel disconnected");
    }

    async fn teardown(&self) {
        if let Some(task) = self.subscriber_task.lock().await.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(party_id: &str) -> MatchGate {
        MatchGate::new(party_id, Arc::new(AtomicBool::new(false)))
    }

    #[test]
    fn first_match_is_accepted_and_consumes_epoch() {
        let gate = gate("cust-1");
        let payload =
            br#"{"status":"MATCHED","customerId":"cust-1","roomName":"r1","identity":"cust-1"}"#;

        let notice = gate.accept(payload).unwrap();
        match notice {
            MatchNotice::Matched(event) => {
                assert_eq!(event.kind, MatchKind::Matched);
                assert_eq!(event.room_name, "r1");
                assert_eq!(event.identity.as_deref(), Some("cust-1"));
            }
            other => panic!("unexpected notice: {:?}", other),
        }
    }

    #[test]
    fn duplicate_match_in_same_epoch_is_discarded() {
        let gate = gate("cust-1");
        let payload =
            br#"{"status":"MATCHED","customerId":"cust-1","roomName":"r1","identity":"cust-1"}"#;

        assert!(gate.accept(payload).is_some());
        assert!(gate.accept(payload).is_none());
        assert!(gate.accept(payload).is_none());
    }

    #[test]
    fn match_for_another_party_is_discarded() {
        let gate = gate("cust-1");
        let payload =
            br#"{"status":"MATCHED","customerId":"cust-2","roomName":"r1","identity":"cust-2"}"#;

        assert!(gate.accept(payload).is_none());
        // The epoch is still open for our own match.
        let mine =
            br#"{"status":"MATCHED","customerId":"cust-1","roomName":"r1","identity":"cust-1"}"#;
        assert!(gate.accept(mine).is_some());
    }

    #[test]
    fn agent_assignment_without_subject_id_is_accepted() {
        let gate = gate("agent-7");
        let payload = br#"{"type":"MATCH_ASSIGNED","roomName":"r2"}"#;

        let notice = gate.accept(payload).unwrap();
        match notice {
            MatchNotice::Matched(event) => {
                assert_eq!(event.kind, MatchKind::Assigned);
                assert_eq!(event.room_name, "r2");
            }
            other => panic!("unexpected notice: {:?}", other),
        }
    }

    #[test]
    fn rank_updates_never_consume_the_epoch() {
        let gate = gate("cust-1");

        assert_eq!(
            gate.accept(br#"{"status":"WAITING","rank":3}"#),
            Some(MatchNotice::RankUpdate(3))
        );
        assert_eq!(
            gate.accept(br#"{"status":"WAITING","rank":2}"#),
            Some(MatchNotice::RankUpdate(2))
        );

        // A match is still deliverable afterwards.
        let payload =
            br#"{"status":"MATCHED","customerId":"cust-1","roomName":"r1","identity":"cust-1"}"#;
        assert!(gate.accept(payload).is_some());
    }

    #[test]
    fn malformed_payload_is_discarded() {
        let gate = gate("cust-1");
        assert!(gate.accept(b"not json").is_none());
        assert!(gate.accept(br#"{"status":"MATCHED"}"#).is_none()); // no room
    }

    #[test]
    fn epoch_reset_allows_a_new_match() {
        let consumed = Arc::new(AtomicBool::new(false));
        let gate = MatchGate::new("cust-1", Arc::clone(&consumed));
        let payload =
            br#"{"status":"MATCHED","customerId":"cust-1","roomName":"r1","identity":"cust-1"}"#;

        assert!(gate.accept(payload).is_some());
        assert!(gate.accept(payload).is_none());

        // disconnect()/connect() clears the flag for the next epoch
        consumed.store(false, Ordering::SeqCst);
        assert!(gate.accept(payload).is_some());
    }

    #[test]
    fn party_topics() {
        assert_eq!(
            Party::Customer("cust-1".into()).topic(),
            "queue-rank.cust-1"
        );
        assert_eq!(Party::Agent("agent-7".into()).topic(), "counselor.agent-7");
    }
}
