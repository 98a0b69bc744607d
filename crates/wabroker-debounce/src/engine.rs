use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, instrument};
use wabroker_core::types::ConversationKey;

use crate::types::{CoalescedMessage, IncomingPiece, InFlightGuard, Turn, TurnSubmitter};

/// How often a deferred (single-flight-blocked) conversation rechecks
/// whether the in-flight worker has finished (spec §4.4 deferral).
const SINGLE_FLIGHT_POLL: Duration = Duration::from_millis(200);

struct PendingTurn {
    tenant_id: wabroker_core::types::TenantId,
    chatbot_id: wabroker_core::types::ChatbotId,
    contact_id: wabroker_core::types::ContactId,
    thread_id: wabroker_core::types::ThreadId,
    messages: Vec<CoalescedMessage>,
    language_hint: Option<String>,
    first_arrival: Instant,
    last_arrival: Instant,
    deadline: Instant,
}

/// Per-conversation coalescing buffer. A conversation's buffer is keyed by
/// `(tenant_id, contact_id)` (spec §4.3) — coalescing never crosses tenants,
/// even when two tenants share a contact's phone number.
///
/// The map is sharded internally by `DashMap`, matching spec §5's
/// requirement that the debouncer state be "guarded by a lock per shard ...
/// to avoid a single global mutex."
pub struct Debouncer {
    pending: Arc<DashMap<ConversationKey, PendingTurn>>,
    submitter: Arc<dyn TurnSubmitter>,
    in_flight: Arc<dyn InFlightGuard>,
    debounce_window: Duration,
    max_coalesce_span: Duration,
}

impl Debouncer {
    /// `debounce_window` is clamped to `floor` (spec §9 open question:
    /// the source had two incompatible defaults; the floor exists so a
    /// misconfigured near-zero window still coalesces messages that land in
    /// the same tick rather than dispatching one Turn per message).
    pub fn new(
        debounce_window: Duration,
        max_coalesce_span: Duration,
        floor: Duration,
        submitter: Arc<dyn TurnSubmitter>,
        in_flight: Arc<dyn InFlightGuard>,
    ) -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            submitter,
            in_flight,
            debounce_window: debounce_window.max(floor),
            max_coalesce_span,
        }
    }

    /// Number of conversations currently buffering messages, awaiting flush.
    pub fn pending_conversations(&self) -> usize {
        self.pending.len()
    }

    /// Folds one freshly-arrived message into its conversation's buffer,
    /// creating the buffer (and its flush watcher) if this is the first
    /// message for the key.
    #[instrument(skip(self, piece), fields(tenant_id = piece.tenant_id.0, contact_id = piece.contact_id.0))]
    pub fn on_message(&self, piece: IncomingPiece) {
        let key = ConversationKey {
            tenant_id: piece.tenant_id,
            contact_id: piece.contact_id,
        };
        let now = Instant::now();
        let mut spawned = false;

        match self.pending.entry(key) {
            Entry::Vacant(v) => {
                let deadline = now + self.debounce_window;
                v.insert(PendingTurn {
                    tenant_id: piece.tenant_id,
                    chatbot_id: piece.chatbot_id,
                    contact_id: piece.contact_id,
                    thread_id: piece.thread_id,
                    messages: vec![piece.message],
                    language_hint: piece.language_hint,
                    first_arrival: now,
                    last_arrival: now,
                    deadline,
                });
                spawned = true;
            }
            Entry::Occupied(mut o) => {
                let entry = o.get_mut();
                entry.messages.push(piece.message);
                entry.last_arrival = now;
                if piece.language_hint.is_some() {
                    entry.language_hint = piece.language_hint;
                }
                // Extend the deadline, but never past the hard ceiling
                // measured from the first message (spec §4.3).
                let ceiling = entry.first_arrival + self.max_coalesce_span;
                entry.deadline = (now + self.debounce_window).min(ceiling);
            }
        }

        if spawned {
            self.spawn_watcher(key);
        }
    }

    fn spawn_watcher(&self, key: ConversationKey) {
        let pending = self.pending.clone();
        let submitter = self.submitter.clone();
        let in_flight = self.in_flight.clone();

        tokio::spawn(async move {
            loop {
                let sleep_for = {
                    // Hold the shard lock for the whole decision so a
                    // concurrent append can't be lost between "deadline
                    // passed" and removal.
                    match pending.entry(key) {
                        Entry::Vacant(_) => return,
                        Entry::Occupied(mut occ) => {
                            let now = Instant::now();
                            let deadline = occ.get().deadline;
                            if deadline > now {
                                Some(deadline - now)
                            } else if in_flight.is_in_flight(key) {
                                debug!(%key, "turn deferred: conversation still in flight");
                                occ.get_mut().deadline = now + SINGLE_FLIGHT_POLL;
                                Some(SINGLE_FLIGHT_POLL)
                            } else {
                                let pending_turn = occ.remove();
                                Self::dispatch(pending_turn, &submitter).await;
                                return;
                            }
                        }
                    }
                };

                if let Some(d) = sleep_for {
                    tokio::time::sleep(d).await;
                }
            }
        });
    }

    async fn dispatch(pending_turn: PendingTurn, submitter: &Arc<dyn TurnSubmitter>) {
        let merged_text = pending_turn
            .messages
            .iter()
            .filter_map(|m| m.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");
        let turn = Turn {
            tenant_id: pending_turn.tenant_id,
            chatbot_id: pending_turn.chatbot_id,
            contact_id: pending_turn.contact_id,
            thread_id: pending_turn.thread_id,
            messages: pending_turn.messages,
            merged_text,
            first_arrival: pending_turn.first_arrival,
            last_arrival: pending_turn.last_arrival,
            language_hint: pending_turn.language_hint,
        };
        submitter.submit(turn).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use wabroker_core::types::{ChatbotId, ContactId, MessageType, TenantId, ThreadId};

    struct NeverInFlight;
    impl InFlightGuard for NeverInFlight {
        fn is_in_flight(&self, _key: ConversationKey) -> bool {
            false
        }
    }

    struct AlwaysInFlight;
    impl InFlightGuard for AlwaysInFlight {
        fn is_in_flight(&self, _key: ConversationKey) -> bool {
            true
        }
    }

    struct ChannelSubmitter(mpsc::Sender<Turn>);

    #[async_trait]
    impl TurnSubmitter for ChannelSubmitter {
        async fn submit(&self, turn: Turn) {
            let _ = self.0.send(turn).await;
        }
    }

    fn channel_submitter() -> (Arc<dyn TurnSubmitter>, mpsc::Receiver<Turn>) {
        let (tx, rx) = mpsc::channel(8);
        (Arc::new(ChannelSubmitter(tx)), rx)
    }

    fn piece(tenant: i64, contact: i64, text: &str) -> IncomingPiece {
        IncomingPiece {
            tenant_id: TenantId(tenant),
            chatbot_id: ChatbotId(1),
            contact_id: ContactId(contact),
            thread_id: ThreadId::for_contact(TenantId(tenant), ContactId(contact)),
            message: CoalescedMessage {
                provider_message_id: None,
                message_type: MessageType::Text,
                text: Some(text.to_string()),
                media_url: None,
            },
            language_hint: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn coalesces_messages_within_window() {
        let (submitter, mut rx) = channel_submitter();
        let debouncer = Debouncer::new(
            Duration::from_millis(50),
            Duration::from_secs(10),
            Duration::from_millis(1),
            submitter,
            Arc::new(NeverInFlight),
        );

        debouncer.on_message(piece(1, 1, "hi"));
        tokio::time::advance(Duration::from_millis(10)).await;
        debouncer.on_message(piece(1, 1, "are you there"));
        tokio::time::advance(Duration::from_millis(10)).await;
        debouncer.on_message(piece(1, 1, "actually i want a refund"));

        let turn = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("turn dispatched")
            .expect("channel open");
        assert_eq!(turn.merged_text, "hi\nare you there\nactually i want a refund");
        assert_eq!(turn.messages.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_floor_merges_messages_one_ms_apart() {
        let (submitter, mut rx) = channel_submitter();
        let debouncer = Debouncer::new(
            Duration::from_millis(1),
            Duration::from_secs(10),
            Duration::from_millis(50),
            submitter,
            Arc::new(NeverInFlight),
        );

        debouncer.on_message(piece(1, 1, "a"));
        tokio::time::advance(Duration::from_millis(1)).await;
        debouncer.on_message(piece(1, 1, "b"));

        let turn = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("turn dispatched")
            .expect("channel open");
        assert_eq!(turn.messages.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_cross_tenants() {
        let (submitter, mut rx) = channel_submitter();
        let debouncer = Debouncer::new(
            Duration::from_millis(10),
            Duration::from_secs(10),
            Duration::from_millis(1),
            submitter,
            Arc::new(NeverInFlight),
        );

        debouncer.on_message(piece(1, 9999, "price?"));
        debouncer.on_message(piece(2, 9999, "shipping?"));

        let mut seen_tenants = vec![];
        for _ in 0..2 {
            let turn = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("turn dispatched")
                .expect("channel open");
            seen_tenants.push(turn.tenant_id);
        }
        seen_tenants.sort();
        assert_eq!(seen_tenants, vec![TenantId(1), TenantId(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_conversation_defers_dispatch() {
        let (submitter, mut rx) = channel_submitter();
        let debouncer = Debouncer::new(
            Duration::from_millis(10),
            Duration::from_secs(10),
            Duration::from_millis(1),
            submitter,
            Arc::new(AlwaysInFlight),
        );

        debouncer.on_message(piece(1, 1, "hello"));
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(debouncer.pending_conversations(), 1);
    }
}
