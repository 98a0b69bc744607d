use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{error, info, warn};
use wabroker_debounce::{Turn, TurnSubmitter};
use wabroker_store::types::StoreEvent;

use crate::in_flight::InFlightSet;
use crate::worker::{run_turn, WorkerContext};

/// How long `submit` will wait for queue space before rejecting the Turn
/// outright (spec §4.4: "if the block exceeds a threshold the oldest
/// waiting Turn is rejected"). Short enough that an ingress-adjacent caller
/// (the Debouncer's flush watcher) never stalls for long.
const BACKPRESSURE_BLOCK: Duration = Duration::from_millis(500);

/// How long a worker that lost the single-flight race waits before
/// re-offering a requeued Turn, giving the conversation's current owner a
/// chance to finish (spec §5: "prove this holds even under dispatcher-queue
/// retries").
const REQUEUE_BACKOFF: Duration = Duration::from_millis(50);

/// Fixed-size pool of workers consuming Turns from a bounded FIFO channel
/// (spec §4.4). Single-flight-per-conversation is enforced by requeuing a
/// Turn whose key is already being worked rather than allowing two workers
/// to process the same conversation concurrently.
pub struct WorkerPool {
    tx: mpsc::Sender<Turn>,
    capacity: usize,
    in_flight: Arc<InFlightSet>,
    busy_workers: Arc<AtomicUsize>,
    rejected_count: Arc<AtomicU64>,
    store: Arc<wabroker_store::Store>,
}

/// Point-in-time health snapshot (spec §4.4: "queue_depth, busy_workers,
/// rejected_count").
#[derive(Debug, Clone, Copy)]
pub struct PoolHealth {
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub busy_workers: usize,
    pub rejected_count: u64,
}

impl WorkerPool {
    /// Spawns `worker_count` tasks draining a channel of size `queue_capacity`.
    ///
    /// `in_flight` must be the same instance the Debouncer was built with
    /// (wired in as its `InFlightGuard`) — this pool is the only writer, the
    /// Debouncer only ever reads it, but both need to see the same state.
    pub fn spawn(
        worker_count: usize,
        queue_capacity: usize,
        in_flight: Arc<InFlightSet>,
        ctx: WorkerContext,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let rx = Arc::new(AsyncMutex::new(rx));
        let busy_workers = Arc::new(AtomicUsize::new(0));
        let rejected_count = Arc::new(AtomicU64::new(0));
        let store = ctx.store.clone();

        let pool = Arc::new(Self {
            tx: tx.clone(),
            capacity: queue_capacity,
            in_flight,
            busy_workers: busy_workers.clone(),
            rejected_count,
            store,
        });

        for worker_idx in 0..worker_count {
            let rx = rx.clone();
            let requeue_tx = tx.clone();
            let in_flight = pool.in_flight.clone();
            let busy_workers = busy_workers.clone();
            let ctx = ctx.clone();

            tokio::spawn(async move {
                info!(worker_idx, "dispatcher worker started");
                loop {
                    let turn = {
                        let mut rx = rx.lock().await;
                        match rx.recv().await {
                            Some(turn) => turn,
                            None => break,
                        }
                    };

                    let key = turn.conversation_key();
                    if !in_flight.try_acquire(key) {
                        warn!(%key, "conversation already in flight, requeuing turn");
                        tokio::time::sleep(REQUEUE_BACKOFF).await;
                        if requeue_tx.send(turn).await.is_err() {
                            error!(%key, "pool channel closed while requeuing turn");
                        }
                        continue;
                    }

                    busy_workers.fetch_add(1, Ordering::SeqCst);
                    if let Err(err) = run_turn(&ctx, turn).await {
                        warn!(%err, worker_idx, "turn processing failed");
                    }
                    in_flight.release(key);
                    busy_workers.fetch_sub(1, Ordering::SeqCst);
                }
                info!(worker_idx, "dispatcher worker stopped");
            });
        }

        pool
    }

    pub fn health(&self) -> PoolHealth {
        PoolHealth {
            queue_depth: self.capacity.saturating_sub(self.tx.capacity()),
            queue_capacity: self.capacity,
            busy_workers: self.busy_workers.load(Ordering::SeqCst),
            rejected_count: self.rejected_count.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl TurnSubmitter for WorkerPool {
    /// Tries to enqueue within `BACKPRESSURE_BLOCK`; past that the Turn is
    /// rejected with a broadcast `queue_full` event and no customer reply
    /// (spec §8 boundary behavior — the queue-full path never writes a
    /// templated transcript message).
    async fn submit(&self, turn: Turn) {
        let tenant_id = turn.tenant_id;
        match self.tx.try_send(turn) {
            Ok(()) => return,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("dispatcher pool channel closed, dropping turn");
                return;
            }
            Err(mpsc::error::TrySendError::Full(turn)) => {
                match tokio::time::timeout(BACKPRESSURE_BLOCK, self.tx.send(turn)).await {
                    Ok(Ok(())) => return,
                    Ok(Err(_)) => {
                        error!("dispatcher pool channel closed, dropping turn");
                    }
                    Err(_) => {
                        self.rejected_count.fetch_add(1, Ordering::SeqCst);
                        warn!(%tenant_id, "dispatcher queue full, rejecting turn");
                        self.store.publish_event(StoreEvent::QueueFull { tenant_id });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wabroker_agent::{AgentRegistry, EchoAgent, ToolExecutor, UsageGuard};
    use wabroker_core::config::BrokerConfig;
    use wabroker_core::types::{AgentId, ChatbotId, ContactId, MessageType, TenantId, ThreadId};
    use wabroker_debounce::CoalescedMessage;
    use wabroker_store::Store;
    use wabroker_transport::TransportRegistry;

    use super::*;
    use crate::tenant_directory::TenantDirectory;

    async fn test_pool() -> (Arc<WorkerPool>, Arc<Store>) {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        wabroker_store::db::init_db(&conn).unwrap();
        let store = Arc::new(Store::new(conn));

        let mut config = BrokerConfig::default();
        config.transport.bsp_api_key = Some("key".into());
        config.tenants.push(wabroker_core::config::TenantBinding {
            sender_msisdn: "96179374241".into(),
            tenant_id: TenantId(1),
            chatbot_id: ChatbotId(1),
            agent_id: AgentId("ecla".into()),
            bsp_api_key: None,
            bsp_base_url: None,
            daily_outbound_cap: None,
            monthly_outbound_cap: None,
        });

        let transport = Arc::new(TransportRegistry::from_config_unprobed(&config).unwrap());
        let agents = Arc::new(AgentRegistry::new());
        agents.register(AgentId("ecla".into()), Arc::new(EchoAgent::new("ecla")));
        let usage = Arc::new(UsageGuard::new(store.clone()));
        let tools = Arc::new(ToolExecutor::new(transport.clone(), store.clone(), usage.clone()));
        let directory = Arc::new(TenantDirectory::from_config(&config));

        let ctx = WorkerContext {
            store: store.clone(),
            transport,
            agents,
            tools,
            usage,
            directory,
            agent_deadline: Duration::from_secs(5),
        };

        let in_flight = Arc::new(InFlightSet::new());
        (WorkerPool::spawn(2, 8, in_flight, ctx), store)
    }

    fn turn(tenant: i64, contact: i64, text: &str) -> Turn {
        let now = std::time::Instant::now();
        Turn {
            tenant_id: TenantId(tenant),
            chatbot_id: ChatbotId(1),
            contact_id: ContactId(contact),
            thread_id: ThreadId::for_contact(TenantId(tenant), ContactId(contact)),
            messages: vec![CoalescedMessage {
                provider_message_id: None,
                message_type: MessageType::Text,
                text: Some(text.to_string()),
                media_url: None,
            }],
            merged_text: text.to_string(),
            first_arrival: now,
            last_arrival: now,
            language_hint: None,
        }
    }

    #[tokio::test]
    async fn processes_a_turn_for_a_known_contact() {
        let (pool, store) = test_pool().await;
        let contact = store
            .get_or_create_contact(TenantId(1), ChatbotId(1), "9999".into(), None)
            .await
            .unwrap();

        pool.submit(turn(1, contact.contact_id.0, "hello")).await;

        // Give the spawned worker a moment to drain the channel.
        tokio::time::sleep(Duration::from_millis(200)).await;

        // EchoAgent always replies, so a successful run records one outbound
        // send against the tenant's usage counter.
        let usage = store.get_usage_today(TenantId(1)).await.unwrap();
        assert_eq!(usage.outbound_count, 1);
    }

    #[test]
    fn health_reports_configured_capacity() {
        let health = PoolHealth {
            queue_depth: 0,
            queue_capacity: 1024,
            busy_workers: 0,
            rejected_count: 0,
        };
        assert_eq!(health.queue_capacity, 1024);
    }
}
