use std::pin::Pin;

use async_trait::async_trait;
use tokio_stream::Stream;
use wabroker_core::types::ThreadId;

use crate::error::Result;
use crate::types::{AgentEvent, TurnContext};

/// Stream of events produced by one `Agent::run` call. Boxed because
/// different agent implementations build it from different underlying
/// streams (channel receivers, HTTP SSE bodies, in-process generators).
pub type AgentEventStream = Pin<Box<dyn Stream<Item = AgentEvent> + Send>>;

/// The polymorphic collaborator the dispatcher hands each Turn to (spec
/// §4.5). Agents are stateful only through `thread_id` — any conversation
/// memory lives in the agent's own persistence layer, never in this crate.
/// The core never inspects agent prompts or tool-calling internals; it only
/// consumes this event stream and executes the tool calls the agent emits.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Identifies the agent implementation for logging, e.g. `"ecla"`.
    fn name(&self) -> &str;

    async fn run(
        &self,
        thread_id: &ThreadId,
        ctx: &TurnContext,
        merged_input: &str,
    ) -> Result<AgentEventStream>;
}
