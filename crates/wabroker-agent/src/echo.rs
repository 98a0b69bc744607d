use async_trait::async_trait;
use tokio_stream::wrappers::ReceiverStream;
use wabroker_core::types::ThreadId;

use crate::agent::{Agent, AgentEventStream};
use crate::error::Result;
use crate::types::{AgentEvent, TurnContext};

/// Minimal built-in `Agent` that reflects the merged input back as its final
/// reply. Authoring real agent prompts and tool-calling logic is out of
/// scope for this crate (spec §1 Non-goals); this exists so the dispatcher
/// and registry have a concrete, runnable collaborator for tests and for a
/// deployment with no external agent wired up yet.
pub struct EchoAgent {
    agent_id: String,
}

impl EchoAgent {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self { agent_id: agent_id.into() }
    }
}

#[async_trait]
impl Agent for EchoAgent {
    fn name(&self) -> &str {
        &self.agent_id
    }

    async fn run(
        &self,
        _thread_id: &ThreadId,
        _ctx: &TurnContext,
        merged_input: &str,
    ) -> Result<AgentEventStream> {
        let (tx, rx) = tokio::sync::mpsc::channel(2);
        let reply = format!("you said: {merged_input}");
        let _ = tx
            .send(AgentEvent::Final { text: reply })
            .await;
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_stream::StreamExt;
    use wabroker_core::types::{ChatbotId, ContactId, TenantId};
    use wabroker_store::Store;
    use wabroker_transport::TransportRegistry;

    use super::*;
    use crate::tools::ToolExecutor;
    use crate::usage::UsageGuard;

    fn test_ctx() -> TurnContext {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        wabroker_store::db::init_db(&conn).unwrap();
        let store = Arc::new(Store::new(conn));
        let transport =
            Arc::new(TransportRegistry::from_config_unprobed(&wabroker_core::config::BrokerConfig::default()).unwrap());
        let usage = Arc::new(UsageGuard::new(store.clone()));
        TurnContext {
            tenant_id: TenantId(1),
            chatbot_id: ChatbotId(1),
            contact_id: ContactId(1),
            from_number: "96171234567".into(),
            language_hint: None,
            tools: Arc::new(ToolExecutor::new(transport, store, usage)),
        }
    }

    #[tokio::test]
    async fn reflects_merged_input_as_final_text() {
        let agent = EchoAgent::new("ecla");
        let ctx = test_ctx();
        let thread_id = ThreadId::for_contact(ctx.tenant_id, ctx.contact_id);
        let mut stream = agent.run(&thread_id, &ctx, "hello").await.unwrap();
        match stream.next().await {
            Some(AgentEvent::Final { text }) => assert_eq!(text, "you said: hello"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
