use std::sync::Arc;
use std::time::Duration;

use tokio_stream::StreamExt;
use tracing::{debug, info, instrument, warn};
use wabroker_agent::{Agent, AgentEvent, AgentRegistry, ToolExecutor, TurnContext, UsageDecision, UsageGuard};
use wabroker_core::types::{MessageStatus, MessageType};
use wabroker_debounce::Turn;
use wabroker_store::types::{NewMessage, StoreEvent};
use wabroker_store::Store;
use wabroker_transport::TransportRegistry;

use crate::error::{DispatchError, Result};
use crate::tenant_directory::TenantDirectory;

/// Shared, cloneable handle to everything a worker needs to run a Turn (spec
/// §4.4). Built once at startup; every field is an `Arc` so cloning it per
/// worker task is cheap.
#[derive(Clone)]
pub struct WorkerContext {
    pub store: Arc<Store>,
    pub transport: Arc<TransportRegistry>,
    pub agents: Arc<AgentRegistry>,
    pub tools: Arc<ToolExecutor>,
    pub usage: Arc<UsageGuard>,
    pub directory: Arc<TenantDirectory>,
    pub agent_deadline: Duration,
}

/// Runs the Turn-processing algorithm (spec §4.4 steps 1-8) to completion.
///
/// Single-flight bookkeeping (acquiring and releasing the in-flight key) is
/// the caller's responsibility so it happens on every exit path uniformly,
/// including the ones that return early here.
#[instrument(skip(ctx, turn), fields(tenant_id = turn.tenant_id.0, contact_id = turn.contact_id.0))]
pub async fn run_turn(ctx: &WorkerContext, turn: Turn) -> Result<()> {
    // Step 1: look up the contact (already created at ingress, spec §5 "only
    // contact upsert runs inline on the hot path") and refresh its activity
    // timestamp.
    let contact = ctx
        .store
        .get_contact(turn.contact_id)
        .await?
        .ok_or(DispatchError::ContactNotFound(turn.contact_id.0))?;
    ctx.store.touch_last_interaction(turn.contact_id).await?;

    // Step 2: persist each originating record as its own incoming row, in
    // receipt order. A per-message Store error is logged and skipped (spec
    // §4.4 failure semantics: never block on persistence of the incoming
    // side once the BSP already has a 2xx from us).
    for message in &turn.messages {
        let new_message = NewMessage::incoming(
            turn.tenant_id,
            turn.chatbot_id,
            turn.contact_id,
            message.provider_message_id.clone(),
            message.message_type,
            message.text.clone(),
            message.media_url.clone(),
        );
        if let Err(err) = ctx.store.insert_incoming_message(new_message).await {
            warn!(%err, "failed to persist incoming message, continuing turn");
        }
    }

    // Step 3: pause gate.
    if contact.paused {
        debug!("turn skipped: contact paused");
        ctx.store.publish_event(StoreEvent::TurnSkippedPaused {
            tenant_id: turn.tenant_id,
            contact_id: turn.contact_id,
        });
        return Ok(());
    }

    // Step 4: usage pre-check (advisory; never blocks the incoming side).
    let (daily_cap, monthly_cap) = ctx.directory.outbound_caps(turn.tenant_id);
    let decision = ctx.usage.check(turn.tenant_id, daily_cap, monthly_cap).await?;
    if decision != UsageDecision::Allowed {
        info!(?decision, "turn rejected: quota reached");
        ctx.store.publish_event(StoreEvent::QuotaExceeded { tenant_id: turn.tenant_id });
        return Ok(());
    }

    // Step 5: resolve and invoke the Agent.
    let agent_id = ctx
        .directory
        .agent_id(turn.tenant_id)
        .ok_or(DispatchError::UnboundTenant(turn.tenant_id.0))?
        .clone();
    let agent = ctx.agents.get(&agent_id)?;

    let turn_ctx = TurnContext {
        tenant_id: turn.tenant_id,
        chatbot_id: turn.chatbot_id,
        contact_id: turn.contact_id,
        from_number: contact.phone_number.clone(),
        language_hint: turn.language_hint.clone(),
        tools: ctx.tools.clone(),
    };

    let run_future = agent.run(&turn.thread_id, &turn_ctx, &turn.merged_text);
    let stream_result = tokio::time::timeout(ctx.agent_deadline, run_future).await;
    let mut stream = match stream_result {
        Ok(Ok(stream)) => stream,
        Ok(Err(err)) => {
            write_internal_diagnostic(ctx, &turn, format!("agent invocation failed: {err}")).await?;
            return Err(DispatchError::Agent(err));
        }
        Err(_) => {
            write_internal_diagnostic(ctx, &turn, "agent invocation exceeded its deadline".into())
                .await?;
            return Err(DispatchError::AgentTimeout);
        }
    };

    // Step 6: drain the agent's event stream. Tool calls are executed by the
    // agent itself through `turn_ctx.tools` and already persisted their own
    // rows; the worker only needs the final customer-visible text.
    let mut final_text: Option<String> = None;
    let mut agent_failed: Option<String> = None;
    while let Some(event) = stream.next().await {
        match event {
            AgentEvent::TextChunk { .. } => {}
            AgentEvent::ToolCall { name, correlation_id, .. } => {
                debug!(tool = %name, %correlation_id, "agent invoked tool");
            }
            AgentEvent::ToolResult { correlation_id, .. } => {
                debug!(%correlation_id, "tool result delivered to agent");
            }
            AgentEvent::Final { text } => {
                final_text = Some(text);
            }
            AgentEvent::Error { kind, detail } => {
                agent_failed = Some(format!("{kind}: {detail}"));
            }
        }
    }

    if let Some(reason) = agent_failed {
        write_internal_diagnostic(ctx, &turn, format!("agent error: {reason}")).await?;
        return Err(DispatchError::Agent(wabroker_agent::AgentError::Provider(reason)));
    }

    let Some(final_text) = final_text else {
        write_internal_diagnostic(ctx, &turn, "agent produced no final reply".into()).await?;
        return Ok(());
    };

    // Step 7: send, persist, count, broadcast.
    send_and_persist_final(ctx, &turn, &contact.phone_number, final_text).await?;

    Ok(())
}

async fn send_and_persist_final(
    ctx: &WorkerContext,
    turn: &Turn,
    to_number: &str,
    text: String,
) -> Result<()> {
    let transport = ctx
        .transport
        .get(turn.tenant_id)
        .ok_or(DispatchError::NoTransport(turn.tenant_id.0))?;

    let mut new_message = NewMessage::outgoing(
        turn.tenant_id,
        turn.chatbot_id,
        turn.contact_id,
        MessageType::Text,
        Some(text.clone()),
        None,
    );

    match transport.send_text(to_number, &text).await {
        Ok(_) => {
            new_message.status = MessageStatus::Sent;
            ctx.store.insert_message(new_message).await?;
            ctx.usage.record_outbound(turn.tenant_id).await?;
        }
        Err(err) => {
            // Never silently drop: persist the failure and retried-out
            // state, never return a transport error that would make the
            // caller treat the whole turn as unprocessed (spec §4.4).
            warn!(%err, "final send failed after retries");
            new_message.status = MessageStatus::Failed;
            ctx.store.insert_message(new_message).await?;
        }
    }
    Ok(())
}

async fn write_internal_diagnostic(ctx: &WorkerContext, turn: &Turn, detail: String) -> Result<()> {
    let message = NewMessage::internal(
        turn.tenant_id,
        turn.chatbot_id,
        turn.contact_id,
        MessageType::Text,
        detail,
        serde_json::Value::Null,
    );
    ctx.store.insert_message(message).await?;
    Ok(())
}
