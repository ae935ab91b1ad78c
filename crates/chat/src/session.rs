use agentry_agent::{Agent, AgentHandle, Components, TaskInstance, TaskValue};
use agentry_core::{ChatConfig, ChatMessage, DeliveryOp, InboundMessage, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::bridge::{ChatTransport, DeliveryBridge};
use crate::memory::ChatMemory;

/// Task type the session submits for every accepted inbound message.
pub const CHAT_TURN_TASK: &str = "chat_turn";

/// The payload a chat turn threads through its skill chain: the entity's
/// conversation snapshot plus the routing detail the continuation needs.
pub struct ChatValue {
    pub entity_id: String,
    pub chat_id: String,
    pub messages: Vec<ChatMessage>,
    pub pending_message_id: Option<String>,
}

impl ChatValue {
    /// The reply produced by the chain, if the last skill appended one.
    pub fn last_assistant_content(&self) -> Option<&str> {
        self.messages
            .last()
            .filter(|m| m.role == "assistant")
            .map(|m| m.content.as_str())
    }

    /// The most recent user message, which is what a reply skill answers.
    pub fn last_user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
    }

    pub fn append_assistant(&mut self, content: &str) {
        self.messages.push(ChatMessage::assistant(content));
    }
}

struct InFlight {
    entity_id: String,
    chat_id: String,
    pending_message_id: Option<String>,
}

struct SessionState {
    memory: Arc<ChatMemory>,
    bridge: DeliveryBridge,
    transport: Arc<dyn ChatTransport>,
    config: ChatConfig,
    /// Task id to routing info, so the failure path can still unlock and
    /// reply even though the value never reaches a continuation.
    in_flight: Mutex<HashMap<Uuid, InFlight>>,
}

/// Glue between a chat connection and the agent runtime. Enforces the
/// per-entity lock policy, seeds and records conversation memory, and routes
/// replies back through the delivery bridge.
pub struct ChatSession {
    agent: AgentHandle,
    state: Arc<SessionState>,
}

impl ChatSession {
    /// Finish assembling an agent into a chat session. Registers the shared
    /// memory and the delivery bridge as components, installs the
    /// failure-path handler, registers the `chat_turn` task over
    /// `turn_skills`, and builds the agent.
    ///
    /// The returned receiver must be drained by [`crate::run_delivery_loop`]
    /// on the loop that owns the connection.
    pub fn new(
        mut agent: Agent,
        transport: Arc<dyn ChatTransport>,
        config: ChatConfig,
        turn_skills: &[&str],
    ) -> Result<(Self, mpsc::UnboundedReceiver<DeliveryOp>)> {
        let (bridge, delivery_rx) = DeliveryBridge::channel();
        let memory = Arc::new(ChatMemory::new(config.history_limit));

        {
            let memory = memory.clone();
            agent.add_component_builder(move || Ok(memory.clone()));
        }
        {
            let bridge = bridge.clone();
            agent.add_component_builder(move || Ok(Arc::new(bridge.clone())));
        }

        let state = Arc::new(SessionState {
            memory,
            bridge,
            transport,
            config,
            in_flight: Mutex::new(HashMap::new()),
        });

        // Failed turns never reach the continuation, so unlocking and the
        // fallback reply happen here.
        let st = state.clone();
        agent.add_exception_handler(move |failure| {
            let record = st
                .in_flight
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&failure.task_id);
            if let Some(record) = record {
                warn!(
                    entity = %record.entity_id,
                    error = %failure.error,
                    "Chat turn failed, sending fallback reply"
                );
                st.memory.unlock(&record.entity_id);
                if let Some(pending) = &record.pending_message_id {
                    st.bridge.delete_message(&record.chat_id, pending);
                }
                st.bridge
                    .send_message(&record.chat_id, &st.config.fallback_reply);
            }
        });

        agent.register_task(CHAT_TURN_TASK, turn_skills)?;
        let handle = agent.build()?;

        Ok((
            Self {
                agent: handle,
                state,
            },
            delivery_rx,
        ))
    }

    pub fn agent(&self) -> &AgentHandle {
        &self.agent
    }

    pub fn memory(&self) -> &Arc<ChatMemory> {
        &self.state.memory
    }

    /// Handle one inbound message. Runs on the connection's own loop: a busy
    /// entity gets an immediate rejection, everything else is recorded,
    /// acknowledged with a pending message, locked, and submitted as a
    /// `chat_turn` task instance.
    pub async fn handle_inbound(&self, msg: &InboundMessage) -> Result<()> {
        let entity_id = msg.entity_key();
        let state = &self.state;

        if state.memory.is_locked(&entity_id) {
            debug!(entity = %entity_id, "Entity busy, rejecting request");
            state
                .transport
                .send_message(&msg.chat_id, &state.config.busy_reply)
                .await?;
            return Ok(());
        }

        if state.memory.get(&entity_id).is_none() {
            if let Some(prompt) = &state.config.system_prompt {
                state.memory.push_system(&entity_id, prompt)?;
            }
        }
        state.memory.push_user(&entity_id, &msg.content)?;
        let messages = state.memory.get(&entity_id).unwrap_or_default();

        let pending_id = state
            .transport
            .send_message(&msg.chat_id, &state.config.processing_reply)
            .await?;

        let value = ChatValue {
            entity_id: entity_id.clone(),
            chat_id: msg.chat_id.clone(),
            messages,
            pending_message_id: Some(pending_id.clone()),
        };
        let task = TaskInstance::new(CHAT_TURN_TASK, TaskValue::new(value));
        let task_id = task.id;
        let st = state.clone();
        let task = task.then(move |value, components: &Components<'_>| {
            complete_turn(&st, task_id, value, components);
        });

        state
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                task_id,
                InFlight {
                    entity_id: entity_id.clone(),
                    chat_id: msg.chat_id.clone(),
                    pending_message_id: Some(pending_id),
                },
            );
        state.memory.lock(&entity_id);

        if let Err(e) = self.agent.execute(task) {
            state.memory.unlock(&entity_id);
            state
                .in_flight
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&task_id);
            return Err(e);
        }
        Ok(())
    }
}

/// Completion continuation for a chat turn: unlock first, then delete the
/// pending message and deliver the reply (or the fallback) through the
/// bridge, recording the reply into memory.
fn complete_turn(
    state: &SessionState,
    task_id: Uuid,
    value: TaskValue,
    components: &Components<'_>,
) {
    let record = state
        .in_flight
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .remove(&task_id);
    if let Some(record) = &record {
        state.memory.unlock(&record.entity_id);
    }

    let chat = match value.take::<ChatValue>() {
        Ok(chat) => chat,
        Err(e) => {
            error!(error = %e, "Chat turn finished with an unexpected value type");
            return;
        }
    };
    let bridge = match components.resolve::<DeliveryBridge>() {
        Ok(bridge) => bridge,
        Err(e) => {
            error!(error = %e, "Delivery bridge component missing");
            return;
        }
    };

    if let Some(pending) = &chat.pending_message_id {
        bridge.delete_message(&chat.chat_id, pending);
    }

    match chat.last_assistant_content() {
        Some(reply) => {
            if let Err(e) = state.memory.push_assistant(&chat.entity_id, reply) {
                warn!(entity = %chat.entity_id, error = %e, "Failed to record assistant reply");
            }
            bridge.send_message(&chat.chat_id, reply);
        }
        None => {
            bridge.send_message(&chat.chat_id, &state.config.fallback_reply);
        }
    }
}
