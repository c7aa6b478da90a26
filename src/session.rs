//! Per-conversation turn orchestration.
//!
//! A [`ChatSession`] owns the running message list. Each [`ChatSession::ask`]
//! runs one sequential chain: strip the previous context message, retrieve
//! fresh context, call the chat model, then log the turn.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::chat::failure_reply;
use crate::context::{strip_system_messages, AssembledContext, ContextError};
use crate::models::ChatMessage;
use crate::pipeline::Pipeline;

/// What happened during one turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub reply: String,
    pub context: AssembledContext,
    /// `false` when the reply is a `"Error: ..."` placeholder.
    pub completed: bool,
    /// Whether the turn was written to conversation history.
    pub logged: bool,
}

pub struct ChatSession {
    pipeline: Arc<Pipeline>,
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self::with_messages(pipeline, Vec::new())
    }

    /// Resume from a transcript held by the caller.
    pub fn with_messages(pipeline: Arc<Pipeline>, messages: Vec<ChatMessage>) -> Self {
        Self { pipeline, messages }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<ChatMessage> {
        self.messages
    }

    /// Forget the transcript. Stored conversation history is kept.
    pub fn reset(&mut self) {
        self.messages.clear();
    }

    /// Run one turn for `input`.
    ///
    /// Only fails when `retrieval.fail_on_error` is set and retrieval fails;
    /// the transcript is left without the new user message in that case.
    pub async fn ask(&mut self, input: &str) -> Result<TurnOutcome, ContextError> {
        strip_system_messages(&mut self.messages);

        let context = self.pipeline.assembler().assemble(input).await?;
        if !context.is_empty() {
            self.messages
                .push(ChatMessage::system(context.context_text.clone()));
        }
        self.messages.push(ChatMessage::user(input));

        let (reply, completed) = match self.pipeline.chat().try_complete(&self.messages).await {
            Ok(text) => (text, true),
            Err(e) => {
                warn!(error = %e, "chat completion failed");
                (failure_reply(&e), false)
            }
        };
        self.messages.push(ChatMessage::assistant(reply.clone()));

        let logged = if completed {
            match self.pipeline.logger().log_turn(input, &reply).await {
                Ok(_) => true,
                Err(e) => {
                    warn!(error = %e, "failed to log conversation turn");
                    false
                }
            }
        } else {
            false
        };

        Ok(TurnOutcome {
            reply,
            context,
            completed,
            logged,
        })
    }
}
