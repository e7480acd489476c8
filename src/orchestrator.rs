// ABOUTME: Completion orchestrator driving one chat turn end to end
// ABOUTME: Context assembly, bounded tool loop, event emission, batch persistence, usage
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

//! # Completion Orchestrator
//!
//! Drives a chat turn through its phases: validate, authorize, load context,
//! stream the completion, finalize. Everything up to and including persisting
//! the user message happens before the response stream opens, so those
//! failures surface as structured HTTP errors. Once streaming starts, errors
//! are reported as a single generic in-band `error` event and the detail is
//! only logged.
//!
//! The returned producer stream embodies the whole remaining turn: the model
//! invocation loop (at most [`MAX_TOOL_STEPS`] sequential tool steps), tool
//! execution, the batch write of assistant output, and usage recording. The
//! relay drives it in a detached tracked task, so finalization is reached
//! even when every client disconnects mid-turn.

use crate::attachments::AttachmentNormalizer;
use crate::config::{ServerConfig, MAX_TOOL_STEPS};
use crate::database::{ChatStore, MessageRecord, NewMessage};
use crate::errors::{AppError, AppResult};
use crate::llm::{
    prompts, CompletionChunk, CompletionProvider, CompletionRequest, ProviderMessage,
    ToolInvocation,
};
use crate::models::{GeoHints, IncomingMessage, MessagePart, MessageRole, Visibility};
use crate::relay::{ChatEvent, ProducerStream};
use crate::tools::{ToolContext, ToolRegistry};
use crate::usage;
use async_stream::stream;
use serde_json::json;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Maximum length of a derived chat title
const TITLE_MAX_CHARS: usize = 80;

/// Message shown to clients when the turn fails mid-stream
const GENERIC_STREAM_ERROR: &str = "Something went wrong while generating the response.";

/// Phase of a chat turn, logged as it advances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Validating,
    Authorizing,
    QuotaChecked,
    ContextLoaded,
    Streaming,
    Finalizing,
    Done,
    Failed,
}

impl TurnPhase {
    /// Label used in structured logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Authorizing => "authorizing",
            Self::QuotaChecked => "quota_checked",
            Self::ContextLoaded => "context_loaded",
            Self::Streaming => "streaming",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// Everything a turn needs from the HTTP request
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub chat_id: String,
    pub message: IncomingMessage,
    pub model: String,
    pub visibility: Visibility,
    pub hints: GeoHints,
}

/// A prepared turn: the stream handle plus the producer that performs it
pub struct PreparedTurn {
    /// Persisted stream handle for reconnect-and-resume
    pub stream_id: String,
    /// Producer the relay drives to completion
    pub producer: ProducerStream,
}

/// Orchestrates chat turns against the store, provider, and tool registry
pub struct ChatOrchestrator {
    store: ChatStore,
    provider: Arc<dyn CompletionProvider>,
    normalizer: Arc<AttachmentNormalizer>,
    tools: Arc<ToolRegistry>,
    config: Arc<ServerConfig>,
}

impl ChatOrchestrator {
    /// Create an orchestrator over the given collaborators
    #[must_use]
    pub fn new(
        store: ChatStore,
        provider: Arc<dyn CompletionProvider>,
        normalizer: Arc<AttachmentNormalizer>,
        tools: Arc<ToolRegistry>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            store,
            provider,
            normalizer,
            tools,
            config,
        }
    }

    /// Run the pre-stream phases of a turn and return its producer
    ///
    /// On return, the chat exists, the caller owns it, the user message is
    /// durably persisted, and the stream handle is recorded. Nothing has been
    /// sent to the provider yet.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` when the message is not a user message
    /// - `PermissionDenied` when the chat belongs to another user
    /// - `DatabaseError` when any pre-stream write fails
    pub async fn prepare_turn(
        &self,
        user_id: &str,
        request: TurnRequest,
    ) -> AppResult<PreparedTurn> {
        debug!(phase = TurnPhase::Validating.as_str(), chat_id = %request.chat_id, "Turn");
        if request.message.role != MessageRole::User {
            return Err(AppError::invalid_input("Message role must be 'user'"));
        }

        debug!(phase = TurnPhase::Authorizing.as_str(), chat_id = %request.chat_id, "Turn");
        let chat = match self.store.get_chat(&request.chat_id).await? {
            Some(chat) => {
                if chat.user_id != user_id {
                    return Err(AppError::forbidden("Chat belongs to another user"));
                }
                chat
            }
            None => {
                let title = self.derive_title(&request.message).await;
                self.store
                    .create_chat(&request.chat_id, user_id, &title, request.visibility)
                    .await?
            }
        };

        debug!(phase = TurnPhase::ContextLoaded.as_str(), chat_id = %chat.id, "Turn");
        let mut history = self.store.get_messages(&chat.id).await?;

        // The user message is durable before the provider is ever invoked
        let saved = self
            .store
            .save_messages(&[NewMessage {
                id: request.message.id.clone(),
                chat_id: chat.id.clone(),
                role: MessageRole::User,
                parts: request.message.parts.clone(),
            }])
            .await?;
        history.extend(saved);

        let stream_id = Uuid::new_v4().to_string();
        self.store.create_stream_id(&stream_id, &chat.id).await?;

        let producer = self.produce(user_id.to_owned(), request, history);
        Ok(PreparedTurn {
            stream_id,
            producer,
        })
    }

    /// One-shot title generation with a local fallback
    ///
    /// Not retried: a failed auxiliary call falls back to a truncated excerpt
    /// of the message text.
    async fn derive_title(&self, message: &IncomingMessage) -> String {
        let text = message.text();
        let request = CompletionRequest::new(vec![
            ProviderMessage::system(prompts::title_prompt()),
            ProviderMessage::user(text.clone()),
        ])
        .with_model(self.config.auxiliary_model.clone());

        match self.provider.complete(&request).await {
            Ok(response) if !response.content.trim().is_empty() => {
                truncate_title(response.content.trim())
            }
            Ok(_) => truncate_title(&text),
            Err(e) => {
                warn!(error = %e, "Title generation failed, using excerpt");
                truncate_title(&text)
            }
        }
    }

    /// Build the producer stream performing the model loop and finalization
    fn produce(
        &self,
        user_id: String,
        request: TurnRequest,
        history: Vec<MessageRecord>,
    ) -> ProducerStream {
        let store = self.store.clone();
        let provider = Arc::clone(&self.provider);
        let normalizer = Arc::clone(&self.normalizer);
        let tools = Arc::clone(&self.tools);
        let config = Arc::clone(&self.config);

        Box::pin(stream! {
            debug!(phase = TurnPhase::Streaming.as_str(), chat_id = %request.chat_id, "Turn");

            let reasoning = config.is_reasoning_model(&request.model);
            let definitions = if reasoning { Vec::new() } else { tools.definitions() };
            let tool_ctx = ToolContext {
                store: store.clone(),
                provider: Arc::clone(&provider),
                auxiliary_model: config.auxiliary_model.clone(),
                user_id: user_id.clone(),
            };

            let mut conversation = Vec::with_capacity(history.len() + 1);
            conversation.push(ProviderMessage::system(prompts::system_prompt(
                reasoning,
                &request.hints,
            )));
            conversation.extend(normalizer.normalize_history(&history).await);

            // Assistant output of the whole turn, in emission order
            let mut parts: Vec<MessagePart> = Vec::new();
            let mut usage_totals = usage::TokenCounts::default();
            let mut saw_usage = false;
            let mut failed = false;

            'steps: for step in 0..MAX_TOOL_STEPS {
                let completion_request = CompletionRequest::new(conversation.clone())
                    .with_model(request.model.clone())
                    .with_tools(definitions.clone());

                let mut chunks = match provider.complete_stream(&completion_request).await {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        error!(chat_id = %request.chat_id, step, error = %e, "Provider invocation failed");
                        yield ChatEvent::Error { message: GENERIC_STREAM_ERROR.to_owned() };
                        failed = true;
                        break 'steps;
                    }
                };

                let mut step_text = String::new();
                let mut step_calls: Vec<ToolInvocation> = Vec::new();
                let mut step_results: Vec<(String, serde_json::Value)> = Vec::new();

                while let Some(chunk) = chunks.next().await {
                    match chunk {
                        Ok(CompletionChunk::TextDelta(delta)) => {
                            step_text.push_str(&delta);
                            yield ChatEvent::TextDelta { delta };
                        }
                        Ok(CompletionChunk::ToolCalls(calls)) => {
                            for call in &calls {
                                parts.push(MessagePart::ToolCall {
                                    id: call.id.clone(),
                                    name: call.name.clone(),
                                    args: call.args.clone(),
                                });
                                yield ChatEvent::ToolCall {
                                    id: call.id.clone(),
                                    name: call.name.clone(),
                                    args: call.args.clone(),
                                };

                                let output = tools.execute(&call.name, &call.args, &tool_ctx).await;
                                parts.push(MessagePart::ToolResult {
                                    id: call.id.clone(),
                                    name: call.name.clone(),
                                    output: output.clone(),
                                });
                                yield ChatEvent::ToolResult {
                                    id: call.id.clone(),
                                    name: call.name.clone(),
                                    output: output.clone(),
                                };
                                step_results.push((call.id.clone(), output));
                            }
                            step_calls = calls;
                        }
                        Ok(CompletionChunk::Finish { reason, usage: raw }) => {
                            debug!(chat_id = %request.chat_id, step, ?reason, "Step finished");
                            if let Some(raw) = raw {
                                let counts = usage::extract_token_counts(Some(&raw));
                                usage_totals.prompt_tokens += counts.prompt_tokens;
                                usage_totals.completion_tokens += counts.completion_tokens;
                                usage_totals.total_tokens += counts.total_tokens;
                                saw_usage = true;
                            }
                        }
                        Err(e) => {
                            error!(chat_id = %request.chat_id, step, error = %e, "Stream failed mid-turn");
                            yield ChatEvent::Error { message: GENERIC_STREAM_ERROR.to_owned() };
                            failed = true;
                            break 'steps;
                        }
                    }
                }

                if !step_text.is_empty() {
                    parts.push(MessagePart::text(step_text.clone()));
                }

                if step_calls.is_empty() {
                    break 'steps;
                }

                // Feed tool results back as context for the next step
                conversation.push(ProviderMessage::assistant_tool_calls(step_text, step_calls));
                for (call_id, output) in step_results {
                    conversation.push(ProviderMessage::tool_result(call_id, output.to_string()));
                }
            }

            debug!(phase = TurnPhase::Finalizing.as_str(), chat_id = %request.chat_id, "Turn");

            // Assistant output is one batch write; a failed batch is reported
            // in-band since the HTTP status is long gone.
            if !parts.is_empty() {
                let batch = [NewMessage {
                    id: Uuid::new_v4().to_string(),
                    chat_id: request.chat_id.clone(),
                    role: MessageRole::Assistant,
                    parts,
                }];
                if let Err(e) = store.save_messages(&batch).await {
                    error!(chat_id = %request.chat_id, error = %e, "Failed to persist assistant output");
                    yield ChatEvent::Error { message: GENERIC_STREAM_ERROR.to_owned() };
                    failed = true;
                }
            }

            let raw_usage = saw_usage.then(|| json!({
                "prompt_tokens": usage_totals.prompt_tokens,
                "completion_tokens": usage_totals.completion_tokens,
                "total_tokens": usage_totals.total_tokens,
            }));
            usage::record_usage(&store, &user_id, &request.model, "chat", raw_usage.as_ref()).await;

            let phase = if failed { TurnPhase::Failed } else { TurnPhase::Done };
            info!(phase = phase.as_str(), chat_id = %request.chat_id, "Turn complete");
            yield ChatEvent::Finish;
        })
    }
}

/// Truncate a candidate title to the title budget on a character boundary
fn truncate_title(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return "New chat".to_owned();
    }
    match text.char_indices().nth(TITLE_MAX_CHARS) {
        Some((byte_pos, _)) => text[..byte_pos].to_owned(),
        None => text.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_truncates_to_budget() {
        let long = "x".repeat(200);
        assert_eq!(truncate_title(&long).chars().count(), TITLE_MAX_CHARS);
        assert_eq!(truncate_title("  hello  "), "hello");
        assert_eq!(truncate_title("   "), "New chat");
    }

    #[test]
    fn phases_have_stable_labels() {
        assert_eq!(TurnPhase::Streaming.as_str(), "streaming");
        assert_eq!(TurnPhase::Failed.as_str(), "failed");
    }
}
