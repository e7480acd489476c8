// ABOUTME: Document tools: create, update, and suggest improvements for artifacts
// ABOUTME: Content is generated via auxiliary completion calls and persisted per user
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

use super::{required_str, ChatTool, ToolContext};
use crate::errors::{AppError, AppResult};
use crate::llm::{prompts, CompletionRequest, ProviderMessage};
use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

/// Generate a document body via one auxiliary completion call
async fn generate_content(ctx: &ToolContext, prompt: String) -> AppResult<String> {
    let request = CompletionRequest::new(vec![ProviderMessage::user(prompt)])
        .with_model(ctx.auxiliary_model.clone());
    Ok(ctx.provider.complete(&request).await?.content)
}

/// Create a new document from a title and kind
pub struct CreateDocumentTool;

#[async_trait]
impl ChatTool for CreateDocumentTool {
    fn name(&self) -> &'static str {
        "create_document"
    }

    fn description(&self) -> &'static str {
        "Create a document for substantial standalone content such as essays or code"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "kind": { "type": "string", "enum": ["text", "code"] }
            },
            "required": ["title", "kind"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> AppResult<Value> {
        let title = required_str(args, "title")?;
        let kind = required_str(args, "kind")?;
        if kind != "text" && kind != "code" {
            return Err(AppError::invalid_input(format!("Unknown document kind: {kind}")));
        }

        let content = generate_content(ctx, prompts::document_prompt(title, kind)).await?;
        let id = Uuid::new_v4().to_string();
        let document = ctx
            .store
            .create_document(&id, &ctx.user_id, title, kind, &content)
            .await?;

        Ok(json!({
            "id": document.id,
            "title": document.title,
            "kind": document.kind,
            "content": document.content,
        }))
    }
}

/// Rewrite an existing document per an instruction
pub struct UpdateDocumentTool;

#[async_trait]
impl ChatTool for UpdateDocumentTool {
    fn name(&self) -> &'static str {
        "update_document"
    }

    fn description(&self) -> &'static str {
        "Update an existing document according to a change description"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string" },
                "description": { "type": "string" }
            },
            "required": ["id", "description"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> AppResult<Value> {
        let id = required_str(args, "id")?;
        let description = required_str(args, "description")?;

        let document = ctx
            .store
            .get_document(id, &ctx.user_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Document {id}")))?;

        let content = generate_content(
            ctx,
            prompts::update_document_prompt(&document.content, description),
        )
        .await?;
        ctx.store
            .update_document_content(id, &ctx.user_id, &content)
            .await?;

        Ok(json!({
            "id": id,
            "title": document.title,
            "kind": document.kind,
            "content": content,
        }))
    }
}

/// Ask the auxiliary model for improvement suggestions on a document
pub struct RequestSuggestionsTool;

#[async_trait]
impl ChatTool for RequestSuggestionsTool {
    fn name(&self) -> &'static str {
        "request_suggestions"
    }

    fn description(&self) -> &'static str {
        "Request writing improvement suggestions for an existing document"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "document_id": { "type": "string" }
            },
            "required": ["document_id"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> AppResult<Value> {
        let document_id = required_str(args, "document_id")?;

        let document = ctx
            .store
            .get_document(document_id, &ctx.user_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Document {document_id}")))?;

        let prompt = format!(
            "Give at most five concrete suggestions to improve the following \
             document. One short sentence each.\n\n{}",
            document.content
        );
        let suggestions = generate_content(ctx, prompt).await?;

        Ok(json!({
            "id": document_id,
            "suggestions": suggestions,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ChatStore;
    use crate::errors::ErrorCode;
    use crate::llm::{
        CompletionChunk, CompletionProvider, CompletionResponse, CompletionStream,
    };
    use std::sync::Arc;

    /// Provider returning a fixed body for every completion
    struct FixedProvider(&'static str);

    #[async_trait]
    impl CompletionProvider for FixedProvider {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn default_model(&self) -> &str {
            "chat-model"
        }

        async fn complete(
            &self,
            _request: &CompletionRequest,
        ) -> Result<CompletionResponse, AppError> {
            Ok(CompletionResponse {
                content: self.0.to_owned(),
                usage: None,
                finish_reason: Some("stop".to_owned()),
            })
        }

        async fn complete_stream(
            &self,
            _request: &CompletionRequest,
        ) -> Result<CompletionStream, AppError> {
            Ok(Box::pin(tokio_stream::iter(vec![Ok(
                CompletionChunk::Finish {
                    reason: Some("stop".to_owned()),
                    usage: None,
                },
            )])))
        }
    }

    async fn test_ctx(content: &'static str) -> ToolContext {
        ToolContext {
            store: ChatStore::connect("sqlite::memory:").await.unwrap(),
            provider: Arc::new(FixedProvider(content)),
            auxiliary_model: "chat-model".to_owned(),
            user_id: "u1".to_owned(),
        }
    }

    #[tokio::test]
    async fn create_document_persists_generated_content() {
        let ctx = test_ctx("generated body").await;
        let tool = CreateDocumentTool;

        let output = tool
            .execute(&json!({ "title": "Essay", "kind": "text" }), &ctx)
            .await
            .unwrap();

        let id = output["id"].as_str().unwrap();
        let stored = ctx.store.get_document(id, "u1").await.unwrap().unwrap();
        assert_eq!(stored.content, "generated body");
        assert_eq!(stored.kind, "text");
    }

    #[tokio::test]
    async fn update_rejects_documents_of_other_users() {
        let ctx = test_ctx("revised").await;
        ctx.store
            .create_document("d1", "someone-else", "T", "text", "body")
            .await
            .unwrap();
        let tool = UpdateDocumentTool;

        let err = tool
            .execute(&json!({ "id": "d1", "description": "shorter" }), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ResourceNotFound);
    }

    #[tokio::test]
    async fn update_replaces_content() {
        let ctx = test_ctx("revised").await;
        ctx.store
            .create_document("d1", "u1", "T", "text", "body")
            .await
            .unwrap();
        let tool = UpdateDocumentTool;

        tool.execute(&json!({ "id": "d1", "description": "shorter" }), &ctx)
            .await
            .unwrap();

        let stored = ctx.store.get_document("d1", "u1").await.unwrap().unwrap();
        assert_eq!(stored.content, "revised");
    }

    #[tokio::test]
    async fn invalid_kind_is_rejected() {
        let ctx = test_ctx("x").await;
        let tool = CreateDocumentTool;

        let err = tool
            .execute(&json!({ "title": "Essay", "kind": "video" }), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }
}
