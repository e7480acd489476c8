// ABOUTME: System and auxiliary prompt assembly for chat turns
// ABOUTME: Parameterized by model choice and coarse request geolocation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Rill Project

use crate::models::GeoHints;
use std::fmt::Write;

/// Base behavioral prompt shared by all models
const BASE_PROMPT: &str =
    "You are a friendly assistant. Keep your responses concise and helpful.";

/// Tool-usage guidance appended for models that may call tools
const TOOLS_PROMPT: &str = "\
You have access to tools for checking the weather, searching the web, and \
creating or updating documents. Use a document when producing substantial \
standalone content (essays, code, long lists) the user may want to keep; \
answer inline otherwise. After creating or updating a document, do not repeat \
its full content in the reply.";

/// Instruction prefixed to extracted PDF text when inlining an attachment
const PDF_SUMMARY_INSTRUCTION: &str =
    "The user attached a document. Use its content below to inform your answer.";

/// Build the system prompt for a chat turn.
///
/// Reasoning variants answer from context only, so the tool guidance is
/// omitted for them alongside the empty tool set.
#[must_use]
pub fn system_prompt(reasoning_model: bool, hints: &GeoHints) -> String {
    let mut prompt = String::from(BASE_PROMPT);
    if !reasoning_model {
        prompt.push_str("\n\n");
        prompt.push_str(TOOLS_PROMPT);
    }
    if !hints.is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(&request_hints_prompt(hints));
    }
    prompt
}

/// Localization block describing where the request originated
fn request_hints_prompt(hints: &GeoHints) -> String {
    let mut block = String::from("About the origin of the user's request:\n");
    if let Some(city) = &hints.city {
        let _ = writeln!(block, "- city: {city}");
    }
    if let Some(country) = &hints.country {
        let _ = writeln!(block, "- country: {country}");
    }
    if let (Some(lat), Some(lon)) = (hints.latitude, hints.longitude) {
        let _ = writeln!(block, "- latitude: {lat}\n- longitude: {lon}");
    }
    block.trim_end().to_owned()
}

/// Prompt for the one-shot title generation call
#[must_use]
pub fn title_prompt() -> &'static str {
    "Generate a short title summarizing the user's first message. At most 80 \
     characters, no quotes, no colons, plain text only."
}

/// Wrap extracted PDF text as a synthetic text part
#[must_use]
pub fn pdf_attachment_text(name: Option<&str>, extracted: &str) -> String {
    let label = name.unwrap_or("attachment.pdf");
    format!("{PDF_SUMMARY_INSTRUCTION}\n\n[{label}]\n{extracted}")
}

/// Prompt for generating a fresh document body
#[must_use]
pub fn document_prompt(title: &str, kind: &str) -> String {
    match kind {
        "code" => format!(
            "Write a self-contained code snippet for: {title}. Output only the \
             code, no surrounding prose."
        ),
        _ => format!(
            "Write about the given topic in Markdown. Use headings where they \
             help. Topic: {title}"
        ),
    }
}

/// Prompt for revising an existing document body
#[must_use]
pub fn update_document_prompt(current: &str, description: &str) -> String {
    format!(
        "Improve the following document based on this instruction: \
         {description}\n\n{current}"
    )
}
