//! Minimal local-model `Mind` backed by an Ollama `/api/chat` endpoint
//! (§6 "Agent process environment" — `OLLAMA_URL`). This is the one
//! concrete provider the control plane ships: enough to make `kais-cell`
//! runnable end to end without pulling in a cloud provider SDK, which
//! stays out of scope per §1.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::mind::{Mind, MindError, MindResult};
use crate::types::{ContentBlock, LlmContent, StopReason, ThinkRequest, ThinkResult, ToolCall, Usage};

pub struct OllamaMind {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaMind {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into(), model: model.into() }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[async_trait::async_trait]
impl Mind for OllamaMind {
    fn name(&self) -> &str {
        "ollama"
    }

    fn models(&self) -> &[&str] {
        &["llama3", "mistral", "qwen"]
    }

    async fn think(&self, request: ThinkRequest) -> MindResult<ThinkResult> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(ChatMessage { role: "system".to_string(), content: system.clone() });
        }
        for message in &request.messages {
            let content = match &message.content {
                LlmContent::Text(text) => text.clone(),
                LlmContent::Blocks(blocks) => blocks
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::Text { text } => Some(text.clone()),
                        ContentBlock::ToolResult { content, .. } => Some(content.clone()),
                        ContentBlock::ToolUse { .. } => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n"),
            };
            messages.push(ChatMessage { role: message.role.clone(), content });
        }

        let options = request.temperature.map(|t| json!({ "temperature": t }));
        let body = ChatRequest { model: &self.model, messages, stream: false, options };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url.trim_end_matches('/')))
            .json(&body)
            .send()
            .await
            .map_err(|e| MindError::RequestFailed(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(MindError::RateLimited { retry_after_ms: 1000 });
        }
        if !response.status().is_success() {
            return Err(MindError::RequestFailed(format!("ollama returned {}", response.status())));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| MindError::InvalidResponse(e.to_string()))?;

        Ok(ThinkResult {
            content: vec![ContentBlock::Text { text: parsed.message.content }],
            tool_calls: Vec::<ToolCall>::new(),
            stop_reason: StopReason::EndTurn,
            usage: Usage::new(parsed.prompt_eval_count, parsed.eval_count, 0.0),
        })
    }
}
