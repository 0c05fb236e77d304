//! Message and tool-call types crossing the `Mind` boundary.

use serde::{Deserialize, Serialize};

/// A turn in the conversation handed to the Mind.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: LlmContent,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LlmContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl From<String> for LlmContent {
    fn from(s: String) -> Self {
        LlmContent::Text(s)
    }
}

impl From<&str> for LlmContent {
    fn from(s: &str) -> Self {
        LlmContent::Text(s.to_string())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String, input: serde_json::Value },

    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmTool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Input to `Mind::think` (§4.4 step 2).
#[derive(Clone, Debug, Default, Serialize)]
pub struct ThinkRequest {
    pub messages: Vec<LlmMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<LlmTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// `input_tokens + output_tokens`, carried as its own field (rather than
    /// computed by a reader) so it serializes under the `totalTokens` key
    /// §6's event-consumer aggregation and §3's `CellStatus.totalTokens`
    /// both read.
    #[serde(rename = "totalTokens")]
    pub total_tokens: u32,
    /// Estimated dollar cost of this call, deducted from the budget tracker (§4.4 step 3).
    pub cost: f64,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32, cost: f64) -> Self {
        Self { input_tokens, output_tokens, total_tokens: input_tokens + output_tokens, cost }
    }
}

/// Output of `Mind::think`.
#[derive(Clone, Debug)]
pub struct ThinkResult {
    pub content: Vec<ContentBlock>,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

impl ThinkResult {
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Clone, Debug)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_new_sums_tokens() {
        let usage = Usage::new(10, 5, 0.01);
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn usage_serializes_total_tokens_camel_case() {
        let value = serde_json::to_value(Usage::new(10, 5, 0.01)).unwrap();
        assert_eq!(value.get("totalTokens").and_then(|v| v.as_u64()), Some(15));
    }
}
