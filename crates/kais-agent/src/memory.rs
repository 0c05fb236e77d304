//! Working Memory Manager (§4.3, C4): a bounded, append-only conversation
//! log with summarisation. Tool-use/tool-result pairs are never split across
//! the summarised/live boundary — the conservative choice the Open Questions
//! call for (§9).

use kais_llm::{ContentBlock, LlmContent, LlmMessage, Mind, ThinkRequest};

use kais_core::{Result, WorkingMemoryConfig};
use tokio::sync::RwLock;

/// Messages closest to the tail that always stay live, even once
/// `summarize_after` is reached. Exact windowing isn't specified by the
/// source (§9 Open Questions); six turns is enough room for the model to see
/// its own most recent tool call/result pair.
const KEEP_LIVE: usize = 6;

pub struct WorkingMemory {
    config: WorkingMemoryConfig,
    messages: RwLock<Vec<LlmMessage>>,
}

impl WorkingMemory {
    pub fn new(config: WorkingMemoryConfig) -> Self {
        Self { config, messages: RwLock::new(Vec::new()) }
    }

    pub async fn append_user(&self, content: impl Into<String>) {
        self.messages.write().await.push(LlmMessage { role: "user".to_string(), content: LlmContent::Text(content.into()) });
    }

    pub async fn append_assistant(&self, content: Vec<ContentBlock>) {
        self.messages.write().await.push(LlmMessage { role: "assistant".to_string(), content: LlmContent::Blocks(content) });
    }

    /// Appends every tool result from one turn as a single `tool` message —
    /// Anthropic-style providers require all results for a turn together.
    pub async fn append_tool_results(&self, results: Vec<ContentBlock>) {
        if results.is_empty() {
            return;
        }
        self.messages.write().await.push(LlmMessage { role: "tool".to_string(), content: LlmContent::Blocks(results) });
    }

    pub async fn snapshot(&self) -> Vec<LlmMessage> {
        self.messages.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Summarises everything before the live tail through `mind` once
    /// `summarize_after` is reached, then trims any remaining overflow past
    /// `max_messages` by dropping the oldest non-summary messages (§4.3).
    /// Returns `true` if a summarisation pass ran.
    pub async fn maybe_summarize(&self, mind: &dyn Mind) -> Result<bool> {
        let mut messages = self.messages.write().await;
        if messages.len() < self.config.summarize_after {
            return Ok(false);
        }

        let keep_live = KEEP_LIVE.min(messages.len());
        let split = adjust_split(&messages, messages.len() - keep_live);
        if split == 0 {
            return Ok(false);
        }

        let to_summarize = &messages[..split];
        let transcript = render_transcript(to_summarize);
        let request = ThinkRequest {
            messages: vec![LlmMessage { role: "user".to_string(), content: transcript.into() }],
            system: Some(
                "Summarise the following conversation excerpt into a single concise paragraph \
                 preserving any decisions, facts, and open tasks. Output only the summary."
                    .to_string(),
            ),
            tools: vec![],
            temperature: None,
            max_tokens: None,
        };
        let result = mind.think(request).await.map_err(|e| kais_core::Error::llm_error(mind.name(), e.to_string()))?;

        let summary = LlmMessage { role: "assistant".to_string(), content: LlmContent::Text(result.text()) };
        let mut retained: Vec<LlmMessage> = vec![summary];
        retained.extend_from_slice(&messages[split..]);
        *messages = retained;

        enforce_max_messages(&mut messages, self.config.max_messages);
        Ok(true)
    }
}

/// Nudges `split` earlier while it would separate a `tool_use` block from its
/// matching `tool_result` — keeping both sides together (§4.3 invariant).
fn adjust_split(messages: &[LlmMessage], mut split: usize) -> usize {
    while split > 0 && split < messages.len() && message_has_tool_use(&messages[split - 1]) {
        split -= 1;
    }
    split
}

fn message_has_tool_use(message: &LlmMessage) -> bool {
    matches!(&message.content, LlmContent::Blocks(blocks) if blocks.iter().any(|b| matches!(b, ContentBlock::ToolUse { .. })))
}

/// Drops the oldest non-summary message (index 1, since index 0 is the
/// summary produced above) until `messages` fits within `max_messages`.
fn enforce_max_messages(messages: &mut Vec<LlmMessage>, max_messages: usize) {
    while messages.len() > max_messages && messages.len() > 1 {
        messages.remove(1);
    }
}

fn render_transcript(messages: &[LlmMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            let text = match &m.content {
                LlmContent::Text(t) => t.clone(),
                LlmContent::Blocks(blocks) => blocks
                    .iter()
                    .map(|b| match b {
                        ContentBlock::Text { text } => text.clone(),
                        ContentBlock::ToolUse { name, .. } => format!("[called {name}]"),
                        ContentBlock::ToolResult { content, .. } => format!("[result: {content}]"),
                    })
                    .collect::<Vec<_>>()
                    .join(" "),
            };
            format!("{}: {}", m.role, text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kais_llm::{MindResult, StopReason, ThinkResult, Usage};

    struct FakeMind;

    #[async_trait]
    impl Mind for FakeMind {
        fn name(&self) -> &str {
            "fake"
        }
        fn models(&self) -> &[&str] {
            &["fake-model"]
        }
        async fn think(&self, _request: ThinkRequest) -> MindResult<ThinkResult> {
            Ok(ThinkResult { content: vec![ContentBlock::Text { text: "summary text".into() }], tool_calls: vec![], stop_reason: StopReason::EndTurn, usage: Usage::default() })
        }
    }

    #[tokio::test]
    async fn below_threshold_does_not_summarize() {
        let memory = WorkingMemory::new(WorkingMemoryConfig { max_messages: 50, summarize_after: 10 });
        for i in 0..5 {
            memory.append_user(format!("msg {i}")).await;
        }
        let ran = memory.maybe_summarize(&FakeMind).await.unwrap();
        assert!(!ran);
        assert_eq!(memory.len().await, 5);
    }

    #[tokio::test]
    async fn reaching_threshold_collapses_older_messages() {
        let memory = WorkingMemory::new(WorkingMemoryConfig { max_messages: 50, summarize_after: 10 });
        for i in 0..12 {
            memory.append_user(format!("msg {i}")).await;
        }
        let ran = memory.maybe_summarize(&FakeMind).await.unwrap();
        assert!(ran);
        let snapshot = memory.snapshot().await;
        // one summary message + KEEP_LIVE live messages
        assert_eq!(snapshot.len(), 1 + KEEP_LIVE);
        assert!(matches!(&snapshot[0].content, LlmContent::Text(t) if t == "summary text"));
    }

    #[tokio::test]
    async fn tool_use_and_result_pair_never_split() {
        let memory = WorkingMemory::new(WorkingMemoryConfig { max_messages: 50, summarize_after: 3 });
        memory.append_user("start").await;
        memory
            .append_assistant(vec![ContentBlock::ToolUse { id: "t1".into(), name: "bash".into(), input: serde_json::json!({}) }])
            .await;
        memory.append_tool_results(vec![ContentBlock::ToolResult { tool_use_id: "t1".into(), content: "ok".into(), is_error: None }]).await;
        memory.append_user("continue").await;

        let messages = memory.snapshot().await;
        let split = adjust_split(&messages, messages.len() - 1);
        // The tool_use message must not end up alone on the summarized side.
        assert!(split <= messages.len() - 2);
    }

    #[tokio::test]
    async fn trims_to_max_messages_after_summarizing() {
        let memory = WorkingMemory::new(WorkingMemoryConfig { max_messages: 4, summarize_after: 10 });
        for i in 0..12 {
            memory.append_user(format!("msg {i}")).await;
        }
        memory.maybe_summarize(&FakeMind).await.unwrap();
        assert!(memory.len().await <= 4);
    }
}
