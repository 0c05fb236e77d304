//! Context Assembler (§4.3, C5): builds the model input from a system
//! prompt, optional injections, and working memory.

use kais_llm::LlmMessage;

const INJECTION_SEPARATOR: &str = "\n\n---\n\n";

/// Joins `systemPrompt` with any injections, separated by `\n\n---\n\n`
/// (§4.3). Bare `systemPrompt` when `injections` is empty or absent.
pub fn assemble_system_prompt(system_prompt: &str, injections: &[String]) -> String {
    if injections.is_empty() {
        system_prompt.to_string()
    } else {
        let mut parts = vec![system_prompt.to_string()];
        parts.extend(injections.iter().cloned());
        parts.join(INJECTION_SEPARATOR)
    }
}

/// The spec-literal assembler output: one `system` message followed by
/// `workingMemory` in order (§4.3). Used by tests and anywhere the flat
/// shape is wanted directly; the runtime itself passes the system string and
/// working memory to `Mind::think` separately (`ThinkRequest::system`).
pub fn assemble(system_prompt: &str, working_memory: &[LlmMessage], injections: &[String]) -> Vec<LlmMessage> {
    let system = LlmMessage { role: "system".to_string(), content: assemble_system_prompt(system_prompt, injections).into() };
    let mut messages = vec![system];
    messages.extend_from_slice(working_memory);
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use kais_llm::LlmContent;

    #[test]
    fn bare_system_prompt_when_no_injections() {
        let result = assemble_system_prompt("be helpful", &[]);
        assert_eq!(result, "be helpful");
    }

    #[test]
    fn injections_joined_with_separator() {
        let result = assemble_system_prompt("be helpful", &["fact one".to_string(), "fact two".to_string()]);
        assert_eq!(result, "be helpful\n\n---\n\nfact one\n\n---\n\nfact two");
    }

    #[test]
    fn assembled_messages_prefix_system_then_working_memory() {
        let memory = vec![LlmMessage { role: "user".to_string(), content: LlmContent::Text("hi".to_string()) }];
        let messages = assemble("be helpful", &memory, &[]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
    }
}
