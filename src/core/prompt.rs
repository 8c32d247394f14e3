//! Prompt Compiler
//!
//! Renders the fixed prompt-rewriter instruction document around a windowed
//! transcript. Compilation is a pure function of its inputs.

use crate::core::conversation::ConversationWindow;

/// Placeholder rendered for an absent or empty comment / hint.
pub const NONE_PLACEHOLDER: &str = "(none)";

/// Output keys the model is asked to produce, in schema order.
pub const OUTPUT_KEYS: [&str; 5] = [
    "summary",
    "root_causes",
    "suggested_prompt",
    "alternatives",
    "confidence",
];

/// System instruction for the first attempt.
pub const LENIENT_SYSTEM_INSTRUCTION: &str = "You rewrite disliked chat prompts. Return a JSON object with keys: \
summary (string), root_causes (array of strings), suggested_prompt (string), \
alternatives (array of strings), confidence (number between 0 and 1).";

/// System instruction for the single retry after unparseable output.
pub const STRICT_SYSTEM_INSTRUCTION: &str = "STRICT JSON ONLY. Respond with exactly one JSON object and nothing else: \
no markdown, no code fences, no commentary, no extra text before or after it. \
Required keys: summary (string), root_causes (array of strings), suggested_prompt (string), \
alternatives (array of strings), confidence (number between 0 and 1).";

const REWRITER_FRAMING: &str = r#"You are a PROMPT REWRITER for LLM chats.

You are given:
- A short conversation between a USER and an ASSISTANT.
- The USER's most recent message.
- An optional comment from the user explaining why they disliked the last answer.
- An optional hint about the task domain.

Your task:
1. Work out what the user actually wanted, focusing on the LAST user message.
2. Briefly diagnose why the last answer missed.
3. Write ONE self-contained prompt the user can send to the same assistant to get a much better answer."#;

const SUGGESTED_PROMPT_RULES: &str = r#"RULES FOR "suggested_prompt":
- Write it in the FIRST PERSON, as the user speaking directly to the assistant.
  - Address the assistant as "you".
  - Refer to the user as "I", "me" and "my".
- Never say "the user", "users", "the assistant", "previous discussion", "conversation above", "earlier answer" or mention the thumbs-down.
  - Say "how it helps me" rather than "how it helps the user".
- It MUST be SELF-CONTAINED and make sense to someone who never saw the conversation.
- It MUST directly ask for the deliverable (explanation, code, design, plan, ...).
- It MAY add clarifying constraints drawn from the context ("step-by-step", "in plain language", "with 3 concrete examples").
- Keep it clear, concise and specific.

BAD (never write these):
- "Based on the previous discussion, can you..."
- "Write a login page for the user..."
- "Explain to the user how Docker works."

GOOD (follow this style):
- "Explain Kubernetes pods to me in simple terms with a real-world analogy, and give me 3 concrete use cases."
- "Give me HTML/CSS for a simple login page with 3 modern UX improvements, and explain how each one helps me.""#;

/// Pure renderer for the analysis request.
pub struct PromptCompiler;

impl PromptCompiler {
    /// Assemble the instruction document. Identical inputs always produce
    /// byte-identical output.
    pub fn compile(
        window: &ConversationWindow<'_>,
        user_comment: Option<&str>,
        task_hint: Option<&str>,
    ) -> String {
        let schema = OUTPUT_KEYS
            .iter()
            .map(|key| format!("- \"{}\"", key))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"{framing}

{rules}

OUTPUT FORMAT:
Return STRICT JSON with exactly these keys:
{schema}

Full conversation:
{transcript}

Last user message (for focus):
{last_user}

User comment:
{comment}

Task hint:
{hint}"#,
            framing = REWRITER_FRAMING,
            rules = SUGGESTED_PROMPT_RULES,
            schema = schema,
            transcript = window.transcript(),
            last_user = window.last_user_content,
            comment = or_placeholder(user_comment),
            hint = or_placeholder(task_hint),
        )
    }
}

fn or_placeholder(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => NONE_PLACEHOLDER,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::conversation::{ChatMessage, UNKNOWN_LAST_USER};

    fn login_conversation() -> Vec<ChatMessage> {
        vec![
            ChatMessage::user("write me a login page"),
            ChatMessage::assistant("<code>"),
        ]
    }

    #[test]
    fn test_compile_is_deterministic() {
        let messages = login_conversation();
        let window = ConversationWindow::new(&messages, 4);
        let a = PromptCompiler::compile(&window, Some("too basic"), Some("frontend"));
        let b = PromptCompiler::compile(&window, Some("too basic"), Some("frontend"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_compile_renders_all_sections() {
        let messages = login_conversation();
        let window = ConversationWindow::new(&messages, 4);
        let prompt =
            PromptCompiler::compile(&window, Some("too basic, no styling"), Some("frontend"));

        assert!(prompt.starts_with("You are a PROMPT REWRITER"));
        assert!(prompt.contains("USER: write me a login page"));
        assert!(prompt.contains("ASSISTANT: <code>"));
        assert!(prompt.contains("Last user message (for focus):\nwrite me a login page"));
        assert!(prompt.contains("User comment:\ntoo basic, no styling"));
        assert!(prompt.ends_with("Task hint:\nfrontend"));
        for key in OUTPUT_KEYS {
            assert!(prompt.contains(&format!("- \"{}\"", key)));
        }
    }

    #[test]
    fn test_sections_appear_in_order() {
        let messages = login_conversation();
        let window = ConversationWindow::new(&messages, 4);
        let prompt = PromptCompiler::compile(&window, None, None);

        let positions: Vec<usize> = [
            "PROMPT REWRITER",
            "FIRST PERSON",
            "OUTPUT FORMAT",
            "Full conversation:",
            "Last user message",
            "User comment:",
            "Task hint:",
        ]
        .iter()
        .map(|marker| prompt.find(marker).unwrap())
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_empty_comment_and_hint_render_placeholder() {
        let messages = login_conversation();
        let window = ConversationWindow::new(&messages, 4);
        let absent = PromptCompiler::compile(&window, None, None);
        let empty = PromptCompiler::compile(&window, Some(""), Some(""));
        assert_eq!(absent, empty);
        assert!(absent.contains("User comment:\n(none)"));
        assert!(absent.contains("Task hint:\n(none)"));
    }

    #[test]
    fn test_empty_conversation_still_compiles() {
        let window = ConversationWindow::new(&[], 4);
        let prompt = PromptCompiler::compile(&window, None, None);
        assert!(prompt.contains(&format!("Last user message (for focus):\n{}", UNKNOWN_LAST_USER)));
        assert!(prompt.contains("Full conversation:\n\n"));
    }
}
