use crate::core::conversation::{ConversationInput, ConversationWindow};
use crate::core::cortex::{GenerationAdapter, GenerationParams};
use crate::core::normalizer::AnalyzeResult;
use crate::core::prompt::PromptCompiler;
use crate::core::retry::RetryPolicy;
use crate::core::state::CoachConfig;
use crate::error::CoachError;
use std::sync::Arc;
use tracing::info;

/// Entry point for `analyze_dislike`. Holds no per-request state, so one
/// instance can serve concurrent callers.
pub struct Coach {
    config: CoachConfig,
    adapter: Arc<dyn GenerationAdapter>,
}

impl Coach {
    pub fn new(config: CoachConfig, adapter: Arc<dyn GenerationAdapter>) -> Self {
        Self { config, adapter }
    }

    pub fn config(&self) -> &CoachConfig {
        &self.config
    }

    /// Window, compile and render the request without calling the model.
    pub fn compile(&self, input: &ConversationInput) -> String {
        compile_prompt(input, self.config.window_size)
    }

    pub async fn analyze_dislike(
        &self,
        input: &ConversationInput,
    ) -> Result<AnalyzeResult, CoachError> {
        let prompt = self.compile(input);
        info!(
            messages = input.messages.len(),
            window = self.config.window_size,
            has_comment = input.user_comment.as_deref().is_some_and(|c| !c.is_empty()),
            "analyzing disliked reply"
        );

        RetryPolicy::new(&self.config.policy, GenerationParams::from_config(&self.config))
            .invoke_with_retry(&prompt, self.adapter.as_ref())
            .await
    }
}

pub fn compile_prompt(input: &ConversationInput, window_size: usize) -> String {
    let window = ConversationWindow::new(&input.messages, window_size);
    PromptCompiler::compile(
        &window,
        input.user_comment.as_deref(),
        input.task_hint.as_deref(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::conversation::{ChatMessage, UNKNOWN_LAST_USER};
    use crate::core::retry::tests::ScriptedAdapter;
    use crate::core::state::{CoachPolicy, TerminalBehavior};

    fn coach(adapter: Arc<ScriptedAdapter>, config: CoachConfig) -> Coach {
        Coach::new(config, adapter)
    }

    fn login_input() -> ConversationInput {
        ConversationInput::new(vec![
            ChatMessage::user("write me a login page"),
            ChatMessage::assistant("<code>"),
        ])
        .with_comment("too basic, no styling")
        .with_hint("frontend")
    }

    #[tokio::test]
    async fn test_login_page_scenario() {
        let reply = r#"Here you go:
```json
{
  "summary": "Wants a polished, styled login page.",
  "root_causes": ["Answer had no CSS", "No UX considerations"],
  "suggested_prompt": "Give me HTML and CSS for a modern login page with 3 UX improvements, and explain how each one helps me.",
  "alternatives": ["Build me a responsive login form using Tailwind CSS."],
  "confidence": 0.85
}
```"#;
        let adapter = Arc::new(ScriptedAdapter::texts(&[reply]));
        let coach = coach(adapter.clone(), CoachConfig::default());
        let input = login_input();

        let prompt = coach.compile(&input);
        assert!(prompt.contains("USER: write me a login page"));
        assert!(prompt.contains("ASSISTANT: <code>"));
        assert!(prompt.contains("too basic, no styling"));
        assert!(prompt.contains("frontend"));

        let result = coach.analyze_dislike(&input).await.unwrap();
        assert!(!result.suggested_prompt.contains("the user"));
        assert!(!result.suggested_prompt.contains("the assistant"));
        assert_eq!(result.root_causes.len(), 2);
        assert_eq!(result.confidence, 0.85);

        let calls = adapter.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, prompt);
    }

    #[tokio::test]
    async fn test_empty_conversation_scenario() {
        let adapter = Arc::new(ScriptedAdapter::texts(&[r#"{"summary": ""}"#]));
        let coach = coach(adapter, CoachConfig::default());
        let input = ConversationInput::new(Vec::new());

        assert!(coach.compile(&input).contains(UNKNOWN_LAST_USER));
        let result = coach.analyze_dislike(&input).await.unwrap();
        assert_eq!(result.summary, "Unknown user goal.");
    }

    #[tokio::test]
    async fn test_window_size_bounds_the_transcript() {
        let messages: Vec<ChatMessage> = (0..10)
            .map(|i| ChatMessage::user(format!("turn-{:02}", i)))
            .collect();
        let config = CoachConfig {
            window_size: 3,
            ..CoachConfig::default()
        };
        let adapter = Arc::new(ScriptedAdapter::texts(&["{}"]));
        let coach = coach(adapter, config);
        let prompt = coach.compile(&ConversationInput::new(messages));
        assert!(!prompt.contains("turn-06"));
        assert!(prompt.contains("USER: turn-07\nUSER: turn-08\nUSER: turn-09"));
    }

    #[tokio::test]
    async fn test_unparseable_twice_resolves_to_configured_terminal() {
        let adapter = Arc::new(ScriptedAdapter::texts(&["", "not json at all"]));
        let result = coach(adapter.clone(), CoachConfig::default())
            .analyze_dislike(&login_input())
            .await
            .unwrap();
        assert_eq!(result, AnalyzeResult::degraded());
        assert_eq!(adapter.call_count(), 2);

        let config = CoachConfig {
            policy: CoachPolicy {
                terminal: TerminalBehavior::Fatal,
                ..CoachPolicy::default()
            },
            ..CoachConfig::default()
        };
        let adapter = Arc::new(ScriptedAdapter::texts(&["", "not json at all"]));
        let err = coach(adapter.clone(), config)
            .analyze_dislike(&login_input())
            .await
            .unwrap_err();
        assert!(err.is_extraction());
        assert_eq!(adapter.call_count(), 2);
    }
}
