//! Retry Policy
//!
//! Two-stage machine around the generation call. Only extraction failures
//! escalate to the next stage; transport failures propagate immediately.

use crate::core::cortex::{GenerationAdapter, GenerationParams, GenerationRequest};
use crate::core::normalizer::{AnalyzeResult, ResponseNormalizer};
use crate::core::prompt::{LENIENT_SYSTEM_INSTRUCTION, STRICT_SYSTEM_INSTRUCTION};
use crate::core::state::{CoachPolicy, TerminalBehavior};
use crate::error::CoachError;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Lenient,
    Strict,
}

impl Stage {
    pub fn system_instruction(self) -> &'static str {
        match self {
            Stage::Lenient => LENIENT_SYSTEM_INSTRUCTION,
            Stage::Strict => STRICT_SYSTEM_INSTRUCTION,
        }
    }

    /// `None` once the attempt bound is reached.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Lenient => Some(Stage::Strict),
            Stage::Strict => None,
        }
    }

    pub fn attempt(self) -> u8 {
        match self {
            Stage::Lenient => 1,
            Stage::Strict => 2,
        }
    }
}

pub struct RetryPolicy<'a> {
    policy: &'a CoachPolicy,
    params: GenerationParams,
}

impl<'a> RetryPolicy<'a> {
    pub fn new(policy: &'a CoachPolicy, params: GenerationParams) -> Self {
        Self { policy, params }
    }

    pub async fn invoke_with_retry(
        &self,
        prompt: &str,
        adapter: &dyn GenerationAdapter,
    ) -> Result<AnalyzeResult, CoachError> {
        let normalizer = ResponseNormalizer::new(self.policy);
        let mut stage = Stage::Lenient;

        loop {
            let request = GenerationRequest {
                prompt,
                system_instruction: Some(stage.system_instruction()),
                params: self.params,
            };
            let raw = adapter.generate(&request).await?;

            let failure = match normalizer.normalize(&raw) {
                Ok(result) => {
                    info!(attempt = stage.attempt(), "model output normalized");
                    return Ok(result);
                }
                Err(e) => e,
            };

            match stage.next() {
                Some(next) => {
                    warn!(attempt = stage.attempt(), error = %failure, "retrying with strict JSON instruction");
                    stage = next;
                }
                None => return self.terminal(failure),
            }
        }
    }

    fn terminal(&self, failure: CoachError) -> Result<AnalyzeResult, CoachError> {
        match self.policy.terminal {
            TerminalBehavior::Degraded => {
                warn!(error = %failure, "both attempts unparseable, returning degraded result");
                Ok(AnalyzeResult::degraded())
            }
            TerminalBehavior::Fatal => {
                warn!(error = %failure, "both attempts unparseable");
                Err(failure)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies and records the system instruction of each call.
    pub(crate) struct ScriptedAdapter {
        replies: Mutex<VecDeque<Result<String, CoachError>>>,
        pub(crate) calls: Mutex<Vec<(String, Option<String>)>>,
    }

    impl ScriptedAdapter {
        pub(crate) fn new(replies: Vec<Result<String, CoachError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn texts(replies: &[&str]) -> Self {
            Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub(crate) fn instructions(&self) -> Vec<Option<String>> {
            self.calls.lock().unwrap().iter().map(|(_, s)| s.clone()).collect()
        }
    }

    #[async_trait]
    impl GenerationAdapter for ScriptedAdapter {
        async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, CoachError> {
            self.calls.lock().unwrap().push((
                request.prompt.to_string(),
                request.system_instruction.map(str::to_string),
            ));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(CoachError::Transport("script exhausted".into())))
        }
    }

    const GOOD: &str = r#"{"summary": "s", "root_causes": [], "suggested_prompt": "p", "alternatives": [], "confidence": 0.9}"#;

    fn params() -> GenerationParams {
        GenerationParams {
            temperature: 0.4,
            max_output_tokens: 512,
            json_response: true,
        }
    }

    fn fatal_policy() -> CoachPolicy {
        CoachPolicy {
            terminal: TerminalBehavior::Fatal,
            ..CoachPolicy::default()
        }
    }

    #[tokio::test]
    async fn test_first_attempt_success_makes_one_call() {
        let policy = CoachPolicy::default();
        let adapter = ScriptedAdapter::texts(&[GOOD]);
        let result = RetryPolicy::new(&policy, params())
            .invoke_with_retry("prompt", &adapter)
            .await
            .unwrap();
        assert_eq!(result.suggested_prompt, "p");
        assert_eq!(adapter.call_count(), 1);
        assert_eq!(
            adapter.instructions(),
            vec![Some(LENIENT_SYSTEM_INSTRUCTION.to_string())]
        );
    }

    #[tokio::test]
    async fn test_malformed_output_retries_once_with_strict_instruction() {
        let policy = CoachPolicy::default();
        let adapter = ScriptedAdapter::texts(&["not json at all", GOOD]);
        let result = RetryPolicy::new(&policy, params())
            .invoke_with_retry("prompt", &adapter)
            .await
            .unwrap();
        assert_eq!(result.summary, "s");
        assert_eq!(
            adapter.instructions(),
            vec![
                Some(LENIENT_SYSTEM_INSTRUCTION.to_string()),
                Some(STRICT_SYSTEM_INSTRUCTION.to_string()),
            ]
        );
        let calls = adapter.calls.lock().unwrap();
        assert!(calls.iter().all(|(prompt, _)| prompt == "prompt"));
    }

    #[tokio::test]
    async fn test_two_failures_degraded_policy() {
        let policy = CoachPolicy::default();
        let adapter = ScriptedAdapter::texts(&["", "still not json", GOOD]);
        let result = RetryPolicy::new(&policy, params())
            .invoke_with_retry("prompt", &adapter)
            .await
            .unwrap();
        assert_eq!(result, AnalyzeResult::degraded());
        assert_eq!(adapter.call_count(), 2);
    }

    #[tokio::test]
    async fn test_two_failures_fatal_policy() {
        let policy = fatal_policy();
        let adapter = ScriptedAdapter::texts(&["", "not json at all", GOOD]);
        let err = RetryPolicy::new(&policy, params())
            .invoke_with_retry("prompt", &adapter)
            .await
            .unwrap_err();
        assert!(err.is_extraction());
        assert_eq!(adapter.call_count(), 2);
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_retried() {
        let policy = fatal_policy();
        let adapter = ScriptedAdapter::new(vec![
            Err(CoachError::Transport("quota exceeded".into())),
            Ok(GOOD.to_string()),
        ]);
        let err = RetryPolicy::new(&policy, params())
            .invoke_with_retry("prompt", &adapter)
            .await
            .unwrap_err();
        assert!(matches!(err, CoachError::Transport(_)));
        assert_eq!(adapter.call_count(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_on_retry_propagates() {
        let policy = CoachPolicy::default();
        let adapter = ScriptedAdapter::new(vec![
            Ok("nope".to_string()),
            Err(CoachError::Transport("timeout".into())),
        ]);
        let err = RetryPolicy::new(&policy, params())
            .invoke_with_retry("prompt", &adapter)
            .await
            .unwrap_err();
        assert!(matches!(err, CoachError::Transport(_)));
    }

    #[test]
    fn test_stage_bound() {
        assert_eq!(Stage::Lenient.next(), Some(Stage::Strict));
        assert_eq!(Stage::Strict.next(), None);
    }
}
