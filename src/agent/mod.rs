pub mod classifier;
pub mod code_blocks;
pub mod driver;
pub mod prompt;
pub mod transcript;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub use classifier::{ClassifiedResult, FALLBACK_MESSAGE, ResultKind};
pub use driver::{ConversationDriver, ConversationErrorKind, ConversationEvent};

use crate::config::{ExecutionConfig, ModelServiceConfig};
use crate::executor::{CodeExecutor, LocalCodeExecutor};
use crate::llm::provider::{LlmProvider, LlmTokenUsageTotals};
use classifier::{classify_transcript, salvage_text};
use transcript::Transcript;

/// Everything one question produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnsweredTurn {
    pub result: ClassifiedResult,
    pub transcript: Transcript,
    pub usage: LlmTokenUsageTotals,
    /// Internal failure detail for the trace. Never shown to the user.
    pub failure: Option<String>,
}

/// Builds a fresh driver, with its own executor and conversation id, for
/// every question of a session.
pub struct ConversationFactory<P> {
    provider: P,
    execution: ExecutionConfig,
    system_prompt: Arc<str>,
    max_auto_replies: usize,
    session_id: String,
    next_conversation: AtomicUsize,
}

impl<P: LlmProvider + Clone> ConversationFactory<P> {
    pub fn new(
        provider: P,
        model: &ModelServiceConfig,
        execution: ExecutionConfig,
        system_prompt: String,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            execution,
            system_prompt: Arc::from(system_prompt),
            max_auto_replies: model.max_auto_replies,
            session_id: session_id.into(),
            next_conversation: AtomicUsize::new(1),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn create(&self) -> ConversationDriver<P, LocalCodeExecutor> {
        let n = self.next_conversation.fetch_add(1, Ordering::Relaxed);
        ConversationDriver::new(
            format!("{}-{n}", self.session_id),
            self.provider.clone(),
            LocalCodeExecutor::new(&self.execution),
            Arc::clone(&self.system_prompt),
            self.max_auto_replies,
        )
    }
}

/// Runs one question to a single classified result. Model-service failures
/// never escape: a rate limit salvages what the partial transcript holds and
/// anything else becomes the fallback.
pub async fn answer_question<P, E, F>(
    driver: ConversationDriver<P, E>,
    question: &str,
    on_event: &mut F,
) -> AnsweredTurn
where
    P: LlmProvider,
    E: CodeExecutor,
    F: FnMut(ConversationEvent) + Send,
{
    match driver.run(question, on_event).await {
        Ok(outcome) => AnsweredTurn {
            result: classify_transcript(&outcome.transcript),
            transcript: outcome.transcript,
            usage: outcome.usage,
            failure: None,
        },
        Err(err) => {
            let result = match err.kind {
                ConversationErrorKind::RateLimited => {
                    salvage_text(&err.transcript).unwrap_or_else(ClassifiedResult::fallback)
                }
                ConversationErrorKind::Service => ClassifiedResult::fallback(),
            };
            let failure = err.to_string();
            AnsweredTurn {
                result,
                transcript: err.transcript,
                usage: err.usage,
                failure: Some(failure),
            }
        }
    }
}
