use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use super::classifier::TERMINATION_TOKEN;
use super::code_blocks::extract_code_blocks;
use super::transcript::{Message, Transcript};
use crate::executor::CodeExecutor;
use crate::llm::provider::{AssistantInput, LlmError, LlmProvider, LlmTokenUsageTotals};

/// Executor reply used when the solver's message holds no code.
pub const DEFAULT_AUTO_REPLY: &str = "";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    AwaitingSolver,
    AwaitingExecutor,
    TerminatedByToken,
    TerminatedByCap,
}

impl ConversationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::TerminatedByToken | Self::TerminatedByCap)
    }
}

/// Next state once the solver has replied with `content`, given how many
/// times the executor has already auto-replied.
pub fn after_solver_reply(content: &str, auto_replies: usize, cap: usize) -> ConversationState {
    if content.contains(TERMINATION_TOKEN) {
        ConversationState::TerminatedByToken
    } else if auto_replies >= cap {
        ConversationState::TerminatedByCap
    } else {
        ConversationState::AwaitingExecutor
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationEvent {
    SolverReplied {
        round: usize,
        code_blocks: usize,
        terminated: bool,
    },
    ExecutorReplied {
        round: usize,
        exit_code: Option<i32>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationOutcome {
    pub transcript: Transcript,
    pub final_state: ConversationState,
    pub usage: LlmTokenUsageTotals,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationErrorKind {
    RateLimited,
    Service,
}

/// A model-service failure, carrying whatever was exchanged before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationError {
    pub kind: ConversationErrorKind,
    pub message: String,
    pub transcript: Transcript,
    pub usage: LlmTokenUsageTotals,
}

impl Display for ConversationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "conversation {} stopped after {} messages: {}",
            self.transcript.conversation_id,
            self.transcript.messages.len(),
            self.message
        )
    }
}

impl Error for ConversationError {}

/// One bounded solver/executor exchange. Drivers are single use.
pub struct ConversationDriver<P, E> {
    conversation_id: String,
    provider: P,
    executor: E,
    system_prompt: Arc<str>,
    max_auto_replies: usize,
}

impl<P: LlmProvider, E: CodeExecutor> ConversationDriver<P, E> {
    pub fn new(
        conversation_id: impl Into<String>,
        provider: P,
        executor: E,
        system_prompt: Arc<str>,
        max_auto_replies: usize,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            provider,
            executor,
            system_prompt,
            max_auto_replies,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub async fn run<F: FnMut(ConversationEvent) + Send>(
        self,
        question: &str,
        on_event: &mut F,
    ) -> Result<ConversationOutcome, ConversationError> {
        let mut transcript = Transcript::new(self.conversation_id.clone());
        transcript.push(Message::user(question));

        let mut usage = LlmTokenUsageTotals::default();
        let mut state = ConversationState::AwaitingSolver;
        let mut auto_replies = 0usize;
        let mut round = 0usize;

        while !state.is_terminal() {
            state = match state {
                ConversationState::AwaitingSolver => {
                    round += 1;
                    let reply = self
                        .provider
                        .generate(AssistantInput {
                            system_instruction: Some(self.system_prompt.to_string()),
                            messages: transcript.messages.clone(),
                        })
                        .await;

                    let output = match reply {
                        Ok(output) => output,
                        Err(err) => return Err(conversation_error(err, transcript, usage)),
                    };
                    usage.add(output.usage);

                    let next = after_solver_reply(&output.text, auto_replies, self.max_auto_replies);
                    on_event(ConversationEvent::SolverReplied {
                        round,
                        code_blocks: extract_code_blocks(&output.text).len(),
                        terminated: next.is_terminal(),
                    });
                    transcript.push(Message::assistant(output.text));
                    next
                }
                ConversationState::AwaitingExecutor => {
                    let blocks = transcript
                        .last_assistant()
                        .map(|message| extract_code_blocks(&message.content))
                        .unwrap_or_default();

                    let (reply, exit_code) = if blocks.is_empty() {
                        (DEFAULT_AUTO_REPLY.to_string(), None)
                    } else {
                        let report = self.executor.execute(&blocks).await;
                        (report.to_message(), Some(report.exit_code))
                    };

                    auto_replies += 1;
                    on_event(ConversationEvent::ExecutorReplied { round, exit_code });
                    transcript.push(Message::user(reply));
                    ConversationState::AwaitingSolver
                }
                terminal => terminal,
            };
        }

        Ok(ConversationOutcome {
            transcript,
            final_state: state,
            usage,
        })
    }
}

fn conversation_error(
    err: LlmError,
    transcript: Transcript,
    usage: LlmTokenUsageTotals,
) -> ConversationError {
    let kind = if err.is_rate_limited() {
        ConversationErrorKind::RateLimited
    } else {
        ConversationErrorKind::Service
    };
    ConversationError {
        kind,
        message: err.to_string(),
        transcript,
        usage,
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::test_doubles::{FakeExecutor, FakeProvider};
    use super::{
        ConversationDriver, ConversationErrorKind, ConversationEvent, ConversationState,
        after_solver_reply,
    };
    use crate::agent::transcript::Role;
    use crate::llm::provider::LlmError;

    fn driver(provider: FakeProvider, executor: FakeExecutor) -> ConversationDriver<FakeProvider, FakeExecutor> {
        ConversationDriver::new("s-1", provider, executor, Arc::from("system prompt"), 3)
    }

    #[test]
    fn termination_token_wins_over_cap() {
        assert_eq!(
            after_solver_reply("done TERMINATE", 3, 3),
            ConversationState::TerminatedByToken
        );
        assert_eq!(
            after_solver_reply("more code", 3, 3),
            ConversationState::TerminatedByCap
        );
        assert_eq!(
            after_solver_reply("more code", 2, 3),
            ConversationState::AwaitingExecutor
        );
    }

    #[tokio::test]
    async fn run_executes_code_then_stops_on_termination_token() {
        let provider = FakeProvider::new(vec![
            Ok("```python\nprint(df.price.mean())\n```"),
            Ok("The mean is printed above. TERMINATE"),
        ]);
        let executor = FakeExecutor::new(vec![(0, "\nMean price is 9.5\n")]);
        let mut events = Vec::new();

        let outcome = driver(provider.clone(), executor.clone())
            .run("Average price?", &mut |event| events.push(event))
            .await
            .expect("outcome");

        assert_eq!(outcome.final_state, ConversationState::TerminatedByToken);
        let contents = outcome
            .transcript
            .messages
            .iter()
            .map(|message| (message.role, message.content.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            contents,
            vec![
                (Role::User, "Average price?"),
                (Role::Assistant, "```python\nprint(df.price.mean())\n```"),
                (
                    Role::User,
                    "exitcode: 0 (execution succeeded)\nCode output: \nMean price is 9.5\n"
                ),
                (Role::Assistant, "The mean is printed above. TERMINATE"),
            ]
        );
        assert_eq!(
            events,
            vec![
                ConversationEvent::SolverReplied {
                    round: 1,
                    code_blocks: 1,
                    terminated: false,
                },
                ConversationEvent::ExecutorReplied {
                    round: 1,
                    exit_code: Some(0),
                },
                ConversationEvent::SolverReplied {
                    round: 2,
                    code_blocks: 0,
                    terminated: true,
                },
            ]
        );
        assert_eq!(outcome.usage.requests, 2);
        assert_eq!(outcome.usage.total_tokens, 24);
    }

    #[tokio::test]
    async fn code_in_terminating_message_is_not_executed() {
        let provider = FakeProvider::new(vec![Ok("```python\nprint(1)\n```\nTERMINATE")]);
        let executor = FakeExecutor::new(vec![]);

        let outcome = driver(provider, executor.clone())
            .run("q", &mut |_| {})
            .await
            .expect("outcome");

        assert_eq!(outcome.final_state, ConversationState::TerminatedByToken);
        assert_eq!(outcome.transcript.messages.len(), 2);
        assert!(executor.seen_blocks.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn run_stops_after_three_auto_replies() {
        let provider = FakeProvider::new(vec![
            Ok("```python\nraise ValueError()\n```"),
            Ok("```python\nraise ValueError()\n```"),
            Ok("```python\nraise ValueError()\n```"),
            Ok("```python\nraise ValueError()\n```"),
        ]);
        let executor = FakeExecutor::new(vec![
            (1, "\nValueError"),
            (1, "\nValueError"),
            (1, "\nValueError"),
        ]);

        let outcome = driver(provider.clone(), executor.clone())
            .run("q", &mut |_| {})
            .await
            .expect("outcome");

        assert_eq!(outcome.final_state, ConversationState::TerminatedByCap);
        assert_eq!(outcome.transcript.messages.len(), 8);
        assert_eq!(executor.seen_blocks.lock().expect("lock").len(), 3);
        assert_eq!(provider.seen_inputs.lock().expect("lock").len(), 4);
        assert_eq!(
            outcome
                .transcript
                .messages
                .last()
                .map(|message| message.role),
            Some(Role::Assistant)
        );
    }

    #[tokio::test]
    async fn message_without_code_gets_empty_auto_reply() {
        let provider = FakeProvider::new(vec![Ok("Let me think."), Ok("TERMINATE")]);
        let executor = FakeExecutor::new(vec![]);
        let mut events = Vec::new();

        let outcome = driver(provider, executor)
            .run("q", &mut |event| events.push(event))
            .await
            .expect("outcome");

        assert_eq!(outcome.transcript.messages[2].role, Role::User);
        assert_eq!(outcome.transcript.messages[2].content, "");
        assert!(events.contains(&ConversationEvent::ExecutorReplied {
            round: 1,
            exit_code: None,
        }));
    }

    #[tokio::test]
    async fn every_request_carries_system_prompt_and_full_history() {
        let provider = FakeProvider::new(vec![Ok("```sh\necho hi\n```"), Ok("TERMINATE")]);
        let executor = FakeExecutor::new(vec![(0, "\nhi\n")]);

        driver(provider.clone(), executor)
            .run("q", &mut |_| {})
            .await
            .expect("outcome");

        let inputs = provider.seen_inputs.lock().expect("lock");
        assert_eq!(inputs.len(), 2);
        assert!(
            inputs
                .iter()
                .all(|input| input.system_instruction.as_deref() == Some("system prompt"))
        );
        assert_eq!(inputs[0].messages.len(), 1);
        assert_eq!(inputs[1].messages.len(), 3);
    }

    #[tokio::test]
    async fn rate_limit_returns_partial_transcript() {
        let provider = FakeProvider::new(vec![
            Ok("```python\nprint(len(df))\n```"),
            Err(LlmError::RateLimited {
                body: "Rate limit reached".to_string(),
            }),
        ]);
        let executor = FakeExecutor::new(vec![(0, "\nThere are 3 rows\n")]);

        let err = driver(provider, executor)
            .run("How many rows?", &mut |_| {})
            .await
            .expect_err("rate limited");

        assert_eq!(err.kind, ConversationErrorKind::RateLimited);
        assert_eq!(err.transcript.messages.len(), 3);
        assert!(err.to_string().contains("stopped after 3 messages"));
    }

    #[tokio::test]
    async fn other_failures_are_service_errors() {
        let provider = FakeProvider::new(vec![Err(LlmError::Timeout)]);
        let executor = FakeExecutor::new(vec![]);

        let err = driver(provider, executor)
            .run("q", &mut |_| {})
            .await
            .expect_err("service failure");

        assert_eq!(err.kind, ConversationErrorKind::Service);
        assert_eq!(err.transcript.messages.len(), 1);
    }
}
