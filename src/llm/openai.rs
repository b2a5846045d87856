use serde::{Deserialize, Serialize};

use super::provider::{
    AssistantInput, AssistantOutput, LlmError, LlmProvider, LlmResult, LlmTokenUsage,
};
use crate::agent::transcript::{Message, Role};
use crate::config::ModelServiceConfig;
use crate::http::client::HttpClient;

const MAX_ERROR_BODY_CHARS: usize = 400;

/// Chat-completions client for OpenAI and compatible servers.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: HttpClient,
    api_key: String,
    model: String,
    base_url: String,
    seed: u64,
    temperature: f32,
}

impl OpenAiProvider {
    pub fn new(client: HttpClient, config: &ModelServiceConfig) -> LlmResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|v| !v.trim().is_empty())
            .ok_or(LlmError::MissingApiKey)?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            seed: config.seed,
            temperature: config.temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn build_request<'a>(&'a self, input: &'a AssistantInput) -> ChatCompletionRequest<'a> {
        let mut messages = Vec::with_capacity(input.messages.len() + 1);
        if let Some(system) = &input.system_instruction {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.extend(input.messages.iter().map(chat_message));

        ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            seed: self.seed,
        }
    }

    fn extract_output(resp: ChatCompletionResponse) -> LlmResult<AssistantOutput> {
        let usage = resp.usage.map(Into::into).unwrap_or_default();
        let text = resp
            .choices
            .into_iter()
            .filter_map(|choice| choice.message.content)
            .find(|content| !content.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)?;

        Ok(AssistantOutput { text, usage })
    }
}

impl LlmProvider for OpenAiProvider {
    async fn generate(&self, input: AssistantInput) -> LlmResult<AssistantOutput> {
        let payload = self.build_request(&input);
        let resp = self
            .client
            .post_json(&self.endpoint(), Some(&self.api_key), &payload)
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Transport(err.to_string())
                }
            })?;

        if !resp.is_success() {
            let body = resp
                .body
                .chars()
                .take(MAX_ERROR_BODY_CHARS)
                .collect::<String>();
            return Err(match resp.status {
                429 => LlmError::RateLimited { body },
                status => LlmError::HttpStatus { status, body },
            });
        }

        let parsed = serde_json::from_str::<ChatCompletionResponse>(&resp.body)
            .map_err(|err| LlmError::Parse(err.to_string()))?;
        Self::extract_output(parsed)
    }
}

fn chat_message(message: &Message) -> ChatMessage<'_> {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    ChatMessage {
        role,
        content: &message.content,
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    seed: u64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(clippy::struct_field_names)]
struct ChatUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}

impl From<ChatUsage> for LlmTokenUsage {
    fn from(usage: ChatUsage) -> Self {
        Self {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}
