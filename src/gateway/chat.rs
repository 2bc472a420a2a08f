//! HTTP chat agents: OpenAI-style chat completions and Anthropic messages.

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::{AgentGateway, AgentRequest, GatewayFailure};
use crate::config::{AgentsConfig, ModelConfig, ProviderKind};
use crate::models::AgentIdentity;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_DEFAULT_MAX_TOKENS: u32 = 1000;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

/// Agent backed by a hosted chat model.
#[derive(Debug, Clone)]
pub struct ChatAgent {
    identity: AgentIdentity,
    kind: ProviderKind,
    endpoint: String,
    api_key: String,
    model: ModelConfig,
    client: reqwest::Client,
}

impl ChatAgent {
    pub fn new(
        identity: AgentIdentity,
        kind: ProviderKind,
        base_url: Option<&str>,
        api_key: String,
        model: ModelConfig,
        client: reqwest::Client,
    ) -> Self {
        let endpoint = match kind {
            ProviderKind::OpenAi => format!(
                "{}/chat/completions",
                base_url.unwrap_or(OPENAI_BASE_URL).trim_end_matches('/')
            ),
            ProviderKind::Anthropic => format!(
                "{}/v1/messages",
                base_url.unwrap_or(ANTHROPIC_BASE_URL).trim_end_matches('/')
            ),
        };
        Self {
            identity,
            kind,
            endpoint,
            api_key,
            model,
            client,
        }
    }

    /// Look up `identity` in the provider table and read its API key.
    pub fn from_config(
        identity: &AgentIdentity,
        config: &AgentsConfig,
        client: reqwest::Client,
    ) -> Result<Self, GatewayFailure> {
        let provider = config
            .providers
            .get(&identity.provider)
            .ok_or_else(|| GatewayFailure::UnknownAgent(identity.to_string()))?;
        let model = provider
            .models
            .get(&identity.model)
            .cloned()
            .ok_or_else(|| GatewayFailure::UnknownAgent(identity.to_string()))?;
        let api_key = std::env::var(&provider.api_key_env_var)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| GatewayFailure::MissingApiKey(provider.api_key_env_var.clone()))?;

        Ok(Self::new(
            identity.clone(),
            provider.kind,
            provider.base_url.as_deref(),
            api_key,
            model,
            client,
        ))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build(&self, request: &AgentRequest) -> reqwest::RequestBuilder {
        match self.kind {
            ProviderKind::OpenAi => {
                let body = CompletionRequest {
                    model: &self.model.name,
                    messages: vec![
                        ChatMessage {
                            role: "system",
                            content: request.system,
                        },
                        ChatMessage {
                            role: "user",
                            content: &request.prompt,
                        },
                    ],
                    temperature: self.model.temperature,
                    max_tokens: self.model.max_tokens,
                };
                self.client
                    .post(&self.endpoint)
                    .bearer_auth(&self.api_key)
                    .json(&body)
            }
            ProviderKind::Anthropic => {
                let body = MessagesRequest {
                    model: &self.model.name,
                    system: request.system,
                    messages: vec![ChatMessage {
                        role: "user",
                        content: &request.prompt,
                    }],
                    temperature: self.model.temperature,
                    max_tokens: self.model.max_tokens.unwrap_or(ANTHROPIC_DEFAULT_MAX_TOKENS),
                };
                self.client
                    .post(&self.endpoint)
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&body)
            }
        }
    }
}

fn transport(err: reqwest::Error) -> GatewayFailure {
    GatewayFailure::Transport(err.to_string())
}

/// Pull the reply text out of a provider response body.
fn extract_text(kind: ProviderKind, body: &str) -> Result<String, GatewayFailure> {
    let malformed =
        |err: serde_json::Error| GatewayFailure::Transport(format!("malformed response: {err}"));
    let text = match kind {
        ProviderKind::OpenAi => serde_json::from_str::<CompletionResponse>(body)
            .map_err(malformed)?
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content),
        ProviderKind::Anthropic => serde_json::from_str::<MessagesResponse>(body)
            .map_err(malformed)?
            .content
            .into_iter()
            .find_map(|block| block.text),
    };
    text.filter(|text| !text.trim().is_empty())
        .ok_or(GatewayFailure::EmptyResponse)
}

impl AgentGateway for ChatAgent {
    fn identity(&self) -> AgentIdentity {
        self.identity.clone()
    }

    fn request(&self, request: AgentRequest) -> BoxFuture<'static, Result<String, GatewayFailure>> {
        let pending = self.build(&request);
        let kind = self.kind;
        let identity = self.identity.clone();

        async move {
            let started = Instant::now();
            let response = pending.send().await.map_err(transport)?;
            let status = response.status();
            let body = response.text().await.map_err(transport)?;
            if !status.is_success() {
                return Err(GatewayFailure::Status {
                    status: status.as_u16(),
                    body,
                });
            }
            let text = extract_text(kind, &body)?;
            info!("{} responded in {:?}", identity, started.elapsed());
            debug!("{} raw response: {:?}", identity, text);
            Ok(text)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(kind: ProviderKind, base_url: Option<&str>) -> ChatAgent {
        ChatAgent::new(
            AgentIdentity::new("test", "test"),
            kind,
            base_url,
            "key".into(),
            ModelConfig {
                name: "model".into(),
                temperature: 0.2,
                max_tokens: None,
            },
            reqwest::Client::new(),
        )
    }

    #[test]
    fn endpoints_follow_provider_kind() {
        assert_eq!(
            agent(ProviderKind::OpenAi, None).endpoint(),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            agent(ProviderKind::OpenAi, Some("http://localhost:11434/v1/")).endpoint(),
            "http://localhost:11434/v1/chat/completions"
        );
        assert_eq!(
            agent(ProviderKind::Anthropic, None).endpoint(),
            "https://api.anthropic.com/v1/messages"
        );
    }

    #[test]
    fn extracts_reply_text() {
        let openai = r#"{"choices":[{"message":{"role":"assistant","content":"e2e4"}}]}"#;
        assert_eq!(extract_text(ProviderKind::OpenAi, openai), Ok("e2e4".to_string()));

        let anthropic = r#"{"content":[{"type":"text","text":"RESIGN"}]}"#;
        assert_eq!(
            extract_text(ProviderKind::Anthropic, anthropic),
            Ok("RESIGN".to_string())
        );

        let empty = r#"{"choices":[{"message":{"content":"  "}}]}"#;
        assert_eq!(
            extract_text(ProviderKind::OpenAi, empty),
            Err(GatewayFailure::EmptyResponse)
        );
        assert!(matches!(
            extract_text(ProviderKind::OpenAi, "not json"),
            Err(GatewayFailure::Transport(_))
        ));
    }

    #[test]
    fn missing_api_key_is_reported() {
        let mut config = AgentsConfig::default();
        if let Some(openai) = config.providers.get_mut("openai") {
            openai.api_key_env_var = "CHESS_REFEREE_TEST_KEY_THAT_IS_NEVER_SET".into();
        }
        let err = ChatAgent::from_config(
            &AgentIdentity::new("openai", "gpt-4o"),
            &config,
            reqwest::Client::new(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            GatewayFailure::MissingApiKey("CHESS_REFEREE_TEST_KEY_THAT_IS_NEVER_SET".into())
        );
    }
}
