//! Natural language → operation calls, via OpenAI function calling.

use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionToolArgs,
    ChatCompletionToolChoiceOption, ChatCompletionToolType, CreateChatCompletionRequestArgs,
    FunctionObjectArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tallyconf::LlmConfig;
use thiserror::Error;

use crate::catalog::Catalog;
use crate::types::OperationCall;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("language model request failed: {0}")]
    Service(#[from] OpenAIError),

    #[error("language model did not answer within {0:?}")]
    Timeout(Duration),

    #[error("language model returned malformed arguments for {name}: {source}")]
    MalformedArguments {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("language model returned arguments for {name} that are not an object")]
    NonObjectArguments { name: String },

    #[error("language model returned no choices")]
    EmptyResponse,
}

/// Turns user text into zero or more proposed calls.
///
/// Arguments are passed through untyped; validation happens at the ledger
/// boundary. An empty result means the intent was not understood.
#[async_trait]
pub trait IntentResolver: Send + Sync {
    async fn resolve(&self, text: &str, catalog: &Catalog)
        -> Result<Vec<OperationCall>, ResolveError>;
}

/// Resolver backed by an OpenAI-compatible chat completions endpoint
pub struct OpenAiResolver {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl OpenAiResolver {
    pub fn new(config: &LlmConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_base(&config.base_url);

        if let Some(api_key) = &config.api_key {
            openai_config = openai_config.with_api_key(api_key);
        }

        Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// Catalog entries as strict function tools
    pub fn tools(catalog: &Catalog) -> Result<Vec<ChatCompletionTool>, OpenAIError> {
        catalog
            .list()
            .iter()
            .map(|op| {
                let function = FunctionObjectArgs::default()
                    .name(op.name)
                    .description(op.description)
                    .parameters(op.json_schema())
                    .strict(true)
                    .build()?;

                ChatCompletionToolArgs::default()
                    .r#type(ChatCompletionToolType::Function)
                    .function(function)
                    .build()
            })
            .collect()
    }
}

#[async_trait]
impl IntentResolver for OpenAiResolver {
    #[tracing::instrument(skip(self, text, catalog), fields(model = %self.model))]
    async fn resolve(
        &self,
        text: &str,
        catalog: &Catalog,
    ) -> Result<Vec<OperationCall>, ResolveError> {
        let user_message = ChatCompletionRequestUserMessageArgs::default()
            .content(text)
            .build()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![user_message.into()])
            .tools(Self::tools(catalog)?)
            .tool_choice(ChatCompletionToolChoiceOption::Auto)
            .build()?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| ResolveError::Timeout(self.timeout))??;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or(ResolveError::EmptyResponse)?;

        let tool_calls = choice.message.tool_calls.unwrap_or_default();
        tracing::debug!(count = tool_calls.len(), "Model proposed tool calls");

        tool_calls
            .into_iter()
            .map(|tc| parse_arguments(tc.function.name, &tc.function.arguments))
            .collect()
    }
}

/// Parse a function-call argument string. Blank means no arguments.
fn parse_arguments(name: String, arguments: &str) -> Result<OperationCall, ResolveError> {
    if arguments.trim().is_empty() {
        return Ok(OperationCall::bare(name));
    }

    let value: Value = match serde_json::from_str(arguments) {
        Ok(v) => v,
        Err(source) => return Err(ResolveError::MalformedArguments { name, source }),
    };

    match value {
        Value::Object(map) => Ok(OperationCall::new(name, map)),
        Value::Null => Ok(OperationCall::new(name, Map::new())),
        _ => Err(ResolveError::NonObjectArguments { name }),
    }
}
