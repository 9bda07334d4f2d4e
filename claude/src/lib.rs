//! Structured answers from Claude.
//!
//! One call shape only: a single user prompt, a single tool the model is
//! forced to call, and the tool's input handed back as JSON. The tool's
//! input schema is what gives the answer its structure.
//!
//! ```no_run
//! # async fn demo() -> Result<(), claude::Error> {
//! use claude::{Claude, ToolCall, ToolSpec};
//! use serde_json::json;
//!
//! let client = Claude::from_env()?;
//! let tool = ToolSpec::new("create_scene", "Create a scene", json!({"type": "object"}));
//! let input = client.call_tool(&ToolCall::new(tool, "A scene by the sea")).await?;
//! println!("{input}");
//! # Ok(()) }
//! ```

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

#[derive(Debug, Error)]
pub enum Error {
    #[error("ANTHROPIC_API_KEY is not set")]
    NoApiKey,

    #[error("API key contains characters not allowed in a header")]
    InvalidApiKey,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Model answered without calling {tool}")]
    ToolNotCalled { tool: String },
}

/// A tool the model must answer through.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: schema,
        }
    }
}

/// One forced-tool request.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub tool: ToolSpec,
    pub prompt: String,
    pub system: Option<String>,
    /// Overrides the client's model.
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

impl ToolCall {
    pub fn new(tool: ToolSpec, prompt: impl Into<String>) -> Self {
        Self {
            tool,
            prompt: prompt.into(),
            system: None,
            model: None,
            max_tokens: 4096,
            temperature: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn body<'a>(&'a self, default_model: &'a str) -> Body<'a> {
        Body {
            model: self.model.as_deref().unwrap_or(default_model),
            max_tokens: self.max_tokens,
            system: self.system.as_deref(),
            temperature: self.temperature,
            messages: [UserMessage {
                role: "user",
                content: &self.prompt,
            }],
            tools: [&self.tool],
            tool_choice: ForcedTool {
                kind: "tool",
                name: &self.tool.name,
            },
        }
    }
}

/// Claude Messages API client.
#[derive(Clone)]
pub struct Claude {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl Claude {
    pub fn new(api_key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            http,
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Read the key from ANTHROPIC_API_KEY.
    pub fn from_env() -> Result<Self, Error> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| Error::NoApiKey)?;
        Ok(Self::new(api_key))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send `call` and return the input the model passed to its tool.
    pub async fn call_tool(&self, call: &ToolCall) -> Result<Value, Error> {
        let response = self
            .http
            .post(MESSAGES_URL)
            .headers(self.headers()?)
            .json(&call.body(&self.model))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let reply: Reply = response.json().await?;
        reply.into_tool_input(&call.tool.name)
    }

    fn headers(&self) -> Result<HeaderMap, Error> {
        let key = HeaderValue::from_str(&self.api_key).map_err(|_| Error::InvalidApiKey)?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("x-api-key", key);
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        Ok(headers)
    }
}

// Wire format

#[derive(Serialize)]
struct Body<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: [UserMessage<'a>; 1],
    tools: [&'a ToolSpec; 1],
    tool_choice: ForcedTool<'a>,
}

#[derive(Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ForcedTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
}

#[derive(Deserialize)]
struct Reply {
    content: Vec<ReplyBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ReplyBlock {
    ToolUse { name: String, input: Value },
    #[serde(other)]
    Other,
}

impl Reply {
    fn into_tool_input(self, tool: &str) -> Result<Value, Error> {
        self.content
            .into_iter()
            .find_map(|block| match block {
                ReplyBlock::ToolUse { name, input } if name == tool => Some(input),
                _ => None,
            })
            .ok_or_else(|| Error::ToolNotCalled {
                tool: tool.to_string(),
            })
    }
}
