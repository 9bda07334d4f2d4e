//! Scene-writing assistant.
//!
//! Given the scenes leading up to a choice and the label of the chosen
//! action, an assistant proposes the next scene. The core treats it as a
//! single request/response call: a failed or malformed answer is one error,
//! never retried.

use crate::ids::SceneId;
use crate::model::{Action, Scene};
use async_trait::async_trait;
use claude::{Claude, ToolCall, ToolSpec};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};

const SCENE_TOOL: &str = "create_scene";

const DEFAULT_SYSTEM_PROMPT: &str = "You write scenes for a branching text adventure. \
Each scene has a short title, the text the player reads on the first visit, \
a shorter text for when they come back, and a handful of actions the player can take. \
Keep the tone and language of the scenes you are given.";

/// Errors from the assistant.
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("Claude API error: {0}")]
    Api(#[from] claude::Error),

    #[error("Assistant did not return a scene")]
    MissingScene,

    #[error("Assistant returned a malformed scene: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Could not encode the scene path: {0}")]
    Encode(String),
}

/// What the assistant is asked to continue from.
#[derive(Debug, Clone)]
pub struct SceneRequest {
    /// Scenes leading to the choice point, oldest first.
    pub path: Vec<Scene>,
    /// Label of the action the player chose.
    pub action_title: String,
    /// Free-text authoring notes.
    pub notes: Option<String>,
}

impl SceneRequest {
    pub fn new(path: Vec<Scene>, action_title: impl Into<String>) -> Self {
        Self {
            path,
            action_title: action_title.into(),
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// The user prompt sent to the model.
    pub fn prompt(&self) -> Result<String, AssistantError> {
        let path = serde_json::to_string(&self.path)
            .map_err(|e| AssistantError::Encode(e.to_string()))?;

        let mut prompt = String::from("Create a new scene based on the following scene path:\n\n");
        prompt.push_str(&path);
        prompt.push_str("\n\nAction: ");
        prompt.push_str(&self.action_title);
        if let Some(notes) = self.notes.as_deref().filter(|n| !n.trim().is_empty()) {
            prompt.push_str("\n\nAuthor notes: ");
            prompt.push_str(notes);
        }
        Ok(prompt)
    }
}

/// An action proposed by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedAction {
    pub title: String,
}

/// A scene proposed by the assistant, not yet part of any graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedScene {
    pub title: String,
    pub text: String,
    pub text2: String,
    pub actions: Vec<GeneratedAction>,
}

impl GeneratedScene {
    /// Turn the proposal into a scene with unconnected actions.
    pub fn into_scene(self, id: SceneId) -> Scene {
        let mut scene = Scene::new(id, self.title).with_text(self.text);
        scene.text2 = Some(self.text2).filter(|t| !t.is_empty());
        scene.actions = self
            .actions
            .into_iter()
            .map(|a| Action::new(a.title))
            .collect();
        scene
    }
}

/// JSON schema every generated scene must satisfy.
pub fn scene_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["title", "text", "text2", "actions"],
        "properties": {
            "title": {"type": "string"},
            "text": {"type": "string"},
            "text2": {"type": "string"},
            "actions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"}
                    },
                    "required": ["title"],
                    "additionalProperties": false
                }
            }
        }
    })
}

fn scene_tool() -> ToolSpec {
    ToolSpec::new(
        SCENE_TOOL,
        "Create the next scene of the adventure.",
        scene_schema(),
    )
}

/// Anything that can write the next scene.
#[async_trait]
pub trait SceneAssistant: Send + Sync {
    async fn generate_scene(
        &self,
        request: &SceneRequest,
    ) -> Result<GeneratedScene, AssistantError>;
}

/// Configuration for the Claude-backed assistant.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// The model to use (defaults to the client's model).
    pub model: Option<String>,

    /// Maximum tokens for responses.
    pub max_tokens: u32,

    /// Temperature for generation.
    pub temperature: Option<f32>,

    /// Replaces the built-in system prompt.
    pub custom_system_prompt: Option<String>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 2048,
            temperature: Some(0.8),
            custom_system_prompt: None,
        }
    }
}

impl AssistantConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.custom_system_prompt = Some(prompt.into());
        self
    }
}

/// Assistant backed by the Claude Messages API.
pub struct ClaudeSceneAssistant {
    client: Claude,
    config: AssistantConfig,
}

impl ClaudeSceneAssistant {
    pub fn new(client: Claude) -> Self {
        Self {
            client,
            config: AssistantConfig::default(),
        }
    }

    /// Create an assistant from the ANTHROPIC_API_KEY environment variable.
    pub fn from_env() -> Result<Self, AssistantError> {
        Ok(Self::new(Claude::from_env()?))
    }

    pub fn with_config(mut self, config: AssistantConfig) -> Self {
        self.config = config;
        self
    }

    fn build_call(&self, request: &SceneRequest) -> Result<ToolCall, AssistantError> {
        let system = self
            .config
            .custom_system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);

        let mut call = ToolCall::new(scene_tool(), request.prompt()?)
            .with_system(system)
            .with_max_tokens(self.config.max_tokens);
        if let Some(model) = &self.config.model {
            call = call.with_model(model.clone());
        }
        if let Some(temperature) = self.config.temperature {
            call = call.with_temperature(temperature);
        }
        Ok(call)
    }
}

/// Read a generated scene from the scene tool's input.
pub fn parse_generated_scene(input: Value) -> Result<GeneratedScene, AssistantError> {
    if input.is_null() {
        return Err(AssistantError::MissingScene);
    }
    Ok(serde_json::from_value(input)?)
}

#[async_trait]
impl SceneAssistant for ClaudeSceneAssistant {
    async fn generate_scene(
        &self,
        request: &SceneRequest,
    ) -> Result<GeneratedScene, AssistantError> {
        let call = self.build_call(request)?;
        debug!(path = request.path.len(), action = %request.action_title, "requesting scene");

        let scene = parse_generated_scene(self.client.call_tool(&call).await?)?;

        info!(title = %scene.title, actions = scene.actions.len(), "scene generated");
        Ok(scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> SceneRequest {
        let edge = Scene::new("q1aci5lvf", "Metsän reunalla").with_text("Olet metsän reunalla");
        SceneRequest::new(vec![edge], "Mene metsään")
    }

    #[test]
    fn test_prompt_contains_path_and_action() {
        let prompt = sample_request().prompt().unwrap();
        assert!(prompt.starts_with("Create a new scene based on the following scene path:"));
        assert!(prompt.contains("\"id\":\"q1aci5lvf\""));
        assert!(prompt.contains("Action: Mene metsään"));
        assert!(!prompt.contains("Author notes"));
    }

    #[test]
    fn test_prompt_includes_notes() {
        let prompt = sample_request()
            .with_notes("The wolf appears here")
            .prompt()
            .unwrap();
        assert!(prompt.ends_with("Author notes: The wolf appears here"));
    }

    #[test]
    fn test_parse_generated_scene() {
        let input = json!({
            "title": "Metsässä",
            "text": "Puut ovat korkeita",
            "text2": "Taas metsässä",
            "actions": [{"title": "Palaa"}, {"title": "Jatka"}]
        });
        let scene = parse_generated_scene(input).unwrap();
        assert_eq!(scene.actions.len(), 2);

        let scene = scene.into_scene(SceneId::new("new"));
        assert_eq!(scene.id, SceneId::new("new"));
        assert_eq!(scene.text2.as_deref(), Some("Taas metsässä"));
        assert!(scene.actions.iter().all(|a| a.next_scene.is_none()));
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        let input = json!({"title": "Half a scene"});
        assert!(matches!(
            parse_generated_scene(input),
            Err(AssistantError::Malformed(_))
        ));
        assert!(matches!(
            parse_generated_scene(Value::Null),
            Err(AssistantError::MissingScene)
        ));
    }

    #[test]
    fn test_build_call_forces_scene_tool() {
        let assistant = ClaudeSceneAssistant::new(Claude::new("test-key")).with_config(
            AssistantConfig::new()
                .with_model("claude-3-haiku-20240307")
                .with_max_tokens(1024),
        );
        let call = assistant.build_call(&sample_request()).unwrap();

        assert_eq!(call.model.as_deref(), Some("claude-3-haiku-20240307"));
        assert_eq!(call.max_tokens, 1024);
        assert_eq!(call.temperature, Some(0.8));
        assert_eq!(call.system.as_deref(), Some(DEFAULT_SYSTEM_PROMPT));
        assert_eq!(call.tool.name, SCENE_TOOL);
        assert_eq!(call.tool.input_schema["required"][3], "actions");
        assert!(call.prompt.contains("Action: Mene metsään"));
    }

    #[test]
    fn test_custom_system_prompt() {
        let assistant = ClaudeSceneAssistant::new(Claude::new("test-key"))
            .with_config(AssistantConfig::new().with_system_prompt("Write in verse."));
        let call = assistant.build_call(&sample_request()).unwrap();
        assert_eq!(call.system.as_deref(), Some("Write in verse."));
        assert_eq!(call.model, None);
    }
}
