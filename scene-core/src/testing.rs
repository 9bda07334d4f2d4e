//! Testing utilities for the scene engine.
//!
//! This module provides tools for integration testing:
//! - `GraphBuilder` for assembling small narrative documents
//! - `MockAssistant` for deterministic scene generation without API calls
//! - Assertion helpers for verifying play state

use crate::assistant::{
    AssistantError, GeneratedAction, GeneratedScene, SceneAssistant, SceneRequest,
};
use crate::graph::GraphRepository;
use crate::ids::{ProgressionSlug, SceneId};
use crate::model::{GameData, Scene};
use crate::session::PlaySession;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Builds a narrative document scene by scene.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    data: GameData,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scene; the first one added becomes the initial scene unless
    /// [`initial`](Self::initial) says otherwise.
    pub fn scene(mut self, scene: Scene) -> Self {
        if self.data.initial_scene.is_none() {
            self.data.initial_scene = Some(scene.id.clone());
        }
        self.data.scenes.insert(scene.id.clone(), scene);
        self
    }

    pub fn initial(mut self, id: &str) -> Self {
        self.data.initial_scene = Some(SceneId::new(id));
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.data.title = Some(title.to_string());
        self
    }

    pub fn data(self) -> GameData {
        self.data
    }

    pub fn build(self) -> GraphRepository {
        GraphRepository::from_data(self.data)
    }
}

/// Progression history from string slices.
pub fn slugs(values: &[&str]) -> Vec<ProgressionSlug> {
    values.iter().copied().map(ProgressionSlug::from).collect()
}

/// An assistant that returns scripted scenes in order.
#[derive(Debug, Default)]
pub struct MockAssistant {
    responses: Mutex<VecDeque<Result<GeneratedScene, String>>>,
    requests: Mutex<Vec<SceneRequest>>,
}

impl MockAssistant {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a scene with the given title and action labels.
    pub fn expect_scene(self, title: &str, actions: &[&str]) -> Self {
        let scene = GeneratedScene {
            title: title.to_string(),
            text: format!("{title} text"),
            text2: format!("{title} again"),
            actions: actions
                .iter()
                .map(|a| GeneratedAction {
                    title: a.to_string(),
                })
                .collect(),
        };
        self.push(Ok(scene));
        self
    }

    /// Queue a failed generation.
    pub fn expect_failure(self) -> Self {
        self.push(Err("scripted failure".to_string()));
        self
    }

    fn push(&self, response: Result<GeneratedScene, String>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(response);
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<SceneRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SceneAssistant for MockAssistant {
    async fn generate_scene(
        &self,
        request: &SceneRequest,
    ) -> Result<GeneratedScene, AssistantError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut responses| responses.pop_front());
        match next {
            Some(Ok(scene)) => Ok(scene),
            Some(Err(_)) | None => Err(AssistantError::MissingScene),
        }
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert the player stands on `scene`.
#[track_caller]
pub fn assert_at(session: &PlaySession, scene: &str) {
    assert_eq!(
        session.current_scene.as_ref().map(SceneId::as_str),
        Some(scene),
        "Expected player at '{scene}', got {:?}",
        session.current_scene
    );
}

/// Assert the visible set, in repository order.
#[track_caller]
pub fn assert_visible(data: &GameData, history: &[ProgressionSlug], expected: &[&str]) {
    let visible: Vec<&str> = crate::reachability::visible_scenes(data, history)
        .into_iter()
        .map(|scene| scene.id.as_str())
        .collect();
    assert_eq!(visible, expected, "Unexpected visible scenes for {history:?}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Action;

    #[test]
    fn test_builder_first_scene_is_initial() {
        let data = GraphBuilder::new()
            .title("Two rooms")
            .scene(Scene::new("a", "A"))
            .scene(Scene::new("b", "B"))
            .data();
        assert_eq!(data.initial_scene, Some(SceneId::new("a")));
        assert_eq!(data.title.as_deref(), Some("Two rooms"));

        let data = GraphBuilder::new()
            .scene(Scene::new("a", "A"))
            .scene(Scene::new("b", "B").with_action(Action::new("x")))
            .initial("b")
            .data();
        assert_eq!(data.initial_scene, Some(SceneId::new("b")));
    }

    #[tokio::test]
    async fn test_mock_assistant_scripted() {
        let assistant = MockAssistant::new()
            .expect_scene("Cave", &["Enter", "Leave"])
            .expect_failure();
        let request = SceneRequest::new(Vec::new(), "Go");

        let scene = assistant.generate_scene(&request).await.unwrap();
        assert_eq!(scene.title, "Cave");
        assert_eq!(scene.actions.len(), 2);

        assert!(assistant.generate_scene(&request).await.is_err());
        assert!(assistant.generate_scene(&request).await.is_err());
        assert_eq!(assistant.requests().len(), 3);
    }
}
