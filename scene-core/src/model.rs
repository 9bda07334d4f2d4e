//! Narrative document types: scenes, actions and the game data root.
//!
//! These serialize to the same camelCase JSON the editor reads and writes.

use crate::ids::{ProgressionSlug, SceneId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Title given to scenes created in the editor.
pub const NEW_SCENE_TITLE: &str = "New Scene";

/// Title given to actions created in the editor.
pub const NEW_ACTION_TITLE: &str = "New Action";

/// A choice the player can take from a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Display label.
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Story flag triggered when the action is taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_progression: Option<ProgressionSlug>,

    /// Target scene, `None` for a dead end.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_scene: Option<SceneId>,
}

impl Action {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            game_progression: None,
            next_scene: None,
        }
    }

    pub fn leading_to(mut self, scene: impl Into<SceneId>) -> Self {
        self.next_scene = Some(scene.into());
        self
    }

    pub fn triggering(mut self, progression: impl Into<ProgressionSlug>) -> Self {
        self.game_progression = Some(progression.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Default for Action {
    fn default() -> Self {
        Self::new(NEW_ACTION_TITLE)
    }
}

/// A node of the narrative graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: SceneId,

    #[serde(default)]
    pub title: String,

    /// Shown on the first visit.
    #[serde(default)]
    pub text: String,

    /// Shown instead of `text` once the scene has been visited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text2: Option<String>,

    #[serde(default)]
    pub actions: Vec<Action>,

    /// When the progression history contains a key, this scene is shown
    /// as the mapped scene instead.
    #[serde(default)]
    pub evolutions: BTreeMap<ProgressionSlug, SceneId>,
}

impl Scene {
    pub fn new(id: impl Into<SceneId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            text: String::new(),
            text2: None,
            actions: Vec::new(),
            evolutions: BTreeMap::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_revisit_text(mut self, text2: impl Into<String>) -> Self {
        self.text2 = Some(text2.into());
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_evolution(
        mut self,
        progression: impl Into<ProgressionSlug>,
        target: impl Into<SceneId>,
    ) -> Self {
        self.evolutions.insert(progression.into(), target.into());
        self
    }

    /// Text for display, given whether the player has been here before.
    pub fn display_text(&self, revisited: bool) -> &str {
        match (&self.text2, revisited) {
            (Some(text2), true) => text2,
            _ => &self.text,
        }
    }
}

/// Editable text fields of a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneField {
    Title,
    Text,
    Text2,
}

/// Editable fields of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionField {
    Title,
    Description,
    GameProgression,
}

/// The persisted narrative document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_scene: Option<SceneId>,

    #[serde(default)]
    pub scenes: BTreeMap<SceneId, Scene>,

    /// Author-maintained catalogue of known progressions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_progressions: Option<Vec<ProgressionSlug>>,
}

impl GameData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scene(&self, id: &SceneId) -> Option<&Scene> {
        self.scenes.get(id)
    }

    /// Every progression the document knows about: the catalogue first,
    /// then slugs used by actions and evolution keys, in first-seen order.
    pub fn all_progressions(&self) -> Vec<ProgressionSlug> {
        let mut seen = HashSet::new();
        let catalogue = self.game_progressions.iter().flatten();
        let from_scenes = self.scenes.values().flat_map(|scene| {
            scene
                .actions
                .iter()
                .filter_map(|a| a.game_progression.as_ref())
                .chain(scene.evolutions.keys())
        });

        catalogue
            .chain(from_scenes)
            .filter(|slug| seen.insert((*slug).clone()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_json_shape() {
        let raw = json!({
            "title": "Forest",
            "initialScene": "edge",
            "scenes": {
                "edge": {
                    "id": "edge",
                    "title": "Metsän reunalla",
                    "text": "Olet metsän reunalla",
                    "text2": "Metsä on pimeä ja synkkä",
                    "actions": [
                        {
                            "title": "Mene metsään",
                            "nextScene": "deep",
                            "gameProgression": "entered"
                        },
                        {"title": "Odota"}
                    ],
                    "evolutions": {"burned": "ashes"}
                }
            }
        });

        let data: GameData = serde_json::from_value(raw).unwrap();
        let edge = data.scene(&SceneId::new("edge")).unwrap();
        assert_eq!(data.initial_scene, Some(SceneId::new("edge")));
        assert_eq!(edge.actions[0].next_scene, Some(SceneId::new("deep")));
        assert_eq!(
            edge.actions[0].game_progression,
            Some(ProgressionSlug::new("entered"))
        );
        assert_eq!(edge.actions[1].next_scene, None);
        assert_eq!(
            edge.evolutions.get(&ProgressionSlug::new("burned")),
            Some(&SceneId::new("ashes"))
        );

        let back = serde_json::to_value(&data).unwrap();
        assert_eq!(back["scenes"]["edge"]["actions"][0]["nextScene"], "deep");
        assert!(back["scenes"]["edge"]["actions"][1].get("nextScene").is_none());
    }

    #[test]
    fn test_action_description_only_written_when_set() {
        let described = Action::new("Knock")
            .with_description("Three slow knocks")
            .leading_to("hall");
        let value = serde_json::to_value(&described).unwrap();
        assert_eq!(value["description"], "Three slow knocks");
        assert_eq!(value["nextScene"], "hall");

        let plain = serde_json::to_value(Action::new("Knock")).unwrap();
        assert!(plain.get("description").is_none());
    }

    #[test]
    fn test_scene_missing_optional_fields() {
        let scene: Scene = serde_json::from_value(json!({"id": "a"})).unwrap();
        assert!(scene.actions.is_empty());
        assert!(scene.evolutions.is_empty());
        assert_eq!(scene.text2, None);
    }

    #[test]
    fn test_display_text() {
        let scene = Scene::new("s", "S").with_text("A").with_revisit_text("B");
        assert_eq!(scene.display_text(false), "A");
        assert_eq!(scene.display_text(true), "B");

        let plain = Scene::new("p", "P").with_text("only");
        assert_eq!(plain.display_text(true), "only");
    }

    #[test]
    fn test_all_progressions_first_seen_order() {
        let mut data = GameData::new();
        data.game_progressions = Some(vec!["zeta".into()]);
        data.scenes.insert(
            "a".into(),
            Scene::new("a", "A")
                .with_action(Action::new("go").triggering("alpha"))
                .with_action(Action::new("again").triggering("zeta"))
                .with_evolution("beta", "b"),
        );

        let slugs: Vec<String> = data
            .all_progressions()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(slugs, vec!["zeta", "alpha", "beta"]);
    }
}
