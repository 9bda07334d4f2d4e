//! Editor layout: pixel positions of scenes and text annotations.
//!
//! Indexed by the same scene ids as the graph repository, persisted as its
//! own document.

use crate::ids::{SceneId, TextBoxId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a scene lands when it has never been placed.
pub const DEFAULT_POSITION: Point = Point { x: 50.0, y: 50.0 };

/// A point on the editor canvas.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, by: Point) -> Point {
        Point::new(self.x + by.x, self.y + by.y)
    }
}

/// Layout record of one scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorPosition {
    pub id: SceneId,
    pub x: f64,
    pub y: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,

    /// Connector offset of each action, relative to the scene origin.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action_positions: Vec<Point>,
}

impl EditorPosition {
    pub fn new(id: SceneId, x: f64, y: f64) -> Self {
        Self {
            id,
            x,
            y,
            width: None,
            height: None,
            action_positions: Vec::new(),
        }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Offset of action `index`'s connector; `(0, 0)` when unknown.
    pub fn action_offset(&self, index: usize) -> Point {
        self.action_positions.get(index).copied().unwrap_or_default()
    }
}

/// A free-floating note on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBox {
    pub id: TextBoxId,
    pub text: String,
    pub x: f64,
    pub y: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

fn default_zoom() -> f64 {
    1.0
}

/// The persisted layout document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorLayout {
    #[serde(default)]
    pub scenes: BTreeMap<SceneId, EditorPosition>,

    #[serde(default)]
    pub textboxes: BTreeMap<TextBoxId, TextBox>,

    #[serde(default = "default_zoom")]
    pub zoom: f64,
}

impl Default for EditorLayout {
    fn default() -> Self {
        Self {
            scenes: BTreeMap::new(),
            textboxes: BTreeMap::new(),
            zoom: default_zoom(),
        }
    }
}

impl EditorLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scene(&self, id: &SceneId) -> Option<&EditorPosition> {
        self.scenes.get(id)
    }

    /// Scene origin, or [`DEFAULT_POSITION`] for unplaced scenes.
    pub fn position_of(&self, id: &SceneId) -> Point {
        self.scene(id)
            .map(EditorPosition::origin)
            .unwrap_or(DEFAULT_POSITION)
    }

    /// Absolute position of action `index`'s connector.
    pub fn action_anchor(&self, id: &SceneId, index: usize) -> Point {
        let offset = self
            .scene(id)
            .map(|p| p.action_offset(index))
            .unwrap_or_default();
        self.position_of(id).offset(offset)
    }

    /// Move a scene, creating its record on first placement.
    pub fn move_scene(&mut self, id: &SceneId, x: f64, y: f64) {
        let position = self
            .scenes
            .entry(id.clone())
            .or_insert_with(|| EditorPosition::new(id.clone(), x, y));
        position.x = x;
        position.y = y;
    }

    pub fn resize_scene(&mut self, id: &SceneId, width: f64, height: f64) {
        let origin = self.position_of(id);
        let position = self
            .scenes
            .entry(id.clone())
            .or_insert_with(|| EditorPosition::new(id.clone(), origin.x, origin.y));
        position.width = Some(width);
        position.height = Some(height);
    }

    pub fn set_action_positions(&mut self, id: &SceneId, positions: Vec<Point>) {
        let origin = self.position_of(id);
        self.scenes
            .entry(id.clone())
            .or_insert_with(|| EditorPosition::new(id.clone(), origin.x, origin.y))
            .action_positions = positions;
    }

    /// Give `to` a copy of `from`'s layout record.
    pub fn mirror_scene(&mut self, from: &SceneId, to: &SceneId) {
        if let Some(source) = self.scenes.get(from) {
            let mut copy = source.clone();
            copy.id = to.clone();
            self.scenes.insert(to.clone(), copy);
        }
    }

    pub fn remove_scene(&mut self, id: &SceneId) -> Option<EditorPosition> {
        self.scenes.remove(id)
    }

    pub fn create_text_box(&mut self, x: f64, y: f64) -> TextBoxId {
        let id = TextBoxId::random_unique(|id| self.textboxes.contains_key(id));
        self.textboxes.insert(
            id.clone(),
            TextBox {
                id: id.clone(),
                text: String::new(),
                x,
                y,
                width: None,
                height: None,
            },
        );
        id
    }

    /// Returns false when the text box does not exist.
    pub fn update_text_box(&mut self, id: &TextBoxId, text: impl Into<String>) -> bool {
        match self.textboxes.get_mut(id) {
            Some(textbox) => {
                textbox.text = text.into();
                true
            }
            None => false,
        }
    }

    /// Returns false when the text box does not exist.
    pub fn move_text_box(&mut self, id: &TextBoxId, x: f64, y: f64) -> bool {
        match self.textboxes.get_mut(id) {
            Some(textbox) => {
                textbox.x = x;
                textbox.y = y;
                true
            }
            None => false,
        }
    }

    pub fn delete_text_box(&mut self, id: &TextBoxId) -> Option<TextBox> {
        self.textboxes.remove(id)
    }
}
