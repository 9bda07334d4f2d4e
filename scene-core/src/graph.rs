//! The graph repository: owner of the narrative document.
//!
//! Every mutation is synchronous and last-writer-wins. Interested parties
//! (the connection synchronizer, the persistence layer) subscribe to a
//! channel of [`GraphEvent`]s instead of watching the data.

use crate::ids::{ProgressionSlug, SceneId};
use crate::model::{Action, ActionField, GameData, Scene, SceneField, NEW_SCENE_TITLE};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Errors from graph mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Unknown scene: {0}")]
    UnknownScene(SceneId),

    #[error("Scene {scene} has no action at index {index}")]
    UnknownAction { scene: SceneId, index: usize },
}

/// A change notification from the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    SceneCreated(SceneId),
    /// The scene is gone and references to it were stripped from other scenes.
    SceneDeleted(SceneId),
    SceneChanged(SceneId),
    /// Actions of the scene were added, removed, reordered or edited.
    ActionsChanged(SceneId),
    ActionJoined {
        scene: SceneId,
        index: usize,
        target: SceneId,
    },
    ActionDisconnected {
        scene: SceneId,
        index: usize,
    },
    EvolutionCreated {
        scene: SceneId,
        progression: ProgressionSlug,
        evolved: SceneId,
    },
    /// The whole document was replaced.
    Reloaded,
}

impl GraphEvent {
    /// Whether incremental connection patching cannot cover this change.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            GraphEvent::SceneDeleted(_)
                | GraphEvent::ActionsChanged(_)
                | GraphEvent::EvolutionCreated { .. }
                | GraphEvent::Reloaded
        )
    }
}

/// Owns the scenes, actions and evolutions of one narrative document.
#[derive(Debug, Default)]
pub struct GraphRepository {
    data: GameData,
    subscribers: Vec<mpsc::UnboundedSender<GraphEvent>>,
}

impl GraphRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_data(data: GameData) -> Self {
        Self {
            data,
            subscribers: Vec::new(),
        }
    }

    /// Register for change notifications.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<GraphEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, event: GraphEvent) {
        debug!(?event, "graph event");
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn data(&self) -> &GameData {
        &self.data
    }

    pub fn scene(&self, id: &SceneId) -> Option<&Scene> {
        self.data.scenes.get(id)
    }

    pub fn contains(&self, id: &SceneId) -> bool {
        self.data.scenes.contains_key(id)
    }

    pub fn scenes(&self) -> impl Iterator<Item = &Scene> {
        self.data.scenes.values()
    }

    pub fn action(&self, scene: &SceneId, index: usize) -> Result<&Action, GraphError> {
        self.scene(scene)
            .ok_or_else(|| GraphError::UnknownScene(scene.clone()))?
            .actions
            .get(index)
            .ok_or_else(|| GraphError::UnknownAction {
                scene: scene.clone(),
                index,
            })
    }

    fn scene_mut(&mut self, id: &SceneId) -> Result<&mut Scene, GraphError> {
        self.data
            .scenes
            .get_mut(id)
            .ok_or_else(|| GraphError::UnknownScene(id.clone()))
    }

    fn action_mut(&mut self, scene: &SceneId, index: usize) -> Result<&mut Action, GraphError> {
        self.scene_mut(scene)?
            .actions
            .get_mut(index)
            .ok_or_else(|| GraphError::UnknownAction {
                scene: scene.clone(),
                index,
            })
    }

    /// Replace the whole document.
    pub fn load_game_data(&mut self, data: GameData) {
        info!(scenes = data.scenes.len(), "game data loaded");
        self.data = data;
        self.emit(GraphEvent::Reloaded);
    }

    fn fresh_id(&self) -> SceneId {
        SceneId::random_unique(|id| self.data.scenes.contains_key(id))
    }

    /// Create an empty scene under a fresh id.
    pub fn create_scene(&mut self) -> SceneId {
        let id = self.fresh_id();
        self.insert_scene(Scene::new(id.clone(), NEW_SCENE_TITLE));
        id
    }

    /// Insert a fully formed scene, replacing any scene with the same id.
    pub fn insert_scene(&mut self, scene: Scene) {
        let id = scene.id.clone();
        info!(scene = %id, "scene created");
        self.data.scenes.insert(id.clone(), scene);
        self.emit(GraphEvent::SceneCreated(id));
    }

    /// Insert `scene` under a fresh id and return it.
    pub fn insert_new_scene(&mut self, mut scene: Scene) -> SceneId {
        let id = self.fresh_id();
        scene.id = id.clone();
        self.insert_scene(scene);
        id
    }

    /// Remove a scene and every action target or evolution pointing at it.
    pub fn delete_scene(&mut self, id: &SceneId) -> Result<Scene, GraphError> {
        let removed = self
            .data
            .scenes
            .remove(id)
            .ok_or_else(|| GraphError::UnknownScene(id.clone()))?;

        for scene in self.data.scenes.values_mut() {
            for action in &mut scene.actions {
                if action.next_scene.as_ref() == Some(id) {
                    action.next_scene = None;
                }
            }
            scene.evolutions.retain(|_, target| target != id);
        }
        if self.data.initial_scene.as_ref() == Some(id) {
            self.data.initial_scene = None;
        }

        info!(scene = %id, "scene deleted");
        self.emit(GraphEvent::SceneDeleted(id.clone()));
        Ok(removed)
    }

    pub fn set_scene_value(
        &mut self,
        id: &SceneId,
        field: SceneField,
        value: impl Into<String>,
    ) -> Result<(), GraphError> {
        let scene = self.scene_mut(id)?;
        let value = value.into();
        match field {
            SceneField::Title => scene.title = value,
            SceneField::Text => scene.text = value,
            SceneField::Text2 => scene.text2 = Some(value).filter(|v| !v.is_empty()),
        }
        self.emit(GraphEvent::SceneChanged(id.clone()));
        Ok(())
    }

    pub fn set_initial_scene(&mut self, id: Option<SceneId>) -> Result<(), GraphError> {
        if let Some(id) = &id {
            if !self.contains(id) {
                return Err(GraphError::UnknownScene(id.clone()));
            }
        }
        self.data.initial_scene = id;
        self.emit(GraphEvent::Reloaded);
        Ok(())
    }

    /// Append a default action and return its index.
    pub fn create_action(&mut self, scene: &SceneId) -> Result<usize, GraphError> {
        let actions = &mut self.scene_mut(scene)?.actions;
        actions.push(Action::default());
        let index = actions.len() - 1;
        self.emit(GraphEvent::ActionsChanged(scene.clone()));
        Ok(index)
    }

    pub fn delete_action(&mut self, scene: &SceneId, index: usize) -> Result<Action, GraphError> {
        let actions = &mut self.scene_mut(scene)?.actions;
        if index >= actions.len() {
            return Err(GraphError::UnknownAction {
                scene: scene.clone(),
                index,
            });
        }
        let removed = actions.remove(index);
        self.emit(GraphEvent::ActionsChanged(scene.clone()));
        Ok(removed)
    }

    /// Replace the action list wholesale (reorder, bulk edit).
    pub fn set_actions(&mut self, scene: &SceneId, actions: Vec<Action>) -> Result<(), GraphError> {
        self.scene_mut(scene)?.actions = actions;
        self.emit(GraphEvent::ActionsChanged(scene.clone()));
        Ok(())
    }

    /// Edit an action field. An empty value clears the optional fields.
    pub fn set_action_value(
        &mut self,
        scene: &SceneId,
        index: usize,
        field: ActionField,
        value: impl Into<String>,
    ) -> Result<(), GraphError> {
        let action = self.action_mut(scene, index)?;
        let value = value.into();
        match field {
            ActionField::Title => action.title = value,
            ActionField::Description => {
                action.description = Some(value).filter(|v| !v.is_empty());
            }
            ActionField::GameProgression => {
                action.game_progression =
                    Some(value).filter(|v| !v.is_empty()).map(ProgressionSlug::new);
            }
        }
        self.emit(GraphEvent::ActionsChanged(scene.clone()));
        Ok(())
    }

    /// Point an action at a target scene.
    pub fn join_action_to_scene(
        &mut self,
        scene: &SceneId,
        index: usize,
        target: &SceneId,
    ) -> Result<(), GraphError> {
        if !self.contains(target) {
            return Err(GraphError::UnknownScene(target.clone()));
        }
        self.action_mut(scene, index)?.next_scene = Some(target.clone());
        info!(scene = %scene, index, target = %target, "action joined");
        self.emit(GraphEvent::ActionJoined {
            scene: scene.clone(),
            index,
            target: target.clone(),
        });
        Ok(())
    }

    pub fn disconnect_action(&mut self, scene: &SceneId, index: usize) -> Result<(), GraphError> {
        self.action_mut(scene, index)?.next_scene = None;
        self.emit(GraphEvent::ActionDisconnected {
            scene: scene.clone(),
            index,
        });
        Ok(())
    }

    /// Clone a scene as the evolved variant shown once `progression` fired.
    ///
    /// The clone copies title, text and actions and gets no evolutions of
    /// its own. Returns the new scene's id.
    pub fn create_evolution(
        &mut self,
        scene: &SceneId,
        progression: ProgressionSlug,
    ) -> Result<SceneId, GraphError> {
        let original = self
            .scene(scene)
            .ok_or_else(|| GraphError::UnknownScene(scene.clone()))?;

        let mut evolved = Scene::new(self.fresh_id(), original.title.clone())
            .with_text(original.text.clone());
        evolved.text2 = original.text2.clone();
        evolved.actions = original.actions.clone();
        let evolved_id = evolved.id.clone();

        self.data.scenes.insert(evolved_id.clone(), evolved);
        self.scene_mut(scene)?
            .evolutions
            .insert(progression.clone(), evolved_id.clone());

        info!(
            scene = %scene,
            progression = %progression,
            evolved = %evolved_id,
            "evolution created"
        );
        self.emit(GraphEvent::EvolutionCreated {
            scene: scene.clone(),
            progression,
            evolved: evolved_id.clone(),
        });
        Ok(evolved_id)
    }

    /// Find the first action, in repository order, that triggers `progression`.
    pub fn find_action_with_progression(
        &self,
        progression: &ProgressionSlug,
    ) -> Option<(&SceneId, usize, &Action)> {
        self.data.scenes.iter().find_map(|(id, scene)| {
            scene
                .actions
                .iter()
                .enumerate()
                .find(|(_, a)| a.game_progression.as_ref() == Some(progression))
                .map(|(index, action)| (id, index, action))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::GraphBuilder;

    #[test]
    fn test_create_scene_defaults() {
        let mut graph = GraphRepository::new();
        let id = graph.create_scene();
        let scene = graph.scene(&id).unwrap();

        assert_eq!(scene.title, NEW_SCENE_TITLE);
        assert!(scene.actions.is_empty());
        assert!(scene.evolutions.is_empty());
    }

    #[test]
    fn test_delete_scene_strips_references() {
        let mut graph = GraphBuilder::new()
            .scene(Scene::new("a", "A").with_action(Action::new("to b").leading_to("b")))
            .scene(
                Scene::new("c", "C")
                    .with_action(Action::new("to b").leading_to("b"))
                    .with_action(Action::new("to a").leading_to("a"))
                    .with_evolution("p", "b"),
            )
            .scene(Scene::new("b", "B"))
            .initial("b")
            .build();

        graph.delete_scene(&SceneId::new("b")).unwrap();

        for scene in graph.scenes() {
            assert!(scene
                .actions
                .iter()
                .all(|a| a.next_scene != Some(SceneId::new("b"))));
            assert!(scene.evolutions.values().all(|t| t.as_str() != "b"));
        }
        let c = graph.scene(&SceneId::new("c")).unwrap();
        assert_eq!(c.actions[1].next_scene, Some(SceneId::new("a")));
        assert_eq!(graph.data().initial_scene, None);
    }

    #[test]
    fn test_delete_unknown_scene() {
        let mut graph = GraphRepository::new();
        assert_eq!(
            graph.delete_scene(&SceneId::new("nope")),
            Err(GraphError::UnknownScene(SceneId::new("nope")))
        );
    }

    #[test]
    fn test_action_crud() {
        let mut graph = GraphBuilder::new()
            .scene(Scene::new("a", "A"))
            .scene(Scene::new("b", "B"))
            .build();
        let a = SceneId::new("a");
        let b = SceneId::new("b");

        let index = graph.create_action(&a).unwrap();
        assert_eq!(index, 0);
        assert_eq!(graph.action(&a, 0).unwrap().title, "New Action");

        graph.join_action_to_scene(&a, 0, &b).unwrap();
        assert_eq!(graph.action(&a, 0).unwrap().next_scene, Some(b.clone()));

        graph.disconnect_action(&a, 0).unwrap();
        assert_eq!(graph.action(&a, 0).unwrap().next_scene, None);

        graph
            .set_action_value(&a, 0, ActionField::GameProgression, "opened")
            .unwrap();
        assert_eq!(
            graph.action(&a, 0).unwrap().game_progression,
            Some(ProgressionSlug::new("opened"))
        );
        graph
            .set_action_value(&a, 0, ActionField::GameProgression, "")
            .unwrap();
        assert_eq!(graph.action(&a, 0).unwrap().game_progression, None);

        graph.delete_action(&a, 0).unwrap();
        assert!(matches!(
            graph.action(&a, 0),
            Err(GraphError::UnknownAction { index: 0, .. })
        ));
    }

    #[test]
    fn test_join_to_unknown_target_rejected() {
        let mut graph = GraphBuilder::new()
            .scene(Scene::new("a", "A").with_action(Action::new("go")))
            .build();
        let err = graph
            .join_action_to_scene(&SceneId::new("a"), 0, &SceneId::new("ghost"))
            .unwrap_err();
        assert_eq!(err, GraphError::UnknownScene(SceneId::new("ghost")));
    }

    #[test]
    fn test_set_scene_value() {
        let mut graph = GraphBuilder::new().scene(Scene::new("a", "A")).build();
        let a = SceneId::new("a");
        graph.set_scene_value(&a, SceneField::Title, "Cave").unwrap();
        graph.set_scene_value(&a, SceneField::Text2, "Back again").unwrap();

        let scene = graph.scene(&a).unwrap();
        assert_eq!(scene.title, "Cave");
        assert_eq!(scene.text2.as_deref(), Some("Back again"));
    }

    #[test]
    fn test_create_evolution_clones_scene() {
        let mut graph = GraphBuilder::new()
            .scene(
                Scene::new("a", "Village")
                    .with_text("Quiet")
                    .with_action(Action::new("leave").leading_to("b"))
                    .with_evolution("old", "b"),
            )
            .scene(Scene::new("b", "B"))
            .build();
        let a = SceneId::new("a");

        let evolved = graph
            .create_evolution(&a, ProgressionSlug::new("burned"))
            .unwrap();

        let clone = graph.scene(&evolved).unwrap();
        assert_eq!(clone.title, "Village");
        assert_eq!(clone.text, "Quiet");
        assert_eq!(clone.actions.len(), 1);
        assert!(clone.evolutions.is_empty());
        assert_eq!(
            graph
                .scene(&a)
                .unwrap()
                .evolutions
                .get(&ProgressionSlug::new("burned")),
            Some(&evolved)
        );
    }

    #[test]
    fn test_subscribers_receive_events() {
        let mut graph = GraphBuilder::new().scene(Scene::new("a", "A")).build();
        let mut rx = graph.subscribe();
        let a = SceneId::new("a");

        graph.create_action(&a).unwrap();
        graph.delete_scene(&a).unwrap();

        assert_eq!(rx.try_recv().unwrap(), GraphEvent::ActionsChanged(a.clone()));
        assert_eq!(rx.try_recv().unwrap(), GraphEvent::SceneDeleted(a));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_subscribers_are_pruned() {
        let mut graph = GraphRepository::new();
        drop(graph.subscribe());
        graph.create_scene();
        assert!(graph.subscribers.is_empty());
    }

    #[test]
    fn test_find_action_with_progression() {
        let graph = GraphBuilder::new()
            .scene(Scene::new("a", "A").with_action(Action::new("x")))
            .scene(
                Scene::new("b", "B")
                    .with_action(Action::new("y"))
                    .with_action(Action::new("z").triggering("key").leading_to("a")),
            )
            .build();

        let (scene, index, action) = graph
            .find_action_with_progression(&ProgressionSlug::new("key"))
            .unwrap();
        assert_eq!(scene.as_str(), "b");
        assert_eq!(index, 1);
        assert_eq!(action.title, "z");
    }
}
