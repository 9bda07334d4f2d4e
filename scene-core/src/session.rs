//! Play session: where the player is and what has happened so far.
//!
//! The session holds no reference to the graph; every operation takes the
//! narrative document it should navigate, so the editor and a player can
//! share one repository.

use crate::ids::{ProgressionSlug, SceneId};
use crate::model::{Action, GameData, Scene};
use crate::resolver::{resolve, resolve_id, EvolutionError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from play-session operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Action \"{title}\" does not have a next scene")]
    DeadEnd { title: String },

    #[error("Scene {scene} has no action at index {index}")]
    UnknownAction { scene: SceneId, index: usize },

    #[error(transparent)]
    Evolution(#[from] EvolutionError),
}

/// Serializable play state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaySession {
    /// Triggered progressions in trigger order, without duplicates.
    pub progressions: Vec<ProgressionSlug>,

    pub visited_scenes: BTreeSet<SceneId>,

    pub current_scene: Option<SceneId>,
}

impl PlaySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_progression(&self, slug: &ProgressionSlug) -> bool {
        self.progressions.contains(slug)
    }

    pub fn has_visited(&self, scene: &SceneId) -> bool {
        self.visited_scenes.contains(scene)
    }

    /// Place the player on the initial scene if they are nowhere yet.
    pub fn start(&mut self, data: &GameData) -> Result<(), SessionError> {
        if self.current_scene.is_none() {
            if let Some(initial) = data.initial_scene.clone() {
                self.go_to_scene(data, &initial)?;
            }
        }
        Ok(())
    }

    /// Forget everything and go back to the initial scene.
    pub fn reset(&mut self, data: &GameData) -> Result<(), SessionError> {
        info!("play session reset");
        self.progressions.clear();
        self.visited_scenes.clear();
        self.current_scene = None;
        self.start(data)
    }

    /// The scene currently shown, after evolutions.
    pub fn current<'a>(&self, data: &'a GameData) -> Result<Option<&'a Scene>, SessionError> {
        Ok(resolve(data, self.current_scene.as_ref(), &self.progressions)?)
    }

    /// Text to display for the current scene, honouring the revisit text.
    pub fn current_text<'a>(&self, data: &'a GameData) -> Result<Option<&'a str>, SessionError> {
        Ok(self
            .current(data)?
            .map(|scene| scene.display_text(self.has_visited(&scene.id))))
    }

    /// Move to `scene`, resolved through its evolutions.
    ///
    /// The scene being left is marked visited. An unknown id leaves the
    /// player nowhere.
    pub fn go_to_scene(
        &mut self,
        data: &GameData,
        scene: &SceneId,
    ) -> Result<Option<SceneId>, SessionError> {
        let resolved = resolve_id(data, scene, &self.progressions)?;
        Ok(self.land(scene, resolved))
    }

    fn land(&mut self, requested: &SceneId, resolved: Option<SceneId>) -> Option<SceneId> {
        if resolved.is_none() {
            warn!(scene = %requested, "navigating to unknown scene");
        }
        if let Some(previous) = self.current_scene.take() {
            self.visited_scenes.insert(previous);
        }
        debug!(requested = %requested, resolved = ?resolved, "scene changed");
        self.current_scene = resolved.clone();
        resolved
    }

    /// The history as it would be after triggering `slug`.
    fn with_progression(&self, slug: Option<&ProgressionSlug>) -> Vec<ProgressionSlug> {
        let mut history = self.progressions.clone();
        if let Some(slug) = slug {
            if !history.contains(slug) {
                history.push(slug.clone());
            }
        }
        history
    }

    /// Take an action: trigger its progression and follow it.
    ///
    /// The target is resolved against the would-be history first; a dead
    /// end or an evolution cycle is rejected before anything changes.
    pub fn perform_action(
        &mut self,
        data: &GameData,
        action: &Action,
    ) -> Result<Option<SceneId>, SessionError> {
        let Some(next) = &action.next_scene else {
            return Err(SessionError::DeadEnd {
                title: action.title.clone(),
            });
        };
        let history = self.with_progression(action.game_progression.as_ref());
        let resolved = resolve_id(data, next, &history)?;

        if let Some(slug) = &action.game_progression {
            self.push_progression(slug.clone());
        }
        Ok(self.land(next, resolved))
    }

    /// Take action `index` of `scene`.
    pub fn perform_action_at(
        &mut self,
        data: &GameData,
        scene: &SceneId,
        index: usize,
    ) -> Result<Option<SceneId>, SessionError> {
        let action = data
            .scene(scene)
            .and_then(|s| s.actions.get(index))
            .ok_or_else(|| SessionError::UnknownAction {
                scene: scene.clone(),
                index,
            })?;
        self.perform_action(data, action)
    }

    fn push_progression(&mut self, slug: ProgressionSlug) -> bool {
        if self.has_progression(&slug) {
            return false;
        }
        info!(progression = %slug, "progression triggered");
        self.progressions.push(slug);
        true
    }

    /// Re-resolve the stored current scene against `history`.
    ///
    /// Only a scene that still resolves replaces the stored id.
    fn current_under(
        &self,
        data: &GameData,
        history: &[ProgressionSlug],
    ) -> Result<Option<SceneId>, SessionError> {
        let Some(current) = &self.current_scene else {
            return Ok(None);
        };
        Ok(resolve_id(data, current, history)?)
    }

    fn settle(&mut self, resolved: Option<SceneId>) {
        if let Some(resolved) = resolved {
            if self.current_scene.as_ref() != Some(&resolved) {
                debug!(scene = %resolved, "current scene evolved in place");
                self.current_scene = Some(resolved);
            }
        }
    }

    /// Trigger a progression directly, for trying out state combinations.
    ///
    /// When the slug is new and some action carries it, the player jumps
    /// to that action's target so the resulting state is visible at once.
    /// Otherwise the current scene is re-resolved where it stands.
    /// Returns whether the slug was added.
    pub fn add_progression(
        &mut self,
        data: &GameData,
        slug: ProgressionSlug,
    ) -> Result<bool, SessionError> {
        if self.has_progression(&slug) {
            return Ok(false);
        }
        let history = self.with_progression(Some(&slug));

        let target = data.scenes.values().find_map(|scene| {
            scene
                .actions
                .iter()
                .find(|a| a.game_progression.as_ref() == Some(&slug))
                .and_then(|a| a.next_scene.clone())
        });
        match target {
            Some(target) => {
                let resolved = resolve_id(data, &target, &history)?;
                self.push_progression(slug);
                self.land(&target, resolved);
            }
            None => {
                let resolved = self.current_under(data, &history)?;
                self.push_progression(slug);
                self.settle(resolved);
            }
        }
        Ok(true)
    }

    /// Clear a progression and re-resolve the current scene.
    ///
    /// Returns whether the slug was present.
    pub fn remove_progression(
        &mut self,
        data: &GameData,
        slug: &ProgressionSlug,
    ) -> Result<bool, SessionError> {
        if !self.has_progression(slug) {
            return Ok(false);
        }
        let history: Vec<ProgressionSlug> =
            self.progressions.iter().filter(|p| *p != slug).cloned().collect();
        let resolved = self.current_under(data, &history)?;

        info!(progression = %slug, "progression cleared");
        self.progressions = history;
        self.settle(resolved);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{slugs, GraphBuilder};

    fn id(s: &str) -> SceneId {
        SceneId::new(s)
    }

    fn forest() -> GameData {
        GraphBuilder::new()
            .scene(
                Scene::new("s1", "Edge")
                    .with_text("A")
                    .with_revisit_text("B")
                    .with_action(Action::new("enter").leading_to("s2"))
                    .with_action(Action::new("wait")),
            )
            .scene(
                Scene::new("s2", "Woods")
                    .with_text("Dark")
                    .with_action(Action::new("back").leading_to("s1"))
                    .with_action(Action::new("light fire").triggering("fire").leading_to("s1")),
            )
            .scene(Scene::new("s1-burned", "Ashes").with_text("Gone"))
            .initial("s1")
            .data()
    }

    #[test]
    fn test_start_uses_initial_scene() {
        let data = forest();
        let mut session = PlaySession::new();
        session.start(&data).unwrap();
        assert_eq!(session.current_scene, Some(id("s1")));
        assert!(session.visited_scenes.is_empty());
    }

    #[test]
    fn test_revisit_text_swap() {
        let data = forest();
        let mut session = PlaySession::new();
        session.start(&data).unwrap();
        assert_eq!(session.current_text(&data).unwrap(), Some("A"));

        session.perform_action_at(&data, &id("s1"), 0).unwrap();
        assert_eq!(session.current_text(&data).unwrap(), Some("Dark"));

        session.perform_action_at(&data, &id("s2"), 0).unwrap();
        assert_eq!(session.current_text(&data).unwrap(), Some("B"));
    }

    #[test]
    fn test_dead_end_leaves_state_untouched() {
        let mut data = forest();
        data.scenes
            .get_mut(&id("s1"))
            .unwrap()
            .actions[1]
            .game_progression = Some(ProgressionSlug::new("waited"));
        let mut session = PlaySession::new();
        session.start(&data).unwrap();
        let before = session.clone();

        let err = session.perform_action_at(&data, &id("s1"), 1).unwrap_err();
        assert_eq!(
            err,
            SessionError::DeadEnd {
                title: "wait".to_string()
            }
        );
        assert_eq!(session, before);
    }

    #[test]
    fn test_progression_triggers_evolution() {
        let mut data = forest();
        data.scenes
            .get_mut(&id("s1"))
            .unwrap()
            .evolutions
            .insert(ProgressionSlug::new("fire"), id("s1-burned"));
        let mut session = PlaySession::new();
        session.start(&data).unwrap();
        session.perform_action_at(&data, &id("s1"), 0).unwrap();

        let landed = session.perform_action_at(&data, &id("s2"), 1).unwrap();
        assert_eq!(landed, Some(id("s1-burned")));
        assert_eq!(session.progressions, vec![ProgressionSlug::new("fire")]);
        assert_eq!(session.current_text(&data).unwrap(), Some("Gone"));
    }

    #[test]
    fn test_progressions_never_duplicate() {
        let data = forest();
        let mut session = PlaySession::new();
        session.go_to_scene(&data, &id("s2")).unwrap();
        session.perform_action_at(&data, &id("s2"), 1).unwrap();
        session.go_to_scene(&data, &id("s2")).unwrap();
        session.perform_action_at(&data, &id("s2"), 1).unwrap();

        assert_eq!(session.progressions, vec![ProgressionSlug::new("fire")]);
    }

    #[test]
    fn test_add_progression_jumps_to_action_target() {
        let data = forest();
        let mut session = PlaySession::new();
        session.go_to_scene(&data, &id("s2")).unwrap();

        assert!(session
            .add_progression(&data, ProgressionSlug::new("fire"))
            .unwrap());
        assert_eq!(session.current_scene, Some(id("s1")));

        session.go_to_scene(&data, &id("s2")).unwrap();
        assert!(!session
            .add_progression(&data, ProgressionSlug::new("fire"))
            .unwrap());
        assert_eq!(session.current_scene, Some(id("s2")));
    }

    #[test]
    fn test_add_unused_progression_stays_put() {
        let data = forest();
        let mut session = PlaySession::new();
        session.start(&data).unwrap();
        session
            .add_progression(&data, ProgressionSlug::new("nobody-uses-me"))
            .unwrap();
        assert_eq!(session.current_scene, Some(id("s1")));
    }

    #[test]
    fn test_remove_progression() {
        let data = forest();
        let mut session = PlaySession::new();
        session.progressions = vec!["a".into(), "b".into()];
        assert!(session.remove_progression(&data, &"a".into()).unwrap());
        assert!(!session.remove_progression(&data, &"a".into()).unwrap());
        assert_eq!(session.progressions, vec![ProgressionSlug::new("b")]);
    }

    #[test]
    fn test_remove_progression_settles_stale_current() {
        let data = GraphBuilder::new()
            .scene(Scene::new("s1", "Edge").with_evolution("fire", "s1-burned"))
            .scene(Scene::new("s1-burned", "Ashes"))
            .data();
        let mut session = PlaySession::new();
        session.progressions = slugs(&["fire", "rain"]);
        session.current_scene = Some(id("s1"));

        assert!(session.remove_progression(&data, &"rain".into()).unwrap());
        assert_eq!(session.current_scene, Some(id("s1-burned")));
        assert!(session.visited_scenes.is_empty());
    }

    #[test]
    fn test_add_progression_in_place_tracks_shown_scene() {
        let mut data = forest();
        data.scenes
            .get_mut(&id("s1"))
            .unwrap()
            .evolutions
            .insert(ProgressionSlug::new("ash"), id("s1-burned"));
        let mut session = PlaySession::new();
        session.start(&data).unwrap();

        assert!(session.add_progression(&data, "ash".into()).unwrap());
        assert_eq!(session.current_scene, Some(id("s1-burned")));
        assert_eq!(session.current(&data).unwrap().unwrap().id, id("s1-burned"));

        session.go_to_scene(&data, &id("s2")).unwrap();
        assert!(session.has_visited(&id("s1-burned")));
        assert!(!session.has_visited(&id("s1")));
    }

    #[test]
    fn test_cycle_leaves_state_untouched() {
        let data = GraphBuilder::new()
            .scene(
                Scene::new("c", "Camp")
                    .with_action(Action::new("spark").triggering("p").leading_to("a")),
            )
            .scene(Scene::new("a", "A").with_evolution("p", "b"))
            .scene(Scene::new("b", "B").with_evolution("p", "a"))
            .data();
        let mut session = PlaySession::new();
        session.start(&data).unwrap();
        let before = session.clone();

        let err = session.perform_action_at(&data, &id("c"), 0).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Evolution(EvolutionError::Cycle { .. })
        ));
        assert_eq!(session, before);
        assert!(session.progressions.is_empty());

        assert!(session.add_progression(&data, "p".into()).is_err());
        assert_eq!(session, before);
    }

    #[test]
    fn test_unknown_scene_leaves_player_nowhere() {
        let data = forest();
        let mut session = PlaySession::new();
        session.start(&data).unwrap();
        let landed = session.go_to_scene(&data, &id("missing")).unwrap();
        assert_eq!(landed, None);
        assert_eq!(session.current_scene, None);
        assert!(session.has_visited(&id("s1")));
    }

    #[test]
    fn test_reset() {
        let data = forest();
        let mut session = PlaySession::new();
        session.start(&data).unwrap();
        session.perform_action_at(&data, &id("s1"), 0).unwrap();
        session.perform_action_at(&data, &id("s2"), 1).unwrap();

        session.reset(&data).unwrap();
        assert_eq!(session.current_scene, Some(id("s1")));
        assert!(session.progressions.is_empty());
        assert!(session.visited_scenes.is_empty());
    }
}
