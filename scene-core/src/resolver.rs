//! Evolution resolution: which scene is actually shown for a scene id.
//!
//! A scene can declare `evolutions`, a map from progression slug to another
//! scene. Resolution walks the progression history in trigger order; the
//! first slug with an entry wins and resolution continues from the target.
//! Every caller that needs "the scene shown for this id" goes through
//! [`resolve`].

use crate::ids::{ProgressionSlug, SceneId};
use crate::model::{GameData, Scene};
use std::collections::HashSet;
use thiserror::Error;
use tracing::warn;

/// Errors from evolution resolution.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvolutionError {
    /// The evolution chain came back to a scene it already passed through.
    #[error("Evolution cycle: {}", format_chain(.chain))]
    Cycle { chain: Vec<SceneId> },
}

fn format_chain(chain: &[SceneId]) -> String {
    chain
        .iter()
        .map(SceneId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Resolve `scene_id` against the progression history.
///
/// Unknown or absent ids resolve to `Ok(None)`. A chain that revisits a
/// scene would never terminate; it is reported as [`EvolutionError::Cycle`].
pub fn resolve<'a>(
    data: &'a GameData,
    scene_id: Option<&SceneId>,
    history: &[ProgressionSlug],
) -> Result<Option<&'a Scene>, EvolutionError> {
    let Some(mut current) = scene_id.and_then(|id| data.scenes.get(id)) else {
        return Ok(None);
    };

    let mut chain = vec![current.id.clone()];
    let mut seen: HashSet<&SceneId> = HashSet::from([&current.id]);

    loop {
        let next = history
            .iter()
            .find_map(|slug| current.evolutions.get(slug));

        let Some(target_id) = next else {
            return Ok(Some(current));
        };
        let Some(target) = data.scenes.get(target_id) else {
            // Evolution into a scene that no longer exists.
            return Ok(None);
        };

        chain.push(target.id.clone());
        if !seen.insert(&target.id) {
            warn!(chain = %format_chain(&chain), "evolution cycle detected");
            return Err(EvolutionError::Cycle { chain });
        }
        current = target;
    }
}

/// Resolve and return only the shown scene's id.
pub fn resolve_id(
    data: &GameData,
    scene_id: &SceneId,
    history: &[ProgressionSlug],
) -> Result<Option<SceneId>, EvolutionError> {
    Ok(resolve(data, Some(scene_id), history)?.map(|scene| scene.id.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{slugs, GraphBuilder};

    fn id(s: &str) -> SceneId {
        SceneId::new(s)
    }

    #[test]
    fn test_absent_and_unknown_resolve_to_none() {
        let data = GraphBuilder::new().scene(Scene::new("a", "A")).data();
        assert_eq!(resolve(&data, None, &[]), Ok(None));
        assert_eq!(resolve(&data, Some(&id("zzz")), &slugs(&["p"])), Ok(None));
    }

    #[test]
    fn test_scene_without_evolutions_is_itself() {
        let data = GraphBuilder::new()
            .scene(Scene::new("a", "A").with_text("hello"))
            .data();
        for history in [slugs(&[]), slugs(&["x", "y"])] {
            let scene = resolve(&data, Some(&id("a")), &history).unwrap().unwrap();
            assert_eq!(scene, data.scene(&id("a")).unwrap());
        }
    }

    #[test]
    fn test_first_history_match_wins() {
        let data = GraphBuilder::new()
            .scene(
                Scene::new("s", "S")
                    .with_evolution("A", "x")
                    .with_evolution("B", "y"),
            )
            .scene(Scene::new("x", "X"))
            .scene(Scene::new("y", "Y"))
            .data();

        let resolved = resolve_id(&data, &id("s"), &slugs(&["B", "A"])).unwrap();
        assert_eq!(resolved, Some(id("y")));

        let resolved = resolve_id(&data, &id("s"), &slugs(&["A", "B"])).unwrap();
        assert_eq!(resolved, Some(id("x")));
    }

    #[test]
    fn test_unmatched_history_keeps_scene() {
        let data = GraphBuilder::new()
            .scene(Scene::new("s", "S").with_evolution("A", "x"))
            .scene(Scene::new("x", "X"))
            .data();
        assert_eq!(
            resolve_id(&data, &id("s"), &slugs(&["other"])).unwrap(),
            Some(id("s"))
        );
    }

    #[test]
    fn test_resolution_chains() {
        let data = GraphBuilder::new()
            .scene(Scene::new("a", "A").with_evolution("p", "b"))
            .scene(Scene::new("b", "B").with_evolution("q", "c"))
            .scene(Scene::new("c", "C"))
            .data();

        assert_eq!(
            resolve_id(&data, &id("a"), &slugs(&["p"])).unwrap(),
            Some(id("b"))
        );
        assert_eq!(
            resolve_id(&data, &id("a"), &slugs(&["q", "p"])).unwrap(),
            Some(id("c"))
        );
    }

    #[test]
    fn test_cycle_is_detected() {
        let data = GraphBuilder::new()
            .scene(Scene::new("a", "A").with_evolution("p", "b"))
            .scene(Scene::new("b", "B").with_evolution("p", "a"))
            .data();

        let err = resolve(&data, Some(&id("a")), &slugs(&["p"])).unwrap_err();
        assert_eq!(
            err,
            EvolutionError::Cycle {
                chain: vec![id("a"), id("b"), id("a")]
            }
        );
        assert_eq!(err.to_string(), "Evolution cycle: a -> b -> a");
    }

    #[test]
    fn test_self_evolution_is_a_cycle() {
        let data = GraphBuilder::new()
            .scene(Scene::new("a", "A").with_evolution("p", "a"))
            .data();
        assert!(resolve(&data, Some(&id("a")), &slugs(&["p"])).is_err());
        // Without the progression the self-reference is dormant.
        assert!(resolve(&data, Some(&id("a")), &[]).is_ok());
    }

    #[test]
    fn test_evolution_into_missing_scene() {
        let data = GraphBuilder::new()
            .scene(Scene::new("a", "A").with_evolution("p", "gone"))
            .data();
        assert_eq!(resolve(&data, Some(&id("a")), &slugs(&["p"])), Ok(None));
    }
}
