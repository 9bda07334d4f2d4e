//! Which scenes are currently unlocked.
//!
//! A scene that is the target of some evolution is gated behind that
//! evolution's progression: it only shows up once the flag has fired.

use crate::ids::{ProgressionSlug, SceneId};
use crate::model::{GameData, Scene};
use crate::resolver::resolve;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::warn;

/// Map each evolution target to the progression that unlocks it.
///
/// When several evolutions lead to the same scene, the last one scanned
/// (repository order) decides.
pub fn gated_scenes(data: &GameData) -> HashMap<&SceneId, &ProgressionSlug> {
    data.scenes
        .values()
        .flat_map(|scene| scene.evolutions.iter())
        .map(|(slug, target)| (target, slug))
        .collect()
}

/// The scenes the editor or in-game map may show right now.
///
/// Every scene id is resolved through its evolutions; resolved scenes that
/// are gated behind a progression not yet in `history` are left out. The
/// result has one entry per scene id in repository order, so a scene that
/// several ids resolve to appears more than once.
pub fn visible_scenes<'a>(data: &'a GameData, history: &[ProgressionSlug]) -> Vec<&'a Scene> {
    let gates = gated_scenes(data);
    let fired: HashSet<&ProgressionSlug> = history.iter().collect();

    data.scenes
        .keys()
        .filter_map(|id| match resolve(data, Some(id), history) {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(scene = %id, error = %err, "skipping scene with cyclic evolutions");
                None
            }
        })
        .filter(|scene| match gates.get(&scene.id) {
            Some(required) => fired.contains(required),
            None => true,
        })
        .collect()
}

/// Everything reachable from `start` by following resolved action targets.
///
/// The start scene comes first, then its descendants depth-first in action
/// order. Each scene appears once even when the graph loops.
pub fn reachable_from<'a>(
    data: &'a GameData,
    start: &SceneId,
    history: &[ProgressionSlug],
) -> Vec<&'a Scene> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut stack = vec![start.clone()];

    while let Some(id) = stack.pop() {
        let scene = match resolve(data, Some(&id), history) {
            Ok(Some(scene)) => scene,
            Ok(None) => continue,
            Err(err) => {
                warn!(scene = %id, error = %err, "stopping at scene with cyclic evolutions");
                continue;
            }
        };
        if !seen.insert(&scene.id) {
            continue;
        }
        order.push(scene);
        stack.extend(
            scene
                .actions
                .iter()
                .rev()
                .filter_map(|action| action.next_scene.clone()),
        );
    }

    order
}

/// Shortest chain of scenes from `start` to `target` through raw action
/// targets, both ends included. Empty when `target` cannot be reached.
pub fn path_between<'a>(data: &'a GameData, start: &SceneId, target: &SceneId) -> Vec<&'a Scene> {
    let Some((start_id, _)) = data.scenes.get_key_value(start) else {
        return Vec::new();
    };
    let mut parents: HashMap<&'a SceneId, &'a SceneId> = HashMap::new();
    let mut seen: HashSet<&'a SceneId> = HashSet::from([start_id]);
    let mut queue = VecDeque::from([start_id]);

    while let Some(id) = queue.pop_front() {
        if id == target {
            let mut path = vec![id];
            let mut cursor = id;
            while let Some(&parent) = parents.get(cursor) {
                path.push(parent);
                cursor = parent;
            }
            return path.into_iter().rev().filter_map(|id| data.scene(id)).collect();
        }

        let Some(scene) = data.scene(id) else {
            continue;
        };
        for next in scene.actions.iter().filter_map(|a| a.next_scene.as_ref()) {
            let Some((next_id, _)) = data.scenes.get_key_value(next) else {
                continue;
            };
            if seen.insert(next_id) {
                parents.insert(next_id, id);
                queue.push_back(next_id);
            }
        }
    }
    Vec::new()
}
