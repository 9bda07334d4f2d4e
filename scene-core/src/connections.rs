//! Visual connections between scenes.
//!
//! Each connection is the on-canvas projection of one action's
//! `nextScene` link, keyed `connection-<sceneId>-<actionIndex>`. The set is
//! derived from the graph and the layout and is never the source of truth
//! for topology. At most one connection is being dragged at a time:
//!
//! ```text
//! Idle --begin--> InProgress --finish--> Idle (graph joined)
//!                     |
//!                     +------cancel----> Idle (graph untouched)
//! ```

use crate::graph::{GraphError, GraphRepository};
use crate::ids::{ConnectionId, SceneId};
use crate::layout::{EditorLayout, Point};
use crate::model::Scene;
use std::collections::BTreeMap;
use tracing::debug;

/// How far inside the target node an arrow lands.
pub const DEFAULT_TARGET_INSET: Point = Point { x: 20.0, y: 20.0 };

/// A drawn edge between an action connector and a scene.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub id: ConnectionId,
    pub from_x: f64,
    pub from_y: f64,
    pub to_x: Option<f64>,
    pub to_y: Option<f64>,
    /// `None` while the connection is still being dragged.
    pub to_scene_id: Option<SceneId>,
}

impl Connection {
    fn starting_at(id: ConnectionId, from: Point) -> Self {
        Self {
            id,
            from_x: from.x,
            from_y: from.y,
            to_x: None,
            to_y: None,
            to_scene_id: None,
        }
    }

    fn ending_at(mut self, scene: SceneId, to: Point) -> Self {
        self.to_x = Some(to.x);
        self.to_y = Some(to.y);
        self.to_scene_id = Some(scene);
        self
    }
}

/// The outcome of a completed drag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedConnection {
    pub from_scene: SceneId,
    pub action_index: usize,
    pub to_scene: SceneId,
}

#[derive(Debug, Default)]
enum DragState {
    #[default]
    Idle,
    InProgress {
        id: ConnectionId,
        /// The finished connection the drag replaced, restored on cancel.
        previous: Option<Connection>,
    },
}

/// Keeps connection endpoints in step with the graph and the layout.
#[derive(Debug)]
pub struct ConnectionSynchronizer {
    connections: BTreeMap<ConnectionId, Connection>,
    drag: DragState,
    target_inset: Point,
}

impl Default for ConnectionSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionSynchronizer {
    pub fn new() -> Self {
        Self {
            connections: BTreeMap::new(),
            drag: DragState::Idle,
            target_inset: DEFAULT_TARGET_INSET,
        }
    }

    pub fn with_target_inset(mut self, inset: Point) -> Self {
        self.target_inset = inset;
        self
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn connection(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn connection_in_progress(&self) -> Option<&Connection> {
        match &self.drag {
            DragState::InProgress { id, .. } => self.connections.get(id),
            DragState::Idle => None,
        }
    }

    fn target_point(&self, layout: &EditorLayout, scene: &SceneId) -> Point {
        layout.position_of(scene).offset(self.target_inset)
    }

    /// Start dragging from action `index` of `scene`.
    ///
    /// Any connection already being dragged is cancelled first.
    pub fn begin_connection(
        &mut self,
        layout: &EditorLayout,
        scene: &SceneId,
        index: usize,
    ) -> ConnectionId {
        self.cancel_connection();

        let id = ConnectionId::for_action(scene, index);
        let from = layout.action_anchor(scene, index);
        let previous = self
            .connections
            .insert(id.clone(), Connection::starting_at(id.clone(), from));

        debug!(connection = %id, "connection started");
        self.drag = DragState::InProgress {
            id: id.clone(),
            previous,
        };
        id
    }

    /// Drop the in-progress connection without touching the graph.
    pub fn cancel_connection(&mut self) {
        if let DragState::InProgress { id, previous } = std::mem::take(&mut self.drag) {
            self.connections.remove(&id);
            if let Some(previous) = previous {
                self.connections.insert(id.clone(), previous);
            }
            debug!(connection = %id, "connection cancelled");
        }
    }

    /// Move the loose end of the in-progress connection.
    pub fn set_pointer(&mut self, x: f64, y: f64) {
        if let DragState::InProgress { id, .. } = &self.drag {
            if let Some(connection) = self.connections.get_mut(id) {
                connection.to_x = Some(x);
                connection.to_y = Some(y);
            }
        }
    }

    /// Complete the drag on `target` and join the originating action to it.
    ///
    /// Returns `Ok(None)` when nothing is being dragged or when `target` is
    /// the source scene; in the latter case the drag stays in progress.
    pub fn finish_connection(
        &mut self,
        graph: &mut GraphRepository,
        layout: &EditorLayout,
        target: &SceneId,
    ) -> Result<Option<FinishedConnection>, GraphError> {
        let DragState::InProgress { id, .. } = &self.drag else {
            return Ok(None);
        };
        let Some((from_scene, action_index)) = id.parts() else {
            self.cancel_connection();
            return Ok(None);
        };
        if &from_scene == target {
            debug!(scene = %target, "refusing self connection");
            return Ok(None);
        }

        let id = id.clone();
        if let Err(err) = graph.join_action_to_scene(&from_scene, action_index, target) {
            self.cancel_connection();
            return Err(err);
        }

        let to = self.target_point(layout, target);
        if let Some(connection) = self.connections.remove(&id) {
            self.connections
                .insert(id.clone(), connection.ending_at(target.clone(), to));
        }
        self.drag = DragState::Idle;
        debug!(connection = %id, target = %target, "connection finished");

        Ok(Some(FinishedConnection {
            from_scene,
            action_index,
            to_scene: target.clone(),
        }))
    }

    /// Throw away the connection being dragged.
    ///
    /// Finished connections mirror an action's `nextScene` and are only
    /// removed by disconnecting the action, so any other id is left alone
    /// and `None` is returned. A drag that replaced a finished connection
    /// puts it back.
    pub fn delete_connection(&mut self, id: &ConnectionId) -> Option<Connection> {
        let dragged = match &self.drag {
            DragState::InProgress { id: dragged, .. } => dragged == id,
            DragState::Idle => false,
        };
        if !dragged {
            return None;
        }
        let removed = self.connections.get(id).cloned();
        self.cancel_connection();
        removed
    }

    /// Re-anchor every connection that starts or ends at `scene`.
    pub fn set_scene_coordinates(
        &mut self,
        layout: &EditorLayout,
        scene: &SceneId,
        x: f64,
        y: f64,
    ) {
        let origin = Point::new(x, y);
        let offsets = layout.scene(scene);
        let target = origin.offset(self.target_inset);

        for connection in self.connections.values_mut() {
            if let Some((source, index)) = connection.id.parts() {
                if &source == scene {
                    let offset = offsets.map(|p| p.action_offset(index)).unwrap_or_default();
                    let from = origin.offset(offset);
                    connection.from_x = from.x;
                    connection.from_y = from.y;
                }
            }
            if connection.to_scene_id.as_ref() == Some(scene) {
                connection.to_x = Some(target.x);
                connection.to_y = Some(target.y);
            }
        }
    }

    /// Rebuild one action's connection from the current graph and layout.
    pub fn refresh_action(
        &mut self,
        graph: &GraphRepository,
        layout: &EditorLayout,
        scene: &SceneId,
        index: usize,
    ) {
        let id = ConnectionId::for_action(scene, index);
        let target = graph
            .action(scene, index)
            .ok()
            .and_then(|action| action.next_scene.clone())
            .filter(|target| graph.contains(target));

        match target {
            Some(target) => {
                let from = layout.action_anchor(scene, index);
                let connection = Connection::starting_at(id.clone(), from)
                    .ending_at(target.clone(), self.target_point(layout, &target));
                self.connections.insert(id, connection);
            }
            None => {
                self.connections.remove(&id);
            }
        }
    }

    /// Throw everything away and rebuild from `scenes`.
    ///
    /// Actions whose target is missing from the graph are left undrawn.
    pub fn redraw_all_connections<'a>(
        &mut self,
        graph: &GraphRepository,
        scenes: impl IntoIterator<Item = &'a Scene>,
        layout: &EditorLayout,
    ) {
        self.connections.clear();
        self.drag = DragState::Idle;

        for scene in scenes {
            for (index, action) in scene.actions.iter().enumerate() {
                let Some(target) = &action.next_scene else {
                    continue;
                };
                if !graph.contains(target) {
                    continue;
                }
                let id = ConnectionId::for_action(&scene.id, index);
                let connection =
                    Connection::starting_at(id.clone(), layout.action_anchor(&scene.id, index))
                        .ending_at(target.clone(), self.target_point(layout, target));
                self.connections.insert(id, connection);
            }
        }
        debug!(connections = self.connections.len(), "connections redrawn");
    }
}
