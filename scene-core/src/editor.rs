//! Editor - the primary public API for authoring and previewing a story.
//!
//! The editor wraps the graph repository, the layout, the connection
//! synchronizer and a preview play session into one object. After every
//! mutation it drains the repository's change events, keeps the drawn
//! connections in step with them and schedules debounced saves of whichever
//! documents changed.

use crate::assistant::{AssistantError, GeneratedScene, SceneAssistant, SceneRequest};
use crate::connections::{
    Connection, ConnectionSynchronizer, FinishedConnection, DEFAULT_TARGET_INSET,
};
use crate::graph::{GraphError, GraphEvent, GraphRepository};
use crate::ids::{ConnectionId, ProgressionSlug, SceneId, TextBoxId};
use crate::layout::{EditorLayout, Point};
use crate::model::{Action, ActionField, GameData, Scene, SceneField};
use crate::persist::{
    editor_data_name, game_data_name, load_document, load_session, session_name,
    DebouncedSaver, PersistError, PersistenceGateway,
};
use crate::reachability::{path_between, visible_scenes};
use crate::session::{PlaySession, SessionError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Where a generated scene is placed relative to its parent.
pub const GENERATED_SCENE_OFFSET: Point = Point { x: 350.0, y: 0.0 };

/// Errors from editor operations.
#[derive(Debug, Error)]
pub enum EditorError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("Assistant error: {0}")]
    Assistant(#[from] AssistantError),

    #[error("Unknown text box: {0}")]
    UnknownTextBox(TextBoxId),
}

/// Which scenes a full connection rebuild draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedrawScope {
    /// Every scene in the repository.
    #[default]
    All,
    /// Only scenes visible under the preview session's progressions.
    Visible,
}

/// Configuration for an editor.
#[derive(Debug, Clone)]
pub struct EditorConfig {
    /// Game selector prefixed to document names.
    pub game: Option<String>,

    /// Quiet period before a changed document is written.
    pub debounce: Duration,

    pub redraw_scope: RedrawScope,

    /// Offset from a scene's origin to where incoming arrows land.
    pub target_inset: Point,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            game: None,
            debounce: Duration::from_secs(1),
            redraw_scope: RedrawScope::All,
            target_inset: DEFAULT_TARGET_INSET,
        }
    }
}

impl EditorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a game; documents become `<game>-gamedata.json` and friends.
    pub fn with_game(mut self, game: impl Into<String>) -> Self {
        self.game = Some(game.into());
        self
    }

    pub fn with_debounce(mut self, delay: Duration) -> Self {
        self.debounce = delay;
        self
    }

    pub fn with_redraw_scope(mut self, scope: RedrawScope) -> Self {
        self.redraw_scope = scope;
        self
    }

    pub fn with_target_inset(mut self, inset: Point) -> Self {
        self.target_inset = inset;
        self
    }

    fn names(&self) -> DocumentNames {
        let game = self.game.as_deref();
        DocumentNames {
            game_data: game_data_name(game),
            editor_data: editor_data_name(game),
            session: session_name(game),
        }
    }
}

#[derive(Debug, Clone)]
struct DocumentNames {
    game_data: String,
    editor_data: String,
    session: String,
}

/// An authoring session over one story.
pub struct Editor {
    config: EditorConfig,
    names: DocumentNames,
    graph: GraphRepository,
    layout: EditorLayout,
    connections: ConnectionSynchronizer,
    session: PlaySession,
    saver: Option<DebouncedSaver>,
    events: mpsc::UnboundedReceiver<GraphEvent>,
}

impl Editor {
    /// An in-memory editor that never persists anything.
    pub fn new(config: EditorConfig) -> Self {
        Self::assemble(
            config,
            GameData::default(),
            EditorLayout::default(),
            PlaySession::default(),
            None,
        )
    }

    /// An in-memory editor over existing documents.
    pub fn from_documents(config: EditorConfig, data: GameData, layout: EditorLayout) -> Self {
        Self::assemble(config, data, layout, PlaySession::default(), None)
    }

    /// Load the story, its layout and the preview session from `gateway`.
    ///
    /// The three loads run concurrently and connections are drawn only
    /// once all of them have finished. Missing documents start empty.
    pub async fn open(
        config: EditorConfig,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Result<Self, EditorError> {
        let names = config.names();
        let (data, layout, session) = futures::join!(
            load_document::<GameData>(gateway.as_ref(), &names.game_data),
            load_document::<EditorLayout>(gateway.as_ref(), &names.editor_data),
            load_session(gateway.as_ref(), &names.session),
        );
        let data = data?.unwrap_or_default();
        let layout = layout?.unwrap_or_default();
        info!(
            game = ?config.game,
            scenes = data.scenes.len(),
            placed = layout.scenes.len(),
            "editor opened"
        );

        let saver = DebouncedSaver::new(gateway, config.debounce);
        Ok(Self::assemble(config, data, layout, session, Some(saver)))
    }

    fn assemble(
        config: EditorConfig,
        data: GameData,
        layout: EditorLayout,
        mut session: PlaySession,
        saver: Option<DebouncedSaver>,
    ) -> Self {
        let mut graph = GraphRepository::from_data(data);
        let events = graph.subscribe();
        if let Err(err) = session.start(graph.data()) {
            error!(error = %err, "could not place the preview session");
        }

        let mut editor = Self {
            names: config.names(),
            connections: ConnectionSynchronizer::new().with_target_inset(config.target_inset),
            config,
            graph,
            layout,
            session,
            saver,
            events,
        };
        editor.redraw_all_connections();
        editor
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn graph(&self) -> &GraphRepository {
        &self.graph
    }

    pub fn data(&self) -> &GameData {
        self.graph.data()
    }

    pub fn layout(&self) -> &EditorLayout {
        &self.layout
    }

    pub fn session(&self) -> &PlaySession {
        &self.session
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.connections()
    }

    pub fn connection(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.connection(id)
    }

    pub fn connection_in_progress(&self) -> Option<&Connection> {
        self.connections.connection_in_progress()
    }

    /// Scenes shown under the preview session's progressions.
    pub fn visible_scenes(&self) -> Vec<&Scene> {
        visible_scenes(self.graph.data(), &self.session.progressions)
    }

    // ------------------------------------------------------------------
    // Synchronization
    // ------------------------------------------------------------------

    /// Rebuild every connection from the graph and the layout.
    pub fn redraw_all_connections(&mut self) {
        match self.config.redraw_scope {
            RedrawScope::All => {
                self.connections
                    .redraw_all_connections(&self.graph, self.graph.scenes(), &self.layout);
            }
            RedrawScope::Visible => {
                let visible = visible_scenes(self.graph.data(), &self.session.progressions);
                self.connections
                    .redraw_all_connections(&self.graph, visible, &self.layout);
            }
        }
    }

    /// Apply pending graph events to the connections and schedule a save.
    fn sync(&mut self) {
        let mut redraw = false;
        let mut changed = false;

        while let Ok(event) = self.events.try_recv() {
            changed = true;
            if event.is_structural() {
                redraw = true;
                continue;
            }
            match event {
                GraphEvent::ActionJoined { scene, index, .. }
                | GraphEvent::ActionDisconnected { scene, index } => {
                    self.connections
                        .refresh_action(&self.graph, &self.layout, &scene, index);
                }
                _ => {}
            }
        }

        if redraw {
            self.redraw_all_connections();
        }
        if changed {
            self.save_game_data();
        }
    }

    fn schedule_save<T: Serialize>(&self, name: &str, document: &T) {
        let Some(saver) = &self.saver else {
            return;
        };
        match serde_json::to_value(document) {
            Ok(value) => saver.save(name, value),
            Err(err) => error!(name = %name, error = %err, "failed to encode document"),
        }
    }

    fn save_game_data(&self) {
        self.schedule_save(&self.names.game_data, self.graph.data());
    }

    fn save_layout(&self) {
        self.schedule_save(&self.names.editor_data, &self.layout);
    }

    fn save_session(&self) {
        self.schedule_save(&self.names.session, &self.session);
    }

    /// Write all three documents right away, bypassing the debounce.
    pub async fn save_now(&self) -> Result<(), EditorError> {
        let Some(saver) = &self.saver else {
            return Ok(());
        };
        let gateway = saver.gateway();
        let documents = [
            (&self.names.game_data, serde_json::to_value(self.graph.data())),
            (&self.names.editor_data, serde_json::to_value(&self.layout)),
            (&self.names.session, serde_json::to_value(&self.session)),
        ];
        for (name, value) in documents {
            gateway.save(name, value.map_err(PersistError::from)?).await?;
        }
        Ok(())
    }

    /// Whether a debounced save is still waiting or running.
    pub fn has_pending_saves(&self) -> bool {
        self.saver.as_ref().is_some_and(DebouncedSaver::has_pending)
    }

    // ------------------------------------------------------------------
    // Graph
    // ------------------------------------------------------------------

    /// Replace the story wholesale.
    pub fn load_game_data(&mut self, data: GameData) {
        self.graph.load_game_data(data);
        self.sync();
    }

    /// Create an empty scene. The preview player lands on it when they
    /// are nowhere yet.
    pub fn create_scene(&mut self) -> SceneId {
        let id = self.graph.create_scene();
        self.sync();
        if self.session.current_scene.is_none() {
            self.session.current_scene = Some(id.clone());
            self.session_changed();
        }
        id
    }

    /// Create a scene and place it on the canvas.
    pub fn create_scene_at(&mut self, x: f64, y: f64) -> SceneId {
        let id = self.create_scene();
        self.move_scene(&id, x, y);
        id
    }

    pub fn delete_scene(&mut self, id: &SceneId) -> Result<Scene, EditorError> {
        let removed = self.graph.delete_scene(id)?;
        if self.layout.remove_scene(id).is_some() {
            self.save_layout();
        }
        self.sync();
        Ok(removed)
    }

    pub fn set_scene_value(
        &mut self,
        id: &SceneId,
        field: SceneField,
        value: impl Into<String>,
    ) -> Result<(), EditorError> {
        self.graph.set_scene_value(id, field, value)?;
        self.sync();
        Ok(())
    }

    pub fn set_initial_scene(&mut self, id: Option<SceneId>) -> Result<(), EditorError> {
        self.graph.set_initial_scene(id)?;
        self.sync();
        Ok(())
    }

    pub fn create_action(&mut self, scene: &SceneId) -> Result<usize, EditorError> {
        let index = self.graph.create_action(scene)?;
        self.sync();
        Ok(index)
    }

    pub fn delete_action(&mut self, scene: &SceneId, index: usize) -> Result<Action, EditorError> {
        let removed = self.graph.delete_action(scene, index)?;
        self.sync();
        Ok(removed)
    }

    pub fn set_actions(
        &mut self,
        scene: &SceneId,
        actions: Vec<Action>,
    ) -> Result<(), EditorError> {
        self.graph.set_actions(scene, actions)?;
        self.sync();
        Ok(())
    }

    pub fn set_action_value(
        &mut self,
        scene: &SceneId,
        index: usize,
        field: ActionField,
        value: impl Into<String>,
    ) -> Result<(), EditorError> {
        self.graph.set_action_value(scene, index, field, value)?;
        self.sync();
        Ok(())
    }

    pub fn join_action_to_scene(
        &mut self,
        scene: &SceneId,
        index: usize,
        target: &SceneId,
    ) -> Result<(), EditorError> {
        self.graph.join_action_to_scene(scene, index, target)?;
        self.sync();
        Ok(())
    }

    pub fn disconnect_action(&mut self, scene: &SceneId, index: usize) -> Result<(), EditorError> {
        self.graph.disconnect_action(scene, index)?;
        self.sync();
        Ok(())
    }

    /// Clone `scene` as its evolved variant under `progression`.
    ///
    /// The clone is placed where the original sits.
    pub fn create_evolution(
        &mut self,
        scene: &SceneId,
        progression: impl Into<ProgressionSlug>,
    ) -> Result<SceneId, EditorError> {
        let evolved = self.graph.create_evolution(scene, progression.into())?;
        self.layout.mirror_scene(scene, &evolved);
        self.save_layout();
        self.sync();
        Ok(evolved)
    }

    // ------------------------------------------------------------------
    // Layout
    // ------------------------------------------------------------------

    /// Move a scene and drag its connections along.
    pub fn move_scene(&mut self, id: &SceneId, x: f64, y: f64) {
        self.layout.move_scene(id, x, y);
        self.connections
            .set_scene_coordinates(&self.layout, id, x, y);
        self.save_layout();
    }

    pub fn resize_scene(&mut self, id: &SceneId, width: f64, height: f64) {
        self.layout.resize_scene(id, width, height);
        self.save_layout();
    }

    /// Record where each action's connector sits inside the scene node.
    pub fn set_action_positions(&mut self, id: &SceneId, positions: Vec<Point>) {
        self.layout.set_action_positions(id, positions);
        let origin = self.layout.position_of(id);
        self.connections
            .set_scene_coordinates(&self.layout, id, origin.x, origin.y);
        self.save_layout();
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.layout.zoom = zoom;
        self.save_layout();
    }

    pub fn create_text_box(&mut self, x: f64, y: f64) -> TextBoxId {
        let id = self.layout.create_text_box(x, y);
        self.save_layout();
        id
    }

    pub fn update_text_box(
        &mut self,
        id: &TextBoxId,
        text: impl Into<String>,
    ) -> Result<(), EditorError> {
        if !self.layout.update_text_box(id, text) {
            return Err(EditorError::UnknownTextBox(id.clone()));
        }
        self.save_layout();
        Ok(())
    }

    pub fn move_text_box(&mut self, id: &TextBoxId, x: f64, y: f64) -> Result<(), EditorError> {
        if !self.layout.move_text_box(id, x, y) {
            return Err(EditorError::UnknownTextBox(id.clone()));
        }
        self.save_layout();
        Ok(())
    }

    pub fn delete_text_box(&mut self, id: &TextBoxId) -> Result<(), EditorError> {
        self.layout
            .delete_text_box(id)
            .ok_or_else(|| EditorError::UnknownTextBox(id.clone()))?;
        self.save_layout();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    pub fn begin_connection(&mut self, scene: &SceneId, index: usize) -> ConnectionId {
        self.connections.begin_connection(&self.layout, scene, index)
    }

    pub fn set_pointer(&mut self, x: f64, y: f64) {
        self.connections.set_pointer(x, y);
    }

    pub fn cancel_connection(&mut self) {
        self.connections.cancel_connection();
    }

    /// Drop the dragged connection on `target`, joining the action to it.
    pub fn finish_connection(
        &mut self,
        target: &SceneId,
    ) -> Result<Option<FinishedConnection>, EditorError> {
        let finished = self
            .connections
            .finish_connection(&mut self.graph, &self.layout, target)?;
        self.sync();
        Ok(finished)
    }

    /// Delete a connection.
    ///
    /// The dragged connection is simply dropped. A finished one is removed
    /// by disconnecting its action, so the graph and the drawing agree.
    pub fn delete_connection(
        &mut self,
        id: &ConnectionId,
    ) -> Result<Option<Connection>, EditorError> {
        if let Some(dragged) = self.connections.delete_connection(id) {
            return Ok(Some(dragged));
        }
        let Some(existing) = self.connections.connection(id).cloned() else {
            return Ok(None);
        };
        let Some((scene, index)) = id.parts() else {
            return Ok(None);
        };
        self.disconnect_action(&scene, index)?;
        Ok(Some(existing))
    }

    // ------------------------------------------------------------------
    // Preview session
    // ------------------------------------------------------------------

    fn session_changed(&mut self) {
        if self.config.redraw_scope == RedrawScope::Visible {
            self.redraw_all_connections();
        }
        self.save_session();
    }

    /// The current scene after evolutions.
    pub fn current_scene(&self) -> Result<Option<&Scene>, EditorError> {
        Ok(self.session.current(self.graph.data())?)
    }

    pub fn current_text(&self) -> Result<Option<&str>, EditorError> {
        Ok(self.session.current_text(self.graph.data())?)
    }

    pub fn go_to_scene(&mut self, scene: &SceneId) -> Result<Option<SceneId>, EditorError> {
        let landed = self.session.go_to_scene(self.graph.data(), scene)?;
        self.session_changed();
        Ok(landed)
    }

    /// Take action `index` of `scene` in the preview session.
    ///
    /// A dead-end action fails without changing the session.
    pub fn perform_action(
        &mut self,
        scene: &SceneId,
        index: usize,
    ) -> Result<Option<SceneId>, EditorError> {
        let landed = self
            .session
            .perform_action_at(self.graph.data(), scene, index)?;
        self.session_changed();
        Ok(landed)
    }

    pub fn add_progression(
        &mut self,
        slug: impl Into<ProgressionSlug>,
    ) -> Result<bool, EditorError> {
        let added = self
            .session
            .add_progression(self.graph.data(), slug.into())?;
        if added {
            self.session_changed();
        }
        Ok(added)
    }

    pub fn remove_progression(&mut self, slug: &ProgressionSlug) -> Result<bool, EditorError> {
        let removed = self.session.remove_progression(self.graph.data(), slug)?;
        if removed {
            self.session_changed();
        }
        Ok(removed)
    }

    pub fn reset_session(&mut self) -> Result<(), EditorError> {
        self.session.reset(self.graph.data())?;
        self.session_changed();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Assistant
    // ------------------------------------------------------------------

    /// Scenes from the initial scene to `scene`, or just `scene` when the
    /// story offers no route there.
    pub fn scene_path(&self, scene: &SceneId) -> Vec<Scene> {
        let data = self.graph.data();
        let path = data
            .initial_scene
            .as_ref()
            .map(|start| path_between(data, start, scene))
            .unwrap_or_default();
        if path.is_empty() {
            return data.scene(scene).cloned().into_iter().collect();
        }
        path.into_iter().cloned().collect()
    }

    /// Ask `assistant` for the scene behind action `index` of `scene`.
    pub async fn generate_scene(
        &self,
        assistant: &dyn SceneAssistant,
        scene: &SceneId,
        index: usize,
        notes: Option<String>,
    ) -> Result<GeneratedScene, EditorError> {
        let action = self.graph.action(scene, index)?;
        let mut request = SceneRequest::new(self.scene_path(scene), action.title.clone());
        request.notes = notes;
        debug!(scene = %scene, index, "generating scene");
        Ok(assistant.generate_scene(&request).await?)
    }

    /// Insert a generated scene behind action `index` of `scene`.
    ///
    /// The new scene gets a fresh id, the action is joined to it and it is
    /// placed to the right of its parent. Returns the new id.
    pub fn apply_generated_scene(
        &mut self,
        scene: &SceneId,
        index: usize,
        generated: GeneratedScene,
    ) -> Result<SceneId, EditorError> {
        self.graph.action(scene, index)?;

        let id = SceneId::random_unique(|id| self.graph.contains(id));
        self.graph.insert_scene(generated.into_scene(id.clone()));
        self.graph.join_action_to_scene(scene, index, &id)?;

        let at = self.layout.position_of(scene).offset(GENERATED_SCENE_OFFSET);
        self.layout.move_scene(&id, at.x, at.y);
        self.save_layout();
        self.sync();

        info!(parent = %scene, index, scene = %id, "generated scene applied");
        Ok(id)
    }
}
