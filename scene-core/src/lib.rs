//! Scene-graph engine for branching text adventures.
//!
//! This crate provides:
//! - The narrative document model: scenes, actions, progressions, evolutions
//! - Evolution resolution and progression-gated visibility
//! - Editor layout and the connections drawn between scenes
//! - A play session for previewing or playing a story
//! - Debounced persistence and an AI scene-writing assistant
//!
//! # Quick Start
//!
//! ```ignore
//! use scene_core::{DirectoryStore, Editor, EditorConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(DirectoryStore::new("public"));
//!     let mut editor = Editor::open(EditorConfig::new().with_game("forest"), store).await?;
//!
//!     let scene = editor.create_scene_at(100.0, 100.0);
//!     let action = editor.create_action(&scene)?;
//!     let start = editor.data().initial_scene.clone().unwrap_or(scene.clone());
//!     editor.join_action_to_scene(&scene, action, &start)?;
//!
//!     editor.save_now().await?;
//!     Ok(())
//! }
//! ```

pub mod assistant;
pub mod connections;
pub mod editor;
pub mod graph;
pub mod ids;
pub mod layout;
pub mod model;
pub mod persist;
pub mod reachability;
pub mod resolver;
pub mod session;
pub mod testing;

// Primary public API
pub use assistant::{
    AssistantConfig, AssistantError, ClaudeSceneAssistant, GeneratedScene, SceneAssistant,
    SceneRequest,
};
pub use connections::{Connection, ConnectionSynchronizer, FinishedConnection};
pub use editor::{Editor, EditorConfig, EditorError, RedrawScope};
pub use graph::{GraphError, GraphEvent, GraphRepository};
pub use ids::{ConnectionId, ProgressionSlug, SceneId, TextBoxId};
pub use layout::{EditorLayout, EditorPosition, Point, TextBox};
pub use model::{Action, ActionField, GameData, Scene, SceneField};
pub use persist::{
    DebouncedSaver, Debouncer, DirectoryStore, MemoryStore, PersistError, PersistenceGateway,
};
pub use reachability::{path_between, reachable_from, visible_scenes};
pub use resolver::{resolve, EvolutionError};
pub use session::{PlaySession, SessionError};
pub use testing::{GraphBuilder, MockAssistant};
