//! Headless player for scene-graph stories.
//!
//! A simple line-oriented protocol:
//! - A number takes the matching action of the current scene
//! - Lines starting with `#` are commands (status, reset, map, ...)

use scene_core::reachability::reachable_from;
use scene_core::{
    ClaudeSceneAssistant, DirectoryStore, Editor, EditorConfig, EditorError, ProgressionSlug,
    SceneId,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Where the story lives.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayConfig {
    /// Directory holding the story documents.
    pub dir: PathBuf,
    /// Optional game selector.
    pub game: Option<String>,
}

impl Default for PlayConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("public"),
            game: None,
        }
    }
}

/// A parsed input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Take action number `n` (1-based).
    Choose(usize),
    Quit,
    Status,
    Reset,
    Visible,
    Map,
    AddProgression(String),
    RemoveProgression(String),
    Generate { action: usize, notes: Option<String> },
    Help,
    Usage(&'static str),
    Unknown(String),
}

pub fn parse_command(line: &str) -> Command {
    let Some(rest) = line.strip_prefix('#') else {
        return match line.parse::<usize>() {
            Ok(n) if n > 0 => Command::Choose(n),
            _ => Command::Unknown(line.to_string()),
        };
    };

    let parts: Vec<&str> = rest.split_whitespace().collect();
    match parts.as_slice() {
        ["quit"] | ["exit"] => Command::Quit,
        ["status"] => Command::Status,
        ["reset"] => Command::Reset,
        ["visible"] => Command::Visible,
        ["map"] => Command::Map,
        ["help"] => Command::Help,
        ["progress", "add", slug] => Command::AddProgression(slug.to_string()),
        ["progress", "remove", slug] => Command::RemoveProgression(slug.to_string()),
        ["progress", ..] => Command::Usage("#progress add|remove <slug>"),
        ["generate", n, notes @ ..] => match n.parse::<usize>() {
            Ok(action) if action > 0 => Command::Generate {
                action,
                notes: Some(notes.join(" ")).filter(|n| !n.is_empty()),
            },
            _ => Command::Usage("#generate <action number> [notes]"),
        },
        ["generate"] => Command::Usage("#generate <action number> [notes]"),
        _ => Command::Unknown(line.to_string()),
    }
}

fn print_help() {
    println!("[HELP]");
    println!("  <n>                          - Take action number n");
    println!("  #quit                        - Save and exit");
    println!("  #status                      - Show where you are and what has happened");
    println!("  #reset                       - Start the story over");
    println!("  #visible                     - List the scenes unlocked so far");
    println!("  #map                         - List the scenes reachable from here");
    println!("  #progress add|remove <slug>  - Set or clear a story flag");
    println!("  #generate <n> [notes]        - Let the assistant write the scene behind action n");
    println!("  #help                        - Show this help");
}

fn print_scene(editor: &Editor) {
    let scene = match editor.current_scene() {
        Ok(Some(scene)) => scene,
        Ok(None) => {
            println!("[END] You are nowhere. Type #reset to start over.");
            return;
        }
        Err(e) => {
            println!("[ERROR] {e}");
            return;
        }
    };

    let revisited = editor.session().has_visited(&scene.id);
    println!("[SCENE] {}", scene.title);
    for para in scene.display_text(revisited).split("\n\n") {
        println!("{para}");
    }
    println!();
    for (i, action) in scene.actions.iter().enumerate() {
        println!("  {}. {}", i + 1, action.title);
    }
    println!();
}

fn current_scene_id(editor: &Editor) -> Option<SceneId> {
    editor.current_scene().ok().flatten().map(|scene| scene.id.clone())
}

/// Run the player until `#quit` or end of input.
pub async fn run_headless(config: PlayConfig) -> Result<(), EditorError> {
    info!(dir = %config.dir.display(), game = ?config.game, "opening story");
    let mut editor_config = EditorConfig::new();
    if let Some(game) = &config.game {
        editor_config = editor_config.with_game(game.clone());
    }
    let store = Arc::new(DirectoryStore::new(config.dir.clone()));
    let mut editor = Editor::open(editor_config, store).await?;
    let mut assistant: Option<ClaudeSceneAssistant> = None;

    println!("=== {} ===", editor.data().title.as_deref().unwrap_or("Untitled story"));
    println!("Type a number to choose, #help for commands.");
    println!();
    print_scene(&editor);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_command(line) {
            Command::Quit => {
                println!("Goodbye!");
                break;
            }
            Command::Choose(n) => match current_scene_id(&editor) {
                Some(scene) => match editor.perform_action(&scene, n - 1) {
                    Ok(_) => print_scene(&editor),
                    Err(e) => println!("[ERROR] {e}"),
                },
                None => println!("[ERROR] There is no current scene. Type #reset."),
            },
            Command::Status => {
                let session = editor.session();
                println!("[STATUS]");
                match editor.current_scene() {
                    Ok(Some(scene)) => println!("  Scene: {} ({})", scene.title, scene.id),
                    _ => println!("  Scene: none"),
                }
                let progressions: Vec<&str> =
                    session.progressions.iter().map(ProgressionSlug::as_str).collect();
                println!("  Progressions: {}", progressions.join(", "));
                println!("  Visited: {} scenes", session.visited_scenes.len());
                let known: Vec<String> = editor
                    .data()
                    .all_progressions()
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                println!("  Known progressions: {}", known.join(", "));
            }
            Command::Reset => match editor.reset_session() {
                Ok(()) => print_scene(&editor),
                Err(e) => println!("[ERROR] {e}"),
            },
            Command::Visible => {
                println!("[VISIBLE]");
                for scene in editor.visible_scenes() {
                    println!("  {} ({})", scene.title, scene.id);
                }
            }
            Command::Map => {
                println!("[MAP]");
                if let Some(start) = current_scene_id(&editor) {
                    let data = editor.data();
                    for scene in reachable_from(data, &start, &editor.session().progressions) {
                        println!("  {} ({})", scene.title, scene.id);
                    }
                }
            }
            Command::AddProgression(slug) => match editor.add_progression(slug.as_str()) {
                Ok(true) => {
                    println!("[PROGRESS] {slug} added");
                    print_scene(&editor);
                }
                Ok(false) => println!("[PROGRESS] {slug} was already set"),
                Err(e) => println!("[ERROR] {e}"),
            },
            Command::RemoveProgression(slug) => {
                match editor.remove_progression(&ProgressionSlug::new(slug.clone())) {
                    Ok(true) => {
                        println!("[PROGRESS] {slug} removed");
                        print_scene(&editor);
                    }
                    Ok(false) => println!("[PROGRESS] {slug} was not set"),
                    Err(e) => println!("[ERROR] {e}"),
                }
            }
            Command::Generate { action, notes } => {
                let Some(scene) = current_scene_id(&editor) else {
                    println!("[ERROR] There is no current scene. Type #reset.");
                    continue;
                };
                if assistant.is_none() {
                    match ClaudeSceneAssistant::from_env() {
                        Ok(a) => assistant = Some(a),
                        Err(e) => {
                            println!("[ERROR] {e}");
                            continue;
                        }
                    }
                }
                let Some(assistant) = assistant.as_ref() else {
                    continue;
                };

                print!("[GENERATING]");
                stdout.flush().ok();
                let result = editor
                    .generate_scene(assistant, &scene, action - 1, notes)
                    .await;
                print!("\r            \r");
                stdout.flush().ok();

                let applied = result.and_then(|generated| {
                    editor.apply_generated_scene(&scene, action - 1, generated)
                });
                match applied {
                    Ok(id) => {
                        let title = editor
                            .graph()
                            .scene(&id)
                            .map(|s| s.title.clone())
                            .unwrap_or_default();
                        println!("[GENERATED] {title} ({id})");
                    }
                    Err(e) => println!("[ERROR] {e}"),
                }
            }
            Command::Help => print_help(),
            Command::Usage(usage) => println!("[ERROR] Usage: {usage}"),
            Command::Unknown(_) => println!("[ERROR] Unknown command. Type #help for help."),
        }
        stdout.flush().ok();
    }

    editor.save_now().await
}

/// Parse the story location from command line arguments.
pub fn parse_config_from_args(args: &[String]) -> PlayConfig {
    let mut config = PlayConfig::default();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--dir" => {
                if let Some(dir) = args.get(i + 1) {
                    config.dir = PathBuf::from(dir);
                    i += 1;
                }
            }
            "--game" => {
                if let Some(game) = args.get(i + 1) {
                    config.game = Some(game.clone());
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }

    config
}
