//! Opaque identifier types.
//!
//! Scene ids, progression slugs, connection ids and text-box ids are all
//! strings on disk, but distinct types in code so they cannot be mixed up.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_LENGTH: usize = 9;

fn random_base36() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LENGTH)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Unique identifier of a scene.
    SceneId
);

string_id!(
    /// A story flag that an action can trigger once per playthrough.
    ProgressionSlug
);

string_id!(
    /// Identifier of a derived visual connection, `connection-<sceneId>-<actionIndex>`.
    ConnectionId
);

string_id!(
    /// Identifier of a free-floating text annotation on the editor canvas.
    TextBoxId
);

impl SceneId {
    /// Generate a random id that `exists` does not already claim.
    pub fn random_unique(exists: impl Fn(&SceneId) -> bool) -> Self {
        loop {
            let id = Self(random_base36());
            if !exists(&id) {
                return id;
            }
        }
    }
}

impl TextBoxId {
    /// Generate a random id that `exists` does not already claim.
    pub fn random_unique(exists: impl Fn(&TextBoxId) -> bool) -> Self {
        loop {
            let id = Self(random_base36());
            if !exists(&id) {
                return id;
            }
        }
    }
}

const CONNECTION_PREFIX: &str = "connection-";

impl ConnectionId {
    /// The connection that projects action `index` of `scene`.
    pub fn for_action(scene: &SceneId, index: usize) -> Self {
        Self(format!("{CONNECTION_PREFIX}{scene}-{index}"))
    }

    /// Decode back into `(scene, action index)`.
    ///
    /// Splits on the last `-`, so scene ids that themselves contain dashes
    /// round-trip correctly.
    pub fn parts(&self) -> Option<(SceneId, usize)> {
        let rest = self.0.strip_prefix(CONNECTION_PREFIX)?;
        let (scene, index) = rest.rsplit_once('-')?;
        if scene.is_empty() {
            return None;
        }
        let index = index.parse().ok()?;
        Some((SceneId::new(scene), index))
    }

    /// The scene whose action this connection starts from.
    pub fn source_scene(&self) -> Option<SceneId> {
        self.parts().map(|(scene, _)| scene)
    }
}
