//! WASM bindings for branch-engine: lets the web editor play a story
//! in the browser.

use wasm_bindgen::prelude::*;

use branch_engine::core::persist;
use branch_engine::core::session::{PlayStatus, PlayView, StorySession};

// ---------------------------------------------------------------------------
// Embedded demo story, compiled into the WASM binary
// ---------------------------------------------------------------------------
mod data {
    pub const CROSSROADS: &str = include_str!("../../stories/crossroads.json");
}

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(serde::Serialize)]
struct ChoiceInfo {
    index: usize,
    text: String,
}

#[derive(serde::Serialize)]
struct ViewInfo {
    node: Option<u64>,
    header: String,
    choices: Vec<ChoiceInfo>,
    /// "active", "ended" or "dead_end".
    status: &'static str,
    path: Vec<u64>,
    skipped: Vec<String>,
}

impl From<PlayView> for ViewInfo {
    fn from(view: PlayView) -> Self {
        let status = match view.status {
            PlayStatus::Active => "active",
            PlayStatus::Ended => "ended",
            PlayStatus::DeadEnd(_) => "dead_end",
        };
        ViewInfo {
            node: view.node.map(|id| id.0),
            header: view.header,
            choices: view
                .choices
                .into_iter()
                .enumerate()
                .map(|(index, choice)| ChoiceInfo {
                    index,
                    text: choice.text,
                })
                .collect(),
            status,
            path: view.path.into_iter().map(|id| id.0).collect(),
            skipped: view
                .skipped
                .into_iter()
                .map(|skip| format!("{}: {}", skip.source, skip.error))
                .collect(),
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JsError> {
    serde_json::to_string(value).map_err(|e| JsError::new(&format!("Serialization error: {e}")))
}

// ---------------------------------------------------------------------------
// Exported player
// ---------------------------------------------------------------------------
#[wasm_bindgen]
pub struct StoryPlayer {
    session: StorySession,
}

#[wasm_bindgen]
impl StoryPlayer {
    /// Create a player from a story in the JSON save format.
    #[wasm_bindgen(constructor)]
    pub fn new(story_json: &str, seed: u64) -> Result<StoryPlayer, JsError> {
        let story = persist::from_json(story_json)
            .map_err(|e| JsError::new(&format!("Story parse error: {e}")))?;
        let session = StorySession::builder()
            .seed(seed)
            .with_story(story)
            .build()
            .map_err(|e| JsError::new(&format!("Session build error: {e}")))?;
        Ok(StoryPlayer { session })
    }

    /// A player loaded with the bundled demo story.
    pub fn demo(seed: u64) -> Result<StoryPlayer, JsError> {
        StoryPlayer::new(data::CROSSROADS, seed)
    }

    /// Reset to the story's defaults and enter the start node. Returns the
    /// view as JSON.
    pub fn start(&mut self) -> Result<String, JsError> {
        let view = self
            .session
            .start_play()
            .map_err(|e| JsError::new(&format!("Play error: {e}")))?;
        to_json(&ViewInfo::from(view))
    }

    /// Pick a visible choice by its position in the last view.
    pub fn choose(&mut self, index: usize) -> Result<String, JsError> {
        let view = self
            .session
            .choose(index)
            .map_err(|e| JsError::new(&format!("Play error: {e}")))?;
        to_json(&ViewInfo::from(view))
    }

    /// The current view as JSON, or `null` before `start`.
    pub fn view_json(&mut self) -> Result<String, JsError> {
        let view = self.session.view().map(ViewInfo::from);
        to_json(&view)
    }

    /// The live variable store as a JSON object.
    pub fn vars_json(&self) -> Result<String, JsError> {
        to_json(&self.session.vars().to_map())
    }

    /// The live inventory as a JSON array.
    pub fn inventory_json(&self) -> Result<String, JsError> {
        let items: Vec<&str> = self.session.inventory().iter().collect();
        to_json(&items)
    }

    /// One line per structural problem, as a JSON array of strings.
    pub fn lint(&mut self) -> Result<String, JsError> {
        let issues: Vec<String> = self
            .session
            .validate()
            .iter()
            .map(ToString::to_string)
            .collect();
        to_json(&issues)
    }

    /// The story in the JSON save format, with the authored defaults.
    pub fn story_json(&self) -> Result<String, JsError> {
        persist::to_json(&self.session.story())
            .map_err(|e| JsError::new(&format!("Serialization error: {e}")))
    }

    /// Rebuild the player on the same story with a new seed.
    pub fn reset(&mut self, seed: u64) -> Result<(), JsError> {
        let story = self.session.story();
        self.session = StorySession::builder()
            .seed(seed)
            .with_story(story)
            .build()
            .map_err(|e| JsError::new(&format!("Session build error: {e}")))?;
        Ok(())
    }

    pub fn seed(&self) -> u64 {
        self.session.seed()
    }
}
