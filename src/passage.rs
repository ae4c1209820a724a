//! Passages to type, where they come from, and background loading.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use include_dir::{include_dir, Dir};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

static PASSAGE_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/passages");

pub const CUSTOM_THEME: &str = "custom";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// A block of text to type, in the text-store item shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    #[serde(rename = "TextID")]
    pub id: String,
    #[serde(rename = "Theme")]
    pub theme: String,
    #[serde(rename = "ParagraphText")]
    pub body: String,
    #[serde(rename = "Difficulty", default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(rename = "Source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(rename = "Length", default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
}

impl Passage {
    pub fn custom(body: impl Into<String>) -> Self {
        Self {
            id: CUSTOM_THEME.to_string(),
            theme: CUSTOM_THEME.to_string(),
            body: body.into(),
            difficulty: None,
            source: None,
            length: None,
        }
    }

    /// Length in characters; the stored `Length` is advisory only.
    pub fn char_len(&self) -> usize {
        self.body.chars().count()
    }

    pub fn is_typeable(&self) -> bool {
        !self.body.trim().is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassageRequest {
    pub theme: String,
    pub count: usize,
}

impl PassageRequest {
    pub fn new(theme: impl Into<String>, count: usize) -> Self {
        Self {
            theme: theme.into(),
            count: count.max(1),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PassageError {
    #[error("passage source unavailable: {0}")]
    Unavailable(String),
    #[error("no passages for theme '{theme}'")]
    Empty { theme: String },
    #[error("unknown theme '{0}'")]
    UnknownTheme(String),
    #[error("failed to read passages: {0}")]
    Io(String),
    #[error("malformed passages: {0}")]
    Parse(String),
}

/// A store of passages that can be queried by theme.
pub trait PassageSource: Send + Sync {
    fn fetch_passages(&self, request: &PassageRequest) -> Result<Vec<Passage>, PassageError>;

    fn themes(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Passages compiled into the binary, one JSON file per theme.
#[derive(Clone, Copy, Debug, Default)]
pub struct BundledPassages;

impl BundledPassages {
    fn load(theme: &str) -> Result<Vec<Passage>, PassageError> {
        let file = PASSAGE_DIR
            .get_file(format!("{}.json", theme.to_lowercase()))
            .ok_or_else(|| PassageError::UnknownTheme(theme.to_string()))?;
        let contents = file
            .contents_utf8()
            .ok_or_else(|| PassageError::Parse(format!("{theme}.json is not utf-8")))?;
        parse_passages(contents)
    }
}

impl PassageSource for BundledPassages {
    fn fetch_passages(&self, request: &PassageRequest) -> Result<Vec<Passage>, PassageError> {
        let mut passages = Self::load(&request.theme)?;
        passages.shuffle(&mut rand::thread_rng());
        passages.truncate(request.count);
        Ok(passages)
    }

    fn themes(&self) -> Vec<String> {
        let mut themes: Vec<String> = PASSAGE_DIR
            .files()
            .filter_map(|f| f.path().file_stem())
            .filter_map(|s| s.to_str())
            .map(str::to_string)
            .collect();
        themes.sort();
        themes
    }
}

/// Passages read from a JSON array on disk.
#[derive(Clone, Debug)]
pub struct FilePassages {
    path: PathBuf,
}

impl FilePassages {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn load(&self) -> Result<Vec<Passage>, PassageError> {
        let contents = fs::read_to_string(&self.path)
            .map_err(|e| PassageError::Io(format!("{}: {e}", self.path.display())))?;
        parse_passages(&contents)
    }
}

impl PassageSource for FilePassages {
    fn fetch_passages(&self, request: &PassageRequest) -> Result<Vec<Passage>, PassageError> {
        let mut passages: Vec<Passage> = self
            .load()?
            .into_iter()
            .filter(|p| p.theme.eq_ignore_ascii_case(&request.theme))
            .collect();
        passages.shuffle(&mut rand::thread_rng());
        passages.truncate(request.count);
        Ok(passages)
    }

    fn themes(&self) -> Vec<String> {
        let mut themes: Vec<String> = self
            .load()
            .unwrap_or_default()
            .into_iter()
            .map(|p| p.theme.to_lowercase())
            .collect();
        themes.sort();
        themes.dedup();
        themes
    }
}

/// A single fixed passage, whatever theme is asked for.
#[derive(Clone, Debug)]
pub struct CustomPassage {
    passage: Passage,
}

impl CustomPassage {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            passage: Passage::custom(body),
        }
    }
}

impl PassageSource for CustomPassage {
    fn fetch_passages(&self, _request: &PassageRequest) -> Result<Vec<Passage>, PassageError> {
        Ok(vec![self.passage.clone()])
    }

    fn themes(&self) -> Vec<String> {
        vec![CUSTOM_THEME.to_string()]
    }
}

fn parse_passages(contents: &str) -> Result<Vec<Passage>, PassageError> {
    serde_json::from_str(contents).map_err(|e| PassageError::Parse(e.to_string()))
}

/// Fetch candidates for `request` and pick one. An empty result, or one
/// with only blank bodies, is a failure.
pub fn request_passage(
    source: &dyn PassageSource,
    request: &PassageRequest,
) -> Result<Passage, PassageError> {
    let candidates: Vec<Passage> = source
        .fetch_passages(request)?
        .into_iter()
        .filter(Passage::is_typeable)
        .collect();

    candidates
        .choose(&mut rand::thread_rng())
        .cloned()
        .ok_or_else(|| PassageError::Empty {
            theme: request.theme.clone(),
        })
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Ready(Passage),
    Failed(PassageError),
}

type LoadResult = (u64, Result<Passage, PassageError>);

/// Fetches passages off the UI thread. Only the most recent request's
/// result is ever surfaced; answers to superseded requests are dropped.
pub struct PassageLoader {
    source: Arc<dyn PassageSource>,
    tx: Sender<LoadResult>,
    rx: Receiver<LoadResult>,
    generation: u64,
    state: LoadState,
}

impl std::fmt::Debug for PassageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassageLoader")
            .field("generation", &self.generation)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl PassageLoader {
    pub fn new(source: Arc<dyn PassageSource>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            source,
            tx,
            rx,
            generation: 0,
            state: LoadState::Idle,
        }
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == LoadState::Loading
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn themes(&self) -> Vec<String> {
        self.source.themes()
    }

    /// Start a fetch, superseding any request still in flight.
    pub fn request(&mut self, request: PassageRequest) -> u64 {
        self.generation += 1;
        let generation = self.generation;
        self.state = LoadState::Loading;

        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        debug!(target: "passage", generation, theme = %request.theme, "requesting passage");
        std::thread::spawn(move || {
            let result = request_passage(source.as_ref(), &request);
            // receiver gone means the app is shutting down
            let _ = tx.send((generation, result));
        });
        generation
    }

    /// Drain finished fetches without blocking. Returns the result of the
    /// current request if it arrived.
    pub fn poll(&mut self) -> Option<Result<Passage, PassageError>> {
        let mut latest = None;
        while let Ok(msg) = self.rx.try_recv() {
            if let Some(result) = self.accept(msg) {
                latest = Some(result);
            }
        }
        latest
    }

    /// Block up to `timeout` for the current request's result.
    pub fn wait(&mut self, timeout: Duration) -> Option<Result<Passage, PassageError>> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(msg) => {
                    if let Some(result) = self.accept(msg) {
                        return Some(result);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None
                }
            }
        }
    }

    fn accept(&mut self, (generation, result): LoadResult) -> Option<Result<Passage, PassageError>> {
        if generation != self.generation {
            debug!(target: "passage", generation, current = self.generation, "stale passage dropped");
            return None;
        }
        match &result {
            Ok(p) => {
                info!(target: "passage", id = %p.id, theme = %p.theme, "passage ready");
                self.state = LoadState::Ready(p.clone());
            }
            Err(e) => {
                warn!(target: "passage", error = %e, "passage unavailable");
                self.state = LoadState::Failed(e.clone());
            }
        }
        Some(result)
    }
}
