//! Persisted user memory: the only state that outlives a pipeline run.
//!
//! Two backends implement [`MemoryStore`]:
//! - [`JsonFileStore`]: one JSON document shared by every user id
//! - [`SqliteMemoryStore`]: one row per user id, plus a log of pipeline runs
//!
//! Both serialize read-modify-write through [`MemoryStore::update`].

mod json;
mod sqlite;

pub use json::JsonFileStore;
pub use sqlite::SqliteMemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::library::Song;

/// Long-term taste profile for one user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMemory {
    #[serde(default)]
    pub liked_songs: Vec<String>,
    #[serde(default)]
    pub disliked_songs: Vec<String>,
    #[serde(default)]
    pub preferred_genres: Vec<String>,
    #[serde(default)]
    pub preferred_moods: Vec<String>,
    #[serde(default)]
    pub preferred_artists: Vec<String>,
    #[serde(default)]
    pub listening_history: Vec<String>,
}

fn push_unique(list: &mut Vec<String>, value: &str) -> bool {
    if list.iter().any(|v| v == value) {
        false
    } else {
        list.push(value.to_string());
        true
    }
}

impl UserMemory {
    /// Record a like and fold the song's genres, mood and artist into the profile.
    ///
    /// Idempotent. A previously disliked id is moved to the liked list.
    pub fn record_like(&mut self, song: &Song) {
        self.disliked_songs.retain(|id| id != &song.id);
        push_unique(&mut self.liked_songs, &song.id);

        for genre in &song.genres {
            push_unique(&mut self.preferred_genres, genre);
        }
        if let Some(mood) = song.mood.as_deref().filter(|m| !m.is_empty()) {
            push_unique(&mut self.preferred_moods, mood);
        }
        if !song.artist.is_empty() {
            push_unique(&mut self.preferred_artists, &song.artist);
        }
    }

    /// Record a dislike. Idempotent; a previously liked id is removed from likes.
    pub fn record_dislike(&mut self, song_id: &str) {
        self.liked_songs.retain(|id| id != song_id);
        push_unique(&mut self.disliked_songs, song_id);
    }

    pub fn is_disliked(&self, song_id: &str) -> bool {
        self.disliked_songs.iter().any(|id| id == song_id)
    }

    pub fn knows_artist(&self, artist: &str) -> bool {
        self.preferred_artists.iter().any(|a| a == artist)
    }

    pub fn is_empty(&self) -> bool {
        self == &UserMemory::default()
    }
}

/// Mutation applied inside [`MemoryStore::update`]
pub type MemoryUpdate = Box<dyn FnOnce(&mut UserMemory) + Send>;

/// Load/save access to persisted user memory
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Load the profile; a user with nothing stored gets an empty profile.
    async fn load(&self, user_id: &str) -> StorageResult<UserMemory>;

    /// Overwrite the stored profile.
    async fn save(&self, user_id: &str, memory: &UserMemory) -> StorageResult<()>;

    /// Read-modify-write under the store's lock, returning the saved profile.
    async fn update(&self, user_id: &str, apply: MemoryUpdate) -> StorageResult<UserMemory>;
}

/// Summary of one pipeline run, kept for later inspection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub user_id: String,
    pub query: String,
    pub intent: String,
    pub playlist: Vec<String>,
    pub explanation: Option<String>,
    /// Stages that fell back to a heuristic or template
    pub degraded_stages: Vec<String>,
    pub error: Option<String>,
    pub latency_ms: i64,
    pub created_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn new(user_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            query: query.into(),
            intent: String::new(),
            playlist: Vec::new(),
            explanation: None,
            degraded_stages: Vec::new(),
            error: None,
            latency_ms: 0,
            created_at: Utc::now(),
        }
    }
}

/// Sink for [`RunRecord`]s
#[async_trait]
pub trait RunRecorder: Send + Sync {
    async fn record_run(&self, run: &RunRecord) -> StorageResult<()>;
}

/// Recorder that keeps nothing; used with the JSON backend
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

#[async_trait]
impl RunRecorder for NoopRecorder {
    async fn record_run(&self, _run: &RunRecord) -> StorageResult<()> {
        Ok(())
    }
}
