use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::memory::{MemoryStore, UserMemory};
use crate::pipeline::{AgentLog, PipelineState, Stage, StageOutcome, StateDelta, UserPreferences};

/// Caps on how much of the stored profile flows into one request
pub const MAX_MEMORY_GENRES: usize = 5;
pub const MAX_MEMORY_MOODS: usize = 3;
pub const MAX_MEMORY_ARTISTS: usize = 5;

fn fill_if_empty(target: &mut Vec<String>, source: &[String], cap: usize) {
    if target.is_empty() {
        *target = source.iter().take(cap).cloned().collect();
    }
}

/// Fill preference lists the request left empty from the stored profile
pub fn apply_memory_defaults(prefs: &UserPreferences, memory: &UserMemory) -> UserPreferences {
    let mut prefs = prefs.clone();
    fill_if_empty(&mut prefs.genres, &memory.preferred_genres, MAX_MEMORY_GENRES);
    fill_if_empty(&mut prefs.moods, &memory.preferred_moods, MAX_MEMORY_MOODS);
    fill_if_empty(&mut prefs.artists, &memory.preferred_artists, MAX_MEMORY_ARTISTS);
    prefs
}

fn profile_summary(memory: &UserMemory) -> String {
    let mut parts = Vec::new();
    if !memory.preferred_genres.is_empty() {
        parts.push(format!(
            "Genres: {}",
            memory.preferred_genres.iter().take(3).cloned().collect::<Vec<_>>().join(", ")
        ));
    }
    if !memory.preferred_artists.is_empty() {
        parts.push(format!(
            "Artists: {}",
            memory.preferred_artists.iter().take(3).cloned().collect::<Vec<_>>().join(", ")
        ));
    }
    if parts.is_empty() {
        "No prior history".to_string()
    } else {
        parts.join("; ")
    }
}

/// Loads the persisted profile and snapshots it into the run
pub struct MemoryLoader {
    store: Arc<dyn MemoryStore>,
}

impl MemoryLoader {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for MemoryLoader {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn run(&self, state: &PipelineState) -> StageOutcome<StateDelta> {
        let (memory, failure) = match self.store.load(&state.user_id).await {
            Ok(memory) => (memory, None),
            Err(e) => {
                warn!(user_id = %state.user_id, error = %e, "Failed to load user memory");
                (UserMemory::default(), Some(e.to_string()))
            }
        };

        debug!(
            user_id = %state.user_id,
            liked = memory.liked_songs.len(),
            disliked = memory.disliked_songs.len(),
            "User memory loaded"
        );

        let delta = StateDelta {
            preferences: Some(apply_memory_defaults(&state.preferences, &memory)),
            ..Default::default()
        }
        .with_log(AgentLog::new("Memory Agent", "loaded_profile", profile_summary(&memory)));
        let delta = StateDelta {
            user_memory: Some(memory),
            ..delta
        };

        match failure {
            None => StageOutcome::Success(delta),
            Some(reason) => StageOutcome::degraded(delta, reason),
        }
    }
}
