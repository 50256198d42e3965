use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::memory::{MemoryStore, MemoryUpdate};
use crate::pipeline::{AgentLog, FeedbackEvent, PipelineState, Stage, StageOutcome, StateDelta};

fn memory_update(event: &FeedbackEvent) -> MemoryUpdate {
    let liked = event.liked_song.clone();
    let disliked = event.disliked_song.as_ref().map(|s| s.id.clone());
    Box::new(move |memory| {
        if let Some(song) = &liked {
            memory.record_like(song);
        }
        if let Some(id) = &disliked {
            memory.record_dislike(id);
        }
    })
}

fn feedback_summary(event: &FeedbackEvent) -> Option<String> {
    let (kind, song) = match (&event.liked_song, &event.disliked_song) {
        (Some(song), _) => ("liked", song),
        (None, Some(song)) => ("disliked", song),
        (None, None) => return None,
    };
    Some(format!("User {} '{}', updated taste profile", kind, song.name))
}

/// Persists likes and dislikes and applies novelty adjustments.
///
/// A run without feedback passes through untouched.
pub struct FeedbackProcessor {
    store: Arc<dyn MemoryStore>,
}

impl FeedbackProcessor {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for FeedbackProcessor {
    fn name(&self) -> &'static str {
        "feedback"
    }

    async fn run(&self, state: &PipelineState) -> StageOutcome<StateDelta> {
        let Some(event) = &state.feedback else {
            return StageOutcome::Success(StateDelta::new());
        };

        let mut delta = StateDelta::new();
        let mut failure = None;

        if let Some(summary) = feedback_summary(event) {
            match self.store.update(&state.user_id, memory_update(event)).await {
                Ok(memory) => {
                    info!(user_id = %state.user_id, "Feedback persisted");
                    delta.user_memory = Some(memory);
                }
                Err(e) => {
                    warn!(user_id = %state.user_id, error = %e, "Failed to persist feedback");
                    failure = Some(e.to_string());
                }
            }
            delta = delta.with_log(AgentLog::new("Feedback Agent", "processed_feedback", summary));
        }

        if let Some(adjustment) = event.adjust_novelty {
            let mut preferences = state.preferences.clone();
            let before = preferences.novelty_tolerance;
            preferences.set_novelty_tolerance(before + adjustment);
            let details = format!(
                "Novelty tolerance: {:.2} -> {:.2}",
                before, preferences.novelty_tolerance
            );
            delta = delta
                .with_preferences(preferences)
                .with_log(AgentLog::new("Feedback Agent", "adjusted_novelty", details));
        }

        match failure {
            None => StageOutcome::Success(delta),
            Some(reason) => StageOutcome::degraded(delta, reason),
        }
    }
}
