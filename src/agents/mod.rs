//! Pipeline agents.
//!
//! Each agent is a [`Stage`](crate::pipeline::Stage):
//! - [`Orchestrator`]: query to intent, preferences and session context
//! - [`MemoryLoader`]: fills empty preference lists from the stored profile
//! - [`TasteRecommender`]: familiar candidates
//! - [`Explorer`]: novel candidates from unknown artists
//! - [`SafetyFilter`]: drops candidates that violate content policy
//! - [`Critic`]: multi-objective rerank and artist-diverse selection
//! - [`Namer`]: playlist title and description
//! - [`Explainer`]: user-facing explanation
//! - [`FeedbackProcessor`]: likes, dislikes and novelty adjustments
//!
//! [`Refiner`] is not a stage; it turns free-text feedback on a finished
//! playlist into preference adjustments for the next run.

mod critic;
mod explainer;
mod explorer;
mod feedback;
mod memory;
mod orchestrator;
mod refiner;
mod safety;
mod scoring;
mod taste;

pub use critic::*;
pub use explainer::*;
pub use explorer::*;
pub use feedback::*;
pub use memory::*;
pub use orchestrator::*;
pub use refiner::*;
pub use safety::*;
pub use scoring::*;
pub use taste::*;

use std::collections::HashSet;

use crate::pipeline::Candidate;

/// Extract JSON from a completion string, handling markdown code blocks.
///
/// Attempts extraction in this order:
/// 1. Raw JSON
/// 2. ```json ... ``` blocks
/// 3. ``` ... ``` blocks
pub(crate) fn extract_json_from_completion(completion: &str) -> Result<&str, String> {
    let trimmed = completion.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(trimmed);
    }

    if completion.contains("```json") {
        return completion
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ```json block but content was empty or malformed".to_string());
    }

    if completion.contains("```") {
        return completion
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ``` block but content was empty or malformed".to_string());
    }

    Err(format!(
        "No JSON found in response. First 100 chars: '{}'",
        completion.chars().take(100).collect::<String>()
    ))
}

/// Ids of candidates already accumulated in the state
pub(crate) fn candidate_ids(candidates: &[Candidate]) -> HashSet<&str> {
    candidates.iter().map(|c| c.song.id.as_str()).collect()
}

/// Sort by score, highest first. Stable, so ties keep input order.
pub(crate) fn sort_by_score_desc<T>(items: &mut [(T, f64)]) {
    items.sort_by(|a, b| b.1.total_cmp(&a.1));
}
