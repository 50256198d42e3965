use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::scoring::{contextual_adjustment, Polarity, ScoringPolicy};
use super::{candidate_ids, sort_by_score_desc};
use crate::library::Song;
use crate::memory::UserMemory;
use crate::pipeline::{
    AgentLog, Candidate, PipelineState, SessionContext, Stage, StageOutcome, StateDelta,
    UserPreferences,
};

/// Minimum taste score for a song to be proposed
pub const TASTE_THRESHOLD: f64 = 0.5;

/// Share of the playlist the taste recommender fills
pub const TASTE_SHARE: f64 = 0.7;

/// Additive familiarity score.
///
/// Genre matches are case-insensitive; mood and tag matches are exact.
pub fn score_song_taste(
    song: &Song,
    prefs: &UserPreferences,
    memory: &UserMemory,
    ctx: &SessionContext,
) -> f64 {
    let mut score = 0.0;

    score += 1.5 * prefs.genres.iter().filter(|g| song.has_genre(g)).count() as f64;

    if memory.knows_artist(&song.artist) {
        score += 2.0;
    }

    if let Some(mood) = &song.mood {
        if prefs.moods.contains(mood) {
            score += 1.0;
        }
    }

    score += contextual_adjustment(song, ctx, Polarity::Familiar);

    score += 0.8 * prefs.tags.iter().filter(|t| song.tags.contains(t)).count() as f64;

    if let Some(year) = song.year {
        if prefs.min_year.is_some_and(|min| year >= min) {
            score += 0.3;
        }
        if prefs.max_year.is_some_and(|max| year <= max) {
            score += 0.3;
        }
    }

    if let Some(popularity) = song.popularity {
        score += (popularity as f64 / 100.0) * 0.5;
    }

    if let Some(energy) = song.energy {
        let wants = |m: &str| prefs.moods.iter().any(|p| p.eq_ignore_ascii_case(m));
        if wants("energetic") && energy > 0.7 {
            score += 0.5;
        } else if wants("calm") && energy < 0.4 {
            score += 0.5;
        }
    }

    score
}

fn taste_reason(song: &Song, activity: Option<&str>) -> String {
    let genres = song.genre_summary();
    match activity {
        Some("studying") => format!("Perfect for studying - calm {}", genres),
        Some("party") => format!("Great for party - energetic {}", genres),
        Some(other) => format!("Ideal for {} - {}", other, genres),
        None => format!("Matches your taste in {}", genres),
    }
}

/// Number of familiar picks for a playlist of `size`
pub fn taste_quota(size: usize) -> usize {
    (size as f64 * TASTE_SHARE).ceil() as usize
}

/// Proposes songs that match the user's established taste
pub struct TasteRecommender {
    policy: Arc<dyn ScoringPolicy>,
}

impl TasteRecommender {
    pub fn new(policy: Arc<dyn ScoringPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Stage for TasteRecommender {
    fn name(&self) -> &'static str {
        "taste_recommender"
    }

    async fn run(&self, state: &PipelineState) -> StageOutcome<StateDelta> {
        let memory = &state.user_memory;
        let prefs = &state.preferences;
        let ctx = &state.session_context;

        let mut scored: Vec<(&Song, f64)> = state
            .library
            .songs()
            .iter()
            .filter(|song| !memory.is_disliked(&song.id))
            .map(|song| (song, self.policy.taste_score(song, prefs, memory, ctx)))
            .filter(|(_, score)| *score > TASTE_THRESHOLD)
            .collect();
        sort_by_score_desc(&mut scored);

        let existing = candidate_ids(&state.candidate_tracks);
        let activity = ctx.activity.as_deref();
        let picks: Vec<Candidate> = scored
            .into_iter()
            .take(taste_quota(prefs.size))
            .filter(|(song, _)| !existing.contains(song.id.as_str()))
            .map(|(song, score)| Candidate::familiar(song.clone(), score, taste_reason(song, activity)))
            .collect();

        debug!(count = picks.len(), "Taste candidates selected");

        let details = format!(
            "Added {} tracks for {} based on your taste profile",
            picks.len(),
            activity.unwrap_or("general")
        );
        StageOutcome::Success(
            StateDelta::new()
                .append_candidates(picks)
                .with_log(AgentLog::new("Taste DJ", "recommended", details)),
        )
    }
}
