//! Final ranking.
//!
//! Scores are recomputed multiplicatively from each candidate's base score,
//! then a greedy pass picks songs while keeping artists diverse. Selection is
//! deterministic for a fixed input order; ties keep accumulation order.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use super::scoring::ScoringPolicy;
use crate::library::Song;
use crate::pipeline::{
    AgentLog, Candidate, Intent, PipelineState, SessionContext, SourceAgent, Stage, StageOutcome,
    StateDelta, UserPreferences,
};

/// Artist repeats are allowed until this many distinct artists are selected
pub const DIVERSITY_BOOTSTRAP: usize = 3;

/// Multiplier applied to a candidate's base score for its source
pub fn source_multiplier(source: SourceAgent, novelty_tolerance: f64) -> f64 {
    match source {
        SourceAgent::TasteRecommender => 0.7 + 0.3 * (1.0 - novelty_tolerance),
        SourceAgent::Explorer => 0.5 + 0.5 * novelty_tolerance,
    }
}

/// Composite score for one candidate
pub fn multi_objective_score(
    candidate: &Candidate,
    intent: &Intent,
    prefs: &UserPreferences,
    ctx: &SessionContext,
) -> f64 {
    let mut score = candidate.score;

    if *intent == Intent::Recommend {
        score *= source_multiplier(candidate.source, prefs.novelty_tolerance);
    }

    score *= candidate.confidence;

    let song = &candidate.song;
    let energy = song.energy;
    if let Some(activity) = ctx.activity_lower() {
        if activity.contains("gym") || activity.contains("workout") {
            match energy {
                Some(e) if e > 0.7 => score *= 1.3,
                Some(e) if e < 0.4 => score *= 0.6,
                _ => {}
            }
        } else if (activity.contains("chill") || activity.contains("study"))
            && energy.is_some_and(|e| e < 0.4)
        {
            score *= 1.2;
        }
    }

    if let (Some(mood), Some(song_mood)) = (ctx.mood_lower(), song.mood.as_deref()) {
        if song_mood.to_lowercase().contains(&mood) {
            score *= 1.2;
        }
    }

    score
}

/// Greedy artist-diverse selection over candidates already sorted by score.
///
/// The first pass skips an artist that was already used once at least
/// [`DIVERSITY_BOOTSTRAP`] distinct artists are in. If that under-fills `size`,
/// a second pass fills the remaining slots in score order, skipping only ids
/// already selected.
pub fn select_diverse(ranked: &[Candidate], size: usize) -> Vec<&Candidate> {
    let mut selected: Vec<&Candidate> = Vec::with_capacity(size.min(ranked.len()));
    let mut seen_ids: HashSet<&str> = HashSet::new();
    let mut seen_artists: HashSet<&str> = HashSet::new();

    for candidate in ranked {
        if selected.len() >= size {
            break;
        }
        let song = &candidate.song;
        if seen_ids.contains(song.id.as_str()) {
            continue;
        }
        if !seen_artists.contains(song.artist.as_str()) || seen_artists.len() < DIVERSITY_BOOTSTRAP {
            selected.push(candidate);
            seen_ids.insert(&song.id);
            seen_artists.insert(&song.artist);
        }
    }

    if selected.len() < size {
        for candidate in ranked {
            if selected.len() >= size {
                break;
            }
            if seen_ids.insert(&candidate.song.id) {
                selected.push(candidate);
            }
        }
    }

    selected.truncate(size);
    selected
}

/// Reranks candidates and curates the final playlist
pub struct Critic {
    policy: Arc<dyn ScoringPolicy>,
}

impl Critic {
    pub fn new(policy: Arc<dyn ScoringPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Stage for Critic {
    fn name(&self) -> &'static str {
        "critic"
    }

    async fn run(&self, state: &PipelineState) -> StageOutcome<StateDelta> {
        let mut ranked: Vec<Candidate> = state
            .candidate_tracks
            .iter()
            .map(|c| Candidate {
                score: self.policy.rerank_score(
                    c,
                    &state.intent,
                    &state.preferences,
                    &state.session_context,
                ),
                ..c.clone()
            })
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        let selected = select_diverse(&ranked, state.preferences.size);
        let familiar = selected
            .iter()
            .filter(|c| c.source == SourceAgent::TasteRecommender)
            .count();
        let novel = selected.len() - familiar;
        let playlist: Vec<Song> = selected.iter().map(|c| c.song.clone()).collect();

        debug!(
            candidates = ranked.len(),
            selected = playlist.len(),
            "Playlist curated"
        );

        let details = format!(
            "Final playlist: {} tracks ({} familiar, {} novel)",
            playlist.len(),
            familiar,
            novel
        );
        StageOutcome::Success(StateDelta {
            final_playlist: Some(playlist),
            ..StateDelta::new()
                .replace_candidates(ranked)
                .with_log(AgentLog::new("Critic", "curated", details))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::HeuristicPolicy;
    use crate::library::Library;

    const EPS: f64 = 1e-9;

    fn cand(id: &str, artist: &str, score: f64) -> Candidate {
        Candidate::familiar(Song::new(id, id, artist), score, "r")
    }

    fn ids(selected: &[&Candidate]) -> Vec<String> {
        selected.iter().map(|c| c.song.id.clone()).collect()
    }

    #[test]
    fn test_zero_tolerance_multipliers() {
        assert!((source_multiplier(SourceAgent::TasteRecommender, 0.0) - 1.0).abs() < EPS);
        assert!((source_multiplier(SourceAgent::Explorer, 0.0) - 0.5).abs() < EPS);
    }

    #[test]
    fn test_score_ignores_source_weight_for_other_intents() {
        let c = cand("1", "A", 2.0);
        let prefs = UserPreferences::default();
        let ctx = SessionContext::default();
        assert!((multi_objective_score(&c, &Intent::Explain, &prefs, &ctx) - 1.8).abs() < EPS);
        // 2.0 * (0.7 + 0.3 * 0.7) * 0.9
        assert!((multi_objective_score(&c, &Intent::Recommend, &prefs, &ctx) - 1.638).abs() < EPS);
    }

    #[test]
    fn test_context_multipliers() {
        let mut c = cand("1", "A", 1.0);
        c.song = c.song.with_energy(0.9).with_mood("Energetic vibes");
        let ctx = SessionContext::default().with_activity("Gym").with_mood("energetic");
        let score = multi_objective_score(&c, &Intent::Explain, &UserPreferences::default(), &ctx);
        assert!((score - 0.9 * 1.3 * 1.2).abs() < EPS);

        let mut calm = cand("2", "B", 1.0);
        calm.song = calm.song.with_energy(0.2);
        let ctx = SessionContext::default().with_activity("study session");
        let score = multi_objective_score(&calm, &Intent::Explain, &UserPreferences::default(), &ctx);
        assert!((score - 0.9 * 1.2).abs() < EPS);
    }

    #[test]
    fn test_bootstrap_allows_early_repeats() {
        let ranked = vec![
            cand("1", "A", 5.0),
            cand("2", "A", 4.0),
            cand("3", "B", 3.0),
            cand("4", "A", 2.0),
            cand("5", "C", 1.0),
        ];
        // second A is allowed while fewer than three artists are in
        let selected = select_diverse(&ranked, 3);
        assert_eq!(ids(&selected), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_diversity_enforced_after_three_artists() {
        let ranked = vec![
            cand("1", "A", 6.0),
            cand("2", "B", 5.0),
            cand("3", "C", 4.0),
            cand("4", "A", 3.0),
            cand("5", "D", 2.0),
        ];
        let selected = select_diverse(&ranked, 4);
        assert_eq!(ids(&selected), vec!["1", "2", "3", "5"]);
    }

    #[test]
    fn test_repair_pass_fills_with_repeats() {
        let ranked = vec![
            cand("1", "A", 6.0),
            cand("2", "B", 5.0),
            cand("3", "C", 4.0),
            cand("4", "A", 3.0),
            cand("5", "B", 2.0),
        ];
        let selected = select_diverse(&ranked, 5);
        assert_eq!(ids(&selected), vec!["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let ranked = vec![
            cand("x", "A", 3.0),
            Candidate::discovery(Song::new("x", "x", "A"), 2.0, 0.9, "r"),
            cand("y", "B", 1.0),
        ];
        let selected = select_diverse(&ranked, 10);
        assert_eq!(ids(&selected), vec!["x", "y"]);
        assert_eq!(selected[0].source, SourceAgent::TasteRecommender);
    }

    #[tokio::test]
    async fn test_stage_selects_and_logs() {
        let library = Arc::new(Library::from_songs(Vec::new()).unwrap());
        let mut state = PipelineState::new("q", "u", library);
        state.preferences.size = 2;
        state.candidate_tracks = vec![
            cand("1", "A", 1.0),
            Candidate::discovery(Song::new("2", "2", "B"), 3.0, 0.9, "r"),
            cand("3", "C", 0.5),
        ];

        let critic = Critic::new(Arc::new(HeuristicPolicy));
        let delta = critic.run(&state).await.into_value().unwrap();
        let state = state.apply(delta);

        let playlist: Vec<&str> = state.final_playlist.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(playlist, vec!["2", "1"]);
        assert_eq!(
            state.logs()[0].details(),
            "Final playlist: 2 tracks (1 familiar, 1 novel)"
        );
    }
}
