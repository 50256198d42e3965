use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use super::scoring::{contextual_adjustment, Polarity, ScoringPolicy};
use super::{candidate_ids, sort_by_score_desc};
use crate::library::Song;
use crate::memory::UserMemory;
use crate::pipeline::{AgentLog, Candidate, PipelineState, SessionContext, Stage, StageOutcome, StateDelta};

/// Minimum novelty for a song to be explored
pub const NOVELTY_THRESHOLD: f64 = 0.5;

/// How unfamiliar `song` is to the user, in [0, 1]
pub fn calculate_novelty(song: &Song, memory: &UserMemory) -> f64 {
    let mut novelty = 1.0;

    if memory.knows_artist(&song.artist) {
        novelty -= 0.5;
    }

    let known = &memory.preferred_genres;
    if !known.is_empty() {
        let overlap: HashSet<&String> = song.genres.iter().filter(|g| known.contains(g)).collect();
        novelty -= (overlap.len() as f64 / known.len() as f64) * 0.3;
    }

    if song.popularity.is_some_and(|p| p < 50) {
        novelty += 0.2;
    }

    novelty.clamp(0.0, 1.0)
}

/// Discovery score: novelty, a flat bonus for genres adjacent to known ones,
/// then the discovery context adjustment.
pub fn exploration_score(
    song: &Song,
    novelty: f64,
    memory: &UserMemory,
    ctx: &SessionContext,
) -> f64 {
    let mut score = novelty;

    let adjacent = song.genres.iter().any(|genre| {
        memory
            .preferred_genres
            .iter()
            .any(|known| known.contains(genre.as_str()) || genre.contains(known.as_str()))
    });
    if adjacent {
        score += 0.3;
    }

    score + contextual_adjustment(song, ctx, Polarity::Discovery)
}

fn explorer_reason(song: &Song, activity: Option<&str>) -> String {
    match activity {
        Some("studying") => format!("Unknown calm artist '{}' perfect for studying", song.artist),
        Some("party") => format!("Energetic new artist '{}' great for parties", song.artist),
        Some("gym") => format!("High-energy unknown artist '{}' for workouts", song.artist),
        _ => format!("New artist '{}' with similar energy to your taste", song.artist),
    }
}

/// Number of novel picks targeted for a playlist of `size`
pub fn novelty_target(size: usize, novelty_tolerance: f64) -> usize {
    ((size as f64 * novelty_tolerance).round() as usize).max(1)
}

/// Proposes songs from artists the user does not know yet
pub struct Explorer {
    policy: Arc<dyn ScoringPolicy>,
}

impl Explorer {
    pub fn new(policy: Arc<dyn ScoringPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Stage for Explorer {
    fn name(&self) -> &'static str {
        "explorer"
    }

    async fn run(&self, state: &PipelineState) -> StageOutcome<StateDelta> {
        let memory = &state.user_memory;
        let ctx = &state.session_context;

        let mut scored: Vec<((&Song, f64), f64)> = state
            .library
            .songs()
            .iter()
            .filter(|song| !memory.is_disliked(&song.id) && !memory.knows_artist(&song.artist))
            .filter_map(|song| {
                let novelty = self.policy.novelty(song, memory);
                (novelty > NOVELTY_THRESHOLD).then(|| {
                    let score = self.policy.exploration_score(song, novelty, memory, ctx);
                    ((song, novelty), score)
                })
            })
            .collect();
        sort_by_score_desc(&mut scored);

        let target = novelty_target(state.preferences.size, state.preferences.novelty_tolerance);
        let existing = candidate_ids(&state.candidate_tracks);
        let activity = ctx.activity.as_deref();
        let picks: Vec<Candidate> = scored
            .into_iter()
            .take(target.saturating_mul(2))
            .filter(|((song, _), _)| !existing.contains(song.id.as_str()))
            .map(|((song, novelty), score)| {
                Candidate::discovery(song.clone(), score, novelty, explorer_reason(song, activity))
            })
            .collect();

        debug!(count = picks.len(), target, "Exploration candidates selected");

        let details = format!(
            "Added {} novel tracks for {} from new artists",
            picks.len(),
            activity.unwrap_or("general")
        );
        StageOutcome::Success(
            StateDelta::new()
                .append_candidates(picks)
                .with_log(AgentLog::new("Chaos DJ", "explored", details)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::HeuristicPolicy;
    use crate::library::Library;

    const EPS: f64 = 1e-9;

    fn memory() -> UserMemory {
        UserMemory {
            preferred_artists: vec!["Known".to_string()],
            preferred_genres: vec!["rock".to_string(), "pop".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_novelty_is_clamped() {
        let obscure = Song::new("1", "A", "New").with_popularity(10);
        assert_eq!(calculate_novelty(&obscure, &memory()), 1.0);

        let familiar = Song::new("2", "B", "Known").with_genres(["rock", "pop"]);
        assert!((calculate_novelty(&familiar, &memory()) - 0.2).abs() < EPS);
        assert!((0.0..=1.0).contains(&calculate_novelty(&familiar, &memory())));
    }

    #[test]
    fn test_novelty_genre_overlap_proportional() {
        let song = Song::new("1", "A", "New").with_genres(["rock", "jazz"]);
        assert!((calculate_novelty(&song, &memory()) - 0.85).abs() < EPS);
    }

    #[test]
    fn test_exploration_adjacency_bonus_applied_once() {
        let song = Song::new("1", "A", "New").with_genres(["indie rock", "pop punk"]);
        let score = exploration_score(&song, 0.9, &memory(), &SessionContext::default());
        assert!((score - 1.2).abs() < EPS);
    }

    #[test]
    fn test_novelty_target() {
        assert_eq!(novelty_target(10, 0.3), 3);
        assert_eq!(novelty_target(10, 0.0), 1);
        assert_eq!(novelty_target(10, 0.25), 3);
    }

    #[tokio::test]
    async fn test_explorer_never_returns_known_artists() {
        let songs = vec![
            Song::new("1", "A", "Known").with_popularity(10),
            Song::new("2", "B", "Fresh").with_popularity(10),
            Song::new("3", "C", "Other"),
            Song::new("4", "D", "Disliked"),
        ];
        let library = Arc::new(Library::from_songs(songs).unwrap());
        let mut state = PipelineState::new("q", "u", library);
        state.user_memory = memory();
        state.user_memory.disliked_songs = vec!["4".to_string()];

        let explorer = Explorer::new(Arc::new(HeuristicPolicy));
        let delta = explorer.run(&state).await.into_value().unwrap();
        let state = state.apply(delta);

        let artists: Vec<&str> = state.candidate_tracks.iter().map(|c| c.song.artist.as_str()).collect();
        assert_eq!(artists, vec!["Fresh", "Other"]);
        assert!(state.candidate_tracks.iter().all(|c| c.confidence == 0.6));
        assert_eq!(
            state.candidate_tracks[0].reason,
            "New artist 'Fresh' with similar energy to your taste"
        );
        assert_eq!(
            state.logs()[0].details(),
            "Added 2 novel tracks for general from new artists"
        );
    }
}
