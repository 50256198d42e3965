//! End-to-end pipeline tests
//!
//! Runs the full agent pipeline over a small in-memory library with either
//! the disabled generator (every LLM call falls back) or a scripted one.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use playlist_agents::agents::{DEFAULT_TITLE, EMPTY_PLAYLIST_EXPLANATION};
use playlist_agents::error::{LlmError, LlmResult};
use playlist_agents::library::{Library, Song};
use playlist_agents::llm::{DisabledGenerator, TextGenerator};
use playlist_agents::memory::{JsonFileStore, MemoryStore, SqliteMemoryStore, UserMemory};
use playlist_agents::pipeline::{
    Candidate, FeedbackEvent, Pipeline, PipelineState, PreferenceOverrides, ReviewDecision,
    ReviewGate, SourceAgent, StateOverrides, MAX_SIZE,
};
use playlist_agents::prompts::{
    EXPLAINER_SYSTEM_PROMPT, NAMER_SYSTEM_PROMPT, ORCHESTRATOR_PROMPT, REFINER_SYSTEM_PROMPT,
};

fn track(id: &str, name: &str, artist: &str, genre: &str, energy: f64, popularity: u32) -> Song {
    Song::new(id, name, artist)
        .with_genres([genre])
        .with_energy(energy)
        .with_popularity(popularity)
}

fn test_library() -> Arc<Library> {
    let songs = vec![
        track("s01", "Iron Lift", "Forge", "rock", 0.95, 80).with_mood("energetic"),
        track("s02", "Sprint", "Bolt", "electronic", 0.9, 70).with_mood("energetic"),
        track("s03", "Overdrive", "Forge", "rock", 0.88, 60).with_mood("energetic"),
        track("s04", "Pulse", "Neon Club", "electronic", 0.85, 40)
            .with_danceability(0.9)
            .with_mood("happy"),
        track("s05", "Drift", "Cloud", "ambient", 0.2, 30)
            .with_tags(["instrumental"])
            .with_mood("calm"),
        track("s06", "Pages", "Quiet Hours", "classical", 0.15, 20)
            .with_tags(["instrumental"])
            .with_mood("calm"),
        track("s07", "Raw Nerve", "Static", "hip-hop", 0.92, 85)
            .with_tags(["explicit"])
            .with_mood("energetic"),
        track("s08", "Sunday", "Porch", "folk", 0.4, 45)
            .with_tags(["acoustic"])
            .with_mood("happy"),
        track("s09", "Blue Line", "Mingus Jr", "jazz", 0.35, 25).with_mood("sad"),
        track("s10", "Heatwave", "Bolt", "electronic", 0.82, 65).with_mood("energetic"),
        track("s11", "Low Tide", "Cloud", "ambient", 0.1, 10).with_mood("calm"),
        track("s12", "Anthem", "Stadium", "pop", 0.87, 90).with_mood("energetic"),
    ];
    Arc::new(Library::from_songs(songs).expect("test library has unique ids"))
}

fn offline_pipeline(dir: &tempfile::TempDir) -> (Pipeline, Arc<JsonFileStore>) {
    let store = Arc::new(JsonFileStore::new(dir.path().join("user_prefs.json")));
    let pipeline = Pipeline::new(test_library(), Arc::new(DisabledGenerator), store.clone());
    (pipeline, store)
}

fn playlist_ids(state: &PipelineState) -> Vec<&str> {
    state.final_playlist.iter().map(|s| s.id.as_str()).collect()
}

fn assert_playlist_invariants(state: &PipelineState) {
    assert!(state.final_playlist.len() <= state.preferences.size);
    let ids: HashSet<&str> = playlist_ids(state).into_iter().collect();
    assert_eq!(ids.len(), state.final_playlist.len(), "duplicate ids in playlist");
}

/// Answers each agent by its system prompt and remembers which pipes were called
#[derive(Default)]
struct ScriptedGenerator {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, pipe: &str, system: &str, _user: &str) -> LlmResult<String> {
        self.calls.lock().unwrap().push(pipe.to_string());

        let text = if system == ORCHESTRATOR_PROMPT {
            "```json\n{\"intent\": \"recommend\", \
             \"session_context\": {\"activity\": \"studying\", \"mood\": \"calm\"}, \
             \"preferences\": {\"genres\": [\"ambient\"], \"size\": 3}}\n```"
        } else if system == EXPLAINER_SYSTEM_PROMPT {
            "Quiet tracks for focus."
        } else if system == NAMER_SYSTEM_PROMPT {
            "Title: Deep Focus\nDescription: Low-key tracks"
        } else if system == REFINER_SYSTEM_PROMPT {
            "Lean calmer."
        } else {
            return Err(LlmError::InvalidResponse {
                message: "unexpected prompt".to_string(),
            });
        };
        Ok(text.to_string())
    }
}

/// Orchestrator that asks for an absurdly long playlist
struct OversizedRequest;

#[async_trait]
impl TextGenerator for OversizedRequest {
    async fn generate(&self, _pipe: &str, system: &str, _user: &str) -> LlmResult<String> {
        if system == ORCHESTRATOR_PROMPT {
            Ok(r#"{"preferences": {"size": 1e30, "novelty_tolerance": 1.0}}"#.to_string())
        } else {
            Err(LlmError::Disabled)
        }
    }
}

struct RejectAll;

#[async_trait]
impl ReviewGate for RejectAll {
    async fn review(&self, candidates: &[Candidate]) -> ReviewDecision {
        ReviewDecision::Reject {
            song_ids: candidates.iter().map(|c| c.song.id.clone()).collect(),
            note: None,
        }
    }
}

#[cfg(test)]
mod offline_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_workout_query_uses_heuristics() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = offline_pipeline(&dir);

        let state = pipeline
            .invoke("energetic workout songs", "alice", StateOverrides::default())
            .await;

        assert!(state.error.is_none());
        assert_eq!(state.session_context.activity.as_deref(), Some("gym"));
        assert_eq!(state.session_context.mood.as_deref(), Some("energetic"));
        assert!(state.preferences.genres.is_empty());
        assert_eq!(state.logs()[0].action(), "heuristic_fallback");

        // Only the seven high-energy songs clear the taste threshold
        assert_eq!(state.final_playlist.len(), 7);
        assert!(state
            .final_playlist
            .iter()
            .all(|s| s.energy.is_some_and(|e| e > 0.8)));
        assert_playlist_invariants(&state);

        assert_eq!(state.explanations.len(), 1);
        assert!(state.explanations[0].contains("7-track playlist"));
        assert_eq!(state.playlist_title.as_deref(), Some(DEFAULT_TITLE));
    }

    #[tokio::test]
    async fn test_playlist_never_exceeds_size() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = offline_pipeline(&dir);

        for size in 1..=6 {
            for query in ["energetic workout songs", "chill study music", "happy party", "anything"] {
                let overrides = StateOverrides {
                    preferences: PreferenceOverrides {
                        size: Some(size),
                        ..Default::default()
                    },
                    ..Default::default()
                };
                let state = pipeline.invoke(query, "bob", overrides).await;
                assert_eq!(state.preferences.size, size);
                assert_playlist_invariants(&state);
            }
        }
    }

    #[tokio::test]
    async fn test_explicit_filter_removes_tagged_song() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = offline_pipeline(&dir);

        let overrides = StateOverrides {
            preferences: PreferenceOverrides {
                explicit_filter: Some(true),
                ..Default::default()
            },
            ..Default::default()
        };
        let state = pipeline.invoke("energetic workout songs", "carol", overrides).await;

        assert!(!playlist_ids(&state).contains(&"s07"));
        assert!(state.candidate_tracks.iter().all(|c| !c.song.has_tag("explicit")));
        let safety = state
            .logs()
            .iter()
            .find(|l| l.agent_name() == "Safety Agent")
            .unwrap();
        assert!(safety.details().contains("(Explicit content filtered)"));
    }

    #[tokio::test]
    async fn test_explorer_skips_known_artists() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, store) = offline_pipeline(&dir);
        store
            .save(
                "dana",
                &UserMemory {
                    liked_songs: vec!["s01".to_string()],
                    preferred_artists: vec!["Forge".to_string(), "Bolt".to_string()],
                    preferred_genres: vec!["rock".to_string()],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let state = pipeline
            .invoke("energetic workout songs", "dana", StateOverrides::default())
            .await;

        let explored: Vec<&Candidate> = state
            .candidate_tracks
            .iter()
            .filter(|c| c.source == SourceAgent::Explorer)
            .collect();
        assert!(!explored.is_empty());
        assert!(explored
            .iter()
            .all(|c| c.song.artist != "Forge" && c.song.artist != "Bolt"));
        assert_eq!(state.user_memory.preferred_artists, vec!["Forge", "Bolt"]);
    }

    #[tokio::test]
    async fn test_duplicate_candidates_survive_once() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = offline_pipeline(&dir);
        let blue = pipeline.library().get("s09").cloned().unwrap();

        let overrides = StateOverrides {
            candidate_tracks: vec![
                Candidate::familiar(blue.clone(), 5.0, "seeded"),
                Candidate::discovery(blue, 4.0, 0.9, "seeded"),
            ],
            ..Default::default()
        };
        let state = pipeline.invoke("sad jazz", "erin", overrides).await;

        let count = playlist_ids(&state).iter().filter(|id| **id == "s09").count();
        assert_eq!(count, 1);
        assert_playlist_invariants(&state);
    }

    #[tokio::test]
    async fn test_feedback_runs_before_memory_load() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, store) = offline_pipeline(&dir);
        let drift = pipeline.library().get("s05").cloned().unwrap();

        let overrides = StateOverrides {
            feedback: Some(FeedbackEvent::liked(drift).with_novelty_adjustment(0.2)),
            ..Default::default()
        };
        let state = pipeline.invoke("chill study music", "finn", overrides).await;

        assert!((state.preferences.novelty_tolerance - 0.5).abs() < 1e-9);
        assert_eq!(state.user_memory.liked_songs, vec!["s05"]);
        assert!(state.user_memory.knows_artist("Cloud"));
        assert_eq!(store.load("finn").await.unwrap(), state.user_memory);

        let actions: Vec<&str> = state.logs().iter().map(|l| l.action()).collect();
        assert!(actions.contains(&"processed_feedback"));
        assert!(actions.contains(&"adjusted_novelty"));
    }

    #[tokio::test]
    async fn test_review_rejecting_everything_yields_empty_playlist() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = offline_pipeline(&dir);
        let pipeline = pipeline.with_review_gate(Arc::new(RejectAll));

        let overrides = StateOverrides {
            requires_human_review: true,
            ..Default::default()
        };
        let state = pipeline.invoke("energetic workout songs", "gus", overrides).await;

        assert!(state.error.is_none());
        assert!(state.final_playlist.is_empty());
        assert_eq!(state.explanations, vec![EMPTY_PLAYLIST_EXPLANATION.to_string()]);
        assert_eq!(state.playlist_title.as_deref(), Some(DEFAULT_TITLE));
    }

    #[tokio::test]
    async fn test_language_prefs_do_not_filter() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = offline_pipeline(&dir);

        let plain = pipeline
            .invoke("happy party", "hana", StateOverrides::default())
            .await;
        let with_languages = pipeline
            .invoke(
                "happy party",
                "hana",
                StateOverrides {
                    preferences: PreferenceOverrides {
                        language_prefs: Some(vec!["fr".to_string()]),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            )
            .await;

        assert_eq!(with_languages.preferences.language_prefs, vec!["fr"]);
        assert_eq!(playlist_ids(&plain), playlist_ids(&with_languages));
    }

    #[tokio::test]
    async fn test_refine_removes_previous_playlist() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = offline_pipeline(&dir);

        let first = pipeline
            .invoke("energetic workout songs", "ivan", StateOverrides::default())
            .await;
        let refined = pipeline.refine(&first, "skip these, more energy").await;

        assert_eq!(refined.logs()[0].agent_name(), "Refiner");
        assert_eq!(refined.logs()[0].action(), "analyzed");
        assert_eq!(refined.preferences.energy_range, Some((0.2, 1.0)));
        assert_eq!(refined.session_context.mood.as_deref(), Some("energetic"));

        let previous: HashSet<&str> = playlist_ids(&first).into_iter().collect();
        assert!(playlist_ids(&refined).iter().all(|id| !previous.contains(id)));
        assert!(refined
            .logs()
            .iter()
            .any(|l| l.agent_name() == "Refiner" && l.action() == "removed"));
    }
}

#[cfg(test)]
mod scripted_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_model_output_drives_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(ScriptedGenerator::default());
        let pipeline = Pipeline::new(
            test_library(),
            generator.clone(),
            Arc::new(JsonFileStore::new(dir.path().join("user_prefs.json"))),
        );

        let state = pipeline
            .invoke("something to read to", "jo", StateOverrides::default())
            .await;

        assert_eq!(state.logs()[0].action(), "parsed_intent");
        assert_eq!(
            state.logs()[0].details(),
            "Intent: recommend, Activity: studying, Size: 3"
        );
        assert_eq!(playlist_ids(&state), vec!["s05", "s11", "s06"]);
        assert_eq!(state.explanations, vec!["Quiet tracks for focus.".to_string()]);
        assert_eq!(state.playlist_title.as_deref(), Some("Deep Focus"));
        assert_eq!(state.playlist_description.as_deref(), Some("Low-key tracks"));

        let calls = generator.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                "playlist-orchestrator-v1",
                "playlist-refiner-v1",
                "playlist-explainer-v1"
            ]
        );
    }

    #[tokio::test]
    async fn test_oversized_model_request_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            test_library(),
            Arc::new(OversizedRequest),
            Arc::new(JsonFileStore::new(dir.path().join("user_prefs.json"))),
        );

        let state = pipeline
            .invoke("chill jazz", "max", StateOverrides::default())
            .await;

        assert_eq!(state.preferences.size, MAX_SIZE);
        assert!(state.error.is_none());
        assert!(state.final_playlist.len() <= 12);
        assert_playlist_invariants(&state);
    }

    #[tokio::test]
    async fn test_oversized_size_override_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = offline_pipeline(&dir);
        let overrides = StateOverrides {
            preferences: PreferenceOverrides {
                size: Some(100_000_000_000_000),
                ..Default::default()
            },
            ..Default::default()
        };

        let state = pipeline.invoke("chill jazz", "max", overrides).await;

        assert_eq!(state.preferences.size, MAX_SIZE);
        assert_playlist_invariants(&state);
    }

    #[tokio::test]
    async fn test_runs_are_recorded_with_degraded_stages() {
        let store = Arc::new(SqliteMemoryStore::new_in_memory().await.unwrap());
        let pipeline = Pipeline::new(test_library(), Arc::new(DisabledGenerator), store.clone())
            .with_recorder(store.clone());

        let state = pipeline
            .invoke("energetic workout songs", "kim", StateOverrides::default())
            .await;

        let runs = store.recent_runs("kim", 5).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].query, "energetic workout songs");
        assert_eq!(runs[0].intent, "recommend");
        assert_eq!(runs[0].playlist.len(), state.final_playlist.len());
        assert_eq!(
            runs[0].degraded_stages,
            vec!["orchestrator", "namer", "explainer"]
        );
    }
}
