use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use super::delta::StateDelta;
use super::stage::{Stage, StageOutcome};
use super::state::{AgentLog, Candidate, PipelineState};

/// Reviewer verdict on the filtered candidate list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject {
        song_ids: Vec<String>,
        #[serde(default)]
        note: Option<String>,
    },
}

/// Manual approval step between safety filtering and ranking
#[async_trait]
pub trait ReviewGate: Send + Sync {
    async fn review(&self, candidates: &[Candidate]) -> ReviewDecision;
}

/// Approves everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl ReviewGate for AutoApprove {
    async fn review(&self, _candidates: &[Candidate]) -> ReviewDecision {
        ReviewDecision::Approve
    }
}

/// Runs a [`ReviewGate`] and removes rejected candidates
pub struct HumanReview {
    gate: Arc<dyn ReviewGate>,
}

impl HumanReview {
    pub fn new(gate: Arc<dyn ReviewGate>) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl Stage for HumanReview {
    fn name(&self) -> &'static str {
        "human_review"
    }

    async fn run(&self, state: &PipelineState) -> StageOutcome<StateDelta> {
        let decision = self.gate.review(&state.candidate_tracks).await;

        let delta = match decision {
            ReviewDecision::Approve => StateDelta::new().with_log(AgentLog::new(
                "Human Review",
                "approved",
                format!("Approved {} tracks", state.candidate_tracks.len()),
            )),
            ReviewDecision::Reject { song_ids, note } => {
                let rejected: HashSet<&str> = song_ids.iter().map(String::as_str).collect();
                let kept: Vec<Candidate> = state
                    .candidate_tracks
                    .iter()
                    .filter(|c| !rejected.contains(c.song.id.as_str()))
                    .cloned()
                    .collect();
                let removed = state.candidate_tracks.len() - kept.len();
                info!(removed, "Reviewer rejected candidates");

                let mut details = format!("Rejected {} tracks", removed);
                if let Some(note) = note.filter(|n| !n.is_empty()) {
                    details.push_str(&format!(" ({})", note));
                }
                StateDelta::new()
                    .replace_candidates(kept)
                    .with_log(AgentLog::new("Human Review", "rejected", details))
            }
        };

        StageOutcome::Success(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{Library, Song};

    struct RejectFirst;

    #[async_trait]
    impl ReviewGate for RejectFirst {
        async fn review(&self, candidates: &[Candidate]) -> ReviewDecision {
            ReviewDecision::Reject {
                song_ids: candidates.iter().take(1).map(|c| c.song.id.clone()).collect(),
                note: Some("not today".to_string()),
            }
        }
    }

    fn state() -> PipelineState {
        let mut state = PipelineState::new("q", "u", Arc::new(Library::from_songs(Vec::new()).unwrap()));
        state.candidate_tracks = vec![
            Candidate::familiar(Song::new("a", "A", "X"), 1.0, "r"),
            Candidate::familiar(Song::new("b", "B", "Y"), 1.0, "r"),
        ];
        state
    }

    #[tokio::test]
    async fn test_auto_approve_keeps_everything() {
        let stage = HumanReview::new(Arc::new(AutoApprove));
        let state = state();
        let next = state.clone().apply(stage.run(&state).await.into_value().unwrap());
        assert_eq!(next.candidate_tracks.len(), 2);
        assert_eq!(next.logs()[0].agent_name(), "Human Review");
    }

    #[tokio::test]
    async fn test_rejected_candidates_are_removed() {
        let stage = HumanReview::new(Arc::new(RejectFirst));
        let state = state();
        let next = state.clone().apply(stage.run(&state).await.into_value().unwrap());
        assert_eq!(next.candidate_tracks.len(), 1);
        assert_eq!(next.candidate_tracks[0].song.id, "b");
        assert_eq!(next.logs()[0].details(), "Rejected 1 tracks (not today)");
    }

    #[test]
    fn test_decision_serde() {
        let decision: ReviewDecision = serde_json::from_str(
            r#"{"decision": "reject", "song_ids": ["x"]}"#,
        )
        .unwrap();
        assert_eq!(
            decision,
            ReviewDecision::Reject {
                song_ids: vec!["x".to_string()],
                note: None
            }
        );
    }
}
