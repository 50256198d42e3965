use async_trait::async_trait;
use tracing::{debug, info};

use crate::library::Song;
use crate::pipeline::{AgentLog, Candidate, PipelineState, Stage, StageOutcome, StateDelta, UserPreferences};

pub const EXPLICIT_REASON: &str = "Explicit content filtered";

/// Result of checking one song against content policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyVerdict {
    Pass,
    Block { reason: &'static str },
}

impl PolicyVerdict {
    pub fn passed(&self) -> bool {
        matches!(self, PolicyVerdict::Pass)
    }
}

/// Check `song` against the request's content policy.
///
/// `language_prefs` is accepted but not enforced; songs carry no language field.
pub fn check_content_policy(song: &Song, prefs: &UserPreferences) -> PolicyVerdict {
    if prefs.explicit_filter && song.has_tag("explicit") {
        return PolicyVerdict::Block {
            reason: EXPLICIT_REASON,
        };
    }
    PolicyVerdict::Pass
}

/// Split candidates into survivors and the distinct block reasons, in first-seen order
pub fn filter_candidates(
    candidates: &[Candidate],
    prefs: &UserPreferences,
) -> (Vec<Candidate>, usize, Vec<&'static str>) {
    let mut kept = Vec::with_capacity(candidates.len());
    let mut blocked = 0;
    let mut reasons: Vec<&'static str> = Vec::new();

    for candidate in candidates {
        match check_content_policy(&candidate.song, prefs) {
            PolicyVerdict::Pass => kept.push(candidate.clone()),
            PolicyVerdict::Block { reason } => {
                blocked += 1;
                if !reasons.contains(&reason) {
                    reasons.push(reason);
                }
            }
        }
    }

    (kept, blocked, reasons)
}

/// Drops candidates that violate content policy
#[derive(Debug, Clone, Copy, Default)]
pub struct SafetyFilter;

#[async_trait]
impl Stage for SafetyFilter {
    fn name(&self) -> &'static str {
        "safety"
    }

    async fn run(&self, state: &PipelineState) -> StageOutcome<StateDelta> {
        let (kept, blocked, reasons) = filter_candidates(&state.candidate_tracks, &state.preferences);
        let checked = state.candidate_tracks.len();

        let details = if blocked > 0 {
            info!(checked, blocked, "Candidates blocked by content policy");
            format!(
                "Checked {} tracks, filtered {} ({})",
                checked,
                blocked,
                reasons.join(", ")
            )
        } else {
            debug!(checked, "All candidates passed content policy");
            format!("Checked {} tracks, all passed policy checks", checked)
        };

        StageOutcome::Success(
            StateDelta::new()
                .replace_candidates(kept)
                .with_log(AgentLog::new("Safety Agent", "filtered", details)),
        )
    }
}
