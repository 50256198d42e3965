use super::state::{AgentLog, Candidate, Intent, PipelineState, SessionContext, UserPreferences};
use crate::library::Song;
use crate::memory::UserMemory;

/// How a stage changes the candidate list
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CandidateChange {
    #[default]
    Unchanged,
    /// Concatenate onto the accumulated list, no dedup
    Append(Vec<Candidate>),
    /// Replace the accumulated list (filtering, reranking)
    Replace(Vec<Candidate>),
}

impl CandidateChange {
    fn merge(self, other: CandidateChange) -> CandidateChange {
        use CandidateChange::*;
        match (self, other) {
            (left, Unchanged) => left,
            (Unchanged, right) => right,
            (Append(mut a), Append(b)) => {
                a.extend(b);
                Append(a)
            }
            (Replace(mut a), Append(b)) => {
                a.extend(b);
                Replace(a)
            }
            (_, Replace(b)) => Replace(b),
        }
    }
}

/// Patch produced by one stage.
///
/// Scalar fields replace the current value when set; list fields accumulate.
#[derive(Debug, Clone, Default)]
pub struct StateDelta {
    pub intent: Option<Intent>,
    pub preferences: Option<UserPreferences>,
    pub session_context: Option<SessionContext>,
    pub user_memory: Option<UserMemory>,
    pub candidates: CandidateChange,
    pub final_playlist: Option<Vec<Song>>,
    pub playlist_title: Option<String>,
    pub playlist_description: Option<String>,
    pub explanations: Vec<String>,
    pub logs: Vec<AgentLog>,
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(mut self, log: AgentLog) -> Self {
        self.logs.push(log);
        self
    }

    pub fn with_preferences(mut self, preferences: UserPreferences) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn append_candidates(mut self, candidates: Vec<Candidate>) -> Self {
        self.candidates = std::mem::take(&mut self.candidates).merge(CandidateChange::Append(candidates));
        self
    }

    pub fn replace_candidates(mut self, candidates: Vec<Candidate>) -> Self {
        self.candidates = CandidateChange::Replace(candidates);
        self
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanations.push(explanation.into());
        self
    }

    /// Join two deltas, e.g. the outputs of sibling branches.
    ///
    /// `other` wins for scalar fields; candidates, explanations and logs are
    /// concatenated in `self`, `other` order.
    pub fn merge(mut self, other: StateDelta) -> StateDelta {
        self.intent = other.intent.or(self.intent);
        self.preferences = other.preferences.or(self.preferences);
        self.session_context = other.session_context.or(self.session_context);
        self.user_memory = other.user_memory.or(self.user_memory);
        self.candidates = self.candidates.merge(other.candidates);
        self.final_playlist = other.final_playlist.or(self.final_playlist);
        self.playlist_title = other.playlist_title.or(self.playlist_title);
        self.playlist_description = other.playlist_description.or(self.playlist_description);
        self.explanations.extend(other.explanations);
        self.logs.extend(other.logs);
        self
    }
}

impl PipelineState {
    /// Consume the state and return it with `delta` applied
    pub fn apply(mut self, delta: StateDelta) -> PipelineState {
        if let Some(intent) = delta.intent {
            self.intent = intent;
        }
        if let Some(preferences) = delta.preferences {
            self.preferences = preferences;
        }
        if let Some(context) = delta.session_context {
            self.session_context = context;
        }
        if let Some(memory) = delta.user_memory {
            self.user_memory = memory;
        }
        match delta.candidates {
            CandidateChange::Unchanged => {}
            CandidateChange::Append(candidates) => self.candidate_tracks.extend(candidates),
            CandidateChange::Replace(candidates) => self.candidate_tracks = candidates,
        }
        if let Some(playlist) = delta.final_playlist {
            self.final_playlist = playlist;
        }
        if let Some(title) = delta.playlist_title {
            self.playlist_title = Some(title);
        }
        if let Some(description) = delta.playlist_description {
            self.playlist_description = Some(description);
        }
        self.explanations.extend(delta.explanations);
        for log in delta.logs {
            self.push_log(log);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::Library;
    use std::sync::Arc;

    fn candidate(id: &str) -> Candidate {
        Candidate::familiar(Song::new(id, id, "artist"), 1.0, "test")
    }

    fn ids(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.song.id.as_str()).collect()
    }

    fn empty_state() -> PipelineState {
        let library = Arc::new(Library::from_songs(Vec::new()).unwrap());
        PipelineState::new("q", "user", library)
    }

    #[test]
    fn test_merge_concatenates_branch_outputs() {
        let taste = StateDelta::new()
            .append_candidates(vec![candidate("a"), candidate("b")])
            .with_log(AgentLog::new("Taste DJ", "recommended", "2"));
        let explorer = StateDelta::new()
            .append_candidates(vec![candidate("b"), candidate("c")])
            .with_log(AgentLog::new("Chaos DJ", "explored", "2"));

        let merged = taste.merge(explorer);
        match &merged.candidates {
            CandidateChange::Append(c) => assert_eq!(ids(c), vec!["a", "b", "b", "c"]),
            other => panic!("expected append, got {:?}", other),
        }
        assert_eq!(merged.logs.len(), 2);
        assert_eq!(merged.logs[0].agent_name(), "Taste DJ");
    }

    #[test]
    fn test_replace_after_append_wins() {
        let merged = StateDelta::new()
            .append_candidates(vec![candidate("a")])
            .merge(StateDelta::new().replace_candidates(vec![candidate("z")]));
        assert_eq!(merged.candidates, CandidateChange::Replace(vec![candidate("z")]));
    }

    #[test]
    fn test_apply_appends_without_dedup() {
        let mut state = empty_state();
        state.candidate_tracks.push(candidate("a"));

        let state = state.apply(StateDelta::new().append_candidates(vec![candidate("a")]));
        assert_eq!(ids(&state.candidate_tracks), vec!["a", "a"]);
    }

    #[test]
    fn test_apply_replaces_and_accumulates_logs() {
        let state = empty_state()
            .apply(
                StateDelta::new()
                    .append_candidates(vec![candidate("a"), candidate("b")])
                    .with_log(AgentLog::new("x", "y", "z")),
            )
            .apply(
                StateDelta::new()
                    .replace_candidates(vec![candidate("b")])
                    .with_explanation("because")
                    .with_log(AgentLog::new("x2", "y2", "z2")),
            );

        assert_eq!(ids(&state.candidate_tracks), vec!["b"]);
        assert_eq!(state.explanations, vec!["because".to_string()]);
        assert_eq!(state.logs().len(), 2);
    }

    #[test]
    fn test_scalar_merge_prefers_later() {
        let first = StateDelta {
            playlist_title: Some("first".to_string()),
            ..Default::default()
        };
        let second = StateDelta {
            playlist_title: Some("second".to_string()),
            ..Default::default()
        };
        assert_eq!(first.merge(second).playlist_title.as_deref(), Some("second"));
    }
}
