//! Pipeline state, the stage contract and the runner that wires agents together.
//!
//! ```text
//! orchestrator → overrides → feedback → memory → {taste, explorer} → safety
//!     → [human review] → critic → namer → explainer
//! ```
//!
//! Every stage reads an immutable [`PipelineState`] and returns a
//! [`StateDelta`]. The two recommenders see the same snapshot; their deltas are
//! merged before being applied. A fatal outcome or a pre-set error skips every
//! remaining stage.

mod delta;
mod review;
mod stage;
mod state;

pub use delta::{CandidateChange, StateDelta};
pub use review::{AutoApprove, HumanReview, ReviewDecision, ReviewGate};
pub use stage::{Stage, StageOutcome};
pub use state::{
    AgentLog, Candidate, FeedbackEvent, Intent, PipelineState, SessionContext, SourceAgent,
    UserPreferences, DEFAULT_NOVELTY_TOLERANCE, DEFAULT_SIZE, MAX_SIZE,
};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::agents::{
    Critic, Explainer, Explorer, FeedbackProcessor, HeuristicPolicy, MemoryLoader, Namer,
    Orchestrator, Refinement, Refiner, SafetyFilter, ScoringPolicy, TasteRecommender,
};
use crate::config::PipeConfig;
use crate::library::Library;
use crate::llm::TextGenerator;
use crate::memory::{MemoryStore, NoopRecorder, RunRecord, RunRecorder};

/// Preference fields a caller may force, applied after the orchestrator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreferenceOverrides {
    pub size: Option<usize>,
    pub novelty_tolerance: Option<f64>,
    pub explicit_filter: Option<bool>,
    pub language_prefs: Option<Vec<String>>,
    pub energy_range: Option<(f64, f64)>,
}

impl PreferenceOverrides {
    fn apply(&self, prefs: &mut UserPreferences) {
        if let Some(size) = self.size {
            prefs.size = if size == 0 { DEFAULT_SIZE } else { size.min(MAX_SIZE) };
        }
        if let Some(tolerance) = self.novelty_tolerance {
            prefs.set_novelty_tolerance(tolerance);
        }
        if let Some(explicit) = self.explicit_filter {
            prefs.explicit_filter = explicit;
        }
        if let Some(languages) = &self.language_prefs {
            prefs.language_prefs = languages.clone();
        }
        if let Some(range) = self.energy_range {
            prefs.energy_range = Some(range);
        }
    }
}

/// Partial initial state supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct StateOverrides {
    pub preferences: PreferenceOverrides,
    /// Replaces the parsed session context when set
    pub session_context: Option<SessionContext>,
    /// Candidates already accumulated before the recommenders run
    pub candidate_tracks: Vec<Candidate>,
    pub requires_human_review: bool,
    pub feedback: Option<FeedbackEvent>,
    /// A pre-set error skips every stage
    pub error: Option<String>,
    /// Songs removed from the candidate pool after the recommenders run
    pub excluded_song_ids: Vec<String>,
}

/// Runs the agent stages for one request at a time.
///
/// Cheap to share: every collaborator is behind an `Arc`.
#[derive(Clone)]
pub struct Pipeline {
    library: Arc<Library>,
    generator: Arc<dyn TextGenerator>,
    store: Arc<dyn MemoryStore>,
    recorder: Arc<dyn RunRecorder>,
    policy: Arc<dyn ScoringPolicy>,
    review_gate: Arc<dyn ReviewGate>,
    pipes: PipeConfig,
}

impl Pipeline {
    pub fn new(
        library: Arc<Library>,
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn MemoryStore>,
    ) -> Self {
        Self {
            library,
            generator,
            store,
            recorder: Arc::new(NoopRecorder),
            policy: Arc::new(HeuristicPolicy),
            review_gate: Arc::new(AutoApprove),
            pipes: PipeConfig::default(),
        }
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn RunRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn ScoringPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_review_gate(mut self, gate: Arc<dyn ReviewGate>) -> Self {
        self.review_gate = gate;
        self
    }

    pub fn with_pipes(mut self, pipes: PipeConfig) -> Self {
        self.pipes = pipes;
        self
    }

    pub fn library(&self) -> &Arc<Library> {
        &self.library
    }

    /// Run the full pipeline for `query` and return the final state.
    ///
    /// Never fails: LLM and storage problems degrade individual stages, and a
    /// fatal stage is reported through `PipelineState::error`.
    pub async fn invoke(
        &self,
        query: &str,
        user_id: &str,
        overrides: StateOverrides,
    ) -> PipelineState {
        let state = self.seed_state(query, user_id, &overrides);
        self.execute(state, overrides).await
    }

    /// Record a like/dislike without running a recommendation
    pub async fn process_feedback(
        &self,
        user_id: &str,
        event: FeedbackEvent,
        preferences: UserPreferences,
    ) -> PipelineState {
        let mut state = PipelineState::new("", user_id, self.library.clone());
        state.preferences = preferences;
        state.feedback = Some(event);

        let mut degraded = Vec::new();
        let stage = FeedbackProcessor::new(self.store.clone());
        run_stage(&stage, state, &mut degraded).await
    }

    /// Re-run `previous` with adjustments derived from free-text `feedback`
    pub async fn refine(&self, previous: &PipelineState, feedback: &str) -> PipelineState {
        let refiner = Refiner::new(self.generator.clone(), self.pipes.refiner.as_str());
        let outcome = refiner.analyze(previous, feedback).await;
        if let StageOutcome::Degraded { reason, .. } = &outcome {
            warn!(reason = %reason, "Refinement analysis degraded");
        }
        let analysis = outcome.into_value().unwrap_or_default();

        let overrides = refinement_overrides(previous, &analysis.refinement);
        let mut state = self.seed_state(&previous.query, &previous.user_id, &overrides);
        if let Some(log) = analysis.log {
            state.push_log(log);
        }
        if let Some(notes) = &analysis.notes {
            debug!(notes = %notes, "Refinement notes");
        }
        self.execute(state, overrides).await
    }

    fn seed_state(&self, query: &str, user_id: &str, overrides: &StateOverrides) -> PipelineState {
        let mut state = PipelineState::new(query, user_id, self.library.clone());
        state.candidate_tracks = overrides.candidate_tracks.clone();
        state.requires_human_review = overrides.requires_human_review;
        state.feedback = overrides.feedback.clone();
        state.error = overrides.error.clone();
        state
    }

    async fn execute(&self, state: PipelineState, overrides: StateOverrides) -> PipelineState {
        let start = Instant::now();
        let mut degraded: Vec<String> = Vec::new();
        info!(user_id = %state.user_id, query = %state.query, "Pipeline started");

        let orchestrator = Orchestrator::new(self.generator.clone(), self.pipes.orchestrator.as_str());
        let mut state = run_stage(&orchestrator, state, &mut degraded).await;

        if state.error.is_none() {
            overrides.preferences.apply(&mut state.preferences);
            if let Some(context) = overrides.session_context.clone() {
                state.session_context = context;
            }
        }

        let feedback = FeedbackProcessor::new(self.store.clone());
        let state = run_stage(&feedback, state, &mut degraded).await;

        let memory = MemoryLoader::new(self.store.clone());
        let state = run_stage(&memory, state, &mut degraded).await;

        let state = self.recommend(state, &mut degraded).await;
        let state = exclude_songs(state, &overrides.excluded_song_ids);

        let state = run_stage(&SafetyFilter, state, &mut degraded).await;

        let state = if state.requires_human_review {
            let review = HumanReview::new(self.review_gate.clone());
            run_stage(&review, state, &mut degraded).await
        } else {
            state
        };

        let critic = Critic::new(self.policy.clone());
        let state = run_stage(&critic, state, &mut degraded).await;

        let namer = Namer::new(self.generator.clone(), self.pipes.refiner.as_str());
        let state = run_stage(&namer, state, &mut degraded).await;

        let explainer = Explainer::new(self.generator.clone(), self.pipes.explainer.as_str());
        let state = run_stage(&explainer, state, &mut degraded).await;

        let latency_ms = start.elapsed().as_millis() as i64;
        info!(
            user_id = %state.user_id,
            tracks = state.final_playlist.len(),
            degraded = ?degraded,
            error = ?state.error,
            latency_ms,
            "Pipeline finished"
        );

        self.record(&state, degraded, latency_ms).await;
        state
    }

    /// Run both recommenders on the same snapshot and merge their deltas
    async fn recommend(&self, state: PipelineState, degraded: &mut Vec<String>) -> PipelineState {
        if state.error.is_some() {
            return state;
        }

        let taste = TasteRecommender::new(self.policy.clone());
        let explorer = Explorer::new(self.policy.clone());

        let mut merged = StateDelta::new();
        for stage in [&taste as &dyn Stage, &explorer as &dyn Stage] {
            match stage.run(&state).await {
                StageOutcome::Success(delta) => merged = merged.merge(delta),
                StageOutcome::Degraded { value, reason } => {
                    warn!(stage = stage.name(), reason = %reason, "Stage degraded");
                    degraded.push(stage.name().to_string());
                    merged = merged.merge(value);
                }
                StageOutcome::Fatal { reason } => return fail(state, stage.name(), &reason),
            }
        }

        state.apply(merged)
    }

    async fn record(&self, state: &PipelineState, degraded: Vec<String>, latency_ms: i64) {
        let mut run = RunRecord::new(&state.user_id, &state.query);
        run.intent = state.intent.to_string();
        run.playlist = state.final_playlist.iter().map(|s| s.id.clone()).collect();
        run.explanation = state.explanations.last().cloned();
        run.degraded_stages = degraded;
        run.error = state.error.clone();
        run.latency_ms = latency_ms;

        if let Err(e) = self.recorder.record_run(&run).await {
            warn!(error = %e, run_id = %run.id, "Failed to record pipeline run");
        }
    }
}

fn fail(mut state: PipelineState, stage: &str, reason: &str) -> PipelineState {
    error!(stage, reason, "Stage failed, skipping remaining stages");
    state.error = Some(format!("{} failed: {}", stage, reason));
    state
}

/// Run one stage unless the state already carries an error
async fn run_stage(
    stage: &dyn Stage,
    state: PipelineState,
    degraded: &mut Vec<String>,
) -> PipelineState {
    if state.error.is_some() {
        return state;
    }

    match stage.run(&state).await {
        StageOutcome::Success(delta) => state.apply(delta),
        StageOutcome::Degraded { value, reason } => {
            warn!(stage = stage.name(), reason = %reason, "Stage degraded");
            degraded.push(stage.name().to_string());
            state.apply(value)
        }
        StageOutcome::Fatal { reason } => fail(state, stage.name(), &reason),
    }
}

fn exclude_songs(mut state: PipelineState, excluded: &[String]) -> PipelineState {
    if excluded.is_empty() || state.error.is_some() {
        return state;
    }

    let excluded: HashSet<&str> = excluded.iter().map(String::as_str).collect();
    let before = state.candidate_tracks.len();
    state
        .candidate_tracks
        .retain(|c| !excluded.contains(c.song.id.as_str()));
    let removed = before - state.candidate_tracks.len();

    state.push_log(AgentLog::new(
        "Refiner",
        "removed",
        format!("Removed {} tracks from the previous playlist", removed),
    ));
    state
}

/// Overrides for a refined re-run of `previous`
fn refinement_overrides(previous: &PipelineState, refinement: &Refinement) -> StateOverrides {
    let mut prefs = previous.preferences.clone();
    let mut context = previous.session_context.clone();
    refinement.apply(&mut prefs, &mut context);

    StateOverrides {
        preferences: PreferenceOverrides {
            size: Some(prefs.size),
            novelty_tolerance: Some(prefs.novelty_tolerance),
            explicit_filter: Some(prefs.explicit_filter),
            language_prefs: Some(prefs.language_prefs),
            energy_range: prefs.energy_range,
        },
        session_context: Some(context),
        requires_human_review: previous.requires_human_review,
        excluded_song_ids: if refinement.remove_similar {
            previous.final_playlist.iter().map(|s| s.id.clone()).collect()
        } else {
            Vec::new()
        },
        ..Default::default()
    }
}
