//! Playlist refinement and naming.
//!
//! [`Refiner`] reads free-text feedback on a finished playlist and produces a
//! [`Refinement`] for the next run. [`Namer`] is a pipeline stage that titles
//! the final playlist.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::llm::TextGenerator;
use crate::pipeline::{
    AgentLog, PipelineState, SessionContext, Stage, StageOutcome, StateDelta, UserPreferences,
};
use crate::prompts::{namer_request, refiner_request, NAMER_SYSTEM_PROMPT, REFINER_SYSTEM_PROMPT};

pub const DEFAULT_TITLE: &str = "My Playlist";
pub const DEFAULT_DESCRIPTION: &str = "A curated selection of tracks";

const ENERGY_STEP: f64 = 0.2;
const NOVELTY_STEP: f64 = 0.2;

/// Adjustments derived from playlist feedback
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Refinement {
    pub energy_adjustment: Option<f64>,
    pub novelty_adjustment: Option<f64>,
    /// Drop the previous playlist's songs from the next run
    pub remove_similar: bool,
}

impl Refinement {
    pub fn is_empty(&self) -> bool {
        *self == Refinement::default()
    }

    /// Apply to the preferences and session context of the next run.
    ///
    /// Energy shifts the target energy window and sets a matching session mood.
    pub fn apply(&self, prefs: &mut UserPreferences, ctx: &mut SessionContext) {
        if let Some(delta) = self.novelty_adjustment {
            prefs.set_novelty_tolerance(prefs.novelty_tolerance + delta);
        }

        if let Some(delta) = self.energy_adjustment {
            let (lo, hi) = prefs.energy_range.unwrap_or((0.0, 1.0));
            let shifted = if delta > 0.0 {
                ((lo + delta).min(1.0), hi)
            } else {
                (lo, (hi + delta).max(0.0))
            };
            prefs.energy_range = Some(shifted);
            ctx.mood = Some(if delta > 0.0 { "energetic" } else { "calm" }.to_string());
        }
    }
}

impl std::fmt::Display for Refinement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(e) = self.energy_adjustment {
            parts.push(format!("energy {:+.1}", e));
        }
        if let Some(n) = self.novelty_adjustment {
            parts.push(format!("novelty {:+.1}", n));
        }
        if self.remove_similar {
            parts.push("remove similar".to_string());
        }
        if parts.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Keyword rules over the feedback text
pub fn analyze_refinement(feedback: &str) -> Refinement {
    let text = feedback.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| text.contains(w));

    let energy_adjustment = if has(&["more energy", "energetic"]) {
        Some(ENERGY_STEP)
    } else if has(&["calmer", "chill"]) {
        Some(-ENERGY_STEP)
    } else {
        None
    };

    let novelty_adjustment = if has(&["more novel", "different"]) {
        Some(NOVELTY_STEP)
    } else if has(&["familiar"]) {
        Some(-NOVELTY_STEP)
    } else {
        None
    };

    Refinement {
        energy_adjustment,
        novelty_adjustment,
        remove_similar: has(&["remove", "skip"]),
    }
}

/// Refinement plus the model's free-text reading of the feedback, if any
#[derive(Debug, Clone, Default)]
pub struct RefinementAnalysis {
    pub refinement: Refinement,
    pub notes: Option<String>,
    pub log: Option<AgentLog>,
}

/// Interprets feedback on a finished playlist
pub struct Refiner {
    generator: Arc<dyn TextGenerator>,
    pipe_name: String,
}

impl Refiner {
    pub fn new(generator: Arc<dyn TextGenerator>, pipe_name: impl Into<String>) -> Self {
        Self {
            generator,
            pipe_name: pipe_name.into(),
        }
    }

    /// Analyze `feedback` against the playlist in `state`.
    ///
    /// The keyword rules always decide the adjustments; a model failure only
    /// loses the free-text notes.
    pub async fn analyze(&self, state: &PipelineState, feedback: &str) -> StageOutcome<RefinementAnalysis> {
        let refinement = analyze_refinement(feedback);
        let prompt = refiner_request(
            &state.query,
            &state.final_playlist,
            feedback,
            state.preferences.novelty_tolerance,
            &state.preferences.genres,
        );

        let excerpt: String = feedback.chars().take(50).collect();
        let log = AgentLog::new(
            "Refiner",
            "analyzed",
            format!("Feedback: {}... | Adjustments: {}", excerpt, refinement),
        );

        match self
            .generator
            .generate(&self.pipe_name, REFINER_SYSTEM_PROMPT, &prompt)
            .await
        {
            Ok(notes) => {
                debug!(adjustments = %refinement, "Feedback analyzed");
                StageOutcome::Success(RefinementAnalysis {
                    refinement,
                    notes: Some(notes.trim().to_string()),
                    log: Some(log),
                })
            }
            Err(e) => {
                warn!(error = %e, "Refinement analysis failed, using keyword rules only");
                StageOutcome::degraded(
                    RefinementAnalysis {
                        refinement,
                        notes: None,
                        log: Some(log),
                    },
                    e.to_string(),
                )
            }
        }
    }
}

fn strip_quotes(s: &str) -> String {
    s.trim().trim_matches('"').trim_matches('\'').to_string()
}

/// Parse `Title:` / `Description:` lines, falling back to the first two lines
pub fn parse_title_description(text: &str) -> (String, String) {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let mut title: Option<String> = None;
    let mut description: Option<String> = None;

    for line in &lines {
        let lower = line.to_lowercase();
        let value = line.split_once(':').map(|(_, v)| strip_quotes(v));
        if ["title:", "name:", "playlist:"].iter().any(|k| lower.contains(k)) {
            title = value;
        } else if ["description:", "desc:"].iter().any(|k| lower.contains(k)) {
            description = value;
        }
    }

    let title = title
        .filter(|t| !t.is_empty())
        .or_else(|| lines.first().map(|l| strip_quotes(l)))
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let description = description
        .filter(|d| !d.is_empty())
        .or_else(|| lines.get(1).map(|l| strip_quotes(l)))
        .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());
    (title, description)
}

/// Titles the final playlist
pub struct Namer {
    generator: Arc<dyn TextGenerator>,
    pipe_name: String,
}

impl Namer {
    pub fn new(generator: Arc<dyn TextGenerator>, pipe_name: impl Into<String>) -> Self {
        Self {
            generator,
            pipe_name: pipe_name.into(),
        }
    }

    fn named(title: String, description: String, action: &str) -> StateDelta {
        let excerpt: String = title.chars().take(30).collect();
        StateDelta {
            playlist_title: Some(title),
            playlist_description: Some(description),
            ..Default::default()
        }
        .with_log(AgentLog::new("Namer", action, format!("Title: {}...", excerpt)))
    }
}

#[async_trait]
impl Stage for Namer {
    fn name(&self) -> &'static str {
        "namer"
    }

    async fn run(&self, state: &PipelineState) -> StageOutcome<StateDelta> {
        if state.final_playlist.is_empty() {
            return StageOutcome::Success(Self::named(
                DEFAULT_TITLE.to_string(),
                DEFAULT_DESCRIPTION.to_string(),
                "generated",
            ));
        }

        let prompt = namer_request(
            &state.final_playlist,
            &state.query,
            state.session_context.mood.as_deref(),
        );
        match self
            .generator
            .generate(&self.pipe_name, NAMER_SYSTEM_PROMPT, &prompt)
            .await
        {
            Ok(text) if !text.trim().is_empty() => {
                let (title, description) = parse_title_description(&text);
                debug!(title = %title, "Playlist named");
                StageOutcome::Success(Self::named(title, description, "generated"))
            }
            Ok(_) => StageOutcome::degraded(
                Self::named(
                    DEFAULT_TITLE.to_string(),
                    DEFAULT_DESCRIPTION.to_string(),
                    "fallback_name",
                ),
                "Empty title response",
            ),
            Err(e) => {
                warn!(error = %e, "Naming failed, using default title");
                StageOutcome::degraded(
                    Self::named(
                        DEFAULT_TITLE.to_string(),
                        DEFAULT_DESCRIPTION.to_string(),
                        "fallback_name",
                    ),
                    e.to_string(),
                )
            }
        }
    }
}
