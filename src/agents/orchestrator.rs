use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::extract_json_from_completion;
use crate::llm::TextGenerator;
use crate::pipeline::{
    AgentLog, Intent, PipelineState, SessionContext, Stage, StageOutcome, StateDelta,
    UserPreferences,
};
use crate::prompts::{orchestrator_request, ORCHESTRATOR_PROMPT};

const ACTIVITY_KEYWORDS: &[(&str, &[&str])] = &[
    ("studying", &["study", "studying", "homework", "reading"]),
    ("party", &["party", "dance", "club", "dancing"]),
    ("gym", &["gym", "workout", "exercise", "running"]),
    ("sleep", &["sleep", "bedtime", "night", "ambient"]),
    ("work", &["work", "focus", "concentration"]),
];

const MOOD_KEYWORDS: &[(&str, &[&str])] = &[
    ("calm", &["calm", "chill", "relaxing", "peaceful", "quiet"]),
    ("energetic", &["energetic", "energy", "high-energy", "upbeat", "pump"]),
    ("happy", &["happy", "cheerful", "positive", "uplifting"]),
    ("sad", &["sad", "melancholy", "emotional", "heartbreak"]),
];

const GENRE_KEYWORDS: &[(&str, &[&str])] = &[
    ("pop", &["pop", "mainstream"]),
    ("rock", &["rock", "alternative"]),
    ("hip-hop", &["hip-hop", "rap", "hiphop"]),
    ("electronic", &["electronic", "edm", "techno", "house", "dance"]),
    ("indie", &["indie", "independent"]),
    ("jazz", &["jazz"]),
    ("classical", &["classical", "orchestra"]),
    ("r&b", &["r&b", "rnb", "soul"]),
    ("country", &["country"]),
    ("folk", &["folk", "acoustic"]),
];

fn first_match(text: &str, table: &[(&'static str, &[&str])]) -> Option<&'static str> {
    table
        .iter()
        .find(|(_, words)| words.iter().any(|w| text.contains(w)))
        .map(|(label, _)| *label)
}

/// Structured reading of a free-text request.
///
/// Every key is optional in the model's JSON; missing keys take defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ParsedQuery {
    #[serde(default)]
    pub intent: Option<Intent>,
    #[serde(default)]
    pub session_context: Option<SessionContext>,
    #[serde(default)]
    pub preferences: Option<UserPreferences>,
}

impl ParsedQuery {
    /// Resolve into concrete values, defaulting the preference query to `query`
    fn resolve(self, query: &str) -> (Intent, SessionContext, UserPreferences) {
        let mut preferences = self.preferences.unwrap_or_default();
        if preferences.query.is_none() {
            preferences.query = Some(query.to_string());
        }
        (
            self.intent.unwrap_or_default(),
            self.session_context.unwrap_or_default(),
            preferences,
        )
    }
}

/// Keyword parser used when the model is unavailable or its output is unusable.
///
/// Total: every input yields a recommend intent with default size and novelty.
pub fn parse_query_heuristically(query: &str) -> ParsedQuery {
    let lower = query.to_lowercase();

    let activity = first_match(&lower, ACTIVITY_KEYWORDS);
    let mood = first_match(&lower, MOOD_KEYWORDS);
    let genres = GENRE_KEYWORDS
        .iter()
        .filter(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(genre, _)| genre.to_string())
        .collect();

    ParsedQuery {
        intent: Some(Intent::Recommend),
        session_context: Some(SessionContext {
            activity: activity.map(str::to_string),
            mood: mood.map(str::to_string),
            ..Default::default()
        }),
        preferences: Some(UserPreferences {
            query: Some(query.to_string()),
            genres,
            moods: mood.map(|m| vec![m.to_string()]).unwrap_or_default(),
            ..Default::default()
        }),
    }
}

/// Turns the raw query into intent, preferences and session context
pub struct Orchestrator {
    generator: Arc<dyn TextGenerator>,
    pipe_name: String,
}

impl Orchestrator {
    pub fn new(generator: Arc<dyn TextGenerator>, pipe_name: impl Into<String>) -> Self {
        Self {
            generator,
            pipe_name: pipe_name.into(),
        }
    }

    async fn parse_with_llm(&self, query: &str) -> Result<ParsedQuery, String> {
        let completion = self
            .generator
            .generate(&self.pipe_name, ORCHESTRATOR_PROMPT, &orchestrator_request(query))
            .await
            .map_err(|e| e.to_string())?;

        let json = extract_json_from_completion(&completion)?;
        serde_json::from_str::<ParsedQuery>(json)
            .map_err(|e| format!("Failed to parse intent JSON: {}", e))
    }
}

#[async_trait]
impl Stage for Orchestrator {
    fn name(&self) -> &'static str {
        "orchestrator"
    }

    async fn run(&self, state: &PipelineState) -> StageOutcome<StateDelta> {
        let start = Instant::now();
        debug!(query = %state.query, "Parsing request");

        match self.parse_with_llm(&state.query).await {
            Ok(parsed) => {
                let (intent, context, preferences) = parsed.resolve(&state.query);
                let details = format!(
                    "Intent: {}, Activity: {}, Size: {}",
                    intent,
                    context.activity.as_deref().unwrap_or("N/A"),
                    preferences.size
                );
                info!(
                    intent = %intent,
                    activity = ?context.activity,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Request parsed by model"
                );

                StageOutcome::Success(StateDelta {
                    intent: Some(intent),
                    preferences: Some(preferences),
                    session_context: Some(context),
                    ..Default::default()
                }
                .with_log(AgentLog::new("Orchestrator", "parsed_intent", details)))
            }
            Err(reason) => {
                warn!(error = %reason, "Intent parsing failed, using keyword heuristics");
                let (intent, context, preferences) =
                    parse_query_heuristically(&state.query).resolve(&state.query);
                let details = format!(
                    "LLM unavailable, used heuristics: Activity={}, Mood={}, Genres={:?}",
                    context.activity.as_deref().unwrap_or("None"),
                    context.mood.as_deref().unwrap_or("None"),
                    preferences.genres
                );

                StageOutcome::degraded(
                    StateDelta {
                        intent: Some(intent),
                        preferences: Some(preferences),
                        session_context: Some(context),
                        ..Default::default()
                    }
                    .with_log(AgentLog::new("Orchestrator", "heuristic_fallback", details)),
                    reason,
                )
            }
        }
    }
}
