use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;

use crate::library::{Library, Song};
use crate::memory::UserMemory;

/// Default playlist length
pub const DEFAULT_SIZE: usize = 10;

/// Longest playlist a single run will build
pub const MAX_SIZE: usize = 500;

/// Default fraction of the playlist that should be novel
pub const DEFAULT_NOVELTY_TOLERANCE: f64 = 0.3;

fn default_size() -> usize {
    DEFAULT_SIZE
}

fn default_novelty_tolerance() -> f64 {
    DEFAULT_NOVELTY_TOLERANCE
}

/// Treat an explicit JSON `null` like a missing key
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_size<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| v.as_f64())
        .filter(|n| *n >= 1.0)
        .map(|n| n.round().min(MAX_SIZE as f64) as usize)
        .unwrap_or(DEFAULT_SIZE))
}

fn lenient_tolerance<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| v.as_f64())
        .map(|n| n.clamp(0.0, 1.0))
        .unwrap_or(DEFAULT_NOVELTY_TOLERANCE))
}

fn lenient_minutes<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .filter(|n| *n >= 0.0)
        .map(|n| n.round() as u32))
}

/// What the user asked the system to do.
///
/// Only `Recommend` changes ranking behavior; other values pass through.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Intent {
    #[default]
    Recommend,
    Explain,
    UpdatePrefs,
    SurpriseMe,
    Other(String),
}

impl Intent {
    pub fn as_str(&self) -> &str {
        match self {
            Intent::Recommend => "recommend",
            Intent::Explain => "explain",
            Intent::UpdatePrefs => "update_prefs",
            Intent::SurpriseMe => "surprise_me",
            Intent::Other(s) => s,
        }
    }
}

impl From<String> for Intent {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "recommend" | "" => Intent::Recommend,
            "explain" => Intent::Explain,
            "update_prefs" => Intent::UpdatePrefs,
            "surprise_me" => Intent::SurpriseMe,
            _ => Intent::Other(value),
        }
    }
}

impl From<Intent> for String {
    fn from(value: Intent) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured preferences for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub genres: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub artists: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub moods: Vec<String>,
    #[serde(default)]
    pub min_year: Option<i32>,
    #[serde(default)]
    pub max_year: Option<i32>,
    #[serde(default)]
    pub energy_range: Option<(f64, f64)>,
    #[serde(default)]
    pub danceability_range: Option<(f64, f64)>,
    /// Target playlist length
    #[serde(default = "default_size", deserialize_with = "lenient_size")]
    pub size: usize,
    #[serde(default, deserialize_with = "null_as_default")]
    pub explicit_filter: bool,
    /// Accepted but not enforced by the safety filter.
    #[serde(default, deserialize_with = "null_as_default")]
    pub language_prefs: Vec<String>,
    /// Fraction of the playlist that should be novel, 0.0-1.0
    #[serde(
        default = "default_novelty_tolerance",
        deserialize_with = "lenient_tolerance"
    )]
    pub novelty_tolerance: f64,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            query: None,
            genres: Vec::new(),
            artists: Vec::new(),
            tags: Vec::new(),
            moods: Vec::new(),
            min_year: None,
            max_year: None,
            energy_range: None,
            danceability_range: None,
            size: DEFAULT_SIZE,
            explicit_filter: false,
            language_prefs: Vec::new(),
            novelty_tolerance: DEFAULT_NOVELTY_TOLERANCE,
        }
    }
}

impl UserPreferences {
    pub fn for_query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Default::default()
        }
    }

    /// Set novelty tolerance, clamped to [0, 1]
    pub fn set_novelty_tolerance(&mut self, value: f64) {
        self.novelty_tolerance = value.clamp(0.0, 1.0);
    }
}

/// Free-text hints about the listening session.
///
/// Values are not a closed set; scoring matches on lowercase names and substrings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    #[serde(default)]
    pub activity: Option<String>,
    #[serde(default, deserialize_with = "lenient_minutes")]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub time_of_day: Option<String>,
}

impl SessionContext {
    pub fn with_activity(mut self, activity: impl Into<String>) -> Self {
        self.activity = Some(activity.into());
        self
    }

    pub fn with_mood(mut self, mood: impl Into<String>) -> Self {
        self.mood = Some(mood.into());
        self
    }

    /// Lowercased activity, if any
    pub fn activity_lower(&self) -> Option<String> {
        self.activity.as_deref().map(str::to_lowercase)
    }

    /// Lowercased mood, if any
    pub fn mood_lower(&self) -> Option<String> {
        self.mood.as_deref().map(str::to_lowercase)
    }
}

/// Which recommender proposed a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceAgent {
    TasteRecommender,
    Explorer,
}

impl SourceAgent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceAgent::TasteRecommender => "taste_recommender",
            SourceAgent::Explorer => "explorer",
        }
    }
}

impl std::fmt::Display for SourceAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A song proposed by one recommender, with a provenance-tagged score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub song: Song,
    /// Recomputed at each ranking stage
    pub score: f64,
    pub source: SourceAgent,
    pub reason: String,
    /// 0.0-1.0
    pub novelty_score: f64,
    /// 0.0-1.0
    pub confidence: f64,
}

impl Candidate {
    /// Familiar pick from the taste recommender
    pub fn familiar(song: Song, score: f64, reason: impl Into<String>) -> Self {
        Self {
            song,
            score,
            source: SourceAgent::TasteRecommender,
            reason: reason.into(),
            novelty_score: 0.1,
            confidence: 0.9,
        }
    }

    /// Discovery pick from the explorer
    pub fn discovery(song: Song, score: f64, novelty: f64, reason: impl Into<String>) -> Self {
        Self {
            song,
            score,
            source: SourceAgent::Explorer,
            reason: reason.into(),
            novelty_score: novelty,
            confidence: 0.6,
        }
    }
}

/// One entry in the append-only agent trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentLog {
    agent_name: String,
    action: String,
    details: String,
}

impl AgentLog {
    pub fn new(
        agent_name: impl Into<String>,
        action: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            action: action.into(),
            details: details.into(),
        }
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn details(&self) -> &str {
        &self.details
    }
}

impl std::fmt::Display for AgentLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.agent_name, self.action, self.details)
    }
}

/// Like/dislike event processed by the feedback stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liked_song: Option<Song>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disliked_song: Option<Song>,
    /// Delta applied to novelty tolerance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjust_novelty: Option<f64>,
}

impl FeedbackEvent {
    pub fn liked(song: Song) -> Self {
        Self {
            liked_song: Some(song),
            ..Default::default()
        }
    }

    pub fn disliked(song: Song) -> Self {
        Self {
            disliked_song: Some(song),
            ..Default::default()
        }
    }

    pub fn with_novelty_adjustment(mut self, delta: f64) -> Self {
        self.adjust_novelty = Some(delta);
        self
    }
}

/// Aggregate state threaded through one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineState {
    pub user_id: String,
    pub query: String,
    pub intent: Intent,
    pub preferences: UserPreferences,
    pub session_context: SessionContext,
    /// Persisted profile snapshot taken by the memory stage
    pub user_memory: UserMemory,
    /// Accumulated across recommenders by concatenation
    pub candidate_tracks: Vec<Candidate>,
    /// Ordered, no duplicate ids
    pub final_playlist: Vec<Song>,
    pub playlist_title: Option<String>,
    pub playlist_description: Option<String>,
    pub explanations: Vec<String>,
    logs: Vec<AgentLog>,
    #[serde(skip)]
    pub library: Arc<Library>,
    /// Set when a stage fails fatally; remaining stages are skipped
    pub error: Option<String>,
    pub requires_human_review: bool,
    pub feedback: Option<FeedbackEvent>,
}

impl PipelineState {
    pub fn new(query: impl Into<String>, user_id: impl Into<String>, library: Arc<Library>) -> Self {
        let query = query.into();
        Self {
            user_id: user_id.into(),
            preferences: UserPreferences::for_query(query.clone()),
            query,
            intent: Intent::default(),
            session_context: SessionContext::default(),
            user_memory: UserMemory::default(),
            candidate_tracks: Vec::new(),
            final_playlist: Vec::new(),
            playlist_title: None,
            playlist_description: None,
            explanations: Vec::new(),
            logs: Vec::new(),
            library,
            error: None,
            requires_human_review: false,
            feedback: None,
        }
    }

    /// Agent trace in append order
    pub fn logs(&self) -> &[AgentLog] {
        &self.logs
    }

    pub(crate) fn push_log(&mut self, log: AgentLog) {
        self.logs.push(log);
    }

    /// Candidate that proposed `song_id`, first in accumulation order
    pub fn candidate_for(&self, song_id: &str) -> Option<&Candidate> {
        self.candidate_tracks.iter().find(|c| c.song.id == song_id)
    }
}
