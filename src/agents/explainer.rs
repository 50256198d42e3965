use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::library::Song;
use crate::llm::TextGenerator;
use crate::pipeline::{
    AgentLog, Candidate, PipelineState, SourceAgent, Stage, StageOutcome, StateDelta,
};
use crate::prompts::{explainer_request, PlaylistLine, EXPLAINER_SYSTEM_PROMPT};

pub const EMPTY_PLAYLIST_EXPLANATION: &str = "No playlist was created.";

fn is_familiar(song: &Song, candidates: &[Candidate]) -> bool {
    candidates
        .iter()
        .find(|c| c.song.id == song.id)
        .is_some_and(|c| c.source == SourceAgent::TasteRecommender)
}

fn distinct_in_order<'a>(values: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::new();
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

fn playlist_artists(playlist: &[Song]) -> Vec<&str> {
    distinct_in_order(playlist.iter().map(|s| s.artist.as_str()))
}

fn playlist_genres(playlist: &[Song]) -> Vec<&str> {
    distinct_in_order(playlist.iter().flat_map(|s| s.genres.iter().map(String::as_str)))
}

/// Deterministic explanation used when the model is unavailable
pub fn template_explanation(playlist: &[Song], candidates: &[Candidate]) -> String {
    let artists = playlist_artists(playlist);
    let genres = playlist_genres(playlist);
    let familiar = playlist.iter().filter(|s| is_familiar(s, candidates)).count();
    let novel = playlist.len() - familiar;

    let mut text = format!(
        "Created a {}-track playlist featuring {}{}. ",
        playlist.len(),
        artists.iter().take(3).copied().collect::<Vec<_>>().join(", "),
        if artists.len() > 3 { " and more" } else { "" }
    );
    if genres.len() >= 2 {
        text.push_str(&format!("Mix of {} and {} with ", genres[0], genres[1]));
    }
    text.push_str(&format!(
        "{} familiar tracks and {} new discoveries.",
        familiar, novel
    ));
    text
}

/// Why one song is in the playlist: its candidate's reason, or a genre blurb
pub fn song_reason(song: &Song, candidates: &[Candidate]) -> String {
    match candidates.iter().find(|c| c.song.id == song.id) {
        Some(candidate) => candidate.reason.clone(),
        None => format!(
            "This track matches your vibe with its {} energy.",
            song.genre_summary()
        ),
    }
}

/// Writes one user-facing explanation of the final playlist
pub struct Explainer {
    generator: Arc<dyn TextGenerator>,
    pipe_name: String,
}

impl Explainer {
    pub fn new(generator: Arc<dyn TextGenerator>, pipe_name: impl Into<String>) -> Self {
        Self {
            generator,
            pipe_name: pipe_name.into(),
        }
    }

    async fn explain_with_llm(&self, state: &PipelineState) -> Result<String, String> {
        let playlist = &state.final_playlist;
        let lines: Vec<PlaylistLine<'_>> = playlist
            .iter()
            .map(|song| PlaylistLine {
                song,
                familiar: is_familiar(song, &state.candidate_tracks),
            })
            .collect();
        let prompt = explainer_request(
            &state.query,
            state.session_context.activity.as_deref(),
            &lines,
            &playlist_artists(playlist),
            &playlist_genres(playlist),
        );

        let text = self
            .generator
            .generate(&self.pipe_name, EXPLAINER_SYSTEM_PROMPT, &prompt)
            .await
            .map_err(|e| e.to_string())?;
        let text = text.trim();
        if text.is_empty() {
            return Err("Empty explanation".to_string());
        }
        Ok(text.to_string())
    }
}

#[async_trait]
impl Stage for Explainer {
    fn name(&self) -> &'static str {
        "explainer"
    }

    async fn run(&self, state: &PipelineState) -> StageOutcome<StateDelta> {
        if state.final_playlist.is_empty() {
            return StageOutcome::Success(
                StateDelta::new()
                    .with_explanation(EMPTY_PLAYLIST_EXPLANATION)
                    .with_log(AgentLog::new("Storyteller", "explained", "Empty playlist")),
            );
        }

        let start = Instant::now();
        match self.explain_with_llm(state).await {
            Ok(text) => {
                info!(
                    chars = text.chars().count(),
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Explanation generated"
                );
                let details = format!(
                    "Generated user-friendly explanation ({} chars)",
                    text.chars().count()
                );
                StageOutcome::Success(
                    StateDelta::new()
                        .with_explanation(text)
                        .with_log(AgentLog::new("Storyteller", "explained", details)),
                )
            }
            Err(reason) => {
                warn!(error = %reason, "Explanation failed, using template");
                let text = template_explanation(&state.final_playlist, &state.candidate_tracks);
                StageOutcome::degraded(
                    StateDelta::new().with_explanation(text).with_log(AgentLog::new(
                        "Storyteller",
                        "fallback_explanation",
                        format!("Used template explanation: {}", reason),
                    )),
                    reason,
                )
            }
        }
    }
}
