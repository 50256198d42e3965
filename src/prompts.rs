//! Centralized prompt definitions for the LLM-backed agents
//!
//! Prompts that embed request data are built by functions here so the agents
//! only assemble inputs.

use crate::library::Song;

/// System prompt for the orchestrator's structured intent extraction.
pub const ORCHESTRATOR_PROMPT: &str = r#"You are the Orchestrator Agent of a music recommendation system.

Analyze the user's request and extract:
1. Intent: recommend, explain, update_prefs, surprise_me
2. Session context: activity, duration_minutes, mood, time_of_day
3. Preferences: genres, artists, tags, moods, language_prefs, explicit_filter, size, novelty_tolerance

Return ONLY valid JSON in this exact format:
{
  "intent": "recommend",
  "session_context": {
    "activity": "gym",
    "duration_minutes": 40,
    "mood": "energetic"
  },
  "preferences": {
    "query": "40-minute gym playlist, mostly rap, surprise me with 3 new artists",
    "genres": ["rap", "hip-hop"],
    "language_prefs": [],
    "size": 10,
    "novelty_tolerance": 0.3
  }
}

Guidelines:
- novelty_tolerance is the fraction of the playlist that should be new to the user (0.0-1.0)
- Leave lists empty rather than guessing
- Always respond with valid JSON only, no other text."#;

/// System prompt for the explainer.
pub const EXPLAINER_SYSTEM_PROMPT: &str =
    "You are a music curator explaining playlists to friends.";

/// System prompt for refinement analysis.
pub const REFINER_SYSTEM_PROMPT: &str = r#"You analyze feedback on a generated playlist.

Determine:
1. What aspects to change (energy, genre, mood, artists)
2. Which songs to remove (if any)
3. What characteristics to emphasize
4. Specific adjustments (numeric ranges for energy, valence, etc)

Be brief."#;

/// System prompt for playlist naming.
pub const NAMER_SYSTEM_PROMPT: &str = r#"You name playlists.

Reply with exactly two lines:
Title: <a catchy, creative title of 3-6 words>
Description: <one sentence that captures the essence>

Examples:
Title: Midnight Study Vibes
Description: Lo-fi beats for deep focus.
Title: Thunder & Lightning
Description: High-octane workout anthems."#;

/// User content for the orchestrator call
pub fn orchestrator_request(query: &str) -> String {
    format!("User request: {}", query)
}

/// One playlist line as shown to the explainer
pub struct PlaylistLine<'a> {
    pub song: &'a Song,
    pub familiar: bool,
}

/// Explainer prompt embedding the literal playlist so the model cannot invent tracks
pub fn explainer_request(
    query: &str,
    activity: Option<&str>,
    lines: &[PlaylistLine<'_>],
    artists: &[&str],
    genres: &[&str],
) -> String {
    let mut playlist = format!("ACTUAL PLAYLIST ({} tracks):\n", lines.len());
    for (i, line) in lines.iter().enumerate() {
        playlist.push_str(&format!(
            "{}. {} by {} [{}] - {}\n",
            i + 1,
            line.song.name,
            line.song.artist,
            line.song.genre_summary(),
            if line.familiar { "familiar" } else { "new" }
        ));
    }

    format!(
        r#"Create a fun explanation for this music playlist based on ACTUAL songs.

User asked: "{query}"
Activity: {activity}

{playlist}
Artists: {artists}
Genres: {genres}

IMPORTANT: Base your explanation on the ACTUAL songs listed above. Don't invent artists or genres not in the list.

Write 2-3 sentences that:
1. Mention the REAL artists and genres from the playlist
2. Explain the mix (familiar vs new artists)
3. Make it sound exciting but HONEST

Be casual and accurate."#,
        query = query,
        activity = activity.unwrap_or("casual listening"),
        playlist = playlist,
        artists = artists.iter().take(5).copied().collect::<Vec<_>>().join(", "),
        genres = genres.iter().take(5).copied().collect::<Vec<_>>().join(", "),
    )
}

/// Refiner prompt
pub fn refiner_request(
    original_query: &str,
    playlist: &[Song],
    feedback: &str,
    novelty_tolerance: f64,
    genres: &[String],
) -> String {
    let songs = playlist
        .iter()
        .take(5)
        .map(|s| {
            format!(
                "- {} by {} [{}] mood={} energy={}",
                s.name,
                s.artist,
                s.genre_summary(),
                s.mood.as_deref().unwrap_or("n/a"),
                s.energy.map(|e| format!("{:.2}", e)).unwrap_or_else(|| "n/a".to_string())
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Original Query: {}\nCurrent Playlist:\n{}\nUser Feedback: {}\nUser Preferences: Novelty: {:.2}, Genres: {}",
        original_query,
        songs,
        feedback,
        novelty_tolerance,
        genres.join(", ")
    )
}

/// Namer prompt
pub fn namer_request(playlist: &[Song], query: &str, mood: Option<&str>) -> String {
    let mut songs = playlist
        .iter()
        .take(5)
        .map(|s| format!("{} by {}", s.name, s.artist))
        .collect::<Vec<_>>()
        .join(", ");
    if playlist.len() > 5 {
        songs.push_str(&format!(" and {} more", playlist.len() - 5));
    }

    format!(
        "Songs: {}\nOriginal Query: {}\nVibe: {}",
        songs,
        query,
        mood.unwrap_or("varied")
    )
}
