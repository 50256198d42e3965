use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// A track in the library.
///
/// Songs are immutable once loaded. Equality and hashing look at `id` only, so
/// two records with the same id are the same song regardless of metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Song {
    /// Unique, stable identifier.
    pub id: String,
    /// Track title.
    pub name: String,
    /// Performing artist.
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(
        default,
        alias = "duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration_sec: Option<u32>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    /// 0.0-1.0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<f64>,
    /// 0.0-1.0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub danceability: Option<f64>,
    /// 0.0-1.0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valence: Option<f64>,
    /// 0-100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popularity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
}

impl PartialEq for Song {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Song {}

impl Hash for Song {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Song {
    /// Create a song with only the required fields set
    pub fn new(id: impl Into<String>, name: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            artist: artist.into(),
            album: None,
            year: None,
            duration_sec: None,
            genres: Vec::new(),
            tags: Vec::new(),
            category: None,
            mood: None,
            energy: None,
            danceability: None,
            valence: None,
            popularity: None,
            cover_url: None,
        }
    }

    pub fn with_genres<I, S>(mut self, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.genres = genres.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_mood(mut self, mood: impl Into<String>) -> Self {
        self.mood = Some(mood.into());
        self
    }

    pub fn with_energy(mut self, energy: f64) -> Self {
        self.energy = Some(energy);
        self
    }

    pub fn with_danceability(mut self, danceability: f64) -> Self {
        self.danceability = Some(danceability);
        self
    }

    pub fn with_valence(mut self, valence: f64) -> Self {
        self.valence = Some(valence);
        self
    }

    pub fn with_popularity(mut self, popularity: u32) -> Self {
        self.popularity = Some(popularity);
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    /// Case-insensitive tag membership
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// Case-insensitive genre membership
    pub fn has_genre(&self, genre: &str) -> bool {
        self.genres.iter().any(|g| g.eq_ignore_ascii_case(genre))
    }

    /// First two genres joined for human-readable reasons
    pub fn genre_summary(&self) -> String {
        self.genres
            .iter()
            .take(2)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Text used for the search index
    pub(crate) fn search_text(&self) -> String {
        let mut parts: Vec<&str> = vec![&self.name, &self.artist];
        if let Some(album) = &self.album {
            parts.push(album);
        }
        parts.extend(self.genres.iter().map(String::as_str));
        parts.extend(self.tags.iter().map(String::as_str));
        if let Some(mood) = &self.mood {
            parts.push(mood);
        }
        if let Some(category) = &self.category {
            parts.push(category);
        }
        parts.join(" ")
    }
}
