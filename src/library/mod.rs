//! Song library: an immutable in-memory catalog loaded once from JSON.
//!
//! The library also carries a small TF-IDF index used by text search and
//! seed-based similarity. Pipeline stages only iterate [`Library::songs`].

mod index;
mod song;

pub use song::Song;

use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use crate::error::{LibraryError, LibraryResult};
use index::TfIdfIndex;

/// Predicate set for [`Library::filter`]. Empty lists match everything.
#[derive(Debug, Clone, Default)]
pub struct LibraryFilter {
    pub genres: Vec<String>,
    pub artists: Vec<String>,
    pub tags: Vec<String>,
    pub moods: Vec<String>,
    pub min_year: Option<i32>,
    pub max_year: Option<i32>,
}

/// Read-only song catalog
#[derive(Debug, Clone)]
pub struct Library {
    songs: Vec<Song>,
    index: TfIdfIndex,
}

impl Library {
    /// Load a library from a JSON array of song records
    pub fn load(path: impl AsRef<Path>) -> LibraryResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| LibraryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let songs: Vec<Song> = serde_json::from_str(&raw)?;
        let library = Self::from_songs(songs)?;
        info!(path = %path.display(), songs = library.len(), "Library loaded");
        Ok(library)
    }

    /// Build a library from songs already in memory. Ids must be unique.
    pub fn from_songs(songs: Vec<Song>) -> LibraryResult<Self> {
        let mut seen = HashSet::with_capacity(songs.len());
        for song in &songs {
            if !seen.insert(song.id.as_str()) {
                return Err(LibraryError::DuplicateId {
                    id: song.id.clone(),
                });
            }
        }

        let corpus: Vec<String> = songs.iter().map(Song::search_text).collect();
        let index = TfIdfIndex::build(&corpus);
        Ok(Self { songs, index })
    }

    /// All songs in load order
    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    pub fn get(&self, id: &str) -> Option<&Song> {
        self.songs.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    /// Rank songs by text similarity to `query`. An empty query returns nothing.
    pub fn search(&self, query: &str, k: usize) -> Vec<&Song> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        let query_vec = self.index.vectorize(query);
        self.index
            .rank(&query_vec)
            .into_iter()
            .take(k)
            .map(|i| &self.songs[i])
            .collect()
    }

    /// Songs similar to the seeds, excluding the seeds themselves
    pub fn similar_to(&self, seeds: &[&Song], k: usize) -> Vec<&Song> {
        if seeds.is_empty() {
            return Vec::new();
        }
        let seed_text = seeds
            .iter()
            .map(|s| s.search_text())
            .collect::<Vec<_>>()
            .join("\n");
        let seed_ids: HashSet<&str> = seeds.iter().map(|s| s.id.as_str()).collect();
        let query_vec = self.index.vectorize(&seed_text);

        self.index
            .rank(&query_vec)
            .into_iter()
            .map(|i| &self.songs[i])
            .filter(|s| !seed_ids.contains(s.id.as_str()))
            .take(k)
            .collect()
    }

    /// Songs matching every non-empty predicate
    pub fn filter(&self, filter: &LibraryFilter) -> Vec<&Song> {
        self.songs
            .iter()
            .filter(|s| {
                if !filter.genres.is_empty() && !filter.genres.iter().any(|g| s.genres.contains(g))
                {
                    return false;
                }
                if !filter.artists.is_empty() && !filter.artists.contains(&s.artist) {
                    return false;
                }
                if !filter.tags.is_empty() && !filter.tags.iter().any(|t| s.tags.contains(t)) {
                    return false;
                }
                if !filter.moods.is_empty()
                    && !s.mood.as_ref().is_some_and(|m| filter.moods.contains(m))
                {
                    return false;
                }
                if let Some(min) = filter.min_year {
                    if s.year.unwrap_or(0) < min {
                        return false;
                    }
                }
                if let Some(max) = filter.max_year {
                    if s.year.unwrap_or(9999) > max {
                        return false;
                    }
                }
                true
            })
            .collect()
    }
}
