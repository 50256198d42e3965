//! Integration tests for the memory stores
//!
//! Both backends are exercised through the `MemoryStore` trait against real
//! files in a temp directory.

use std::sync::Arc;

use playlist_agents::config::DatabaseConfig;
use playlist_agents::library::Song;
use playlist_agents::memory::{
    JsonFileStore, MemoryStore, RunRecord, RunRecorder, SqliteMemoryStore, UserMemory,
};

fn song(id: &str, artist: &str, genre: &str) -> Song {
    Song::new(id, format!("Song {}", id), artist)
        .with_genres([genre])
        .with_mood("happy")
}

async fn sqlite_at(path: std::path::PathBuf) -> SqliteMemoryStore {
    let config = DatabaseConfig {
        path,
        max_connections: 2,
    };
    SqliteMemoryStore::new(&config)
        .await
        .expect("Failed to open SQLite store")
}

/// Like one song, dislike another, and read the profile back
async fn like_then_dislike(store: &dyn MemoryStore) -> UserMemory {
    let liked = song("s1", "Band", "rock");
    store
        .update("alice", Box::new(move |m| m.record_like(&liked)))
        .await
        .unwrap();
    store
        .update("alice", Box::new(|m| m.record_dislike("s2")))
        .await
        .unwrap();
    store.load("alice").await.unwrap()
}

#[cfg(test)]
mod json_store_tests {
    use super::*;

    #[tokio::test]
    async fn test_profile_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_prefs.json");

        let memory = like_then_dislike(&JsonFileStore::new(&path)).await;
        let reopened = JsonFileStore::new(&path).load("alice").await.unwrap();

        assert_eq!(reopened, memory);
        assert_eq!(reopened.liked_songs, vec!["s1"]);
        assert_eq!(reopened.disliked_songs, vec!["s2"]);
        assert_eq!(reopened.preferred_genres, vec!["rock"]);
        assert_eq!(reopened.preferred_artists, vec!["Band"]);
    }

    #[tokio::test]
    async fn test_file_is_plain_json_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_prefs.json");
        like_then_dislike(&JsonFileStore::new(&path)).await;

        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["liked_songs"], serde_json::json!(["s1"]));
        assert_eq!(value["listening_history"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path().join("user_prefs.json")));

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let liked = song(&format!("s{}", i), &format!("Artist {}", i), "pop");
                store
                    .update("alice", Box::new(move |m| m.record_like(&liked)))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let memory = store.load("alice").await.unwrap();
        assert_eq!(memory.liked_songs.len(), 8);
        assert_eq!(memory.preferred_artists.len(), 8);
        assert_eq!(memory.preferred_genres, vec!["pop"]);
    }
}

#[cfg(test)]
mod sqlite_store_tests {
    use super::*;

    #[tokio::test]
    async fn test_profile_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("playlist.db");

        let memory = {
            let store = sqlite_at(path.clone()).await;
            like_then_dislike(&store).await
        };

        let reopened = sqlite_at(path).await.load("alice").await.unwrap();
        assert_eq!(reopened, memory);
        assert_eq!(reopened.preferred_moods, vec!["happy"]);
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(sqlite_at(dir.path().join("playlist.db")).await);

        let mut handles = Vec::new();
        for i in 0..4 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update("bob", Box::new(move |m| m.record_dislike(&format!("d{}", i))))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let memory = store.load("bob").await.unwrap();
        assert_eq!(memory.disliked_songs.len(), 4);
    }

    #[tokio::test]
    async fn test_recent_runs_newest_first_with_limit() {
        let store = SqliteMemoryStore::new_in_memory().await.unwrap();

        for (i, query) in ["first", "second", "third"].iter().enumerate() {
            let mut run = RunRecord::new("carol", *query);
            run.intent = "create_playlist".to_string();
            run.playlist = vec![format!("s{}", i)];
            run.created_at = run.created_at + chrono::Duration::seconds(i as i64);
            store.record_run(&run).await.unwrap();
        }
        store.record_run(&RunRecord::new("dave", "other")).await.unwrap();

        let runs = store.recent_runs("carol", 2).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].query, "third");
        assert_eq!(runs[1].query, "second");
        assert_eq!(runs[0].playlist, vec!["s2"]);
    }
}
