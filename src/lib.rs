//! # Playlist Agents
//!
//! A multi-agent playlist recommender. A free-text request flows through a
//! fixed pipeline of agents that parse intent, propose familiar and novel
//! songs, filter them, rank them and explain the result.
//!
//! ## Features
//!
//! - **Orchestrator**: LLM intent extraction with a keyword fallback
//! - **Taste and discovery**: two recommenders over the same snapshot
//! - **Safety**: explicit-content filtering
//! - **Critic**: multi-objective rerank with artist diversity
//! - **Explanations and naming**: LLM text with deterministic templates
//! - **Memory**: likes, dislikes and preferences persisted as JSON or SQLite
//!
//! ## Architecture
//!
//! ```text
//! query → Pipeline ─→ agents (Stage) ─→ Langbase Pipes (HTTP, optional)
//!             ↓
//!        MemoryStore (JSON file | SQLite)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use playlist_agents::{Config, Pipeline, StateOverrides};
//! use playlist_agents::library::Library;
//! use playlist_agents::llm::DisabledGenerator;
//! use playlist_agents::memory::JsonFileStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let library = Arc::new(Library::load(&config.library.path)?);
//!     let store = Arc::new(JsonFileStore::new(&config.memory.path));
//!     let pipeline = Pipeline::new(library, Arc::new(DisabledGenerator), store);
//!
//!     let state = pipeline.invoke("chill songs for studying", "me", StateOverrides::default()).await;
//!     for song in &state.final_playlist {
//!         println!("{} - {}", song.artist, song.name);
//!     }
//!     Ok(())
//! }
//! ```

/// Pipeline agents: orchestrator, recommenders, safety, critic, explainer and friends.
pub mod agents;
/// Configuration loaded from environment variables.
pub mod config;
/// Error types and result aliases.
pub mod error;
/// Song catalog and text search.
pub mod library;
/// Text-generation client and the trait agents depend on.
pub mod llm;
/// Persisted user memory and run records.
pub mod memory;
/// Pipeline state, stage contract and runner.
pub mod pipeline;
/// Prompts for the LLM-backed agents.
pub mod prompts;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use pipeline::{Pipeline, PipelineState, StateOverrides};
