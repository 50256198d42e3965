use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use playlist_agents::{
    config::{Config, LogFormat, MemoryBackend},
    error::{AppResult, PipelineError},
    library::{Library, LibraryFilter, Song},
    llm::{DisabledGenerator, LangbaseClient, TextGenerator},
    memory::{JsonFileStore, MemoryStore, NoopRecorder, RunRecorder, SqliteMemoryStore},
    pipeline::{
        Candidate, FeedbackEvent, Pipeline, PipelineState, PreferenceOverrides, ReviewDecision,
        ReviewGate, StateOverrides, UserPreferences,
    },
};

#[derive(Parser)]
#[command(name = "playlist-agents", version, about = "Multi-agent playlist recommender")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a playlist from a free-text request
    Recommend {
        query: String,
        #[command(flatten)]
        opts: RecommendOpts,
    },
    /// Record a like or dislike
    Feedback {
        #[arg(long, conflicts_with = "dislike", required_unless_present = "dislike")]
        like: Option<String>,
        #[arg(long)]
        dislike: Option<String>,
        /// Change to novelty tolerance, e.g. 0.2 or -0.1
        #[arg(long, allow_hyphen_values = true)]
        adjust_novelty: Option<f64>,
        #[arg(long, default_value = "default")]
        user: String,
    },
    /// Build a playlist, then rebuild it with free-text feedback applied
    Refine {
        query: String,
        feedback: String,
        #[command(flatten)]
        opts: RecommendOpts,
    },
    /// Search the library by text
    Search {
        text: String,
        #[arg(short, default_value_t = 10)]
        k: usize,
    },
    /// List songs similar to the given ones
    Similar {
        #[arg(required = true)]
        song_ids: Vec<String>,
        #[arg(short, default_value_t = 10)]
        k: usize,
    },
    /// List songs matching every given predicate
    Browse {
        #[arg(long = "genre")]
        genres: Vec<String>,
        #[arg(long = "artist")]
        artists: Vec<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long = "mood")]
        moods: Vec<String>,
        #[arg(long)]
        min_year: Option<i32>,
        #[arg(long)]
        max_year: Option<i32>,
    },
    /// Print the stored profile
    Profile {
        #[arg(long, default_value = "default")]
        user: String,
    },
    /// List recent runs (SQLite backend only)
    History {
        #[arg(long, default_value = "default")]
        user: String,
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
}

#[derive(Args)]
struct RecommendOpts {
    #[arg(long, default_value = "default")]
    user: String,
    #[arg(long)]
    size: Option<usize>,
    #[arg(long)]
    novelty: Option<f64>,
    #[arg(long)]
    explicit_filter: bool,
    /// Review candidates on stdin before ranking
    #[arg(long)]
    review: bool,
    /// Print the final state as JSON
    #[arg(long)]
    json: bool,
}

impl RecommendOpts {
    fn overrides(&self) -> Result<StateOverrides, PipelineError> {
        if let Some(novelty) = self.novelty {
            if !(0.0..=1.0).contains(&novelty) {
                return Err(PipelineError::Validation {
                    field: "novelty".to_string(),
                    reason: "must be between 0.0 and 1.0".to_string(),
                });
            }
        }
        Ok(StateOverrides {
            preferences: PreferenceOverrides {
                size: self.size,
                novelty_tolerance: self.novelty,
                explicit_filter: self.explicit_filter.then_some(true),
                ..Default::default()
            },
            requires_human_review: self.review,
            ..Default::default()
        })
    }
}

/// Review gate that lists candidates on stderr and reads rejected ids from stdin
struct StdinReview;

#[async_trait]
impl ReviewGate for StdinReview {
    async fn review(&self, candidates: &[Candidate]) -> ReviewDecision {
        let listing: Vec<String> = candidates
            .iter()
            .map(|c| format!("  [{}] {} - {} ({})", c.song.id, c.song.artist, c.song.name, c.source))
            .collect();

        let line = tokio::task::spawn_blocking(move || {
            let mut err = std::io::stderr();
            let _ = writeln!(err, "Candidates:\n{}", listing.join("\n"));
            let _ = write!(err, "Song ids to reject (space separated, empty to approve): ");
            let _ = err.flush();
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await;

        match line {
            Ok(Ok(line)) if !line.trim().is_empty() => ReviewDecision::Reject {
                song_ids: line.split_whitespace().map(str::to_string).collect(),
                note: Some("rejected at the prompt".to_string()),
            },
            _ => ReviewDecision::Approve,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    let cli = Cli::parse();
    info!(version = env!("CARGO_PKG_VERSION"), "playlist-agents starting");

    let library = Arc::new(
        Library::load(&config.library.path)
            .with_context(|| format!("loading library from {}", config.library.path.display()))?,
    );

    let (store, recorder, sqlite) = open_memory(&config).await?;

    match cli.command {
        Command::Recommend { query, opts } => {
            let pipeline = build_pipeline(&config, library, store, recorder, opts.review)?;
            let state = pipeline.invoke(&query, &opts.user, opts.overrides()?).await;
            print_state(&state, opts.json)?;
        }
        Command::Refine {
            query,
            feedback,
            opts,
        } => {
            let pipeline = build_pipeline(&config, library, store, recorder, opts.review)?;
            let first = pipeline.invoke(&query, &opts.user, opts.overrides()?).await;
            if !opts.json {
                print_state(&first, false)?;
                println!("\n--- refined with \"{}\" ---\n", feedback);
            }
            let refined = pipeline.refine(&first, &feedback).await;
            print_state(&refined, opts.json)?;
        }
        Command::Feedback {
            like,
            dislike,
            adjust_novelty,
            user,
        } => {
            let event = match (like, dislike) {
                (Some(id), _) => FeedbackEvent::liked(find_song(&library, &id)?),
                (None, Some(id)) => FeedbackEvent::disliked(find_song(&library, &id)?),
                (None, None) => bail!("either --like or --dislike is required"),
            };
            let event = match adjust_novelty {
                Some(delta) => event.with_novelty_adjustment(delta),
                None => event,
            };

            let pipeline = build_pipeline(&config, library, store, recorder, false)?;
            let state = pipeline
                .process_feedback(&user, event, UserPreferences::default())
                .await;
            for log in state.logs() {
                println!("{}", log);
            }
        }
        Command::Search { text, k } => print_songs(&library.search(&text, k)),
        Command::Similar { song_ids, k } => {
            let seeds = song_ids
                .iter()
                .map(|id| {
                    library.get(id).ok_or_else(|| PipelineError::UnknownSong {
                        song_id: id.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            print_songs(&library.similar_to(&seeds, k));
        }
        Command::Browse {
            genres,
            artists,
            tags,
            moods,
            min_year,
            max_year,
        } => {
            let filter = LibraryFilter {
                genres,
                artists,
                tags,
                moods,
                min_year,
                max_year,
            };
            print_songs(&library.filter(&filter));
        }
        Command::Profile { user } => {
            let memory = store.load(&user).await?;
            println!("{}", serde_json::to_string_pretty(&memory)?);
        }
        Command::History { user, limit } => {
            let Some(sqlite) = sqlite else {
                bail!("run history requires MEMORY_BACKEND=sqlite");
            };
            for run in sqlite.recent_runs(&user, limit).await? {
                println!(
                    "{} [{}] \"{}\" -> {} tracks ({} ms){}",
                    run.created_at.format("%Y-%m-%d %H:%M:%S"),
                    run.intent,
                    run.query,
                    run.playlist.len(),
                    run.latency_ms,
                    run.error.map(|e| format!(" error: {}", e)).unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}

type MemoryHandles = (
    Arc<dyn MemoryStore>,
    Arc<dyn RunRecorder>,
    Option<Arc<SqliteMemoryStore>>,
);

async fn open_memory(config: &Config) -> AppResult<MemoryHandles> {
    match config.memory.backend {
        MemoryBackend::Json => {
            info!(path = %config.memory.path.display(), "Using JSON memory store");
            Ok((
                Arc::new(JsonFileStore::new(&config.memory.path)),
                Arc::new(NoopRecorder),
                None,
            ))
        }
        MemoryBackend::Sqlite => {
            let store = match SqliteMemoryStore::new(&config.database).await {
                Ok(s) => {
                    info!(path = %config.database.path.display(), "Database initialized");
                    Arc::new(s)
                }
                Err(e) => {
                    error!(error = %e, "Failed to initialize database");
                    return Err(e.into());
                }
            };
            Ok((store.clone(), store.clone(), Some(store)))
        }
    }
}

fn build_pipeline(
    config: &Config,
    library: Arc<Library>,
    store: Arc<dyn MemoryStore>,
    recorder: Arc<dyn RunRecorder>,
    review: bool,
) -> AppResult<Pipeline> {
    let generator: Arc<dyn TextGenerator> = if config.llm_enabled() {
        let client = LangbaseClient::new(&config.llm, config.request.clone())?;
        info!(base_url = %client.base_url(), "Langbase client initialized");
        Arc::new(client)
    } else {
        info!("LANGBASE_API_KEY not set, using heuristic fallbacks");
        Arc::new(DisabledGenerator)
    };

    let pipeline = Pipeline::new(library, generator, store)
        .with_recorder(recorder)
        .with_pipes(config.pipes.clone());
    Ok(if review {
        pipeline.with_review_gate(Arc::new(StdinReview))
    } else {
        pipeline
    })
}

fn find_song(library: &Library, id: &str) -> Result<Song, PipelineError> {
    library
        .get(id)
        .cloned()
        .ok_or_else(|| PipelineError::UnknownSong {
            song_id: id.to_string(),
        })
}

fn print_songs(songs: &[&Song]) {
    for song in songs {
        println!("[{}] {} - {} ({})", song.id, song.artist, song.name, song.genre_summary());
    }
}

fn print_state(state: &PipelineState, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(state)?);
        return Ok(());
    }

    if let Some(err) = &state.error {
        println!("Error: {}", err);
    }
    if let Some(title) = &state.playlist_title {
        println!("{}", title);
    }
    if let Some(description) = &state.playlist_description {
        println!("{}\n", description);
    }
    for (i, song) in state.final_playlist.iter().enumerate() {
        let reason = playlist_agents::agents::song_reason(song, &state.candidate_tracks);
        println!("{:>2}. {} - {}  ({})", i + 1, song.artist, song.name, reason);
    }
    if let Some(explanation) = state.explanations.last() {
        println!("\n{}", explanation);
    }
    println!();
    for log in state.logs() {
        println!("  {}", log);
    }
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
