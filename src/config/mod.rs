use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub library: LibraryConfig,
    pub memory: MemoryConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub pipes: PipeConfig,
}

/// Text-generation endpoint configuration.
///
/// A missing API key disables the LLM entirely; every stage that would call it
/// takes its deterministic fallback path instead.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
}

/// Song library location
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    pub path: PathBuf,
}

/// Which store backs the persisted user memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryBackend {
    /// One JSON document shared by every user id.
    Json,
    /// SQLite rows keyed by user id.
    Sqlite,
}

/// User memory configuration
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub backend: MemoryBackend,
    pub path: PathBuf,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Pipe names used for each LLM-backed agent
#[derive(Debug, Clone)]
pub struct PipeConfig {
    pub orchestrator: String,
    pub explainer: String,
    pub refiner: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let llm = LlmConfig {
            api_key: env::var("LANGBASE_API_KEY")
                .ok()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            base_url: env::var("LANGBASE_BASE_URL")
                .unwrap_or_else(|_| "https://api.langbase.com".to_string()),
        };

        let library = LibraryConfig {
            path: PathBuf::from(
                env::var("LIBRARY_PATH").unwrap_or_else(|_| "./data/songs.json".to_string()),
            ),
        };

        let backend = match env::var("MEMORY_BACKEND")
            .unwrap_or_else(|_| "json".to_string())
            .to_lowercase()
            .as_str()
        {
            "json" => MemoryBackend::Json,
            "sqlite" => MemoryBackend::Sqlite,
            other => {
                return Err(AppError::Config {
                    message: format!("MEMORY_BACKEND must be 'json' or 'sqlite', got '{}'", other),
                })
            }
        };

        let memory = MemoryConfig {
            backend,
            path: PathBuf::from(
                env::var("MEMORY_PATH").unwrap_or_else(|_| "./data/user_prefs.json".to_string()),
            ),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/playlist.db".to_string()),
            ),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30000),
            max_retries: env::var("MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1),
            retry_delay_ms: env::var("RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(500),
        };

        let pipes = PipeConfig {
            orchestrator: env::var("PIPE_ORCHESTRATOR")
                .unwrap_or_else(|_| "playlist-orchestrator-v1".to_string()),
            explainer: env::var("PIPE_EXPLAINER")
                .unwrap_or_else(|_| "playlist-explainer-v1".to_string()),
            refiner: env::var("PIPE_REFINER").unwrap_or_else(|_| "playlist-refiner-v1".to_string()),
        };

        Ok(Config {
            llm,
            library,
            memory,
            database,
            logging,
            request,
            pipes,
        })
    }

    /// Whether an API key is configured for the text-generation endpoint
    pub fn llm_enabled(&self) -> bool {
        self.llm.api_key.is_some()
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 1,
            retry_delay_ms: 500,
        }
    }
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            orchestrator: "playlist-orchestrator-v1".to_string(),
            explainer: "playlist-explainer-v1".to_string(),
            refiner: "playlist-refiner-v1".to_string(),
        }
    }
}
