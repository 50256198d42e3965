use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Song library loading errors
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Failed to read library {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse library: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Duplicate song id in library: {id}")]
    DuplicateId { id: String },
}

/// User memory storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Memory file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt memory document: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Text-generation collaborator errors.
///
/// Every variant is recoverable: agents downgrade them to their heuristic or
/// template fallback.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("LLM disabled: no API key configured")]
    Disabled,

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors surfaced by the pipeline entry points
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("Unknown song: {song_id}")]
    UnknownSong { song_id: String },
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for library operations
pub type LibraryResult<T> = Result<T, LibraryError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "bad backend".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: bad backend");

        let err: AppError = PipelineError::UnknownSong {
            song_id: "x".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Pipeline error: Unknown song: x");
    }

    #[test]
    fn test_library_error_display() {
        let err = LibraryError::DuplicateId {
            id: "song-1".to_string(),
        };
        assert_eq!(err.to_string(), "Duplicate song id in library: song-1");
    }

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::Unavailable {
            message: "server down".to_string(),
            retries: 2,
        };
        assert_eq!(err.to_string(), "LLM unavailable: server down (retries: 2)");

        let err = LlmError::Api {
            status: 429,
            message: "rate limited".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 429 - rate limited");

        assert_eq!(
            LlmError::Disabled.to_string(),
            "LLM disabled: no API key configured"
        );
        assert_eq!(
            LlmError::Timeout { timeout_ms: 5000 }.to_string(),
            "Request timeout after 5000ms"
        );
    }

    #[test]
    fn test_pipeline_error_display() {
        let err = PipelineError::Validation {
            field: "novelty".to_string(),
            reason: "must be between 0.0 and 1.0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Validation failed: novelty - must be between 0.0 and 1.0"
        );

        let err = PipelineError::UnknownSong {
            song_id: "missing".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown song: missing");
    }

    #[test]
    fn test_storage_error_conversion_to_app_error() {
        let storage_err = StorageError::Query {
            message: "syntax".to_string(),
        };
        let app_err: AppError = storage_err.into();
        assert!(matches!(app_err, AppError::Storage(_)));
    }

    #[test]
    fn test_llm_error_conversion_to_app_error() {
        let app_err: AppError = LlmError::Timeout { timeout_ms: 1000 }.into();
        assert!(matches!(app_err, AppError::Llm(_)));
    }

    #[test]
    fn test_serde_error_converts_to_storage_error() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: StorageError = serde_err.into();
        assert!(err.to_string().starts_with("Corrupt memory document"));
    }
}
