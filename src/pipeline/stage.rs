use async_trait::async_trait;

use super::delta::StateDelta;
use super::state::PipelineState;

/// Tagged result of one stage.
///
/// `Degraded` carries a usable value produced by a fallback path; the pipeline
/// keeps going. `Fatal` stops the run and is recorded on `PipelineState::error`.
#[derive(Debug, Clone)]
pub enum StageOutcome<T> {
    Success(T),
    Degraded { value: T, reason: String },
    Fatal { reason: String },
}

impl<T> StageOutcome<T> {
    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        StageOutcome::Degraded {
            value,
            reason: reason.into(),
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        StageOutcome::Fatal {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Success(_))
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, StageOutcome::Degraded { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, StageOutcome::Fatal { .. })
    }

    /// The produced value, if any
    pub fn into_value(self) -> Option<T> {
        match self {
            StageOutcome::Success(value) | StageOutcome::Degraded { value, .. } => Some(value),
            StageOutcome::Fatal { .. } => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> StageOutcome<U> {
        match self {
            StageOutcome::Success(value) => StageOutcome::Success(f(value)),
            StageOutcome::Degraded { value, reason } => StageOutcome::Degraded {
                value: f(value),
                reason,
            },
            StageOutcome::Fatal { reason } => StageOutcome::Fatal { reason },
        }
    }
}

/// One step of the recommendation pipeline.
///
/// Stages read the current state and return a [`StateDelta`]; they never
/// mutate the state they are given.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stable stage name used in tracing and errors
    fn name(&self) -> &'static str;

    async fn run(&self, state: &PipelineState) -> StageOutcome<StateDelta>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_value_access() {
        assert_eq!(StageOutcome::Success(3).into_value(), Some(3));
        assert_eq!(StageOutcome::degraded(4, "fallback").into_value(), Some(4));
        assert_eq!(StageOutcome::<i32>::fatal("boom").into_value(), None);
    }

    #[test]
    fn test_outcome_map_keeps_tag() {
        let mapped = StageOutcome::degraded(2, "why").map(|v| v * 10);
        match mapped {
            StageOutcome::Degraded { value, reason } => {
                assert_eq!(value, 20);
                assert_eq!(reason, "why");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(StageOutcome::<i32>::fatal("x").map(|v| v + 1).is_fatal());
        assert!(StageOutcome::Success(1).is_success());
        assert!(StageOutcome::degraded(1, "r").is_degraded());
    }
}
