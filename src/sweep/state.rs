//! Per-combination state machine
//!
//! QUEUED → RUNNING → {SUCCEEDED | FAILED}
//! QUEUED → {CANCELLED | SKIPPED}

use serde::{Deserialize, Serialize};

/// Lifecycle state of one sweep combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CombinationState {
    /// Waiting for a worker
    Queued,
    /// Composing and building
    Running,
    Succeeded,
    Failed,
    /// Never started because shutdown was requested
    Cancelled,
    /// Never started because fail-fast tripped
    Skipped,
}

impl CombinationState {
    pub fn can_transition_to(&self, target: CombinationState) -> bool {
        matches!(
            (self, target),
            (CombinationState::Queued, CombinationState::Running)
                | (CombinationState::Queued, CombinationState::Cancelled)
                | (CombinationState::Queued, CombinationState::Skipped)
                | (CombinationState::Running, CombinationState::Succeeded)
                | (CombinationState::Running, CombinationState::Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CombinationState::Queued | CombinationState::Running)
    }

    /// True if the combination was never started.
    pub fn is_unstarted(&self) -> bool {
        matches!(
            self,
            CombinationState::Queued | CombinationState::Cancelled | CombinationState::Skipped
        )
    }
}

/// Errors for combination state changes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CombinationStateError {
    #[error("invalid state transition for combination {index} from {from:?} to {to:?}")]
    InvalidTransition {
        index: usize,
        from: CombinationState,
        to: CombinationState,
    },
}

/// Checked transition helper used by results.
pub(crate) fn transition(
    index: usize,
    current: &mut CombinationState,
    next: CombinationState,
) -> Result<(), CombinationStateError> {
    if !current.can_transition_to(next) {
        return Err(CombinationStateError::InvalidTransition {
            index,
            from: *current,
            to: next,
        });
    }
    *current = next;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_paths() {
        let mut state = CombinationState::Queued;
        transition(0, &mut state, CombinationState::Running).unwrap();
        transition(0, &mut state, CombinationState::Failed).unwrap();
        assert!(state.is_terminal());

        let mut state = CombinationState::Queued;
        transition(1, &mut state, CombinationState::Cancelled).unwrap();
        assert!(state.is_unstarted());
    }

    #[test]
    fn test_invalid_transitions() {
        let mut state = CombinationState::Queued;
        assert_eq!(
            transition(3, &mut state, CombinationState::Succeeded),
            Err(CombinationStateError::InvalidTransition {
                index: 3,
                from: CombinationState::Queued,
                to: CombinationState::Succeeded
            })
        );

        let mut state = CombinationState::Running;
        assert!(transition(3, &mut state, CombinationState::Cancelled).is_err());
        assert!(!CombinationState::Succeeded.can_transition_to(CombinationState::Running));
    }

    #[test]
    fn test_serialization() {
        assert_eq!(
            serde_json::to_string(&CombinationState::Succeeded).unwrap(),
            r#""SUCCEEDED""#
        );
        assert_eq!(
            serde_json::to_string(&CombinationState::Skipped).unwrap(),
            r#""SKIPPED""#
        );
    }
}
