use super::{events::RunEvent, states::RunPhase};
use crate::error::{IndexerError, Result};
use tracing::debug;
use uuid::Uuid;

/// Phase tracker for one indexing run.
///
/// The engine drives it explicitly at each suspension point so that an
/// out-of-order step (for example committing a page that never joined)
/// surfaces as an error instead of silently corrupting the checkpoint.
#[derive(Debug, Clone)]
pub struct RunStateMachine {
    run_id: Uuid,
    phase: RunPhase,
}

impl RunStateMachine {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            phase: RunPhase::default(),
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Attempt to transition the run
    pub fn transition(&mut self, event: RunEvent) -> Result<RunPhase> {
        let target = Self::determine_target_phase(self.phase, &event)?;

        debug!(
            run_id = %self.run_id,
            from = %self.phase,
            to = %target,
            event = event.event_type(),
            "Run phase transition"
        );

        self.phase = target;
        Ok(target)
    }

    fn determine_target_phase(current: RunPhase, event: &RunEvent) -> Result<RunPhase> {
        let target = match (current, event) {
            (RunPhase::Init, RunEvent::Validated) => RunPhase::EnsureIndex,
            (RunPhase::EnsureIndex, RunEvent::IndexReady) => RunPhase::Paginate,

            (RunPhase::Paginate, RunEvent::PageFetched) => RunPhase::FanOut,
            (RunPhase::Paginate, RunEvent::SourceExhausted) => RunPhase::Done,
            (RunPhase::FanOut, RunEvent::Dispatched) => RunPhase::Join,
            (RunPhase::Join, RunEvent::Joined) => RunPhase::Paginate,

            (phase, RunEvent::Fail(_)) if !phase.is_terminal() => RunPhase::Failed,
            (phase, RunEvent::Cancel) if !phase.is_terminal() => RunPhase::Cancelled,

            (from, event) => {
                return Err(IndexerError::InvalidTransition {
                    from: from.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_loop_transitions() {
        let mut sm = RunStateMachine::new(Uuid::new_v4());
        assert_eq!(sm.transition(RunEvent::Validated).unwrap(), RunPhase::EnsureIndex);
        assert_eq!(sm.transition(RunEvent::IndexReady).unwrap(), RunPhase::Paginate);

        for _ in 0..2 {
            assert_eq!(sm.transition(RunEvent::PageFetched).unwrap(), RunPhase::FanOut);
            assert_eq!(sm.transition(RunEvent::Dispatched).unwrap(), RunPhase::Join);
            assert_eq!(sm.transition(RunEvent::Joined).unwrap(), RunPhase::Paginate);
        }

        assert_eq!(sm.transition(RunEvent::SourceExhausted).unwrap(), RunPhase::Done);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut sm = RunStateMachine::new(Uuid::new_v4());
        assert!(sm.transition(RunEvent::PageFetched).is_err());

        sm.transition(RunEvent::Validated).unwrap();
        sm.transition(RunEvent::IndexReady).unwrap();
        assert!(sm.transition(RunEvent::Joined).is_err());
    }

    #[test]
    fn test_terminal_phases_are_final() {
        let mut sm = RunStateMachine::new(Uuid::new_v4());
        sm.transition(RunEvent::Cancel).unwrap();
        assert_eq!(sm.phase(), RunPhase::Cancelled);
        assert!(sm.transition(RunEvent::Fail("late".to_string())).is_err());
    }
}
