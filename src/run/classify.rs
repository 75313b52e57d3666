//! Failure classification.
//!
//! [`transition`] is the whole policy: given the agreed status of the phase
//! that just ran, it names the next phase or the final outcome. It is a pure
//! function so the mapping can be checked without running anything.
//!
//! Two rules carry the weight. A failure before the fragment is known to be
//! scaled aborts with [`RunOutcome::StrongFailure`] straight away. A
//! recoverable failure once scaled jumps forward to [`Phase::Unscale`]; the
//! run ends in [`RunOutcome::LowFailure`] only if unscaling then succeeds.

use crate::run::phase::{Phase, PhaseStatus, RunOutcome};

/// Why a run did not end in success.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Failure before scaling succeeded.
    PreScale,
    /// Failure after scaling, geometry still expected to unscale.
    PostScaleRecoverable,
    /// Unscaling itself failed.
    Unscale,
    /// Fragments could not be reconciled.
    Merge,
    /// The remesher left a non-conformal fragment.
    FatalRemesh,
    /// Boundary rebuild or mesh write failed on the target.
    Output,
    /// The mesh was written but the solution was not.
    PartialWrite,
}

impl FailureKind {
    pub fn outcome(self) -> RunOutcome {
        match self {
            FailureKind::PostScaleRecoverable | FailureKind::PartialWrite => RunOutcome::LowFailure,
            FailureKind::PreScale
            | FailureKind::Unscale
            | FailureKind::Merge
            | FailureKind::FatalRemesh
            | FailureKind::Output => RunOutcome::StrongFailure,
        }
    }
}

/// State carried between transitions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutcomeAccumulator {
    /// The fragments are (or may be) in the reference frame.
    pub scaled: bool,
    pub failures: Vec<FailureKind>,
}

impl OutcomeAccumulator {
    fn fail(&mut self, kind: FailureKind) {
        self.failures.push(kind);
    }

    /// Outcome if the run stopped now.
    pub fn outcome(&self) -> RunOutcome {
        if self.scaled {
            return RunOutcome::StrongFailure;
        }
        self.failures
            .iter()
            .map(|k| k.outcome())
            .max()
            .unwrap_or(RunOutcome::Success)
    }
}

/// What the controller does next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Continue(Phase),
    Finish(RunOutcome),
}

fn advance(phase: Phase, acc: &OutcomeAccumulator) -> Step {
    match phase.next() {
        Some(next) => Step::Continue(next),
        None => Step::Finish(acc.outcome()),
    }
}

fn abort(acc: &mut OutcomeAccumulator, kind: FailureKind) -> Step {
    acc.fail(kind);
    Step::Finish(RunOutcome::StrongFailure)
}

fn degrade(acc: &mut OutcomeAccumulator) -> Step {
    acc.fail(FailureKind::PostScaleRecoverable);
    Step::Continue(Phase::Unscale)
}

/// Decide what follows `phase` given its agreed `status`.
pub fn transition(phase: Phase, status: PhaseStatus, acc: &mut OutcomeAccumulator) -> Step {
    use PhaseStatus::{Fatal, Ok, Recoverable};
    match (phase, status) {
        (_, Ok) => {
            match phase {
                Phase::Preprocess => acc.scaled = true,
                Phase::Unscale => acc.scaled = false,
                _ => {}
            }
            advance(phase, acc)
        }
        (Phase::Initialize | Phase::Load | Phase::Validate | Phase::Distribute, _) => {
            abort(acc, FailureKind::PreScale)
        }
        (Phase::Preprocess, Recoverable) => {
            acc.scaled = true;
            degrade(acc)
        }
        (Phase::Preprocess, Fatal) => abort(acc, FailureKind::PreScale),
        (Phase::Redistribute, _) | (Phase::Remesh, Recoverable) => degrade(acc),
        (Phase::Remesh, Fatal) => abort(acc, FailureKind::FatalRemesh),
        (Phase::Unscale, _) => abort(acc, FailureKind::Unscale),
        (Phase::Merge, _) => abort(acc, FailureKind::Merge),
        (Phase::Finalize, Recoverable) => {
            acc.fail(FailureKind::PartialWrite);
            Step::Finish(acc.outcome())
        }
        (Phase::Finalize, Fatal) => abort(acc, FailureKind::Output),
    }
}

/// Replay a trace of agreed statuses from [`Phase::Initialize`].
///
/// A trace that leaves the phase sequence, or stops before the run
/// finishes, classifies as [`RunOutcome::StrongFailure`].
pub fn classify(trace: &[(Phase, PhaseStatus)]) -> RunOutcome {
    let mut acc = OutcomeAccumulator::default();
    let mut expected = Phase::Initialize;
    for &(phase, status) in trace {
        if phase != expected {
            return RunOutcome::StrongFailure;
        }
        match transition(phase, status, &mut acc) {
            Step::Continue(next) => expected = next,
            Step::Finish(outcome) => return outcome,
        }
    }
    RunOutcome::StrongFailure
}
